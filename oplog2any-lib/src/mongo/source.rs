use super::{from_bson_timestamp, to_bson_timestamp};
use crate::config::Config;
use crate::error::{CdcError, Result};
use crate::source::{CursorEvent, CursorOptions, OplogCursor, OplogSelector, OplogSource};
use crate::types::RawLogEntry;
use async_trait::async_trait;
use futures::StreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{CursorType, FindOptions};
use mongodb::{Client, Collection, Cursor};
use std::time::Duration;
use tracing::{debug, warn};

/// Oplog source backed by the `local.oplog.rs` collection
#[derive(Debug, Clone)]
pub struct MongoOplogSource {
    client: Client,
    database: String,
    collection: String,
}

impl MongoOplogSource {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            database: config.oplog_database.clone(),
            collection: config.oplog_collection.clone(),
        }
    }

    fn collection(&self) -> Collection<Document> {
        self.client
            .database(&self.database)
            .collection::<Document>(&self.collection)
    }
}

/// Server-side filter equivalent to [`OplogSelector::matches`]
pub fn selector_document(selector: &OplogSelector) -> Document {
    doc! {
        "$and": [
            { "ts": { "$gt": to_bson_timestamp(selector.after()) } },
            { "ns": { "$regex": selector.namespace_filter() } },
        ]
    }
}

#[async_trait]
impl OplogSource for MongoOplogSource {
    async fn open_cursor(
        &self,
        selector: &OplogSelector,
        options: CursorOptions,
    ) -> Result<Box<dyn OplogCursor>> {
        let find_options = FindOptions::builder()
            .cursor_type(CursorType::TailableAwait)
            .sort(doc! { "$natural": 1 })
            .no_cursor_timeout(true)
            .build();

        let cursor = self
            .collection()
            .find(selector_document(selector), find_options)
            .await?;
        debug!("Opened tailable cursor on {}", self.describe());

        Ok(Box::new(MongoOplogCursor {
            cursor: Some(cursor),
            idle_timeout: options.idle_timeout,
        }))
    }

    fn describe(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }
}

/// Tailable-await cursor over the oplog
pub struct MongoOplogCursor {
    cursor: Option<Cursor<Document>>,
    idle_timeout: Option<Duration>,
}

#[async_trait]
impl OplogCursor for MongoOplogCursor {
    async fn next(&mut self) -> Result<CursorEvent> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(CursorEvent::Closed);
        };

        loop {
            let next = match self.idle_timeout {
                Some(idle) => match tokio::time::timeout(idle, cursor.next()).await {
                    Ok(next) => next,
                    Err(_) => return Ok(CursorEvent::Timeout),
                },
                None => cursor.next().await,
            };

            match next {
                Some(Ok(document)) => {
                    if let Some(entry) = decode_or_skip(&document) {
                        return Ok(CursorEvent::Entry(entry));
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    self.cursor = None;
                    return Ok(CursorEvent::Closed);
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the driver cursor kills it on the server
        self.cursor.take();
        Ok(())
    }
}

/// Decode `document`, or log and drop it when it lacks `ts` or `op`.
///
/// A single malformed entry does not end the tailing run.
pub fn decode_or_skip(document: &Document) -> Option<RawLogEntry> {
    match decode_entry(document) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!(
                ns = document.get_str("ns").unwrap_or("<none>"),
                "Skipping undecodable oplog entry: {}", e
            );
            None
        }
    }
}

/// Decode one oplog document into a [`RawLogEntry`]
pub fn decode_entry(document: &Document) -> Result<RawLogEntry> {
    let timestamp = document
        .get_timestamp("ts")
        .map_err(|e| CdcError::protocol(format!("Oplog entry has no valid ts: {}", e)))?;
    let operation = document
        .get_str("op")
        .map_err(|e| CdcError::protocol(format!("Oplog entry has no valid op: {}", e)))?;
    let namespace = document.get_str("ns").unwrap_or_default();

    let history_id = match document.get("h") {
        Some(Bson::Int64(h)) => *h,
        Some(Bson::Int32(h)) => *h as i64,
        _ => 0,
    };
    let version = match document.get("v") {
        Some(Bson::Int32(v)) => *v,
        Some(Bson::Int64(v)) => *v as i32,
        _ => 0,
    };

    let object = document
        .get_document("o")
        .map(document_to_json)
        .unwrap_or_else(|_| serde_json::Value::Object(Default::default()));
    let query_object = document.get_document("o2").ok().map(document_to_json);

    Ok(RawLogEntry {
        timestamp: from_bson_timestamp(timestamp),
        history_id,
        version,
        operation: operation.to_string(),
        namespace: namespace.to_string(),
        object,
        query_object,
    })
}

fn document_to_json(document: &Document) -> serde_json::Value {
    Bson::Document(document.clone()).into_relaxed_extjson()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OperationKind, OplogTimestamp};
    use mongodb::bson::Timestamp;

    #[test]
    fn test_selector_document_shape() {
        let selector = OplogSelector::new(OplogTimestamp::new(10, 2), "^shop\\.");
        let filter = selector_document(&selector);
        let clauses = filter.get_array("$and").unwrap();
        assert_eq!(clauses.len(), 2);

        let ts = clauses[0].as_document().unwrap().get_document("ts").unwrap();
        assert_eq!(
            ts.get_timestamp("$gt").unwrap(),
            Timestamp {
                time: 10,
                increment: 2
            }
        );
        let ns = clauses[1].as_document().unwrap().get_document("ns").unwrap();
        assert_eq!(ns.get_str("$regex").unwrap(), "^shop\\.");
    }

    #[test]
    fn test_decode_update_entry() {
        let document = doc! {
            "ts": Timestamp { time: 1_700_000_000, increment: 4 },
            "h": 12345_i64,
            "v": 2,
            "op": "u",
            "ns": "shop.orders",
            "o": { "$set": { "qty": 2 } },
            "o2": { "_id": 7 },
        };

        let entry = decode_entry(&document).unwrap();
        assert_eq!(entry.timestamp, OplogTimestamp::new(1_700_000_000, 4));
        assert_eq!(entry.history_id, 12345);
        assert_eq!(entry.version, 2);
        assert_eq!(entry.operation_kind(), OperationKind::Update);
        assert_eq!(entry.namespace, "shop.orders");
        assert_eq!(entry.object, serde_json::json!({"$set": {"qty": 2}}));
        assert_eq!(entry.query_object, Some(serde_json::json!({"_id": 7})));
    }

    #[test]
    fn test_decode_noop_without_namespace() {
        let document = doc! {
            "ts": Timestamp { time: 5, increment: 1 },
            "op": "n",
            "o": { "msg": "periodic noop" },
        };

        let entry = decode_entry(&document).unwrap();
        assert_eq!(entry.namespace, "");
        assert_eq!(entry.history_id, 0);
        assert!(entry.query_object.is_none());
    }

    #[test]
    fn test_decode_rejects_missing_timestamp() {
        let document = doc! { "op": "i", "ns": "db.c", "o": {} };
        assert!(matches!(decode_entry(&document), Err(CdcError::Protocol(_))));
    }

    #[test]
    fn test_malformed_entry_is_skipped() {
        assert!(decode_or_skip(&doc! { "ns": "db.c", "o": {} }).is_none());
        assert!(decode_or_skip(&doc! { "ts": Timestamp { time: 1, increment: 0 } }).is_none());

        let valid = doc! { "ts": Timestamp { time: 1, increment: 0 }, "op": "i", "ns": "db.c" };
        assert_eq!(decode_or_skip(&valid).unwrap().namespace, "db.c");
    }
}
