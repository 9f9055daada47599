use super::{from_bson_timestamp, to_bson_timestamp};
use crate::checkpoint::CheckpointBackend;
use crate::config::Config;
use crate::error::{CdcError, Result};
use crate::types::{CheckpointKey, CheckpointRecord};
use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::{Client, Collection};

/// Checkpoint records stored in `mongotailer.oplogtailerinfo`:
///
/// ```text
/// { filterRegex: <string>, label: <string>, startReadingFromTime: <timestamp> }
/// ```
#[derive(Debug, Clone)]
pub struct MongoCheckpointBackend {
    collection: Collection<Document>,
}

impl MongoCheckpointBackend {
    pub fn new(client: &Client, config: &Config) -> Self {
        Self {
            collection: client
                .database(&config.checkpoint_database)
                .collection::<Document>(&config.checkpoint_collection),
        }
    }
}

fn key_filter(key: &CheckpointKey) -> Document {
    doc! {
        "$and": [
            { "filterRegex": key.filter_regex.as_str() },
            { "label": key.label.as_str() },
        ]
    }
}

fn to_document(record: &CheckpointRecord) -> Document {
    doc! {
        "filterRegex": record.filter_regex.as_str(),
        "startReadingFromTime": to_bson_timestamp(record.start_reading_from_time),
        "label": record.label.as_str(),
    }
}

fn from_document(document: &Document) -> Result<CheckpointRecord> {
    let field = |name: &str| {
        document.get_str(name).map_err(|e| {
            CdcError::checkpoint(format!("Checkpoint record has no valid {}: {}", name, e))
        })
    };

    let start = document.get_timestamp("startReadingFromTime").map_err(|e| {
        CdcError::checkpoint(format!(
            "Checkpoint record has no valid startReadingFromTime: {}",
            e
        ))
    })?;

    Ok(CheckpointRecord {
        filter_regex: field("filterRegex")?.to_string(),
        label: field("label")?.to_string(),
        start_reading_from_time: from_bson_timestamp(start),
    })
}

#[async_trait]
impl CheckpointBackend for MongoCheckpointBackend {
    async fn count(&self, key: &CheckpointKey) -> Result<u64> {
        Ok(self.collection.count_documents(key_filter(key), None).await?)
    }

    async fn find(&self, key: &CheckpointKey) -> Result<Option<CheckpointRecord>> {
        self.collection
            .find_one(key_filter(key), None)
            .await?
            .map(|document| from_document(&document))
            .transpose()
    }

    async fn insert(&self, record: &CheckpointRecord) -> Result<()> {
        self.collection
            .insert_one(to_document(record), None)
            .await?;
        Ok(())
    }

    async fn replace(&self, record: &CheckpointRecord) -> Result<()> {
        let result = self
            .collection
            .replace_one(key_filter(&record.key()), to_document(record), None)
            .await?;

        if result.matched_count == 0 {
            return Err(CdcError::checkpoint(format!(
                "No checkpoint record for {} to replace",
                record.key()
            )));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.collection.namespace().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OplogTimestamp;

    #[test]
    fn test_record_document_round_trip() {
        let key = CheckpointKey::new("shop\\..*", "east");
        let record = CheckpointRecord::new(&key, OplogTimestamp::new(1_700_000_000, 9));

        let document = to_document(&record);
        assert_eq!(document.get_str("filterRegex").unwrap(), "shop\\..*");
        assert_eq!(document.get_str("label").unwrap(), "east");
        assert_eq!(from_document(&document).unwrap(), record);
    }

    #[test]
    fn test_record_without_timestamp_rejected() {
        let document = doc! { "filterRegex": "x", "label": "y" };
        assert!(matches!(
            from_document(&document),
            Err(CdcError::Checkpoint(_))
        ));
    }

    #[test]
    fn test_key_filter_matches_both_fields() {
        let filter = key_filter(&CheckpointKey::new("a", "b"));
        let clauses = filter.get_array("$and").unwrap();
        assert_eq!(clauses[0].as_document().unwrap().get_str("filterRegex").unwrap(), "a");
        assert_eq!(clauses[1].as_document().unwrap().get_str("label").unwrap(), "b");
    }
}
