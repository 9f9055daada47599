//! MongoDB driver integration
//!
//! Connection setup, the oplog source and the checkpoint collection backend.

pub mod checkpoint;
pub mod source;

pub use checkpoint::MongoCheckpointBackend;
pub use source::{MongoOplogCursor, MongoOplogSource};

use crate::config::Config;
use crate::error::{CdcError, Result};
use crate::types::OplogTimestamp;
use mongodb::bson::{doc, Timestamp};
use mongodb::options::{ClientOptions, ReadPreference, SelectionCriteria, Tls, TlsOptions};
use mongodb::Client;
use tracing::{debug, info};

const APP_NAME: &str = "oplog2any";

/// Connect to the source and verify the connection with a `ping`.
///
/// Reads go to the primary. Credentials without an explicit auth source
/// authenticate against `config.auth_database`.
pub async fn connect(config: &Config) -> Result<Client> {
    let mut options = ClientOptions::parse(&config.source_url).await?;

    if options.app_name.is_none() {
        options.app_name = Some(APP_NAME.to_string());
    }
    options.connect_timeout = Some(config.connection_timeout);
    options.server_selection_timeout = Some(config.connection_timeout);
    options.selection_criteria = Some(SelectionCriteria::ReadPreference(ReadPreference::Primary));

    if let Some(credential) = options.credential.as_mut() {
        if credential.source.is_none() {
            credential.source = Some(config.auth_database.clone());
        }
    }

    if config.tls_enabled {
        let mut tls = TlsOptions::default();
        tls.allow_invalid_certificates = Some(config.tls_allow_invalid_certificates);
        options.tls = Some(Tls::Enabled(tls));
        debug!(
            "TLS enabled (allow invalid certificates: {})",
            config.tls_allow_invalid_certificates
        );
    }

    let client = Client::with_options(options)?;
    let auth_db = client.database(&config.auth_database);
    let ping = auth_db.run_command(doc! { "ping": 1 }, None);
    match tokio::time::timeout(config.connection_timeout, ping).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            return Err(CdcError::connection(format!(
                "Failed to reach MongoDB source: {}",
                e
            )))
        }
        Err(_) => {
            return Err(CdcError::timeout(format!(
                "MongoDB source did not answer ping within {:?}",
                config.connection_timeout
            )))
        }
    }

    info!("Connected to MongoDB source");
    Ok(client)
}

pub(crate) fn to_bson_timestamp(timestamp: OplogTimestamp) -> Timestamp {
    Timestamp {
        time: timestamp.seconds(),
        increment: timestamp.ordinal(),
    }
}

pub(crate) fn from_bson_timestamp(timestamp: Timestamp) -> OplogTimestamp {
    OplogTimestamp::new(timestamp.time, timestamp.increment)
}
