//! Dependency initialization and wiring for the search store binary.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{info, warn};

use super::settings::{ConnectionMode, Settings};
use crate::errors::AppError;
use search_store_repository::{CallLayer, Model, OpenSearchTransport};

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The collection commands operate on. Documents are kept as raw JSON.
    pub model: Model<Value>,
}

impl Dependencies {
    /// Connect to OpenSearch and build the collection model.
    ///
    /// In fail-fast mode a failed ping is returned as an error; in retry mode
    /// the ping is repeated every `retry_interval` until it succeeds.
    pub async fn new(settings: &Settings) -> Result<Self, AppError> {
        info!(
            opensearch_url = %settings.opensearch_url,
            alias = %settings.model.alias(),
            index = %settings.model.index_name(),
            connection_mode = ?settings.connection_mode,
            retry_interval_secs = settings.retry_interval.as_secs(),
            "Initializing dependencies"
        );

        let transport = Self::connect_to_opensearch(
            &settings.opensearch_url,
            settings.connection_mode,
            settings.retry_interval,
        )
        .await?;

        info!("OpenSearch connection established");

        let layer = CallLayer::new(Arc::new(transport), settings.store.clone());
        let model = Model::new(settings.model.clone(), layer)?;

        Ok(Self { model })
    }

    async fn connect_to_opensearch(
        url: &str,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchTransport, AppError> {
        loop {
            match Self::try_connect_opensearch(url).await {
                Ok(transport) => return Ok(transport),
                Err(e) => match mode {
                    ConnectionMode::FailFast => {
                        return Err(AppError::config(format!(
                            "Failed to connect to OpenSearch: {}",
                            e
                        )));
                    }
                    ConnectionMode::Retry => {
                        warn!(
                            opensearch_url = %url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }

    async fn try_connect_opensearch(url: &str) -> Result<OpenSearchTransport, AppError> {
        let transport = OpenSearchTransport::new(url)?;
        transport.ping().await?;
        Ok(transport)
    }
}
