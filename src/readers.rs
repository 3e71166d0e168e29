//! Readers collaborator: fetches aggregated historical messages for
//! the Report Generator.

use crate::error::{EngineError, Result};
use crate::model::{Aggregation, SenmlSample};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Page metadata accepted by a `ReadMessages` call.
#[derive(Debug, Clone, Serialize)]
pub struct ReadersRequest {
    pub channel: String,
    pub domain: String,
    pub aggregation: Aggregation,
    pub limit: u64,
    pub offset: u64,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub interval: String,
}

#[derive(Debug, Deserialize)]
struct ReadersResponse {
    #[serde(default)]
    messages: Vec<SenmlSample>,
}

/// RPC client over the historical-readings service.
#[async_trait]
pub trait Readers: Send + Sync {
    async fn read_messages(&self, req: ReadersRequest) -> Result<Vec<SenmlSample>>;
}

/// HTTP/JSON implementation using `reqwest` for service-to-service
/// calls.
pub struct HttpReaders {
    client: reqwest::Client,
    base_url: String,
}

impl HttpReaders {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(EngineError::from)?;
        Ok(HttpReaders { client, base_url })
    }
}

#[async_trait]
impl Readers for HttpReaders {
    async fn read_messages(&self, req: ReadersRequest) -> Result<Vec<SenmlSample>> {
        let url = format!("{}/channels/{}/messages", self.base_url, req.channel);
        let response = self
            .client
            .get(&url)
            .query(&req)
            .send()
            .await
            .map_err(EngineError::from)?
            .error_for_status()
            .map_err(EngineError::from)?;

        let decoded: ReadersResponse = response.json().await.map_err(EngineError::from)?;
        Ok(decoded.messages)
    }
}
