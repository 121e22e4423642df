//! Orchestrator clients.

use std::time::Duration;

use async_trait::async_trait;
use common::Gid;
use reqwest::StatusCode;

use crate::definition::SagaDefinition;
use crate::error::{Result, SagaError};
use crate::wire::{NewGidReply, ResultReply};

/// Accepts sagas for durable execution.
///
/// Accepting a saga is a promise to drive it to a terminal state: every
/// forward committed, or every committed forward compensated.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn submit(&self, saga: &SagaDefinition) -> Result<()>;
}

/// Talks to a remote orchestration service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpOrchestrator {
    client: reqwest::Client,
    server: String,
}

impl HttpOrchestrator {
    /// Creates a client for `server` (e.g. `http://localhost:36789/api/dtmsvr`).
    pub fn new(server: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, server))
    }

    pub fn with_client(client: reqwest::Client, server: impl Into<String>) -> Self {
        let server = server.into().trim_end_matches('/').to_string();
        Self { client, server }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Asks the service for a fresh global transaction id.
    pub async fn new_gid(&self) -> Result<Gid> {
        let response = self
            .client
            .get(format!("{}/newGid", self.server))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SagaError::UnexpectedResponse {
                status: status.as_u16(),
                body,
            });
        }

        let reply: NewGidReply = response.json().await?;
        Ok(reply.gid)
    }
}

#[async_trait]
impl Orchestrator for HttpOrchestrator {
    #[tracing::instrument(skip_all, fields(gid = %saga.gid, server = %self.server))]
    async fn submit(&self, saga: &SagaDefinition) -> Result<()> {
        let request = saga.to_request()?;
        let response = self
            .client
            .post(format!("{}/submit", self.server))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let reply = serde_json::from_str::<ResultReply>(&body).ok();

        if status == StatusCode::CONFLICT || reply.as_ref().is_some_and(ResultReply::is_failure) {
            let reason = reply
                .and_then(|r| r.message)
                .unwrap_or_else(|| body.clone());
            return Err(SagaError::Rejected {
                gid: saga.gid.clone(),
                reason,
            });
        }

        if status.is_success() {
            tracing::debug!(status = status.as_u16(), "orchestrator accepted saga");
            return Ok(());
        }

        Err(SagaError::UnexpectedResponse {
            status: status.as_u16(),
            body,
        })
    }
}
