//! Dgraph alpha HTTP backend (`/mutate`, `/query`, `/alter`, `/health`).
//!
//! All Dgraph wire types are private to this module. The client is built
//! once and cheaply cloned because `reqwest::Client` is an `Arc` internally.
//! Nothing here retries; failures go back to the caller as-is.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::store::{AlterOp, CommitInfo, StoreError};

const ACCESS_TOKEN_HEADER: &str = "X-Dgraph-AccessToken";

#[derive(Debug, Clone)]
pub struct DgraphStore {
    client: Client,
    base_url: String,
    probe_timeout: Duration,
    access_token: Option<String>,
}

impl DgraphStore {
    /// `probe_timeout` bounds `/health`. Mutate, query and alter carry
    /// their own per-call timeout.
    pub fn new(
        base_url: String,
        probe_timeout: Duration,
        access_token: Option<String>,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .build()
            .map_err(|e| StoreError::Transport(format!("failed to build HTTP client: {e}")))?;
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self { client, base_url, probe_timeout, access_token })
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let url = format!("{}/health", self.base_url);
        let req = self.client.get(&url).timeout(self.probe_timeout);
        let resp = self
            .authed(req)
            .send()
            .await
            .map_err(|e| send_error(e, self.probe_timeout))?;
        check_status(resp).await.map(|_| ())
    }

    pub async fn mutate(
        &self,
        condition: &str,
        statements: &str,
        timeout: Duration,
    ) -> Result<CommitInfo, StoreError> {
        let url = format!(
            "{}/mutate?commitNow=true&timeout={}ms",
            self.base_url,
            timeout.as_millis()
        );
        let body = upsert_block(condition, statements);
        debug!(url = %url, body_len = body.len(), "sending upsert");
        trace!(body = %body, "upsert body");

        let req = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/rdf")
            .timeout(timeout)
            .body(body);
        let resp = self.authed(req).send().await.map_err(|e| send_error(e, timeout))?;
        let envelope: Envelope<MutateData> = decode(check_status(resp).await?).await?;
        let data = envelope.into_data()?;
        let txn = data.1.and_then(|ext| ext.txn).unwrap_or_default();
        debug!(code = %data.0.code, start_ts = txn.start_ts, commit_ts = txn.commit_ts, "upsert committed");

        Ok(CommitInfo {
            uids: data.0.uids,
            start_ts: txn.start_ts,
            commit_ts: txn.commit_ts,
        })
    }

    pub async fn query(
        &self,
        text: &str,
        params: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<serde_json::Value, StoreError> {
        let url = format!("{}/query?timeout={}ms", self.base_url, timeout.as_millis());
        let payload = QueryRequest { query: text, variables: params };
        debug!(url = %url, "sending query");
        trace!(query = %text, "query text");

        let req = self.client.post(&url).json(&payload).timeout(timeout);
        let resp = self.authed(req).send().await.map_err(|e| send_error(e, timeout))?;
        let envelope: Envelope<serde_json::Value> = decode(check_status(resp).await?).await?;
        Ok(envelope.into_data()?.0)
    }

    pub async fn alter(&self, op: &AlterOp, timeout: Duration) -> Result<(), StoreError> {
        let url = format!("{}/alter", self.base_url);
        let req = match op {
            AlterOp::DropAll => self.client.post(&url).json(&serde_json::json!({ "drop_all": true })),
            AlterOp::Schema(schema) => self.client.post(&url).body(schema.clone()),
        };
        debug!(?op, ?timeout, "sending alter");
        let resp = self
            .authed(req.timeout(timeout))
            .send()
            .await
            .map_err(|e| send_error(e, timeout))?;
        let envelope: Envelope<serde_json::Value> = decode(check_status(resp).await?).await?;
        envelope.into_data().map(|_| ())
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => req.header(ACCESS_TOKEN_HEADER, token),
            None => req,
        }
    }
}

/// Wrap the rendered halves in a DQL upsert block.
fn upsert_block(condition: &str, statements: &str) -> String {
    format!("upsert {{\n  query {condition}\n  mutation {{\n    set {{\n{statements}\n    }}\n  }}\n}}")
}

fn transport_error(e: reqwest::Error) -> StoreError {
    error!(error = %e, "dgraph request failed (transport)");
    StoreError::Transport(e.to_string())
}

fn send_error(e: reqwest::Error, timeout: Duration) -> StoreError {
    if e.is_timeout() {
        error!(?timeout, "dgraph request timed out");
        StoreError::Timeout(timeout)
    } else {
        transport_error(e)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());
    error!(%status, %body, "dgraph returned HTTP error");
    Err(StoreError::Status { status: status.as_u16(), body })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<Envelope<T>, StoreError> {
    response.json::<Envelope<T>>().await.map_err(|e| {
        error!(error = %e, "failed to deserialize dgraph response");
        StoreError::Decode(e.to_string())
    })
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    variables: &'a BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<ErrorEntry>,
    #[serde(default)]
    extensions: Option<Extensions>,
}

impl<T> Envelope<T> {
    /// Errors win over data: Dgraph may return both on a rejected mutation.
    fn into_data(self) -> Result<(T, Option<Extensions>), StoreError> {
        if !self.errors.is_empty() {
            let message = self
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            error!(%message, "dgraph rejected request");
            return Err(StoreError::Rejected(message));
        }
        match self.data {
            Some(data) => Ok((data, self.extensions)),
            None => Err(StoreError::Decode("response has neither data nor errors".into())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Extensions {
    #[serde(default)]
    txn: Option<Txn>,
}

#[derive(Debug, Default, Deserialize)]
struct Txn {
    #[serde(default)]
    start_ts: u64,
    #[serde(default)]
    commit_ts: u64,
}

#[derive(Debug, Deserialize)]
struct MutateData {
    #[serde(default)]
    code: String,
    #[serde(default)]
    uids: BTreeMap<String, String>,
}
