// ── Read API ──
//
// Request/response envelope for viewers that ask for a view instead of
// waiting for the next broadcast. Failures never leak store internals.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::CoreError;
use crate::views::{ViewBuilder, ViewLabel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Ok,
    Error,
}

/// Uniform `{status, message, data}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: ApiStatus,
    pub message: String,
    pub data: Value,
}

impl ApiResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            status: ApiStatus::Ok,
            message: "ok".into(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Error,
            message: message.into(),
            data: Value::Null,
        }
    }
}

/// A viewer request such as `{"request": "get-devices"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest(pub ViewLabel);

impl ReadRequest {
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        #[derive(Deserialize)]
        struct Wire {
            request: String,
        }

        let wire: Wire = serde_json::from_str(text).map_err(|e| CoreError::InvalidInput {
            message: format!("malformed request: {e}"),
        })?;
        wire.request.parse()
    }

    /// Wire name, e.g. `get-network-topology`.
    pub fn name(self) -> String {
        format!("get-{}", self.0)
    }
}

impl FromStr for ReadRequest {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("get-")
            .and_then(|label| ViewLabel::from_str(label).ok())
            .map(Self)
            .ok_or_else(|| CoreError::InvalidInput {
                message: format!("unknown request: {s}"),
            })
    }
}

/// A response tagged with the request it answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiReply {
    pub request: String,
    #[serde(flatten)]
    pub response: ApiResponse,
}

/// Serves views on request.
#[derive(Clone)]
pub struct ReadApi {
    views: ViewBuilder,
}

impl ReadApi {
    pub fn new(views: ViewBuilder) -> Self {
        Self { views }
    }

    pub async fn get(&self, label: ViewLabel) -> ApiResponse {
        match self.views.render(label).await {
            Ok(data) => ApiResponse::ok(data),
            Err(e) => {
                warn!(view = %label, error = %e, "read request failed");
                ApiResponse::error(e.public_message())
            }
        }
    }

    pub async fn get_devices(&self) -> ApiResponse {
        self.get(ViewLabel::Devices).await
    }

    pub async fn get_network_topology(&self) -> ApiResponse {
        self.get(ViewLabel::NetworkTopology).await
    }

    pub async fn get_traffic(&self) -> ApiResponse {
        self.get(ViewLabel::Traffic).await
    }

    pub async fn get_notifications(&self) -> ApiResponse {
        self.get(ViewLabel::Notifications).await
    }

    pub async fn get_ids_events(&self) -> ApiResponse {
        self.get(ViewLabel::IdsEvents).await
    }

    /// Answer one raw viewer frame.
    pub async fn handle_text(&self, text: &str) -> ApiReply {
        match ReadRequest::parse(text) {
            Ok(request) => ApiReply {
                request: request.name(),
                response: self.get(request.0).await,
            },
            Err(e) => ApiReply {
                request: String::new(),
                response: ApiResponse::error(e.public_message()),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ServiceConfig;
    use crate::store::{
        Collection, Document, DocumentStore, Filter, MemoryStore, Record, Repository, StoreError,
    };

    /// A store whose every operation fails.
    struct BrokenStore;

    #[async_trait]
    impl DocumentStore for BrokenStore {
        async fn find_all(&self, _: Collection, _: &Filter) -> Result<Vec<Record>, StoreError> {
            Err(StoreError::Backend("connection reset by peer".into()))
        }

        async fn find_one(&self, _: Collection, _: &str) -> Result<Option<Document>, StoreError> {
            Err(StoreError::Backend("connection reset by peer".into()))
        }

        async fn insert(
            &self,
            _: Collection,
            _: Option<&str>,
            _: Document,
        ) -> Result<String, StoreError> {
            Err(StoreError::Backend("connection reset by peer".into()))
        }

        async fn update(&self, _: Collection, _: &str, _: Document) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection reset by peer".into()))
        }
    }

    fn api(store: Arc<dyn DocumentStore>) -> ReadApi {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap(),
        ));
        ReadApi::new(ViewBuilder::new(
            Repository::new(store),
            clock,
            Arc::new(ServiceConfig::default()),
        ))
    }

    #[test]
    fn request_names() {
        let req: ReadRequest = "get-network-topology".parse().unwrap();
        assert_eq!(req.0, ViewLabel::NetworkTopology);
        assert_eq!(req.name(), "get-network-topology");
        assert!("get-everything".parse::<ReadRequest>().is_err());
        assert!("devices".parse::<ReadRequest>().is_err());
    }

    #[tokio::test]
    async fn ok_envelope() {
        let reply = api(Arc::new(MemoryStore::new()))
            .handle_text(r#"{"request": "get-notifications"}"#)
            .await;
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"request": "get-notifications", "status": "ok", "message": "ok", "data": []})
        );
    }

    #[tokio::test]
    async fn store_failure_is_hidden() {
        let response = api(Arc::new(BrokenStore)).get_devices().await;
        assert_eq!(response.status, ApiStatus::Error);
        assert!(!response.message.contains("connection reset"));
        assert_eq!(response.data, Value::Null);
    }

    #[tokio::test]
    async fn unknown_request_is_an_error_envelope() {
        let reply = api(Arc::new(MemoryStore::new()))
            .handle_text(r#"{"request": "drop-tables"}"#)
            .await;
        assert_eq!(reply.response.status, ApiStatus::Error);
        assert!(reply.response.message.contains("drop-tables"));
    }
}
