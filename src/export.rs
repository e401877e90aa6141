//! Export payload and the external "start process" boundary.
//!
//! The core only builds a structurally valid payload. Starting the process is
//! delegated to a [`ProcessStarter`]; the `export` feature provides an HTTP
//! implementation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{FlowError, FlowResult};
use crate::sequence::codec;
use crate::sequence::graph::SequenceGraph;
use crate::sequence::model::{Connection, Step, StepContent};

/// Path of the start-process endpoint on the execution service.
pub const DEFAULT_START_PATH: &str = "/api/v1/sequence/start-process";

// =============================================================================
// PAYLOAD
// =============================================================================

/// One step as sent to the execution service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayloadStep {
    pub id: String,

    #[serde(flatten)]
    pub content: StepContent,

    /// Canonical text form of the content.
    pub label: String,

    #[serde(default)]
    pub layout: serde_json::Value,
}

impl From<&Step> for PayloadStep {
    fn from(step: &Step) -> Self {
        Self {
            id: step.id.clone(),
            content: step.content.clone(),
            label: codec::encode(&step.content),
            layout: step.layout.clone(),
        }
    }
}

/// Body of the start-process request: steps in execution order plus edges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportPayload {
    pub steps: Vec<PayloadStep>,
    pub connections: Vec<Connection>,
}

impl ExportPayload {
    /// Builds the payload from a graph that is a single path headed by a
    /// LeadSource. Any other graph is rejected with InvariantViolation.
    pub fn from_graph(graph: &SequenceGraph) -> FlowResult<Self> {
        graph.check_exportable()?;
        let steps = graph.chain().into_iter().map(PayloadStep::from).collect();
        let next: std::collections::HashMap<&str, &Connection> = graph
            .connections()
            .iter()
            .map(|c| (c.from.as_str(), c))
            .collect();
        let connections = graph
            .chain()
            .into_iter()
            .filter_map(|s| next.get(s.id.as_str()).map(|c| (*c).clone()))
            .collect();
        Ok(Self { steps, connections })
    }

    /// Serializes the payload to JSON.
    pub fn to_json(&self) -> FlowResult<String> {
        serde_json::to_string(self).map_err(|e| FlowError::serialization(e.to_string()))
    }
}

// =============================================================================
// STARTER
// =============================================================================

/// Errors reported by a process starter. Passed to the caller unchanged.
#[derive(Debug, Error)]
pub enum ExportError {
    #[cfg(feature = "export")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[cfg(feature = "export")]
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    Rejected(String),
}

/// Hands a payload to the execution service.
#[allow(async_fn_in_trait)]
pub trait ProcessStarter {
    async fn start_process(&self, payload: &ExportPayload) -> Result<(), ExportError>;
}

/// Where and how to reach the execution service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub path: String,
}

impl ExportConfig {
    /// Creates a config for `base_url` with the default endpoint path.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            path: DEFAULT_START_PATH.to_string(),
        }
    }

    /// Builder: Set bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Builder: Set endpoint path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Full URL of the start-process endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/{}", self.base_url, self.path.trim_start_matches('/'))
    }
}

#[cfg(feature = "export")]
pub use http::HttpProcessStarter;

#[cfg(feature = "export")]
mod http {
    use reqwest::{header, Client};

    use super::{ExportConfig, ExportError, ExportPayload, ProcessStarter};

    /// Starts processes by POSTing the payload as JSON.
    pub struct HttpProcessStarter {
        client: Client,
        endpoint: String,
    }

    impl HttpProcessStarter {
        /// Create a new starter, with bearer auth when the config has a token
        pub fn new(config: &ExportConfig) -> Result<Self, ExportError> {
            let mut headers = header::HeaderMap::new();
            if let Some(token) = &config.token {
                headers.insert(
                    header::AUTHORIZATION,
                    header::HeaderValue::from_str(&format!("Bearer {}", token))?,
                );
            }

            let client = Client::builder().default_headers(headers).build()?;

            Ok(Self {
                client,
                endpoint: config.endpoint(),
            })
        }
    }

    impl ProcessStarter for HttpProcessStarter {
        /// POST {base}/api/v1/sequence/start-process
        async fn start_process(&self, payload: &ExportPayload) -> Result<(), ExportError> {
            let resp = self.client.post(&self.endpoint).json(payload).send().await?;

            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let message = resp.text().await.unwrap_or_default();
                return Err(ExportError::Api { status, message });
            }

            Ok(())
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::sequence::registry::StepKind;
    use crate::sequence::session::SessionController;

    struct RecordingStarter {
        sent: RefCell<Vec<ExportPayload>>,
        fail_with: Option<u16>,
    }

    impl RecordingStarter {
        fn new(fail_with: Option<u16>) -> Self {
            Self {
                sent: RefCell::new(Vec::new()),
                fail_with,
            }
        }
    }

    impl ProcessStarter for RecordingStarter {
        async fn start_process(&self, payload: &ExportPayload) -> Result<(), ExportError> {
            self.sent.borrow_mut().push(payload.clone());
            match self.fail_with {
                Some(status) => Err(ExportError::Api {
                    status,
                    message: "queue unavailable".to_string(),
                }),
                None => Ok(()),
            }
        }
    }

    /// Never answers.
    struct StalledStarter;

    impl ProcessStarter for StalledStarter {
        async fn start_process(&self, _payload: &ExportPayload) -> Result<(), ExportError> {
            std::future::pending().await
        }
    }

    fn seeded() -> SessionController {
        let mut controller = SessionController::new();
        controller
            .add_step(StepKind::LeadSource, StepContent::lead_source("a@b.com"))
            .unwrap();
        controller
            .add_step(StepKind::ColdEmail, StepContent::cold_email("Hi", "Hello"))
            .unwrap();
        controller
            .add_step(StepKind::WaitDelay, StepContent::wait_delay(60))
            .unwrap();
        controller
    }

    #[test]
    fn test_payload_in_chain_order() {
        let mut controller = seeded();
        controller.delete_step("2").unwrap();
        controller
            .add_step(StepKind::ColdEmail, StepContent::cold_email("Follow up", "Still there?"))
            .unwrap();

        let payload = ExportPayload::from_graph(controller.graph()).unwrap();
        let ids: Vec<_> = payload.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3", "4"]);
        let edges: Vec<_> = payload.connections.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(edges, vec!["e1-3", "e3-4"]);
        assert_eq!(payload.steps[1].label, "WaitDelay\n- (60 min)");
    }

    #[test]
    fn test_payload_json_shape() {
        let payload = ExportPayload::from_graph(seeded().graph()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        assert_eq!(json["steps"][0]["kind"], "LeadSource");
        assert_eq!(json["steps"][0]["content"]["recipientEmail"], "a@b.com");
        assert_eq!(json["steps"][2]["content"]["minutes"], 60);
        assert_eq!(json["connections"][0]["from"], "1");
        assert_eq!(json["connections"][0]["to"], "2");
    }

    #[test]
    fn test_config_endpoint() {
        let config = ExportConfig::new("https://api.example.com/").with_token("t");
        assert_eq!(
            config.endpoint(),
            "https://api.example.com/api/v1/sequence/start-process"
        );
        let config = config.with_path("custom/start");
        assert_eq!(config.endpoint(), "https://api.example.com/custom/start");
    }

    #[tokio::test]
    async fn test_export_with_success() {
        let mut controller = seeded();
        let starter = RecordingStarter::new(None);
        controller.export_with(&starter).await.unwrap();

        assert!(controller.is_idle());
        assert_eq!(starter.sent.borrow().len(), 1);
        assert_eq!(starter.sent.borrow()[0].steps.len(), 3);
    }

    #[tokio::test]
    async fn test_export_failure_reported_verbatim() {
        let mut controller = seeded();
        let starter = RecordingStarter::new(Some(503));
        let err = controller.export_with(&starter).await.unwrap_err();

        assert_eq!(err.to_string(), "Export failed: API error: 503 - queue unavailable");
        assert!(controller.is_idle());
    }

    #[tokio::test]
    async fn test_export_refuses_invalid_graph() {
        let mut controller = SessionController::new();
        let starter = RecordingStarter::new(None);
        assert!(controller.export_with(&starter).await.is_err());
        assert!(starter.sent.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_export_timeout_unlocks_editing() {
        let mut controller = seeded();
        let elapsed = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            controller.export_with(&StalledStarter),
        )
        .await;

        assert!(elapsed.is_err());
        assert!(controller.is_idle());
        controller
            .add_step(StepKind::WaitDelay, StepContent::wait_delay(5))
            .unwrap();
        assert_eq!(controller.graph().len(), 4);
    }
}
