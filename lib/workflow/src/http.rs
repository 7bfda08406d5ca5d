//! HTTP client for the remote execution engine.
//!
//! Endpoints, relative to the configured base URL:
//!
//! - `POST   /workflows/`              create
//! - `PUT    /workflows/{id}/`         update
//! - `DELETE /workflows/{id}/`         delete
//! - `POST   /workflows/{id}/execute/` execute
//! - `POST   /workflows/validate/`     validate

use crate::edge::EdgeInstance;
use crate::engine::{
    EngineError, ExecuteResponse, ExecutionRequest, RemoteEngine, RemoteWorkflowId,
    ValidationReport, WorkflowCreated, WorkflowSubmission,
};
use crate::node::NodePayload;
use async_trait::async_trait;
use canvasflow_core::Result;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Connection settings for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the engine API, e.g. `http://localhost:8000/api`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// [`RemoteEngine`] over HTTP+JSON.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEngine {
    /// Builds a client for the configured engine.
    ///
    /// # Errors
    ///
    /// Returns `Request` if the HTTP client cannot be constructed.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Request {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, EngineError> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, endpoint = %url, "Engine request failed");
            if e.is_timeout() {
                EngineError::Timeout
            } else {
                EngineError::Request {
                    message: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                endpoint = %url,
                status = %status,
                body = %body,
                "Engine returned error"
            );
            return Err(EngineError::Status {
                status: status.as_u16(),
                message: error_message(&body, status),
            }
            .into());
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<T, EngineError> {
        let response = self.send(request, url).await?;
        let parsed = response.json::<T>().await.map_err(|e| {
            tracing::warn!(error = %e, endpoint = %url, "Failed to parse engine response");
            EngineError::Decode {
                message: e.to_string(),
            }
        })?;
        Ok(parsed)
    }
}

/// Uses the body's `error` field when present, else the raw body.
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        Err(_) => body.to_string(),
    }
}

#[async_trait]
impl RemoteEngine for HttpEngine {
    async fn create_workflow(
        &self,
        submission: &WorkflowSubmission,
    ) -> Result<RemoteWorkflowId, EngineError> {
        let url = self.url("workflows/");
        tracing::debug!(endpoint = %url, nodes = submission.nodes.len(), "Creating workflow");
        let created: WorkflowCreated = self
            .send_json(self.client.post(&url).json(submission), &url)
            .await?;
        Ok(created.id)
    }

    async fn update_workflow(
        &self,
        id: &RemoteWorkflowId,
        submission: &WorkflowSubmission,
    ) -> Result<RemoteWorkflowId, EngineError> {
        let url = self.url(&format!("workflows/{id}/"));
        tracing::debug!(endpoint = %url, nodes = submission.nodes.len(), "Updating workflow");
        let updated: WorkflowCreated = self
            .send_json(self.client.put(&url).json(submission), &url)
            .await?;
        Ok(updated.id)
    }

    async fn delete_workflow(&self, id: &RemoteWorkflowId) -> Result<(), EngineError> {
        let url = self.url(&format!("workflows/{id}/"));
        self.send(self.client.delete(&url), &url).await?;
        Ok(())
    }

    async fn execute_workflow(
        &self,
        id: &RemoteWorkflowId,
        request: &ExecutionRequest,
    ) -> Result<ExecuteResponse, EngineError> {
        let url = self.url(&format!("workflows/{id}/execute/"));
        tracing::debug!(endpoint = %url, "Executing workflow");
        self.send_json(self.client.post(&url).json(request), &url)
            .await
    }

    async fn validate_workflow(
        &self,
        nodes: &[NodePayload],
        edges: &[EdgeInstance],
    ) -> Result<ValidationReport, EngineError> {
        let url = self.url("workflows/validate/");
        let body = serde_json::json!({ "nodes": nodes, "edges": edges });
        self.send_json(self.client.post(&url).json(&body), &url)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RemoteRunStatus;
    use crate::node::{NodeId, NodeStatus};
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn engine(base_url: String) -> HttpEngine {
        HttpEngine::new(&EngineConfig {
            base_url,
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn submission() -> WorkflowSubmission {
        WorkflowSubmission {
            name: "Current Workflow".to_string(),
            description: "Workflow execution".to_string(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_returns_numeric_id() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/workflows/")
            .match_body(Matcher::PartialJson(json!({"name": "Current Workflow"})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 7, "name": "Current Workflow"}"#)
            .create_async()
            .await;

        let id = engine(server.url()).create_workflow(&submission()).await.unwrap();
        assert_eq!(id.as_str(), "7");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn update_targets_existing_id() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/workflows/7/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 7}"#)
            .create_async()
            .await;

        let id = engine(server.url())
            .update_workflow(&RemoteWorkflowId::new("7"), &submission())
            .await
            .unwrap();
        assert_eq!(id.as_str(), "7");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn execute_sends_trigger_data() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/workflows/7/execute/")
            .match_body(Matcher::Json(json!({
                "trigger_data": {"text": "Manual trigger execution"},
                "credentials": {}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"execution_id": "x", "status": "completed",
                    "execution": {"node_states": {"n1": {"status": "completed", "output": "hi"}},
                                  "execution_order": ["n1"]}}"#,
            )
            .create_async()
            .await;

        let mut request = ExecutionRequest::default();
        request
            .trigger_data
            .insert("text".to_string(), json!("Manual trigger execution"));
        let response = engine(server.url())
            .execute_workflow(&RemoteWorkflowId::new("7"), &request)
            .await
            .unwrap();
        assert_eq!(response.status, RemoteRunStatus::Completed);
        assert_eq!(
            response.execution.node_states[&NodeId::from("n1")].status,
            NodeStatus::Completed
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_surfaces_engine_message() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/workflows/7/execute/")
            .with_status(500)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "no trigger node", "execution_id": "x"}"#)
            .create_async()
            .await;

        let err = engine(server.url())
            .execute_workflow(&RemoteWorkflowId::new("7"), &ExecutionRequest::default())
            .await
            .unwrap_err();
        assert_eq!(
            err.current_context(),
            &EngineError::Status {
                status: 500,
                message: "no trigger node".to_string()
            }
        );
    }

    #[tokio::test]
    async fn delete_accepts_empty_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/workflows/7/")
            .with_status(204)
            .create_async()
            .await;

        engine(server.url())
            .delete_workflow(&RemoteWorkflowId::new("7"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn validate_returns_report() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/workflows/validate/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"valid": false, "errors": ["Workflow must have at least one trigger node"], "warnings": []}"#)
            .create_async()
            .await;

        let report = engine(server.url()).validate_workflow(&[], &[]).await.unwrap();
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/workflows/")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = engine(server.url())
            .create_workflow(&submission())
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), EngineError::Decode { .. }));
    }

    #[test]
    fn error_message_falls_back_to_body() {
        assert_eq!(
            error_message("plain failure", reqwest::StatusCode::BAD_GATEWAY),
            "plain failure"
        );
        assert_eq!(
            error_message("", reqwest::StatusCode::BAD_GATEWAY),
            "Bad Gateway"
        );
    }
}
