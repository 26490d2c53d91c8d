//! Report workflow client
//!
//! The workflow accepts the submitted form as JSON and answers with either
//! JSON or plain text. The body is classified once, here, into
//! [`WorkflowOutput`]; nothing downstream re-parses it.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The workflow answered with a non-2xx status
    #[error("Workflow returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Workflow request failed: {0}")]
    Transport(String),

    #[error("Workflow request timed out")]
    Timeout,
}

impl WorkflowError {
    /// Detail stored on the failed report
    pub fn detail(&self) -> String {
        match self {
            WorkflowError::Status { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for WorkflowError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            WorkflowError::Timeout
        } else {
            WorkflowError::Transport(e.to_string())
        }
    }
}

/// Successful workflow response
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutput {
    Structured(Value),
    Raw(String),
}

impl WorkflowOutput {
    pub fn decode(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => WorkflowOutput::Structured(value),
            Err(_) => WorkflowOutput::Raw(body.to_string()),
        }
    }

    /// JSON form of the result; raw text is wrapped as
    /// `{"result": text, "success": true}`
    pub fn into_value(self) -> Value {
        match self {
            WorkflowOutput::Structured(value) => value,
            WorkflowOutput::Raw(text) => json!({ "result": text, "success": true }),
        }
    }
}

#[derive(Clone)]
pub struct WorkflowClient {
    client: Client,
    url: String,
    api_key: String,
}

impl WorkflowClient {
    pub fn new(url: &str, api_key: &str, timeout: Duration) -> Result<Self, WorkflowError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WorkflowError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// POST the form payload to the workflow. No retries.
    pub async fn run(&self, form_data: &Value) -> Result<WorkflowOutput, WorkflowError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(form_data)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!(status = %status, "Workflow call failed");
            return Err(WorkflowError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(WorkflowOutput::decode(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn client(server: &mockito::Server) -> WorkflowClient {
        WorkflowClient::new(
            &format!("{}/run", server.url()),
            "wf-key",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_json_body_is_structured() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/run")
            .match_header("authorization", "Bearer wf-key")
            .match_body(mockito::Matcher::Json(json!({ "company": "Acme" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"summary":"ok"}"#)
            .create_async()
            .await;

        let output = client(&server)
            .run(&json!({ "company": "Acme" }))
            .await
            .unwrap();

        assert_eq!(output, WorkflowOutput::Structured(json!({ "summary": "ok" })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_plain_text_body_is_wrapped() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/run")
            .with_status(200)
            .with_body("# Report\nAll good")
            .create_async()
            .await;

        let output = client(&server).run(&json!({})).await.unwrap();
        assert_eq!(output, WorkflowOutput::Raw("# Report\nAll good".to_string()));
        assert_eq!(
            output.into_value(),
            json!({ "result": "# Report\nAll good", "success": true })
        );
    }

    #[tokio::test]
    async fn test_non_success_status_carries_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/run")
            .with_status(500)
            .with_body("server error")
            .create_async()
            .await;

        let err = client(&server).run(&json!({})).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Status { status: 500, .. }));
        assert_eq!(err.detail(), "server error");
    }

    #[tokio::test]
    async fn test_slow_workflow_times_out() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/run")
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_millis(1500));
                w.write_all(br#"{"summary":"late"}"#)
            })
            .create_async()
            .await;

        let client = WorkflowClient::new(
            &format!("{}/run", server.url()),
            "wf-key",
            Duration::from_millis(200),
        )
        .unwrap();

        let err = client.run(&json!({})).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Timeout), "got {:?}", err);
        assert_eq!(err.detail(), "Workflow request timed out");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let client =
            WorkflowClient::new("http://127.0.0.1:9/run", "wf-key", Duration::from_secs(2))
                .unwrap();
        let err = client.run(&json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Transport(_) | WorkflowError::Timeout
        ));
    }
}
