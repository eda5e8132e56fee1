use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::Deserialize;

use collector_core::config::SyncConfig;
use collector_core::error::SynchronizationError;
use collector_core::executor::PartialDatasets;
use collector_core::storage::RecordKind;
use collector_core::sync::{JobSource, SynchronizationClient, SynchronizationJob};

use super::retry::{FixedDelayRetry, RetryPolicy};

const BODY_PREVIEW_LIMIT: usize = 512;
const ACCOUNT_HEADER: &str = "JupiterOne-Account";

/// Structured error code the server uses for a missing integration instance.
pub const INSTANCE_NOT_FOUND_CODE: &str = "INTEGRATION_INSTANCE_NOT_FOUND";

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ServerError,
}

#[derive(Deserialize)]
struct ServerError {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct JobEnvelope {
    job: SynchronizationJob,
}

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut out = String::new();
    let mut truncated = false;
    for (idx, ch) in trimmed.chars().enumerate() {
        if idx >= BODY_PREVIEW_LIMIT {
            truncated = true;
            break;
        }
        out.push(ch);
    }

    if truncated {
        out.push_str("...");
    }

    out
}

/// Map a non-success response to an error.
///
/// A `{"error": {"code", "message"}}` body is a structured server error;
/// anything else keeps the raw status.
fn classify_status(status: u16, url: &str, body: &str) -> SynchronizationError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: ServerError { code, message },
        }) => {
            if code == INSTANCE_NOT_FOUND_CODE {
                SynchronizationError::InstanceNotFound { code, message }
            } else {
                SynchronizationError::Server { code, message }
            }
        }
        Err(_) => SynchronizationError::Status {
            status,
            url: url.to_string(),
            body: preview_body(body),
        },
    }
}

fn transport_error(err: reqwest::Error, url: &str) -> SynchronizationError {
    SynchronizationError::Transport {
        url: url.to_string(),
        message: err.to_string(),
    }
}

fn decode_job(url: &str, body: &str) -> Result<SynchronizationJob, SynchronizationError> {
    serde_json::from_str::<JobEnvelope>(body)
        .map(|envelope| envelope.job)
        .or_else(|_| serde_json::from_str::<SynchronizationJob>(body))
        .map_err(|err| SynchronizationError::Decode {
            url: url.to_string(),
            message: format!("{} | body={}", err, preview_body(body)),
        })
}

fn json_body(value: &serde_json::Value) -> Bytes {
    Bytes::from(value.to_string())
}

/// Synchronization job API over HTTP.
#[derive(Clone)]
pub struct HttpSynchronizationClient {
    api_key: String,
    account_id: String,
    http: reqwest::Client,
    retry: Arc<dyn RetryPolicy>,
    poll_interval: Duration,
    poll_timeout: Duration,
    // Pre-built so each request only appends the job path
    url_jobs: String,
}

impl HttpSynchronizationClient {
    pub fn new(base_url: &str, api_key: String, timeout_ms: u64) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        let normalized = base_url.trim_end_matches('/');
        Ok(Self {
            api_key,
            account_id: String::new(),
            http,
            retry: Arc::new(FixedDelayRetry::none()),
            poll_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(300),
            url_jobs: format!("{}/persister/synchronization/jobs", normalized),
        })
    }

    pub fn from_config(cfg: &SyncConfig) -> anyhow::Result<Self> {
        Ok(Self::new(&cfg.base_url, cfg.api_key.clone(), cfg.timeout_ms)?
            .with_account_id(cfg.account_id.clone())
            .with_retry(FixedDelayRetry::from_config(&cfg.retry))
            .with_polling(
                Duration::from_millis(cfg.poll_interval_ms),
                Duration::from_millis(cfg.poll_timeout_ms),
            ))
    }

    pub fn with_account_id(mut self, account_id: String) -> Self {
        self.account_id = account_id;
        self
    }

    pub fn with_retry(mut self, retry: impl RetryPolicy + 'static) -> Self {
        self.retry = Arc::new(retry);
        self
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    fn job_url(&self, job_id: &str, action: Option<&str>) -> String {
        match action {
            Some(action) => format!("{}/{}/{}", self.url_jobs, job_id, action),
            None => format!("{}/{}", self.url_jobs, job_id),
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = if self.api_key.trim().is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        };
        if self.account_id.trim().is_empty() {
            req
        } else {
            req.header(ACCOUNT_HEADER, &self.account_id)
        }
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<Bytes>,
    ) -> Result<String, SynchronizationError> {
        let mut req = self.http.request(method, url);
        if let Some(body) = body {
            req = req.header(CONTENT_TYPE, "application/json").body(body);
        }

        let resp = self
            .authorize(req)
            .send()
            .await
            .map_err(|err| transport_error(err, url))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|err| transport_error(err, url))?;

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), url, &text));
        }
        Ok(text)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Bytes>,
    ) -> Result<String, SynchronizationError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match self.send_once(method.clone(), url, body.clone()).await {
                Ok(text) => return Ok(text),
                Err(err) => err,
            };

            match self.retry.next_delay(attempts, &err) {
                Some(delay) => {
                    tracing::warn!(
                        target: "collector.sync",
                        url = %url,
                        attempt = attempts,
                        max_attempts = self.retry.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err),
            }
        }
    }

    /// Poll the job until the server reports FINISHED or ABORTED.
    pub async fn wait_for_completion(
        &self,
        job: &SynchronizationJob,
    ) -> Result<SynchronizationJob, SynchronizationError> {
        let deadline = tokio::time::Instant::now() + self.poll_timeout;
        loop {
            let current = self.get_job(&job.id).await?;
            if current.status.is_terminal() {
                return Ok(current);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SynchronizationError::Timeout {
                    job_id: job.id.clone(),
                });
            }
            tracing::debug!(
                target: "collector.sync",
                job_id = %job.id,
                status = %current.status,
                "waiting for job to finish"
            );
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl SynchronizationClient for HttpSynchronizationClient {
    async fn initiate(&self, source: &JobSource) -> Result<SynchronizationJob, SynchronizationError> {
        let url = &self.url_jobs;
        tracing::debug!(target: "collector.sync", stage = "sync.initiate.in", url = %url, source = ?source);
        let body = json_body(&source.to_request_body());
        let text = self.send(Method::POST, url, Some(body)).await?;
        let job = decode_job(url, &text)?;
        tracing::info!(target: "collector.sync", job_id = %job.id, status = %job.status, "synchronization job created");
        Ok(job)
    }

    async fn upload_batch(
        &self,
        job: &SynchronizationJob,
        kind: RecordKind,
        body: Vec<u8>,
    ) -> Result<(), SynchronizationError> {
        let url = self.job_url(&job.id, Some(kind.as_str()));
        tracing::debug!(
            target: "collector.sync",
            stage = "sync.upload.in",
            url = %url,
            kind = %kind,
            bytes = body.len()
        );
        self.send(Method::POST, &url, Some(Bytes::from(body))).await?;
        Ok(())
    }

    async fn finalize(
        &self,
        job: &SynchronizationJob,
        partial_datasets: &PartialDatasets,
    ) -> Result<SynchronizationJob, SynchronizationError> {
        let url = self.job_url(&job.id, Some("finalize"));
        tracing::debug!(
            target: "collector.sync",
            stage = "sync.finalize.in",
            url = %url,
            partial_types = partial_datasets.types.len()
        );
        let body = json_body(&serde_json::json!({ "partialDatasets": partial_datasets }));
        let text = self.send(Method::POST, &url, Some(body)).await?;
        decode_job(&url, &text)
    }

    async fn abort(
        &self,
        job: &SynchronizationJob,
        reason: &str,
    ) -> Result<SynchronizationJob, SynchronizationError> {
        let url = self.job_url(&job.id, Some("abort"));
        tracing::debug!(target: "collector.sync", stage = "sync.abort.in", url = %url, reason = %reason);
        let body = json_body(&serde_json::json!({ "reason": reason }));
        let text = self.send(Method::POST, &url, Some(body)).await?;
        decode_job(&url, &text)
    }

    async fn get_job(&self, job_id: &str) -> Result<SynchronizationJob, SynchronizationError> {
        let url = self.job_url(job_id, None);
        let text = self.send(Method::GET, &url, None).await?;
        decode_job(&url, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collector_core::sync::JobStatus;
    use mockito::{Matcher, Server};

    const JOBS: &str = "/persister/synchronization/jobs";

    fn job_body(id: &str, status: &str) -> String {
        serde_json::json!({ "job": { "id": id, "status": status } }).to_string()
    }

    fn job(id: &str) -> SynchronizationJob {
        SynchronizationJob {
            id: id.to_string(),
            status: JobStatus::AwaitingUploads,
            integration_instance_id: None,
            scope: None,
            num_entities_uploaded: 0,
            num_relationships_uploaded: 0,
            started_on: None,
        }
    }

    fn client(url: &str) -> HttpSynchronizationClient {
        HttpSynchronizationClient::new(url, "".to_string(), 1_000).unwrap()
    }

    #[test]
    fn preview_truncates_long_bodies() {
        let body = "x".repeat(BODY_PREVIEW_LIMIT + 10);
        let preview = preview_body(&body);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.len(), BODY_PREVIEW_LIMIT + 3);
        assert_eq!(preview_body("  "), "<empty body>");
    }

    #[tokio::test]
    async fn initiate_creates_a_job() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", JOBS)
            .match_body(Matcher::PartialJson(serde_json::json!({
                "source": "integration-managed",
                "integrationInstanceId": "inst-1"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(job_body("job-1", "AWAITING_UPLOADS"))
            .create_async()
            .await;

        let job = client(&server.url())
            .initiate(&JobSource::IntegrationInstance("inst-1".to_string()))
            .await
            .unwrap();

        assert_eq!(job.id, "job-1");
        assert_eq!(job.status, JobStatus::AwaitingUploads);
        m.assert_async().await;
    }

    #[tokio::test]
    async fn instance_not_found_is_typed() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", JOBS)
            .with_status(404)
            .with_body(
                r#"{"error":{"code":"INTEGRATION_INSTANCE_NOT_FOUND","message":"no such instance"}}"#,
            )
            .create_async()
            .await;

        let err = client(&server.url())
            .initiate(&JobSource::IntegrationInstance("missing".to_string()))
            .await
            .unwrap_err();

        match err {
            SynchronizationError::InstanceNotFound { code, message } => {
                assert_eq!(code, INSTANCE_NOT_FOUND_CODE);
                assert_eq!(message, "no such instance");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn structured_errors_are_classified_and_not_retried() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", JOBS)
            .with_status(500)
            .with_body(r#"{"error":{"code":"INTERNAL","message":"broken"}}"#)
            .expect(1)
            .create_async()
            .await;

        let err = client(&server.url())
            .with_retry(FixedDelayRetry::new(3, Duration::ZERO))
            .initiate(&JobSource::Api {
                scope: "s".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SynchronizationError::Server { ref code, .. } if code == "INTERNAL"));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn unavailable_server_is_retried_until_attempts_run_out() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", JOBS)
            .with_status(503)
            .with_body("unavailable")
            .expect(3)
            .create_async()
            .await;

        let err = client(&server.url())
            .with_retry(FixedDelayRetry::new(3, Duration::ZERO))
            .initiate(&JobSource::Api {
                scope: "s".to_string(),
            })
            .await
            .unwrap_err();

        match err {
            SynchronizationError::Status { status, url, body } => {
                assert_eq!(status, 503);
                assert!(url.contains(JOBS));
                assert_eq!(body, "unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }
        m.assert_async().await;
    }

    #[tokio::test]
    async fn upload_posts_the_batch_verbatim() {
        let mut server = Server::new_async().await;
        let batch = r#"{"entities":[{"_key":"u1","_type":"acme_user","_class":"User"}]}"#;
        let m = server
            .mock("POST", "/persister/synchronization/jobs/job-1/entities")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Exact(batch.to_string()))
            .with_status(200)
            .create_async()
            .await;

        client(&server.url())
            .upload_batch(&job("job-1"), RecordKind::Entities, batch.as_bytes().to_vec())
            .await
            .unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn finalize_sends_partial_datasets() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/persister/synchronization/jobs/job-1/finalize")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "partialDatasets": { "types": ["acme_device"] }
            })))
            .with_status(200)
            .with_body(job_body("job-1", "FINALIZE_PENDING"))
            .create_async()
            .await;

        let partial = PartialDatasets {
            types: vec!["acme_device".to_string()],
        };
        let job = client(&server.url())
            .finalize(&job("job-1"), &partial)
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::FinalizePending);
    }

    #[tokio::test]
    async fn abort_sends_reason() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/persister/synchronization/jobs/job-1/abort")
            .match_body(Matcher::PartialJson(serde_json::json!({ "reason": "step failed" })))
            .with_status(200)
            .with_body(job_body("job-1", "ABORTED"))
            .create_async()
            .await;

        let job = client(&server.url())
            .abort(&job("job-1"), "step failed")
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Aborted);
    }

    #[tokio::test]
    async fn auth_and_account_headers_are_sent_when_configured() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/persister/synchronization/jobs/job-1")
            .match_header("authorization", "Bearer secret-token")
            .match_header("jupiterone-account", "acct-1")
            .with_status(200)
            .with_body(job_body("job-1", "FINISHED"))
            .create_async()
            .await;

        let client = HttpSynchronizationClient::new(&server.url(), "secret-token".to_string(), 1_000)
            .unwrap()
            .with_account_id("acct-1".to_string());
        let job = client.get_job("job-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Finished);
        m.assert_async().await;
    }

    #[tokio::test]
    async fn auth_header_absent_when_api_key_empty() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/persister/synchronization/jobs/job-1")
            .match_header("authorization", Matcher::Missing)
            .match_header("jupiterone-account", Matcher::Missing)
            .with_status(200)
            .with_body(job_body("job-1", "FINISHED"))
            .create_async()
            .await;

        client(&server.url()).get_job("job-1").await.unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn undecodable_job_is_a_decode_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/persister/synchronization/jobs/job-1")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client(&server.url()).get_job("job-1").await.unwrap_err();
        assert!(matches!(err, SynchronizationError::Decode { .. }));
    }

    #[tokio::test]
    async fn wait_for_completion_returns_terminal_job() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/persister/synchronization/jobs/job-1")
            .with_status(200)
            .with_body(job_body("job-1", "FINISHED"))
            .create_async()
            .await;

        let done = client(&server.url())
            .wait_for_completion(&job("job-1"))
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Finished);
    }

    #[tokio::test]
    async fn wait_for_completion_times_out() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/persister/synchronization/jobs/job-1")
            .with_status(200)
            .with_body(job_body("job-1", "FINALIZING_ENTITIES"))
            .create_async()
            .await;

        let err = client(&server.url())
            .with_polling(Duration::from_millis(5), Duration::from_millis(20))
            .wait_for_completion(&job("job-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SynchronizationError::Timeout { ref job_id } if job_id == "job-1"));
    }
}
