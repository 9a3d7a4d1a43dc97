use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::{
    domain::{ArtifactFormat, SessionId},
    error::ErrorBody,
    protocol::{
        ConfirmCategoriesRequest, FinalStatus, ProgressSnapshot, ReportData, SessionInfo,
        SetColumnRequest, StartClassifyResponse, SuggestResponse, UploadResponse,
    },
};
use shared::protocol::CategoryPayload;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use url::Url;

use crate::error::WorkflowError;

/// Stream of progress reports from the push-based delivery mechanism.
pub type ProgressStream =
    Pin<Box<dyn Stream<Item = Result<ProgressSnapshot, WorkflowError>> + Send>>;

/// Everything the workflow needs from the backend. File parsing, category
/// suggestion, classification, and report rendering all live behind this
/// seam; tests substitute a scripted implementation.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn upload_file(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadResponse, WorkflowError>;

    async fn set_verbatim_column(
        &self,
        session: &SessionId,
        column: &str,
    ) -> Result<(), WorkflowError>;

    async fn session_info(&self, session: &SessionId) -> Result<SessionInfo, WorkflowError>;

    async fn suggest_categories(
        &self,
        session: &SessionId,
    ) -> Result<SuggestResponse, WorkflowError>;

    async fn confirm_categories(
        &self,
        session: &SessionId,
        categories: &[CategoryPayload],
    ) -> Result<(), WorkflowError>;

    async fn start_classification(
        &self,
        session: &SessionId,
    ) -> Result<StartClassifyResponse, WorkflowError>;

    async fn poll_progress(&self, session: &SessionId)
        -> Result<ProgressSnapshot, WorkflowError>;

    async fn subscribe_progress(
        &self,
        session: &SessionId,
    ) -> Result<ProgressStream, WorkflowError>;

    async fn final_status(&self, session: &SessionId) -> Result<FinalStatus, WorkflowError>;

    async fn fetch_report(&self, session: &SessionId) -> Result<ReportData, WorkflowError>;

    async fn download_artifact(
        &self,
        session: &SessionId,
        format: ArtifactFormat,
        chart_png: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, WorkflowError>;
}

/// `BackendApi` over plain HTTP, one route per operation.
pub struct HttpBackend {
    http: Client,
    server_url: String,
}

impl HttpBackend {
    pub fn new(server_url: impl AsRef<str>) -> Result<Self, WorkflowError> {
        let parsed = Url::parse(server_url.as_ref())
            .map_err(|err| WorkflowError::transport(format!("invalid server url: {err}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(WorkflowError::transport(
                "server url must start with http:// or https://",
            ));
        }
        Ok(Self {
            http: Client::new(),
            server_url: server_url.as_ref().trim_end_matches('/').to_string(),
        })
    }

    fn session_url(&self, session: &SessionId, suffix: &str) -> String {
        if suffix.is_empty() {
            format!("{}/sessions/{}", self.server_url, session)
        } else {
            format!("{}/sessions/{}/{}", self.server_url, session, suffix)
        }
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, WorkflowError> {
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|err| WorkflowError::transport(format!("invalid response body: {err}")))
    }

    /// Surfaces the backend's `{"error": ...}` message verbatim; anything
    /// without that body falls back to the bare status code.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, WorkflowError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => format!("request failed with status {status}"),
        };
        Err(WorkflowError::Transport(message))
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn upload_file(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadResponse, WorkflowError> {
        let form = Form::new().part("file", Part::bytes(bytes).file_name(filename.to_string()));
        let response = self
            .http
            .post(format!("{}/upload", self.server_url))
            .multipart(form)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn set_verbatim_column(
        &self,
        session: &SessionId,
        column: &str,
    ) -> Result<(), WorkflowError> {
        let response = self
            .http
            .post(self.session_url(session, "column"))
            .json(&SetColumnRequest {
                column: column.to_string(),
            })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn session_info(&self, session: &SessionId) -> Result<SessionInfo, WorkflowError> {
        let response = self.http.get(self.session_url(session, "")).send().await?;
        Self::decode(response).await
    }

    async fn suggest_categories(
        &self,
        session: &SessionId,
    ) -> Result<SuggestResponse, WorkflowError> {
        let response = self
            .http
            .post(self.session_url(session, "suggest"))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn confirm_categories(
        &self,
        session: &SessionId,
        categories: &[CategoryPayload],
    ) -> Result<(), WorkflowError> {
        let response = self
            .http
            .post(self.session_url(session, "categories"))
            .json(&ConfirmCategoriesRequest {
                categories: categories.to_vec(),
            })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn start_classification(
        &self,
        session: &SessionId,
    ) -> Result<StartClassifyResponse, WorkflowError> {
        let response = self
            .http
            .post(self.session_url(session, "classify"))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn poll_progress(
        &self,
        session: &SessionId,
    ) -> Result<ProgressSnapshot, WorkflowError> {
        let response = self
            .http
            .get(self.session_url(session, "classify/progress"))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn subscribe_progress(
        &self,
        session: &SessionId,
    ) -> Result<ProgressStream, WorkflowError> {
        let response = self
            .http
            .get(self.session_url(session, "classify/stream"))
            .send()
            .await?;
        let response = Self::check(response).await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut buffer = String::new();
            loop {
                // A dropped receiver must tear the connection down even
                // while the feed is quiet, not on the next send.
                let chunk = tokio::select! {
                    chunk = body.next() => chunk,
                    _ = tx.closed() => return,
                };
                let chunk = match chunk {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(err)) => {
                        let _ = tx.send(Err(WorkflowError::from(err))).await;
                        return;
                    }
                    None => return,
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk).replace('\r', ""));

                // SSE frames are blank-line separated; each carries one or
                // more `data:` lines holding a full progress snapshot.
                while let Some(end) = buffer.find("\n\n") {
                    let frame: String = buffer.drain(..end + 2).collect();
                    for line in frame.lines() {
                        let Some(data) = line.strip_prefix("data:") else {
                            continue;
                        };
                        match serde_json::from_str::<ProgressSnapshot>(data.trim()) {
                            Ok(snapshot) => {
                                if tx.send(Ok(snapshot)).await.is_err() {
                                    return;
                                }
                            }
                            Err(err) => {
                                warn!("progress stream carried invalid payload: {err}");
                                let _ = tx
                                    .send(Err(WorkflowError::transport(format!(
                                        "invalid progress event: {err}"
                                    ))))
                                    .await;
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn final_status(&self, session: &SessionId) -> Result<FinalStatus, WorkflowError> {
        let response = self
            .http
            .get(self.session_url(session, "classify/status"))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn fetch_report(&self, session: &SessionId) -> Result<ReportData, WorkflowError> {
        let response = self
            .http
            .get(self.session_url(session, "report"))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn download_artifact(
        &self,
        session: &SessionId,
        format: ArtifactFormat,
        chart_png: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, WorkflowError> {
        let url = self.session_url(session, &format!("download/{}", format.as_str()));
        // The PDF renderer accepts an optional pre-rendered chart image.
        let request = match chart_png {
            Some(chart) if format == ArtifactFormat::Pdf => self
                .http
                .post(url)
                .multipart(Form::new().part("chart", Part::bytes(chart).file_name("chart.png"))),
            _ => self.http.get(url),
        };
        let response = Self::check(request.send().await?).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
