use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use prospector_core::{ListingRecord, Task};
use reqwest::header::CONTENT_TYPE;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::decode::decode_page;
use crate::{ListingExtractor, PageDocument, SessionError, WorkerContext, WorkerSession};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_bytes: u64,
    pub allowed_content_types: Vec<String>,
    pub user_agent: String,
    /// When set, listing URLs are rebuilt against this base instead of the
    /// marketplace host. Used to point a run at a mirror or a test server.
    pub base_url: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_bytes: 8 * 1024 * 1024,
            allowed_content_types: vec![
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
            ],
            user_agent: concat!("prospector/", env!("CARGO_PKG_VERSION")).to_string(),
            base_url: None,
        }
    }
}

/// Worker context that loads listing pages over HTTP.
///
/// `open` starts the page download in the background; readiness means the
/// body is fully downloaded and decoded. `close` aborts the download.
#[derive(Debug, Clone)]
pub struct HttpPageContext {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl HttpPageContext {
    pub fn new(settings: FetchSettings) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|err| SessionError::Create(err.to_string()))?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl WorkerContext for HttpPageContext {
    async fn open(&self, task: &Task) -> Result<Box<dyn WorkerSession>, SessionError> {
        let url = match &self.settings.base_url {
            Some(base) => format!("{}/dp/{}", base.trim_end_matches('/'), task.id),
            None => task.listing_url(),
        };
        let client = self.client.clone();
        let settings = self.settings.clone();
        let (tx, rx) = oneshot::channel();
        let fetch = tokio::spawn(async move {
            let _ = tx.send(load_page(&client, &settings, &url).await);
        });
        Ok(Box::new(HttpPageSession {
            fetch,
            ready_rx: Some(rx),
            document: None,
        }))
    }
}

struct HttpPageSession {
    fetch: JoinHandle<()>,
    ready_rx: Option<oneshot::Receiver<Result<PageDocument, SessionError>>>,
    document: Option<PageDocument>,
}

#[async_trait]
impl WorkerSession for HttpPageSession {
    async fn await_ready(&mut self) -> Result<(), SessionError> {
        let rx = self
            .ready_rx
            .take()
            .ok_or_else(|| SessionError::Extraction("readiness awaited twice".into()))?;
        match rx.await {
            Ok(Ok(document)) => {
                self.document = Some(document);
                Ok(())
            }
            Ok(Err(err)) => Err(err),
            // The fetch task was aborted by a forced close.
            Err(_) => Err(SessionError::Cancelled),
        }
    }

    async fn run(
        &mut self,
        extractor: &dyn ListingExtractor,
        cancel: &CancellationToken,
    ) -> Result<ListingRecord, SessionError> {
        let document = self
            .document
            .as_ref()
            .ok_or_else(|| SessionError::Extraction("page never became ready".into()))?;
        extractor
            .extract(document, cancel)
            .map_err(|fault| SessionError::Extraction(fault.to_string()))
    }

    fn close(&mut self) {
        self.fetch.abort();
        self.document = None;
    }
}

async fn load_page(
    client: &reqwest::Client,
    settings: &FetchSettings,
    url: &str,
) -> Result<PageDocument, SessionError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| SessionError::Extraction(format!("request failed: {err}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SessionError::Extraction(format!("http status {status}")));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());
    if let Some(ct) = content_type.as_deref() {
        if !is_content_type_allowed(settings, ct) {
            return Err(SessionError::Extraction(format!(
                "unsupported content type {ct}"
            )));
        }
    }

    if let Some(len) = response.content_length() {
        if len > settings.max_bytes {
            return Err(SessionError::Extraction(format!(
                "response too large ({len} bytes)"
            )));
        }
    }

    let final_url = response.url().to_string();
    let mut body: Vec<u8> = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk: bytes::Bytes =
            chunk.map_err(|err| SessionError::Extraction(format!("body read failed: {err}")))?;
        if body.len() as u64 + chunk.len() as u64 > settings.max_bytes {
            return Err(SessionError::Extraction("response too large".into()));
        }
        body.extend_from_slice(&chunk);
    }

    let decoded = decode_page(&body, content_type.as_deref())
        .map_err(|err| SessionError::Extraction(err.to_string()))?;
    Ok(PageDocument {
        url: final_url,
        html: decoded.text,
        encoding_label: decoded.encoding_label,
    })
}

fn is_content_type_allowed(settings: &FetchSettings, content_type: &str) -> bool {
    let ct = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim();
    settings
        .allowed_content_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(ct))
}
