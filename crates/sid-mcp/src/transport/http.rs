//! Streamable HTTP Transport
//!
//! Each JSON-RPC message is POSTed to the tool host URL. The reply is
//! either a plain JSON body or an SSE stream whose `data:` events carry the
//! response.

use super::Transport;
use crate::auth::{StaticToken, TokenSource};
use crate::protocol::{Incoming, McpNotification, McpRequest, McpResponse};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use sid_core::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

pub const SESSION_HEADER: &str = "mcp-session-id";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP transport for remote tool hosts
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    token_source: Option<Arc<dyn TokenSource>>,
    session_id: RwLock<Option<String>>,
    closed: AtomicBool,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_BOTH));

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::connection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            token_source: None,
            session_id: RwLock::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Ask `source` for a bearer token before every request.
    pub fn with_token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(source);
        self
    }

    pub fn with_bearer(self, token: impl Into<String>) -> Self {
        self.with_token_source(Arc::new(StaticToken::new(token)))
    }

    async fn authorize(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        match &self.token_source {
            Some(source) => Ok(builder.bearer_auth(source.token().await?)),
            None => Ok(builder),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().ok().and_then(|s| s.clone())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::transport("tool host session is closed"));
        }
        Ok(())
    }

    /// POST one message; returns the response body and whether it is SSE.
    async fn post<T: Serialize + ?Sized>(&self, message: &T) -> Result<Option<(String, bool)>> {
        let mut builder = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .json(message);
        if let Some(session) = self.session_id() {
            builder = builder.header(SESSION_HEADER, session);
        }
        let builder = self.authorize(builder).await?;

        let response = builder
            .send()
            .await
            .map_err(|e| Error::transport(format!("POST {} failed: {}", self.url, e)))?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if let Ok(mut slot) = self.session_id.write() {
                if slot.as_deref() != Some(session) {
                    debug!(session = %session, "Tool host assigned session");
                    *slot = Some(session.to_string());
                }
            }
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::transport(format!(
                "tool host returned {}: {}",
                status, body
            )));
        }
        if status == reqwest::StatusCode::ACCEPTED {
            return Ok(None);
        }

        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false);
        let body = response
            .text()
            .await
            .map_err(|e| Error::transport(format!("reading tool host reply failed: {}", e)))?;

        Ok(Some((body, is_sse)))
    }
}

/// Find the response with `id` among the events of an SSE body.
pub fn parse_sse_response(body: &str, id: &Value) -> Result<McpResponse> {
    let mut data = String::new();
    let mut events = Vec::new();

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            if !data.is_empty() {
                events.push(std::mem::take(&mut data));
            }
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if !data.is_empty() {
        events.push(data);
    }

    for event in events {
        match Incoming::parse(&event) {
            Ok(Incoming::Response(response)) if &response.id == id => return Ok(response),
            Ok(other) => debug!(message = ?other, "Skipping SSE event"),
            Err(e) => warn!(error = %e, "Unparseable SSE event"),
        }
    }

    Err(Error::transport(format!(
        "event stream ended without a response to request {}",
        id
    )))
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: McpRequest) -> Result<McpResponse> {
        self.ensure_open()?;
        debug!(method = %request.method, id = %request.id, "POST to tool host");

        let (body, is_sse) = self.post(&request).await?.ok_or_else(|| {
            Error::transport(format!("tool host sent no body for {}", request.method))
        })?;

        if is_sse {
            parse_sse_response(&body, &request.id)
        } else {
            serde_json::from_str(&body)
                .map_err(|e| Error::transport(format!("invalid JSON-RPC reply: {}", e)))
        }
    }

    async fn notify(&self, notification: McpNotification) -> Result<()> {
        self.ensure_open()?;
        self.post(&notification).await.map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let session = self.session_id.write().ok().and_then(|mut s| s.take());
        if let Some(session) = session {
            debug!(session = %session, "Ending tool host session");
            let request = self.client.delete(&self.url).header(SESSION_HEADER, session);
            let result = match self.authorize(request).await {
                Ok(request) => request
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| Error::transport(e.to_string())),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(error = %e, "Failed to end tool host session");
            }
        }
        Ok(())
    }
}
