use std::time::Duration;

use futures_util::StreamExt;
use harvest_core::PageCursor;
use harvest_logging::harvest_debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde_json::Value;
use url::Url;

use crate::decode::decode_text;
use crate::{EngineEvent, FetchError, FetchErrorKind, PageResult, Payload, RawPage};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_bytes: u64,
    /// Extra request headers, sent on every page request.
    pub headers: Vec<(String, String)>,
    pub user_agent: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            max_bytes: 5 * 1024 * 1024,
            headers: Vec::new(),
            user_agent: None,
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelProgressSink {
    tx: std::sync::mpsc::Sender<EngineEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: std::sync::mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Fetches one page of a paginated source.
///
/// Implementations must not retry; a failure ends the session with the items
/// gathered so far.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, cursor: &PageCursor) -> Result<PageResult, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// How page ordinals and continuation tokens map onto request URLs.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub base_url: String,
    /// Query parameter carrying the page number. `None` for token-only sources.
    pub page_param: Option<String>,
    /// Page number sent for ordinal 1.
    pub first_page_number: u32,
    /// Query parameter carrying the continuation token, when the source has one.
    pub token_param: Option<String>,
    /// JSON pointer to the next token in a JSON response. A response without
    /// one is the last page.
    pub next_token_pointer: Option<String>,
    /// Fixed query pairs sent with every page request.
    pub query: Vec<(String, String)>,
    pub format: ResponseFormat,
}

impl PageRequest {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            page_param: Some("page".to_string()),
            first_page_number: 1,
            token_param: None,
            next_token_pointer: None,
            query: Vec::new(),
            format: ResponseFormat::Text,
        }
    }

    pub fn json(mut self) -> Self {
        self.format = ResponseFormat::Json;
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn page_url(&self, cursor: &PageCursor) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| FetchError::new(FetchErrorKind::Network, format!("invalid url: {err}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.query {
                pairs.append_pair(name, value);
            }
            if let Some(param) = &self.page_param {
                let number = self.first_page_number + cursor.ordinal.saturating_sub(1);
                pairs.append_pair(param, &number.to_string());
            }
            if let (Some(param), Some(token)) = (&self.token_param, &cursor.token) {
                pairs.append_pair(param, token);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }
}

/// [`PageFetcher`] over HTTP GET. The client is built once and reused for
/// every page of the session.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
    request: PageRequest,
    max_bytes: u64,
}

impl HttpPageFetcher {
    pub fn new(request: PageRequest, settings: FetchSettings) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &settings.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                FetchError::new(FetchErrorKind::Network, format!("invalid header {name}: {err}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|err| {
                FetchError::new(FetchErrorKind::Network, format!("invalid header value: {err}"))
            })?;
            headers.insert(name, value);
        }
        if let Some(agent) = &settings.user_agent {
            let value = HeaderValue::from_str(agent).map_err(|err| {
                FetchError::new(FetchErrorKind::Network, format!("invalid user agent: {err}"))
            })?;
            headers.insert(USER_AGENT, value);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| FetchError::new(FetchErrorKind::Network, err.to_string()))?;

        Ok(Self {
            client,
            request,
            max_bytes: settings.max_bytes,
        })
    }

    fn build_result(
        &self,
        source: String,
        content_type: Option<String>,
        bytes: &[u8],
    ) -> Result<PageResult, FetchError> {
        let decoded = decode_text(bytes, content_type.as_deref())
            .map_err(|err| FetchError::new(FetchErrorKind::Decode, err.to_string()))?;

        match self.request.format {
            ResponseFormat::Text => Ok(PageResult::new(RawPage {
                source,
                content_type,
                body: Payload::Text(decoded.text),
            })),
            ResponseFormat::Json => {
                let value: Value = serde_json::from_str(&decoded.text).map_err(|err| {
                    FetchError::new(FetchErrorKind::Decode, format!("invalid json: {err}"))
                })?;
                let next_token = self
                    .request
                    .next_token_pointer
                    .as_deref()
                    .map(|pointer| value.pointer(pointer).and_then(token_text));
                Ok(PageResult {
                    raw: RawPage {
                        source,
                        content_type,
                        body: Payload::Json(value),
                    },
                    is_last: matches!(next_token, Some(None)),
                    next_token: next_token.flatten(),
                })
            }
        }
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, cursor: &PageCursor) -> Result<PageResult, FetchError> {
        let url = self.request.page_url(cursor)?;
        harvest_debug!("GET {} (page {})", url, cursor.ordinal);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(
                FetchError::new(FetchErrorKind::RateLimited, status.to_string())
                    .with_status(status.as_u16()),
            );
        }
        if !status.is_success() {
            return Err(FetchError::new(FetchErrorKind::Network, status.to_string())
                .with_status(status.as_u16()));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(too_large(self.max_bytes, length));
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.max_bytes {
                return Err(too_large(self.max_bytes, next_len));
            }
            bytes.extend_from_slice(&chunk);
        }

        self.build_result(url.to_string(), content_type, &bytes)
    }
}

fn token_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn too_large(max_bytes: u64, actual: u64) -> FetchError {
    FetchError::new(
        FetchErrorKind::Network,
        format!("response too large: {actual} bytes exceeds {max_bytes}"),
    )
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FetchErrorKind::Network, format!("timed out: {err}"));
    }
    let error = FetchError::new(FetchErrorKind::Network, err.to_string());
    match err.status() {
        Some(status) => error.with_status(status.as_u16()),
        None => error,
    }
}
