// Lab backend HTTP client
//
// Wraps `reqwest::Client` with URL construction and FastAPI-style error
// unwrapping (`{"detail": "..."}` on non-2xx). Endpoint groups (ports, lab,
// tools) are implemented as inherent methods in separate files so this
// module stays focused on transport mechanics.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Error body shape used by the backend for HTTP errors.
#[derive(serde::Deserialize)]
struct ErrorDetail {
    detail: serde_json::Value,
}

/// Raw HTTP client for the lab backend.
///
/// Holds two `reqwest::Client`s: one for request/response calls (bounded by
/// the configured timeout) and one for the long-lived telemetry stream.
#[derive(Clone)]
pub struct LabClient {
    http: reqwest::Client,
    stream_http: reqwest::Client,
    base_url: Url,
}

impl LabClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the backend root, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let stream_http = transport.build_stream_client()?;
        Ok(Self {
            http,
            stream_http,
            base_url,
        })
    }

    /// Create a client around a pre-built `reqwest::Client`, used for both
    /// requests and the stream.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            stream_http: http.clone(),
            http,
            base_url,
        }
    }

    /// Convenience constructor from a URL string.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self::with_client(http, Url::parse(base_url)?))
    }

    /// The backend base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn stream_http(&self) -> &reqwest::Client {
        &self.stream_http
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build a full URL for a backend path, e.g. `links/status_ports`.
    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and decode the JSON body.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;

        parse_response(resp).await
    }

    /// Send a POST request with a JSON body and decode the JSON reply.
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_response(resp).await
    }
}

/// Map non-2xx statuses to `Error::Backend` (with the `detail` text when the
/// body carries one), then decode the body as `T`.
pub(crate) async fn parse_response<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, Error> {
    let status = resp.status();

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Backend {
            status: status.as_u16(),
            message: detail_message(&body),
        });
    }

    let body = resp.text().await.map_err(Error::Transport)?;

    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: body.clone(),
        }
    })
}

fn detail_message(body: &str) -> String {
    match serde_json::from_str::<ErrorDetail>(body) {
        Ok(ErrorDetail {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorDetail { detail }) => detail.to_string(),
        Err(_) if body.trim().is_empty() => "empty response body".into(),
        Err(_) => body.chars().take(200).collect(),
    }
}
