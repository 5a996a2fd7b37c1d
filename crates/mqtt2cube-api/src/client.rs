// Open API HTTP client
//
// Wraps `reqwest::Client` with hub URL construction, bearer-token
// attachment, envelope unwrapping and event-response classification.
// Endpoint groups (devices, events, auth) live in their own files as
// inherent methods so this module stays focused on transport mechanics.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{EventResponse, HubResponse};
use crate::transport::TransportConfig;

/// Event description the hub returns when the bearer token was revoked.
pub const AUTH_INVALID_DESCRIPTION: &str = "headers.Authorization is invalid";

/// Raw HTTP client for the hub's open API.
///
/// Stateless with respect to credentials: every call takes the token it
/// should present, so token lifecycle stays with the caller.
#[derive(Clone)]
pub struct HubClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HubClient {
    /// Create a client for `base_url` (e.g. `http://ihost/open-api/v1/rest`).
    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, normalize_base(base_url)?))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// Convenience for tests and callers that hold a string URL.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self::with_client(http, normalize_base(base_url)?))
    }

    /// The open-API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/{path}`
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn authorize(
        builder: reqwest::RequestBuilder,
        token: Option<&SecretString>,
    ) -> reqwest::RequestBuilder {
        match token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Send a GET request and unwrap the `{error, data, message}` envelope.
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        token: Option<&SecretString>,
    ) -> Result<Option<T>, Error> {
        debug!("GET {}", url);

        let resp = Self::authorize(self.http.get(url), token)
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_envelope(resp).await
    }

    /// Send a DELETE request and unwrap the envelope.
    pub(crate) async fn delete<T: DeserializeOwned>(
        &self,
        url: Url,
        token: Option<&SecretString>,
    ) -> Result<Option<T>, Error> {
        debug!("DELETE {}", url);

        let resp = Self::authorize(self.http.delete(url), token)
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_envelope(resp).await
    }

    /// POST a third-party event and classify the hub's answer.
    pub(crate) async fn post_event(
        &self,
        body: &impl Serialize,
        token: &SecretString,
    ) -> Result<EventResponse, Error> {
        let url = self.api_url("thirdparty/event")?;
        debug!("POST {}", url);

        let resp = Self::authorize(self.http.post(url), Some(token))
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_event_response(resp).await
    }
}

/// Parse a base URL and make sure it ends with `/` so `join` appends.
fn normalize_base(raw: &str) -> Result<Url, Error> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn read_body(resp: reqwest::Response) -> Result<String, Error> {
    if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::Authentication {
            message: "token rejected by hub".into(),
        });
    }
    resp.text().await.map_err(Error::Transport)
}

/// Unwrap `{ error, data, message }`: `0` is success, `400`/`401` mean the
/// token is bad, anything else is surfaced as [`Error::Hub`].
async fn parse_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<Option<T>, Error> {
    let body = read_body(resp).await?;

    let envelope: HubResponse<T> =
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: body.clone(),
        })?;

    match envelope.error {
        0 => Ok(envelope.data),
        400 | 401 => Err(Error::Authentication {
            message: envelope
                .message
                .unwrap_or_else(|| format!("error={}", envelope.error)),
        }),
        code => Err(Error::Hub {
            code,
            message: envelope.message.unwrap_or_default(),
        }),
    }
}

async fn parse_event_response(resp: reqwest::Response) -> Result<EventResponse, Error> {
    let body = read_body(resp).await?;

    let parsed: EventResponse =
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: body.clone(),
        })?;

    classify_event_response(parsed)
}

/// Turn an `ErrorResponse` into the matching [`Error`] variant.
pub(crate) fn classify_event_response(resp: EventResponse) -> Result<EventResponse, Error> {
    if !resp.is_error() {
        return Ok(resp);
    }

    let kind = resp.payload.kind.clone().unwrap_or_default();
    let description = resp.payload.description.clone().unwrap_or_default();

    if description == AUTH_INVALID_DESCRIPTION || kind == "AUTH_FAILURE" {
        return Err(Error::Authentication {
            message: description,
        });
    }
    if kind == "INVALID_PARAMETERS" {
        return Err(Error::InvalidParameters { description });
    }
    Err(Error::EventRejected { kind, description })
}
