//! Turning a method, a URI and an optional JSON body into something a transport can send.
//!
//! Everything here happens before the first attempt: a URI with an unsupported scheme or a body
//! that cannot be serialized fails right away and never touches the retry budget.

use crate::config::ClientConfig;
use crate::error::RequestError;
use percent_encoding::percent_decode_str;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Content type used for both directions.
pub const APPLICATION_JSON: &str = "application/json";

/// Which transport carries the request, chosen by URI scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `http://`
    Plain,
    /// `https://`
    Tls,
}

impl Scheme {
    fn from_url(url: &Url) -> Option<Self> {
        match url.scheme() {
            "http" => Some(Scheme::Plain),
            "https" => Some(Scheme::Tls),
            _ => None,
        }
    }
}

/// User info taken out of the URI.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Parsed request target. The URL never carries credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
    scheme: Scheme,
    credentials: Option<Credentials>,
}

impl Target {
    /// Parse `uri`, rejecting anything that is not `http` or `https`.
    pub fn parse(uri: &str) -> Result<Self, RequestError> {
        let mut url = Url::parse(uri)
            .map_err(|source| RequestError::InvalidUri { uri: uri.to_string(), source })?;
        let scheme =
            Scheme::from_url(&url).ok_or_else(|| RequestError::Protocol { uri: uri.to_string() })?;

        let credentials = if url.username().is_empty() && url.password().is_none() {
            None
        } else {
            let credentials = Credentials {
                username: decode_userinfo(url.username()),
                password: url.password().map(decode_userinfo),
            };
            // http(s) URLs always have a host, so clearing user info cannot fail.
            let _ = url.set_username("");
            let _ = url.set_password(None);
            Some(credentials)
        };

        Ok(Self { url, scheme, credentials })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    /// Explicit port, or the scheme's default.
    pub fn port(&self) -> Option<u16> {
        self.url.port_or_known_default()
    }

    /// Path plus query string, as sent on the request line.
    pub fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}

/// Undo the percent-encoding `url` applies to user info.
fn decode_userinfo(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// A fully built request, shared by every attempt of one operation.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    method: Method,
    target: Target,
    headers: HeaderMap,
    body: Option<String>,
}

impl PreparedRequest {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// JSON text written as the payload, if any.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

/// One try of a [`PreparedRequest`]. `index` starts at 1.
#[derive(Debug, Clone)]
pub struct Attempt {
    request: Arc<PreparedRequest>,
    index: usize,
}

impl Attempt {
    pub fn new(request: Arc<PreparedRequest>, index: usize) -> Self {
        Self { request, index }
    }

    pub fn request(&self) -> &PreparedRequest {
        &self.request
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// Builds [`PreparedRequest`]s with the fixed JSON headers and the configured API key.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    headers: HeaderMap,
}

impl RequestBuilder {
    /// Header set derived from `config`. An API key or header name that is not a valid header
    /// is a configuration error and is skipped with a warning.
    pub fn new(config: &ClientConfig) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));

        if let Some(key) = &config.api_key {
            match (
                HeaderName::try_from(config.api_key_header.as_str()),
                HeaderValue::try_from(key.as_str()),
            ) {
                (Ok(name), Ok(mut value)) => {
                    value.set_sensitive(true);
                    headers.insert(name, value);
                }
                _ => tracing::warn!(
                    header = %config.api_key_header,
                    "api key header is not a valid HTTP header; sending without it"
                ),
            }
        }

        Self { headers }
    }

    /// Headers attached to every request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Parse `uri`, serialize `body` and assemble the request.
    pub fn build<B>(
        &self,
        method: Method,
        uri: &str,
        body: Option<&B>,
    ) -> Result<PreparedRequest, RequestError>
    where
        B: Serialize + ?Sized,
    {
        let target = Target::parse(uri)?;
        let body = body.map(serde_json::to_string).transpose()?;
        Ok(PreparedRequest { method, target, headers: self.headers.clone(), body })
    }
}
