//! The public surface: a client that builds requests, sends them and retries on failure.

use crate::config::ClientConfig;
use crate::request::RequestBuilder;
use crate::retry::{log_failure, RetryLayer, RetryPolicy, RetryService};
use crate::transport::HttpTransport;
use crate::RequestError;
use futures::future::BoxFuture;
use reqwest::Method;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Duration;
use tower::ServiceExt;
use tower_layer::Layer;

/// Retrying JSON client. Cheap to clone; clones share the underlying connection clients.
#[derive(Debug, Clone)]
pub struct Client {
    requests: RequestBuilder,
    service: RetryService<HttpTransport>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Client with `config` and the default retry policy.
    pub fn new(config: ClientConfig) -> Result<Self, RequestError> {
        Self::builder().config(config).build()
    }

    /// Client configured from the process environment (see [`ClientConfig::from_env`]).
    pub fn from_env() -> Result<Self, RequestError> {
        Self::new(ClientConfig::from_env())
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.service.policy()
    }

    /// Send `method` to `uri` with an optional JSON body and resolve to the response text.
    ///
    /// The request is built before the returned future is created, so a bad scheme or an
    /// unserializable body is reported without any network traffic.
    pub fn execute<B>(
        &self,
        method: Method,
        uri: &str,
        body: Option<&B>,
    ) -> BoxFuture<'static, Result<String, RequestError>>
    where
        B: Serialize + ?Sized,
    {
        let prepared = self.requests.build(method, uri, body);
        let service = self.service.clone();
        Box::pin(async move {
            let request = prepared.map_err(|err| {
                log_failure(&err, 0);
                err
            })?;
            service.oneshot(request).await
        })
    }

    pub async fn get(&self, uri: &str) -> Result<String, RequestError> {
        self.execute::<()>(Method::GET, uri, None).await
    }

    pub async fn post<B>(&self, uri: &str, body: &B) -> Result<String, RequestError>
    where
        B: Serialize + ?Sized,
    {
        self.execute(Method::POST, uri, Some(body)).await
    }

    pub async fn patch<B>(&self, uri: &str, body: &B) -> Result<String, RequestError>
    where
        B: Serialize + ?Sized,
    {
        self.execute(Method::PATCH, uri, Some(body)).await
    }
}

/// Builder for [`Client`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    policy: RetryPolicy,
}

impl ClientBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config = self.config.with_api_key(Some(key.into()));
        self
    }

    pub fn api_key_header(mut self, header: impl Into<String>) -> Self {
        self.config.api_key_header = header.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Accept self-signed or otherwise invalid TLS certificates.
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.config.accept_invalid_certs = accept;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Result<Client, RequestError> {
        let transport = HttpTransport::new(&self.config).map_err(|err| {
            log_failure(&err, 0);
            err
        })?;
        Ok(Client {
            requests: RequestBuilder::new(&self.config),
            service: RetryLayer::new(self.policy).layer(transport),
        })
    }
}

static DEFAULT_CLIENT: OnceLock<Client> = OnceLock::new();

/// Process-wide client, configured from the environment on first use.
pub fn default_client() -> Result<&'static Client, RequestError> {
    if let Some(client) = DEFAULT_CLIENT.get() {
        return Ok(client);
    }
    let client = Client::from_env()?;
    Ok(DEFAULT_CLIENT.get_or_init(|| client))
}

/// `GET uri` on the default client.
pub async fn get(uri: &str) -> Result<String, RequestError> {
    default_client()?.get(uri).await
}

/// `POST uri` with `body` as JSON on the default client.
pub async fn post<B>(uri: &str, body: &B) -> Result<String, RequestError>
where
    B: Serialize + ?Sized,
{
    default_client()?.post(uri, body).await
}

/// `PATCH uri` with `body` as JSON on the default client.
pub async fn patch<B>(uri: &str, body: &B) -> Result<String, RequestError>
where
    B: Serialize + ?Sized,
{
    default_client()?.patch(uri, body).await
}
