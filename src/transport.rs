//! One network attempt.
//!
//! `HttpTransport` keeps a plain client and an HTTPS-only client and picks between them by the
//! target's scheme. A send failure is a connection error, a status of 400 or above is a status
//! error, and a body that breaks off after a good status is a payload error carrying whatever
//! arrived before the break.

use crate::config::ClientConfig;
use crate::request::{Attempt, Scheme};
use crate::RequestError;
use futures::future::BoxFuture;
use reqwest::{redirect, Client, ClientBuilder};
use std::task::{Context, Poll};
use tower_service::Service;

/// Status codes at or above this are failures.
pub const FIRST_ERROR_STATUS: u16 = 400;

/// Sends attempts over plain HTTP or TLS.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    plain: Client,
    tls: Client,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, RequestError> {
        let plain = base_builder(config).build().map_err(RequestError::ClientBuild)?;
        let tls = base_builder(config)
            .https_only(true)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(RequestError::ClientBuild)?;
        Ok(Self { plain, tls })
    }

    /// The client that carries requests for `scheme`.
    pub fn client_for(&self, scheme: Scheme) -> &Client {
        match scheme {
            Scheme::Plain => &self.plain,
            Scheme::Tls => &self.tls,
        }
    }
}

// Redirects are handed back to the caller like any other status below 400, and proxy settings
// from the environment are ignored.
fn base_builder(config: &ClientConfig) -> ClientBuilder {
    ClientBuilder::new()
        .connect_timeout(config.connect_timeout)
        .user_agent(&config.user_agent)
        .redirect(redirect::Policy::none())
        .no_proxy()
}

async fn perform(client: Client, attempt: Attempt) -> Result<String, RequestError> {
    let request = attempt.request();
    let target = request.target();

    let mut builder = client
        .request(request.method().clone(), target.url().clone())
        .headers(request.headers().clone());
    if let Some(credentials) = target.credentials() {
        builder = builder.basic_auth(&credentials.username, credentials.password.as_ref());
    }
    if let Some(body) = request.body() {
        builder = builder.body(body.to_owned());
    }

    tracing::debug!(
        attempt = attempt.index(),
        method = %request.method(),
        url = %target.url(),
        "sending request"
    );
    let mut response = builder.send().await.map_err(RequestError::Connection)?;

    let status = response.status().as_u16();
    if status >= FIRST_ERROR_STATUS {
        return Err(RequestError::Status { status });
    }

    let mut payload = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => payload.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(source) => {
                return Err(RequestError::Payload {
                    partial: String::from_utf8_lossy(&payload).into_owned(),
                    source,
                })
            }
        }
    }

    tracing::debug!(attempt = attempt.index(), status, bytes = payload.len(), "response received");
    Ok(String::from_utf8_lossy(&payload).into_owned())
}

impl Service<Attempt> for HttpTransport {
    type Response = String;
    type Error = RequestError;
    type Future = BoxFuture<'static, Result<String, RequestError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, attempt: Attempt) -> Self::Future {
        let client = self.client_for(attempt.request().target().scheme()).clone();
        Box::pin(perform(client, attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestBuilder;
    use reqwest::Method;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[test]
    fn builds_with_defaults_and_insecure_tls() {
        assert!(HttpTransport::new(&ClientConfig::default()).is_ok());
        let config = ClientConfig { accept_invalid_certs: true, ..ClientConfig::default() };
        assert!(HttpTransport::new(&config).is_ok());
    }

    #[tokio::test]
    async fn refused_connection_is_retryable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = HttpTransport::new(&ClientConfig::default()).unwrap();
        let request = RequestBuilder::new(&ClientConfig::default())
            .build::<()>(Method::GET, &format!("http://127.0.0.1:{}/", port), None)
            .unwrap();

        let err = transport.oneshot(Attempt::new(Arc::new(request), 1)).await.unwrap_err();

        assert!(matches!(err, RequestError::Connection(_)), "got {:?}", err);
        assert!(err.is_retryable());
    }
}
