#![allow(dead_code)]

//! Local HTTP and HTTPS servers plus a log capture for integration tests.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::any;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

pub const CONTENT: &str = r#"{"hello":"world"}"#;

/// Serve `app` over plain HTTP on an ephemeral port.
pub async fn serve_http(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind http");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("http server");
    });
    addr
}

/// Serve `app` over TLS with a freshly generated self-signed certificate.
pub async fn serve_https(app: Router) -> SocketAddr {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .expect("self-signed certificate");
    let config = RustlsConfig::from_pem(
        cert.serialize_pem().expect("cert pem").into_bytes(),
        cert.serialize_private_key_pem().into_bytes(),
    )
    .await
    .expect("rustls config");

    let handle = axum_server::Handle::new();
    let server = axum_server::bind_rustls("127.0.0.1:0".parse().expect("addr"), config)
        .handle(handle.clone());
    tokio::spawn(async move {
        server.serve(app.into_make_service()).await.expect("https server");
    });
    handle.listening().await.expect("https server listening")
}

/// Answers every request with [`CONTENT`].
pub fn static_content() -> Router {
    Router::new().route("/", any(|| async { CONTENT }))
}

/// Echoes the request body back.
pub fn echo() -> Router {
    Router::new().route("/", any(|body: Bytes| async move { body }))
}

/// Reports the headers the client sent as a JSON object.
pub fn header_probe() -> Router {
    Router::new().route(
        "/",
        any(|headers: HeaderMap| async move {
            let seen: serde_json::Map<String, serde_json::Value> = headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        serde_json::Value::String(value.to_str().unwrap_or_default().to_string()),
                    )
                })
                .collect();
            serde_json::Value::Object(seen).to_string()
        }),
    )
}

/// Sends `body` in several chunks.
pub fn chunked(chunks: Vec<&'static str>) -> Router {
    Router::new().route(
        "/",
        any(move || {
            let chunks = chunks.clone();
            async move {
                let stream = futures::stream::iter(
                    chunks
                        .into_iter()
                        .map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c.as_bytes()))),
                );
                Body::from_stream(stream)
            }
        }),
    )
}

#[derive(Clone)]
struct Flaky {
    hits: Arc<AtomicUsize>,
    failures: usize,
    status: StatusCode,
}

async fn flaky_handler(State(flaky): State<Flaky>) -> impl IntoResponse {
    let hit = flaky.hits.fetch_add(1, Ordering::SeqCst) + 1;
    if hit <= flaky.failures {
        (flaky.status, "nope").into_response()
    } else {
        CONTENT.into_response()
    }
}

/// Responds with `status` to the first `failures` requests and with [`CONTENT`] afterwards.
/// The returned counter tracks every request the server saw.
pub fn flaky(failures: usize, status: StatusCode) -> (Router, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/", any(flaky_handler))
        .with_state(Flaky { hits: hits.clone(), failures, status });
    (app, hits)
}

/// Raw server that answers `200 OK` announcing more bytes than it sends, then hangs up.
pub async fn serve_truncated(partial: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind raw");
    let addr = listener.local_addr().expect("local addr");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = format!(
                    "HTTP/1.1 200 OK\r\n\
                     content-type: application/json\r\n\
                     content-length: {}\r\n\r\n",
                    partial.len() + 1024
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(partial.as_bytes()).await;
                let _ = socket.flush().await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, hits)
}

/// Port that nothing listens on.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe");
    listener.local_addr().expect("local addr").port()
}

#[derive(Clone)]
struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;
    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

struct SharedGuard(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Captures everything logged on the current thread while the guard lives.
pub struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
    _guard: tracing::subscriber::DefaultGuard,
}

impl CapturedLogs {
    pub fn start() -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::fmt()
            .with_writer(BoxMakeWriter::new(SharedWriter(buffer.clone())))
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .without_time()
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        Self { buffer, _guard: guard }
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }
}
