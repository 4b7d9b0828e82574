//! HTTP server
//!
//! Hosts the API with fixed transport timeouts:
//! - read: the request body must arrive within 30s
//! - write: a response must be produced within 30s, otherwise the client
//!   gets a 500 with the JSON error body
//! - idle: a connection without any traffic for 120s is closed
//!
//! Every request is tagged with a [`RequestId`] before it reaches a handler.
//! On shutdown the server stops accepting and drains in-flight requests.

use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::serve::Listener;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::CancellationToken;
use tower_http::timeout::RequestBodyTimeoutLayer;
use tracing::{info, warn};

use crate::api::RequestId;
use crate::api::error::ApiError;

/// Transport timeouts
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub read: Duration,
    pub write: Duration,
    pub idle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(30),
            write: Duration::from_secs(30),
            idle: Duration::from_secs(120),
        }
    }
}

pub struct Server {
    listener: TcpListener,
    router: Router,
    timeouts: Timeouts,
}

impl Server {
    pub async fn bind(addr: &str, router: Router, timeouts: Timeouts) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            router,
            timeouts,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until `shutdown` fires, then drains open requests
    pub async fn serve(self, shutdown: CancellationToken) -> io::Result<()> {
        let addr = self.local_addr()?;
        let app = self
            .router
            .layer(middleware::from_fn_with_state(
                self.timeouts.write,
                write_deadline,
            ))
            .layer(RequestBodyTimeoutLayer::new(self.timeouts.read));
        let listener = IdleTimeoutListener::new(self.listener, self.timeouts.idle);

        info!("Listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

/// Tags the request and bounds the time until its response is ready
async fn write_deadline(State(limit): State<Duration>, mut req: Request, next: Next) -> Response {
    let request_id = RequestId::generate();
    req.extensions_mut().insert(request_id.clone());

    match tokio::time::timeout(limit, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(request_id = %request_id.0, ?limit, "response not ready in time");
            ApiError::internal("Request timed out", &request_id.0).into_response()
        }
    }
}

// =============================================================================
// Idle Timeout
// =============================================================================

/// TCP listener whose connections close after a period without traffic
pub struct IdleTimeoutListener {
    inner: TcpListener,
    idle: Duration,
}

impl IdleTimeoutListener {
    pub fn new(inner: TcpListener, idle: Duration) -> Self {
        Self { inner, idle }
    }
}

impl Listener for IdleTimeoutListener {
    type Io = IdleTimeoutStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.inner.accept().await {
                Ok((stream, addr)) => return (IdleTimeoutStream::new(stream, self.idle), addr),
                // Per-connection failures; the listener itself is fine.
                Err(e) if is_connection_error(&e) => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

/// Stream failing with `TimedOut` once it saw no traffic for `idle`
pub struct IdleTimeoutStream {
    inner: TcpStream,
    idle: Duration,
    deadline: Pin<Box<Sleep>>,
}

impl IdleTimeoutStream {
    fn new(inner: TcpStream, idle: Duration) -> Self {
        Self {
            inner,
            idle,
            deadline: Box::pin(tokio::time::sleep(idle)),
        }
    }

    fn touch(&mut self) {
        let next = Instant::now() + self.idle;
        self.deadline.as_mut().reset(next);
    }

    fn poll_idle(&mut self, cx: &mut Context<'_>) -> Poll<io::Error> {
        match self.deadline.as_mut().poll(cx) {
            Poll::Ready(()) => Poll::Ready(io::Error::new(
                io::ErrorKind::TimedOut,
                "connection idle timeout",
            )),
            Poll::Pending => Poll::Pending,
        }
    }

    /// Resets the idle clock on progress, checks it while pending
    fn track<T>(&mut self, cx: &mut Context<'_>, poll: Poll<io::Result<T>>) -> Poll<io::Result<T>> {
        match poll {
            Poll::Ready(result) => {
                self.touch();
                Poll::Ready(result)
            }
            Poll::Pending => match self.poll_idle(cx) {
                Poll::Ready(e) => Poll::Ready(Err(e)),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl AsyncRead for IdleTimeoutStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        this.track(cx, poll)
    }
}

impl AsyncWrite for IdleTimeoutStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        this.track(cx, poll)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        this.track(cx, poll)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AppState, create_router};
    use crate::telemetry::Telemetry;
    use crate::telemetry::tests::MemorySink;
    use async_trait::async_trait;
    use mapscraper_client::ApiClient;
    use mapscraper_core::domain::job::Job;
    use mapscraper_core::dto::job::{CreateJobRequest, CreateJobResponse};
    use mapscraper_core::queue::{Provider, QueueError};
    use mapscraper_runner::repository::MemoryJobStore;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;

    /// Provider that never completes a push
    struct HungProvider;

    #[async_trait]
    impl Provider for HungProvider {
        async fn push(&self, _job: &Job, _cancel: &CancellationToken) -> Result<(), QueueError> {
            std::future::pending().await
        }
    }

    async fn serve(
        provider: Arc<dyn Provider>,
        timeouts: Timeouts,
    ) -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<io::Result<()>>) {
        let shutdown = CancellationToken::new();
        let router = create_router(AppState {
            provider: Some(provider),
            shutdown: shutdown.clone(),
            telemetry: Telemetry::start(Arc::new(MemorySink::default()), Duration::from_secs(3600)),
        });
        let server = Server::bind("127.0.0.1:0", router, timeouts).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = tokio::spawn(server.serve(shutdown.clone()));
        (addr, shutdown, handle)
    }

    async fn start(timeouts: Timeouts) -> (SocketAddr, Arc<MemoryJobStore>, CancellationToken, tokio::task::JoinHandle<io::Result<()>>) {
        let store = Arc::new(MemoryJobStore::new());
        let (addr, shutdown, handle) = serve(store.clone(), timeouts).await;
        (addr, store, shutdown, handle)
    }

    #[tokio::test]
    async fn test_serves_jobs_and_stops_on_cancel() {
        let (addr, store, shutdown, handle) = start(Timeouts::default()).await;
        let client = ApiClient::new(format!("http://{}", addr));

        let created = client
            .create_job(&CreateJobRequest {
                query: "coffee shops".to_string(),
                language: "en".to_string(),
                max_depth: 3,
                zoom: 15,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(created.job_id.is_some());
        assert_eq!(store.len().await, 1);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server did not drain")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_idle_connection_is_closed() {
        let (addr, _store, shutdown, _handle) = start(Timeouts {
            idle: Duration::from_millis(100),
            ..Timeouts::default()
        })
        .await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 64];
        let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("idle connection was not closed");

        // Closed either cleanly or by reset
        assert!(matches!(read, Ok(0) | Err(_)));
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_slow_response_gets_json_error() {
        let (addr, shutdown, _handle) = serve(
            Arc::new(HungProvider),
            Timeouts {
                write: Duration::from_millis(100),
                ..Timeouts::default()
            },
        )
        .await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/api/jobs", addr))
            .json(&CreateJobRequest {
                query: "coffee shops".to_string(),
                language: "en".to_string(),
                max_depth: 3,
                zoom: 15,
                ..Default::default()
            })
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        let body: CreateJobResponse = response.json().await.unwrap();
        assert_eq!(body.status, "error");
        assert_eq!(body.message.as_deref(), Some("Request timed out"));
        assert!(!body.request_id.is_empty());
        shutdown.cancel();
    }
}
