use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Checker, bounded};
use crate::config::ServiceConfig;
use crate::monitoring::types::CheckResult;

/// Subset of the runtime's container inspection document
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerState {
    #[serde(rename = "Running")]
    pub running: bool,
    #[serde(rename = "Status", default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct InspectResponse {
    #[serde(rename = "State")]
    state: ContainerState,
}

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("querying container runtime socket: {path}: {source}")]
    Unreachable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("container {0:?} not found")]
    NotFound(String),
    #[error("container runtime returned status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("building runtime request: {0}")]
    Request(String),
    #[error("container runtime connection: {0}")]
    Http(#[from] hyper::Error),
    #[error("decoding container state: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Read access to a container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn inspect_container(&self, name: &str) -> Result<ContainerState, ContainerError>;
}

/// Docker Engine API client over the local control socket
#[derive(Debug, Clone)]
pub struct DockerSocketClient {
    socket_path: PathBuf,
}

impl DockerSocketClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }
}

#[cfg(unix)]
#[async_trait]
impl ContainerRuntime for DockerSocketClient {
    async fn inspect_container(&self, name: &str) -> Result<ContainerState, ContainerError> {
        use bytes::Bytes;
        use http_body_util::{BodyExt, Empty};
        use hyper::client::conn::http1;
        use hyper_util::rt::TokioIo;
        use tokio::net::UnixStream;

        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| ContainerError::Unreachable {
                path: self.socket_path.clone(),
                source,
            })?;

        let (mut sender, connection) = http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "Container runtime connection closed with error");
            }
        });

        let request = hyper::Request::builder()
            .method(hyper::Method::GET)
            .uri(format!("/containers/{}/json", urlencoding::encode(name)))
            .header(hyper::header::HOST, "localhost")
            .body(Empty::<Bytes>::new())
            .map_err(|e| ContainerError::Request(e.to_string()))?;

        let response = sender.send_request(request).await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();

        match status.as_u16() {
            200 => Ok(serde_json::from_slice::<InspectResponse>(&body)?.state),
            404 => Err(ContainerError::NotFound(name.to_string())),
            other => Err(ContainerError::UnexpectedStatus {
                status: other,
                body: String::from_utf8_lossy(&body).trim().to_string(),
            }),
        }
    }
}

#[cfg(not(unix))]
#[async_trait]
impl ContainerRuntime for DockerSocketClient {
    async fn inspect_container(&self, _name: &str) -> Result<ContainerState, ContainerError> {
        Err(ContainerError::Unreachable {
            path: self.socket_path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Unsupported, "unix sockets are not available"),
        })
    }
}

/// Container liveness checker
///
/// Up when the runtime knows the container and reports it running.
pub struct ContainerChecker {
    service: ServiceConfig,
    runtime: Arc<dyn ContainerRuntime>,
}

impl ContainerChecker {
    pub fn new<R>(service: ServiceConfig, runtime: R) -> Self
    where
        R: ContainerRuntime + 'static,
    {
        Self {
            service,
            runtime: Arc::new(runtime),
        }
    }
}

#[async_trait]
impl Checker for ContainerChecker {
    async fn check(&self, cancel: &CancellationToken) -> CheckResult {
        let checked_at = Utc::now();
        let start = Instant::now();
        let name = self.service.name.as_str();
        let container = self.service.target.as_str();

        let outcome = bounded(cancel, self.service.timeout, self.runtime.inspect_container(container)).await;
        let response_time = start.elapsed();

        match outcome {
            Ok(Ok(state)) if state.running => CheckResult::up(name, checked_at, response_time),
            Ok(Ok(state)) => {
                debug!(service = name, container, state = %state.status, "Container is not running");
                let error = format!("container {container:?} is not running");
                CheckResult::down(name, checked_at, response_time, error)
            }
            Ok(Err(e)) => CheckResult::down(name, checked_at, response_time, e.to_string()),
            Err(interrupted) => {
                let error = format!("inspecting container {container:?}: {interrupted}");
                CheckResult::down(name, checked_at, response_time, error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::Status;
    use std::time::Duration;

    struct FakeRuntime(Option<bool>);

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn inspect_container(&self, name: &str) -> Result<ContainerState, ContainerError> {
            match self.0 {
                Some(running) => Ok(ContainerState {
                    running,
                    status: if running { "running" } else { "exited" }.to_string(),
                }),
                None => Err(ContainerError::NotFound(name.to_string())),
            }
        }
    }

    fn service() -> ServiceConfig {
        ServiceConfig::new("cache", "container", "redis").with_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_running_container_is_up() {
        let checker = ContainerChecker::new(service(), FakeRuntime(Some(true)));
        let result = checker.check(&CancellationToken::new()).await;
        assert_eq!(result.status, Status::Up);
    }

    #[tokio::test]
    async fn test_stopped_container_is_down() {
        let checker = ContainerChecker::new(service(), FakeRuntime(Some(false)));
        let result = checker.check(&CancellationToken::new()).await;
        assert_eq!(result.status, Status::Down);
        assert_eq!(result.error, "container \"redis\" is not running");
    }

    #[tokio::test]
    async fn test_missing_container_is_down() {
        let checker = ContainerChecker::new(service(), FakeRuntime(None));
        let result = checker.check(&CancellationToken::new()).await;
        assert_eq!(result.status, Status::Down);
        assert_eq!(result.error, "container \"redis\" not found");
    }

    #[tokio::test]
    async fn test_unreachable_socket_is_down() {
        let dir = tempfile::tempdir().unwrap();
        let client = DockerSocketClient::new(dir.path().join("missing.sock"));
        let checker = ContainerChecker::new(service(), client);

        let result = checker.check(&CancellationToken::new()).await;

        assert_eq!(result.status, Status::Down);
        assert!(result.error.starts_with("querying container runtime socket"), "{}", result.error);
    }

    #[cfg(unix)]
    mod socket {
        use super::*;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::UnixListener;

        /// Answer one request on `listener` with `status` and `body`, returning the request head.
        async fn serve_once(listener: UnixListener, status: &'static str, body: &'static str) -> String {
            let (mut stream, _) = listener.accept().await.unwrap();

            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();

            String::from_utf8_lossy(&head).into_owned()
        }

        #[tokio::test]
        async fn test_inspects_running_container_over_socket() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("docker.sock");
            let listener = UnixListener::bind(&path).unwrap();
            let server = tokio::spawn(serve_once(
                listener,
                "200 OK",
                r#"{"Id":"abc","State":{"Status":"running","Running":true,"Paused":false}}"#,
            ));

            let state = DockerSocketClient::new(&path).inspect_container("redis").await.unwrap();
            assert!(state.running);
            assert_eq!(state.status, "running");

            let head = server.await.unwrap();
            assert!(head.starts_with("GET /containers/redis/json HTTP/1.1\r\n"), "{head}");
        }

        #[tokio::test]
        async fn test_missing_container_over_socket() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("docker.sock");
            let listener = UnixListener::bind(&path).unwrap();
            let server = tokio::spawn(serve_once(
                listener,
                "404 Not Found",
                r#"{"message":"No such container: redis"}"#,
            ));

            let err = DockerSocketClient::new(&path).inspect_container("redis").await.unwrap_err();
            assert!(matches!(err, ContainerError::NotFound(ref name) if name == "redis"), "{err}");
            server.await.unwrap();
        }

        #[tokio::test]
        async fn test_stopped_container_over_socket() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("docker.sock");
            let listener = UnixListener::bind(&path).unwrap();
            let server = tokio::spawn(serve_once(
                listener,
                "200 OK",
                r#"{"State":{"Status":"exited","Running":false}}"#,
            ));

            let checker = ContainerChecker::new(service(), DockerSocketClient::new(&path));
            let result = checker.check(&CancellationToken::new()).await;

            assert_eq!(result.status, Status::Down);
            assert_eq!(result.error, "container \"redis\" is not running");
            server.await.unwrap();
        }

        #[tokio::test]
        async fn test_server_error_is_reported() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("docker.sock");
            let listener = UnixListener::bind(&path).unwrap();
            let server = tokio::spawn(serve_once(listener, "500 Internal Server Error", r#"{"message":"boom"}"#));

            let err = DockerSocketClient::new(&path).inspect_container("redis").await.unwrap_err();
            assert!(matches!(err, ContainerError::UnexpectedStatus { status: 500, .. }), "{err}");
            server.await.unwrap();
        }
    }
}
