use qdrant_client::{config::QdrantConfig, Qdrant};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use url::Url;

use super::vector_db::VectorDBError;

pub const HTTP_PORT: u16 = 6333;
pub const GRPC_PORT: u16 = 6334;

/// Upper bound on waiting for a freshly launched container.
pub const STARTUP_WAIT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const POLL_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// The configured URL is usually the REST/dashboard one (`:6333`); the client
/// speaks gRPC, which Qdrant serves on the next port.
pub fn grpc_url(url: &str) -> Result<String, VectorDBError> {
    let with_scheme = if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    };
    let parsed = Url::parse(&with_scheme)
        .map_err(|e| VectorDBError::Connection(format!("invalid Qdrant URL {:?}: {}", url, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| VectorDBError::Connection(format!("Qdrant URL {:?} has no host", url)))?;

    let port = match parsed.port() {
        None | Some(HTTP_PORT) => GRPC_PORT,
        Some(port) => port,
    };
    Ok(format!("{}://{}:{}", parsed.scheme(), host, port))
}

pub fn dashboard_url(url: &str) -> String {
    let base = url.trim_end_matches('/');
    format!("{}/dashboard#/", base)
}

pub async fn create_qdrant_client(url: &str) -> Result<Qdrant, VectorDBError> {
    connect(url, Duration::from_secs(10)).await
}

async fn connect(url: &str, connect_timeout: Duration) -> Result<Qdrant, VectorDBError> {
    let grpc = grpc_url(url)?;
    tracing::info!("Attempting to connect to Qdrant with URL: {}", grpc);

    let mut config = QdrantConfig::from_url(&grpc);
    config.check_compatibility = false;
    config.timeout = Duration::from_secs(30);
    config.connect_timeout = connect_timeout;

    let client = Qdrant::new(config).map_err(|e| VectorDBError::Connection(e.to_string()))?;

    match client.list_collections().await {
        Ok(_) => {
            tracing::info!("[QDRANT CLIENT] Connected to Qdrant at {}", grpc);
            Ok(client)
        }
        Err(e) => {
            tracing::error!("[QDRANT CLIENT] Connection test failed: {}", e);
            Err(VectorDBError::Connection(format!("Failed to connect to Qdrant: {}", e)))
        }
    }
}

/// Starts a detached `qdrant/qdrant` container whose storage lives in
/// `storage`, then polls until the gRPC endpoint answers.
pub async fn launch_qdrant_container(storage: &Path, url: &str) -> Result<Qdrant, VectorDBError> {
    tokio::fs::create_dir_all(storage)
        .await
        .map_err(|e| VectorDBError::Connection(format!("cannot create {}: {}", storage.display(), e)))?;
    let storage = tokio::fs::canonicalize(storage)
        .await
        .map_err(|e| VectorDBError::Connection(e.to_string()))?;

    tracing::info!("[QDRANT DOCKER] Running container...");
    let output = Command::new("docker")
        .args(docker_run_args(&storage))
        .output()
        .await
        .map_err(|e| VectorDBError::Connection(format!("failed to run docker: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stdout.trim().is_empty() {
        tracing::debug!("[QDRANT DOCKER] Output: {}", stdout.trim());
    }
    if !stderr.trim().is_empty() {
        tracing::warn!("[QDRANT DOCKER] {}", stderr.trim());
    }
    if !output.status.success() {
        // A container from an earlier run may already hold the ports.
        tracing::warn!("[QDRANT DOCKER] docker exited with {}", output.status);
    }

    tracing::info!("[QDRANT DOCKER] Waiting for Qdrant to accept connections...");
    poll_until_ready(STARTUP_WAIT, POLL_INTERVAL, || connect(url, POLL_CONNECT_TIMEOUT)).await
}

/// Retries `attempt` every `interval` until it succeeds. The whole wait,
/// including attempts in flight, is bounded by `wait`.
async fn poll_until_ready<T, F, Fut>(
    wait: Duration,
    interval: Duration,
    mut attempt: F,
) -> Result<T, VectorDBError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, VectorDBError>>,
{
    let mut last_error = None;
    let polling = async {
        loop {
            match attempt().await {
                Ok(value) => return value,
                Err(e) => last_error = Some(e),
            }
            tokio::time::sleep(interval).await;
        }
    };
    let result = tokio::time::timeout(wait, polling).await;

    match result {
        Ok(value) => Ok(value),
        Err(_) => {
            tracing::error!("[QDRANT DOCKER] Qdrant not reachable after {:?}", wait);
            Err(last_error.unwrap_or_else(|| {
                VectorDBError::Connection(format!("Qdrant did not start within {:?}", wait))
            }))
        }
    }
}

fn docker_run_args(storage: &Path) -> Vec<String> {
    vec![
        "run".to_string(),
        "-d".to_string(),
        "-p".to_string(),
        format!("{}:{}", HTTP_PORT, HTTP_PORT),
        "-p".to_string(),
        format!("{}:{}", GRPC_PORT, GRPC_PORT),
        "-v".to_string(),
        format!("{}:/qdrant/storage", storage.display()),
        "qdrant/qdrant".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn test_dashboard_port_maps_to_grpc() {
        assert_eq!(grpc_url("http://localhost:6333").unwrap(), "http://localhost:6334");
        assert_eq!(grpc_url("localhost:6333").unwrap(), "http://localhost:6334");
        assert_eq!(grpc_url("http://qdrant").unwrap(), "http://qdrant:6334");
    }

    #[test]
    fn test_explicit_grpc_port_is_kept() {
        assert_eq!(grpc_url("https://vectors.example.edu:7334").unwrap(), "https://vectors.example.edu:7334");
    }

    #[test]
    fn test_garbage_url_is_rejected() {
        assert!(grpc_url("http://").is_err());
    }

    #[test]
    fn test_dashboard_url() {
        assert_eq!(dashboard_url("http://localhost:6333/"), "http://localhost:6333/dashboard#/");
    }

    #[tokio::test]
    async fn test_polling_returns_first_success() {
        let attempts = AtomicUsize::new(0);
        let attempts = &attempts;

        let result = poll_until_ready(Duration::from_secs(5), Duration::from_millis(5), move || async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(VectorDBError::Connection("refused".to_string()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_polling_is_bounded_by_the_wait() {
        let attempts = AtomicUsize::new(0);
        let attempts = &attempts;
        let started = Instant::now();

        // Each attempt hangs longer than the whole wait.
        let result: Result<(), _> =
            poll_until_ready(Duration::from_millis(100), Duration::from_millis(5), move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(10)).await;
                Err(VectorDBError::Connection("refused".to_string()))
            })
            .await;

        assert!(matches!(result, Err(VectorDBError::Connection(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_docker_arguments_mount_storage() {
        let args = docker_run_args(Path::new("/srv/qdrant"));
        assert_eq!(args[0], "run");
        assert!(args.contains(&"6333:6333".to_string()));
        assert!(args.contains(&"6334:6334".to_string()));
        assert!(args.contains(&"/srv/qdrant:/qdrant/storage".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("qdrant/qdrant"));
    }
}
