//! Shared utilities for integration and load testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use ai_gateway::config::{CircuitBreakerConfig, GatewayConfig, LoadBalancerConfig, Strategy, UpstreamConfig};

/// Start a mock backend on an ephemeral port; `f` decides each response.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        // Drain the request so closing the socket does not reset the connection.
                        let mut request = [0u8; 1024];
                        let _ = socket.read(&mut request).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a mock backend that always answers with `status`.
#[allow(dead_code)]
pub async fn start_mock_backend(status: u16) -> SocketAddr {
    start_programmable_backend(move || async move { (status, "mock".to_string()) }).await
}

/// An address nothing listens on.
#[allow(dead_code)]
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Send one request to `address` and return the response status.
///
/// Connection errors and 5xx responses count as upstream failures.
pub async fn probe(address: String) -> Result<u16, String> {
    match tokio::time::timeout(Duration::from_secs(2), request_status(&address)).await {
        Ok(Ok(status)) if status >= 500 => Err(format!("upstream returned {status}")),
        Ok(result) => result,
        Err(_) => Err("timed out".to_string()),
    }
}

async fn request_status(address: &str) -> Result<u16, String> {
    let mut stream = TcpStream::connect(address).await.map_err(|e| e.to_string())?;
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n")
        .await
        .map_err(|e| e.to_string())?;
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .map_err(|e| e.to_string())?;
    response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| format!("malformed response from {address}"))
}

pub fn gateway_config(
    addresses: &[SocketAddr],
    failure_threshold: u32,
    reset_timeout_ms: u64,
    recovery_delay_ms: u64,
    strategy: Strategy,
) -> GatewayConfig {
    GatewayConfig {
        upstreams: addresses
            .iter()
            .enumerate()
            .map(|(i, addr)| UpstreamConfig {
                name: format!("backend-{i}"),
                address: addr.to_string(),
            })
            .collect(),
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold,
            reset_timeout_ms,
        },
        load_balancer: LoadBalancerConfig {
            strategy,
            recovery_delay_ms,
        },
        ..Default::default()
    }
}
