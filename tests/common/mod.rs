//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use edge_proxy::config::{ConfigMessage, DynamicConfig, ProxyConfig};
use edge_proxy::lifecycle::{Proxy, Shutdown};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Start a mock HTTP backend answering `"<name> <path>"` to every request.
/// Request headers are echoed back with an `x-echo-` prefix.
pub async fn start_http_backend(name: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut reader = BufReader::new(socket);
                let mut request_line = String::new();
                if reader.read_line(&mut request_line).await.is_err() {
                    return;
                }
                let path = request_line.split_whitespace().nth(1).unwrap_or("").to_string();

                let mut echoed = String::new();
                loop {
                    let mut line = String::new();
                    match reader.read_line(&mut line).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) if line == "\r\n" => break,
                        Ok(_) => echoed.push_str(&format!("x-echo-{line}")),
                    }
                }

                let body = format!("{name} {path}");
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n{echoed}\r\n{body}",
                    body.len()
                );
                let mut socket = reader.into_inner();
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start a TCP backend that writes `greeting` and then echoes what it receives.
pub async fn start_tcp_backend(greeting: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if socket.write_all(greeting.as_bytes()).await.is_err() {
                    return;
                }
                let mut buf = [0u8; 1024];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 || socket.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    addr
}

/// Read `len` bytes from a fresh connection to `addr`.
pub async fn read_greeting(addr: SocketAddr, len: usize) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.unwrap();
    String::from_utf8(buf).unwrap()
}

/// Start a proxy from a static TOML document.
pub async fn start_proxy(static_toml: &str) -> (Proxy, Shutdown) {
    let config: ProxyConfig = toml::from_str(static_toml).unwrap();
    let shutdown = Shutdown::new();
    let proxy = Proxy::start(config, &shutdown).await.unwrap();
    (proxy, shutdown)
}

/// Push a dynamic snapshot and wait until the runtime applied it.
pub async fn apply(proxy: &Proxy, dynamic_toml: &str) {
    let config: DynamicConfig = toml::from_str(dynamic_toml).unwrap();
    let before = proxy.runtime().generation();
    proxy
        .config_sender()
        .send(ConfigMessage::Snapshot {
            provider: "test".into(),
            config,
        })
        .await
        .unwrap();

    let runtime = proxy.runtime().clone();
    wait_until(move || {
        let runtime = runtime.clone();
        async move { runtime.generation() > before }
    })
    .await;
}

/// Poll `condition` every 20ms for up to 10s.
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !condition().await {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
