//! End-to-end TCP tests.

mod common;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const STATIC: &str = r#"
[entry_points.db]
address = "127.0.0.1:0"
protocol = "tcp"
"#;

#[tokio::test]
async fn connections_rotate_across_servers() {
    let a = common::start_tcp_backend("A").await;
    let b = common::start_tcp_backend("B").await;
    let c = common::start_tcp_backend("C").await;

    let (proxy, shutdown) = common::start_proxy(STATIC).await;
    common::apply(
        &proxy,
        &format!(
            r#"
            [tcp.routers.db]
            service = "db"

            [tcp.services.db.load_balancer]
            servers = [{{ address = "{a}" }}, {{ address = "{b}" }}, {{ address = "{c}" }}]
            "#
        ),
    )
    .await;

    let addr = proxy.local_addr("db").unwrap();
    let mut greetings = String::new();
    for _ in 0..6 {
        greetings.push_str(&common::read_greeting(addr, 1).await);
    }
    assert_eq!(greetings, "ABCABC");

    shutdown.trigger();
    proxy.wait().await;
}

#[tokio::test]
async fn bytes_flow_both_ways_through_middlewares() {
    let backend = common::start_tcp_backend(">").await;
    let (proxy, shutdown) = common::start_proxy(STATIC).await;
    common::apply(
        &proxy,
        &format!(
            r#"
            [tcp.routers.db]
            middlewares = ["local", "cap"]
            service = "db"

            [tcp.middlewares.local.ip_allow_list]
            source_range = ["127.0.0.1"]

            [tcp.middlewares.cap.in_flight_conn]
            amount = 4

            [tcp.services.db.load_balancer]
            servers = [{{ address = "{backend}" }}]
            "#
        ),
    )
    .await;

    let addr = proxy.local_addr("db").unwrap();
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 6];
    stream.read_exact(&mut buf[..1]).await.unwrap();
    assert_eq!(&buf[..1], b">");

    stream.write_all(b"hello").await.unwrap();
    stream.read_exact(&mut buf[..5]).await.unwrap();
    assert_eq!(&buf[..5], b"hello");
    drop(stream);

    shutdown.trigger();
    proxy.wait().await;
}

#[tokio::test]
async fn disallowed_clients_are_closed() {
    let backend = common::start_tcp_backend("X").await;
    let (proxy, shutdown) = common::start_proxy(STATIC).await;
    common::apply(
        &proxy,
        &format!(
            r#"
            [tcp.routers.db]
            middlewares = ["remote-only"]
            service = "db"

            [tcp.middlewares.remote-only.ip_allow_list]
            source_range = ["10.0.0.0/8"]

            [tcp.services.db.load_balancer]
            servers = [{{ address = "{backend}" }}]
            "#
        ),
    )
    .await;

    let addr = proxy.local_addr("db").unwrap();
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    assert!(buf.is_empty());

    shutdown.trigger();
    proxy.wait().await;
}
