//! Hot reload through the file provider.

mod common;

use std::fs;

#[tokio::test]
async fn file_changes_are_applied_without_restart() {
    let first = common::start_http_backend("first").await;
    let second = common::start_http_backend("second").await;

    let dir = tempfile::tempdir().unwrap();
    let dynamic = dir.path().join("dynamic.toml");
    let write_dynamic = |backend: std::net::SocketAddr| {
        fs::write(
            &dynamic,
            format!(
                "[http.routers.app]\nservice = \"app\"\n\n\
                 [http.services.app.load_balancer]\nservers = [{{ url = \"http://{backend}\" }}]\n"
            ),
        )
        .unwrap();
    };
    write_dynamic(first);

    let (proxy, shutdown) = common::start_proxy(&format!(
        r#"
        [entry_points.web]
        address = "127.0.0.1:0"

        [providers.file]
        path = "{}"
        "#,
        dynamic.display()
    ))
    .await;

    let runtime = proxy.runtime().clone();
    common::wait_until(|| {
        let runtime = runtime.clone();
        async move { runtime.generation() >= 1 }
    })
    .await;

    let addr = proxy.local_addr("web").unwrap();
    let client = common::client();
    let body = client.get(format!("http://{addr}/")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "first /");

    // Let the watcher register before rewriting the file.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    write_dynamic(second);

    common::wait_until(|| {
        let client = client.clone();
        async move {
            match client.get(format!("http://{addr}/")).send().await {
                Ok(response) => response.text().await.map_or(false, |body| body == "second /"),
                Err(_) => false,
            }
        }
    })
    .await;

    shutdown.trigger();
    proxy.wait().await;
}
