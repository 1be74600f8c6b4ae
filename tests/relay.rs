//! HTTP relay tests against raw TCP mock backends.

use std::time::Duration;

use pweb_relay::config::{HostEntry, RouteConfig};

mod common;

#[tokio::test]
async fn relays_request_with_backend_authority() {
    let (backend_addr, mut requests) = common::start_mock_backend(
        "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nX-Backend: yes\r\nConnection: close\r\n\r\nhello".to_string(),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let server = common::start_server(dir.path(), common::relay_routes("/api", backend_addr)).await;
    let base = common::base_url(&server);

    let res = common::http_client()
        .get(format!("{}/api/items?page=2", base))
        .header("origin", format!("{}", base))
        .header("referer", format!("{}/app/index.html", base))
        .send()
        .await
        .expect("Proxy unreachable");

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-backend"], "yes");
    assert_eq!(res.text().await.unwrap(), "hello");

    let captured = requests.recv().await.unwrap();
    let backend = format!("127.0.0.1:{}", backend_addr.port());
    assert_eq!(captured.request_line(), "GET /api/items?page=2 HTTP/1.1");
    assert_eq!(captured.header("host"), Some(backend.as_str()));
    assert_eq!(captured.header("origin"), Some(format!("http://{}", backend).as_str()));
    assert_eq!(
        captured.header("referer"),
        Some(format!("http://{}/app/index.html", backend).as_str())
    );
    assert!(captured.header("x-request-id").is_some());

    server.stop_and_wait().await.unwrap();
}

#[tokio::test]
async fn request_body_reaches_backend() {
    let (backend_addr, mut requests) = common::start_mock_backend(
        "HTTP/1.1 201 Created\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let server = common::start_server(dir.path(), common::relay_routes("/api", backend_addr)).await;

    let res = common::http_client()
        .post(format!("{}/api/items", common::base_url(&server)))
        .header("content-type", "application/json")
        .body(r#"{"name":"widget"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 201);
    let captured = requests.recv().await.unwrap();
    assert_eq!(captured.request_line(), "POST /api/items HTTP/1.1");
    assert_eq!(captured.header("content-type"), Some("application/json"));
    assert_eq!(captured.body, br#"{"name":"widget"}"#);

    server.stop_and_wait().await.unwrap();
}

#[tokio::test]
async fn set_cookie_domain_is_rewritten_to_public_host() {
    let (backend_addr, _requests) = common::start_mock_backend(
        "HTTP/1.1 200 OK\r\n\
         Set-Cookie: sid=abc; Domain=backend.internal; Path=/; HttpOnly\r\n\
         Set-Cookie: theme=dark; Path=/\r\n\
         Content-Length: 0\r\nConnection: close\r\n\r\n"
            .to_string(),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let server = common::start_server(dir.path(), common::relay_routes("/api", backend_addr)).await;

    let res = common::http_client()
        .get(format!("{}/api/login", common::base_url(&server)))
        .send()
        .await
        .unwrap();

    let cookies: Vec<&str> = res
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(cookies.len(), 2);
    assert!(cookies.contains(&"sid=abc; Domain=127.0.0.1; Path=/; HttpOnly"));
    assert!(cookies.contains(&"theme=dark; Domain=127.0.0.1; Path=/"));

    server.stop_and_wait().await.unwrap();
}

#[tokio::test]
async fn backend_error_status_is_relayed() {
    let (backend_addr, _requests) = common::start_mock_backend(
        "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\ndown".to_string(),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let server = common::start_server(dir.path(), common::relay_routes("/api", backend_addr)).await;

    let res = common::http_client()
        .get(format!("{}/api/health", common::base_url(&server)))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 503);
    assert_eq!(res.text().await.unwrap(), "down");

    server.stop_and_wait().await.unwrap();
}

#[tokio::test]
async fn custom_reason_phrase_is_passed_through() {
    let (backend_addr, _requests) = common::start_mock_backend(
        "HTTP/1.1 418 Brewing Tea\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let server = common::start_server(dir.path(), common::relay_routes("/api", backend_addr)).await;

    let response = common::raw_request(
        server.local_addrs()[0],
        "GET /api/tea HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 418 Brewing Tea\r\n"), "{}", response);

    server.stop_and_wait().await.unwrap();
}

#[tokio::test]
async fn unreachable_backend_yields_500_with_description() {
    let dead = common::refused_addr().await;
    let dir = tempfile::tempdir().unwrap();
    let server = common::start_server(dir.path(), common::relay_routes("/api", dead)).await;

    let response = common::raw_request(
        server.local_addrs()[0],
        "GET /api/anything HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;

    let status_line = response.lines().next().unwrap();
    assert!(status_line.starts_with("HTTP/1.1 500 "), "{}", status_line);
    let reason = status_line.trim_start_matches("HTTP/1.1 500 ");
    assert!(!reason.is_empty());
    assert_ne!(reason, "Internal Server Error");

    let body = response.split("\r\n\r\n").nth(1).unwrap_or_default();
    assert!(!body.is_empty());

    server.stop_and_wait().await.unwrap();
}

#[tokio::test]
async fn first_matching_prefix_wins() {
    let (first_addr, mut first) = common::start_mock_backend(
        "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nfirst".to_string(),
    )
    .await;
    let (second_addr, _second) = common::start_mock_backend(
        "HTTP/1.1 200 OK\r\nContent-Length: 6\r\nConnection: close\r\n\r\nsecond".to_string(),
    )
    .await;

    let mut routes = RouteConfig::default();
    routes
        .hosts
        .insert("one".to_string(), HostEntry::new("http", "127.0.0.1", first_addr.port()));
    routes
        .hosts
        .insert("two".to_string(), HostEntry::new("http", "127.0.0.1", second_addr.port()));
    routes.relay = vec![
        ("/api/v2".to_string(), "one".to_string()),
        ("/api".to_string(), "two".to_string()),
    ];

    let dir = tempfile::tempdir().unwrap();
    let server = common::start_server(dir.path(), routes).await;
    let client = common::http_client();
    let base = common::base_url(&server);

    let v2 = client.get(format!("{}/api/v2/users", base)).send().await.unwrap();
    assert_eq!(v2.text().await.unwrap(), "first");
    assert_eq!(first.recv().await.unwrap().request_line(), "GET /api/v2/users HTTP/1.1");

    let v1 = client.get(format!("{}/api/v1/users", base)).send().await.unwrap();
    assert_eq!(v1.text().await.unwrap(), "second");

    server.stop_and_wait().await.unwrap();
}

#[tokio::test]
async fn stop_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::start_server(dir.path(), RouteConfig::default()).await;

    server.stop();
    server.stop();
    assert!(server.shutdown().is_triggered());

    tokio::time::timeout(Duration::from_secs(10), server.wait())
        .await
        .expect("server did not stop")
        .unwrap();
}
