mod utils;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use predial::proxy::ProxyConfig;
use utils::{
    closed_addr, read_response, roundtrip, spawn_echo, spawn_proxy, spawn_proxy_with,
    spawn_tls_upstream, spawn_upstream,
};

#[tokio::test]
async fn test_connect_tunnel_relays_bytes_in_order() {
    let proxy = spawn_proxy().await;
    let echo = spawn_echo().await;

    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream
        .write_all(format!("CONNECT {echo} HTTP/1.1\r\nHost: {echo}\r\n\r\n").as_bytes())
        .await
        .unwrap();
    let response = read_response(&mut stream).await;
    assert_eq!(response.status, 200, "{response:?}");

    for chunk in [&b"first "[..], b"second ", b"third"] {
        stream.write_all(chunk).await.unwrap();
    }
    let mut echoed = [0; 18];
    stream.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"first second third");

    // closing our side closes the tunnel
    stream.shutdown().await.unwrap();
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_connect_refused_keeps_client_connection_open() {
    let proxy = spawn_proxy().await;
    let refused = closed_addr().await;
    let upstream = spawn_upstream().await;

    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let response = roundtrip(
        &mut stream,
        &format!("CONNECT {refused} HTTP/1.1\r\nHost: {refused}\r\n\r\n"),
    )
    .await;
    assert_eq!(response.status, 503, "{response:?}");
    assert!(
        response.body_text().contains(&refused.to_string()),
        "{response:?}"
    );

    // same client connection is still usable
    let response = roundtrip(
        &mut stream,
        &format!("GET http://{upstream}/after HTTP/1.1\r\nHost: {upstream}\r\n\r\n"),
    )
    .await;
    assert_eq!(response.status, 200, "{response:?}");
    assert_eq!(response.body_text(), "path=/after");
}

#[tokio::test]
async fn test_forward_returns_redirect_verbatim() {
    let proxy = spawn_proxy().await;
    let upstream = spawn_upstream().await;

    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let response = roundtrip(
        &mut stream,
        &format!("GET http://{upstream}/redirect HTTP/1.1\r\nHost: {upstream}\r\n\r\n"),
    )
    .await;

    assert_eq!(response.status, 302, "{response:?}");
    assert_eq!(response.header("location"), Some("/elsewhere"));
    assert_eq!(response.header("x-custom"), Some("kept"));
    assert_eq!(response.body_text(), "moved");
}

#[tokio::test]
async fn test_forward_transparent_request_uses_host_header() {
    let proxy = spawn_proxy().await;
    let upstream = spawn_upstream().await;

    let mut stream = TcpStream::connect(proxy).await.unwrap();
    for path in ["/one", "/two"] {
        let response = roundtrip(
            &mut stream,
            &format!("GET {path} HTTP/1.1\r\nHost: {upstream}\r\n\r\n"),
        )
        .await;
        assert_eq!(response.status, 200, "{response:?}");
        assert_eq!(response.body_text(), format!("path={path}"));
    }
}

#[tokio::test]
async fn test_forward_failure_is_internal_server_error() {
    let proxy = spawn_proxy().await;
    let refused = closed_addr().await;

    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let response = roundtrip(
        &mut stream,
        &format!("GET http://{refused}/ HTTP/1.1\r\nHost: {refused}\r\n\r\n"),
    )
    .await;
    assert_eq!(response.status, 500, "{response:?}");
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_forward_without_host_is_bad_request() {
    let proxy = spawn_proxy().await;

    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let response = roundtrip(&mut stream, "GET /nowhere HTTP/1.0\r\n\r\n").await;
    assert_eq!(response.status, 400, "{response:?}");
}

#[tokio::test]
async fn test_forward_https_upstream_over_cached_connection() {
    let (upstream, tls_config) = spawn_tls_upstream().await;
    let proxy = spawn_proxy_with(ProxyConfig::default().with_tls_client_config(tls_config)).await;

    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let response = roundtrip(
        &mut stream,
        &format!("GET https://{upstream}/secure HTTP/1.1\r\nHost: {upstream}\r\n\r\n"),
    )
    .await;
    assert_eq!(response.status, 200, "{response:?}");
    assert_eq!(response.body_text(), "path=/secure");

    // redirects of https upstreams are returned verbatim as well
    let response = roundtrip(
        &mut stream,
        &format!("GET https://{upstream}/redirect HTTP/1.1\r\nHost: {upstream}\r\n\r\n"),
    )
    .await;
    assert_eq!(response.status, 302, "{response:?}");
    assert_eq!(response.header("location"), Some("/elsewhere"));
}

#[tokio::test]
async fn test_forward_https_upstream_with_untrusted_certificate_fails() {
    let (upstream, _) = spawn_tls_upstream().await;
    let proxy = spawn_proxy().await;

    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let response = roundtrip(
        &mut stream,
        &format!("GET https://{upstream}/secure HTTP/1.1\r\nHost: {upstream}\r\n\r\n"),
    )
    .await;
    assert_eq!(response.status, 500, "{response:?}");
    assert!(response.body.is_empty());
}
