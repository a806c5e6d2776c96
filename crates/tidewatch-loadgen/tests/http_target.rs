//! Load generation against real local HTTP endpoints.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use tidewatch_core::ShutdownCoordinator;
use tidewatch_loadgen::{
    ErrorKind, Fetch, HttpFetcher, LoadGenerator, LoadPlan, normalize_target,
};

/// Serve every request with `status` and a fixed body until the test ends.
async fn spawn_server(status: u16, body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let svc = service_fn(move |_req: Request<Incoming>| async move {
                    Ok::<_, Infallible>(
                        Response::builder()
                            .status(status)
                            .body(Full::new(Bytes::from_static(body.as_bytes())))
                            .unwrap(),
                    )
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });

    addr
}

/// Accepts connections and never writes a byte back.
async fn spawn_silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    addr
}

/// HTTPS server on a self-signed `localhost` certificate. Returns its
/// address and a client config that trusts the certificate.
async fn spawn_tls_server(body: &'static str) -> (SocketAddr, Arc<rustls::ClientConfig>) {
    let key_pair = rcgen::KeyPair::generate().unwrap();
    let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
        .unwrap()
        .self_signed(&key_pair)
        .unwrap();
    let cert_der = cert.der().clone();
    let server_key = rustls::pki_types::PrivateKeyDer::try_from(key_pair.serialize_der()).unwrap();

    let server_config =
        rustls::ServerConfig::builder_with_provider(rustls::crypto::ring::default_provider().into())
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der.clone()], server_key)
            .unwrap();
    let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(server_config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(tls) = acceptor.accept(stream).await else {
                    return;
                };
                let svc = service_fn(move |_req: Request<Incoming>| async move {
                    Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(
                        body.as_bytes(),
                    ))))
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(tls), svc)
                    .await;
            });
        }
    });

    let mut roots = rustls::RootCertStore::empty();
    roots.add(cert_der).unwrap();
    let client_config =
        rustls::ClientConfig::builder_with_provider(rustls::crypto::ring::default_provider().into())
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();

    (addr, Arc::new(client_config))
}

fn plan(rps: u32, workers: usize, timeout: Duration, duration: Duration) -> LoadPlan {
    LoadPlan {
        rps,
        workers,
        timeout,
        duration: Some(duration),
        report_interval: Duration::from_secs(10),
        join_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn successful_responses_are_counted() {
    let addr = spawn_server(200, "hello").await;
    let uri = normalize_target(&addr.to_string()).unwrap();
    assert_eq!(uri.scheme_str(), Some("http"));

    let report = LoadGenerator::new(
        plan(6, 2, Duration::from_secs(5), Duration::from_millis(1500)),
        HttpFetcher::new(uri).unwrap(),
        ShutdownCoordinator::new(),
    )
    .run()
    .await;

    let stats = report.stats;
    assert!(stats.total_requests >= 6, "got {}", stats.total_requests);
    assert_eq!(stats.failure_count, 0);
    assert_eq!(stats.success_count, stats.total_requests);
    assert_eq!(stats.bytes_received, 5 * stats.success_count);
    assert_eq!(stats.latency.count, stats.success_count);
    assert_eq!(report.abandoned, 0);
}

#[tokio::test]
async fn error_statuses_still_count_as_responses() {
    let addr = spawn_server(503, "busy").await;
    let uri = normalize_target(&format!("http://{addr}/")).unwrap();

    let report = LoadGenerator::new(
        plan(2, 1, Duration::from_secs(5), Duration::from_millis(500)),
        HttpFetcher::new(uri).unwrap(),
        ShutdownCoordinator::new(),
    )
    .run()
    .await;

    assert_eq!(report.stats.total_requests, 2);
    assert_eq!(report.stats.success_count, 2);
    assert!(report.stats.error_counts.is_empty());
}

#[tokio::test]
async fn refused_connections_are_connection_errors() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let report = LoadGenerator::new(
        plan(3, 1, Duration::from_secs(5), Duration::from_millis(500)),
        HttpFetcher::new(normalize_target(&addr.to_string()).unwrap()).unwrap(),
        ShutdownCoordinator::new(),
    )
    .run()
    .await;

    let stats = report.stats;
    assert_eq!(stats.total_requests, 3);
    assert_eq!(stats.success_count, 0);
    assert_eq!(stats.error_counts[&ErrorKind::ConnectionError], 3);
    assert!(stats.summary().to_string().contains("Connection Error: 3"));
}

#[tokio::test]
async fn unresponsive_target_times_out() {
    let addr = spawn_silent_server().await;

    let report = LoadGenerator::new(
        plan(1, 1, Duration::from_millis(300), Duration::from_millis(800)),
        HttpFetcher::new(normalize_target(&addr.to_string()).unwrap()).unwrap(),
        ShutdownCoordinator::new(),
    )
    .run()
    .await;

    let stats = report.stats;
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.error_counts[&ErrorKind::Timeout], 1);
    assert!(stats.latency.is_empty());
}

#[tokio::test]
async fn external_shutdown_ends_an_open_ended_run() {
    let addr = spawn_server(200, "ok").await;
    let shutdown = ShutdownCoordinator::new();
    let mut open_ended = plan(4, 2, Duration::from_secs(5), Duration::ZERO);
    open_ended.duration = None;

    let run = tokio::spawn(
        LoadGenerator::new(
            open_ended,
            HttpFetcher::new(normalize_target(&addr.to_string()).unwrap()).unwrap(),
            shutdown.clone(),
        )
        .run(),
    );

    tokio::time::sleep(Duration::from_millis(700)).await;
    shutdown.trigger();
    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run should stop promptly")
        .unwrap();

    assert_eq!(report.stats.total_requests, 4);
    assert!(report.stats.end_time.is_some());
}

#[tokio::test]
async fn https_target_is_fetched_over_tls() {
    let (addr, client_config) = spawn_tls_server("secure").await;
    let uri = normalize_target(&format!("https://localhost:{}/", addr.port())).unwrap();
    let fetcher = HttpFetcher::with_tls_config(uri, client_config).unwrap();
    assert!(fetcher.is_tls());

    let response = fetcher.fetch().await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.content_length, 6);

    let report = LoadGenerator::new(
        plan(4, 2, Duration::from_secs(5), Duration::from_millis(500)),
        fetcher,
        ShutdownCoordinator::new(),
    )
    .run()
    .await;

    assert_eq!(report.stats.total_requests, 4);
    assert_eq!(report.stats.success_count, 4);
    assert_eq!(report.stats.bytes_received, 24);
}

#[tokio::test]
async fn untrusted_certificate_is_a_connection_error() {
    let (addr, _) = spawn_tls_server("secure").await;
    let uri = normalize_target(&format!("https://localhost:{}", addr.port())).unwrap();

    let err = HttpFetcher::new(uri).unwrap().fetch().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConnectionError);
}
