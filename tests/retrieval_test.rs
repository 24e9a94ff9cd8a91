use std::fs;
use std::io::{Cursor, Write};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use privacy_proxy::observability::Metrics;
use privacy_proxy::proxy::{ClientOptions, ProxyRouter};
use privacy_proxy::retrieval::{
    AssetFetcher, FetchError, RetrievalEndpoint, RetrievalJob, RetrievalScheduler,
    RetryCoordinator, RetryPolicy,
};
use privacy_proxy::storage::{AssetStore, ResponseCache};

fn coordinator(store: &AssetStore, metrics: Arc<Metrics>, max_attempts: u32) -> RetryCoordinator {
    let options = ClientOptions {
        user_agent: Some("3rd Party Privacy Proxy".to_string()),
        ..ClientOptions::default()
    };
    let fetcher = AssetFetcher::new(&ProxyRouter::direct(), &options, store.clone(), metrics).unwrap();
    RetryCoordinator::new(
        Arc::new(fetcher),
        RetryPolicy {
            max_attempts,
            backoff: Duration::from_millis(10),
        },
    )
}

fn deflated_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Claim a larger uncompressed size for `name` than its data inflates to
fn overstate_entry_size(data: &mut [u8], name: &str, size: u32) {
    let u16_at = |data: &[u8], at: usize| u16::from_le_bytes([data[at], data[at + 1]]) as usize;
    for at in 0..data.len().saturating_sub(46) {
        let (size_at, name_len_at, name_at) = match &data[at..at + 4] {
            b"PK\x03\x04" => (at + 22, at + 26, at + 30),
            b"PK\x01\x02" => (at + 24, at + 28, at + 46),
            _ => continue,
        };
        let name_len = u16_at(data, name_len_at);
        if data.get(name_at..name_at + name_len) == Some(name.as_bytes()) {
            data[size_at..size_at + 4].copy_from_slice(&size.to_le_bytes());
        }
    }
}

/// Serve one response declaring `declared` bytes but sending only `body`,
/// then close the connection. Returns the base URL.
async fn short_body_server(declared: usize, body: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await.unwrap();

        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            declared
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(body).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_plain_file_is_committed_with_cache_buster() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jquery.js"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"window.jQuery = {};".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let store = AssetStore::new(temp.path());
    let metrics = Arc::new(Metrics::new());
    let coordinator = coordinator(&store, metrics.clone(), 4);

    let endpoint = RetrievalEndpoint::new(format!("{}/jquery.js", server.uri()), None);
    let retrieved = coordinator.retrieve("example", &endpoint).await.unwrap();

    assert_eq!(retrieved.files, vec!["jquery.js".to_string()]);
    assert_eq!(retrieved.bytes, 19);
    assert_eq!(
        fs::read(temp.path().join("example/jquery.js")).unwrap(),
        b"window.jQuery = {};"
    );
    assert!(!temp.path().join("example/jquery.js.tmp").exists());
    assert_eq!(metrics.snapshot().assets_committed, 1);

    let received = server.received_requests().await.unwrap();
    let request = &received[0];
    assert!(request.url.query_pairs().any(|(k, _)| k == "_"));
    assert_eq!(
        request.headers.get("user-agent").unwrap(),
        "3rd Party Privacy Proxy"
    );
}

#[tokio::test]
async fn test_transient_status_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app.js"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/app.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let store = AssetStore::new(temp.path());
    let coordinator = coordinator(&store, Arc::new(Metrics::new()), 4);

    let endpoint = RetrievalEndpoint::new(format!("{}/app.js", server.uri()), None);
    coordinator.retrieve("example", &endpoint).await.unwrap();

    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(fs::read(temp.path().join("example/app.js")).unwrap(), b"ok");
}

#[tokio::test]
async fn test_error_page_instead_of_pdf_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/terms.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Maintenance</html>"))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("legal")).unwrap();
    fs::write(temp.path().join("legal/terms.pdf"), b"%PDF-1.4 previous %%EOF").unwrap();

    let store = AssetStore::new(temp.path());
    let coordinator = coordinator(&store, Arc::new(Metrics::new()), 4);

    let endpoint = RetrievalEndpoint::new(format!("{}/terms.pdf", server.uri()), None);
    let err = coordinator.retrieve("legal", &endpoint).await.unwrap_err();

    assert!(matches!(err, FetchError::InvalidFormat(_)));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(
        fs::read(temp.path().join("legal/terms.pdf")).unwrap(),
        b"%PDF-1.4 previous %%EOF"
    );
}

#[tokio::test]
async fn test_valid_pdf_is_committed() {
    let server = MockServer::start().await;
    let pdf = b"\xEF\xBB\xBF%PDF-1.7\n1 0 obj\n<<>>\nendobj\n%%EOF\n".to_vec();
    Mock::given(method("GET"))
        .and(path("/privacy.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf.clone()))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let store = AssetStore::new(temp.path());
    let coordinator = coordinator(&store, Arc::new(Metrics::new()), 1);

    let endpoint = RetrievalEndpoint::new(format!("{}/privacy.pdf", server.uri()), None);
    coordinator.retrieve("legal", &endpoint).await.unwrap();

    assert_eq!(fs::read(temp.path().join("legal/privacy.pdf")).unwrap(), pdf);
}

#[tokio::test]
async fn test_truncated_transfer_is_a_size_mismatch() {
    let base = short_body_server(100, &[b'x'; 50]).await;

    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("example")).unwrap();
    fs::write(temp.path().join("example/lib.js"), b"old").unwrap();

    let store = AssetStore::new(temp.path());
    let coordinator = coordinator(&store, Arc::new(Metrics::new()), 1);

    let endpoint = RetrievalEndpoint::new(format!("{}/lib.js", base), None);
    let err = coordinator.retrieve("example", &endpoint).await.unwrap_err();

    match err {
        FetchError::SizeMismatch {
            declared,
            transferred,
            ..
        } => {
            assert_eq!(declared, 100);
            assert!(transferred <= 50);
        }
        other => panic!("expected a size mismatch, got {:?}", other),
    }
    assert_eq!(fs::read(temp.path().join("example/lib.js")).unwrap(), b"old");
    assert!(!temp.path().join("example/lib.js.tmp").exists());
}

#[tokio::test]
async fn test_archive_with_short_entry_keeps_good_entry() {
    let mut archive = deflated_zip(&[
        ("roboto-regular.ttf", b"REGULAR-FONT-DATA"),
        ("roboto-bold.ttf", b"BOLD-FONT-PAYLOAD"),
    ]);
    overstate_entry_size(&mut archive, "roboto-bold.ttf", 25);

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("google")).unwrap();
    let store = AssetStore::new(temp.path());
    let coordinator = coordinator(&store, Arc::new(Metrics::new()), 3);

    let endpoint = RetrievalEndpoint::new(
        format!("{}/download?family=Roboto", server.uri()),
        Some("roboto.zip".to_string()),
    );
    let err = coordinator.retrieve("google", &endpoint).await.unwrap_err();

    assert!(matches!(
        err,
        FetchError::SizeMismatch {
            declared: 25,
            transferred: 17,
            ..
        }
    ));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(
        fs::read(temp.path().join("google/roboto-regular.ttf")).unwrap(),
        b"REGULAR-FONT-DATA"
    );
    assert!(!temp.path().join("google/roboto-bold.ttf").exists());
    assert!(!temp.path().join("google/roboto-bold.ttf.tmp").exists());
    assert!(!temp.path().join("google/roboto.zip.tmp").exists());
    assert!(!temp.path().join("google/roboto.zip").exists());
}

#[tokio::test]
async fn test_scheduler_run_isolates_failures_and_invalidates_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lib.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("lib"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone.js"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let store = AssetStore::new(temp.path());
    let metrics = Arc::new(Metrics::new());
    let cache = Arc::new(ResponseCache::new());
    cache.insert(
        "js",
        "example/lib.js",
        store_asset("example", "lib.js", b"stale"),
    );

    let job = RetrievalJob {
        provider: "example".to_string(),
        endpoints: vec![
            RetrievalEndpoint::new(format!("{}/gone.js", server.uri()), None),
            RetrievalEndpoint::new(format!("{}/lib.js", server.uri()), None),
        ],
        schedule: cron::Schedule::from_str("0 0 3 * * *").unwrap(),
        cache_group: "js".to_string(),
    };

    let scheduler = RetrievalScheduler::new(
        vec![job],
        coordinator(&store, metrics.clone(), 2),
        store.clone(),
        cache.clone(),
        metrics.clone(),
    );

    let report = scheduler.run("example").await.unwrap();
    assert_eq!(report.succeeded, vec!["lib.js".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert!(cache.get("js", "example/lib.js").is_none());
    assert_eq!(fs::read(temp.path().join("example/lib.js")).unwrap(), b"lib");
    assert_eq!(metrics.snapshot().retrieval_failures, 1);
}

fn store_asset(provider: &str, filename: &str, bytes: &'static [u8]) -> privacy_proxy::storage::CachedAsset {
    privacy_proxy::storage::CachedAsset {
        provider: provider.to_string(),
        filename: filename.to_string(),
        bytes: bytes::Bytes::from_static(bytes),
        committed_at: chrono::Utc::now(),
    }
}
