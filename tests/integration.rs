//! End-to-end tests: file on disk -> watcher -> store -> HTTP over real TCP

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use frame_monitor::{FrameServer, FrameStore, ServerConfig, SourceWatcher, WatcherConfig};

struct TestServer {
    addr: SocketAddr,
    server: Arc<FrameServer>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<frame_monitor::Result<()>>,
}

impl TestServer {
    async fn start(store: Arc<FrameStore>, config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(FrameServer::new(config, store));
        let (tx, rx) = oneshot::channel::<()>();

        let task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                server
                    .serve(listener, async {
                        let _ = rx.await;
                    })
                    .await
            })
        };

        Self {
            addr,
            server,
            shutdown: Some(tx),
            task,
        }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await.unwrap().unwrap();
    }
}

struct HttpResponse {
    status: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

/// One-shot GET over a fresh connection
async fn get(addr: SocketAddr, path: &str, extra_headers: &[(&str, &str)]) -> HttpResponse {
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n");
    for (name, value) in extra_headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();

    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response head terminator");
    let head = String::from_utf8(raw[..split].to_vec()).unwrap();
    let body = raw[split + 4..].to_vec();

    let mut lines = head.split("\r\n");
    let status = lines
        .next()
        .and_then(|l| l.split(' ').nth(1))
        .and_then(|s| s.parse().ok())
        .unwrap();
    let headers = lines
        .filter_map(|l| l.split_once(": "))
        .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
        .collect::<HashMap<_, _>>();

    if let Some(length) = headers.get("content-length") {
        assert_eq!(body.len(), length.parse::<usize>().unwrap(), "body length mismatch");
    }

    HttpResponse {
        status,
        headers,
        body,
    }
}

/// Open `/video` and consume the response head
async fn open_stream(addr: SocketAddr) -> (TcpStream, HashMap<String, String>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /video HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        let mut byte = [0u8; 1];
        assert_eq!(stream.read(&mut byte).await.unwrap(), 1);
        head.push(byte[0]);
    }
    let head = String::from_utf8(head).unwrap();
    assert!(head.starts_with("HTTP/1.1 200 OK"), "unexpected head: {head}");

    let headers = head
        .split("\r\n")
        .skip(1)
        .filter_map(|l| l.split_once(": "))
        .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
        .collect();

    (stream, headers)
}

/// Read one chunked multipart part and return its payload
async fn next_part<R: AsyncRead + Unpin>(reader: &mut R) -> Option<Vec<u8>> {
    let size_line = read_line(reader).await?;
    let size = usize::from_str_radix(size_line.trim(), 16).ok()?;
    if size == 0 {
        return None;
    }

    let mut chunk = vec![0u8; size + 2];
    reader.read_exact(&mut chunk).await.ok()?;
    chunk.truncate(size);

    let text_end = chunk.windows(4).position(|w| w == b"\r\n\r\n")?;
    let head = std::str::from_utf8(&chunk[..text_end]).ok()?;
    assert!(head.starts_with("--frame\r\nContent-Type: image/jpeg\r\n"));
    let length: usize = head
        .split("\r\n")
        .find_map(|l| l.strip_prefix("Content-Length: "))?
        .parse()
        .ok()?;

    let body = &chunk[text_end + 4..];
    assert_eq!(&body[length..], b"\r\n");
    Some(body[..length].to_vec())
}

async fn read_line<R: AsyncRead + Unpin>(reader: &mut R) -> Option<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    while !line.ends_with(b"\r\n") {
        if reader.read(&mut byte).await.ok()? == 0 {
            return None;
        }
        line.push(byte[0]);
    }
    line.truncate(line.len() - 2);
    String::from_utf8(line).ok()
}

/// Fake JPEG: SOI marker, a label, padding, EOI marker
fn test_jpeg(label: &str, padding: usize) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.extend_from_slice(format!("TEST_IMAGE_{label}_").as_bytes());
    data.extend(std::iter::repeat(0x5A).take(padding));
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

fn write_atomically(path: &Path, data: &[u8]) {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data).unwrap();
    std::fs::rename(&tmp, path).unwrap();
}

async fn wait_for<F: Fn() -> bool>(condition: F, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[tokio::test]
async fn test_full_system() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("output.jpg");
    let store = Arc::new(FrameStore::new());

    let watcher_config = WatcherConfig::new(&path).poll_interval(Duration::from_millis(10));
    let mut watcher = SourceWatcher::from_config(&watcher_config, Arc::clone(&store));
    watcher.start().await;
    let server = TestServer::start(Arc::clone(&store), ServerConfig::default()).await;

    // Nothing on disk yet
    let health = get(server.addr, "/health", &[]).await;
    assert_eq!(health.status, 200);
    assert_eq!(health.headers["content-type"], "application/json");
    let json: serde_json::Value = serde_json::from_slice(&health.body).unwrap();
    assert_eq!(json["status"], "no_image");
    assert_eq!(get(server.addr, "/image", &[]).await.status, 404);

    let first = test_jpeg("first", 1000);
    write_atomically(&path, &first);
    assert!(wait_for(|| store.has_data(), Duration::from_secs(2)).await);

    let image = get(server.addr, "/image", &[]).await;
    assert_eq!(image.status, 200);
    assert_eq!(image.body, first);
    assert_eq!(image.headers["content-type"], "image/jpeg");
    assert_eq!(image.headers["cache-control"], "no-cache");
    assert!(image.headers["last-modified"].ends_with(" GMT"));
    let etag = image.headers["etag"].clone();
    assert!(etag.starts_with('"') && etag.ends_with('"'));

    let cached = get(server.addr, "/image", &[("If-None-Match", &etag)]).await;
    assert_eq!(cached.status, 304);
    assert!(cached.body.is_empty());
    assert_eq!(cached.headers["etag"], etag);

    // Different size guarantees a different token
    let second = test_jpeg("second", 2000);
    write_atomically(&path, &second);
    assert!(wait_for(|| store.generation() >= 2, Duration::from_secs(2)).await);

    let updated = get(server.addr, "/image", &[("If-None-Match", &etag)]).await;
    assert_eq!(updated.status, 200);
    assert_eq!(updated.body, second);
    assert_ne!(updated.headers["etag"], etag);

    let json: serde_json::Value =
        serde_json::from_slice(&get(server.addr, "/health", &[]).await.body).unwrap();
    assert_eq!(json["status"], "ok");

    // Removing the file keeps the last frame
    std::fs::remove_file(&path).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(get(server.addr, "/image", &[]).await.body, second);

    server.stop().await;
    watcher.stop().await;
}

#[tokio::test]
async fn test_static_routes() {
    let store = Arc::new(FrameStore::new());
    let server = TestServer::start(store, ServerConfig::default()).await;

    let index = get(server.addr, "/", &[]).await;
    assert_eq!(index.status, 200);
    assert!(index.headers["content-type"].starts_with("text/html"));
    assert!(String::from_utf8_lossy(&index.body).contains("Frame Monitor"));

    let logo = get(server.addr, "/logo.svg", &[]).await;
    assert_eq!(logo.status, 200);
    assert_eq!(logo.headers["content-type"], "image/svg+xml");

    assert_eq!(get(server.addr, "/nonexistent", &[]).await.status, 404);

    server.stop().await;
}

#[tokio::test]
async fn test_stream_follows_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("output.jpg");
    let store = Arc::new(FrameStore::new());

    let watcher_config = WatcherConfig::new(&path).poll_interval(Duration::from_millis(10));
    let mut watcher = SourceWatcher::from_config(&watcher_config, Arc::clone(&store));
    watcher.start().await;
    let config = ServerConfig::default().frame_interval(Duration::from_millis(20));
    let server = TestServer::start(Arc::clone(&store), config).await;

    let (mut stream, headers) = open_stream(server.addr).await;
    assert_eq!(
        headers["content-type"],
        "multipart/x-mixed-replace; boundary=frame"
    );
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["connection"], "keep-alive");

    // No frames while the store is empty
    let early = tokio::time::timeout(Duration::from_millis(100), next_part(&mut stream)).await;
    assert!(early.is_err());

    let first = test_jpeg("a", 500);
    write_atomically(&path, &first);
    let part = tokio::time::timeout(Duration::from_secs(2), next_part(&mut stream))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(part, first);

    let second = test_jpeg("b", 900);
    write_atomically(&path, &second);
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let part = next_part(&mut stream).await.unwrap();
        if part == second {
            break;
        }
        assert_eq!(part, first, "stream produced a frame that was never published");
        assert!(Instant::now() < deadline, "stream never picked up the new frame");
    }

    server.stop().await;
    watcher.stop().await;
}

#[tokio::test]
async fn test_http10_stream_has_bare_parts() {
    let store = Arc::new(FrameStore::new());
    store.publish(Bytes::from_static(b"JPEGDATA"), Utc::now(), 8);
    let config = ServerConfig::default().frame_interval(Duration::from_millis(20));
    let server = TestServer::start(Arc::clone(&store), config).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(b"GET /video HTTP/1.0\r\n\r\n").await.unwrap();

    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        let mut byte = [0u8; 1];
        assert_eq!(stream.read(&mut byte).await.unwrap(), 1);
        head.push(byte[0]);
    }
    let head = String::from_utf8(head).unwrap().to_ascii_lowercase();
    assert!(!head.contains("transfer-encoding"));
    assert!(head.contains("connection: close"));

    let expected = b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 8\r\n\r\nJPEGDATA\r\n";
    let mut body = vec![0u8; expected.len() * 2];
    stream.read_exact(&mut body).await.unwrap();
    assert!(body.starts_with(b"--frame\r\n"));
    assert_eq!(&body[..expected.len()], &expected[..]);
    assert_eq!(&body[expected.len()..], &expected[..]);

    server.stop().await;

    // Body ends with the connection
    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.map(|_| rest)
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(drained.len() % expected.len(), 0);
}

#[tokio::test]
async fn test_stream_disconnect_releases_connection() {
    let store = Arc::new(FrameStore::new());
    store.publish(Bytes::from(test_jpeg("x", 100)), Utc::now(), 120);

    let interval = Duration::from_millis(30);
    let config = ServerConfig::default().frame_interval(interval);
    let server = TestServer::start(Arc::clone(&store), config).await;

    let (mut stream, _) = open_stream(server.addr).await;
    next_part(&mut stream).await.unwrap();
    assert!(wait_for(|| server.server.stats().active_streams == 1, Duration::from_secs(1)).await);

    drop(stream);

    // Loop notices at its next tick at the latest; allow scheduling slack
    assert!(
        wait_for(
            || server.server.stats().active_streams == 0,
            interval * 2 + Duration::from_millis(200)
        )
        .await
    );
    assert!(wait_for(|| server.server.stats().active_connections == 0, Duration::from_secs(1)).await);
    assert!(server.server.stats().frames_sent >= 1);

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_ends_streams() {
    let store = Arc::new(FrameStore::new());
    store.publish(Bytes::from_static(b"frame"), Utc::now(), 5);
    let server = TestServer::start(store, ServerConfig::default()).await;

    let (mut stream, _) = open_stream(server.addr).await;
    next_part(&mut stream).await.unwrap();

    server.stop().await;

    // Remaining parts drain, then the terminating chunk and EOF
    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        while next_part(&mut stream).await.is_some() {}
    })
    .await;
    assert!(drained.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fetches_under_updates() {
    let store = Arc::new(FrameStore::new());
    let server = TestServer::start(Arc::clone(&store), ServerConfig::default()).await;

    // Each payload is self-describing: a label naming its sequence number and
    // a padding length derived from it, so any torn body fails validation
    fn payload(seq: u32) -> Vec<u8> {
        test_jpeg(&format!("{seq:06}"), 1000 + (seq as usize % 97) * 10)
    }

    store.publish(Bytes::from(payload(0)), Utc::now(), payload(0).len() as u64);

    let publisher = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(33));
            let started = Instant::now();
            let mut seq = 1;
            while started.elapsed() < Duration::from_secs(2) {
                ticker.tick().await;
                let data = payload(seq);
                let size = data.len() as u64;
                store.publish(Bytes::from(data), Utc::now(), size);
                seq += 1;
            }
        })
    };

    let mut clients = Vec::new();
    for _ in 0..50 {
        let addr = server.addr;
        clients.push(tokio::spawn(async move {
            let started = Instant::now();
            let mut fetched = 0;
            while started.elapsed() < Duration::from_secs(2) {
                let response = get(addr, "/image", &[]).await;
                assert_eq!(response.status, 200);

                let label = &response.body[4..4 + "TEST_IMAGE_000000".len()];
                let seq: u32 = std::str::from_utf8(&label[11..]).unwrap().parse().unwrap();
                assert_eq!(response.body, payload(seq), "corrupted body for frame {seq}");

                fetched += 1;
            }
            fetched
        }));
    }

    let mut total = 0;
    for client in clients {
        total += client.await.unwrap();
    }
    publisher.await.unwrap();

    assert!(total >= 50);
    assert!(store.generation() > 30);

    server.stop().await;
}
