//! End-to-end tests: a real server on a loopback port, real HTTP clients.

use std::time::Duration;

use minisync_client::{Client, ClientEvent, EventStream, Message, Reconnector};
use minisync_server::{DevServer, ServerConfig};
use pretty_assertions::assert_eq;
use tokio::sync::{mpsc, oneshot};
use tokio_test::assert_ok;

const TIMEOUT: Duration = Duration::from_secs(5);

fn config(dir: &std::path::Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        dirs: vec![dir.to_path_buf()],
        ..ServerConfig::default()
    }
}

/// Open an event stream. The connection is registered once the response
/// headers arrive.
async fn open_stream(port: u16) -> EventStream {
    let http = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{port}/__mini_sync__");
    assert_ok!(EventStream::connect(&http, &url).await)
}

async fn next_message(stream: &mut EventStream) -> Option<Message> {
    let message = tokio::time::timeout(TIMEOUT, stream.next()).await.unwrap();
    assert_ok!(message)
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(TIMEOUT, events.recv())
        .await
        .expect("no client event")
        .expect("client stopped")
}

#[tokio::test]
async fn occupied_port_moves_to_next_one() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let taken = blocker.local_addr().unwrap().port();

    let server = DevServer::new(ServerConfig {
        port: taken,
        ..config(dir.path())
    });
    let info = assert_ok!(server.start().await);

    assert_eq!(info.port, taken + 1);
    assert_eq!(info.local, format!("http://localhost:{}", taken + 1));
    assert_eq!(server.port(), Some(taken + 1));

    // the reported port is the one actually serving
    let response = reqwest::get(format!("http://127.0.0.1:{}/favicon.ico", info.port))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    assert_ok!(server.close().await);
}

#[tokio::test]
async fn reload_events_reach_every_client() {
    let dir = tempfile::tempdir().unwrap();
    let server = DevServer::new(config(dir.path()));
    let info = assert_ok!(server.start().await);

    let mut first = open_stream(info.port).await;
    let mut second = open_stream(info.port).await;
    assert_eq!(server.connection_count(), 2);

    let report = server.reload(Some("styles.css"));
    assert_eq!(report.attempted, 2);
    assert_eq!(report.delivered(), 2);
    server.reload(None);

    for stream in [&mut first, &mut second] {
        // the retry hint travels with the first dispatched event
        assert_eq!(
            next_message(stream).await,
            Some(Message::Retry(Duration::from_secs(10)))
        );

        let Some(Message::Reload(event)) = next_message(stream).await else {
            panic!("expected a reload event");
        };
        assert_eq!(event.file(), Some("styles.css"));

        let Some(Message::Reload(event)) = next_message(stream).await else {
            panic!("expected a reload event");
        };
        assert_eq!(event.file(), None);
    }

    assert_ok!(server.close().await);
}

#[tokio::test]
async fn keepalive_frames_are_sent() {
    let dir = tempfile::tempdir().unwrap();
    let server = DevServer::new(ServerConfig {
        keepalive_interval: Duration::from_millis(50),
        ..config(dir.path())
    });
    let info = assert_ok!(server.start().await);

    let mut response = reqwest::get(format!("http://127.0.0.1:{}/__mini_sync__", info.port))
        .await
        .unwrap();
    let mut received = Vec::new();
    let pinged = tokio::time::timeout(TIMEOUT, async {
        while let Some(chunk) = response.chunk().await.unwrap() {
            received.extend_from_slice(&chunk);
            if received.ends_with(b":ping\n") {
                break;
            }
        }
    })
    .await;

    assert!(pinged.is_ok(), "no keepalive frame");
    assert!(received.starts_with(b"retry: 10000\n"));
    assert!(received.ends_with(b":ping\n"));

    assert_ok!(server.close().await);
}

#[tokio::test]
async fn disconnected_client_gets_no_more_writes() {
    let dir = tempfile::tempdir().unwrap();
    let server = DevServer::new(config(dir.path()));
    let info = assert_ok!(server.start().await);

    let stream = open_stream(info.port).await;
    assert_eq!(server.connection_count(), 1);
    drop(stream);

    // writes to the dead socket surface the disconnect
    let converged = tokio::time::timeout(TIMEOUT, async {
        while server.connection_count() > 0 {
            server.reload(None);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(converged.is_ok(), "registry still holds the closed client");

    assert_eq!(server.reload(Some("app.css")).attempted, 0);

    assert_ok!(server.close().await);
}

#[tokio::test]
async fn close_terminates_open_streams() {
    let dir = tempfile::tempdir().unwrap();
    let server = DevServer::new(config(dir.path()));
    let info = assert_ok!(server.start().await);

    let mut stream = open_stream(info.port).await;

    tokio::time::timeout(TIMEOUT, server.close())
        .await
        .expect("close hung on an open stream")
        .unwrap();

    let end = tokio::time::timeout(TIMEOUT, stream.next()).await.unwrap();
    assert!(matches!(end, Ok(None) | Err(_)));
    assert_eq!(server.connection_count(), 0);

    assert!(reqwest::get(format!("http://127.0.0.1:{}/", info.port)).await.is_err());
}

#[tokio::test]
async fn servers_have_independent_registries() {
    let dir = tempfile::tempdir().unwrap();
    let one = DevServer::new(config(dir.path()));
    let two = DevServer::new(config(dir.path()));
    let info_one = assert_ok!(one.start().await);
    assert_ok!(two.start().await);

    let _stream = open_stream(info_one.port).await;

    assert_eq!(one.connection_count(), 1);
    assert_eq!(two.connection_count(), 0);
    assert_eq!(two.reload(None).attempted, 0);

    assert_ok!(one.close().await);
    assert_ok!(two.close().await);
}

#[tokio::test]
async fn served_pages_load_the_client() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("index.html"),
        "<html><head><title>t</title></head><body></body></html>",
    )
    .unwrap();
    let server = DevServer::new(config(dir.path()));
    let info = assert_ok!(server.start().await);
    let base = format!("http://127.0.0.1:{}", info.port);

    let page = reqwest::get(format!("{base}/")).await.unwrap();
    assert_eq!(page.status(), reqwest::StatusCode::OK);
    assert_eq!(page.headers()["content-type"], "text/html; charset=utf-8");
    let html = page.text().await.unwrap();
    assert!(html.contains("<script async src=\"/__mini_sync__/client.js\"></script>\n</head>"));

    let script = reqwest::get(format!("{base}/__mini_sync__/client.js")).await.unwrap();
    assert_eq!(script.headers()["content-type"], "text/javascript");
    let length: usize = script.headers()["content-length"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(script.bytes().await.unwrap().len(), length);

    let events = reqwest::Client::new()
        .get(format!("{base}/__mini_sync__"))
        .send()
        .await
        .unwrap();
    assert_eq!(events.headers()["content-type"], "text/event-stream");
    assert_eq!(
        events.headers()["cache-control"],
        "no-cache, no-store, must-revalidate"
    );
    drop(events);

    assert_ok!(server.close().await);
}

#[tokio::test]
async fn only_get_and_head_receive_injected_pages() {
    let dir = tempfile::tempdir().unwrap();
    let page = "<html><head></head><body></body></html>";
    std::fs::write(dir.path().join("index.html"), page).unwrap();
    let server = DevServer::new(config(dir.path()));
    let info = assert_ok!(server.start().await);
    let url = format!("http://127.0.0.1:{}/index.html", info.port);
    let http = reqwest::Client::new();

    let head = http.head(&url).send().await.unwrap();
    assert_eq!(head.status(), reqwest::StatusCode::OK);
    assert_eq!(head.headers()["content-type"], "text/html; charset=utf-8");
    let injected_length = page.len() + "<script async src=\"/__mini_sync__/client.js\"></script>\n".len();
    assert_eq!(head.headers()["content-length"], injected_length.to_string().as_str());

    let post = http.post(&url).send().await.unwrap();
    assert_ne!(post.status(), reqwest::StatusCode::OK);
    assert!(!post.text().await.unwrap().contains("client.js"));

    assert_ok!(server.close().await);
}

#[tokio::test]
async fn client_reconnects_after_server_restart() {
    let dir = tempfile::tempdir().unwrap();
    let fast = ServerConfig {
        retry_interval: Duration::from_millis(100),
        ..config(dir.path())
    };

    let first = DevServer::new(fast.clone());
    let port = assert_ok!(first.start().await).port;

    let mut client = assert_ok!(Client::new(&format!("http://127.0.0.1:{port}")))
        .with_reconnector(Reconnector::new(Duration::from_millis(100)));
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (stop_tx, stop) = oneshot::channel::<()>();

    let run = client.run(
        move |event| {
            let _ = events_tx.send(event);
        },
        async {
            let _ = stop.await;
        },
    );

    let drive = async {
        assert_eq!(next_event(&mut events).await, ClientEvent::Connected);
        // make sure the retry hint was read before the restart
        first.reload(Some("before.css"));
        let ClientEvent::Reload(event) = next_event(&mut events).await else {
            panic!("expected a reload event");
        };
        assert_eq!(event.file(), Some("before.css"));

        assert_ok!(first.close().await);
        assert_eq!(
            next_event(&mut events).await,
            ClientEvent::Disconnected {
                retry_in: Duration::from_millis(100)
            }
        );

        let second = DevServer::new(ServerConfig { port, ..fast.clone() });
        assert_eq!(assert_ok!(second.start().await).port, port);

        loop {
            match next_event(&mut events).await {
                ClientEvent::Connected => break,
                ClientEvent::Disconnected { .. } => {}
                ClientEvent::Reload(event) => panic!("unexpected reload {event:?}"),
            }
        }

        second.reload(Some("after.css"));
        let ClientEvent::Reload(event) = next_event(&mut events).await else {
            panic!("expected a reload event");
        };
        assert_eq!(event.file(), Some("after.css"));

        let _ = stop_tx.send(());
        assert_ok!(second.close().await);
    };

    tokio::join!(run, drive);
}
