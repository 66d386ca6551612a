//! Integration tests for respwire-client.
//!
//! Sessions talk to an in-process store over loopback TCP. The store
//! understands `SUBSCRIBE`, `UNSUBSCRIBE` and `PUBLISH` and fans messages out
//! to every connection subscribed to a channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use respwire_client::protocol::{encode_command, Frame, FrameBuffer};
use respwire_client::{
    ChatMessage, ChatRoom, ConnectionConfig, EventKind, Flow, PubSubEvent, RespwireError, Session,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

type Subscribers = Arc<Mutex<HashMap<String, Vec<(usize, mpsc::UnboundedSender<Bytes>)>>>>;

/// Minimal pub/sub store.
struct MockStore {
    port: u16,
    subscribers: Subscribers,
}

impl MockStore {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let subscribers: Subscribers = Arc::default();

        let shared = subscribers.clone();
        tokio::spawn(async move {
            let mut next_id = 0;
            while let Ok((stream, _)) = listener.accept().await {
                next_id += 1;
                tokio::spawn(serve(stream, next_id, shared.clone()));
            }
        });

        MockStore { port, subscribers }
    }

    fn config(&self) -> ConnectionConfig {
        ConnectionConfig::new("127.0.0.1", self.port)
    }

    fn subscriber_count(&self, channel: &str) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(channel)
            .map_or(0, Vec::len)
    }

    async fn wait_for_subscribers(&self, channel: &str, count: usize) {
        eventually(|| self.subscriber_count(channel) == count).await;
    }
}

fn confirmation(kind: &str, channel: Option<&str>, count: usize) -> Bytes {
    let channel = match channel {
        Some(name) => format!("${}\r\n{}\r\n", name.len(), name),
        None => "$-1\r\n".to_string(),
    };
    Bytes::from(format!(
        "*3\r\n${}\r\n{}\r\n{}:{}\r\n",
        kind.len(),
        kind,
        channel,
        count
    ))
}

async fn serve(stream: tokio::net::TcpStream, id: usize, subscribers: Subscribers) {
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

    tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if writer.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    let mut frames = FrameBuffer::new();
    let mut mine: Vec<String> = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        frames.feed(&buf[..n]);

        while let Some(frame) = frames.next_frame().unwrap() {
            let args: Vec<String> = frame
                .elements()
                .unwrap()
                .iter()
                .map(|arg| arg.as_str().unwrap().to_string())
                .collect();

            match args[0].as_str() {
                "SUBSCRIBE" => {
                    for channel in &args[1..] {
                        subscribers
                            .lock()
                            .unwrap()
                            .entry(channel.clone())
                            .or_default()
                            .push((id, tx.clone()));
                        mine.push(channel.clone());
                        let _ = tx.send(confirmation("subscribe", Some(channel.as_str()), mine.len()));
                    }
                }
                "UNSUBSCRIBE" => {
                    let targets = if args.len() == 1 {
                        mine.clone()
                    } else {
                        args[1..].to_vec()
                    };
                    if targets.is_empty() {
                        let _ = tx.send(confirmation("unsubscribe", None, 0));
                    }
                    for channel in targets {
                        if let Some(list) = subscribers.lock().unwrap().get_mut(&channel) {
                            list.retain(|(owner, _)| *owner != id);
                        }
                        mine.retain(|c| *c != channel);
                        let _ = tx.send(confirmation("unsubscribe", Some(channel.as_str()), mine.len()));
                    }
                }
                "PUBLISH" => {
                    let push = encode_command(["message", args[1].as_str(), args[2].as_str()]);
                    let receivers = subscribers
                        .lock()
                        .unwrap()
                        .get(&args[1])
                        .map(|list| {
                            list.iter()
                                .filter(|(_, out)| out.send(push.clone()).is_ok())
                                .count()
                        })
                        .unwrap_or(0);
                    let _ = tx.send(Bytes::from(format!(":{}\r\n", receivers)));
                }
                other => panic!("unexpected command {}", other),
            }
        }
    }

    for list in subscribers.lock().unwrap().values_mut() {
        list.retain(|(owner, _)| *owner != id);
    }
}

async fn eventually(check: impl Fn() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

fn recorder() -> (
    Arc<Mutex<Vec<PubSubEvent>>>,
    impl Fn(&PubSubEvent) -> Flow + Send + Sync + 'static,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |event: &PubSubEvent| {
        sink.lock().unwrap().push(event.clone());
        Flow::Continue
    })
}

/// Publish on one connection, receive on another.
#[tokio::test]
async fn test_publish_reaches_subscriber() {
    let store = MockStore::start().await;
    let subscriber = Session::connect_with(store.config()).await.unwrap();
    let publisher = Session::connect("127.0.0.1", store.port).await.unwrap();

    let (seen, handler) = recorder();
    subscriber.subscribe(["news"], handler).unwrap();
    store.wait_for_subscribers("news", 1).await;

    publisher.publish("news", "héllo").unwrap();
    publisher.publish("elsewhere", "ignored").unwrap();

    eventually(|| seen.lock().unwrap().len() == 2).await;
    {
        let events = seen.lock().unwrap();
        assert_eq!(events[0].kind(), EventKind::Subscribe);
        assert_eq!(events[0].count(), Some(1));
        assert_eq!(events[1].kind(), EventKind::Message);
        assert_eq!(events[1].channel(), "news");
        assert_eq!(events[1].data().unwrap().as_ref(), "héllo".as_bytes());
    }

    // Integer replies to PUBLISH must not tear the publisher down.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!publisher.is_closed());

    publisher.close();
    subscriber.close();
    publisher.wait_for_shutdown().await.unwrap();
    subscriber.wait_for_shutdown().await.unwrap();
}

/// A handler returning `Stop` closes the connection cleanly.
#[tokio::test]
async fn test_handler_stop_ends_session() {
    let store = MockStore::start().await;
    let subscriber = Session::builder()
        .host("127.0.0.1")
        .port(store.port)
        .read_buffer_size(16)
        .connect()
        .await
        .unwrap();
    let publisher = Session::connect_with(store.config()).await.unwrap();

    subscriber
        .subscribe(["control"], |event: &PubSubEvent| match event.data() {
            Some(data) if data.as_ref() == b"quit" => Flow::Stop,
            _ => Flow::Continue,
        })
        .unwrap();
    store.wait_for_subscribers("control", 1).await;

    publisher.publish("control", "keep going").unwrap();
    publisher.publish("control", "quit").unwrap();

    subscriber.wait_for_shutdown().await.unwrap();
    store.wait_for_subscribers("control", 0).await;
}

/// Unsubscribe confirmations drop handlers; a second bare unsubscribe gets a null ack.
#[tokio::test]
async fn test_unsubscribe_flow() {
    let store = MockStore::start().await;
    let session = Session::connect_with(store.config()).await.unwrap();

    let (seen, handler) = recorder();
    session.subscribe(["a", "b", "c"], handler).unwrap();
    store.wait_for_subscribers("c", 1).await;
    assert_eq!(session.subscribed_channels(), vec!["a", "b", "c"]);

    session.unsubscribe_channels(["b"]).unwrap();
    eventually(|| session.subscribed_channels() == vec!["a", "c"]).await;

    session.unsubscribe().unwrap();
    eventually(|| session.subscribed_channels().is_empty()).await;

    session.unsubscribe().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!session.is_closed());

    let kinds: Vec<EventKind> = seen.lock().unwrap().iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Subscribe,
            EventKind::Subscribe,
            EventKind::Subscribe,
            EventKind::Unsubscribe,
            EventKind::Unsubscribe,
            EventKind::Unsubscribe,
        ]
    );

    session.close();
    session.wait_for_shutdown().await.unwrap();
}

/// Connecting to a closed port fails with a connection error.
#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = Session::connect("127.0.0.1", port).await.unwrap_err();
    assert!(matches!(err, RespwireError::Connection { .. }));
}

/// A store that hangs up is reported as `ConnectionClosed`.
#[tokio::test]
async fn test_peer_hangup() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (session, accepted) = tokio::join!(Session::connect("127.0.0.1", port), listener.accept());
    let session = session.unwrap();
    drop(accepted.unwrap());

    let err = session.wait_for_shutdown().await.unwrap_err();
    assert!(matches!(err, RespwireError::ConnectionClosed));
}

/// Garbage from the store is fatal and nothing reaches the handler.
#[tokio::test]
async fn test_malformed_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (session, accepted) = tokio::join!(Session::connect("127.0.0.1", port), listener.accept());
    let session = session.unwrap();
    let (mut server, _) = accepted.unwrap();

    let (seen, handler) = recorder();
    session.subscribe(["chat"], handler).unwrap();

    // Valid push split across writes, then garbage.
    server.write_all(b"*3\r\n$7\r\nmess").await.unwrap();
    server.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    server
        .write_all(b"age\r\n$4\r\nchat\r\n$2\r\nhi\r\n!bad\r\n")
        .await
        .unwrap();

    let err = session.wait_for_shutdown().await.unwrap_err();
    assert!(matches!(err, RespwireError::Protocol(_)));

    let events = seen.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data().unwrap().as_ref(), b"hi");
}

/// Exact bytes on the wire for each command.
#[tokio::test]
async fn test_command_wire_bytes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (session, accepted) = tokio::join!(Session::connect("127.0.0.1", port), listener.accept());
    let session = session.unwrap();
    let (mut server, _) = accepted.unwrap();

    session
        .subscribe(["chat"], |_: &PubSubEvent| Flow::Continue)
        .unwrap();
    session.publish("chat", [0u8, 255, 13, 10]).unwrap();
    session.unsubscribe().unwrap();
    session.close();

    let mut written = Vec::new();
    server.read_to_end(&mut written).await.unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(b"*2\r\n$9\r\nSUBSCRIBE\r\n$4\r\nchat\r\n");
    expected.extend_from_slice(b"*3\r\n$7\r\nPUBLISH\r\n$4\r\nchat\r\n$4\r\n\x00\xff\r\n\r\n");
    expected.extend_from_slice(b"*1\r\n$11\r\nUNSUBSCRIBE\r\n");
    assert_eq!(written, expected);

    // What the store sees decodes back into the same arguments.
    let frames = FrameBuffer::new().push(&written).unwrap();
    assert_eq!(frames.len(), 3);
    assert_eq!(
        frames[1],
        Frame::MultiBulk(vec![
            Frame::BulkString(Bytes::from_static(b"PUBLISH")),
            Frame::BulkString(Bytes::from_static(b"chat")),
            Frame::BulkString(Bytes::from_static(&[0, 255, 13, 10])),
        ])
    );
}

/// Two chat rooms talking through the store.
#[tokio::test]
async fn test_chat_rooms_end_to_end() {
    let store = MockStore::start().await;
    let config = store.config();

    let bob_seen = Arc::new(Mutex::new(Vec::new()));
    let sink = bob_seen.clone();
    let mut bob = ChatRoom::open(&config, "lobby", move |msg| sink.lock().unwrap().push(msg))
        .await
        .unwrap();
    bob.join("bob").unwrap();
    store.wait_for_subscribers("lobby", 1).await;

    let mut ada = ChatRoom::open(&config, "lobby", |_| {}).await.unwrap();
    ada.handle_client_data(br#"{"action":"join","user":"ada"}"#)
        .unwrap();
    ada.handle_client_data(br#"{"action":"message","message":"/me waves"}"#)
        .unwrap();
    ada.leave().await.unwrap();

    let expected = vec![
        ChatMessage::control("ada", "joined the chat room"),
        ChatMessage::message(Some("ada"), "/me waves"),
        ChatMessage::control("ada", "left the chat room"),
    ];
    eventually(|| {
        bob_seen
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.user() == Some("ada"))
            .count()
            == expected.len()
    })
    .await;

    let from_ada: Vec<ChatMessage> = bob_seen
        .lock()
        .unwrap()
        .iter()
        .filter(|m| m.user() == Some("ada"))
        .cloned()
        .collect();
    assert_eq!(from_ada, expected);
    assert_eq!(from_ada[1].to_string(), "* ada waves");

    bob.leave().await.unwrap();
    store.wait_for_subscribers("lobby", 0).await;
}
