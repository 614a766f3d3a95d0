//! Integration tests for name uniqueness under concurrent joins.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chat_core::Username;
use chat_protocol::{is_error_reply, read_frame, write_frame, DEFAULT_MAX_FRAME_SIZE};
use chatd::config::ServerConfig;
use chatd::ranking::MemoryRankingStore;
use chatd::registry::{RegistryError, SessionHandle, SessionRegistry};
use chatd::server::{ChatServer, ServerContext};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

fn create_handle(id: u64, name: &str) -> (SessionHandle, mpsc::Receiver<Bytes>) {
    let (tx, rx) = mpsc::channel(8);
    let handle = SessionHandle::new(id, Username::parse(name).unwrap(), tx, CancellationToken::new());
    (handle, rx)
}

#[tokio::test]
async fn test_basic_lifecycle() {
    let registry = SessionRegistry::new(10);
    let (handle, _rx) = create_handle(1, "alice");

    registry.try_register(handle.clone()).await.unwrap();
    assert_eq!(registry.lookup("alice").await.unwrap().id(), 1);

    assert!(registry.unregister_session(&handle).await);
    assert!(registry.is_empty().await);
    assert!(matches!(
        registry.lookup("alice").await,
        Err(RegistryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_capacity_limit() {
    let registry = SessionRegistry::new(3);
    let mut receivers = Vec::new();

    for (id, name) in ["a", "b", "c"].into_iter().enumerate() {
        let (handle, rx) = create_handle(id as u64, name);
        registry.try_register(handle).await.unwrap();
        receivers.push(rx);
    }

    let (extra, _rx) = create_handle(99, "d");
    assert_eq!(
        registry.try_register(extra).await,
        Err(RegistryError::RegistryFull { max: 3 })
    );

    // Freeing a slot lets the next join in
    registry.unregister("a").await;
    let (extra, _rx) = create_handle(100, "d");
    registry.try_register(extra).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_names_all_succeed() {
    let registry = SessionRegistry::new(100);

    let mut tasks = Vec::new();
    for id in 0..50u64 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let (handle, rx) = create_handle(id, &format!("user{id}"));
            registry.try_register(handle).await.map(|()| rx)
        }));
    }

    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }
    assert_eq!(registry.len().await, 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_name_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let context = ServerContext::new(
        ServerConfig::default(),
        Arc::new(MemoryRankingStore::new()),
    )
    .unwrap();
    let cancel = CancellationToken::new();
    let server = ChatServer::from_listener(listener, context.clone(), cancel.clone());
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    let mut tasks = Vec::new();
    for _ in 0..16 {
        tasks.push(tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            write_frame(&mut stream, "alice", DEFAULT_MAX_FRAME_SIZE)
                .await
                .unwrap();
            let reply = timeout(RECV_TIMEOUT, read_frame(&mut stream, DEFAULT_MAX_FRAME_SIZE))
                .await
                .unwrap()
                .unwrap();
            (reply, stream)
        }));
    }

    let mut winners = 0;
    let mut streams = Vec::new();
    for task in tasks {
        let (reply, stream) = task.await.unwrap();
        if is_error_reply(&reply) {
            assert!(reply.contains("already taken"), "got {reply:?}");
        } else {
            assert_eq!(reply, "Welcome alice to the chat room.");
            winners += 1;
        }
        streams.push(stream);
    }

    assert_eq!(winners, 1);
    assert_eq!(context.registry.len().await, 1);

    cancel.cancel();
}
