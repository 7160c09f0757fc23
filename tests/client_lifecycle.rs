//! Integration tests for the client connection manager against a live server.

use chat_presence::{
    client::{ClientState, ConnectionEvent, ConnectionManager, ConnectionStatus, Endpoint},
    routes::build_router,
    state::AppState,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

async fn start_server() -> (SocketAddr, AppState) {
    let state = AppState::new(Vec::new());
    let app = build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

fn manager_for(addr: SocketAddr) -> ConnectionManager {
    ConnectionManager::new(Endpoint::parse(&addr.to_string()).unwrap())
}

async fn wait_for_state(manager: &ConnectionManager, check: impl FnMut(&ClientState) -> bool) {
    let mut rx = manager.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(check))
        .await
        .expect("timed out waiting for client state")
        .expect("state channel closed");
}

async fn wait_for_server(state: &AppState, user_id: &str, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.presence.lookup_connections(user_id).await.len() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{user_id} never reached {count} server connections"));
}

#[tokio::test]
async fn mirrors_online_users_from_broadcasts() {
    let (addr, _state) = start_server().await;
    let mut alice = manager_for(addr);
    let mut bob = manager_for(addr);

    alice.connect(Some("alice"));
    wait_for_state(&alice, |s| {
        s.status == ConnectionStatus::Connected && s.online_users == ["alice"]
    })
    .await;

    bob.connect(Some("bob"));
    wait_for_state(&alice, |s| s.online_users == ["alice", "bob"]).await;
    wait_for_state(&bob, |s| s.online_users == ["alice", "bob"]).await;

    bob.disconnect();
    assert!(bob.online_users().is_empty());
    wait_for_state(&alice, |s| s.online_users == ["alice"]).await;
}

#[tokio::test]
async fn connect_while_connected_keeps_one_connection() {
    let (addr, state) = start_server().await;
    let mut manager = manager_for(addr);

    manager.connect(Some("alice"));
    wait_for_state(&manager, |s| s.status == ConnectionStatus::Connected).await;
    let handle = manager.state().connection;

    manager.connect(Some("alice"));
    assert_eq!(manager.state().connection, handle);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.presence.lookup_connections("alice").await.len(), 1);
}

#[tokio::test]
async fn disconnect_twice_is_safe() {
    let (addr, state) = start_server().await;
    let mut manager = manager_for(addr);

    manager.connect(Some("alice"));
    wait_for_state(&manager, |s| s.online_users == ["alice"]).await;

    manager.disconnect();
    manager.disconnect();
    assert_eq!(manager.state(), ClientState::default());
    wait_for_server(&state, "alice", 0).await;
    assert!(state.presence.snapshot().await.is_empty());
}

#[tokio::test]
async fn reconnect_after_disconnect_opens_a_fresh_connection() {
    let (addr, state) = start_server().await;
    let mut manager = manager_for(addr);
    let mut events = manager.events();

    manager.connect(Some("alice"));
    wait_for_state(&manager, |s| s.status == ConnectionStatus::Connected).await;
    let first = manager.state().connection;
    manager.disconnect();
    wait_for_server(&state, "alice", 0).await;

    manager.connect(Some("alice"));
    wait_for_state(&manager, |s| s.online_users == ["alice"]).await;
    assert_ne!(manager.state().connection, first);
    wait_for_server(&state, "alice", 1).await;

    let mut connected = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ConnectionEvent::Connected(_)) {
            connected += 1;
        }
    }
    assert_eq!(connected, 2);
}

#[tokio::test]
async fn reconnect_after_server_drop_opens_one_connection() {
    let (addr, state) = start_server().await;
    let mut manager = manager_for(addr);

    manager.connect(Some("alice"));
    wait_for_state(&manager, |s| s.online_users == ["alice"]).await;
    let first = manager.state().connection.expect("handle assigned");
    let mut events = manager.events();

    assert_eq!(state.presence.close_user("alice", "kicked").await, 1);
    wait_for_state(&manager, |s| s.status == ConnectionStatus::Disconnected).await;
    wait_for_server(&state, "alice", 0).await;
    // The stale handle stays until the next connect replaces it.
    assert_eq!(manager.state().connection, Some(first));

    manager.connect(Some("alice"));
    wait_for_state(&manager, |s| s.status == ConnectionStatus::Connected).await;
    let second = manager.state().connection.expect("handle assigned");
    assert_ne!(second, first);
    wait_for_server(&state, "alice", 1).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.presence.lookup_connections("alice").await.len(), 1);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            ConnectionEvent::Disconnected {
                connection: first,
                reason: "kicked".to_string(),
            },
            ConnectionEvent::Connected(second),
        ]
    );
}

#[tokio::test]
async fn connect_without_session_opens_nothing() {
    let (addr, state) = start_server().await;
    let mut manager = manager_for(addr);

    manager.connect(None);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    assert_eq!(state.presence.connection_count().await, 0);
}
