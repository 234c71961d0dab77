//! Gateway Integration Tests
//!
//! Navigation away and back, driven through two gateways that share one
//! relay, the way two browser pages would.

use std::sync::Arc;
use std::time::Duration;

use session_relay::services::remote::GatewayState;
use session_relay::{ConnectionGateway, RelayConfig, RelayState};
use session_relay_core::{
    ClientMessage, ClientStateCache, FileBrowserState, InMemoryClientStateCache, ServerMessage,
    TerminalState,
};
use tokio::sync::mpsc;

use crate::support::{connect_request, FakeHost};

// ============================================================================
// Helper Functions
// ============================================================================

fn open_transport(relay: &Arc<RelayState>) -> (ConnectionGateway, mpsc::UnboundedReceiver<ServerMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ConnectionGateway::new(Arc::clone(relay), tx), rx)
}

async fn expect_message(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no message from gateway")
        .expect("gateway outbound closed")
}

/// Forward one adapter event to the client, as the server loop would.
async fn relay_event(gateway: &mut ConnectionGateway) {
    let event = tokio::time::timeout(Duration::from_secs(5), gateway.next_event())
        .await
        .expect("no adapter event");
    gateway.handle_event(event).await;
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_navigate_away_and_restore_on_new_transport() {
    let host = FakeHost::new();
    let relay = host.relay(RelayConfig::default());

    // Page 1: connect and type.
    let (mut page1, mut page1_rx) = open_transport(&relay);
    page1.handle(ClientMessage::Connect(connect_request())).await;
    let session_id = match expect_message(&mut page1_rx).await {
        ServerMessage::Ready { session_id } => session_id,
        other => panic!("Expected ready, got {:?}", other),
    };
    page1
        .handle(ClientMessage::Data {
            data: "ls\n".to_string(),
        })
        .await;
    host.wait_typed("ls\n").await;

    // Navigate away with snapshots.
    page1
        .handle(ClientMessage::NavigationDisconnect {
            terminal_state: Some(TerminalState {
                output_buffer: "$ ls\nreadme.md\n".to_string(),
                ..Default::default()
            }),
            file_browser_state: Some(FileBrowserState {
                current_path: "/docs".to_string(),
                ..Default::default()
            }),
        })
        .await;
    assert_eq!(page1.state(), GatewayState::Detached);
    page1.transport_closed().await;
    drop(page1);

    // Page 2: restore.
    let (mut page2, mut page2_rx) = open_transport(&relay);
    page2
        .handle(ClientMessage::NavigationRestore {
            session_id: session_id.clone(),
        })
        .await;
    assert_eq!(expect_message(&mut page2_rx).await, ServerMessage::Restored);
    assert_eq!(page2.state(), GatewayState::Ready);

    // Output continues on the new transport, from "now".
    host.shell_output("readme.md\n$ ");
    relay_event(&mut page2).await;
    assert_eq!(
        expect_message(&mut page2_rx).await,
        ServerMessage::Data {
            data: "readme.md\n$ ".to_string()
        }
    );

    // Same remote connection throughout.
    assert_eq!(host.connects(), 1);
    assert_eq!(host.closes(), 0);

    page2
        .handle(ClientMessage::ListDirectory {
            path: "/docs".to_string(),
        })
        .await;
    match expect_message(&mut page2_rx).await {
        ServerMessage::ListDirectoryResult { path, entries } => {
            assert_eq!(path, "/docs");
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].name, "readme.md");
            assert!(!entries[0].is_directory);
        }
        other => panic!("Expected list-directory-result, got {:?}", other),
    }

    page2.handle(ClientMessage::Disconnect).await;
    assert_eq!(expect_message(&mut page2_rx).await, ServerMessage::Closed);
    assert_eq!(host.closes(), 1);
    assert!(relay.registry().is_empty().await);
}

#[tokio::test]
async fn test_client_state_cache_round_trip_across_navigation() {
    let host = FakeHost::new();
    let relay = host.relay(RelayConfig::default());
    let cache = InMemoryClientStateCache::new();

    let (mut page1, mut page1_rx) = open_transport(&relay);
    page1.handle(ClientMessage::Connect(connect_request())).await;
    let session_id = match expect_message(&mut page1_rx).await {
        ServerMessage::Ready { session_id } => session_id,
        other => panic!("Expected ready, got {:?}", other),
    };

    // The client keeps its own copy for immediate re-render.
    let browser = FileBrowserState {
        current_path: "/docs".to_string(),
        selected_entry: Some("readme.md".to_string()),
        scroll_offset: 120.0,
    };
    cache.save(&session_id, browser.clone());
    page1
        .handle(ClientMessage::NavigationDisconnect {
            terminal_state: None,
            file_browser_state: Some(browser.clone()),
        })
        .await;

    let (mut page2, mut page2_rx) = open_transport(&relay);
    page2
        .handle(ClientMessage::NavigationRestore {
            session_id: session_id.clone(),
        })
        .await;
    assert_eq!(expect_message(&mut page2_rx).await, ServerMessage::Restored);

    assert_eq!(cache.load(&session_id), Some(browser));
    cache.clear(&session_id);
    assert!(cache.load(&session_id).is_none());
}

#[tokio::test]
async fn test_bad_credentials_then_retry() {
    let host = FakeHost::new();
    let relay = host.relay(RelayConfig::default());
    let (mut gateway, mut rx) = open_transport(&relay);

    let mut request = connect_request();
    request.password = "wrong".to_string();
    gateway.handle(ClientMessage::Connect(request)).await;
    assert!(matches!(
        expect_message(&mut rx).await,
        ServerMessage::ConnectError { .. }
    ));
    assert_eq!(gateway.state(), GatewayState::Closed);

    gateway.handle(ClientMessage::Connect(connect_request())).await;
    assert!(matches!(
        expect_message(&mut rx).await,
        ServerMessage::Ready { .. }
    ));
    assert_eq!(gateway.state(), GatewayState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_restore_after_ttl_fails() {
    let host = FakeHost::new();
    let relay = host.relay(RelayConfig::default());
    relay.start();

    let (mut page1, mut page1_rx) = open_transport(&relay);
    page1.handle(ClientMessage::Connect(connect_request())).await;
    let session_id = match expect_message(&mut page1_rx).await {
        ServerMessage::Ready { session_id } => session_id,
        other => panic!("Expected ready, got {:?}", other),
    };
    page1
        .handle(ClientMessage::NavigationDisconnect {
            terminal_state: None,
            file_browser_state: None,
        })
        .await;
    page1.transport_closed().await;

    tokio::time::sleep(Duration::from_secs(16 * 60)).await;

    let (mut page2, mut page2_rx) = open_transport(&relay);
    page2
        .handle(ClientMessage::NavigationRestore { session_id })
        .await;
    assert!(matches!(
        expect_message(&mut page2_rx).await,
        ServerMessage::RestoreFailed { .. }
    ));
    assert_eq!(host.closes(), 1);

    relay.shutdown().await;
}
