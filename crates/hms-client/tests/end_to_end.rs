//! End-to-end tests: the real client against the real server on loopback.
//!
//! The server runs with the in-memory store seeded with one administrator.
//! These tests check the request paths a front end relies on: blocking
//! requests, owner-queued callbacks, timeouts, and what a client sees when
//! the server goes away.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hms_client::application::browse_tables::{BrowseError, BrowseTablesUseCase};
use hms_client::application::request_channel::RequestError;
use hms_client::infrastructure::config::ClientConfig;
use hms_client::infrastructure::connection::{Client, ClientEvent};
use hms_core::correlation::OwnerQueue;
use hms_core::protocol::{AddDataPacket, GetDataPacket, LoginPacket, LogoutPacket};
use hms_core::{Packet, ResponseCode, ShutdownMode, TableId};
use hms_server::application::serve_requests::ServeRequestsUseCase;
use hms_server::infrastructure::server::Server;
use hms_server::infrastructure::storage::config::ServerConfig;
use hms_server::infrastructure::storage::memory::InMemoryStore;
use serde_json::json;
use tokio::sync::mpsc;

const ADMIN_EMAIL: &str = "a@b.com";
const ADMIN_PASSWORD: &str = "secret123";

async fn start_server() -> (Arc<Server>, ClientConfig) {
    let mut config = ServerConfig::default();
    config.network.bind_address = "127.0.0.1".into();
    config.network.port = 0;
    config.runtime.worker_threads = 2;
    config.admin.email = ADMIN_EMAIL.into();
    config.admin.password = ADMIN_PASSWORD.into();

    let store = InMemoryStore::with_admin(&config.admin).expect("seed");
    let handler = Arc::new(ServeRequestsUseCase::new(Arc::new(store)));
    let (server, _events) = Server::bind(&config, handler).await.expect("bind");
    let server = Arc::new(server);
    let runner = Arc::clone(&server);
    tokio::spawn(async move { runner.run().await });

    let mut client_config = ClientConfig::default();
    client_config.server.port = server.local_addr().port();
    client_config.requests.timeout_ms = 500;
    (server, client_config)
}

async fn next_event(events: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event in time")
        .expect("channel open")
}

#[tokio::test]
async fn test_login_scenario_resolves_waiter_for_id_42() {
    // Arrange
    let (server, config) = start_server().await;
    let (client, _events) = Client::connect(&config).await.expect("connect");

    // Act
    let response = tokio_test::assert_ok!(
        client
            .request(Packet::from(LoginPacket::new(ADMIN_EMAIL, ADMIN_PASSWORD)).with_request_id(42))
            .await
    );

    // Assert
    assert_eq!(response.request_id, 42);
    assert_eq!(response.error_code, ResponseCode::Success);
    assert_eq!(response.additional_data["role"], json!("admin"));
    assert_eq!(client.pending_requests(), 0);
    server.stop(ShutdownMode::Drop).await;
}

#[tokio::test]
async fn test_browse_use_case_reads_rows_written_through_the_same_session() {
    // Arrange
    let (server, config) = start_server().await;
    let (client, _events) = Client::connect(&config).await.expect("connect");
    let client = Arc::new(client);
    let browse = BrowseTablesUseCase::new(Arc::clone(&client));
    browse.log_in(ADMIN_EMAIL, ADMIN_PASSWORD).await.expect("login");

    // Act
    let added = client
        .request(AddDataPacket::new(TableId::Rooms, json!({"room_number": "101", "capacity": 2})).into())
        .await
        .expect("add");
    let rows = browse.fetch_table(TableId::Rooms).await.expect("rows");

    // Assert
    assert!(added.is_success());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["room_number"], json!("101"));
    assert_eq!(rows[0]["capacity"], json!(2));
    server.stop(ShutdownMode::Drop).await;
}

#[tokio::test]
async fn test_logout_drops_access_for_later_requests() {
    let (server, config) = start_server().await;
    let (client, _events) = Client::connect(&config).await.expect("connect");
    let browse = BrowseTablesUseCase::new(Arc::new(client));
    browse.log_in(ADMIN_EMAIL, ADMIN_PASSWORD).await.expect("login");

    assert!(browse.log_out().await);
    // Jobs from one session may run on different workers; let Logout land first.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let result = browse.fetch_table(TableId::Users).await;

    match result {
        Err(BrowseError::Rejected { code, .. }) => assert_eq!(code, ResponseCode::AccessDenied),
        other => panic!("expected AccessDenied, got {other:?}"),
    }
    server.stop(ShutdownMode::Drop).await;
}

#[tokio::test]
async fn test_request_without_reply_times_out_and_leaves_no_entry() {
    // Arrange
    let (server, config) = start_server().await;
    let (client, _events) = Client::connect(&config).await.expect("connect");

    // Act: the server never answers Logout.
    let result = client.request(Packet::from(LogoutPacket::new())).await;

    // Assert
    assert!(matches!(result, Err(RequestError::Timeout(_))));
    assert_eq!(client.pending_requests(), 0);
    assert!(client.is_connected());
    server.stop(ShutdownMode::Drop).await;
}

#[tokio::test]
async fn test_async_requests_run_on_the_owner_queue_in_drain_order() {
    // Arrange
    let (server, config) = start_server().await;
    let (client, _events) = Client::connect(&config).await.expect("connect");
    let mut owner = OwnerQueue::new();
    let handle = owner.handle();
    let codes = Arc::new(Mutex::new(Vec::new()));

    // Act
    for packet in [
        Packet::from(GetDataPacket::new(TableId::Users)),
        Packet::from(LoginPacket::new(ADMIN_EMAIL, "wrong")),
    ] {
        let sink = Arc::clone(&codes);
        assert!(
            client
                .request_async(packet, &handle, move |r| sink.lock().unwrap().push(r.error_code))
                .await
        );
    }
    owner.run_next().await;
    owner.run_next().await;

    // Assert
    let mut codes = codes.lock().unwrap().clone();
    codes.sort_by_key(|c| *c as u8);
    assert_eq!(codes, vec![ResponseCode::LogErrInvalidData, ResponseCode::AccessDenied]);
    assert_eq!(client.pending_requests(), 0);
    server.stop(ShutdownMode::Drop).await;
}

#[tokio::test]
async fn test_server_stop_is_reported_and_fails_new_requests() {
    // Arrange
    let (server, config) = start_server().await;
    let (client, mut events) = Client::connect(&config).await.expect("connect");

    // Act
    server.stop(ShutdownMode::Drop).await;

    // Assert
    assert_eq!(next_event(&mut events).await, ClientEvent::Disconnected);
    assert!(!client.is_connected());
    let result = client.request(Packet::from(GetDataPacket::new(TableId::Rooms))).await;
    assert!(matches!(result, Err(RequestError::Disconnected)));
}
