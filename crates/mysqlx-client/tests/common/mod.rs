//! Shared setup for tests that run against the mock server.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use mysqlx_client::{Session, SessionConfig, SslMode};
use mysqlx_testing::{MockServerBuilder, MockXServer, fixtures};

pub const USER: &str = "app";
pub const PASSWORD: &str = "secret";

/// A server with the `library` schema, its `books` and `catalog`
/// collections and the `authors` table.
pub fn library() -> MockServerBuilder {
    MockXServer::builder()
        .with_user(USER, PASSWORD)
        .with_schema(fixtures::SCHEMA)
        .with_collection(fixtures::SCHEMA, "books", fixtures::books())
        .with_collection(fixtures::SCHEMA, "catalog", fixtures::catalog())
        .with_table(fixtures::SCHEMA, "authors", fixtures::authors())
}

/// Client configuration pointing at `server` with the test account.
pub fn config(server: &MockXServer) -> SessionConfig {
    SessionConfig::new()
        .host(server.host())
        .port(server.port())
        .user(USER)
        .password(PASSWORD)
        .ssl_mode(SslMode::Disabled)
}

/// Start the library server and open a session to it.
pub async fn open() -> (MockXServer, Session) {
    let server = library().build().await.expect("mock server should start");
    let session = Session::open(config(&server))
        .await
        .expect("session should open");
    (server, session)
}

/// Wait until the server has no connection left.
pub async fn wait_disconnected(server: &MockXServer) {
    for _ in 0..100 {
        if server.connection_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "server still has {} connection(s)",
        server.connection_count()
    );
}
