//! # mysqlx-testing
//!
//! Test infrastructure for X Protocol client development.
//!
//! This crate provides a mock X Protocol server that runs in-process and a
//! testcontainers image for integration tests against a real MySQL server.
//!
//! ## Features
//!
//! - Mock server with TLS upgrade, real authentication checks and an
//!   in-memory document and table store (no Docker required)
//! - Canned SQL responses, warnings and fatal errors
//! - MySQL container management via testcontainers
//! - Sample fixtures
//!
//! ## Mock Server Example
//!
//! ```rust,ignore
//! use mysqlx_testing::{MockXServer, fixtures};
//!
//! #[tokio::test]
//! async fn test_with_mock_server() {
//!     let server = MockXServer::builder()
//!         .with_user("app", "secret")
//!         .with_collection(fixtures::SCHEMA, "books", fixtures::books())
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     // Connect your client to server.addr()
//! }
//! ```
//!
//! ## Container Example
//!
//! ```rust,ignore
//! use mysqlx_testing::MysqlContainer;
//! use testcontainers::runners::AsyncRunner;
//!
//! #[tokio::test]
//! async fn test_with_real_server() {
//!     let container = MysqlContainer::default().start().await.unwrap();
//!     let port = container.get_host_port_ipv4(33060).await.unwrap();
//!     // Connect to localhost:port...
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod container;
pub mod fixtures;
pub mod mock_server;
pub mod store;

mod eval;

pub use container::MysqlContainer;
pub use mock_server::{
    MockResponse, MockServerBuilder, MockServerConfig, MockServerError, MockXServer,
};
pub use store::{MockResultSet, MockTable};
