//! # mysqlx-client
//!
//! Async client for X Protocol servers, with a document-store API for
//! collections of JSON documents and a CRUD API for relational tables.
//!
//! ## Features
//!
//! - **Sessions**: capability negotiation, TLS upgrade and
//!   `SHA256_MEMORY`/`PLAIN`/`MYSQL41` authentication with fallback
//! - **Collections**: `add`, `find`, `modify` and `remove` builders with
//!   named placeholders
//! - **Tables**: `select`, `insert`, `update` and `delete` builders
//! - **Raw SQL**: positional arguments and multiple result sets
//! - **Streaming results**: rows are decoded as they are fetched
//!
//! ## Request Flow
//!
//! ```text
//! builder --compile--> expression trees --resolve--> protocol message
//!    |                                                     |
//!    +-- validate (no network)                             v
//!                                  Session::execute --> ResponseStream
//!                                                          |
//!                         DocResult / RowResult / SqlResult / ExecuteResult
//! ```
//!
//! One session runs one request at a time. A second request while a result
//! is still streaming fails with [`Error::SessionBusy`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysqlx_client::{DbDoc, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::new()
//!         .host("localhost")
//!         .user("app")
//!         .password("secret");
//!     let session = Session::open(config).await?;
//!
//!     let schema = session.create_schema("library").await?;
//!     let books = schema.create_collection("books").await?;
//!
//!     let added = books
//!         .add(DbDoc::new().with("title", "Dune").with("pages", 412))
//!         .add(r#"{"title": "Emma", "pages": 474}"#)
//!         .execute()
//!         .await?;
//!     println!("generated ids: {:?}", added.generated_ids());
//!
//!     let mut long = books
//!         .find(Some("pages > :min"))
//!         .sort(["pages DESC"])
//!         .bind("min", 400)
//!         .execute()
//!         .await?;
//!     for doc in long.fetch_all().await? {
//!         println!("{doc}");
//!     }
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod collection;
pub mod config;
pub mod error;
pub mod expr;
pub mod handshake;
pub mod notice;
pub mod result;
pub mod row;
pub mod schema;
pub mod session;
pub mod sql;
pub mod stream;
pub mod table;

mod statement;
mod transport;

// Re-export commonly used types
pub use collection::{
    AddStatement, Collection, FindStatement, IntoDocument, ModifyStatement, RemoveStatement,
};
pub use config::{SessionConfig, SslMode};
pub use error::{Error, Result};
pub use expr::{CompiledExpression, ParseError};
pub use handshake::{HandshakeState, ServerCapabilities};
pub use mysqlx_auth::{AuthMechanism, Credentials};
pub use mysqlx_protocol::{Warning, WarningLevel};
pub use mysqlx_tls::TlsConfig;
pub use mysqlx_types::{DbDoc, FromValue, TypeError, Value};
pub use notice::Notices;
pub use result::{DocResult, ExecuteResult, RowResult, SqlResult};
pub use row::{Column, ColumnIndex, Row};
pub use schema::Schema;
pub use session::Session;
pub use sql::SqlStatement;
pub use statement::{Operand, expr};
pub use stream::{ResponseStream, ResponseUnit};
pub use table::{DeleteStatement, InsertStatement, SelectStatement, Table, UpdateStatement};
