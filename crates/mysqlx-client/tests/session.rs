//! Session lifecycle tests against the mock X Protocol server.
//!
//! Run with:
//! ```bash
//! cargo test -p mysqlx-client --test session
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use mysqlx_client::{AuthMechanism, Error, Session, SslMode, TlsConfig, Value};
use mysqlx_testing::MockXServer;
use mysqlx_testing::mock_server::{ER_ACCESS_DENIED_ERROR, MockResponse};

// =============================================================================
// Opening and Closing
// =============================================================================

#[tokio::test]
async fn test_open_and_close() {
    let (server, session) = common::open().await;

    assert!(session.is_open());
    assert!(!session.is_tls());
    assert_eq!(session.user(), common::USER);
    assert!(session.connection_id().is_some());
    assert_eq!(session.auth_mechanism(), Some(AuthMechanism::Sha256Memory));
    assert_eq!(server.connection_count(), 1);

    session.close().await;
    assert!(!session.is_open());
    common::wait_disconnected(&server).await;

    // Closing twice is harmless.
    session.close().await;
}

#[tokio::test]
async fn test_request_after_close_fails() {
    let (_server, session) = common::open().await;
    session.close().await;

    let err = session.sql("SELECT 1").execute().await.unwrap_err();
    assert!(matches!(err, Error::SessionClosed), "got {err:?}");

    let err = session
        .get_schema("library")
        .get_collection("books")
        .find(None)
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SessionClosed), "got {err:?}");
}

#[tokio::test]
async fn test_clones_share_the_connection() {
    let (server, session) = common::open().await;
    let other = session.clone();

    other.sql("SELECT 1").execute().await.unwrap();
    assert_eq!(server.total_connections(), 1);

    other.close().await;
    assert!(!session.is_open());
}

#[tokio::test]
async fn test_unreachable_server() {
    let server = common::library().build().await.unwrap();
    let config = common::config(&server);
    server.stop();
    drop(server);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let err = Session::open(config).await.unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let server = common::library().build().await.unwrap();
    let config = common::config(&server)
        .password("wrong")
        .auth_mechanisms([AuthMechanism::Mysql41]);

    let err = Session::open(config).await.unwrap_err();
    match err {
        Error::Auth(mysqlx_auth::AuthError::Rejected { code, .. }) => {
            assert_eq!(code, ER_ACCESS_DENIED_ERROR);
        }
        other => panic!("expected an authentication error, got {other:?}"),
    }

    // The failed attempt leaves nothing open, and the account still works.
    common::wait_disconnected(&server).await;
    let session = Session::open(common::config(&server)).await.unwrap();
    assert!(session.is_open());
    session.close().await;
}

#[tokio::test]
async fn test_unknown_user_is_rejected() {
    let server = common::library().build().await.unwrap();
    let config = common::config(&server).user("nobody");

    let err = Session::open(config).await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)), "got {err:?}");
}

#[tokio::test]
async fn test_fallback_to_next_mechanism() {
    let server = common::library()
        .with_cold_auth_cache()
        .build()
        .await
        .unwrap();

    let session = Session::open(common::config(&server)).await.unwrap();
    assert_eq!(session.auth_mechanism(), Some(AuthMechanism::Mysql41));
    assert_eq!(server.total_connections(), 1);
    session.close().await;
}

#[tokio::test]
async fn test_plain_needs_tls() {
    let server = common::library().build().await.unwrap();
    let config = common::config(&server).auth_mechanisms([AuthMechanism::Plain]);

    let err = Session::open(config).await.unwrap_err();
    assert!(
        matches!(
            err,
            Error::Auth(mysqlx_auth::AuthError::NoUsableMechanism { .. })
        ),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_default_schema_from_config() {
    let server = common::library().build().await.unwrap();
    let session = Session::open(common::config(&server).schema("library"))
        .await
        .unwrap();

    assert_eq!(session.default_schema_name().as_deref(), Some("library"));
    let schema = session.get_default_schema().unwrap();
    assert_eq!(schema.name(), "library");
}

#[tokio::test]
async fn test_unknown_default_schema() {
    let server = common::library().build().await.unwrap();
    let err = Session::open(common::config(&server).schema("missing"))
        .await
        .unwrap_err();
    assert!(err.is_server_error(1049) || matches!(err, Error::Auth(_)), "got {err:?}");
}

// =============================================================================
// TLS
// =============================================================================

fn trusting(server: &MockXServer) -> TlsConfig {
    TlsConfig::new()
        .add_root_certificate(server.certificate().unwrap().clone())
        .with_server_name("localhost")
}

#[tokio::test]
async fn test_tls_required() {
    let server = common::library().with_tls().build().await.unwrap();
    let config = common::config(&server)
        .ssl_mode(SslMode::Required)
        .tls(trusting(&server));

    let session = Session::open(config).await.unwrap();
    assert!(session.is_tls());

    let mut result = session.sql("SELECT 1").execute().await.unwrap();
    result.close().await.unwrap();
    session.close().await;
}

#[tokio::test]
async fn test_plain_over_tls() {
    let server = common::library().with_tls().build().await.unwrap();
    let config = common::config(&server)
        .ssl_mode(SslMode::Required)
        .tls(trusting(&server))
        .auth_mechanisms([AuthMechanism::Plain]);

    let session = Session::open(config).await.unwrap();
    assert!(session.is_tls());
    assert_eq!(session.auth_mechanism(), Some(AuthMechanism::Plain));
}

#[tokio::test]
async fn test_tls_required_but_not_offered() {
    let server = common::library().build().await.unwrap();
    let config = common::config(&server).ssl_mode(SslMode::Required);

    let err = Session::open(config).await.unwrap_err();
    assert!(matches!(err, Error::CapabilityNegotiation(_)), "got {err:?}");
}

#[tokio::test]
async fn test_tls_preferred_without_server_support() {
    let server = common::library().build().await.unwrap();
    let config = common::config(&server).ssl_mode(SslMode::Preferred);

    let session = Session::open(config).await.unwrap();
    assert!(!session.is_tls());
}

#[tokio::test]
async fn test_untrusted_certificate() {
    let server = common::library().with_tls().build().await.unwrap();
    let config = common::config(&server).ssl_mode(SslMode::Required);

    let err = Session::open(config).await.unwrap_err();
    assert!(matches!(err, Error::Tls(_)), "got {err:?}");
}

// =============================================================================
// Raw SQL
// =============================================================================

#[tokio::test]
async fn test_sql_canned_result() {
    let server = common::library()
        .with_sql_response(
            "SELECT 1 AS one",
            MockResponse::scalar("one", Value::Int(1)),
        )
        .build()
        .await
        .unwrap();
    let session = Session::open(common::config(&server)).await.unwrap();

    let mut result = session.sql("select 1   as one").execute().await.unwrap();
    assert!(result.has_data());
    assert_eq!(result.column_names(), ["one"]);
    let row = result.fetch_one().await.unwrap().unwrap();
    assert_eq!(row.get::<i64>(0).unwrap(), 1);
    assert_eq!(row.get::<i64>("one").unwrap(), 1);
    assert!(result.fetch_one().await.unwrap().is_none());
    assert!(!result.next_result().await.unwrap());
}

#[tokio::test]
async fn test_sql_affected_rows() {
    let server = common::library()
        .with_sql_response(
            "DELETE FROM t",
            MockResponse::Ok {
                rows_affected: 3,
                last_insert_id: None,
            },
        )
        .build()
        .await
        .unwrap();
    let session = Session::open(common::config(&server)).await.unwrap();

    let mut result = session.sql("DELETE FROM t").execute().await.unwrap();
    assert!(!result.has_data());
    result.close().await.unwrap();
    assert_eq!(result.affected_items_count(), 3);
    assert_eq!(result.auto_increment_value(), None);
}

#[tokio::test]
async fn test_sql_multiple_result_sets() {
    use mysqlx_testing::MockResultSet;

    let first = MockResultSet::infer(&["a"], vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
    let second = MockResultSet::infer(&["b"], vec![vec![Value::from("x")]]);
    let server = common::library()
        .with_sql_response("CALL two_sets()", MockResponse::ResultSets(vec![first, second]))
        .build()
        .await
        .unwrap();
    let session = Session::open(common::config(&server)).await.unwrap();

    let mut result = session.sql("CALL two_sets()").execute().await.unwrap();
    assert_eq!(result.column_names(), ["a"]);
    let rows = result.fetch_all().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get::<i64>("a").unwrap(), 2);

    assert!(result.next_result().await.unwrap());
    assert_eq!(result.column_names(), ["b"]);
    let row = result.fetch_one().await.unwrap().unwrap();
    assert_eq!(row.get::<String>(0).unwrap(), "x");

    assert!(!result.next_result().await.unwrap());
}

#[tokio::test]
async fn test_sql_skipping_a_result_set() {
    use mysqlx_testing::MockResultSet;

    let first = MockResultSet::infer(&["a"], vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
    let second = MockResultSet::infer(&["b"], vec![vec![Value::Int(3)]]);
    let server = common::library()
        .with_sql_response("CALL two_sets()", MockResponse::ResultSets(vec![first, second]))
        .build()
        .await
        .unwrap();
    let session = Session::open(common::config(&server)).await.unwrap();

    let mut result = session.sql("CALL two_sets()").execute().await.unwrap();
    assert!(result.next_result().await.unwrap());
    let row = result.fetch_one().await.unwrap().unwrap();
    assert_eq!(row.get::<i64>("b").unwrap(), 3);
}

#[tokio::test]
async fn test_undecodable_row_does_not_end_the_result() {
    use mysqlx_client::TypeError;
    use mysqlx_testing::MockResultSet;

    // A text column whose second row is not valid UTF-8.
    let set = MockResultSet::infer(
        &["t"],
        vec![
            vec![Value::from("ok1")],
            vec![Value::from(bytes::Bytes::from_static(&[0xff, 0xfe]))],
            vec![Value::from("ok3")],
        ],
    );
    let server = common::library()
        .with_sql_response("SELECT t FROM mixed", MockResponse::rows(set))
        .build()
        .await
        .unwrap();
    let session = Session::open(common::config(&server)).await.unwrap();

    let mut result = session.sql("SELECT t FROM mixed").execute().await.unwrap();
    let first = result.fetch_one().await.unwrap().unwrap();
    assert_eq!(first.get::<String>("t").unwrap(), "ok1");

    let err = result.fetch_one().await.unwrap_err();
    assert!(
        matches!(err, Error::Decode(TypeError::InvalidEncoding(_))),
        "got {err:?}"
    );
    assert!(!err.terminates_session());

    let third = result.fetch_one().await.unwrap().unwrap();
    assert_eq!(third.get::<String>("t").unwrap(), "ok3");
    assert!(result.fetch_one().await.unwrap().is_none());
    assert!(!result.next_result().await.unwrap());

    assert!(session.is_open());
    let mut again = session.sql("SELECT 1").execute().await.unwrap();
    again.close().await.unwrap();
}

#[tokio::test]
async fn test_sql_server_error_keeps_session() {
    let server = common::library()
        .with_sql_response("SELECT broken", MockResponse::error(1054, "Unknown column"))
        .build()
        .await
        .unwrap();
    let session = Session::open(common::config(&server)).await.unwrap();

    let err = session.sql("SELECT broken").execute().await.unwrap_err();
    assert!(err.is_server_error(1054), "got {err:?}");
    assert_eq!(err.server_code(), Some(1054));
    assert!(session.is_open());

    session.sql("SELECT 1").execute().await.unwrap();
}

#[tokio::test]
async fn test_fatal_error_ends_session() {
    let server = common::library()
        .with_sql_response("KILL ME", MockResponse::fatal(1053, "Server shutdown"))
        .build()
        .await
        .unwrap();
    let session = Session::open(common::config(&server)).await.unwrap();

    let err = session.sql("KILL ME").execute().await.unwrap_err();
    assert!(err.terminates_session(), "got {err:?}");
    assert!(!session.is_open());

    let err = session.sql("SELECT 1").execute().await.unwrap_err();
    assert!(matches!(err, Error::SessionClosed), "got {err:?}");
}

#[tokio::test]
async fn test_sql_positional_arguments() {
    let (server, session) = common::open().await;

    let statement = session.sql("SELECT ?, ?").bind(1).bind("two");
    assert_eq!(statement.args(), [Value::Int(1), Value::from("two")]);
    statement.execute().await.unwrap();

    let cleared = statement.clear_bindings();
    assert!(cleared.args().is_empty());
    assert!(server.request_count() >= 1);
}

#[tokio::test]
async fn test_warnings_are_collected() {
    use mysqlx_client::WarningLevel;

    let server = common::library()
        .with_warning(WarningLevel::Warning, 1265, "Data truncated")
        .build()
        .await
        .unwrap();
    let session = Session::open(common::config(&server)).await.unwrap();

    let mut result = session.sql("DO 1").execute().await.unwrap();
    result.close().await.unwrap();
    assert_eq!(result.warnings_count(), 1);
    assert_eq!(result.warnings()[0].code, 1265);
    assert_eq!(result.warnings()[0].msg, "Data truncated");
}

// =============================================================================
// Busy Sessions
// =============================================================================

#[tokio::test]
async fn test_open_result_makes_session_busy() {
    let (_server, session) = common::open().await;
    let schema = session.get_schema("library");
    let books = schema.get_collection("books");
    let authors = schema.get_table("authors");

    let mut pending = books.find(None).execute().await.unwrap();

    let err = session.sql("SELECT 1").execute().await.unwrap_err();
    assert!(matches!(err, Error::SessionBusy), "sql: {err:?}");
    let err = books.find(None).execute().await.unwrap_err();
    assert!(matches!(err, Error::SessionBusy), "find: {err:?}");
    let err = books.add(r#"{"name": "Book 3"}"#).execute().await.unwrap_err();
    assert!(matches!(err, Error::SessionBusy), "add: {err:?}");
    let err = books.modify("true").set("x", 1).execute().await.unwrap_err();
    assert!(matches!(err, Error::SessionBusy), "modify: {err:?}");
    let err = books.remove("true").execute().await.unwrap_err();
    assert!(matches!(err, Error::SessionBusy), "remove: {err:?}");
    let err = authors.select(["name"]).execute().await.unwrap_err();
    assert!(matches!(err, Error::SessionBusy), "select: {err:?}");
    let err = schema.get_collections().await.unwrap_err();
    assert!(matches!(err, Error::SessionBusy), "list: {err:?}");
    let err = session.reset().await.unwrap_err();
    assert!(matches!(err, Error::SessionBusy), "reset: {err:?}");

    // The open result is unaffected and draining it frees the session.
    let docs = pending.fetch_all().await.unwrap();
    assert_eq!(docs.len(), 2);
    session.sql("SELECT 1").execute().await.unwrap();
}

#[tokio::test]
async fn test_dropped_result_is_discarded() {
    let (_server, session) = common::open().await;
    let books = session.get_schema("library").get_collection("books");

    let pending = books.find(None).execute().await.unwrap();
    drop(pending);

    let mut result = books.find(Some("_id = 2")).execute().await.unwrap();
    let docs = result.fetch_all().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].get("name"), Some(&Value::from("Book 2")));
}

#[tokio::test]
async fn test_close_while_result_is_open() {
    let (server, session) = common::open().await;
    let books = session.get_schema("library").get_collection("books");

    let mut pending = books.find(None).execute().await.unwrap();
    session.close().await;

    let err = pending.fetch_all().await.unwrap_err();
    assert!(matches!(err, Error::AmbiguousOutcome(_)), "got {err:?}");
    common::wait_disconnected(&server).await;

    let err = session.sql("SELECT 1").execute().await.unwrap_err();
    assert!(matches!(err, Error::SessionClosed), "got {err:?}");
}

// =============================================================================
// Transactions and Reset
// =============================================================================

#[tokio::test]
async fn test_rollback_discards_changes() {
    let (server, session) = common::open().await;
    let books = session.get_schema("library").get_collection("books");

    session.start_transaction().await.unwrap();
    books.remove("_id = 1").execute().await.unwrap();
    assert_eq!(books.count().await.unwrap(), 1);
    session.rollback().await.unwrap();

    assert_eq!(books.count().await.unwrap(), 2);
    assert_eq!(server.documents("library", "books").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_commit_keeps_changes() {
    let (server, session) = common::open().await;
    let books = session.get_schema("library").get_collection("books");

    session.start_transaction().await.unwrap();
    books.remove("_id = 1").execute().await.unwrap();
    session.commit().await.unwrap();

    assert_eq!(server.documents("library", "books").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reset_keeps_session_usable() {
    let (_server, session) = common::open().await;
    session.reset().await.unwrap();
    assert!(session.is_open());

    let books = session.get_schema("library").get_collection("books");
    assert_eq!(books.count().await.unwrap(), 2);
}

// =============================================================================
// Schemas
// =============================================================================

#[tokio::test]
async fn test_schema_lifecycle() {
    let (_server, session) = common::open().await;

    let schema = session.create_schema("shop").await.unwrap();
    assert_eq!(schema.name(), "shop");
    assert!(schema.exists_in_database().await.unwrap());

    let names: Vec<String> = session
        .get_schemas()
        .await
        .unwrap()
        .iter()
        .map(|s| s.name().to_string())
        .collect();
    assert!(names.iter().any(|n| n == "shop"), "{names:?}");
    assert!(names.iter().any(|n| n == "library"), "{names:?}");

    let err = session.create_schema("shop").await.unwrap_err();
    assert!(err.is_server_error(1007), "got {err:?}");

    session.drop_schema("shop").await.unwrap();
    assert!(!schema.exists_in_database().await.unwrap());

    // Dropping a missing schema is not an error.
    session.drop_schema("shop").await.unwrap();
}

#[tokio::test]
async fn test_missing_schema_reports_absent() {
    let (_server, session) = common::open().await;
    let schema = session.get_schema("nowhere");
    assert!(!schema.exists_in_database().await.unwrap());
}
