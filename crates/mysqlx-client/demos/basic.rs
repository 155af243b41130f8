//! Document store example.
//!
//! Connects, creates a collection, adds a few books and queries them back.
//!
//! # Running
//!
//! ```bash
//! export MYSQLX_HOST=localhost
//! export MYSQLX_USER=root
//! export MYSQLX_PASSWORD=Password123!
//!
//! cargo run --example basic
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use mysqlx_client::{DbDoc, Error, Session, SessionConfig, expr};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("MYSQLX_HOST").unwrap_or_else(|_| "localhost".into());
    let user = std::env::var("MYSQLX_USER").unwrap_or_else(|_| "root".into());
    let password = std::env::var("MYSQLX_PASSWORD").unwrap_or_else(|_| "Password123!".into());

    let config = SessionConfig::new()
        .host(host.as_str())
        .user(user)
        .password(password);

    println!("Connecting to {}...", config.address());
    let session = Session::open(config).await?;
    println!(
        "Connected (connection id {:?}, {:?}, tls: {})",
        session.connection_id(),
        session.auth_mechanism(),
        session.is_tls()
    );

    let schema = match session.create_schema("demo_library").await {
        Ok(schema) => schema,
        Err(e) if e.is_server_error(1007) => session.get_schema("demo_library"),
        Err(e) => return Err(e),
    };
    let books = schema.ensure_collection("books").await?;

    let added = books
        .add(DbDoc::new().with("title", "Dune").with("pages", 412))
        .add(r#"{"title": "Emma", "pages": 474, "tags": ["classic"]}"#)
        .add(serde_json::json!({"title": "Solaris", "pages": 204}))
        .execute()
        .await?;
    println!(
        "Added {} books, generated ids {:?}",
        added.affected_items_count(),
        added.generated_ids()
    );

    println!("\nBooks over 300 pages:");
    let mut long = books
        .find(Some("pages > :min"))
        .fields(["title", "pages"])
        .sort(["pages DESC"])
        .bind("min", 300)
        .execute()
        .await?;
    while let Some(doc) = long.fetch_one().await? {
        println!("  {doc}");
    }

    let changed = books
        .modify("title = :title")
        .set("pages", expr("pages + 10"))
        .array_append("tags", "revised")
        .bind("title", "Emma")
        .execute()
        .await?;
    println!("\nModified {} document(s)", changed.affected_items_count());

    let removed = books.remove("pages < 300").execute().await?;
    println!("Removed {} document(s)", removed.affected_items_count());
    println!("{} book(s) left", books.count().await?);

    session.drop_schema("demo_library").await?;
    session.close().await;
    println!("\nDone!");
    Ok(())
}
