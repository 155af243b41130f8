//! Relational table and raw SQL example.
//!
//! # Running
//!
//! ```bash
//! export MYSQLX_HOST=localhost
//! export MYSQLX_USER=root
//! export MYSQLX_PASSWORD=Password123!
//!
//! cargo run --example tables
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use mysqlx_client::{Error, Session, SessionConfig, Value, expr};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("MYSQLX_HOST").unwrap_or_else(|_| "localhost".into());
    let user = std::env::var("MYSQLX_USER").unwrap_or_else(|_| "root".into());
    let password = std::env::var("MYSQLX_PASSWORD").unwrap_or_else(|_| "Password123!".into());

    let session = Session::open(
        SessionConfig::new()
            .host(host)
            .user(user)
            .password(password),
    )
    .await?;

    // Tables are created with SQL; the CRUD API works on existing ones.
    session
        .sql("CREATE DATABASE IF NOT EXISTS demo_shop")
        .execute()
        .await?;
    session
        .sql(
            "CREATE TABLE IF NOT EXISTS demo_shop.items (\
             id INT AUTO_INCREMENT PRIMARY KEY, name VARCHAR(64), price DECIMAL(8,2), stock INT)",
        )
        .execute()
        .await?;

    let items = session.get_schema("demo_shop").get_table("items");

    let inserted = items
        .insert(["name", "price", "stock"])
        .values([Value::from("pen"), Value::from(1.5), Value::from(100)])
        .values([Value::from("ink"), Value::from(4.25), Value::from(12)])
        .execute()
        .await?;
    println!(
        "Inserted {} rows, first id {:?}",
        inserted.affected_items_count(),
        inserted.auto_increment_value()
    );

    items
        .update()
        .set("stock", expr("stock - :sold"))
        .where_("name = :name")
        .bind("sold", 3)
        .bind("name", "ink")
        .execute()
        .await?;

    let mut result = items
        .select(["id", "name", "price", "stock"])
        .order_by(["id"])
        .execute()
        .await?;
    println!("{}", result.column_names().join("\t"));
    for row in result.fetch_all().await? {
        let id: u64 = row.get("id")?;
        let name: String = row.get("name")?;
        let price: Value = row.get("price")?;
        let stock: i64 = row.get("stock")?;
        println!("{id}\t{name}\t{price}\t{stock}");
    }

    // Raw SQL with positional arguments and several result sets.
    let mut sql = session
        .sql("SELECT COUNT(*) AS n FROM demo_shop.items WHERE stock > ?")
        .bind(20)
        .execute()
        .await?;
    if let Some(row) = sql.fetch_one().await? {
        println!("\nItems with stock over 20: {}", row.get::<i64>("n")?);
    }
    sql.close().await?;

    session.drop_schema("demo_shop").await?;
    session.close().await;
    Ok(())
}
