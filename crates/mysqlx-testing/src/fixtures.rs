//! Sample data shared by client tests and demos.

use mysqlx_protocol::ColumnType;
use mysqlx_types::{DbDoc, Value};

use crate::store::MockTable;

/// Schema the fixtures live in.
pub const SCHEMA: &str = "library";

/// Two books with ids 1 and 2.
#[must_use]
pub fn books() -> Vec<DbDoc> {
    vec![
        DbDoc::new().with("_id", 1).with("name", "Book 1"),
        DbDoc::new().with("_id", 2).with("name", "Book 2"),
    ]
}

/// Five documents with numeric and text fields for filter and sort tests.
#[must_use]
pub fn catalog() -> Vec<DbDoc> {
    [
        ("a1", "Dune", "scifi", 412, 9.5),
        ("a2", "Emma", "classic", 474, 8.0),
        ("a3", "Neuromancer", "scifi", 271, 8.7),
        ("a4", "Persuasion", "classic", 249, 8.9),
        ("a5", "Solaris", "scifi", 204, 8.1),
    ]
    .into_iter()
    .map(|(id, title, genre, pages, rating)| {
        DbDoc::new()
            .with("_id", id)
            .with("title", title)
            .with("genre", genre)
            .with("pages", pages)
            .with("rating", rating)
    })
    .collect()
}

/// An `authors` table with an auto-increment key.
#[must_use]
pub fn authors() -> MockTable {
    MockTable::new()
        .auto_increment("id")
        .column("name", ColumnType::Bytes)
        .column("born", ColumnType::SInt)
        .json_column("meta")
        .row([
            Value::Null,
            Value::from("Frank Herbert"),
            Value::Int(1920),
            Value::Document(DbDoc::new().with("country", "US")),
        ])
        .row([
            Value::Null,
            Value::from("Jane Austen"),
            Value::Int(1775),
            Value::Null,
        ])
        .row([
            Value::Null,
            Value::from("Stanisław Lem"),
            Value::Int(1921),
            Value::Document(DbDoc::new().with("country", "PL")),
        ])
}
