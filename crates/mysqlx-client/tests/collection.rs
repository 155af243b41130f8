//! Document store tests against the mock X Protocol server.
//!
//! Run with:
//! ```bash
//! cargo test -p mysqlx-client --test collection
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::collections::HashSet;

use mysqlx_client::{Collection, DbDoc, Error, Session, Value, expr};
use mysqlx_testing::fixtures;

fn books(session: &Session) -> Collection {
    session.get_schema(fixtures::SCHEMA).get_collection("books")
}

fn catalog(session: &Session) -> Collection {
    session.get_schema(fixtures::SCHEMA).get_collection("catalog")
}

fn titles(docs: &[DbDoc]) -> Vec<String> {
    docs.iter()
        .map(|d| d.get("title").and_then(Value::as_str).unwrap().to_string())
        .collect()
}

// =============================================================================
// Add
// =============================================================================

#[tokio::test]
async fn test_add_batch_generates_ids_in_order() {
    let (server, session) = common::open().await;
    let books = books(&session);

    let result = books
        .add(DbDoc::new().with("name", "Book 3"))
        .add(r#"{"name": "Book 4"}"#)
        .add(serde_json::json!({"name": "Book 5"}))
        .execute()
        .await
        .unwrap();

    assert_eq!(result.affected_items_count(), 3);
    let ids = result.generated_ids();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 3);

    let stored = server.documents("library", "books").await.unwrap();
    let added: Vec<&DbDoc> = stored.iter().skip(2).collect();
    for (doc, id) in added.iter().zip(ids) {
        assert_eq!(doc.id(), Some(&Value::from(id.as_str())));
    }
    assert_eq!(added[0].get("name"), Some(&Value::from("Book 3")));
    assert_eq!(added[2].get("name"), Some(&Value::from("Book 5")));
}

#[tokio::test]
async fn test_add_keeps_given_id() {
    let (_server, session) = common::open().await;
    let books = books(&session);

    let result = books
        .add(DbDoc::new().with("_id", 7).with("name", "Book 7"))
        .execute()
        .await
        .unwrap();
    assert_eq!(result.affected_items_count(), 1);
    assert!(result.generated_ids().is_empty());

    let doc = books.get_one(7).await.unwrap().unwrap();
    assert_eq!(doc.get("name"), Some(&Value::from("Book 7")));
}

#[tokio::test]
async fn test_add_invalid_json_fails_locally() {
    let (server, session) = common::open().await;
    let before = server.bytes_received();

    let err = books(&session)
        .add("not a document")
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");
    assert_eq!(server.bytes_received(), before);
}

#[tokio::test]
async fn test_add_duplicate_id_is_atomic() {
    let (server, session) = common::open().await;

    let err = books(&session)
        .add(DbDoc::new().with("_id", 9).with("name", "new"))
        .add(DbDoc::new().with("_id", 1).with("name", "dup"))
        .execute()
        .await
        .unwrap_err();
    assert!(err.is_server_error(5116), "got {err:?}");
    assert_eq!(server.documents("library", "books").await.unwrap().len(), 2);
    assert!(session.is_open());
}

// =============================================================================
// Find
// =============================================================================

#[tokio::test]
async fn test_find_all() {
    let (_server, session) = common::open().await;

    let mut result = books(&session).find(None).execute().await.unwrap();
    let docs = result.fetch_all().await.unwrap();
    assert_eq!(docs, fixtures::books());
    assert!(result.fetch_one().await.unwrap().is_none());
}

#[tokio::test]
async fn test_find_in_empty_collection() {
    let server = common::library()
        .with_collection("library", "empty", Vec::new())
        .build()
        .await
        .unwrap();
    let session = Session::open(common::config(&server)).await.unwrap();
    let empty = session.get_schema("library").get_collection("empty");

    let mut result = empty.find(None).execute().await.unwrap();
    assert!(result.fetch_all().await.unwrap().is_empty());
    assert!(result.fetch_one().await.unwrap().is_none());
}

#[tokio::test]
async fn test_find_with_condition_and_sort() {
    let (_server, session) = common::open().await;

    let mut result = catalog(&session)
        .find(Some("genre = :genre AND pages > :min"))
        .bind("genre", "scifi")
        .bind(":MIN", 250)
        .sort(["pages DESC"])
        .execute()
        .await
        .unwrap();
    let docs = result.fetch_all().await.unwrap();
    assert_eq!(titles(&docs), ["Dune", "Neuromancer"]);
}

#[tokio::test]
async fn test_find_limit_and_offset() {
    let (_server, session) = common::open().await;

    let mut result = catalog(&session)
        .find(None)
        .sort(["pages ASC"])
        .limit(2)
        .offset(1)
        .execute()
        .await
        .unwrap();
    let docs = result.fetch_all().await.unwrap();
    assert_eq!(titles(&docs), ["Persuasion", "Neuromancer"]);
}

#[tokio::test]
async fn test_find_projection() {
    let (_server, session) = common::open().await;

    let mut result = catalog(&session)
        .find(Some("_id = 'a1'"))
        .fields(["title", "pages * 2 AS twice"])
        .execute()
        .await
        .unwrap();
    let doc = result.fetch_one().await.unwrap().unwrap();
    assert_eq!(doc.get("title"), Some(&Value::from("Dune")));
    assert_eq!(doc.get("twice").and_then(Value::as_i64), Some(824));
    assert!(doc.get("genre").is_none());
}

#[tokio::test]
async fn test_find_group_by_having() {
    let (_server, session) = common::open().await;

    let mut result = catalog(&session)
        .find(None)
        .fields(["genre", "COUNT(*) AS n"])
        .group_by(["genre"])
        .having("COUNT(*) > 2")
        .execute()
        .await
        .unwrap();
    let docs = result.fetch_all().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].get("genre"), Some(&Value::from("scifi")));
    assert_eq!(docs[0].get("n").and_then(Value::as_i64), Some(3));
}

#[tokio::test]
async fn test_find_like_and_in() {
    let (_server, session) = common::open().await;

    let mut result = catalog(&session)
        .find(Some("title LIKE :pattern OR _id IN ('a4', 'a5')"))
        .bind("pattern", "N%")
        .sort(["_id"])
        .execute()
        .await
        .unwrap();
    let docs = result.fetch_all().await.unwrap();
    assert_eq!(titles(&docs), ["Neuromancer", "Persuasion", "Solaris"]);
}

#[tokio::test]
async fn test_find_unbound_placeholder() {
    let (server, session) = common::open().await;
    let before = server.bytes_received();

    let err = catalog(&session)
        .find(Some("pages > :min"))
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnboundParameter(ref name) if name == "min"), "got {err:?}");
    assert_eq!(server.bytes_received(), before);
}

#[tokio::test]
async fn test_find_bad_expression() {
    let (server, session) = common::open().await;
    let before = server.bytes_received();

    let err = catalog(&session)
        .find(Some("pages >"))
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");
    assert_eq!(server.bytes_received(), before);
}

#[tokio::test]
async fn test_rebinding_leaves_earlier_results() {
    let (_server, session) = common::open().await;
    let statement = books(&session).find(Some("_id = :Id"));

    let statement = statement.bind("id", 1);
    let mut first = statement.execute().await.unwrap();
    let first_docs = first.fetch_all().await.unwrap();

    let statement = statement.bind("ID", 2);
    let mut second = statement.execute().await.unwrap();
    let second_docs = second.fetch_all().await.unwrap();

    assert_eq!(first_docs.len(), 1);
    assert_eq!(first_docs[0].get("name"), Some(&Value::from("Book 1")));
    assert_eq!(second_docs.len(), 1);
    assert_eq!(second_docs[0].get("name"), Some(&Value::from("Book 2")));
}

#[tokio::test]
async fn test_missing_collection() {
    let (_server, session) = common::open().await;
    let missing = session.get_schema("library").get_collection("missing");

    let err = missing.find(None).execute().await.unwrap_err();
    assert!(err.is_server_error(1146), "got {err:?}");
    assert!(!missing.exists_in_database().await.unwrap());
}

#[tokio::test]
async fn test_into_stream() {
    use futures_util::TryStreamExt;

    let (_server, session) = common::open().await;
    let result = catalog(&session).find(None).execute().await.unwrap();
    let docs: Vec<DbDoc> = result.into_stream().try_collect().await.unwrap();
    assert_eq!(docs.len(), 5);
}

// =============================================================================
// Modify
// =============================================================================

#[tokio::test]
async fn test_modify_requires_condition() {
    let (server, session) = common::open().await;
    let before = server.bytes_received();

    for condition in ["", "   "] {
        let err = books(&session)
            .modify(condition)
            .set("name", "x")
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");
    }
    assert_eq!(server.bytes_received(), before);
}

#[tokio::test]
async fn test_modify_requires_an_operation() {
    let (server, session) = common::open().await;
    let before = server.bytes_received();

    let err = books(&session).modify("true").execute().await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");
    assert_eq!(server.bytes_received(), before);
}

#[tokio::test]
async fn test_modify_set_all() {
    let (_server, session) = common::open().await;
    let books = books(&session);

    let result = books.modify("true").set("pages", 10).execute().await.unwrap();
    assert_eq!(result.affected_items_count(), 2);

    let mut found = books.find(None).execute().await.unwrap();
    for doc in found.fetch_all().await.unwrap() {
        assert_eq!(doc.get("pages").and_then(Value::as_i64), Some(10));
    }
}

#[tokio::test]
async fn test_modify_rebinding() {
    let (server, session) = common::open().await;
    let statement = books(&session).modify("_id = :Id").set("name", "renamed");

    let statement = statement.bind("Id", 2);
    let second = statement.execute().await.unwrap();
    let statement = statement.bind("Id", 1);
    let first = statement.execute().await.unwrap();

    assert_eq!(second.affected_items_count(), 1);
    assert_eq!(first.affected_items_count(), 1);
    let stored = server.documents("library", "books").await.unwrap();
    assert!(stored.iter().all(|d| d.get("name") == Some(&Value::from("renamed"))));
}

#[tokio::test]
async fn test_modify_operations() {
    let (_server, session) = common::open().await;
    let catalog = catalog(&session);

    catalog
        .modify("_id = 'a1'")
        .set("pages", expr("pages + 1"))
        .unset(["rating"])
        .set("tags", vec!["desert", "spice"])
        .array_append("tags", "worms")
        .array_insert("tags[0]", "sand")
        .execute()
        .await
        .unwrap();

    let doc = catalog.get_one("a1").await.unwrap().unwrap();
    assert_eq!(doc.get("pages").and_then(Value::as_i64), Some(413));
    assert!(doc.get("rating").is_none());
    let tags: Vec<String> = doc
        .get("tags")
        .and_then(Value::as_array)
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(tags, ["sand", "desert", "spice", "worms"]);
}

#[tokio::test]
async fn test_modify_patch() {
    let (_server, session) = common::open().await;
    let catalog = catalog(&session);

    let result = catalog
        .modify("genre = 'classic'")
        .patch(DbDoc::parse(r#"{"genre": "novel", "rating": null, "era": "regency"}"#).unwrap())
        .execute()
        .await
        .unwrap();
    assert_eq!(result.affected_items_count(), 2);

    let doc = catalog.get_one("a2").await.unwrap().unwrap();
    assert_eq!(doc.get("genre"), Some(&Value::from("novel")));
    assert_eq!(doc.get("era"), Some(&Value::from("regency")));
    assert!(doc.get("rating").is_none());
}

#[tokio::test]
async fn test_modify_sort_and_limit() {
    let (_server, session) = common::open().await;
    let catalog = catalog(&session);

    let result = catalog
        .modify("true")
        .set("top", true)
        .sort(["rating DESC"])
        .limit(1)
        .execute()
        .await
        .unwrap();
    assert_eq!(result.affected_items_count(), 1);

    let mut found = catalog.find(Some("top = true")).execute().await.unwrap();
    let docs = found.fetch_all().await.unwrap();
    assert_eq!(titles(&docs), ["Dune"]);
}

#[tokio::test]
async fn test_modify_cannot_change_id() {
    let (_server, session) = common::open().await;

    let err = books(&session)
        .modify("_id = 1")
        .set("_id", 5)
        .execute()
        .await
        .unwrap_err();
    assert!(err.is_server_error(5053), "got {err:?}");
}

// =============================================================================
// Remove
// =============================================================================

#[tokio::test]
async fn test_remove() {
    let (_server, session) = common::open().await;
    let catalog = catalog(&session);

    let result = catalog
        .remove("genre = :genre")
        .bind("genre", "classic")
        .execute()
        .await
        .unwrap();
    assert_eq!(result.affected_items_count(), 2);
    assert_eq!(catalog.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_remove_with_limit() {
    let (_server, session) = common::open().await;
    let catalog = catalog(&session);

    let result = catalog
        .remove("true")
        .sort(["pages"])
        .limit(2)
        .execute()
        .await
        .unwrap();
    assert_eq!(result.affected_items_count(), 2);
    assert!(catalog.get_one("a5").await.unwrap().is_none());
    assert!(catalog.get_one("a4").await.unwrap().is_none());
    assert!(catalog.get_one("a3").await.unwrap().is_some());
}

#[tokio::test]
async fn test_remove_requires_condition() {
    let (server, session) = common::open().await;
    let before = server.bytes_received();

    let err = books(&session).remove("").execute().await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");
    assert_eq!(server.bytes_received(), before);
}

// =============================================================================
// Single Document Helpers
// =============================================================================

#[tokio::test]
async fn test_get_one() {
    let (_server, session) = common::open().await;
    let books = books(&session);

    let doc = books.get_one(2).await.unwrap().unwrap();
    assert_eq!(doc.get("name"), Some(&Value::from("Book 2")));
    assert!(books.get_one(99).await.unwrap().is_none());
}

#[tokio::test]
async fn test_replace_one() {
    let (_server, session) = common::open().await;
    let books = books(&session);

    let result = books
        .replace_one(1, DbDoc::new().with("title", "Replaced"))
        .await
        .unwrap();
    assert_eq!(result.affected_items_count(), 1);

    let doc = books.get_one(1).await.unwrap().unwrap();
    assert_eq!(doc.get("title"), Some(&Value::from("Replaced")));
    assert!(doc.get("name").is_none());

    let missing = books
        .replace_one(99, DbDoc::new().with("title", "Nobody"))
        .await
        .unwrap();
    assert_eq!(missing.affected_items_count(), 0);
    assert_eq!(books.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_replace_one_with_other_id() {
    let (server, session) = common::open().await;
    let before = server.bytes_received();

    let err = books(&session)
        .replace_one(1, DbDoc::new().with("_id", 2))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");
    assert_eq!(server.bytes_received(), before);
}

#[tokio::test]
async fn test_add_or_replace_one() {
    let (_server, session) = common::open().await;
    let books = books(&session);

    let inserted = books
        .add_or_replace_one(3, DbDoc::new().with("name", "Book 3"))
        .await
        .unwrap();
    assert_eq!(inserted.affected_items_count(), 1);

    let replaced = books
        .add_or_replace_one(1, DbDoc::new().with("name", "First"))
        .await
        .unwrap();
    assert_eq!(replaced.affected_items_count(), 2);

    assert_eq!(books.count().await.unwrap(), 3);
    let doc = books.get_one(1).await.unwrap().unwrap();
    assert_eq!(doc.get("name"), Some(&Value::from("First")));
}

#[tokio::test]
async fn test_remove_one() {
    let (_server, session) = common::open().await;
    let books = books(&session);

    assert_eq!(books.remove_one(1).await.unwrap().affected_items_count(), 1);
    assert_eq!(books.remove_one(1).await.unwrap().affected_items_count(), 0);
    assert_eq!(books.count().await.unwrap(), 1);
}

// =============================================================================
// Collection Administration
// =============================================================================

#[tokio::test]
async fn test_collection_lifecycle() {
    let (_server, session) = common::open().await;
    let schema = session.get_schema("library");

    let notes = schema.create_collection("notes").await.unwrap();
    assert!(notes.exists_in_database().await.unwrap());

    let err = schema.create_collection("notes").await.unwrap_err();
    assert!(err.is_server_error(1050), "got {err:?}");
    schema.ensure_collection("notes").await.unwrap();

    let mut names: Vec<String> = schema
        .get_collections()
        .await
        .unwrap()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    names.sort();
    assert_eq!(names, ["books", "catalog", "notes"]);

    schema.drop_collection("notes").await.unwrap();
    assert!(!notes.exists_in_database().await.unwrap());
    schema.drop_collection("notes").await.unwrap();
}

#[tokio::test]
async fn test_invalid_collection_name() {
    let (server, session) = common::open().await;
    let before = server.bytes_received();

    let err = session
        .get_schema("library")
        .create_collection("")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");
    assert_eq!(server.bytes_received(), before);
}

#[tokio::test]
async fn test_collection_as_table() {
    let (_server, session) = common::open().await;
    let table = session
        .get_schema("library")
        .get_collection_as_table("catalog");

    assert_eq!(table.count().await.unwrap(), 5);
    let mut result = table.select(Vec::<&str>::new()).execute().await.unwrap();
    assert_eq!(result.column_names(), ["doc", "_id"]);
    let rows = result.fetch_all().await.unwrap();
    assert_eq!(rows.len(), 5);
    let doc: DbDoc = rows[0].get("doc").unwrap();
    assert!(doc.get("title").is_some());
}
