//! Document collections and their statements.
//!
//! Every builder is a plain value: setters consume and return it, and
//! `execute` borrows it, so a statement can be bound and run repeatedly.
//!
//! ```rust,ignore
//! let books = session.get_schema("library").get_collection("books");
//!
//! books
//!     .add(DbDoc::new().with("title", "Dune").with("pages", 412))
//!     .add(r#"{"title": "Emma", "pages": 474}"#)
//!     .execute()
//!     .await?;
//!
//! let by_title = books.find(Some("title = :title")).fields(["title", "pages"]);
//! let dune = by_title.clone().bind("title", "Dune").execute().await?.fetch_all().await?;
//!
//! books.modify("pages > 400").set("long", true).execute().await?;
//! books.remove("title = 'Emma'").execute().await?;
//! ```

use once_cell::sync::OnceCell;

use mysqlx_protocol::{
    ClientMessage, Collection as Target, DataModel, Delete, Expr, Find, Insert, Scalar, Update,
    UpdateOperation, UpdateType,
};
use mysqlx_types::{DbDoc, ID_FIELD, TypeError, Value};

use crate::error::{Error, Result};
use crate::result::{DocResult, ExecuteResult};
use crate::schema::{Schema, validate_name};
use crate::session::Session;
use crate::sql::quote_identifier;
use crate::statement::{FilterData, Operand, Plan, compile_plan, field_list};

/// Something that can be stored as a document.
pub trait IntoDocument {
    /// Convert, failing on text that is not a JSON object.
    fn into_document(self) -> std::result::Result<DbDoc, TypeError>;
}

impl IntoDocument for DbDoc {
    fn into_document(self) -> std::result::Result<DbDoc, TypeError> {
        Ok(self)
    }
}

impl IntoDocument for &DbDoc {
    fn into_document(self) -> std::result::Result<DbDoc, TypeError> {
        Ok(self.clone())
    }
}

impl IntoDocument for &str {
    fn into_document(self) -> std::result::Result<DbDoc, TypeError> {
        DbDoc::parse(self)
    }
}

impl IntoDocument for String {
    fn into_document(self) -> std::result::Result<DbDoc, TypeError> {
        DbDoc::parse(&self)
    }
}

impl IntoDocument for serde_json::Value {
    fn into_document(self) -> std::result::Result<DbDoc, TypeError> {
        DbDoc::from_json(self)
    }
}

/// A collection of JSON documents.
#[derive(Debug, Clone)]
pub struct Collection {
    schema: Schema,
    name: String,
}

impl Collection {
    pub(crate) fn new(schema: Schema, name: impl Into<String>) -> Self {
        Self {
            schema,
            name: name.into(),
        }
    }

    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema the collection lives in.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn session(&self) -> &Session {
        self.schema.session()
    }

    fn target(&self) -> Result<Target> {
        validate_name("schema", self.schema.name())?;
        validate_name("collection", &self.name)?;
        Ok(Target::new(self.schema.name(), self.name.as_str()))
    }

    /// Start an add with one document; call [`AddStatement::add`] for more.
    #[must_use]
    pub fn add(&self, doc: impl IntoDocument) -> AddStatement {
        AddStatement::new(self.clone()).add(doc)
    }

    /// Find documents; `None` matches every document.
    #[must_use]
    pub fn find(&self, condition: Option<&str>) -> FindStatement {
        FindStatement::new(self.clone(), condition.map(String::from))
    }

    /// Change the documents matching `condition`.
    #[must_use]
    pub fn modify(&self, condition: &str) -> ModifyStatement {
        ModifyStatement::new(self.clone(), condition.to_string())
    }

    /// Remove the documents matching `condition`.
    #[must_use]
    pub fn remove(&self, condition: &str) -> RemoveStatement {
        RemoveStatement::new(self.clone(), condition.to_string())
    }

    /// The document with the given `_id`.
    pub async fn get_one(&self, id: impl Into<Value>) -> Result<Option<DbDoc>> {
        let mut result = self
            .find(Some("_id = :id"))
            .bind("id", id)
            .execute()
            .await?;
        let doc = result.fetch_one().await?;
        result.close().await?;
        Ok(doc)
    }

    /// Replace the document with the given `_id`. Does nothing if it is
    /// missing.
    pub async fn replace_one(
        &self,
        id: impl Into<Value>,
        doc: impl IntoDocument,
    ) -> Result<ExecuteResult> {
        let id = id.into();
        let doc = with_id(doc, &id)?;
        self.modify("_id = :id")
            .set("$", doc)
            .bind("id", id)
            .execute()
            .await
    }

    /// Insert the document under `id`, replacing any existing one.
    pub async fn add_or_replace_one(
        &self,
        id: impl Into<Value>,
        doc: impl IntoDocument,
    ) -> Result<ExecuteResult> {
        let id = id.into();
        let doc = with_id(doc, &id)?;
        AddStatement::new(self.clone())
            .add(doc)
            .upsert(true)
            .execute()
            .await
    }

    /// Remove the document with the given `_id`.
    pub async fn remove_one(&self, id: impl Into<Value>) -> Result<ExecuteResult> {
        self.remove("_id = :id").bind("id", id).execute().await
    }

    /// Number of documents.
    pub async fn count(&self) -> Result<u64> {
        self.target()?;
        let text = format!(
            "SELECT COUNT(*) FROM {}.{}",
            quote_identifier(self.schema.name()),
            quote_identifier(&self.name)
        );
        let mut result = self.session().sql(text).execute().await?;
        let count = match result.fetch_one().await? {
            Some(row) => row.get::<u64>(0)?,
            None => 0,
        };
        result.close().await?;
        Ok(count)
    }

    /// Whether the collection exists on the server.
    pub async fn exists_in_database(&self) -> Result<bool> {
        self.target()?;
        let objects = self.schema.list_objects(Some(&self.name)).await?;
        Ok(objects
            .iter()
            .any(|(name, kind)| *name == self.name && kind == "COLLECTION"))
    }
}

/// Set `_id` on a document, refusing a different existing one.
fn with_id(doc: impl IntoDocument, id: &Value) -> Result<DbDoc> {
    let mut doc = doc.into_document()?;
    if let Some(existing) = doc.id() {
        if existing != id {
            return Err(Error::invalid_argument(
                "Replacement document has an _id that is different than the matched document",
            ));
        }
    }
    doc.set(ID_FIELD, id.clone());
    Ok(doc)
}

/// Add documents to a collection.
#[derive(Debug, Clone)]
pub struct AddStatement {
    collection: Collection,
    docs: Vec<DbDoc>,
    invalid: Option<TypeError>,
    upsert: bool,
}

impl AddStatement {
    fn new(collection: Collection) -> Self {
        Self {
            collection,
            docs: Vec::new(),
            invalid: None,
            upsert: false,
        }
    }

    /// Queue another document.
    #[must_use]
    pub fn add(mut self, doc: impl IntoDocument) -> Self {
        match doc.into_document() {
            Ok(doc) => self.docs.push(doc),
            Err(e) => {
                self.invalid.get_or_insert(e);
            }
        }
        self
    }

    pub(crate) fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    /// Number of queued documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Whether no document is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Insert every queued document in one request.
    ///
    /// An empty batch sends nothing.
    pub async fn execute(&self) -> Result<ExecuteResult> {
        if let Some(e) = &self.invalid {
            return Err(Error::invalid_argument(format!("invalid document: {e}")));
        }
        let collection = self.collection.target()?;
        if self.docs.is_empty() {
            return Ok(ExecuteResult::default());
        }

        let rows = self
            .docs
            .iter()
            .map(|doc| vec![Expr::Literal(Scalar::json(doc.to_json_string()))])
            .collect();
        let insert = Insert {
            collection,
            data_model: DataModel::Document,
            projection: Vec::new(),
            rows,
            args: Vec::new(),
            upsert: self.upsert,
        };
        let stream = self
            .collection
            .session()
            .execute(ClientMessage::Insert(insert))
            .await?;
        ExecuteResult::collect(stream).await
    }
}

/// Find documents in a collection.
#[derive(Debug, Clone)]
pub struct FindStatement {
    collection: Collection,
    filter: FilterData,
    fields: Vec<String>,
    group_by: Vec<String>,
    having: Option<String>,
    plan: OnceCell<Plan>,
}

impl FindStatement {
    fn new(collection: Collection, condition: Option<String>) -> Self {
        Self {
            collection,
            filter: FilterData::new(condition),
            fields: Vec::new(),
            group_by: Vec::new(),
            having: None,
            plan: OnceCell::new(),
        }
    }

    /// Project the result: `"title"`, `"pages * 2 AS double"`.
    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fields = field_list(fields);
        self.plan = OnceCell::new();
        self
    }

    /// Sort keys: `"pages DESC"`.
    #[must_use]
    pub fn sort<I, S>(mut self, sort: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filter.sort = field_list(sort);
        self.plan = OnceCell::new();
        self
    }

    /// Group by the given expressions.
    #[must_use]
    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.group_by = field_list(fields);
        self.plan = OnceCell::new();
        self
    }

    /// Filter groups.
    #[must_use]
    pub fn having(mut self, condition: &str) -> Self {
        self.having = Some(condition.to_string());
        self.plan = OnceCell::new();
        self
    }

    /// Return at most `count` documents.
    #[must_use]
    pub fn limit(mut self, count: u64) -> Self {
        self.filter.limit = Some(count);
        self
    }

    /// Skip the first `count` documents.
    #[must_use]
    pub fn offset(mut self, count: u64) -> Self {
        self.filter.offset = Some(count);
        self
    }

    /// Bind a placeholder.
    #[must_use]
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.filter.bind(name, value.into());
        self
    }

    fn plan(&self) -> Result<&Plan> {
        self.plan.get_or_try_init(|| {
            compile_plan(DataModel::Document, &self.filter, |compiler, plan| {
                plan.projection = self
                    .fields
                    .iter()
                    .map(|f| compiler.projection(f))
                    .collect::<std::result::Result<_, _>>()?;
                plan.grouping = self
                    .group_by
                    .iter()
                    .map(|g| compiler.expression(g))
                    .collect::<std::result::Result<_, _>>()?;
                plan.grouping_criteria = self
                    .having
                    .as_deref()
                    .map(|h| compiler.expression(h))
                    .transpose()?;
                Ok(())
            })
        })
    }

    /// Run the find.
    pub async fn execute(&self) -> Result<DocResult> {
        let collection = self.collection.target()?;
        let plan = self.plan()?;
        let args = self.filter.resolve(&plan.placeholders)?;
        let find = Find {
            collection,
            data_model: DataModel::Document,
            projection: plan.projection.clone(),
            criteria: plan.criteria.clone(),
            args,
            order: plan.order.clone(),
            grouping: plan.grouping.clone(),
            grouping_criteria: plan.grouping_criteria.clone(),
            limit: self.filter.limit(),
        };
        let stream = self
            .collection
            .session()
            .execute(ClientMessage::Find(find))
            .await?;
        DocResult::open(stream).await
    }
}

/// Change documents in place.
#[derive(Debug, Clone)]
pub struct ModifyStatement {
    collection: Collection,
    filter: FilterData,
    operations: Vec<(UpdateType, String, Option<Operand>)>,
    plan: OnceCell<Plan>,
}

impl ModifyStatement {
    fn new(collection: Collection, condition: String) -> Self {
        Self {
            collection,
            filter: FilterData::new(Some(condition)),
            operations: Vec::new(),
            plan: OnceCell::new(),
        }
    }

    fn push(mut self, kind: UpdateType, path: &str, value: Option<Operand>) -> Self {
        self.operations.push((kind, path.to_string(), value));
        self.plan = OnceCell::new();
        self
    }

    /// Set a member, creating it if missing.
    #[must_use]
    pub fn set(self, path: &str, value: impl Into<Operand>) -> Self {
        self.push(UpdateType::ItemSet, path, Some(value.into()))
    }

    /// Replace a member only where it exists.
    #[must_use]
    pub fn change(self, path: &str, value: impl Into<Operand>) -> Self {
        self.push(UpdateType::ItemReplace, path, Some(value.into()))
    }

    /// Remove members.
    #[must_use]
    pub fn unset<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in field_list(paths) {
            self = self.push(UpdateType::ItemRemove, &path, None);
        }
        self
    }

    /// Insert into an array; the path ends with the target index.
    #[must_use]
    pub fn array_insert(self, path: &str, value: impl Into<Operand>) -> Self {
        self.push(UpdateType::ArrayInsert, path, Some(value.into()))
    }

    /// Append to an array.
    #[must_use]
    pub fn array_append(self, path: &str, value: impl Into<Operand>) -> Self {
        self.push(UpdateType::ArrayAppend, path, Some(value.into()))
    }

    /// Merge a JSON patch into each document.
    #[must_use]
    pub fn patch(self, patch: impl Into<Operand>) -> Self {
        self.push(UpdateType::MergePatch, "$", Some(patch.into()))
    }

    /// Sort keys deciding which documents a limit keeps.
    #[must_use]
    pub fn sort<I, S>(mut self, sort: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filter.sort = field_list(sort);
        self.plan = OnceCell::new();
        self
    }

    /// Change at most `count` documents.
    #[must_use]
    pub fn limit(mut self, count: u64) -> Self {
        self.filter.limit = Some(count);
        self
    }

    /// Bind a placeholder.
    #[must_use]
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.filter.bind(name, value.into());
        self
    }

    fn plan(&self) -> Result<&Plan> {
        self.plan.get_or_try_init(|| {
            compile_plan(DataModel::Document, &self.filter, |compiler, plan| {
                plan.operations = self
                    .operations
                    .iter()
                    .map(|(kind, path, value)| -> Result<UpdateOperation> {
                        Ok(UpdateOperation {
                            source: compiler.column_identifier(path)?,
                            operation: *kind,
                            value: value.as_ref().map(|v| v.compile(compiler)).transpose()?,
                        })
                    })
                    .collect::<Result<_>>()?;
                Ok(())
            })
        })
    }

    /// Run the modification.
    pub async fn execute(&self) -> Result<ExecuteResult> {
        self.filter.required_condition()?;
        let collection = self.collection.target()?;
        if self.operations.is_empty() {
            return Err(Error::invalid_argument("no update operation given"));
        }
        let plan = self.plan()?;
        let args = self.filter.resolve(&plan.placeholders)?;
        let update = Update {
            collection,
            data_model: DataModel::Document,
            criteria: plan.criteria.clone(),
            args,
            order: plan.order.clone(),
            limit: self.filter.limit(),
            operations: plan.operations.clone(),
        };
        let stream = self
            .collection
            .session()
            .execute(ClientMessage::Update(update))
            .await?;
        ExecuteResult::collect(stream).await
    }
}

/// Remove documents.
#[derive(Debug, Clone)]
pub struct RemoveStatement {
    collection: Collection,
    filter: FilterData,
    plan: OnceCell<Plan>,
}

impl RemoveStatement {
    fn new(collection: Collection, condition: String) -> Self {
        Self {
            collection,
            filter: FilterData::new(Some(condition)),
            plan: OnceCell::new(),
        }
    }

    /// Sort keys deciding which documents a limit removes.
    #[must_use]
    pub fn sort<I, S>(mut self, sort: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filter.sort = field_list(sort);
        self.plan = OnceCell::new();
        self
    }

    /// Remove at most `count` documents.
    #[must_use]
    pub fn limit(mut self, count: u64) -> Self {
        self.filter.limit = Some(count);
        self
    }

    /// Bind a placeholder.
    #[must_use]
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.filter.bind(name, value.into());
        self
    }

    /// Run the removal.
    pub async fn execute(&self) -> Result<ExecuteResult> {
        self.filter.required_condition()?;
        let collection = self.collection.target()?;
        let plan = self
            .plan
            .get_or_try_init(|| compile_plan(DataModel::Document, &self.filter, |_, _| Ok(())))?;
        let args = self.filter.resolve(&plan.placeholders)?;
        let delete = Delete {
            collection,
            data_model: DataModel::Document,
            criteria: plan.criteria.clone(),
            args,
            order: plan.order.clone(),
            limit: self.filter.limit(),
        };
        let stream = self
            .collection
            .session()
            .execute(ClientMessage::Delete(delete))
            .await?;
        ExecuteResult::collect(stream).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_into_document() {
        let doc = r#"{"a": 1}"#.into_document().unwrap();
        assert_eq!(doc.get("a"), Some(&Value::Int(1)));
        assert!("[1, 2]".into_document().is_err());
        assert!(serde_json::json!({"b": true}).into_document().is_ok());
    }

    #[test]
    fn test_with_id() {
        let doc = with_id(DbDoc::new().with("a", 1), &Value::from("x1")).unwrap();
        assert_eq!(doc.id(), Some(&Value::from("x1")));

        let same = with_id(DbDoc::new().with("_id", "x1"), &Value::from("x1"));
        assert!(same.is_ok());

        let other = with_id(DbDoc::new().with("_id", "x2"), &Value::from("x1"));
        assert!(matches!(other, Err(Error::InvalidArgument(_))));
    }
}
