//! Schema handles.

use once_cell::sync::Lazy;
use regex::Regex;

use mysqlx_types::DbDoc;

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::statement::admin_command;
use crate::table::Table;

/// Server error raised when creating a collection that exists.
const ER_TABLE_EXISTS: u32 = 1050;
/// Server error raised when dropping a collection that does not exist.
const ER_BAD_TABLE: u32 = 1051;

#[allow(clippy::expect_used)]
static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_$\- ]{1,64}$").expect("valid name pattern"));

/// Check a schema, collection or table name before it is sent anywhere.
pub(crate) fn validate_name(kind: &str, name: &str) -> Result<()> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("invalid {kind} name: {name:?}")))
    }
}

/// A schema on the server. Creating a handle does not contact the server.
#[derive(Debug, Clone)]
pub struct Schema {
    session: Session,
    name: String,
}

impl Schema {
    pub(crate) fn new(session: Session, name: impl Into<String>) -> Self {
        Self {
            session,
            name: name.into(),
        }
    }

    /// Schema name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Session the handle belongs to.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Handle on a collection of this schema.
    #[must_use]
    pub fn get_collection(&self, name: impl Into<String>) -> Collection {
        Collection::new(self.clone(), name)
    }

    /// Handle on a table of this schema.
    #[must_use]
    pub fn get_table(&self, name: impl Into<String>) -> Table {
        Table::new(self.clone(), name)
    }

    /// A collection seen through the relational API (`doc` column plus `_id`).
    #[must_use]
    pub fn get_collection_as_table(&self, name: impl Into<String>) -> Table {
        self.get_table(name)
    }

    /// Create a collection. Fails if it already exists.
    pub async fn create_collection(&self, name: &str) -> Result<Collection> {
        validate_name("schema", &self.name)?;
        validate_name("collection", name)?;
        let args = DbDoc::new()
            .with("schema", self.name.as_str())
            .with("name", name);
        admin_command(&self.session, "create_collection", args)
            .await?
            .close()
            .await?;
        tracing::debug!(schema = %self.name, collection = name, "collection created");
        Ok(self.get_collection(name))
    }

    /// Create a collection unless it already exists.
    pub async fn ensure_collection(&self, name: &str) -> Result<Collection> {
        match self.create_collection(name).await {
            Err(e) if e.is_server_error(ER_TABLE_EXISTS) => Ok(self.get_collection(name)),
            other => other,
        }
    }

    /// Drop a collection. Dropping a missing collection is not an error.
    pub async fn drop_collection(&self, name: &str) -> Result<()> {
        validate_name("schema", &self.name)?;
        validate_name("collection", name)?;
        let args = DbDoc::new()
            .with("schema", self.name.as_str())
            .with("name", name);
        let outcome = match admin_command(&self.session, "drop_collection", args).await {
            Ok(mut result) => result.close().await,
            Err(e) => Err(e),
        };
        match outcome {
            Err(e) if e.is_server_error(ER_BAD_TABLE) => Ok(()),
            other => other,
        }
    }

    /// Every collection of the schema.
    pub async fn get_collections(&self) -> Result<Vec<Collection>> {
        Ok(self
            .list_objects(None)
            .await?
            .into_iter()
            .filter(|(_, kind)| kind == "COLLECTION")
            .map(|(name, _)| self.get_collection(name))
            .collect())
    }

    /// Every table and view of the schema.
    pub async fn get_tables(&self) -> Result<Vec<Table>> {
        Ok(self
            .list_objects(None)
            .await?
            .into_iter()
            .filter(|(_, kind)| kind == "TABLE" || kind == "VIEW")
            .map(|(name, _)| self.get_table(name))
            .collect())
    }

    /// Whether the schema exists.
    pub async fn exists_in_database(&self) -> Result<bool> {
        let schemas = self.session.get_schemas().await?;
        Ok(schemas.iter().any(|s| s.name == self.name))
    }

    /// `(name, type)` of the objects in this schema, optionally filtered by
    /// a `LIKE` pattern.
    pub(crate) async fn list_objects(&self, pattern: Option<&str>) -> Result<Vec<(String, String)>> {
        validate_name("schema", &self.name)?;
        let mut args = DbDoc::new().with("schema", self.name.as_str());
        if let Some(pattern) = pattern {
            args.set("pattern", pattern);
        }
        let mut result = admin_command(&self.session, "list_objects", args).await?;
        let mut objects = Vec::new();
        while let Some(row) = result.fetch_one().await? {
            objects.push((row.get::<String>("name")?, row.get::<String>("type")?));
        }
        Ok(objects)
    }
}
