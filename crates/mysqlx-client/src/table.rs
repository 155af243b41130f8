//! Relational tables and their statements.
//!
//! Same shape as the collection builders, with column references instead
//! of document paths. A JSON column can be reached with `doc->'$.path'`.

use once_cell::sync::OnceCell;

use mysqlx_protocol::{
    ClientMessage, Collection as Target, DataModel, Delete, Expr, Find, Insert, Update,
    UpdateOperation, UpdateType,
};
use mysqlx_types::Value;

use crate::error::{Error, Result};
use crate::result::{ExecuteResult, RowResult};
use crate::schema::{Schema, validate_name};
use crate::session::Session;
use crate::sql::quote_identifier;
use crate::statement::{FilterData, Operand, Plan, compile_plan, field_list};

/// A table or view.
#[derive(Debug, Clone)]
pub struct Table {
    schema: Schema,
    name: String,
}

impl Table {
    pub(crate) fn new(schema: Schema, name: impl Into<String>) -> Self {
        Self {
            schema,
            name: name.into(),
        }
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema the table lives in.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn session(&self) -> &Session {
        self.schema.session()
    }

    fn target(&self) -> Result<Target> {
        validate_name("schema", self.schema.name())?;
        validate_name("table", &self.name)?;
        Ok(Target::new(self.schema.name(), self.name.as_str()))
    }

    /// Select columns or expressions; no columns selects every column.
    #[must_use]
    pub fn select<I, S>(&self, columns: I) -> SelectStatement
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        SelectStatement::new(self.clone(), field_list(columns))
    }

    /// Insert rows into the given columns.
    #[must_use]
    pub fn insert<I, S>(&self, columns: I) -> InsertStatement
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        InsertStatement::new(self.clone(), field_list(columns))
    }

    /// Update rows; a `where_` condition is required.
    #[must_use]
    pub fn update(&self) -> UpdateStatement {
        UpdateStatement::new(self.clone())
    }

    /// Delete rows; a `where_` condition is required.
    #[must_use]
    pub fn delete(&self) -> DeleteStatement {
        DeleteStatement::new(self.clone())
    }

    /// Number of rows.
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

    /// Whether the table exists on the server.
    pub async fn exists_in_database(&self) -> Result<bool> {
        Ok(self.object_kind().await?.is_some())
    }

    /// Whether the table is a view.
    pub async fn is_view(&self) -> Result<bool> {
        Ok(self.object_kind().await?.as_deref() == Some("VIEW"))
    }

    async fn object_kind(&self) -> Result<Option<String>> {
        self.target()?;
        let objects = self.schema.list_objects(Some(&self.name)).await?;
        Ok(objects
            .into_iter()
            .find(|(name, kind)| *name == self.name && (kind == "TABLE" || kind == "VIEW"))
            .map(|(_, kind)| kind))
    }
}

/// Select rows from a table.
#[derive(Debug, Clone)]
pub struct SelectStatement {
    table: Table,
    columns: Vec<String>,
    filter: FilterData,
    group_by: Vec<String>,
    having: Option<String>,
    plan: OnceCell<Plan>,
}

impl SelectStatement {
    fn new(table: Table, columns: Vec<String>) -> Self {
        Self {
            table,
            columns,
            filter: FilterData::default(),
            group_by: Vec::new(),
            having: None,
            plan: OnceCell::new(),
        }
    }

    /// Filter rows.
    #[must_use]
    pub fn where_(mut self, condition: &str) -> Self {
        self.filter.condition = Some(condition.to_string());
        self.plan = OnceCell::new();
        self
    }

    /// Sort keys: `"pages DESC"`.
    #[must_use]
    pub fn order_by<I, S>(mut self, sort: I) -> Self
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
    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.group_by = field_list(columns);
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

    /// Return at most `count` rows.
    #[must_use]
    pub fn limit(mut self, count: u64) -> Self {
        self.filter.limit = Some(count);
        self
    }

    /// Skip the first `count` rows.
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
            compile_plan(DataModel::Table, &self.filter, |compiler, plan| {
                plan.projection = self
                    .columns
                    .iter()
                    .map(|c| compiler.projection(c))
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

    /// Run the select.
    pub async fn execute(&self) -> Result<RowResult> {
        let collection = self.table.target()?;
        let plan = self.plan()?;
        let args = self.filter.resolve(&plan.placeholders)?;
        let find = Find {
            collection,
            data_model: DataModel::Table,
            projection: plan.projection.clone(),
            criteria: plan.criteria.clone(),
            args,
            order: plan.order.clone(),
            grouping: plan.grouping.clone(),
            grouping_criteria: plan.grouping_criteria.clone(),
            limit: self.filter.limit(),
        };
        let stream = self
            .table
            .session()
            .execute(ClientMessage::Find(find))
            .await?;
        RowResult::open(stream).await
    }
}

/// Insert rows into a table.
#[derive(Debug, Clone)]
pub struct InsertStatement {
    table: Table,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl InsertStatement {
    fn new(table: Table, columns: Vec<String>) -> Self {
        Self {
            table,
            columns,
            rows: Vec::new(),
        }
    }

    /// Queue a row, one value per column.
    #[must_use]
    pub fn values<I, V>(mut self, row: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
        self
    }

    /// Insert every queued row in one request.
    ///
    /// An empty batch sends nothing.
    pub async fn execute(&self) -> Result<ExecuteResult> {
        let collection = self.table.target()?;
        if !self.columns.is_empty() {
            if let Some(row) = self.rows.iter().find(|r| r.len() != self.columns.len()) {
                return Err(Error::invalid_argument(format!(
                    "row has {} values for {} columns",
                    row.len(),
                    self.columns.len()
                )));
            }
        }
        if self.rows.is_empty() {
            return Ok(ExecuteResult::default());
        }

        let rows = self
            .rows
            .iter()
            .map(|row| row.iter().map(|v| Expr::Literal(v.to_scalar())).collect())
            .collect();
        let insert = Insert {
            collection,
            data_model: DataModel::Table,
            projection: self.columns.clone(),
            rows,
            args: Vec::new(),
            upsert: false,
        };
        let stream = self
            .table
            .session()
            .execute(ClientMessage::Insert(insert))
            .await?;
        ExecuteResult::collect(stream).await
    }
}

/// Update rows of a table.
#[derive(Debug, Clone)]
pub struct UpdateStatement {
    table: Table,
    filter: FilterData,
    assignments: Vec<(String, Operand)>,
    plan: OnceCell<Plan>,
}

impl UpdateStatement {
    fn new(table: Table) -> Self {
        Self {
            table,
            filter: FilterData::default(),
            assignments: Vec::new(),
            plan: OnceCell::new(),
        }
    }

    /// Assign a column. Assignments run in the order given.
    #[must_use]
    pub fn set(mut self, column: &str, value: impl Into<Operand>) -> Self {
        self.assignments.push((column.to_string(), value.into()));
        self.plan = OnceCell::new();
        self
    }

    /// Rows to update.
    #[must_use]
    pub fn where_(mut self, condition: &str) -> Self {
        self.filter.condition = Some(condition.to_string());
        self.plan = OnceCell::new();
        self
    }

    /// Sort keys deciding which rows a limit keeps.
    #[must_use]
    pub fn order_by<I, S>(mut self, sort: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filter.sort = field_list(sort);
        self.plan = OnceCell::new();
        self
    }

    /// Update at most `count` rows.
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
            compile_plan(DataModel::Table, &self.filter, |compiler, plan| {
                plan.operations = self
                    .assignments
                    .iter()
                    .map(|(column, value)| -> Result<UpdateOperation> {
                        Ok(UpdateOperation {
                            source: compiler.column_identifier(column)?,
                            operation: UpdateType::Set,
                            value: Some(value.compile(compiler)?),
                        })
                    })
                    .collect::<Result<_>>()?;
                Ok(())
            })
        })
    }

    /// Run the update.
    pub async fn execute(&self) -> Result<ExecuteResult> {
        self.filter.required_condition()?;
        let collection = self.table.target()?;
        if self.assignments.is_empty() {
            return Err(Error::invalid_argument("no column assignment given"));
        }
        let plan = self.plan()?;
        let args = self.filter.resolve(&plan.placeholders)?;
        let update = Update {
            collection,
            data_model: DataModel::Table,
            criteria: plan.criteria.clone(),
            args,
            order: plan.order.clone(),
            limit: self.filter.limit(),
            operations: plan.operations.clone(),
        };
        let stream = self
            .table
            .session()
            .execute(ClientMessage::Update(update))
            .await?;
        ExecuteResult::collect(stream).await
    }
}

/// Delete rows from a table.
#[derive(Debug, Clone)]
pub struct DeleteStatement {
    table: Table,
    filter: FilterData,
    plan: OnceCell<Plan>,
}

impl DeleteStatement {
    fn new(table: Table) -> Self {
        Self {
            table,
            filter: FilterData::default(),
            plan: OnceCell::new(),
        }
    }

    /// Rows to delete.
    #[must_use]
    pub fn where_(mut self, condition: &str) -> Self {
        self.filter.condition = Some(condition.to_string());
        self.plan = OnceCell::new();
        self
    }

    /// Sort keys deciding which rows a limit removes.
    #[must_use]
    pub fn order_by<I, S>(mut self, sort: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filter.sort = field_list(sort);
        self.plan = OnceCell::new();
        self
    }

    /// Delete at most `count` rows.
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

    /// Run the delete.
    pub async fn execute(&self) -> Result<ExecuteResult> {
        self.filter.required_condition()?;
        let collection = self.table.target()?;
        let plan = self
            .plan
            .get_or_try_init(|| compile_plan(DataModel::Table, &self.filter, |_, _| Ok(())))?;
        let args = self.filter.resolve(&plan.placeholders)?;
        let delete = Delete {
            collection,
            data_model: DataModel::Table,
            criteria: plan.criteria.clone(),
            args,
            order: plan.order.clone(),
            limit: self.filter.limit(),
        };
        let stream = self
            .table
            .session()
            .execute(ClientMessage::Delete(delete))
            .await?;
        ExecuteResult::collect(stream).await
    }
}
