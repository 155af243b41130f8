//! In-memory schemas, collections and tables behind the mock server.
//!
//! Every CRUD message is executed against this store, so tests observe
//! real effects: a `modify` changes what a later `find` returns. A
//! statement either applies completely or not at all.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use mysqlx_protocol::{
    Collection, ColumnFlags, ColumnMetaData, ColumnType, ContentType, DataModel, Delete,
    DocumentPathItem, Expr, Find, Insert, Limit, Order, OrderDirection, Projection, ServerError,
    Update, UpdateOperation, UpdateType,
};
use mysqlx_types::encode::UTF8MB4_COLLATION;
use mysqlx_types::{DbDoc, ID_FIELD, Value, encode_value, infer_column};

use crate::eval::{Evaluator, Subject, compare, equals, has_aggregate, like};

/// Database already exists.
pub const ER_DB_CREATE_EXISTS: u32 = 1007;
/// Database does not exist on drop.
pub const ER_DB_DROP_EXISTS: u32 = 1008;
/// No schema given.
pub const ER_NO_DB_ERROR: u32 = 1046;
/// Unknown schema.
pub const ER_BAD_DB_ERROR: u32 = 1049;
/// Collection or table already exists.
pub const ER_TABLE_EXISTS_ERROR: u32 = 1050;
/// Unknown collection or table on drop.
pub const ER_BAD_TABLE_ERROR: u32 = 1051;
/// Duplicate key.
pub const ER_DUP_ENTRY: u32 = 1062;
/// Insert row has the wrong number of values.
pub const ER_WRONG_VALUE_COUNT_ON_ROW: u32 = 1136;
/// Collection or table does not exist.
pub const ER_NO_SUCH_TABLE: u32 = 1146;
/// Value does not fit the column.
pub const ER_TRUNCATED_WRONG_VALUE: u32 = 1366;
/// Update operation not applicable.
pub const ER_X_BAD_UPDATE_DATA: u32 = 5050;
/// Attempt to change a document's `_id`.
pub const ER_X_BAD_MEMBER_TO_UPDATE: u32 = 5053;
/// Inserted value is not a document.
pub const ER_X_DOC_REQUIRED_FIELD_MISSING: u32 = 5115;
/// A document `_id` is already taken.
pub const ER_X_DOC_ID_DUPLICATE: u32 = 5116;

fn error(code: u32, msg: impl Into<String>) -> ServerError {
    ServerError::new(code, "HY000", msg)
}

/// A result set produced by the server: column metadata and rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockResultSet {
    /// Columns in declared order.
    pub columns: Vec<ColumnMetaData>,
    /// Row values, one per column.
    pub rows: Vec<Vec<Value>>,
}

impl MockResultSet {
    /// A result set whose column types are inferred from the first row.
    #[must_use]
    pub fn infer<S: AsRef<str>>(names: &[S], rows: Vec<Vec<Value>>) -> Self {
        let columns = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let sample = rows
                    .iter()
                    .filter_map(|row| row.get(i))
                    .find(|v| !v.is_null())
                    .cloned()
                    .unwrap_or_default();
                infer_column(name.as_ref(), &sample)
            })
            .collect();
        Self { columns, rows }
    }
}

/// Table definition and contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockTable {
    columns: Vec<ColumnMetaData>,
    rows: Vec<Vec<Value>>,
    view: bool,
    next_auto_increment: u64,
}

impl MockTable {
    /// An empty table with no columns.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_auto_increment: 1,
            ..Self::default()
        }
    }

    /// Add a column. Text columns get a UTF-8 collation.
    #[must_use]
    pub fn column(mut self, name: &str, column_type: ColumnType) -> Self {
        let mut meta = ColumnMetaData::new(column_type, name);
        if matches!(column_type, ColumnType::Bytes | ColumnType::Enum | ColumnType::Set) {
            meta.collation = UTF8MB4_COLLATION;
        }
        self.columns.push(meta);
        self
    }

    /// Add a JSON column.
    #[must_use]
    pub fn json_column(mut self, name: &str) -> Self {
        self.columns
            .push(ColumnMetaData::new(ColumnType::Bytes, name).with_content_type(ContentType::Json));
        self
    }

    /// Add an auto-increment primary key column.
    #[must_use]
    pub fn auto_increment(mut self, name: &str) -> Self {
        self.columns.push(ColumnMetaData::new(ColumnType::SInt, name).with_flags(
            ColumnFlags::AUTO_INCREMENT | ColumnFlags::PRIMARY_KEY | ColumnFlags::NOT_NULL,
        ));
        self
    }

    /// Add a row. Missing trailing values are NULL.
    #[must_use]
    pub fn row<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut row: Vec<Value> = values.into_iter().map(Into::into).collect();
        row.resize(self.columns.len(), Value::Null);
        if let Some(i) = self.auto_increment_index() {
            match row[i].as_u64() {
                Some(v) => self.next_auto_increment = self.next_auto_increment.max(v + 1),
                None => {
                    row[i] = Value::Int(self.next_auto_increment as i64);
                    self.next_auto_increment += 1;
                }
            }
        }
        self.rows.push(row);
        self
    }

    /// Mark the table as a view.
    #[must_use]
    pub fn view(mut self) -> Self {
        self.view = true;
        self
    }

    /// Column metadata.
    #[must_use]
    pub fn columns(&self) -> &[ColumnMetaData] {
        &self.columns
    }

    /// Current rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    fn auto_increment_index(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.flags.contains(ColumnFlags::AUTO_INCREMENT))
    }

    fn column_index(&self, name: &str) -> Result<usize, ServerError> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                error(
                    crate::eval::ER_BAD_FIELD_ERROR,
                    format!("Unknown column '{name}' in 'field list'"),
                )
            })
    }

    fn check_value(&self, index: usize, value: &Value) -> Result<(), ServerError> {
        let column = &self.columns[index];
        encode_value(value, column).map(|_| ()).map_err(|e| {
            error(
                ER_TRUNCATED_WRONG_VALUE,
                format!("Incorrect value for column '{}': {e}", column.name),
            )
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct SchemaData {
    collections: BTreeMap<String, Vec<DbDoc>>,
    tables: BTreeMap<String, MockTable>,
}

/// What a statement produced, before it is put on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Reply {
    pub(crate) result_sets: Vec<MockResultSet>,
    pub(crate) rows_affected: Option<u64>,
    pub(crate) rows_matched: Option<u64>,
    pub(crate) last_insert_id: Option<u64>,
    pub(crate) generated_ids: Vec<String>,
}

impl Reply {
    fn affected(count: u64) -> Self {
        Self {
            rows_affected: Some(count),
            ..Self::default()
        }
    }

    fn rows(set: MockResultSet) -> Self {
        Self {
            result_sets: vec![set],
            ..Self::default()
        }
    }
}

/// All data the mock server holds.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Store {
    schemas: BTreeMap<String, SchemaData>,
    id_prefix: u16,
    id_epoch: u64,
    next_id: u64,
}

impl Default for Store {
    fn default() -> Self {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self {
            schemas: BTreeMap::new(),
            id_prefix: 0,
            id_epoch: epoch,
            next_id: 1,
        }
    }
}

impl Store {
    /// Keep the id sequence of `other` so ids are never reused after a
    /// rollback.
    pub(crate) fn restore(&mut self, snapshot: Self) {
        let next_id = self.next_id;
        *self = snapshot;
        self.next_id = self.next_id.max(next_id);
    }

    /// Next server-generated document id: prefix, start time, serial.
    fn generate_id(&mut self) -> String {
        let id = format!(
            "{:04x}{:08x}{:016x}",
            self.id_prefix, self.id_epoch, self.next_id
        );
        self.next_id += 1;
        id
    }

    pub(crate) fn schema_names(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }

    pub(crate) fn has_schema(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub(crate) fn create_schema(&mut self, name: &str) -> Result<Reply, ServerError> {
        if self.schemas.contains_key(name) {
            return Err(error(
                ER_DB_CREATE_EXISTS,
                format!("Can't create database '{name}'; database exists"),
            ));
        }
        self.schemas.insert(name.to_string(), SchemaData::default());
        Ok(Reply::affected(1))
    }

    pub(crate) fn drop_schema(&mut self, name: &str, if_exists: bool) -> Result<Reply, ServerError> {
        match self.schemas.remove(name) {
            Some(data) => Ok(Reply::affected(
                (data.collections.len() + data.tables.len()) as u64,
            )),
            None if if_exists => Ok(Reply::affected(0)),
            None => Err(error(
                ER_DB_DROP_EXISTS,
                format!("Can't drop database '{name}'; database doesn't exist"),
            )),
        }
    }

    pub(crate) fn insert_collection(&mut self, schema: &str, name: &str, docs: Vec<DbDoc>) {
        let data = self.schemas.entry(schema.to_string()).or_default();
        data.collections.insert(name.to_string(), docs);
    }

    pub(crate) fn insert_table(&mut self, schema: &str, name: &str, table: MockTable) {
        let mut table = table;
        for column in &mut table.columns {
            column.schema = schema.to_string();
            column.table = name.to_string();
            column.original_table = name.to_string();
        }
        let data = self.schemas.entry(schema.to_string()).or_default();
        data.tables.insert(name.to_string(), table);
    }

    /// Documents of a collection, if it exists.
    pub(crate) fn documents(&self, schema: &str, name: &str) -> Option<&[DbDoc]> {
        self.schemas
            .get(schema)?
            .collections
            .get(name)
            .map(Vec::as_slice)
    }

    /// A table, if it exists.
    pub(crate) fn table(&self, schema: &str, name: &str) -> Option<&MockTable> {
        self.schemas.get(schema)?.tables.get(name)
    }

    fn schema(&self, name: &str) -> Result<&SchemaData, ServerError> {
        self.schemas
            .get(name)
            .ok_or_else(|| error(ER_BAD_DB_ERROR, format!("Unknown database '{name}'")))
    }

    fn schema_mut(&mut self, name: &str) -> Result<&mut SchemaData, ServerError> {
        self.schemas
            .get_mut(name)
            .ok_or_else(|| error(ER_BAD_DB_ERROR, format!("Unknown database '{name}'")))
    }

    pub(crate) fn create_collection(&mut self, schema: &str, name: &str) -> Result<Reply, ServerError> {
        let data = self.schema_mut(schema)?;
        if data.collections.contains_key(name) || data.tables.contains_key(name) {
            return Err(error(
                ER_TABLE_EXISTS_ERROR,
                format!("Table '{name}' already exists"),
            ));
        }
        data.collections.insert(name.to_string(), Vec::new());
        Ok(Reply::default())
    }

    pub(crate) fn drop_collection(&mut self, schema: &str, name: &str) -> Result<Reply, ServerError> {
        let data = self.schema_mut(schema)?;
        if data.collections.remove(name).is_none() && data.tables.remove(name).is_none() {
            return Err(error(
                ER_BAD_TABLE_ERROR,
                format!("Unknown table '{schema}.{name}'"),
            ));
        }
        Ok(Reply::default())
    }

    /// `name`/`type` rows for the objects of a schema.
    pub(crate) fn list_objects(
        &self,
        schema: &str,
        pattern: Option<&str>,
    ) -> Result<Reply, ServerError> {
        let data = self.schema(schema)?;
        let mut objects: Vec<(String, &str)> = data
            .collections
            .keys()
            .map(|name| (name.clone(), "COLLECTION"))
            .chain(data.tables.iter().map(|(name, table)| {
                (name.clone(), if table.view { "VIEW" } else { "TABLE" })
            }))
            .filter(|(name, _)| pattern.is_none_or(|p| like(name, p, '\\')))
            .collect();
        objects.sort();

        let rows = objects
            .into_iter()
            .map(|(name, kind)| vec![Value::String(name), Value::from(kind)])
            .collect();
        Ok(Reply::rows(MockResultSet::infer(&["name", "type"], rows)))
    }

    pub(crate) fn count(&self, schema: &str, name: &str) -> Result<Reply, ServerError> {
        let data = self.schema(schema)?;
        let count = match (data.collections.get(name), data.tables.get(name)) {
            (Some(docs), _) => docs.len(),
            (None, Some(table)) => table.rows.len(),
            (None, None) => return Err(no_such_table(schema, name)),
        };
        Ok(Reply::rows(MockResultSet::infer(
            &["COUNT(*)"],
            vec![vec![Value::Int(count as i64)]],
        )))
    }

    pub(crate) fn find(&self, find: &Find) -> Result<Reply, ServerError> {
        let (schema, name) = target(&find.collection)?;
        let data = self.schema(schema)?;
        if let Some(docs) = data.collections.get(name) {
            let subjects: Vec<Subject<'_>> = docs.iter().map(Subject::Document).collect();
            let selected = select(find, subjects)?;
            return match find.data_model {
                DataModel::Document => document_result(find, &selected),
                DataModel::Table => collection_rows(find, &selected),
            };
        }
        match data.tables.get(name) {
            Some(table) if find.data_model == DataModel::Table => {
                let subjects: Vec<Subject<'_>> = table
                    .rows
                    .iter()
                    .map(|row| Subject::Row {
                        columns: &table.columns,
                        values: row,
                    })
                    .collect();
                let selected = select(find, subjects)?;
                table_rows(find, table, &selected)
            }
            _ => Err(no_such_table(schema, name)),
        }
    }

    pub(crate) fn insert(&mut self, insert: &Insert) -> Result<Reply, ServerError> {
        let (schema, name) = target(&insert.collection)?;
        let is_collection = self.schema(schema)?.collections.contains_key(name);
        if is_collection {
            self.insert_documents(schema, name, insert)
        } else {
            self.insert_rows(schema, name, insert)
        }
    }

    fn insert_documents(
        &mut self,
        schema: &str,
        name: &str,
        insert: &Insert,
    ) -> Result<Reply, ServerError> {
        let empty = DbDoc::new();
        let eval = Evaluator::new(&insert.args);
        let mut incoming = Vec::with_capacity(insert.rows.len());
        for row in &insert.rows {
            let expr = match row.as_slice() {
                [expr] => expr,
                _ => {
                    return Err(error(
                        ER_X_DOC_REQUIRED_FIELD_MISSING,
                        "Document insert expects exactly one value per row",
                    ));
                }
            };
            match eval.eval(expr, Subject::Document(&empty))? {
                Value::Document(doc) => incoming.push(doc),
                other => {
                    return Err(error(
                        ER_X_DOC_REQUIRED_FIELD_MISSING,
                        format!("Invalid data for insert: expected a document, got {}", other.type_name()),
                    ));
                }
            }
        }

        let mut generated = Vec::new();
        for doc in &mut incoming {
            if doc.id().is_none_or(Value::is_null) {
                let id = self.generate_id();
                doc.set(ID_FIELD, id.as_str());
                generated.push(id);
            }
        }

        let schema_name = schema.to_string();
        let collection_name = name.to_string();
        let docs = self
            .schema_mut(schema)?
            .collections
            .get_mut(name)
            .ok_or_else(|| no_such_table(&schema_name, &collection_name))?;
        let mut staged = docs.clone();
        let mut affected = 0u64;
        for doc in incoming {
            let id = doc.id().cloned().unwrap_or_default();
            match staged.iter().position(|d| d.id() == Some(&id)) {
                Some(existing) if insert.upsert => {
                    staged[existing] = doc;
                    affected += 2;
                }
                Some(_) => {
                    return Err(error(
                        ER_X_DOC_ID_DUPLICATE,
                        format!(
                            "Document contains a field value that is not unique but required to be: {id}"
                        ),
                    ));
                }
                None => {
                    staged.push(doc);
                    affected += 1;
                }
            }
        }
        *docs = staged;

        Ok(Reply {
            generated_ids: generated,
            ..Reply::affected(affected)
        })
    }

    fn insert_rows(&mut self, schema: &str, name: &str, insert: &Insert) -> Result<Reply, ServerError> {
        let table = self
            .schema_mut(schema)?
            .tables
            .get_mut(name)
            .filter(|t| !t.view)
            .ok_or_else(|| no_such_table(schema, name))?;

        let indexes: Vec<usize> = if insert.projection.is_empty() {
            (0..table.columns.len()).collect()
        } else {
            insert
                .projection
                .iter()
                .map(|column| table.column_index(column))
                .collect::<Result<_, _>>()?
        };

        let eval = Evaluator::new(&insert.args);
        let auto = table.auto_increment_index();
        let mut next_auto = table.next_auto_increment;
        let mut first_generated = None;
        let mut staged = Vec::with_capacity(insert.rows.len());

        for (n, row) in insert.rows.iter().enumerate() {
            if row.len() != indexes.len() {
                return Err(error(
                    ER_WRONG_VALUE_COUNT_ON_ROW,
                    format!("Column count doesn't match value count at row {}", n + 1),
                ));
            }
            let mut values = vec![Value::Null; table.columns.len()];
            {
                let subject = Subject::Row {
                    columns: &table.columns,
                    values: &[],
                };
                for (&index, expr) in indexes.iter().zip(row) {
                    values[index] = eval.eval(expr, subject)?;
                }
            }
            if let Some(i) = auto {
                match values[i].as_u64() {
                    Some(v) => next_auto = next_auto.max(v + 1),
                    None => {
                        values[i] = Value::Int(next_auto as i64);
                        first_generated.get_or_insert(next_auto);
                        next_auto += 1;
                    }
                }
            }
            for (i, value) in values.iter().enumerate() {
                table.check_value(i, value)?;
            }
            staged.push(values);
        }

        let affected = staged.len() as u64;
        table.rows.extend(staged);
        table.next_auto_increment = next_auto;
        Ok(Reply {
            last_insert_id: first_generated,
            ..Reply::affected(affected)
        })
    }

    pub(crate) fn update(&mut self, update: &Update) -> Result<Reply, ServerError> {
        let (schema, name) = target(&update.collection)?;
        let data = self.schema_mut(schema)?;
        if let Some(docs) = data.collections.get_mut(name) {
            return update_documents(docs, update);
        }
        match data.tables.get_mut(name) {
            Some(table) if !table.view => update_rows(table, update),
            _ => Err(no_such_table(schema, name)),
        }
    }

    pub(crate) fn delete(&mut self, delete: &Delete) -> Result<Reply, ServerError> {
        let (schema, name) = target(&delete.collection)?;
        let data = self.schema_mut(schema)?;
        let eval = Evaluator::new(&delete.args);

        if let Some(docs) = data.collections.get_mut(name) {
            let doomed = {
                let subjects: Vec<Subject<'_>> = docs.iter().map(Subject::Document).collect();
                targets(&eval, &subjects, delete.criteria.as_ref(), &delete.order, delete.limit)?
            };
            let affected = doomed.len() as u64;
            let mut index = 0;
            docs.retain(|_| {
                let keep = !doomed.contains(&index);
                index += 1;
                keep
            });
            return Ok(Reply::affected(affected));
        }

        match data.tables.get_mut(name) {
            Some(table) if !table.view => {
                let doomed = {
                    let subjects: Vec<Subject<'_>> = table
                        .rows
                        .iter()
                        .map(|row| Subject::Row {
                            columns: &table.columns,
                            values: row,
                        })
                        .collect();
                    targets(&eval, &subjects, delete.criteria.as_ref(), &delete.order, delete.limit)?
                };
                let affected = doomed.len() as u64;
                let mut index = 0;
                table.rows.retain(|_| {
                    let keep = !doomed.contains(&index);
                    index += 1;
                    keep
                });
                Ok(Reply::affected(affected))
            }
            _ => Err(no_such_table(schema, name)),
        }
    }
}

fn no_such_table(schema: &str, name: &str) -> ServerError {
    error(
        ER_NO_SUCH_TABLE,
        format!("Table '{schema}.{name}' doesn't exist"),
    )
}

fn target(collection: &Collection) -> Result<(&str, &str), ServerError> {
    let schema = collection
        .schema
        .as_deref()
        .ok_or_else(|| error(ER_NO_DB_ERROR, "No database selected"))?;
    Ok((schema, collection.name.as_str()))
}

/// One output unit of a find: a subject, or a group led by its first member.
struct Selected<'d> {
    head: Subject<'d>,
    group: Vec<Subject<'d>>,
}

fn sort_keys(
    eval: &Evaluator<'_>,
    order: &[Order],
    head: Subject<'_>,
) -> Result<Vec<Value>, ServerError> {
    order.iter().map(|o| eval.eval(&o.expr, head)).collect()
}

fn order_by_keys(order: &[Order], a: &[Value], b: &[Value]) -> std::cmp::Ordering {
    for ((o, x), y) in order.iter().zip(a).zip(b) {
        // NULL sorts first ascending.
        let ord = match (x.is_null(), y.is_null()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            (false, false) => compare(x, y).unwrap_or(std::cmp::Ordering::Equal),
        };
        let ord = match o.direction {
            OrderDirection::Asc => ord,
            OrderDirection::Desc => ord.reverse(),
        };
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}

fn apply_limit<T>(items: Vec<T>, limit: Option<Limit>) -> Vec<T> {
    match limit {
        None => items,
        Some(limit) => {
            let offset = usize::try_from(limit.offset.unwrap_or(0)).unwrap_or(usize::MAX);
            let count = usize::try_from(limit.row_count).unwrap_or(usize::MAX);
            items.into_iter().skip(offset).take(count).collect()
        }
    }
}

/// Indexes of the subjects an update or delete applies to.
fn targets(
    eval: &Evaluator<'_>,
    subjects: &[Subject<'_>],
    criteria: Option<&Expr>,
    order: &[Order],
    limit: Option<Limit>,
) -> Result<Vec<usize>, ServerError> {
    let mut hits = Vec::new();
    for (index, subject) in subjects.iter().enumerate() {
        if eval.matches(criteria, *subject)? {
            hits.push((index, sort_keys(eval, order, *subject)?));
        }
    }
    hits.sort_by(|(_, a), (_, b)| order_by_keys(order, a, b));
    let limit = limit.map(|l| Limit { offset: None, ..l });
    Ok(apply_limit(hits, limit).into_iter().map(|(i, _)| i).collect())
}

fn select<'d>(find: &Find, subjects: Vec<Subject<'d>>) -> Result<Vec<Selected<'d>>, ServerError> {
    let eval = Evaluator::new(&find.args);
    let mut kept = Vec::new();
    for subject in subjects {
        if eval.matches(find.criteria.as_ref(), subject)? {
            kept.push(subject);
        }
    }

    let aggregated = !find.grouping.is_empty()
        || find.projection.iter().any(|p| has_aggregate(&p.source));

    let mut selected: Vec<Selected<'d>> = if aggregated {
        let mut groups: Vec<(Vec<Value>, Vec<Subject<'d>>)> = Vec::new();
        for subject in kept {
            let key = find
                .grouping
                .iter()
                .map(|g| eval.eval(g, subject))
                .collect::<Result<Vec<_>, _>>()?;
            let slot = groups.iter_mut().find(|(k, _)| {
                k.len() == key.len()
                    && k.iter()
                        .zip(&key)
                        .all(|(a, b)| a == b || equals(a, b).unwrap_or(false))
            });
            match slot {
                Some((_, members)) => members.push(subject),
                None => groups.push((key, vec![subject])),
            }
        }
        let mut out = Vec::with_capacity(groups.len());
        for (_, members) in groups {
            let head = members[0];
            let passes = eval
                .with_group(&members)
                .matches(find.grouping_criteria.as_ref(), head)?;
            if passes {
                out.push(Selected {
                    head,
                    group: members,
                });
            }
        }
        out
    } else {
        kept.into_iter()
            .map(|head| Selected {
                head,
                group: Vec::new(),
            })
            .collect()
    };

    if !find.order.is_empty() {
        let mut keyed = Vec::with_capacity(selected.len());
        for item in selected {
            let keys = sort_keys(&eval.with_group(&item.group), &find.order, item.head)?;
            keyed.push((keys, item));
        }
        keyed.sort_by(|(a, _), (b, _)| order_by_keys(&find.order, a, b));
        selected = keyed.into_iter().map(|(_, item)| item).collect();
    }

    Ok(apply_limit(selected, find.limit))
}

/// Output name of a projection.
fn projection_name(projection: &Projection, index: usize) -> String {
    if let Some(alias) = &projection.alias {
        return alias.clone();
    }
    match &projection.source {
        Expr::Ident(id) => match (id.document_path.last(), &id.name) {
            (Some(DocumentPathItem::Member(member)), _) => member.clone(),
            (_, Some(name)) => name.clone(),
            _ => format!("expr{index}"),
        },
        _ => format!("expr{index}"),
    }
}

fn project(
    find: &Find,
    item: &Selected<'_>,
) -> Result<Vec<Value>, ServerError> {
    let eval = Evaluator::new(&find.args).with_group(&item.group);
    find.projection
        .iter()
        .map(|p| eval.eval(&p.source, item.head))
        .collect()
}

fn document_result(find: &Find, selected: &[Selected<'_>]) -> Result<Reply, ServerError> {
    let mut rows = Vec::with_capacity(selected.len());
    for item in selected {
        let doc = if find.projection.is_empty() {
            match item.head {
                Subject::Document(doc) => doc.clone(),
                Subject::Row { .. } => DbDoc::new(),
            }
        } else {
            project(find, item)?
                .into_iter()
                .enumerate()
                .map(|(i, value)| (projection_name(&find.projection[i], i), value))
                .collect()
        };
        rows.push(vec![Value::Document(doc)]);
    }
    let column =
        ColumnMetaData::new(ColumnType::Bytes, "doc").with_content_type(ContentType::Json);
    Ok(Reply::rows(MockResultSet {
        columns: vec![column],
        rows,
    }))
}

/// A collection read through the relational API: `doc` and `_id` columns.
fn collection_rows(find: &Find, selected: &[Selected<'_>]) -> Result<Reply, ServerError> {
    if !find.projection.is_empty() {
        return projected_rows(find, selected, None);
    }
    let rows = selected
        .iter()
        .filter_map(|item| match item.head {
            Subject::Document(doc) => Some(vec![
                Value::Document(doc.clone()),
                doc.id().cloned().unwrap_or_default(),
            ]),
            Subject::Row { .. } => None,
        })
        .collect();
    let columns = vec![
        ColumnMetaData::new(ColumnType::Bytes, "doc").with_content_type(ContentType::Json),
        ColumnMetaData {
            collation: UTF8MB4_COLLATION,
            ..ColumnMetaData::new(ColumnType::Bytes, ID_FIELD)
        },
    ];
    Ok(Reply::rows(MockResultSet { columns, rows }))
}

fn table_rows(find: &Find, table: &MockTable, selected: &[Selected<'_>]) -> Result<Reply, ServerError> {
    if !find.projection.is_empty() {
        return projected_rows(find, selected, Some(table));
    }
    let rows = selected
        .iter()
        .filter_map(|item| match item.head {
            Subject::Row { values, .. } => Some(values.to_vec()),
            Subject::Document(_) => None,
        })
        .collect();
    Ok(Reply::rows(MockResultSet {
        columns: table.columns.clone(),
        rows,
    }))
}

fn projected_rows(
    find: &Find,
    selected: &[Selected<'_>],
    table: Option<&MockTable>,
) -> Result<Reply, ServerError> {
    let rows = selected
        .iter()
        .map(|item| project(find, item))
        .collect::<Result<Vec<_>, _>>()?;

    let columns = find
        .projection
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let name = projection_name(p, i);
            let declared = match (&p.source, table) {
                (Expr::Ident(id), Some(table)) if id.document_path.is_empty() => id
                    .name
                    .as_deref()
                    .and_then(|n| table.column_index(n).ok())
                    .map(|index| table.columns[index].clone()),
                _ => None,
            };
            match declared {
                Some(meta) => ColumnMetaData { name, ..meta },
                None => {
                    let sample = rows
                        .iter()
                        .filter_map(|row| row.get(i))
                        .find(|v| !v.is_null())
                        .cloned()
                        .unwrap_or_default();
                    infer_column(name, &sample)
                }
            }
        })
        .collect();
    Ok(Reply::rows(MockResultSet { columns, rows }))
}

fn update_documents(docs: &mut Vec<DbDoc>, update: &Update) -> Result<Reply, ServerError> {
    let eval = Evaluator::new(&update.args);
    let chosen = {
        let subjects: Vec<Subject<'_>> = docs.iter().map(Subject::Document).collect();
        targets(&eval, &subjects, update.criteria.as_ref(), &update.order, update.limit)?
    };

    let mut staged = docs.clone();
    let mut affected = 0u64;
    for &index in &chosen {
        let original = &docs[index];
        let mut root = Value::Document(original.clone());
        for op in &update.operations {
            let value = match &op.value {
                Some(expr) => Some(eval.eval(expr, Subject::Document(original))?),
                None => None,
            };
            apply_document_op(&mut root, op, value)?;
        }
        let Value::Document(changed) = root else {
            return Err(error(ER_X_BAD_UPDATE_DATA, "Update replaced the document"));
        };
        if changed != *original {
            affected += 1;
        }
        staged[index] = changed;
    }
    *docs = staged;

    Ok(Reply {
        rows_matched: Some(chosen.len() as u64),
        ..Reply::affected(affected)
    })
}

fn update_rows(table: &mut MockTable, update: &Update) -> Result<Reply, ServerError> {
    let eval = Evaluator::new(&update.args);
    let chosen = {
        let subjects: Vec<Subject<'_>> = table
            .rows
            .iter()
            .map(|row| Subject::Row {
                columns: &table.columns,
                values: row,
            })
            .collect();
        targets(&eval, &subjects, update.criteria.as_ref(), &update.order, update.limit)?
    };

    let mut staged = table.rows.clone();
    let mut affected = 0u64;
    for &index in &chosen {
        let original = &table.rows[index];
        let subject = Subject::Row {
            columns: &table.columns,
            values: original,
        };
        let mut row = original.clone();
        for op in &update.operations {
            let column_name = op.source.name.as_deref().ok_or_else(|| {
                error(ER_X_BAD_UPDATE_DATA, "Table update needs a column name")
            })?;
            let column = table.column_index(column_name)?;
            let value = match &op.value {
                Some(expr) => Some(eval.eval(expr, subject)?),
                None => None,
            };
            match op.operation {
                UpdateType::Set if op.source.document_path.is_empty() => {
                    row[column] = value.unwrap_or_default();
                }
                UpdateType::Set => {
                    return Err(error(
                        ER_X_BAD_UPDATE_DATA,
                        "Invalid update: SET with a document path",
                    ));
                }
                kind => apply_path_op(
                    &mut row[column],
                    kind,
                    &op.source.document_path,
                    value,
                )?,
            }
            table.check_value(column, &row[column])?;
        }
        if row != *original {
            affected += 1;
        }
        staged[index] = row;
    }
    table.rows = staged;

    Ok(Reply {
        rows_matched: Some(chosen.len() as u64),
        ..Reply::affected(affected)
    })
}

fn is_id_path(path: &[DocumentPathItem]) -> bool {
    matches!(path.first(), Some(DocumentPathItem::Member(name)) if name == ID_FIELD)
}

fn forbidden_id() -> ServerError {
    error(
        ER_X_BAD_MEMBER_TO_UPDATE,
        "Forbidden update operation on '$._id' member",
    )
}

fn apply_document_op(
    root: &mut Value,
    op: &UpdateOperation,
    value: Option<Value>,
) -> Result<(), ServerError> {
    let path = &op.source.document_path;
    if op.source.name.is_some() && op.source.name.as_deref() != Some("doc") {
        return Err(error(
            ER_X_BAD_UPDATE_DATA,
            "Invalid column name to update",
        ));
    }
    if op.operation == UpdateType::Set {
        return Err(error(
            ER_X_BAD_UPDATE_DATA,
            "Invalid type of update operation for document",
        ));
    }
    if is_id_path(path) {
        return Err(forbidden_id());
    }

    let id = root.get(ID_FIELD).cloned();
    apply_path_op(root, op.operation, path, value)?;
    // Replacing or patching the root must not change `_id`.
    let after = root.get(ID_FIELD).cloned();
    if after != id {
        match (&id, root) {
            (Some(id), Value::Document(doc)) if after.is_none() => {
                doc.set(ID_FIELD, id.clone());
            }
            _ => return Err(forbidden_id()),
        }
    }
    Ok(())
}

fn child_mut<'v>(value: &'v mut Value, item: &DocumentPathItem) -> Option<&'v mut Value> {
    match (item, value) {
        (DocumentPathItem::Member(key), Value::Document(doc)) => doc.get_mut(key),
        (DocumentPathItem::ArrayIndex(i), Value::Array(items)) => items.get_mut(*i as usize),
        _ => None,
    }
}

fn at_path_mut<'v>(root: &'v mut Value, path: &[DocumentPathItem]) -> Option<&'v mut Value> {
    let mut current = root;
    for item in path {
        current = child_mut(current, item)?;
    }
    Some(current)
}

fn bad_path() -> ServerError {
    error(
        ER_X_BAD_UPDATE_DATA,
        "Invalid document path for update operation",
    )
}

/// Apply one path operation. Wildcards are not allowed.
fn apply_path_op(
    root: &mut Value,
    kind: UpdateType,
    path: &[DocumentPathItem],
    value: Option<Value>,
) -> Result<(), ServerError> {
    if path.iter().any(|item| {
        !matches!(
            item,
            DocumentPathItem::Member(_) | DocumentPathItem::ArrayIndex(_)
        )
    }) {
        return Err(bad_path());
    }
    let value = value.unwrap_or_default();

    match kind {
        UpdateType::ItemSet | UpdateType::ItemReplace => {
            let Some((last, parent_path)) = path.split_last() else {
                if kind == UpdateType::ItemSet && !matches!(value, Value::Document(_)) {
                    return Err(error(
                        ER_X_BAD_UPDATE_DATA,
                        "Replacement for the root must be a document",
                    ));
                }
                *root = value;
                return Ok(());
            };
            let Some(parent) = at_path_mut(root, parent_path) else {
                return Ok(());
            };
            match (last, parent) {
                (DocumentPathItem::Member(key), Value::Document(doc)) => {
                    if kind == UpdateType::ItemSet || doc.contains_key(key) {
                        doc.set(key.clone(), value);
                    }
                }
                (DocumentPathItem::ArrayIndex(i), Value::Array(items)) => {
                    let i = *i as usize;
                    if i < items.len() {
                        items[i] = value;
                    } else if kind == UpdateType::ItemSet {
                        items.push(value);
                    }
                }
                _ => {}
            }
        }
        UpdateType::ItemRemove => {
            let Some((last, parent_path)) = path.split_last() else {
                return Err(bad_path());
            };
            match (last, at_path_mut(root, parent_path)) {
                (DocumentPathItem::Member(key), Some(Value::Document(doc))) => {
                    doc.remove(key);
                }
                (DocumentPathItem::ArrayIndex(i), Some(Value::Array(items))) => {
                    let i = *i as usize;
                    if i < items.len() {
                        items.remove(i);
                    }
                }
                _ => {}
            }
        }
        UpdateType::ItemMerge => {
            if let (Some(Value::Document(target)), Value::Document(source)) =
                (at_path_mut(root, path), value)
            {
                for (key, v) in source {
                    target.set(key, v);
                }
            }
        }
        UpdateType::ArrayInsert => {
            let Some((DocumentPathItem::ArrayIndex(i), parent_path)) = path.split_last() else {
                return Err(error(
                    ER_X_BAD_UPDATE_DATA,
                    "A path to an array element is required for array insert",
                ));
            };
            match at_path_mut(root, parent_path) {
                Some(Value::Array(items)) => {
                    let i = (*i as usize).min(items.len());
                    items.insert(i, value);
                }
                Some(_) => {
                    return Err(error(
                        ER_X_BAD_UPDATE_DATA,
                        "Array insert on a non-array member",
                    ));
                }
                None => {}
            }
        }
        UpdateType::ArrayAppend => {
            if let Some(target) = at_path_mut(root, path) {
                match target {
                    Value::Array(items) => items.push(value),
                    other => {
                        let old = std::mem::take(other);
                        *other = Value::Array(vec![old, value]);
                    }
                }
            }
        }
        UpdateType::MergePatch => {
            if let Some(target) = at_path_mut(root, path) {
                merge_patch(target, value);
            }
        }
        UpdateType::Set => return Err(bad_path()),
    }
    Ok(())
}

/// JSON merge patch: objects merge recursively, NULL removes a key,
/// anything else replaces.
fn merge_patch(target: &mut Value, patch: Value) {
    let Value::Document(patch) = patch else {
        *target = patch;
        return;
    };
    if !matches!(target, Value::Document(_)) {
        *target = Value::Document(DbDoc::new());
    }
    let Value::Document(doc) = target else {
        return;
    };
    for (key, value) in patch {
        if value.is_null() {
            doc.remove(&key);
            continue;
        }
        match doc.get_mut(&key) {
            Some(existing) => merge_patch(existing, value),
            None => {
                let mut fresh = Value::Null;
                merge_patch(&mut fresh, value);
                doc.set(key, fresh);
            }
        }
    }
}
