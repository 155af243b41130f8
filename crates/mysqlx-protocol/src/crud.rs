//! CRUD request messages.
//!
//! The same four messages serve collections (document model) and tables
//! (relational model); `DataModel` says which one the server should assume.

use bytes::{Buf, BufMut, Bytes};

use crate::codec::{
    Field, read_field, required, write_bool_field, write_message_field, write_string_field,
    write_uint_field,
};
use crate::error::ProtocolError;
use crate::expr::{ColumnIdentifier, Expr};
use crate::scalar::Scalar;

fn decode_expr(field: Field) -> Result<Expr, ProtocolError> {
    Expr::decode(&mut field.into_bytes()?)
}

fn decode_scalar(field: Field) -> Result<Scalar, ProtocolError> {
    Scalar::decode(&mut field.into_bytes()?)
}

fn write_expr(dst: &mut impl BufMut, number: u32, expr: &Expr) {
    write_message_field(dst, number, |b| expr.encode(b));
}

fn write_args(dst: &mut impl BufMut, number: u32, args: &[Scalar]) {
    for a in args {
        write_message_field(dst, number, |b| a.encode(b));
    }
}

fn write_order(dst: &mut impl BufMut, number: u32, order: &[Order]) {
    for o in order {
        write_message_field(dst, number, |b| o.encode(b));
    }
}

/// Target of a CRUD request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Collection {
    /// Collection or table name.
    pub name: String,
    /// Schema name; `None` uses the session default.
    pub schema: Option<String>,
}

impl Collection {
    /// Create a target.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: Some(schema.into()),
        }
    }

    fn encode(&self, dst: &mut impl BufMut) {
        write_string_field(dst, 1, &self.name);
        if let Some(schema) = &self.schema {
            write_string_field(dst, 2, schema);
        }
    }

    fn decode(mut src: Bytes) -> Result<Self, ProtocolError> {
        let mut name = None;
        let mut schema = None;
        while src.has_remaining() {
            let field = read_field(&mut src)?;
            match field.number {
                1 => name = Some(field.into_string("collection name")?),
                2 => schema = Some(field.into_string("collection schema")?),
                _ => {}
            }
        }
        Ok(Self {
            name: required(name, "Collection.name")?,
            schema,
        })
    }
}

/// Whether a request addresses documents or rows.
///
/// Requests that leave it out address documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataModel {
    /// Collection of JSON documents.
    Document = 1,
    /// Relational table.
    Table = 2,
}

impl DataModel {
    fn decode(field: &Field) -> Result<Self, ProtocolError> {
        match field.as_u32()? {
            1 => Ok(Self::Document),
            2 => Ok(Self::Table),
            other => Err(ProtocolError::InvalidTag {
                field: "data model",
                value: other,
            }),
        }
    }
}

/// A projected expression with an optional alias.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// Expression.
    pub source: Expr,
    /// Output name.
    pub alias: Option<String>,
}

impl Projection {
    fn encode(&self, dst: &mut impl BufMut) {
        write_expr(dst, 1, &self.source);
        if let Some(alias) = &self.alias {
            write_string_field(dst, 2, alias);
        }
    }

    fn decode(mut src: Bytes) -> Result<Self, ProtocolError> {
        let mut source = None;
        let mut alias = None;
        while src.has_remaining() {
            let field = read_field(&mut src)?;
            match field.number {
                1 => source = Some(decode_expr(field)?),
                2 => alias = Some(field.into_string("projection alias")?),
                _ => {}
            }
        }
        Ok(Self {
            source: required(source, "Projection.source")?,
            alias,
        })
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum OrderDirection {
    /// Ascending.
    #[default]
    Asc = 1,
    /// Descending.
    Desc = 2,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    /// Sort expression.
    pub expr: Expr,
    /// Direction.
    pub direction: OrderDirection,
}

impl Order {
    fn encode(&self, dst: &mut impl BufMut) {
        write_expr(dst, 1, &self.expr);
        write_uint_field(dst, 2, self.direction as u64);
    }

    fn decode(mut src: Bytes) -> Result<Self, ProtocolError> {
        let mut expr = None;
        let mut direction = OrderDirection::Asc;
        while src.has_remaining() {
            let field = read_field(&mut src)?;
            match field.number {
                1 => expr = Some(decode_expr(field)?),
                2 => {
                    direction = match field.as_u32()? {
                        1 => OrderDirection::Asc,
                        2 => OrderDirection::Desc,
                        other => {
                            return Err(ProtocolError::InvalidTag {
                                field: "order direction",
                                value: other,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(Self {
            expr: required(expr, "Order.expr")?,
            direction,
        })
    }
}

/// Row count and offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Limit {
    /// Maximum number of rows.
    pub row_count: u64,
    /// Rows to skip first.
    pub offset: Option<u64>,
}

impl Limit {
    fn encode(&self, dst: &mut impl BufMut) {
        write_uint_field(dst, 1, self.row_count);
        if let Some(offset) = self.offset {
            write_uint_field(dst, 2, offset);
        }
    }

    fn decode(mut src: Bytes) -> Result<Self, ProtocolError> {
        let mut row_count = None;
        let mut offset = None;
        while src.has_remaining() {
            let field = read_field(&mut src)?;
            match field.number {
                1 => row_count = Some(field.as_u64()?),
                2 => offset = Some(field.as_u64()?),
                _ => {}
            }
        }
        Ok(Self {
            row_count: required(row_count, "Limit.row_count")?,
            offset,
        })
    }
}

/// Read documents or rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Find {
    /// Target.
    pub collection: Collection,
    /// Document or table.
    pub data_model: DataModel,
    /// Projected fields; empty returns whole documents or all columns.
    pub projection: Vec<Projection>,
    /// Filter.
    pub criteria: Option<Expr>,
    /// Placeholder values.
    pub args: Vec<Scalar>,
    /// Sort keys.
    pub order: Vec<Order>,
    /// Group-by expressions.
    pub grouping: Vec<Expr>,
    /// Having filter.
    pub grouping_criteria: Option<Expr>,
    /// Limit and offset.
    pub limit: Option<Limit>,
}

impl Find {
    /// Encode as a `Mysqlx.Crud.Find` body.
    pub fn encode(&self, dst: &mut impl BufMut) {
        write_message_field(dst, 2, |b| self.collection.encode(b));
        write_uint_field(dst, 3, self.data_model as u64);
        for p in &self.projection {
            write_message_field(dst, 4, |b| p.encode(b));
        }
        if let Some(criteria) = &self.criteria {
            write_expr(dst, 5, criteria);
        }
        if let Some(limit) = &self.limit {
            write_message_field(dst, 6, |b| limit.encode(b));
        }
        write_order(dst, 7, &self.order);
        for g in &self.grouping {
            write_expr(dst, 8, g);
        }
        if let Some(having) = &self.grouping_criteria {
            write_expr(dst, 9, having);
        }
        write_args(dst, 11, &self.args);
    }

    /// Decode a `Mysqlx.Crud.Find` body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut collection = None;
        let mut find = Self {
            collection: Collection {
                name: String::new(),
                schema: None,
            },
            data_model: DataModel::Document,
            projection: Vec::new(),
            criteria: None,
            args: Vec::new(),
            order: Vec::new(),
            grouping: Vec::new(),
            grouping_criteria: None,
            limit: None,
        };
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                2 => collection = Some(Collection::decode(field.into_bytes()?)?),
                3 => find.data_model = DataModel::decode(&field)?,
                4 => find.projection.push(Projection::decode(field.into_bytes()?)?),
                5 => find.criteria = Some(decode_expr(field)?),
                6 => find.limit = Some(Limit::decode(field.into_bytes()?)?),
                7 => find.order.push(Order::decode(field.into_bytes()?)?),
                8 => find.grouping.push(decode_expr(field)?),
                9 => find.grouping_criteria = Some(decode_expr(field)?),
                11 => find.args.push(decode_scalar(field)?),
                _ => {}
            }
        }
        find.collection = required(collection, "Find.collection")?;
        Ok(find)
    }
}

/// Insert documents or rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    /// Target.
    pub collection: Collection,
    /// Document or table.
    pub data_model: DataModel,
    /// Column names (table model only).
    pub projection: Vec<String>,
    /// Rows; a document insert has one `Expr` per row.
    pub rows: Vec<Vec<Expr>>,
    /// Placeholder values.
    pub args: Vec<Scalar>,
    /// Replace documents whose `_id` already exists.
    pub upsert: bool,
}

impl Insert {
    /// Encode as a `Mysqlx.Crud.Insert` body.
    pub fn encode(&self, dst: &mut impl BufMut) {
        write_message_field(dst, 1, |b| self.collection.encode(b));
        write_uint_field(dst, 2, self.data_model as u64);
        for column in &self.projection {
            write_message_field(dst, 3, |b| write_string_field(b, 1, column));
        }
        for row in &self.rows {
            write_message_field(dst, 4, |b| {
                for e in row {
                    write_expr(b, 1, e);
                }
            });
        }
        write_args(dst, 5, &self.args);
        if self.upsert {
            write_bool_field(dst, 6, true);
        }
    }

    /// Decode a `Mysqlx.Crud.Insert` body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut collection = None;
        let mut data_model = DataModel::Document;
        let mut projection = Vec::new();
        let mut rows = Vec::new();
        let mut args = Vec::new();
        let mut upsert = false;
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                1 => collection = Some(Collection::decode(field.into_bytes()?)?),
                2 => data_model = DataModel::decode(&field)?,
                3 => projection.push(decode_column_name(field.into_bytes()?)?),
                4 => rows.push(decode_typed_row(field.into_bytes()?)?),
                5 => args.push(decode_scalar(field)?),
                6 => upsert = field.as_bool()?,
                _ => {}
            }
        }
        Ok(Self {
            collection: required(collection, "Insert.collection")?,
            data_model,
            projection,
            rows,
            args,
            upsert,
        })
    }
}

// Only the `name` of a `Mysqlx.Crud.Column` is used for inserts.
fn decode_column_name(mut src: Bytes) -> Result<String, ProtocolError> {
    let mut name = String::new();
    while src.has_remaining() {
        let field = read_field(&mut src)?;
        if field.number == 1 {
            name = field.into_string("insert column")?;
        }
    }
    Ok(name)
}

fn decode_typed_row(mut src: Bytes) -> Result<Vec<Expr>, ProtocolError> {
    let mut row = Vec::new();
    while src.has_remaining() {
        let field = read_field(&mut src)?;
        if field.number == 1 {
            row.push(decode_expr(field)?);
        }
    }
    Ok(row)
}

/// Kind of update operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UpdateType {
    /// Set a column (table model).
    Set = 1,
    /// Remove a document member.
    ItemRemove = 2,
    /// Set a document member, creating it if needed.
    ItemSet = 3,
    /// Replace a document member only if it exists.
    ItemReplace = 4,
    /// Merge an object into the document.
    ItemMerge = 5,
    /// Insert into an array at a position.
    ArrayInsert = 6,
    /// Append to an array.
    ArrayAppend = 7,
    /// Apply a JSON merge patch.
    MergePatch = 8,
}

impl UpdateType {
    /// Create an update type from a raw value.
    pub fn from_u32(value: u32) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(Self::Set),
            2 => Ok(Self::ItemRemove),
            3 => Ok(Self::ItemSet),
            4 => Ok(Self::ItemReplace),
            5 => Ok(Self::ItemMerge),
            6 => Ok(Self::ArrayInsert),
            7 => Ok(Self::ArrayAppend),
            8 => Ok(Self::MergePatch),
            _ => Err(ProtocolError::InvalidTag {
                field: "update type",
                value,
            }),
        }
    }
}

/// One update operation.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOperation {
    /// Column or document path to change.
    pub source: ColumnIdentifier,
    /// Operation.
    pub operation: UpdateType,
    /// New value, absent for removals.
    pub value: Option<Expr>,
}

impl UpdateOperation {
    fn encode(&self, dst: &mut impl BufMut) {
        write_message_field(dst, 1, |b| self.source.encode(b));
        write_uint_field(dst, 2, self.operation as u64);
        if let Some(value) = &self.value {
            write_expr(dst, 3, value);
        }
    }

    fn decode(mut src: Bytes) -> Result<Self, ProtocolError> {
        let mut source = None;
        let mut operation = None;
        let mut value = None;
        while src.has_remaining() {
            let field = read_field(&mut src)?;
            match field.number {
                1 => source = Some(ColumnIdentifier::decode(&mut field.into_bytes()?)?),
                2 => operation = Some(UpdateType::from_u32(field.as_u32()?)?),
                3 => value = Some(decode_expr(field)?),
                _ => {}
            }
        }
        Ok(Self {
            source: required(source, "UpdateOperation.source")?,
            operation: required(operation, "UpdateOperation.operation")?,
            value,
        })
    }
}

/// Update documents or rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Target.
    pub collection: Collection,
    /// Document or table.
    pub data_model: DataModel,
    /// Filter.
    pub criteria: Option<Expr>,
    /// Placeholder values.
    pub args: Vec<Scalar>,
    /// Sort keys.
    pub order: Vec<Order>,
    /// Limit.
    pub limit: Option<Limit>,
    /// Operations, applied in order.
    pub operations: Vec<UpdateOperation>,
}

impl Update {
    /// Encode as a `Mysqlx.Crud.Update` body.
    pub fn encode(&self, dst: &mut impl BufMut) {
        write_message_field(dst, 2, |b| self.collection.encode(b));
        write_uint_field(dst, 3, self.data_model as u64);
        if let Some(criteria) = &self.criteria {
            write_expr(dst, 4, criteria);
        }
        if let Some(limit) = &self.limit {
            write_message_field(dst, 5, |b| limit.encode(b));
        }
        write_order(dst, 6, &self.order);
        for op in &self.operations {
            write_message_field(dst, 7, |b| op.encode(b));
        }
        write_args(dst, 8, &self.args);
    }

    /// Decode a `Mysqlx.Crud.Update` body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut collection = None;
        let mut data_model = DataModel::Document;
        let mut criteria = None;
        let mut args = Vec::new();
        let mut order = Vec::new();
        let mut limit = None;
        let mut operations = Vec::new();
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                2 => collection = Some(Collection::decode(field.into_bytes()?)?),
                3 => data_model = DataModel::decode(&field)?,
                4 => criteria = Some(decode_expr(field)?),
                5 => limit = Some(Limit::decode(field.into_bytes()?)?),
                6 => order.push(Order::decode(field.into_bytes()?)?),
                7 => operations.push(UpdateOperation::decode(field.into_bytes()?)?),
                8 => args.push(decode_scalar(field)?),
                _ => {}
            }
        }
        Ok(Self {
            collection: required(collection, "Update.collection")?,
            data_model,
            criteria,
            args,
            order,
            limit,
            operations,
        })
    }
}

/// Delete documents or rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    /// Target.
    pub collection: Collection,
    /// Document or table.
    pub data_model: DataModel,
    /// Filter.
    pub criteria: Option<Expr>,
    /// Placeholder values.
    pub args: Vec<Scalar>,
    /// Sort keys.
    pub order: Vec<Order>,
    /// Limit.
    pub limit: Option<Limit>,
}

impl Delete {
    /// Encode as a `Mysqlx.Crud.Delete` body.
    pub fn encode(&self, dst: &mut impl BufMut) {
        write_message_field(dst, 1, |b| self.collection.encode(b));
        write_uint_field(dst, 2, self.data_model as u64);
        if let Some(criteria) = &self.criteria {
            write_expr(dst, 3, criteria);
        }
        if let Some(limit) = &self.limit {
            write_message_field(dst, 4, |b| limit.encode(b));
        }
        write_order(dst, 5, &self.order);
        write_args(dst, 6, &self.args);
    }

    /// Decode a `Mysqlx.Crud.Delete` body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut collection = None;
        let mut data_model = DataModel::Document;
        let mut criteria = None;
        let mut args = Vec::new();
        let mut order = Vec::new();
        let mut limit = None;
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                1 => collection = Some(Collection::decode(field.into_bytes()?)?),
                2 => data_model = DataModel::decode(&field)?,
                3 => criteria = Some(decode_expr(field)?),
                4 => limit = Some(Limit::decode(field.into_bytes()?)?),
                5 => order.push(Order::decode(field.into_bytes()?)?),
                6 => args.push(decode_scalar(field)?),
                _ => {}
            }
        }
        Ok(Self {
            collection: required(collection, "Delete.collection")?,
            data_model,
            criteria,
            args,
            order,
            limit,
        })
    }
}
