//! Protocol expression tree.
//!
//! CRUD requests carry criteria, projections, orderings and update values as
//! expression trees. The client compiles condition strings into this form;
//! the server evaluates it.

use bytes::{Buf, BufMut};

use crate::codec::{
    MAX_NESTING_DEPTH, read_field, required, write_message_field, write_string_field,
    write_uint_field,
};
use crate::error::ProtocolError;
use crate::scalar::Scalar;

/// One step of a document path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentPathItem {
    /// `.name`
    Member(String),
    /// `.*`
    MemberAsterisk,
    /// `[n]`
    ArrayIndex(u32),
    /// `[*]`
    ArrayIndexAsterisk,
    /// `**`
    DoubleAsterisk,
}

impl DocumentPathItem {
    const MEMBER: u64 = 1;
    const MEMBER_ASTERISK: u64 = 2;
    const ARRAY_INDEX: u64 = 3;
    const ARRAY_INDEX_ASTERISK: u64 = 4;
    const DOUBLE_ASTERISK: u64 = 5;

    /// Encode as a `Mysqlx.Expr.DocumentPathItem` body.
    pub fn encode(&self, dst: &mut impl BufMut) {
        match self {
            Self::Member(name) => {
                write_uint_field(dst, 1, Self::MEMBER);
                write_string_field(dst, 2, name);
            }
            Self::MemberAsterisk => write_uint_field(dst, 1, Self::MEMBER_ASTERISK),
            Self::ArrayIndex(i) => {
                write_uint_field(dst, 1, Self::ARRAY_INDEX);
                write_uint_field(dst, 3, u64::from(*i));
            }
            Self::ArrayIndexAsterisk => write_uint_field(dst, 1, Self::ARRAY_INDEX_ASTERISK),
            Self::DoubleAsterisk => write_uint_field(dst, 1, Self::DOUBLE_ASTERISK),
        }
    }

    /// Decode a `Mysqlx.Expr.DocumentPathItem` body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut kind = None;
        let mut value = None;
        let mut index = 0;
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                1 => kind = Some(field.as_u64()?),
                2 => value = Some(field.into_string("path member")?),
                3 => index = field.as_u32()?,
                _ => {}
            }
        }
        match required(kind, "DocumentPathItem.type")? {
            Self::MEMBER => Ok(Self::Member(required(value, "DocumentPathItem.value")?)),
            Self::MEMBER_ASTERISK => Ok(Self::MemberAsterisk),
            Self::ARRAY_INDEX => Ok(Self::ArrayIndex(index)),
            Self::ARRAY_INDEX_ASTERISK => Ok(Self::ArrayIndexAsterisk),
            Self::DOUBLE_ASTERISK => Ok(Self::DoubleAsterisk),
            other => Err(ProtocolError::InvalidTag {
                field: "document path item",
                value: other as u32,
            }),
        }
    }
}

/// A column reference, optionally navigating into a JSON document.
///
/// In document mode only `document_path` is set; in table mode `name` (and
/// optionally table and schema) identify the column and `document_path`
/// reaches into a JSON column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ColumnIdentifier {
    /// Path inside the document.
    pub document_path: Vec<DocumentPathItem>,
    /// Column name.
    pub name: Option<String>,
    /// Table qualifier.
    pub table_name: Option<String>,
    /// Schema qualifier.
    pub schema_name: Option<String>,
}

impl ColumnIdentifier {
    /// A document path with no column.
    #[must_use]
    pub fn path(document_path: Vec<DocumentPathItem>) -> Self {
        Self {
            document_path,
            ..Self::default()
        }
    }

    /// A plain column reference.
    #[must_use]
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Encode as a `Mysqlx.Expr.ColumnIdentifier` body.
    pub fn encode(&self, dst: &mut impl BufMut) {
        for item in &self.document_path {
            write_message_field(dst, 1, |b| item.encode(b));
        }
        let names = [
            (2, &self.name),
            (3, &self.table_name),
            (4, &self.schema_name),
        ];
        for (number, value) in names {
            if let Some(value) = value {
                write_string_field(dst, number, value);
            }
        }
    }

    /// Decode a `Mysqlx.Expr.ColumnIdentifier` body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut id = Self::default();
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                1 => id
                    .document_path
                    .push(DocumentPathItem::decode(&mut field.into_bytes()?)?),
                2 => id.name = Some(field.into_string("column name")?),
                3 => id.table_name = Some(field.into_string("table name")?),
                4 => id.schema_name = Some(field.into_string("schema name")?),
                _ => {}
            }
        }
        Ok(id)
    }
}

/// A possibly schema-qualified function name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    /// Function name.
    pub name: String,
    /// Schema qualifier.
    pub schema_name: Option<String>,
}

impl Identifier {
    fn encode(&self, dst: &mut impl BufMut) {
        write_string_field(dst, 1, &self.name);
        if let Some(schema) = &self.schema_name {
            write_string_field(dst, 2, schema);
        }
    }

    fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut name = None;
        let mut schema_name = None;
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                1 => name = Some(field.into_string("function name")?),
                2 => schema_name = Some(field.into_string("function schema")?),
                _ => {}
            }
        }
        Ok(Self {
            name: required(name, "Identifier.name")?,
            schema_name,
        })
    }
}

/// A function call.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Function name.
    pub name: Identifier,
    /// Arguments.
    pub params: Vec<Expr>,
}

/// An operator application.
///
/// Operator names follow the protocol vocabulary: `==`, `!=`, `>`, `&&`,
/// `||`, `not`, `is_not`, `in`, `not_in`, `like`, `between`, `sign_minus`
/// and so on.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    /// Operator name.
    pub name: String,
    /// Operands.
    pub params: Vec<Expr>,
}

/// Expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column or document path.
    Ident(ColumnIdentifier),
    /// Literal value.
    Literal(Scalar),
    /// Function call.
    FuncCall(FunctionCall),
    /// Operator.
    Operator(Operator),
    /// Positional placeholder, index into the request's argument list.
    Placeholder(u32),
    /// Object constructor.
    Object(Vec<(String, Expr)>),
    /// Array constructor.
    Array(Vec<Expr>),
}

impl Expr {
    const IDENT: u64 = 1;
    const LITERAL: u64 = 2;
    const FUNC_CALL: u64 = 4;
    const OPERATOR: u64 = 5;
    const PLACEHOLDER: u64 = 6;
    const OBJECT: u64 = 7;
    const ARRAY: u64 = 8;

    /// Build an operator node.
    #[must_use]
    pub fn op(name: impl Into<String>, params: Vec<Expr>) -> Self {
        Self::Operator(Operator {
            name: name.into(),
            params,
        })
    }

    /// Build a literal node.
    #[must_use]
    pub fn literal(value: impl Into<Scalar>) -> Self {
        Self::Literal(value.into())
    }

    /// Encode as a `Mysqlx.Expr.Expr` body.
    pub fn encode(&self, dst: &mut impl BufMut) {
        match self {
            Self::Ident(id) => {
                write_uint_field(dst, 1, Self::IDENT);
                write_message_field(dst, 2, |b| id.encode(b));
            }
            Self::Literal(value) => {
                write_uint_field(dst, 1, Self::LITERAL);
                write_message_field(dst, 4, |b| value.encode(b));
            }
            Self::FuncCall(call) => {
                write_uint_field(dst, 1, Self::FUNC_CALL);
                write_message_field(dst, 5, |b| {
                    write_message_field(b, 1, |n| call.name.encode(n));
                    for p in &call.params {
                        write_message_field(b, 2, |e| p.encode(e));
                    }
                });
            }
            Self::Operator(op) => {
                write_uint_field(dst, 1, Self::OPERATOR);
                write_message_field(dst, 6, |b| {
                    write_string_field(b, 1, &op.name);
                    for p in &op.params {
                        write_message_field(b, 2, |e| p.encode(e));
                    }
                });
            }
            Self::Placeholder(position) => {
                write_uint_field(dst, 1, Self::PLACEHOLDER);
                write_uint_field(dst, 7, u64::from(*position));
            }
            Self::Object(fields) => {
                write_uint_field(dst, 1, Self::OBJECT);
                write_message_field(dst, 8, |obj| {
                    for (key, value) in fields {
                        write_message_field(obj, 1, |b| {
                            write_string_field(b, 1, key);
                            write_message_field(b, 2, |e| value.encode(e));
                        });
                    }
                });
            }
            Self::Array(items) => {
                write_uint_field(dst, 1, Self::ARRAY);
                write_message_field(dst, 9, |arr| {
                    for item in items {
                        write_message_field(arr, 1, |e| item.encode(e));
                    }
                });
            }
        }
    }

    /// Decode a `Mysqlx.Expr.Expr` body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        Self::decode_at(src, 0)
    }

    fn decode_at(src: &mut impl Buf, depth: usize) -> Result<Self, ProtocolError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ProtocolError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        let mut kind = None;
        let mut node = None;
        let mut position = 0;
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                1 => kind = Some(field.as_u64()?),
                2 => node = Some(Self::Ident(ColumnIdentifier::decode(&mut field.into_bytes()?)?)),
                4 => node = Some(Self::Literal(Scalar::decode(&mut field.into_bytes()?)?)),
                5 => node = Some(Self::decode_call(&mut field.into_bytes()?, depth)?),
                6 => node = Some(Self::decode_operator(&mut field.into_bytes()?, depth)?),
                7 => position = field.as_u32()?,
                8 => node = Some(Self::decode_object(&mut field.into_bytes()?, depth)?),
                9 => {
                    let mut body = field.into_bytes()?;
                    node = Some(Self::Array(Self::decode_params(&mut body, 1, depth)?));
                }
                _ => {}
            }
        }
        let kind = required(kind, "Expr.type")?;
        let expected = match kind {
            Self::PLACEHOLDER => return Ok(Self::Placeholder(position)),
            Self::IDENT => "Expr.identifier",
            Self::LITERAL => "Expr.literal",
            Self::FUNC_CALL => "Expr.function_call",
            Self::OPERATOR => "Expr.operator",
            Self::OBJECT => "Expr.object",
            Self::ARRAY => "Expr.array",
            other => {
                return Err(ProtocolError::InvalidTag {
                    field: "expr",
                    value: other as u32,
                });
            }
        };
        let node = required(node, expected)?;
        let consistent = matches!(
            (kind, &node),
            (Self::IDENT, Self::Ident(_))
                | (Self::LITERAL, Self::Literal(_))
                | (Self::FUNC_CALL, Self::FuncCall(_))
                | (Self::OPERATOR, Self::Operator(_))
                | (Self::OBJECT, Self::Object(_))
                | (Self::ARRAY, Self::Array(_))
        );
        if !consistent {
            return Err(ProtocolError::MissingField(expected));
        }
        Ok(node)
    }

    /// Collect every occurrence of nested expression field `number`.
    fn decode_params(
        src: &mut impl Buf,
        number: u32,
        depth: usize,
    ) -> Result<Vec<Expr>, ProtocolError> {
        let mut params = Vec::new();
        while src.has_remaining() {
            let field = read_field(src)?;
            if field.number == number {
                params.push(Self::decode_at(&mut field.into_bytes()?, depth + 1)?);
            }
        }
        Ok(params)
    }

    fn decode_call(src: &mut impl Buf, depth: usize) -> Result<Self, ProtocolError> {
        let mut name = None;
        let mut params = Vec::new();
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                1 => name = Some(Identifier::decode(&mut field.into_bytes()?)?),
                2 => params.push(Self::decode_at(&mut field.into_bytes()?, depth + 1)?),
                _ => {}
            }
        }
        Ok(Self::FuncCall(FunctionCall {
            name: required(name, "FunctionCall.name")?,
            params,
        }))
    }

    fn decode_operator(src: &mut impl Buf, depth: usize) -> Result<Self, ProtocolError> {
        let mut name = None;
        let mut params = Vec::new();
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                1 => name = Some(field.into_string("operator name")?),
                2 => params.push(Self::decode_at(&mut field.into_bytes()?, depth + 1)?),
                _ => {}
            }
        }
        Ok(Self::Operator(Operator {
            name: required(name, "Operator.name")?,
            params,
        }))
    }

    fn decode_object(src: &mut impl Buf, depth: usize) -> Result<Self, ProtocolError> {
        let mut fields = Vec::new();
        while src.has_remaining() {
            let field = read_field(src)?;
            if field.number != 1 {
                continue;
            }
            let mut body = field.into_bytes()?;
            let mut key = None;
            let mut value = None;
            while body.has_remaining() {
                let f = read_field(&mut body)?;
                match f.number {
                    1 => key = Some(f.into_string("object key")?),
                    2 => value = Some(Self::decode_at(&mut f.into_bytes()?, depth + 1)?),
                    _ => {}
                }
            }
            fields.push((
                required(key, "Object.ObjectField.key")?,
                required(value, "Object.ObjectField.value")?,
            ));
        }
        Ok(Self::Object(fields))
    }

    /// Highest placeholder index referenced by this tree, if any.
    #[must_use]
    pub fn max_placeholder(&self) -> Option<u32> {
        match self {
            Self::Placeholder(p) => Some(*p),
            Self::Ident(_) | Self::Literal(_) => None,
            Self::FuncCall(FunctionCall { params, .. })
            | Self::Operator(Operator { params, .. })
            | Self::Array(params) => params.iter().filter_map(Self::max_placeholder).max(),
            Self::Object(fields) => fields.iter().filter_map(|(_, e)| e.max_placeholder()).max(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn roundtrip(expr: &Expr) -> Expr {
        let mut buf = BytesMut::new();
        expr.encode(&mut buf);
        let mut cursor = buf.freeze();
        let decoded = Expr::decode(&mut cursor).unwrap();
        assert_eq!(cursor.remaining(), 0);
        decoded
    }

    #[test]
    fn test_nested_expression() {
        // _id = :id and tags[0] in ('a', 'b')
        let expr = Expr::op(
            "&&",
            vec![
                Expr::op(
                    "==",
                    vec![
                        Expr::Ident(ColumnIdentifier::path(vec![DocumentPathItem::Member(
                            "_id".into(),
                        )])),
                        Expr::Placeholder(0),
                    ],
                ),
                Expr::op(
                    "in",
                    vec![
                        Expr::Ident(ColumnIdentifier::path(vec![
                            DocumentPathItem::Member("tags".into()),
                            DocumentPathItem::ArrayIndex(0),
                        ])),
                        Expr::literal("a"),
                        Expr::literal("b"),
                    ],
                ),
            ],
        );
        assert_eq!(roundtrip(&expr), expr);
        assert_eq!(expr.max_placeholder(), Some(0));
    }

    #[test]
    fn test_function_and_object() {
        let expr = Expr::Object(vec![
            (
                "upper".into(),
                Expr::FuncCall(FunctionCall {
                    name: Identifier {
                        name: "upper".into(),
                        schema_name: None,
                    },
                    params: vec![Expr::Ident(ColumnIdentifier::column("name"))],
                }),
            ),
            ("list".into(), Expr::Array(vec![Expr::Placeholder(3)])),
        ]);
        assert_eq!(roundtrip(&expr), expr);
        assert_eq!(expr.max_placeholder(), Some(3));
    }

    #[test]
    fn test_placeholder_layout() {
        let mut buf = BytesMut::new();
        Expr::Placeholder(2).encode(&mut buf);
        // type = PLACEHOLDER, position = 2
        assert_eq!(&buf[..], &[0x08, 0x06, 0x38, 0x02]);
    }

    #[test]
    fn test_variable_expr_rejected() {
        // type = VARIABLE, which the client never produces
        let mut cursor = bytes::Bytes::from_static(&[0x08, 0x03]);
        assert_eq!(
            Expr::decode(&mut cursor),
            Err(ProtocolError::InvalidTag {
                field: "expr",
                value: 3
            })
        );
    }

    #[test]
    fn test_operator_without_body() {
        let mut cursor = bytes::Bytes::from_static(&[0x08, 0x05]);
        assert_eq!(
            Expr::decode(&mut cursor),
            Err(ProtocolError::MissingField("Expr.operator"))
        );
    }
}
