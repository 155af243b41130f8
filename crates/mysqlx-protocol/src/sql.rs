//! Statement execution in a namespace.

use bytes::{Buf, BufMut, Bytes};

use crate::codec::{
    read_field, required, write_bool_field, write_bytes_field, write_message_field,
    write_string_field,
};
use crate::error::ProtocolError;
use crate::scalar::Any;

/// Namespace for plain SQL statements.
pub const NAMESPACE_SQL: &str = "sql";
/// Namespace for administrative commands (`create_collection`, `list_objects`, ...).
pub const NAMESPACE_MYSQLX: &str = "mysqlx";

/// Execute a statement or an administrative command.
#[derive(Debug, Clone, PartialEq)]
pub struct StmtExecute {
    /// Namespace (`sql` or `mysqlx`).
    pub namespace: String,
    /// Statement text or command name.
    pub stmt: Bytes,
    /// Positional arguments (`?` in SQL) or a single command object.
    pub args: Vec<Any>,
    /// Ask for compact column metadata.
    pub compact_metadata: bool,
}

impl StmtExecute {
    /// A SQL statement with positional arguments.
    pub fn sql(stmt: impl Into<String>, args: Vec<Any>) -> Self {
        Self {
            namespace: NAMESPACE_SQL.to_string(),
            stmt: Bytes::from(stmt.into()),
            args,
            compact_metadata: false,
        }
    }

    /// An administrative command with an object argument.
    pub fn admin(command: &str, args: Any) -> Self {
        Self {
            namespace: NAMESPACE_MYSQLX.to_string(),
            stmt: Bytes::copy_from_slice(command.as_bytes()),
            args: vec![args],
            compact_metadata: false,
        }
    }

    /// Statement text as UTF-8, lossy.
    #[must_use]
    pub fn stmt_text(&self) -> String {
        String::from_utf8_lossy(&self.stmt).into_owned()
    }

    /// Encode as a `Mysqlx.Sql.StmtExecute` body.
    pub fn encode(&self, dst: &mut impl BufMut) {
        write_bytes_field(dst, 1, &self.stmt);
        for a in &self.args {
            write_message_field(dst, 2, |b| a.encode(b));
        }
        write_string_field(dst, 3, &self.namespace);
        if self.compact_metadata {
            write_bool_field(dst, 4, true);
        }
    }

    /// Decode a `Mysqlx.Sql.StmtExecute` body. A missing namespace means `sql`.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut namespace = NAMESPACE_SQL.to_string();
        let mut stmt = None;
        let mut args = Vec::new();
        let mut compact_metadata = false;
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                1 => stmt = Some(field.into_bytes()?),
                2 => args.push(Any::decode(&mut field.into_bytes()?)?),
                3 => namespace = field.into_string("namespace")?,
                4 => compact_metadata = field.as_bool()?,
                _ => {}
            }
        }
        Ok(Self {
            namespace,
            stmt: required(stmt, "StmtExecute.stmt")?,
            args,
            compact_metadata,
        })
    }
}
