//! Pieces shared by every CRUD statement builder.
//!
//! Builders compose a [`FilterData`] for the condition, sort, limit and
//! bindings, compile their strings once into a [`Plan`] and resolve
//! placeholders against the bindings at execute time. Changing anything
//! that affects compilation throws the cached plan away; binding does not.

use std::collections::HashMap;

use mysqlx_protocol::{
    Any, ClientMessage, DataModel, Expr, Limit, Order, Projection, Scalar, StmtExecute,
    UpdateOperation,
};
use mysqlx_types::{DbDoc, Value};

use crate::error::{CONDITION_REQUIRED, Error, Result};
use crate::expr::Compiler;
use crate::result::SqlResult;
use crate::session::Session;

/// Condition, ordering, paging and bindings of a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FilterData {
    pub(crate) condition: Option<String>,
    pub(crate) sort: Vec<String>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    bindings: HashMap<String, Value>,
}

impl FilterData {
    pub(crate) fn new(condition: Option<String>) -> Self {
        Self {
            condition,
            ..Self::default()
        }
    }

    /// Bind a placeholder. Names are case-insensitive and the last bind wins.
    pub(crate) fn bind(&mut self, name: &str, value: Value) {
        let key = name.trim().trim_start_matches(':').to_ascii_lowercase();
        self.bindings.insert(key, value);
    }

    pub(crate) fn limit(&self) -> Option<Limit> {
        match (self.limit, self.offset) {
            (None, None) => None,
            (Some(row_count), offset) => Some(Limit { row_count, offset }),
            (None, Some(offset)) => Some(Limit {
                row_count: u64::MAX,
                offset: Some(offset),
            }),
        }
    }

    /// The condition, which must be present and not blank.
    pub(crate) fn required_condition(&self) -> Result<&str> {
        match self.condition.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(Error::invalid_argument(CONDITION_REQUIRED)),
        }
    }

    /// Values for `placeholders`, in order.
    pub(crate) fn resolve(&self, placeholders: &[String]) -> Result<Vec<Scalar>> {
        placeholders
            .iter()
            .map(|name| {
                self.bindings
                    .get(name)
                    .map(Value::to_scalar)
                    .ok_or_else(|| Error::UnboundParameter(name.clone()))
            })
            .collect()
    }

    /// Compile the condition and sort keys.
    pub(crate) fn compile_into(&self, compiler: &mut Compiler, plan: &mut Plan) -> Result<()> {
        plan.criteria = match self.condition.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Some(compiler.expression(text)?),
            _ => None,
        };
        plan.order = self
            .sort
            .iter()
            .map(|s| compiler.order(s))
            .collect::<std::result::Result<Vec<Order>, _>>()?;
        Ok(())
    }
}

/// Compiled parts of a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Plan {
    pub(crate) criteria: Option<Expr>,
    pub(crate) projection: Vec<Projection>,
    pub(crate) order: Vec<Order>,
    pub(crate) grouping: Vec<Expr>,
    pub(crate) grouping_criteria: Option<Expr>,
    pub(crate) operations: Vec<UpdateOperation>,
    pub(crate) placeholders: Vec<String>,
}

/// Compile a plan, letting `build` fill in the statement-specific parts.
pub(crate) fn compile_plan(
    mode: DataModel,
    filter: &FilterData,
    build: impl FnOnce(&mut Compiler, &mut Plan) -> Result<()>,
) -> Result<Plan> {
    let mut compiler = Compiler::new(mode);
    let mut plan = Plan::default();
    filter.compile_into(&mut compiler, &mut plan)?;
    build(&mut compiler, &mut plan)?;
    plan.placeholders = compiler.into_placeholders();
    Ok(plan)
}

/// Split a list of field strings, accepting `"a, b"` as two fields.
pub(crate) fn field_list<I, S>(fields: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fields
        .into_iter()
        .flat_map(|f| split_top_level(f.as_ref()))
        .filter(|f| !f.is_empty())
        .collect()
}

/// Split on commas that are not nested in brackets or quotes.
fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut current = String::new();
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == '\\' && q != '`' {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' | '[' | '{' => {
                    depth += 1;
                    current.push(c);
                }
                ')' | ']' | '}' => {
                    depth -= 1;
                    current.push(c);
                }
                ',' if depth == 0 => {
                    parts.push(current.trim().to_string());
                    current.clear();
                }
                other => current.push(other),
            },
        }
    }
    parts.push(current.trim().to_string());
    parts
}

/// A value for an update operation: a literal or an expression string.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Sent as a literal.
    Value(Value),
    /// Compiled with the statement; may use placeholders.
    Expression(String),
}

/// Mark a string as an expression rather than a string literal.
///
/// ```rust,ignore
/// books.modify("true").set("pages", expr("pages + 1")).execute().await?;
/// ```
#[must_use]
pub fn expr(text: impl Into<String>) -> Operand {
    Operand::Expression(text.into())
}

impl Operand {
    pub(crate) fn compile(&self, compiler: &mut Compiler) -> Result<Expr> {
        match self {
            Self::Value(value) => Ok(value_expr(value)),
            Self::Expression(text) => Ok(compiler.expression(text)?),
        }
    }
}

macro_rules! operand_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(v: $ty) -> Self {
                    Self::Value(Value::from(v))
                }
            }
        )*
    };
}

operand_from!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    f32,
    f64,
    String,
    &str,
    DbDoc,
    serde_json::Value,
);

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Operand {
    fn from(items: Vec<T>) -> Self {
        Self::Value(Value::from(items))
    }
}

impl<T: Into<Value>> From<Option<T>> for Operand {
    fn from(v: Option<T>) -> Self {
        Self::Value(Value::from(v))
    }
}

/// Expression tree for a literal value. Documents and arrays stay
/// structured so the server sees JSON, not a string.
pub(crate) fn value_expr(value: &Value) -> Expr {
    match value {
        Value::Document(doc) => Expr::Object(
            doc.iter()
                .map(|(key, value)| (key.to_string(), value_expr(value)))
                .collect(),
        ),
        Value::Array(items) => Expr::Array(items.iter().map(value_expr).collect()),
        other => Expr::Literal(other.to_scalar()),
    }
}

/// Run an administrative command in the `mysqlx` namespace.
pub(crate) async fn admin_command(
    session: &Session,
    command: &str,
    args: DbDoc,
) -> Result<SqlResult> {
    let args: Any = Value::Document(args).to_any();
    let stream = session
        .execute(ClientMessage::StmtExecute(StmtExecute::admin(command, args)))
        .await?;
    SqlResult::open(stream).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_case_insensitive_last_wins() {
        let mut filter = FilterData::new(Some("_id = :Id".into()));
        filter.bind("ID", Value::from(2));
        filter.bind(":id", Value::from(1));
        let args = filter.resolve(&["id".to_string()]).unwrap();
        assert_eq!(args, vec![Scalar::SInt(1)]);
    }

    #[test]
    fn test_unbound_placeholder() {
        let filter = FilterData::new(None);
        let err = filter.resolve(&["missing".to_string()]).unwrap_err();
        assert!(matches!(err, Error::UnboundParameter(name) if name == "missing"));
    }

    #[test]
    fn test_limit_and_offset() {
        let mut filter = FilterData::default();
        assert_eq!(filter.limit(), None);
        filter.offset = Some(5);
        assert_eq!(
            filter.limit(),
            Some(Limit {
                row_count: u64::MAX,
                offset: Some(5)
            })
        );
        filter.limit = Some(2);
        assert_eq!(
            filter.limit(),
            Some(Limit {
                row_count: 2,
                offset: Some(5)
            })
        );
    }

    #[test]
    fn test_required_condition() {
        for condition in [None, Some(""), Some("   ")] {
            let filter = FilterData::new(condition.map(String::from));
            let err = filter.required_condition().unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("invalid argument: {CONDITION_REQUIRED}")
            );
        }
        let filter = FilterData::new(Some(" true ".into()));
        assert_eq!(filter.required_condition().unwrap(), "true");
    }

    #[test]
    fn test_plan_shares_placeholders() {
        let mut filter = FilterData::new(Some("a = :x".into()));
        filter.sort = vec!["b DESC".into()];
        let plan = compile_plan(DataModel::Document, &filter, |compiler, plan| {
            plan.grouping_criteria = Some(compiler.expression("count(*) > :y OR :x")?);
            Ok(())
        })
        .unwrap();
        assert_eq!(plan.placeholders, vec!["x", "y"]);
        assert_eq!(plan.order.len(), 1);
    }

    #[test]
    fn test_field_list_splits_top_level_commas() {
        assert_eq!(
            field_list(["a, concat(b, ',', c) AS d", "e"]),
            vec!["a", "concat(b, ',', c) AS d", "e"]
        );
    }

    #[test]
    fn test_value_expr_keeps_structure() {
        let doc = DbDoc::new().with("a", 1).with("tags", vec!["x"]);
        let Expr::Object(fields) = value_expr(&Value::Document(doc)) else {
            panic!("expected object");
        };
        assert_eq!(fields[0].0, "a");
        assert!(matches!(fields[1].1, Expr::Array(_)));
        assert_eq!(expr("pages + 1"), Operand::Expression("pages + 1".into()));
        assert_eq!(Operand::from(10), Operand::Value(Value::Int(10)));
    }
}
