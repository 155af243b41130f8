//! Evaluation of protocol expression trees against stored data.
//!
//! The mock server runs the criteria, projections, orderings and update
//! values it receives through this evaluator. It follows the server's
//! loose typing: NULL propagates through comparisons and arithmetic,
//! strings compare numerically against numbers when they parse as one.

use std::cmp::Ordering;

use mysqlx_protocol::{
    ColumnIdentifier, ColumnMetaData, DocumentPathItem, Expr, FunctionCall, Operator, Scalar,
    ServerError,
};
use mysqlx_types::{DbDoc, Value};
use regex::RegexBuilder;

/// Unknown column.
pub(crate) const ER_BAD_FIELD_ERROR: u32 = 1054;
/// Unknown function.
pub(crate) const ER_SP_DOES_NOT_EXIST: u32 = 1305;
/// Operator name not understood.
pub(crate) const ER_X_EXPR_BAD_OPERATOR: u32 = 5151;
/// Wrong number of operands or placeholder out of range.
pub(crate) const ER_X_EXPR_BAD_VALUE: u32 = 5154;

fn error(code: u32, msg: impl Into<String>) -> ServerError {
    ServerError::new(code, "HY000", msg)
}

/// What an expression is evaluated against.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Subject<'a> {
    /// A document of a collection.
    Document(&'a DbDoc),
    /// A row of a table.
    Row {
        columns: &'a [ColumnMetaData],
        values: &'a [Value],
    },
}

/// Evaluates expressions with one set of positional arguments.
///
/// With a group set, aggregate functions run over the group and every
/// other reference reads the subject passed to [`Evaluator::eval`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Evaluator<'a> {
    args: &'a [Scalar],
    group: &'a [Subject<'a>],
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(args: &'a [Scalar]) -> Self {
        Self { args, group: &[] }
    }

    pub(crate) fn with_group(self, group: &'a [Subject<'a>]) -> Self {
        Self { group, ..self }
    }

    /// Whether the subject passes `criteria`. No criteria passes everything.
    pub(crate) fn matches(
        &self,
        criteria: Option<&Expr>,
        subject: Subject<'_>,
    ) -> Result<bool, ServerError> {
        match criteria {
            None => Ok(true),
            Some(expr) => Ok(truthy(&self.eval(expr, subject)?)),
        }
    }

    pub(crate) fn eval(&self, expr: &Expr, subject: Subject<'_>) -> Result<Value, ServerError> {
        match expr {
            Expr::Ident(id) => ident(id, subject),
            Expr::Literal(scalar) => scalar_value(scalar),
            Expr::Placeholder(position) => {
                let scalar = self.args.get(*position as usize).ok_or_else(|| {
                    error(
                        ER_X_EXPR_BAD_VALUE,
                        format!("Invalid value of placeholder {position}"),
                    )
                })?;
                scalar_value(scalar)
            }
            Expr::Object(fields) => {
                let mut doc = DbDoc::new();
                for (key, value) in fields {
                    doc.set(key.clone(), self.eval(value, subject)?);
                }
                Ok(Value::Document(doc))
            }
            Expr::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.eval(item, subject))
                    .collect::<Result<_, _>>()?,
            )),
            Expr::FuncCall(call) => self.call(call, subject),
            Expr::Operator(op) => self.operator(op, subject),
        }
    }

    fn call(&self, call: &FunctionCall, subject: Subject<'_>) -> Result<Value, ServerError> {
        let name = call.name.name.to_ascii_lowercase();
        if let Some(value) = self.aggregate(&name, &call.params, subject)? {
            return Ok(value);
        }

        let args = call
            .params
            .iter()
            .map(|p| self.eval(p, subject))
            .collect::<Result<Vec<_>, _>>()?;
        let first = args.first().cloned().unwrap_or_default();

        match name.as_str() {
            "concat" => {
                if args.iter().any(Value::is_null) {
                    return Ok(Value::Null);
                }
                Ok(Value::String(args.iter().map(text).collect()))
            }
            "lower" | "lcase" => Ok(map_text(&first, |s| s.to_lowercase())),
            "upper" | "ucase" => Ok(map_text(&first, |s| s.to_uppercase())),
            "length" | "char_length" => Ok(match &first {
                Value::Null => Value::Null,
                other => Value::Int(text(other).chars().count() as i64),
            }),
            "abs" => Ok(match &first {
                Value::Int(v) => Value::Int(v.saturating_abs()),
                other => number(other).map_or(Value::Null, |n| Value::Double(n.abs())),
            }),
            "ifnull" | "coalesce" => Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or_default()),
            "json_unquote" => Ok(first),
            "json_length" => Ok(match &first {
                Value::Array(items) => Value::Int(items.len() as i64),
                Value::Document(doc) => Value::Int(doc.len() as i64),
                Value::Null => Value::Null,
                _ => Value::Int(1),
            }),
            _ => Err(error(
                ER_SP_DOES_NOT_EXIST,
                format!("FUNCTION {} does not exist", call.name.name),
            )),
        }
    }

    fn aggregate(
        &self,
        name: &str,
        params: &[Expr],
        subject: Subject<'_>,
    ) -> Result<Option<Value>, ServerError> {
        if !is_aggregate(name) {
            return Ok(None);
        }
        let single = [subject];
        let rows: &[Subject<'_>] = if self.group.is_empty() {
            &single
        } else {
            self.group
        };
        let plain = Self {
            group: &[],
            ..*self
        };

        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            match params.first() {
                Some(Expr::Literal(Scalar::String(star))) if star == "*" => {
                    values.push(Value::Int(1));
                }
                Some(param) => values.push(plain.eval(param, *row)?),
                None => values.push(Value::Int(1)),
            }
        }
        let present: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();

        let value = match name {
            "count" => Value::Int(present.len() as i64),
            "sum" | "avg" if present.is_empty() => Value::Null,
            "sum" => sum(&present),
            "avg" => {
                let total: f64 = present.iter().filter_map(|v| number(v)).sum();
                Value::Double(total / present.len() as f64)
            }
            "min" => present
                .iter()
                .copied()
                .min_by(|a, b| compare(a, b).unwrap_or(Ordering::Equal))
                .cloned()
                .unwrap_or_default(),
            _ => present
                .iter()
                .copied()
                .max_by(|a, b| compare(a, b).unwrap_or(Ordering::Equal))
                .cloned()
                .unwrap_or_default(),
        };
        Ok(Some(value))
    }

    fn operator(&self, op: &Operator, subject: Subject<'_>) -> Result<Value, ServerError> {
        let name = op.name.to_ascii_lowercase();

        // Short-circuit forms first.
        match name.as_str() {
            "||" | "&&" => {
                let [left, right] = operands::<2>(op)?;
                let left = self.eval(left, subject)?;
                let want = name == "||";
                if !left.is_null() && truthy(&left) == want {
                    return Ok(Value::Bool(want));
                }
                let right = self.eval(right, subject)?;
                if left.is_null() || right.is_null() {
                    return Ok(if !right.is_null() && truthy(&right) == want {
                        Value::Bool(want)
                    } else {
                        Value::Null
                    });
                }
                return Ok(Value::Bool(truthy(&right)));
            }
            _ => {}
        }

        let args = op
            .params
            .iter()
            .map(|p| self.eval(p, subject))
            .collect::<Result<Vec<_>, _>>()?;

        let negate = |v: Value| match v {
            Value::Bool(b) => Value::Bool(!b),
            other => other,
        };

        match name.as_str() {
            "not" | "!" => {
                let [v] = values::<1>(&name, &args)?;
                Ok(if v.is_null() {
                    Value::Null
                } else {
                    Value::Bool(!truthy(v))
                })
            }
            "==" | "!=" => {
                let [a, b] = values::<2>(&name, &args)?;
                let eq = equals(a, b).map(Value::Bool).unwrap_or_default();
                Ok(if name == "!=" { negate(eq) } else { eq })
            }
            "<" | "<=" | ">" | ">=" => {
                let [a, b] = values::<2>(&name, &args)?;
                Ok(compare(a, b).map_or(Value::Null, |ord| {
                    Value::Bool(match name.as_str() {
                        "<" => ord == Ordering::Less,
                        "<=" => ord != Ordering::Greater,
                        ">" => ord == Ordering::Greater,
                        _ => ord != Ordering::Less,
                    })
                }))
            }
            "is" | "is_not" => {
                let [a, b] = values::<2>(&name, &args)?;
                let is = match b {
                    Value::Null => a.is_null(),
                    Value::Bool(want) => !a.is_null() && truthy(a) == *want,
                    other => equals(a, other).unwrap_or(false),
                };
                Ok(Value::Bool(if name == "is" { is } else { !is }))
            }
            "in" | "not_in" => {
                let (needle, haystack) = args
                    .split_first()
                    .ok_or_else(|| bad_operands(&name))?;
                if needle.is_null() {
                    return Ok(Value::Null);
                }
                let found = haystack
                    .iter()
                    .any(|candidate| equals(needle, candidate).unwrap_or(false));
                Ok(Value::Bool(found == (name == "in")))
            }
            "cont_in" | "not_cont_in" => {
                let [needle, container] = values::<2>(&name, &args)?;
                let found = contains(container, needle);
                Ok(Value::Bool(found == (name == "cont_in")))
            }
            "like" | "not_like" => {
                let (subject_value, rest) =
                    args.split_first().ok_or_else(|| bad_operands(&name))?;
                let pattern = rest.first().ok_or_else(|| bad_operands(&name))?;
                if subject_value.is_null() || pattern.is_null() {
                    return Ok(Value::Null);
                }
                let escape = rest
                    .get(1)
                    .and_then(|e| text(e).chars().next())
                    .unwrap_or('\\');
                let hit = like(&text(subject_value), &text(pattern), escape);
                Ok(Value::Bool(hit == (name == "like")))
            }
            "regexp" | "not_regexp" => {
                let [a, pattern] = values::<2>(&name, &args)?;
                if a.is_null() || pattern.is_null() {
                    return Ok(Value::Null);
                }
                let re = RegexBuilder::new(&text(pattern))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| error(ER_X_EXPR_BAD_VALUE, e.to_string()))?;
                Ok(Value::Bool(re.is_match(&text(a)) == (name == "regexp")))
            }
            "between" | "not_between" => {
                let [v, low, high] = values::<3>(&name, &args)?;
                let inside = match (compare(v, low), compare(v, high)) {
                    (Some(lo), Some(hi)) => lo != Ordering::Less && hi != Ordering::Greater,
                    _ => return Ok(Value::Null),
                };
                Ok(Value::Bool(inside == (name == "between")))
            }
            "sign_minus" => {
                let [v] = values::<1>(&name, &args)?;
                Ok(match v {
                    Value::Int(i) => Value::Int(i.saturating_neg()),
                    other => number(other).map_or(Value::Null, |n| Value::Double(-n)),
                })
            }
            "sign_plus" => {
                let [v] = values::<1>(&name, &args)?;
                Ok(v.clone())
            }
            "+" | "-" | "*" | "/" | "div" | "%" => {
                let [a, b] = values::<2>(&name, &args)?;
                Ok(arithmetic(&name, a, b))
            }
            "&" | "|" | "^" | "<<" | ">>" => {
                let [a, b] = values::<2>(&name, &args)?;
                let (Some(a), Some(b)) = (integer(a), integer(b)) else {
                    return Ok(Value::Null);
                };
                Ok(Value::UInt(match name.as_str() {
                    "&" => a & b,
                    "|" => a | b,
                    "^" => a ^ b,
                    "<<" => a.checked_shl(b as u32).unwrap_or(0),
                    _ => a.checked_shr(b as u32).unwrap_or(0),
                }))
            }
            "~" => {
                let [v] = values::<1>(&name, &args)?;
                Ok(integer(v).map_or(Value::Null, |i| Value::UInt(!i)))
            }
            _ => Err(error(
                ER_X_EXPR_BAD_OPERATOR,
                format!("Invalid operator {}", op.name),
            )),
        }
    }
}

fn bad_operands(name: &str) -> ServerError {
    error(
        ER_X_EXPR_BAD_VALUE,
        format!("Invalid number of arguments for operator {name}"),
    )
}

fn operands<const N: usize>(op: &Operator) -> Result<[&Expr; N], ServerError> {
    let refs: Vec<&Expr> = op.params.iter().collect();
    refs.try_into().map_err(|_| bad_operands(&op.name))
}

fn values<'v, const N: usize>(name: &str, args: &'v [Value]) -> Result<[&'v Value; N], ServerError> {
    let refs: Vec<&Value> = args.iter().collect();
    refs.try_into().map_err(|_| bad_operands(name))
}

pub(crate) fn is_aggregate(name: &str) -> bool {
    matches!(name, "count" | "sum" | "avg" | "min" | "max")
}

/// Whether an expression contains an aggregate call.
pub(crate) fn has_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::FuncCall(call) => {
            is_aggregate(&call.name.name.to_ascii_lowercase())
                || call.params.iter().any(has_aggregate)
        }
        Expr::Operator(op) => op.params.iter().any(has_aggregate),
        Expr::Object(fields) => fields.iter().any(|(_, v)| has_aggregate(v)),
        Expr::Array(items) => items.iter().any(has_aggregate),
        Expr::Ident(_) | Expr::Literal(_) | Expr::Placeholder(_) => false,
    }
}

fn ident(id: &ColumnIdentifier, subject: Subject<'_>) -> Result<Value, ServerError> {
    let base = match (subject, id.name.as_deref()) {
        (Subject::Document(doc), None | Some("doc")) => Value::Document(doc.clone()),
        (Subject::Document(doc), Some(name)) => doc.get(name).cloned().unwrap_or_default(),
        (Subject::Row { columns, values }, Some(name)) => columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .and_then(|i| values.get(i))
            .cloned()
            .ok_or_else(|| {
                error(
                    ER_BAD_FIELD_ERROR,
                    format!("Unknown column '{name}' in 'where clause'"),
                )
            })?,
        (Subject::Row { .. }, None) => {
            return Err(error(
                ER_BAD_FIELD_ERROR,
                "Document path used without a column",
            ));
        }
    };
    Ok(path_get(&base, &id.document_path))
}

fn scalar_value(scalar: &Scalar) -> Result<Value, ServerError> {
    Value::from_scalar(scalar).map_err(|e| error(ER_X_EXPR_BAD_VALUE, e.to_string()))
}

/// The value at `path`. Wildcard paths collect every match into an array.
pub(crate) fn path_get(value: &Value, path: &[DocumentPathItem]) -> Value {
    let wildcard = path.iter().any(|item| {
        !matches!(
            item,
            DocumentPathItem::Member(_) | DocumentPathItem::ArrayIndex(_)
        )
    });
    let mut found = Vec::new();
    collect_path(value, path, &mut found);
    if wildcard {
        Value::Array(found)
    } else {
        found.into_iter().next().unwrap_or_default()
    }
}

fn collect_path(value: &Value, path: &[DocumentPathItem], out: &mut Vec<Value>) {
    let Some((head, rest)) = path.split_first() else {
        out.push(value.clone());
        return;
    };
    match (head, value) {
        (DocumentPathItem::Member(key), Value::Document(doc)) => {
            if let Some(v) = doc.get(key) {
                collect_path(v, rest, out);
            }
        }
        (DocumentPathItem::MemberAsterisk, Value::Document(doc)) => {
            for (_, v) in doc.iter() {
                collect_path(v, rest, out);
            }
        }
        (DocumentPathItem::ArrayIndex(i), Value::Array(items)) => {
            if let Some(v) = items.get(*i as usize) {
                collect_path(v, rest, out);
            }
        }
        // A scalar behaves as a one-element array.
        (DocumentPathItem::ArrayIndex(0), other) => collect_path(other, rest, out),
        (DocumentPathItem::ArrayIndexAsterisk, Value::Array(items)) => {
            for v in items {
                collect_path(v, rest, out);
            }
        }
        (DocumentPathItem::DoubleAsterisk, _) => {
            collect_path(value, rest, out);
            match value {
                Value::Document(doc) => {
                    for (_, v) in doc.iter() {
                        collect_path(v, path, out);
                    }
                }
                Value::Array(items) => {
                    for v in items {
                        collect_path(v, path, out);
                    }
                }
                _ => {}
            }
        }
        _ => {}
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Array(_) | Value::Document(_) => true,
        other => number(other).is_some_and(|n| n != 0.0),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        Value::Decimal(_) | Value::String(_) => text(value).trim().parse().ok(),
        other => other.as_f64(),
    }
}

fn integer(value: &Value) -> Option<u64> {
    match value {
        Value::Int(i) => Some(*i as u64),
        Value::UInt(u) => Some(*u),
        Value::Bool(b) => Some(u64::from(*b)),
        other => number(other).map(|n| n as i64 as u64),
    }
}

fn is_numeric(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(_) | Value::Int(_) | Value::UInt(_) | Value::Double(_) | Value::Decimal(_)
    )
}

fn text(value: &Value) -> String {
    match value {
        Value::Array(_) | Value::Document(_) => value.to_json().to_string(),
        other => other.to_text().unwrap_or_default(),
    }
}

fn map_text(value: &Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::Null => Value::Null,
        other => Value::String(f(&text(other))),
    }
}

/// Total order used by comparisons and sorting. `None` when either side is
/// NULL.
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::UInt(x), Value::UInt(y)) => Some(x.cmp(y)),
        (Value::Int(x), Value::UInt(y)) => Some(i128::from(*x).cmp(&i128::from(*y))),
        (Value::UInt(x), Value::Int(y)) => Some(i128::from(*x).cmp(&i128::from(*y))),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ if is_numeric(a) || is_numeric(b) => match (number(a), number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => Some(text(a).cmp(&text(b))),
        },
        _ => Some(text(a).cmp(&text(b))),
    }
}

/// `Some(true)` when equal, `None` when either side is NULL.
pub(crate) fn equals(a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Array(_) | Value::Document(_), _) | (_, Value::Array(_) | Value::Document(_)) => {
            Some(a.to_json() == b.to_json())
        }
        _ => compare(a, b).map(|ord| ord == Ordering::Equal),
    }
}

fn contains(container: &Value, needle: &Value) -> bool {
    match (container, needle) {
        (Value::Array(items), Value::Array(wanted)) => wanted
            .iter()
            .all(|w| items.iter().any(|item| contains(item, w))),
        (Value::Array(items), _) => items.iter().any(|item| contains(item, needle)),
        (Value::Document(doc), Value::Document(wanted)) => wanted.iter().all(|(key, w)| {
            doc.get(key).is_some_and(|v| contains(v, w))
        }),
        _ => equals(container, needle).unwrap_or(false),
    }
}

fn sum(values: &[&Value]) -> Value {
    if values.iter().all(|v| matches!(v, Value::Int(_))) {
        Value::Int(values.iter().filter_map(|v| v.as_i64()).sum())
    } else {
        Value::Double(values.iter().filter_map(|v| number(v)).sum())
    }
}

fn arithmetic(name: &str, a: &Value, b: &Value) -> Value {
    if a.is_null() || b.is_null() {
        return Value::Null;
    }
    if let (Value::Int(x), Value::Int(y)) = (a, b) {
        let result = match name {
            "+" => x.checked_add(*y),
            "-" => x.checked_sub(*y),
            "*" => x.checked_mul(*y),
            "div" => x.checked_div(*y),
            "%" => x.checked_rem(*y),
            _ => None,
        };
        if let Some(v) = result {
            return Value::Int(v);
        }
        if name != "/" {
            return Value::Null;
        }
    }
    let (Some(x), Some(y)) = (number(a), number(b)) else {
        return Value::Null;
    };
    match name {
        "+" => Value::Double(x + y),
        "-" => Value::Double(x - y),
        "*" => Value::Double(x * y),
        _ if y == 0.0 => Value::Null,
        "/" => Value::Double(x / y),
        "div" => Value::Int((x / y).trunc() as i64),
        _ => Value::Double(x % y),
    }
}

/// SQL `LIKE` with `%` and `_`, case-insensitive.
pub(crate) fn like(subject: &str, pattern: &str, escape: char) -> bool {
    let subject: Vec<char> = subject.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    like_at(&subject, &pattern, escape)
}

fn like_at(subject: &[char], pattern: &[char], escape: char) -> bool {
    match pattern.split_first() {
        None => subject.is_empty(),
        Some(('%', rest)) => (0..=subject.len()).any(|i| like_at(&subject[i..], rest, escape)),
        Some(('_', rest)) => !subject.is_empty() && like_at(&subject[1..], rest, escape),
        Some((c, rest)) if *c == escape && !rest.is_empty() => {
            subject.first() == rest.first() && like_at(&subject[1..], &rest[1..], escape)
        }
        Some((c, rest)) => subject.first() == Some(c) && like_at(&subject[1..], rest, escape),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mysqlx_protocol::Identifier;

    fn field(name: &str) -> Expr {
        Expr::Ident(ColumnIdentifier::path(vec![DocumentPathItem::Member(
            name.to_string(),
        )]))
    }

    fn book() -> DbDoc {
        DbDoc::parse(r#"{"_id": 1, "title": "Dune", "pages": 412, "tags": ["sf", "classic"]}"#)
            .unwrap()
    }

    #[test]
    fn test_comparison_and_logic() {
        let doc = book();
        let eval = Evaluator::new(&[]);
        let expr = Expr::op(
            "&&",
            vec![
                Expr::op(">", vec![field("pages"), Expr::literal(400i64)]),
                Expr::op("==", vec![field("title"), Expr::literal("Dune")]),
            ],
        );
        assert!(eval.matches(Some(&expr), Subject::Document(&doc)).unwrap());

        let missing = Expr::op("==", vec![field("author"), Expr::literal("x")]);
        assert!(!eval.matches(Some(&missing), Subject::Document(&doc)).unwrap());
    }

    #[test]
    fn test_placeholders() {
        let doc = book();
        let args = [Scalar::SInt(1)];
        let eval = Evaluator::new(&args);
        let expr = Expr::op("==", vec![field("_id"), Expr::Placeholder(0)]);
        assert!(eval.matches(Some(&expr), Subject::Document(&doc)).unwrap());

        let out_of_range = Expr::op("==", vec![field("_id"), Expr::Placeholder(3)]);
        let err = eval
            .matches(Some(&out_of_range), Subject::Document(&doc))
            .unwrap_err();
        assert_eq!(err.code, ER_X_EXPR_BAD_VALUE);
    }

    #[test]
    fn test_membership_and_like() {
        let doc = book();
        let eval = Evaluator::new(&[]);
        let cont = Expr::op("cont_in", vec![Expr::literal("sf"), field("tags")]);
        assert!(eval.matches(Some(&cont), Subject::Document(&doc)).unwrap());

        let like = Expr::op("like", vec![field("title"), Expr::literal("d%")]);
        assert!(eval.matches(Some(&like), Subject::Document(&doc)).unwrap());

        let in_list = Expr::op(
            "not_in",
            vec![field("pages"), Expr::literal(1i64), Expr::literal(2i64)],
        );
        assert!(eval.matches(Some(&in_list), Subject::Document(&doc)).unwrap());
    }

    #[test]
    fn test_row_columns() {
        let columns = [ColumnMetaData::new(mysqlx_protocol::ColumnType::SInt, "age")];
        let values = [Value::Int(40)];
        let row = Subject::Row {
            columns: &columns,
            values: &values,
        };
        let eval = Evaluator::new(&[]);
        let age = Expr::Ident(ColumnIdentifier::column("age"));
        let expr = Expr::op("between", vec![age, Expr::literal(30i64), Expr::literal(50i64)]);
        assert!(eval.matches(Some(&expr), row).unwrap());

        let unknown = Expr::Ident(ColumnIdentifier::column("height"));
        assert_eq!(eval.eval(&unknown, row).unwrap_err().code, ER_BAD_FIELD_ERROR);
    }

    #[test]
    fn test_null_propagation() {
        let doc = book();
        let eval = Evaluator::new(&[]);
        let expr = Expr::op("+", vec![field("missing"), Expr::literal(1i64)]);
        assert_eq!(eval.eval(&expr, Subject::Document(&doc)).unwrap(), Value::Null);
        let is_null = Expr::op("is", vec![field("missing"), Expr::Literal(Scalar::Null)]);
        assert!(eval.matches(Some(&is_null), Subject::Document(&doc)).unwrap());
    }

    #[test]
    fn test_aggregate_over_group() {
        let docs = [book(), DbDoc::new().with("pages", 100)];
        let subjects: Vec<Subject<'_>> = docs.iter().map(Subject::Document).collect();
        let eval = Evaluator::new(&[]).with_group(&subjects);
        let sum = Expr::FuncCall(FunctionCall {
            name: Identifier {
                name: "sum".into(),
                schema_name: None,
            },
            params: vec![field("pages")],
        });
        assert!(has_aggregate(&sum));
        assert_eq!(eval.eval(&sum, subjects[0]).unwrap(), Value::Int(512));
    }

    #[test]
    fn test_paths() {
        let value = Value::Document(book());
        assert_eq!(
            path_get(&value, &[DocumentPathItem::Member("tags".into()), DocumentPathItem::ArrayIndex(1)]),
            Value::String("classic".into())
        );
        assert_eq!(
            path_get(&value, &[DocumentPathItem::Member("tags".into()), DocumentPathItem::ArrayIndexAsterisk]),
            Value::Array(vec![Value::from("sf"), Value::from("classic")])
        );
    }

    #[test]
    fn test_like_escape() {
        assert!(like("50%", "50\\%", '\\'));
        assert!(!like("500", "50\\%", '\\'));
        assert!(like("abc", "a_c", '\\'));
    }
}
