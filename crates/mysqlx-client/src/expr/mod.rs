//! Compiling condition, projection and sort strings into expression trees.
//!
//! The textual grammar is the one X protocol servers document for CRUD
//! criteria. Document mode reads bare identifiers as document paths; table
//! mode reads them as column references.
//!
//! ```rust
//! use mysqlx_client::expr::{compile, DataModel};
//!
//! let compiled = compile(
//!     Some("pages > :min AND title LIKE :pattern"),
//!     &[],
//!     &["pages DESC".to_string()],
//!     DataModel::Document,
//! )
//! .unwrap();
//! assert_eq!(compiled.placeholders, vec!["min", "pattern"]);
//! ```
//!
//! Compilation is pure: the same input always yields the same tree.

mod lexer;
mod parser;

pub use mysqlx_protocol::DataModel;
use mysqlx_protocol::{ColumnIdentifier, DocumentPathItem, Expr, Order, Projection};

use parser::Parser;

/// A syntax error in an expression string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at position {position}")]
pub struct ParseError {
    /// Byte offset in the input where the error was detected.
    pub position: usize,
    /// What went wrong.
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// The output of [`compile`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledExpression {
    /// Filter, if a non-blank condition was given.
    pub criteria: Option<Expr>,
    /// Projection list.
    pub projection: Vec<Projection>,
    /// Sort keys.
    pub order: Vec<Order>,
    /// Lower-cased placeholder names; `Expr::Placeholder(n)` indexes this.
    pub placeholders: Vec<String>,
}

/// Compiles several strings that share one placeholder table.
///
/// A statement's criteria, grouping, having clause and update values all
/// refer to the same `args` list, so they must be numbered together.
#[derive(Debug, Clone)]
pub struct Compiler {
    mode: DataModel,
    placeholders: Vec<String>,
}

impl Compiler {
    /// New compiler for the given data model.
    #[must_use]
    pub fn new(mode: DataModel) -> Self {
        Self {
            mode,
            placeholders: Vec::new(),
        }
    }

    /// Data model the compiler reads identifiers in.
    #[must_use]
    pub fn mode(&self) -> DataModel {
        self.mode
    }

    /// Parse a full expression.
    pub fn expression(&mut self, text: &str) -> Result<Expr, ParseError> {
        Parser::new(text, self.mode, &mut self.placeholders)?.expression()
    }

    /// Parse `expr [AS alias]`.
    pub fn projection(&mut self, text: &str) -> Result<Projection, ParseError> {
        Parser::new(text, self.mode, &mut self.placeholders)?.projection(text)
    }

    /// Parse `expr [ASC|DESC]`.
    pub fn order(&mut self, text: &str) -> Result<Order, ParseError> {
        Parser::new(text, self.mode, &mut self.placeholders)?.order()
    }

    /// Parse the target of an update operation.
    pub fn column_identifier(&mut self, text: &str) -> Result<ColumnIdentifier, ParseError> {
        Parser::new(text, self.mode, &mut self.placeholders)?.column_identifier()
    }

    /// Placeholder names seen so far, in order of first appearance.
    #[must_use]
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Consume the compiler, returning its placeholder table.
    #[must_use]
    pub fn into_placeholders(self) -> Vec<String> {
        self.placeholders
    }
}

/// Compile a condition with its projection and sort lists.
///
/// A missing or blank condition yields no criteria.
pub fn compile(
    condition: Option<&str>,
    projection: &[String],
    sort: &[String],
    mode: DataModel,
) -> Result<CompiledExpression, ParseError> {
    let mut compiler = Compiler::new(mode);

    let criteria = match condition.map(str::trim) {
        Some(text) if !text.is_empty() => Some(compiler.expression(text)?),
        _ => None,
    };
    let projection = projection
        .iter()
        .map(|p| compiler.projection(p))
        .collect::<Result<Vec<_>, _>>()?;
    let order = sort
        .iter()
        .map(|s| compiler.order(s))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CompiledExpression {
        criteria,
        projection,
        order,
        placeholders: compiler.into_placeholders(),
    })
}

/// Parse one expression on its own.
pub fn parse_expr(text: &str, mode: DataModel) -> Result<Expr, ParseError> {
    Compiler::new(mode).expression(text)
}

/// Parse one projection item on its own.
pub fn parse_projection(text: &str, mode: DataModel) -> Result<Projection, ParseError> {
    Compiler::new(mode).projection(text)
}

/// Parse one sort key on its own.
pub fn parse_order(text: &str, mode: DataModel) -> Result<Order, ParseError> {
    Compiler::new(mode).order(text)
}

/// Parse a document path such as `$.a.b[0]` or `a.*`.
///
/// `$` alone is the whole document and yields an empty path.
pub fn parse_document_path(text: &str) -> Result<Vec<DocumentPathItem>, ParseError> {
    let mut placeholders = Vec::new();
    Parser::new(text, DataModel::Document, &mut placeholders)?.document_path()
}

/// Parse an update target: a document path or a column reference.
pub fn parse_column_identifier(
    text: &str,
    mode: DataModel,
) -> Result<ColumnIdentifier, ParseError> {
    Compiler::new(mode).column_identifier(text)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mysqlx_protocol::{FunctionCall, Identifier, OrderDirection, Scalar};
    use proptest::prelude::*;

    fn doc(text: &str) -> Expr {
        parse_expr(text, DataModel::Document).unwrap()
    }

    fn table(text: &str) -> Expr {
        parse_expr(text, DataModel::Table).unwrap()
    }

    fn member(name: &str) -> Expr {
        Expr::Ident(ColumnIdentifier::path(vec![DocumentPathItem::Member(
            name.to_string(),
        )]))
    }

    #[test]
    fn test_true_is_literal() {
        assert_eq!(doc("true"), Expr::Literal(Scalar::Bool(true)));
        assert_eq!(doc("TRUE"), Expr::Literal(Scalar::Bool(true)));
    }

    #[test]
    fn test_precedence() {
        let expr = doc("a = 1 or b = 2 and not c");
        let expected = Expr::op(
            "||",
            vec![
                Expr::op("==", vec![member("a"), Expr::literal(1i64)]),
                Expr::op(
                    "&&",
                    vec![
                        Expr::op("==", vec![member("b"), Expr::literal(2i64)]),
                        Expr::op("not", vec![member("c")]),
                    ],
                ),
            ],
        );
        assert_eq!(expr, expected);

        assert_eq!(
            doc("1 + 2 * 3"),
            Expr::op(
                "+",
                vec![
                    Expr::literal(1i64),
                    Expr::op("*", vec![Expr::literal(2i64), Expr::literal(3i64)]),
                ],
            )
        );
    }

    #[test]
    fn test_operator_names() {
        assert_eq!(
            doc("a <> 1"),
            Expr::op("!=", vec![member("a"), Expr::literal(1i64)])
        );
        assert_eq!(
            doc("a IS NOT NULL"),
            Expr::op("is_not", vec![member("a"), Expr::Literal(Scalar::Null)])
        );
        assert_eq!(
            doc("a not in (1, 2)"),
            Expr::op(
                "not_in",
                vec![member("a"), Expr::literal(1i64), Expr::literal(2i64)]
            )
        );
        assert_eq!(
            doc("'x' in tags"),
            Expr::op("cont_in", vec![Expr::literal("x"), member("tags")])
        );
        assert_eq!(
            doc("a not like 'x%' escape '!'"),
            Expr::op(
                "not_like",
                vec![member("a"), Expr::literal("x%"), Expr::literal("!")]
            )
        );
        assert_eq!(
            doc("a between 1 and 5"),
            Expr::op(
                "between",
                vec![member("a"), Expr::literal(1i64), Expr::literal(5i64)]
            )
        );
        assert_eq!(
            doc("a mod 2"),
            Expr::op("%", vec![member("a"), Expr::literal(2i64)])
        );
        assert_eq!(doc("-a"), Expr::op("sign_minus", vec![member("a")]));
        assert_eq!(doc("-5"), Expr::Literal(Scalar::SInt(-5)));
        assert_eq!(doc("18446744073709551615"), Expr::Literal(Scalar::UInt(u64::MAX)));
    }

    #[test]
    fn test_placeholders_shared_and_lowercased() {
        let compiled = compile(
            Some("a = :Id or b = :other or c = :id"),
            &[],
            &[],
            DataModel::Document,
        )
        .unwrap();
        assert_eq!(compiled.placeholders, vec!["id", "other"]);
        let Some(Expr::Operator(op)) = compiled.criteria else {
            panic!("expected operator");
        };
        assert_eq!(op.name, "||");
        let criteria = Expr::Operator(op);
        assert_eq!(criteria.max_placeholder(), Some(1));
    }

    #[test]
    fn test_document_paths() {
        use DocumentPathItem::*;
        assert_eq!(
            parse_document_path("$.a.b[0]").unwrap(),
            vec![Member("a".into()), Member("b".into()), ArrayIndex(0)]
        );
        assert_eq!(
            parse_document_path("a[*].*").unwrap(),
            vec![Member("a".into()), ArrayIndexAsterisk, MemberAsterisk]
        );
        assert_eq!(
            parse_document_path("a**.b").unwrap(),
            vec![Member("a".into()), DoubleAsterisk, Member("b".into())]
        );
        assert_eq!(
            parse_document_path("`my field`.x").unwrap(),
            vec![Member("my field".into()), Member("x".into())]
        );
        assert!(parse_document_path("$").unwrap().is_empty());
        assert!(parse_document_path("a**").is_err());
    }

    #[test]
    fn test_table_columns_and_json() {
        assert_eq!(
            table("s.t.c = 1"),
            Expr::op(
                "==",
                vec![
                    Expr::Ident(ColumnIdentifier {
                        document_path: vec![],
                        name: Some("c".into()),
                        table_name: Some("t".into()),
                        schema_name: Some("s".into()),
                    }),
                    Expr::literal(1i64),
                ],
            )
        );

        let Expr::Ident(ident) = table("doc->'$.a[1]'") else {
            panic!("expected identifier");
        };
        assert_eq!(ident.name.as_deref(), Some("doc"));
        assert_eq!(
            ident.document_path,
            vec![
                DocumentPathItem::Member("a".into()),
                DocumentPathItem::ArrayIndex(1)
            ]
        );

        let Expr::FuncCall(call) = table("doc->>'$.a'") else {
            panic!("expected JSON_UNQUOTE");
        };
        assert_eq!(call.name.name, "JSON_UNQUOTE");
    }

    #[test]
    fn test_function_calls() {
        assert_eq!(
            table("count(*)"),
            Expr::FuncCall(FunctionCall {
                name: Identifier {
                    name: "count".into(),
                    schema_name: None,
                },
                params: vec![Expr::literal("*")],
            })
        );
        let Expr::FuncCall(call) = doc("mysql.concat(a, 'x')") else {
            panic!("expected call");
        };
        assert_eq!(call.name.schema_name.as_deref(), Some("mysql"));
        assert_eq!(call.params.len(), 2);
    }

    #[test]
    fn test_arrays_and_objects() {
        assert_eq!(
            doc("[1, 'a']"),
            Expr::Array(vec![Expr::literal(1i64), Expr::literal("a")])
        );
        assert_eq!(
            doc("{'k': :v, n: 2}"),
            Expr::Object(vec![
                ("k".into(), Expr::Placeholder(0)),
                ("n".into(), Expr::literal(2i64)),
            ])
        );
    }

    #[test]
    fn test_projection_and_order() {
        let p = parse_projection("pages * 2 AS double", DataModel::Document).unwrap();
        assert_eq!(p.alias.as_deref(), Some("double"));
        let p = parse_projection(" title ", DataModel::Document).unwrap();
        assert_eq!(p.alias.as_deref(), Some("title"));
        let p = parse_projection("title", DataModel::Table).unwrap();
        assert_eq!(p.alias, None);

        let o = parse_order("pages desc", DataModel::Document).unwrap();
        assert_eq!(o.direction, OrderDirection::Desc);
        let o = parse_order("pages", DataModel::Document).unwrap();
        assert_eq!(o.direction, OrderDirection::Asc);
    }

    #[test]
    fn test_errors_carry_position() {
        let err = parse_expr("a = ", DataModel::Document).unwrap_err();
        assert_eq!(err.position, 4);
        let err = parse_expr("a = 1 )", DataModel::Document).unwrap_err();
        assert_eq!(err.position, 6);
        assert!(parse_expr("cast(a AS signed)", DataModel::Table).is_err());
        assert!(parse_expr("a is 5", DataModel::Document).is_err());
    }

    #[test]
    fn test_blank_condition_has_no_criteria() {
        let compiled = compile(Some("   "), &[], &[], DataModel::Document).unwrap();
        assert!(compiled.criteria.is_none());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(parse_expr(&deep, DataModel::Document).is_err());
    }

    fn condition() -> impl Strategy<Value = String> {
        let leaf = prop_oneof![
            "[a-z]{1,6}",
            (0u32..1000).prop_map(|n| n.to_string()),
            "[a-z]{1,4}".prop_map(|s| format!(":{s}")),
            "[a-z ]{0,5}".prop_map(|s| format!("'{s}'")),
        ];
        leaf.prop_recursive(4, 32, 2, |inner| {
            (
                inner.clone(),
                prop::sample::select(vec![
                    "=", "!=", "<", ">=", "and", "or", "+", "*", "like",
                ]),
                inner,
            )
                .prop_map(|(l, op, r)| format!("({l} {op} {r})"))
        })
    }

    proptest! {
        #[test]
        fn compile_is_deterministic(text in condition()) {
            let first = compile(Some(&text), &[], &[], DataModel::Document);
            let second = compile(Some(&text), &[], &[], DataModel::Document);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn compile_never_panics(text in "\\PC{0,40}") {
            let _ = compile(Some(&text), &[], &[], DataModel::Table);
        }
    }
}
