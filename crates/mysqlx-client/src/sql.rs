//! Raw SQL statements.

use mysqlx_protocol::{Any, ClientMessage, StmtExecute};
use mysqlx_types::Value;

use crate::error::{Error, Result};
use crate::result::SqlResult;
use crate::session::Session;

/// A SQL statement with positional `?` arguments.
///
/// ```rust,ignore
/// let mut result = session
///     .sql("SELECT title FROM library.books WHERE pages > ?")
///     .bind(300)
///     .execute()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct SqlStatement {
    session: Session,
    text: String,
    args: Vec<Value>,
}

impl SqlStatement {
    pub(crate) fn new(session: Session, text: impl Into<String>) -> Self {
        Self {
            session,
            text: text.into(),
            args: Vec::new(),
        }
    }

    /// Append the value for the next `?`.
    #[must_use]
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Forget every bound argument.
    #[must_use]
    pub fn clear_bindings(mut self) -> Self {
        self.args.clear();
        self
    }

    /// Statement text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Arguments bound so far.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Run the statement.
    pub async fn execute(&self) -> Result<SqlResult> {
        if self.text.trim().is_empty() {
            return Err(Error::invalid_argument("SQL statement text is empty"));
        }
        let args = self
            .args
            .iter()
            .map(|value| Any::Scalar(value.to_scalar()))
            .collect();
        let stream = self
            .session
            .execute(ClientMessage::StmtExecute(StmtExecute::sql(
                self.text.as_str(),
                args,
            )))
            .await?;
        SqlResult::open(stream).await
    }
}

/// Quote an identifier with backticks.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a string literal with single quotes.
pub(crate) fn quote_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("books"), "`books`");
        assert_eq!(quote_identifier("odd`name"), "`odd``name`");
    }

    #[test]
    fn test_quote_string() {
        assert_eq!(quote_string("it's"), "'it''s'");
        assert_eq!(quote_string(r"a\b"), r"'a\\b'");
    }
}
