//! Recursive-descent parser producing protocol expression trees.
//!
//! Precedence, lowest first:
//!
//! ```text
//! or  ||
//! and &&
//! not
//! is, in, like, between, regexp
//! = == != <> < <= > >=
//! | & ^
//! << >>
//! + -
//! * / div % mod
//! unary - + ! ~
//! atom
//! ```

use mysqlx_protocol::{
    ColumnIdentifier, DataModel, DocumentPathItem, Expr, FunctionCall, Identifier, Order,
    OrderDirection, Projection, Scalar,
};

use super::ParseError;
use super::lexer::{Lexer, Spanned, Token};

/// Deepest nesting accepted, matching what the protocol decoder accepts.
const MAX_DEPTH: usize = 100;

pub(crate) struct Parser<'p> {
    tokens: Vec<Spanned>,
    pos: usize,
    mode: DataModel,
    placeholders: &'p mut Vec<String>,
    depth: usize,
}

impl<'p> Parser<'p> {
    pub(crate) fn new(
        input: &str,
        mode: DataModel,
        placeholders: &'p mut Vec<String>,
    ) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: Lexer::new(input).tokenize()?,
            pos: 0,
            mode,
            placeholders,
            depth: 0,
        })
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    pub(crate) fn expression(mut self) -> Result<Expr, ParseError> {
        let expr = self.expr()?;
        self.expect_end()?;
        Ok(expr)
    }

    pub(crate) fn projection(mut self, text: &str) -> Result<Projection, ParseError> {
        let source = self.expr()?;
        let alias = if self.eat(&Token::As) {
            Some(self.name()?)
        } else {
            None
        };
        self.expect_end()?;

        // Document projections build an object; every member needs a key.
        let alias = match (alias, self.mode) {
            (Some(alias), _) => Some(alias),
            (None, DataModel::Document) => Some(text.trim().to_string()),
            (None, DataModel::Table) => None,
        };
        Ok(Projection { source, alias })
    }

    pub(crate) fn order(mut self) -> Result<Order, ParseError> {
        let expr = self.expr()?;
        let direction = if self.eat(&Token::Desc) {
            OrderDirection::Desc
        } else {
            self.eat(&Token::Asc);
            OrderDirection::Asc
        };
        self.expect_end()?;
        Ok(Order { expr, direction })
    }

    pub(crate) fn document_path(mut self) -> Result<Vec<DocumentPathItem>, ParseError> {
        let path = if self.eat(&Token::Dollar) {
            self.path_tail()?
        } else {
            self.path_from_start()?
        };
        self.expect_end()?;
        Ok(path)
    }

    pub(crate) fn column_identifier(mut self) -> Result<ColumnIdentifier, ParseError> {
        let ident = match self.mode {
            DataModel::Document => {
                let path = if self.eat(&Token::Dollar) {
                    self.path_tail()?
                } else {
                    self.path_from_start()?
                };
                ColumnIdentifier::path(path)
            }
            DataModel::Table => {
                let first = self.name()?;
                self.column_reference(first)?
            }
        };
        self.expect_end()?;
        Ok(ident)
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let index = (self.pos + offset).min(self.tokens.len().saturating_sub(1));
        self.tokens
            .get(index)
            .map_or(&Token::Eof, |spanned| &spanned.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |spanned| spanned.position)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), ParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn expect_end(&self) -> Result<(), ParseError> {
        if *self.peek() == Token::Eof {
            Ok(())
        } else {
            Err(self.error("unexpected trailing input"))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.position(), message)
    }

    /// An identifier, quoted identifier, or keyword used as a name.
    fn name(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Ident(name) | Token::QuotedIdent(name) => {
                self.advance();
                Ok(name)
            }
            Token::Str(name) => {
                self.advance();
                Ok(name)
            }
            other => match other.keyword_text() {
                Some(text) => {
                    self.advance();
                    Ok(text.to_string())
                }
                None => Err(self.error("expected a name")),
            },
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ------------------------------------------------------------------
    // Expression grammar
    // ------------------------------------------------------------------

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let expr = self.or_expr();
        self.leave();
        expr
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and_expr()?;
        while matches!(self.peek(), Token::Or | Token::OrOr) {
            self.advance();
            let right = self.and_expr()?;
            left = Expr::op("||", vec![left, right]);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.not_expr()?;
        while matches!(self.peek(), Token::And | Token::AndAnd) {
            self.advance();
            let right = self.not_expr()?;
            left = Expr::op("&&", vec![left, right]);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Not) {
            self.enter()?;
            let operand = self.not_expr();
            self.leave();
            return Ok(Expr::op("not", vec![operand?]));
        }
        self.predicate()
    }

    fn predicate(&mut self) -> Result<Expr, ParseError> {
        let left = self.comparison()?;

        if self.eat(&Token::Is) {
            let negated = self.eat(&Token::Not);
            let operand = match self.advance() {
                Token::Null => Expr::Literal(Scalar::Null),
                Token::True => Expr::Literal(Scalar::Bool(true)),
                Token::False => Expr::Literal(Scalar::Bool(false)),
                _ => return Err(self.error("expected NULL, TRUE or FALSE after IS")),
            };
            let name = if negated { "is_not" } else { "is" };
            return Ok(Expr::op(name, vec![left, operand]));
        }

        let negated = matches!(
            (self.peek(), self.peek_at(1)),
            (Token::Not, Token::In | Token::Like | Token::Between | Token::Regexp)
        );
        if negated {
            self.advance();
        }
        let prefix = if negated { "not_" } else { "" };

        match self.peek() {
            Token::In => {
                self.advance();
                if self.eat(&Token::LParen) {
                    let mut params = vec![left];
                    if !self.eat(&Token::RParen) {
                        params.extend(self.expr_list()?);
                        self.expect(&Token::RParen, "')' after IN list")?;
                    }
                    Ok(Expr::op(format!("{prefix}in"), params))
                } else {
                    // `x IN <array or document>` is JSON containment.
                    let right = self.comparison()?;
                    Ok(Expr::op(format!("{prefix}cont_in"), vec![left, right]))
                }
            }
            Token::Like => {
                self.advance();
                let pattern = self.comparison()?;
                let mut params = vec![left, pattern];
                if self.eat(&Token::Escape) {
                    params.push(self.comparison()?);
                }
                Ok(Expr::op(format!("{prefix}like"), params))
            }
            Token::Between => {
                self.advance();
                let low = self.comparison()?;
                self.expect(&Token::And, "AND in BETWEEN")?;
                let high = self.comparison()?;
                Ok(Expr::op(format!("{prefix}between"), vec![left, low, high]))
            }
            Token::Regexp => {
                self.advance();
                let pattern = self.comparison()?;
                Ok(Expr::op(format!("{prefix}regexp"), vec![left, pattern]))
            }
            _ => Ok(left),
        }
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.bitwise()?;
        loop {
            let name = match self.peek() {
                Token::Eq | Token::EqEq => "==",
                Token::Ne => "!=",
                Token::Lt => "<",
                Token::Le => "<=",
                Token::Gt => ">",
                Token::Ge => ">=",
                _ => return Ok(left),
            };
            self.advance();
            let right = self.bitwise()?;
            left = Expr::op(name, vec![left, right]);
        }
    }

    fn bitwise(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.shift()?;
        loop {
            let name = match self.peek() {
                Token::Pipe => "|",
                Token::Amp => "&",
                Token::Caret => "^",
                _ => return Ok(left),
            };
            self.advance();
            let right = self.shift()?;
            left = Expr::op(name, vec![left, right]);
        }
    }

    fn shift(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.additive()?;
        loop {
            let name = match self.peek() {
                Token::Shl => "<<",
                Token::Shr => ">>",
                _ => return Ok(left),
            };
            self.advance();
            let right = self.additive()?;
            left = Expr::op(name, vec![left, right]);
        }
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.multiplicative()?;
        loop {
            let name = match self.peek() {
                Token::Plus => "+",
                Token::Minus => "-",
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = Expr::op(name, vec![left, right]);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let name = match self.peek() {
                Token::Star => "*",
                Token::Slash => "/",
                Token::Div => "div",
                Token::Percent | Token::Mod => "%",
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = Expr::op(name, vec![left, right]);
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let name = match self.peek() {
            Token::Minus => "sign_minus",
            Token::Plus => "sign_plus",
            Token::Bang => "!",
            Token::Tilde => "~",
            _ => return self.atom(),
        };
        self.advance();

        // Fold negative number literals.
        if name == "sign_minus" {
            match self.peek().clone() {
                Token::Int(n) if n <= i64::MAX as u64 + 1 => {
                    self.advance();
                    let value = if n == i64::MAX as u64 + 1 {
                        i64::MIN
                    } else {
                        -(n as i64)
                    };
                    return Ok(Expr::Literal(Scalar::SInt(value)));
                }
                Token::Float(f) => {
                    self.advance();
                    return Ok(Expr::Literal(Scalar::Double(-f)));
                }
                _ => {}
            }
        }

        self.enter()?;
        let operand = self.unary();
        self.leave();
        Ok(Expr::op(name, vec![operand?]))
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            Token::Int(n) => {
                self.advance();
                Ok(Expr::Literal(match i64::try_from(n) {
                    Ok(v) => Scalar::SInt(v),
                    Err(_) => Scalar::UInt(n),
                }))
            }
            Token::Float(f) => {
                self.advance();
                Ok(Expr::Literal(Scalar::Double(f)))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Scalar::String(s)))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Literal(Scalar::Bool(true)))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Literal(Scalar::Bool(false)))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Literal(Scalar::Null))
            }
            Token::Placeholder(name) => {
                self.advance();
                Ok(Expr::Placeholder(self.placeholder_index(name)?))
            }
            Token::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => {
                self.advance();
                let items = if self.eat(&Token::RBracket) {
                    Vec::new()
                } else {
                    let items = self.expr_list()?;
                    self.expect(&Token::RBracket, "']'")?;
                    items
                };
                Ok(Expr::Array(items))
            }
            Token::LBrace => {
                self.advance();
                self.object()
            }
            Token::Dollar if self.mode == DataModel::Document => {
                self.advance();
                Ok(Expr::Ident(ColumnIdentifier::path(self.path_tail()?)))
            }
            Token::Ident(name) if name.eq_ignore_ascii_case("cast") => {
                Err(self.error("CAST is not supported"))
            }
            Token::Ident(_) | Token::QuotedIdent(_) => self.identifier_or_call(),
            Token::Star | Token::DoubleStar if self.mode == DataModel::Document => {
                Ok(Expr::Ident(ColumnIdentifier::path(self.path_from_start()?)))
            }
            Token::Eof => Err(self.error("unexpected end of expression")),
            _ => Err(self.error("unexpected token")),
        }
    }

    fn expr_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut items = vec![self.expr()?];
        while self.eat(&Token::Comma) {
            items.push(self.expr()?);
        }
        Ok(items)
    }

    fn object(&mut self) -> Result<Expr, ParseError> {
        let mut fields = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(Expr::Object(fields));
        }
        loop {
            let key = self.name()?;
            self.expect(&Token::Colon, "':' after object key")?;
            fields.push((key, self.expr()?));
            if self.eat(&Token::RBrace) {
                return Ok(Expr::Object(fields));
            }
            self.expect(&Token::Comma, "',' or '}' in object")?;
        }
    }

    fn placeholder_index(&mut self, name: String) -> Result<u32, ParseError> {
        let index = match self.placeholders.iter().position(|p| *p == name) {
            Some(index) => index,
            None => {
                self.placeholders.push(name);
                self.placeholders.len() - 1
            }
        };
        u32::try_from(index).map_err(|_| self.error("too many placeholders"))
    }

    // ------------------------------------------------------------------
    // Identifiers, function calls and paths
    // ------------------------------------------------------------------

    fn identifier_or_call(&mut self) -> Result<Expr, ParseError> {
        let is_call = matches!(self.peek(), Token::Ident(_))
            && (*self.peek_at(1) == Token::LParen
                || (*self.peek_at(1) == Token::Dot
                    && matches!(self.peek_at(2), Token::Ident(_))
                    && *self.peek_at(3) == Token::LParen));
        if is_call {
            return self.function_call();
        }

        match self.mode {
            DataModel::Document => Ok(Expr::Ident(ColumnIdentifier::path(
                self.path_from_start()?,
            ))),
            DataModel::Table => {
                let first = self.name()?;
                let ident = self.column_reference(first)?;
                self.json_extraction(ident)
            }
        }
    }

    fn function_call(&mut self) -> Result<Expr, ParseError> {
        let first = self.name()?;
        let name = if self.eat(&Token::Dot) {
            Identifier {
                name: self.name()?,
                schema_name: Some(first),
            }
        } else {
            Identifier {
                name: first,
                schema_name: None,
            }
        };
        self.expect(&Token::LParen, "'('")?;
        let params = if self.eat(&Token::RParen) {
            Vec::new()
        } else if *self.peek() == Token::Star && *self.peek_at(1) == Token::RParen {
            // COUNT(*)
            self.advance();
            self.advance();
            vec![Expr::Literal(Scalar::String("*".to_string()))]
        } else {
            let params = self.expr_list()?;
            self.expect(&Token::RParen, "')' after arguments")?;
            params
        };
        Ok(Expr::FuncCall(FunctionCall { name, params }))
    }

    /// `col`, `tbl.col` or `schema.tbl.col`, with the first part consumed.
    fn column_reference(&mut self, first: String) -> Result<ColumnIdentifier, ParseError> {
        let mut parts = vec![first];
        while parts.len() < 3 && *self.peek() == Token::Dot {
            self.advance();
            parts.push(self.name()?);
        }
        let mut parts = parts.into_iter().rev();
        let name = parts.next();
        let table_name = parts.next();
        let schema_name = parts.next();

        Ok(ColumnIdentifier {
            document_path: Vec::new(),
            name,
            table_name,
            schema_name,
        })
    }

    /// `col->'$.path'` and `col->>'$.path'`.
    fn json_extraction(&mut self, mut ident: ColumnIdentifier) -> Result<Expr, ParseError> {
        let unquote = match self.peek() {
            Token::Arrow => false,
            Token::DoubleArrow => true,
            _ => return Ok(Expr::Ident(ident)),
        };
        self.advance();

        let path_text = match self.advance() {
            Token::Str(text) | Token::QuotedIdent(text) => text,
            _ => return Err(self.error("expected a quoted document path after '->'")),
        };
        let mut nested = Vec::new();
        ident.document_path =
            Parser::new(&path_text, DataModel::Document, &mut nested)?.document_path()?;
        if ident.document_path.is_empty() {
            return Err(self.error("empty document path after '->'"));
        }

        let expr = Expr::Ident(ident);
        if unquote {
            Ok(Expr::FuncCall(FunctionCall {
                name: Identifier {
                    name: "JSON_UNQUOTE".to_string(),
                    schema_name: None,
                },
                params: vec![expr],
            }))
        } else {
            Ok(expr)
        }
    }

    /// A document path starting with a member, `*` or `**`.
    fn path_from_start(&mut self) -> Result<Vec<DocumentPathItem>, ParseError> {
        let mut path = Vec::new();
        match self.peek().clone() {
            Token::Star => {
                self.advance();
                path.push(DocumentPathItem::MemberAsterisk);
            }
            Token::DoubleStar => {
                self.advance();
                path.push(DocumentPathItem::DoubleAsterisk);
            }
            _ => path.push(DocumentPathItem::Member(self.name()?)),
        }
        path.extend(self.path_tail()?);
        if path.last() == Some(&DocumentPathItem::DoubleAsterisk) {
            return Err(self.error("a document path cannot end with '**'"));
        }
        Ok(path)
    }

    /// Path steps after the start: `.member`, `.*`, `[n]`, `[*]`, `**`.
    fn path_tail(&mut self) -> Result<Vec<DocumentPathItem>, ParseError> {
        let mut path = Vec::new();
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    if self.eat(&Token::Star) {
                        path.push(DocumentPathItem::MemberAsterisk);
                    } else {
                        path.push(DocumentPathItem::Member(self.name()?));
                    }
                }
                Token::LBracket => {
                    self.advance();
                    if self.eat(&Token::Star) {
                        path.push(DocumentPathItem::ArrayIndexAsterisk);
                    } else {
                        match self.advance() {
                            Token::Int(n) => {
                                let index = u32::try_from(n)
                                    .map_err(|_| self.error("array index out of range"))?;
                                path.push(DocumentPathItem::ArrayIndex(index));
                            }
                            _ => return Err(self.error("expected an array index")),
                        }
                    }
                    self.expect(&Token::RBracket, "']'")?;
                }
                Token::DoubleStar => {
                    self.advance();
                    path.push(DocumentPathItem::DoubleAsterisk);
                }
                _ => break,
            }
        }
        if path.last() == Some(&DocumentPathItem::DoubleAsterisk) {
            return Err(self.error("a document path cannot end with '**'"));
        }
        Ok(path)
    }
}
