//! Tokenizer for condition, projection and sort strings.

use super::ParseError;

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub(crate) token: Token,
    pub(crate) position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    // Keywords
    And,
    Or,
    Not,
    Is,
    In,
    Like,
    Escape,
    Between,
    Regexp,
    Div,
    Mod,
    As,
    Asc,
    Desc,
    Null,
    True,
    False,

    // Literals and names
    Ident(String),
    QuotedIdent(String),
    Str(String),
    Int(u64),
    Float(f64),
    Placeholder(String),

    // Operators
    Eq,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Tilde,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    Percent,
    Arrow,
    DoubleArrow,

    // Delimiters
    Dot,
    Comma,
    Colon,
    Dollar,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    Eof,
}

impl Token {
    fn keyword(word: &str) -> Option<Self> {
        Some(match word.to_ascii_lowercase().as_str() {
            "and" => Self::And,
            "or" => Self::Or,
            "not" => Self::Not,
            "is" => Self::Is,
            "in" => Self::In,
            "like" => Self::Like,
            "escape" => Self::Escape,
            "between" => Self::Between,
            "regexp" => Self::Regexp,
            "div" => Self::Div,
            "mod" => Self::Mod,
            "as" => Self::As,
            "asc" => Self::Asc,
            "desc" => Self::Desc,
            "null" => Self::Null,
            "true" => Self::True,
            "false" => Self::False,
            _ => return None,
        })
    }

    /// Text of a keyword, for contexts where keywords are plain names.
    pub(crate) fn keyword_text(&self) -> Option<&'static str> {
        Some(match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::Is => "is",
            Self::In => "in",
            Self::Like => "like",
            Self::Escape => "escape",
            Self::Between => "between",
            Self::Regexp => "regexp",
            Self::Div => "div",
            Self::Mod => "mod",
            Self::As => "as",
            Self::Asc => "asc",
            Self::Desc => "desc",
            Self::Null => "null",
            Self::True => "true",
            Self::False => "false",
            _ => return None,
        })
    }
}

pub(crate) struct Lexer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    /// Tokenize the whole input. The last token is always `Eof`.
    pub(crate) fn tokenize(mut self) -> Result<Vec<Spanned>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn next_token(&mut self) -> Result<Spanned, ParseError> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }

        let Some(&(position, c)) = self.chars.peek() else {
            return Ok(Spanned {
                token: Token::Eof,
                position: self.input.len(),
            });
        };

        let token = match c {
            '\'' | '"' => {
                self.bump();
                Token::Str(self.quoted(c, position)?)
            }
            '`' => {
                self.bump();
                Token::QuotedIdent(self.quoted('`', position)?)
            }
            ':' => {
                self.bump();
                if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
                    Token::Placeholder(self.word().to_ascii_lowercase())
                } else {
                    Token::Colon
                }
            }
            c if c.is_ascii_digit() => self.number(position)?,
            '.' if self.digit_follows_dot() => self.number(position)?,
            c if c.is_alphabetic() || c == '_' => {
                let word = self.word();
                Token::keyword(&word).unwrap_or(Token::Ident(word))
            }
            _ => {
                self.bump();
                self.punctuation(c, position)?
            }
        };

        Ok(Spanned { token, position })
    }

    fn punctuation(&mut self, c: char, position: usize) -> Result<Token, ParseError> {
        Ok(match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ',' => Token::Comma,
            '.' => Token::Dot,
            '$' => Token::Dollar,
            '+' => Token::Plus,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '^' => Token::Caret,
            '~' => Token::Tilde,
            '*' if self.eat('*') => Token::DoubleStar,
            '*' => Token::Star,
            '-' if self.eat('>') => {
                if self.eat('>') {
                    Token::DoubleArrow
                } else {
                    Token::Arrow
                }
            }
            '-' => Token::Minus,
            '=' if self.eat('=') => Token::EqEq,
            '=' => Token::Eq,
            '!' if self.eat('=') => Token::Ne,
            '!' => Token::Bang,
            '<' if self.eat('=') => Token::Le,
            '<' if self.eat('>') => Token::Ne,
            '<' if self.eat('<') => Token::Shl,
            '<' => Token::Lt,
            '>' if self.eat('=') => Token::Ge,
            '>' if self.eat('>') => Token::Shr,
            '>' => Token::Gt,
            '&' if self.eat('&') => Token::AndAnd,
            '&' => Token::Amp,
            '|' if self.eat('|') => Token::OrOr,
            '|' => Token::Pipe,
            other => {
                return Err(ParseError::new(
                    position,
                    format!("unexpected character '{other}'"),
                ));
            }
        })
    }

    fn digit_follows_dot(&self) -> bool {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next().is_some_and(|(_, c)| c.is_ascii_digit())
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        word
    }

    /// A quoted string or identifier. Backslash escapes apply to strings;
    /// a doubled quote stands for itself in both.
    fn quoted(&mut self, quote: char, start: usize) -> Result<String, ParseError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(ParseError::new(start, "unterminated quoted text"));
                }
                Some(c) if c == quote => {
                    if self.eat(quote) {
                        out.push(quote);
                    } else {
                        return Ok(out);
                    }
                }
                Some('\\') if quote != '`' => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some('b') => out.push('\u{8}'),
                    Some('Z') => out.push('\u{1a}'),
                    Some(other) => out.push(other),
                    None => {
                        return Err(ParseError::new(start, "unterminated quoted text"));
                    }
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn number(&mut self, start: usize) -> Result<Token, ParseError> {
        let mut text = String::new();
        let mut is_float = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else if c == '.' && !is_float {
                is_float = true;
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            text.push('e');
            self.bump();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.bump();
            }
            let digits_start = text.len();
            while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                text.push(c);
                self.bump();
            }
            if text.len() == digits_start {
                return Err(ParseError::new(start, "malformed exponent"));
            }
        }

        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|e| ParseError::new(start, format!("invalid number '{text}': {e}")))
        } else {
            text.parse::<u64>()
                .map(Token::Int)
                .map_err(|e| ParseError::new(start, format!("invalid number '{text}': {e}")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("a <> b != c <= d << e ->> f -> g"),
            vec![
                Token::Ident("a".into()),
                Token::Ne,
                Token::Ident("b".into()),
                Token::Ne,
                Token::Ident("c".into()),
                Token::Le,
                Token::Ident("d".into()),
                Token::Shl,
                Token::Ident("e".into()),
                Token::DoubleArrow,
                Token::Ident("f".into()),
                Token::Arrow,
                Token::Ident("g".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(
            tokens("NOT Like IS null"),
            vec![Token::Not, Token::Like, Token::Is, Token::Null, Token::Eof]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            tokens(r#"'it''s' "a\"b" 'x\ny'"#),
            vec![
                Token::Str("it's".into()),
                Token::Str("a\"b".into()),
                Token::Str("x\ny".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("12 1.5 .5 2e3 18446744073709551615"),
            vec![
                Token::Int(12),
                Token::Float(1.5),
                Token::Float(0.5),
                Token::Float(2000.0),
                Token::Int(u64::MAX),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_placeholder_lowercased() {
        assert_eq!(
            tokens(":Name"),
            vec![Token::Placeholder("name".into()), Token::Eof]
        );
    }

    #[test]
    fn test_unterminated_string_position() {
        let err = Lexer::new("a = 'open").tokenize().unwrap_err();
        assert_eq!(err.position, 4);
    }

    #[test]
    fn test_unexpected_character() {
        let err = Lexer::new("a # b").tokenize().unwrap_err();
        assert_eq!(err.position, 2);
    }
}
