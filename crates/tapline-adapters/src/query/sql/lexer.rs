//! SQL Lexer.

use tapline_common::utils::error::SourceSpan;

/// A token in the SQL language.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The token kind.
    pub kind: TokenKind,
    /// The source text.
    pub text: String,
    /// Source span.
    pub span: SourceSpan,
}

/// Token kinds in SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    /// SELECT keyword.
    Select,
    /// FROM keyword.
    From,
    /// WHERE keyword.
    Where,
    /// AND keyword.
    And,
    /// OR keyword.
    Or,
    /// NOT keyword.
    Not,
    /// IN keyword.
    In,
    /// LIKE keyword.
    Like,
    /// LIMIT keyword.
    Limit,
    /// TRUE keyword.
    True,
    /// FALSE keyword.
    False,

    // Literals
    /// Integer literal.
    Integer,
    /// Float literal.
    Float,
    /// String literal, unescaped.
    String,

    // Identifiers
    /// Bare identifier.
    Identifier,
    /// Double-quoted identifier, unescaped.
    QuotedIdentifier,

    // Operators
    /// =
    Eq,
    /// <> or !=
    Ne,
    /// <
    Lt,
    /// <=
    Le,
    /// >
    Gt,
    /// >=
    Ge,

    // Punctuation
    /// (
    LParen,
    /// )
    RParen,
    /// ,
    Comma,
    /// *
    Star,
    /// ;
    Semicolon,

    /// End of input.
    Eof,
    /// Unrecognized or unterminated input.
    Error,
}

/// SQL Lexer.
pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// Returns the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let start = self.position;
        let start_line = self.line;
        let start_column = self.column;

        let Some(ch) = self.current_char() else {
            return self.make_token(TokenKind::Eof, String::new(), start, start_line, start_column);
        };

        let (kind, text) = match ch {
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            ',' => self.single(TokenKind::Comma),
            '*' => self.single(TokenKind::Star),
            ';' => self.single(TokenKind::Semicolon),
            '=' => self.single(TokenKind::Eq),
            '<' => {
                self.advance();
                match self.current_char() {
                    Some('=') => {
                        self.advance();
                        (TokenKind::Le, "<=".to_string())
                    }
                    Some('>') => {
                        self.advance();
                        (TokenKind::Ne, "<>".to_string())
                    }
                    _ => (TokenKind::Lt, "<".to_string()),
                }
            }
            '>' => {
                self.advance();
                if self.current_char() == Some('=') {
                    self.advance();
                    (TokenKind::Ge, ">=".to_string())
                } else {
                    (TokenKind::Gt, ">".to_string())
                }
            }
            '!' => {
                self.advance();
                if self.current_char() == Some('=') {
                    self.advance();
                    (TokenKind::Ne, "!=".to_string())
                } else {
                    (TokenKind::Error, "!".to_string())
                }
            }
            '\'' => self.scan_quoted('\'', TokenKind::String),
            '"' => self.scan_quoted('"', TokenKind::QuotedIdentifier),
            '-' if self.peek_char().is_some_and(|c| c.is_ascii_digit()) => {
                self.advance();
                let (kind, digits) = self.scan_number();
                (kind, format!("-{digits}"))
            }
            c if c.is_ascii_digit() => self.scan_number(),
            c if c.is_alphabetic() || c == '_' => self.scan_identifier(),
            c => {
                self.advance();
                (TokenKind::Error, c.to_string())
            }
        };

        self.make_token(kind, text, start, start_line, start_column)
    }

    fn make_token(
        &self,
        kind: TokenKind,
        text: String,
        start: usize,
        line: usize,
        column: usize,
    ) -> Token {
        Token {
            kind,
            text,
            span: SourceSpan::new(start, self.position, line, column),
        }
    }

    fn single(&mut self, kind: TokenKind) -> (TokenKind, String) {
        let ch = self.current_char().unwrap_or_default();
        self.advance();
        (kind, ch.to_string())
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else if ch == '-' && self.peek_char() == Some('-') {
                // Line comment
                while let Some(c) = self.current_char() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    /// Scans a quoted string where a doubled quote stands for itself.
    fn scan_quoted(&mut self, quote: char, kind: TokenKind) -> (TokenKind, String) {
        self.advance();
        let mut text = String::new();
        loop {
            match self.current_char() {
                None => return (TokenKind::Error, text),
                Some(c) if c == quote => {
                    self.advance();
                    if self.current_char() == Some(quote) {
                        text.push(quote);
                        self.advance();
                    } else {
                        return (kind, text);
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }
    }

    fn scan_number(&mut self) -> (TokenKind, String) {
        let start = self.position;
        let mut kind = TokenKind::Integer;
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                self.advance();
            } else if ch == '.' && kind == TokenKind::Integer {
                kind = TokenKind::Float;
                self.advance();
            } else {
                break;
            }
        }
        (kind, self.input[start..self.position].to_string())
    }

    fn scan_identifier(&mut self) -> (TokenKind, String) {
        let start = self.position;
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' || ch == '$' {
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.input[start..self.position];
        let kind = match text.to_uppercase().as_str() {
            "SELECT" => TokenKind::Select,
            "FROM" => TokenKind::From,
            "WHERE" => TokenKind::Where,
            "AND" => TokenKind::And,
            "OR" => TokenKind::Or,
            "NOT" => TokenKind::Not,
            "IN" => TokenKind::In,
            "LIKE" => TokenKind::Like,
            "LIMIT" => TokenKind::Limit,
            "TRUE" => TokenKind::True,
            "FALSE" => TokenKind::False,
            _ => TokenKind::Identifier,
        };
        (kind, text.to_string())
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn peek_char(&self) -> Option<char> {
        let mut chars = self.input[self.position..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.position += ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}
