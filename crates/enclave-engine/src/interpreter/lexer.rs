//! Tokenizer for the script language
//!
//! Newlines end statements except inside brackets, where they are plain
//! whitespace. `#` starts a comment that runs to the end of the line.

use enclave_core::errors::ExErrorKind;
use enclave_core::plan::SourcePosition;

use crate::errors::InterpretationError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Assign,
    Plus,
    Minus,
    Newline,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Int(_) | TokenKind::Float(_) => "number".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::Assign => "'='".to_string(),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Newline => "newline".to_string(),
            TokenKind::Eof => "end of file".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
}

pub struct Lexer<'a> {
    locator: &'a str,
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    depth: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(locator: &'a str, source: &str) -> Self {
        Self {
            locator,
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            depth: 0,
            tokens: Vec::new(),
        }
    }

    /// Tokenize the whole source; the last token is always `Eof`
    ///
    /// # Errors
    ///
    /// `Syntax` for unterminated strings, unknown characters, bad numbers
    /// and unbalanced closing brackets.
    pub fn tokenize(mut self) -> Result<Vec<Token>, InterpretationError> {
        while let Some(c) = self.peek() {
            let (line, column) = (self.line, self.column);
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '\n' => {
                    self.bump();
                    let last_is_break = matches!(
                        self.tokens.last().map(|t| &t.kind),
                        None | Some(TokenKind::Newline)
                    );
                    if self.depth == 0 && !last_is_break {
                        self.push(TokenKind::Newline, line, column);
                    }
                }
                '"' | '\'' => {
                    let text = self.string(c)?;
                    self.push(TokenKind::Str(text), line, column);
                }
                c if c.is_ascii_digit() => {
                    let kind = self.number()?;
                    self.push(kind, line, column);
                }
                c if c.is_alphabetic() || c == '_' => {
                    let mut name = String::new();
                    while let Some(c) = self.peek() {
                        if c.is_alphanumeric() || c == '_' {
                            name.push(c);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    self.push(TokenKind::Ident(name), line, column);
                }
                _ => {
                    self.bump();
                    let kind = match c {
                        '(' => self.open(TokenKind::LParen),
                        '[' => self.open(TokenKind::LBracket),
                        '{' => self.open(TokenKind::LBrace),
                        ')' => self.close(TokenKind::RParen, line, column)?,
                        ']' => self.close(TokenKind::RBracket, line, column)?,
                        '}' => self.close(TokenKind::RBrace, line, column)?,
                        ',' => TokenKind::Comma,
                        ':' => TokenKind::Colon,
                        '.' => TokenKind::Dot,
                        '=' => TokenKind::Assign,
                        '+' => TokenKind::Plus,
                        '-' => TokenKind::Minus,
                        other => {
                            return Err(self.error(
                                format!("unexpected character '{}'", other),
                                line,
                                column,
                            ))
                        }
                    };
                    self.push(kind, line, column);
                }
            }
        }
        let (line, column) = (self.line, self.column);
        if !matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline)
        ) {
            self.push(TokenKind::Newline, line, column);
        }
        self.push(TokenKind::Eof, line, column);
        Ok(self.tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, line: u32, column: u32) {
        self.tokens.push(Token { kind, line, column });
    }

    fn open(&mut self, kind: TokenKind) -> TokenKind {
        self.depth += 1;
        kind
    }

    fn close(
        &mut self,
        kind: TokenKind,
        line: u32,
        column: u32,
    ) -> Result<TokenKind, InterpretationError> {
        if self.depth == 0 {
            return Err(self.error(format!("unbalanced {}", kind.describe()), line, column));
        }
        self.depth -= 1;
        Ok(kind)
    }

    fn string(&mut self, quote: char) -> Result<String, InterpretationError> {
        let (line, column) = (self.line, self.column);
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(self.error("unterminated string literal", line, column));
                }
                Some(c) if c == quote => return Ok(text),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some(other) => {
                            return Err(self.error(
                                format!("invalid escape sequence '\\{}'", other),
                                line,
                                column,
                            ))
                        }
                        None => {
                            return Err(self.error("unterminated string literal", line, column))
                        }
                    };
                    text.push(escaped);
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<TokenKind, InterpretationError> {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c == '.' && !is_float {
                is_float = true;
                text.push(c);
            } else {
                break;
            }
            self.bump();
        }
        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| self.error(format!("invalid float literal '{}'", text), line, column))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| self.error(format!("integer literal '{}' out of range", text), line, column))
        }
    }

    fn error(&self, message: impl Into<String>, line: u32, column: u32) -> InterpretationError {
        InterpretationError::new(ExErrorKind::Syntax, message)
            .at(SourcePosition::new(self.locator, line, column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new("t.star", source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_newlines_inside_brackets_are_ignored() {
        let tokens = kinds("x = [\n  1,\n  2,\n]\n");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Assign,
                TokenKind::LBracket,
                TokenKind::Int(1),
                TokenKind::Comma,
                TokenKind::Int(2),
                TokenKind::Comma,
                TokenKind::RBracket,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_escapes() {
        let tokens = kinds("# header\nprint('a\\tb') # trailing\n");
        assert_eq!(tokens[2], TokenKind::Str("a\tb".into()));
        assert_eq!(tokens.last(), Some(&TokenKind::Eof));
    }

    #[test]
    fn test_positions_are_one_based() {
        let tokens = Lexer::new("t.star", "a = 1\n  b = 2.5").tokenize().unwrap();
        let b = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Ident("b".into()))
            .unwrap();
        assert_eq!((b.line, b.column), (2, 3));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Float(2.5)));
    }

    #[test]
    fn test_unterminated_string_reports_position() {
        let err = Lexer::new("t.star", "x = \"abc").tokenize().unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Syntax);
        assert_eq!(err.position().map(|p| (p.line, p.column)), Some((1, 5)));
    }
}
