//! Lexer for the Box language.
//!
//! Single left-to-right scan producing the full token stream, or — when
//! anything goes wrong — a bundle of every lexical error discovered. Errors
//! never abort the scan; the END_OF_FILE sentinel is only emitted on a clean
//! run.

use crate::compiler::diag;
use crate::compiler::token::{LiteralValue, Token, TokenKind};
use std::fmt;

pub const MAX_IDENTIFIER_LEN: usize = 255;

// ═══════════════════════════════════════════════════════════════
//  Error types
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub hint: Option<String>,
    pub source_line: String,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&diag::format_error(
            "LEXER ERROR",
            Some((self.line, self.column)),
            &self.message,
            Some(&self.source_line),
            self.hint.as_deref(),
        ))
    }
}

impl std::error::Error for LexError {}

/// Every lexical error from one scan, surfaced together.
#[derive(Debug, Clone)]
pub struct LexErrorBundle {
    pub errors: Vec<LexError>,
}

impl fmt::Display for LexErrorBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&diag::format_failure_summary(
            self.errors.len(),
            "lexical error",
        ))?;
        for e in &self.errors {
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

impl std::error::Error for LexErrorBundle {}

// ═══════════════════════════════════════════════════════════════
//  Lexer
// ═══════════════════════════════════════════════════════════════

pub struct Lexer {
    source: Vec<char>,
    lines: Vec<String>,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
    start: usize,
    current: usize,
    line: u32,
    column: u32,
    start_column: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        let lines = source.split('\n').map(|l| l.to_string()).collect();
        Self {
            source: source.chars().collect(),
            lines,
            tokens: Vec::new(),
            errors: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            column: 1,
            start_column: 1,
        }
    }

    /// Scan the entire source. Returns the token stream ending with
    /// END_OF_FILE, or every collected error (never partial success).
    pub fn scan_tokens(mut self) -> Result<Vec<Token>, LexErrorBundle> {
        while !self.is_at_end() {
            self.start = self.current;
            self.start_column = self.column;
            if let Err(e) = self.scan_token() {
                self.errors.push(e);
            }
        }

        if !self.errors.is_empty() {
            return Err(LexErrorBundle {
                errors: self.errors,
            });
        }

        self.tokens.push(Token::new(
            TokenKind::EndOfFile,
            "",
            self.line,
            self.column,
        ));
        Ok(self.tokens)
    }

    fn scan_token(&mut self) -> Result<(), LexError> {
        let c = self.advance();

        match c {
            '(' => self.add_token(TokenKind::LParen),
            ')' => self.add_token(TokenKind::RParen),
            '{' => self.add_token(TokenKind::LBrace),
            '}' => self.add_token(TokenKind::RBrace),
            '[' => self.add_token(TokenKind::LBracket),
            ']' => self.add_token(TokenKind::RBracket),
            ',' => self.add_token(TokenKind::Comma),
            ';' => self.add_token(TokenKind::Semicolon),
            ':' => self.add_token(TokenKind::Colon),
            '+' => self.add_token(TokenKind::Plus),
            '*' => self.add_token(TokenKind::Star),
            '&' => self.add_token(TokenKind::Ampersand),
            '%' => self.add_token(TokenKind::Percent),
            '-' => {
                if self.match_char('>') {
                    self.add_token(TokenKind::Arrow);
                } else {
                    self.add_token(TokenKind::Minus);
                }
            }
            '!' => {
                let kind = if self.match_char('=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                };
                self.add_token(kind);
            }
            '=' => {
                let kind = if self.match_char('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                };
                self.add_token(kind);
            }
            '<' => {
                let kind = if self.match_char('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                };
                self.add_token(kind);
            }
            '>' => {
                let kind = if self.match_char('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                };
                self.add_token(kind);
            }
            '/' => {
                if self.match_char('/') {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else if self.match_char('*') {
                    self.block_comment()?;
                } else {
                    self.add_token(TokenKind::Slash);
                }
            }
            ' ' | '\r' | '\t' => {}
            '\n' => {
                // the newline is already consumed; the next character sits
                // at column 1 of the new line
                self.line += 1;
                self.column = 1;
            }
            '"' => self.string()?,
            c if c.is_ascii_digit() => self.number()?,
            c if is_alpha(c) => self.identifier()?,
            other => {
                let hint = unexpected_char_hint(other);
                return Err(self.error_at(
                    self.line,
                    self.start_column,
                    format!("Unexpected character '{}' (ASCII {})", other, other as u32),
                    Some(hint),
                ));
            }
        }

        Ok(())
    }

    // ── Block comments ───────────────────────────────────────────

    /// Block comments nest; the scanner only terminates when depth returns to
    /// zero. Unterminated comments report how many `*/` remain missing.
    fn block_comment(&mut self) -> Result<(), LexError> {
        let mut depth = 1usize;
        let start_line = self.line;
        let start_col = self.start_column;

        while depth > 0 && !self.is_at_end() {
            if self.peek() == '/' && self.peek_next() == '*' {
                self.advance();
                self.advance();
                depth += 1;
            } else if self.peek() == '*' && self.peek_next() == '/' {
                self.advance();
                self.advance();
                depth -= 1;
            } else {
                if self.peek() == '\n' {
                    self.line += 1;
                    self.column = 0;
                }
                self.advance();
            }
        }

        if depth > 0 {
            let hint = format!(
                "Add '*/' to close the comment. Block comments must be properly closed.\n\
                 \x20      Opened at line {}, column {}.",
                start_line, start_col
            );
            return Err(self.error_at(
                self.line,
                self.column,
                format!("Unterminated block comment (missing {} closing '*/')", depth),
                Some(hint),
            ));
        }

        Ok(())
    }

    // ── Strings ──────────────────────────────────────────────────

    fn string(&mut self) -> Result<(), LexError> {
        let start_line = self.line;
        let start_col = self.start_column;
        let mut value = String::new();

        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                // Multi-line strings are allowed; the raw newline is kept.
                self.line += 1;
                self.column = 0;
                value.push('\n');
                self.advance();
            } else if self.peek() == '\\' {
                self.advance();
                if self.is_at_end() {
                    let hint = format!(
                        "Add closing '\"' to terminate the string literal.\n\
                         \x20      String started at line {}, column {}.",
                        start_line, start_col
                    );
                    return Err(self.error_at(
                        self.line,
                        self.column,
                        "Unterminated string: reached end of file while parsing string".to_string(),
                        Some(hint),
                    ));
                }

                let escape_char = self.peek();
                let escape_column = self.column;
                self.advance();

                if let Some(decoded) = simple_escape(escape_char) {
                    value.push(decoded);
                } else if escape_char == 'x' {
                    match self.read_hex_escape(2) {
                        Some(v) if v <= 0xFF => value.push(v as u8 as char),
                        Some(v) => {
                            return Err(self.error_at(
                                self.line,
                                escape_column,
                                format!("Hexadecimal escape value out of range: \\x{:x}", v),
                                Some(
                                    "Hexadecimal escape sequences must be in range \\x00 to \\xFF."
                                        .to_string(),
                                ),
                            ));
                        }
                        None => {
                            return Err(self.error_at(
                                self.line,
                                escape_column,
                                "Invalid hexadecimal escape sequence".to_string(),
                                Some(
                                    "Hexadecimal escape sequences require exactly 2 hex digits.\n\
                                     \x20      Example: \\x41 (represents 'A')"
                                        .to_string(),
                                ),
                            ));
                        }
                    }
                } else if escape_char == 'u' {
                    match self.read_hex_escape(4) {
                        Some(v) if v <= 0x0010_FFFF => match char::from_u32(v) {
                            Some(c) => value.push(c),
                            None => {
                                return Err(self.error_at(
                                    self.line,
                                    escape_column,
                                    format!("Invalid Unicode code point: \\u{:x}", v),
                                    Some(format!(
                                        "Unicode code point U+{:X} is not valid.",
                                        v
                                    )),
                                ));
                            }
                        },
                        Some(v) => {
                            return Err(self.error_at(
                                self.line,
                                escape_column,
                                format!("Invalid Unicode code point: \\u{:x}", v),
                                Some(format!("Unicode code point U+{:X} is not valid.", v)),
                            ));
                        }
                        None => {
                            return Err(self.error_at(
                                self.line,
                                escape_column,
                                "Invalid unicode escape sequence".to_string(),
                                Some(
                                    "Unicode escape sequences require exactly 4 hex digits.\n\
                                     \x20      Example: \\u0041 (represents 'A')"
                                        .to_string(),
                                ),
                            ));
                        }
                    }
                } else {
                    let hint = "Valid escape sequences are: \\n, \\t, \\r, \\\\, \\\", \\0, \
                                \\a, \\b, \\f, \\v, \\xHH, \\uHHHH\n\
                                \x20      If you want a literal backslash, use \\\\";
                    return Err(self.error_at(
                        self.line,
                        escape_column,
                        format!("Invalid escape sequence '\\{}' in string literal", escape_char),
                        Some(hint.to_string()),
                    ));
                }
            } else {
                value.push(self.peek());
                self.advance();
            }
        }

        if self.is_at_end() {
            let mut hint = format!(
                "Add closing '\"' to terminate the string literal.\n\
                 \x20      String started at line {}, column {}.",
                start_line, start_col
            );
            if value.contains('\n') {
                hint.push_str("\n       Note: Multi-line strings are allowed in Box.");
            }
            return Err(self.error_at(
                self.line,
                self.column,
                "Unterminated string literal: missing closing quote".to_string(),
                Some(hint),
            ));
        }

        self.advance(); // closing quote
        self.add_literal_token(TokenKind::Str, LiteralValue::Str(value));
        Ok(())
    }

    fn read_hex_escape(&mut self, len: usize) -> Option<u32> {
        let mut digits = String::new();
        for _ in 0..len {
            if self.is_at_end() || !self.peek().is_ascii_hexdigit() {
                return None;
            }
            digits.push(self.advance());
        }
        u32::from_str_radix(&digits, 16).ok()
    }

    // ── Numbers ──────────────────────────────────────────────────

    fn number(&mut self) -> Result<(), LexError> {
        let start_col = self.start_column;

        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        } else if self.peek() == '.' && !self.peek_next().is_ascii_digit() {
            return Err(self.error_at(
                self.line,
                self.column,
                "Invalid number literal: decimal point must be followed by digits".to_string(),
                Some(
                    "A decimal point must be followed by at least one digit.\n\
                     \x20      Example: 3.14 (correct), 3. (incorrect)"
                        .to_string(),
                ),
            ));
        }

        if self.peek() == 'e' || self.peek() == 'E' {
            self.advance();
            if self.peek() == '+' || self.peek() == '-' {
                self.advance();
            }
            if !self.peek().is_ascii_digit() {
                return Err(self.error_at(
                    self.line,
                    start_col,
                    "Invalid number literal: exponent must be followed by digits".to_string(),
                    Some(
                        "Exponent must be followed by at least one digit.\n\
                         \x20      Example: 1.5e10 (correct), 1.5e (incorrect)"
                            .to_string(),
                    ),
                ));
            }
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let literal: String = self.source[self.start..self.current].iter().collect();
        let value: f64 = match literal.parse() {
            Ok(v) => v,
            Err(_) => {
                return Err(self.error_at(
                    self.line,
                    start_col,
                    format!("Malformed number literal: '{}'", literal),
                    Some(
                        "Check the number format. Valid examples: 42, 3.14, 1.5e10, 2.0e-5"
                            .to_string(),
                    ),
                ));
            }
        };

        if value.is_infinite() {
            let (what, hint) = if value > 0.0 {
                ("overflow", "Number is too large to represent. Use a smaller value.")
            } else {
                ("underflow", "Number is too small to represent. Use a larger value.")
            };
            let bound = if value > 0.0 { "maximum" } else { "minimum" };
            return Err(self.error_at(
                self.line,
                start_col,
                format!(
                    "Number literal {}: '{}' exceeds {} representable value",
                    what, literal, bound
                ),
                Some(hint.to_string()),
            ));
        }

        self.add_literal_token(TokenKind::Number, LiteralValue::Number(value));
        Ok(())
    }

    // ── Identifiers ──────────────────────────────────────────────

    fn identifier(&mut self) -> Result<(), LexError> {
        while is_alnum(self.peek()) {
            self.advance();
        }

        let text: String = self.source[self.start..self.current].iter().collect();

        if text.len() > MAX_IDENTIFIER_LEN {
            let hint = format!(
                "Identifiers must be {} characters or fewer.\n\
                 \x20      Current length: {} characters.\n\
                 \x20      Consider using a shorter, more descriptive name.",
                MAX_IDENTIFIER_LEN,
                text.len()
            );
            return Err(self.error_at(
                self.line,
                self.start_column,
                format!("Identifier too long: '{}...'", &text[..50]),
                Some(hint),
            ));
        }

        match TokenKind::keyword_from_str(&text) {
            Some(TokenKind::True) => self.add_literal_token(TokenKind::True, LiteralValue::Bool(true)),
            Some(TokenKind::False) => {
                self.add_literal_token(TokenKind::False, LiteralValue::Bool(false))
            }
            Some(TokenKind::Nil) => self.add_literal_token(TokenKind::Nil, LiteralValue::Nil),
            Some(kind) => self.add_token(kind),
            None => self.add_token(TokenKind::Identifier),
        }
        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.source[self.current]
        }
    }

    fn peek_next(&self) -> char {
        if self.current + 1 >= self.source.len() {
            '\0'
        } else {
            self.source[self.current + 1]
        }
    }

    fn advance(&mut self) -> char {
        if self.is_at_end() {
            return '\0';
        }
        let c = self.source[self.current];
        self.current += 1;
        self.column += 1;
        c
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            return false;
        }
        self.current += 1;
        self.column += 1;
        true
    }

    fn add_token(&mut self, kind: TokenKind) {
        let lexeme: String = self.source[self.start..self.current].iter().collect();
        self.tokens
            .push(Token::new(kind, lexeme, self.line, self.start_column));
    }

    fn add_literal_token(&mut self, kind: TokenKind, literal: LiteralValue) {
        let lexeme: String = self.source[self.start..self.current].iter().collect();
        self.tokens.push(Token::with_literal(
            kind,
            lexeme,
            literal,
            self.line,
            self.start_column,
        ));
    }

    fn source_line(&self, line: u32) -> String {
        self.lines
            .get(line.saturating_sub(1) as usize)
            .cloned()
            .unwrap_or_default()
    }

    fn error_at(&self, line: u32, column: u32, message: String, hint: Option<String>) -> LexError {
        LexError {
            message,
            line,
            column,
            hint,
            source_line: self.source_line(line),
        }
    }
}

fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_alnum(c: char) -> bool {
    is_alpha(c) || c.is_ascii_digit()
}

fn simple_escape(c: char) -> Option<char> {
    match c {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        '\\' => Some('\\'),
        '"' => Some('"'),
        '0' => Some('\0'),
        'a' => Some('\x07'),
        'b' => Some('\x08'),
        'f' => Some('\x0c'),
        'v' => Some('\x0b'),
        _ => None,
    }
}

fn unexpected_char_hint(c: char) -> String {
    match c {
        '(' | ')' | '{' | '}' | '[' | ']' => format!(
            "The character '{}' might be misplaced. Check for matching pairs.",
            c
        ),
        '@' | '#' | '$' => format!(
            "'{}' is not a valid Box operator. Did you mean to use a different operator?",
            c
        ),
        '|' => "Use 'or' keyword instead of '|' for logical OR operation.".to_string(),
        c if (c as u32) < 32 || c as u32 == 127 => format!(
            "Invisible control character detected (ASCII {}). Remove it from source code.",
            c as u32
        ),
        _ => "This character is not recognized in Box. Check your syntax.".to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Unit tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lex(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .scan_tokens()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn lex_err(input: &str) -> LexErrorBundle {
        Lexer::new(input).scan_tokens().unwrap_err()
    }

    #[test]
    fn test_simple_statement() {
        let tokens = lex("var x = 1 + 2;");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Equal,
                TokenKind::Number,
                TokenKind::Plus,
                TokenKind::Number,
                TokenKind::Semicolon,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_two_char_operators() {
        let tokens = lex("== != <= >= -> =");
        assert_eq!(
            tokens,
            vec![
                TokenKind::EqualEqual,
                TokenKind::BangEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::Arrow,
                TokenKind::Equal,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_keywords_and_builtins() {
        let tokens = lex("fun malloc free unsafe llvm_inline switch");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Fun,
                TokenKind::Malloc,
                TokenKind::Free,
                TokenKind::Unsafe,
                TokenKind::LlvmInline,
                TokenKind::Switch,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_number_literals() {
        let tokens: Vec<Token> = Lexer::new("42 3.14 1.5e10 2.0e-5").scan_tokens().unwrap();
        let values: Vec<f64> = tokens
            .iter()
            .filter_map(|t| match t.literal {
                Some(LiteralValue::Number(n)) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![42.0, 3.14, 1.5e10, 2.0e-5]);
    }

    #[test]
    fn test_trailing_dot_is_error() {
        let bundle = lex_err("var x = 3.;");
        assert!(bundle.errors[0].message.contains("decimal point"));
    }

    #[test]
    fn test_empty_exponent_is_error() {
        let bundle = lex_err("1.5e;");
        assert!(bundle.errors[0].message.contains("exponent"));
    }

    #[test]
    fn test_number_overflow() {
        let bundle = lex_err("1e400;");
        assert!(bundle.errors[0].message.contains("overflow"));
    }

    #[test]
    fn test_string_escapes() {
        let tokens = Lexer::new(r#""a\n\t\x41\u0042\\""#).scan_tokens().unwrap();
        assert_eq!(
            tokens[0].literal,
            Some(LiteralValue::Str("a\n\tAB\\".to_string()))
        );
    }

    #[test]
    fn test_multiline_string_preserves_newline() {
        let tokens = Lexer::new("\"a\nb\"").scan_tokens().unwrap();
        assert_eq!(tokens[0].literal, Some(LiteralValue::Str("a\nb".to_string())));
    }

    #[test]
    fn test_invalid_escape() {
        let bundle = lex_err(r#""\q""#);
        assert!(bundle.errors[0].message.contains("Invalid escape sequence"));
    }

    #[test]
    fn test_unterminated_string() {
        let bundle = lex_err("\"abc");
        assert!(bundle.errors[0]
            .message
            .contains("Unterminated string literal"));
    }

    #[test]
    fn test_nested_block_comment() {
        let tokens = lex("/* outer /* inner */ still outer */ var");
        assert_eq!(tokens, vec![TokenKind::Var, TokenKind::EndOfFile]);
    }

    #[test]
    fn test_unterminated_nested_comment_reports_deficit() {
        let bundle = lex_err("/* a /* b */");
        assert!(bundle.errors[0].message.contains("missing 1 closing '*/'"));
    }

    #[test]
    fn test_whitespace_only_source() {
        let tokens = lex("  \n\t // comment\n/* block */");
        assert_eq!(tokens, vec![TokenKind::EndOfFile]);
    }

    #[test]
    fn test_identifier_length_limit() {
        let ok = "a".repeat(255);
        assert_eq!(
            lex(&ok),
            vec![TokenKind::Identifier, TokenKind::EndOfFile]
        );

        let too_long = "a".repeat(256);
        let bundle = lex_err(&too_long);
        assert!(bundle.errors[0].message.contains("Identifier too long"));
    }

    #[test]
    fn test_pipe_hint() {
        let bundle = lex_err("a | b");
        assert_eq!(
            bundle.errors[0].hint.as_deref(),
            Some("Use 'or' keyword instead of '|' for logical OR operation.")
        );
    }

    #[test]
    fn test_errors_are_accumulated() {
        let bundle = lex_err("@ #");
        assert_eq!(bundle.errors.len(), 2);
        let rendered = format!("{}", bundle);
        assert!(rendered.contains("COMPILATION FAILED: Found 2 lexical error(s)"));
    }

    #[test]
    fn test_line_and_column_tracking() {
        let tokens = Lexer::new("var x;\n  var y;").scan_tokens().unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        // second 'var' sits on line 2, column 3
        assert_eq!((tokens[3].line, tokens[3].column), (2, 3));
    }
}
