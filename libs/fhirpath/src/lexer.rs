//! FHIRPath lexer
//!
//! Converts FHIRPath expression strings into a stream of tokens. Handles
//! all lexical rules from the FHIRPath grammar, including `@`-prefixed
//! temporal literals with partial precision (a trailing `T` is preserved in
//! the token text so the AST builder can distinguish `@2015T` from `@2015`).

use crate::error::{Error, ParseError, ParseErrorCategory, Result};
use crate::token::{Span, Token, TokenKind};

/// The FHIRPath lexer
#[derive(Debug)]
pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        if let Some(c) = self.current() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.position += 1;
    }

    fn here(&self) -> (usize, usize, usize) {
        (self.position, self.line, self.column)
    }

    fn span_from(&self, start: (usize, usize, usize)) -> Span {
        Span::new(start.0, self.position, start.1, start.2)
    }

    fn err(&self, message: impl Into<String>) -> Error {
        Error::Parse(
            ParseError::new(message, self.line, self.column)
                .with_category(ParseErrorCategory::Token),
        )
    }

    fn skip_whitespace(&mut self) {
        while self.current().map(|c| c.is_whitespace()).unwrap_or(false) {
            self.advance();
        }
    }

    /// Skip a single comment when one starts at the cursor. The comment
    /// pre-validation pass has already rejected malformed shapes, but the
    /// unterminated check is repeated here so the lexer stays safe when
    /// used standalone.
    fn skip_comment(&mut self) -> Result<bool> {
        if self.current() != Some('/') {
            return Ok(false);
        }
        match self.peek() {
            Some('/') => {
                while let Some(c) = self.current() {
                    self.advance();
                    if c == '\n' {
                        break;
                    }
                }
                Ok(true)
            }
            Some('*') => {
                self.advance();
                self.advance();
                loop {
                    match self.current() {
                        Some('*') if self.peek() == Some('/') => {
                            self.advance();
                            self.advance();
                            return Ok(true);
                        }
                        Some(_) => self.advance(),
                        None => return Err(self.err("Unterminated block comment")),
                    }
                }
            }
            _ => Ok(false),
        }
    }

    fn read_identifier(&mut self) -> String {
        let start = self.position;
        while self
            .current()
            .map(|c| c.is_alphanumeric() || c == '_')
            .unwrap_or(false)
        {
            self.advance();
        }
        self.chars[start..self.position].iter().collect()
    }

    /// Process one backslash escape inside a quoted context and push the
    /// cooked character(s) onto `out`.
    fn read_escape(&mut self, out: &mut String) -> Result<()> {
        self.advance(); // skip backslash
        let Some(escaped) = self.current() else {
            return Err(self.err("Incomplete escape sequence"));
        };
        match escaped {
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '`' => out.push('`'),
            '\\' => out.push('\\'),
            '/' => out.push('/'),
            'f' => out.push('\x0C'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'u' => {
                self.advance(); // skip 'u'
                let mut hex = String::new();
                for _ in 0..4 {
                    match self.current() {
                        Some(h) if h.is_ascii_hexdigit() => {
                            hex.push(h);
                            self.advance();
                        }
                        Some(_) => return Err(self.err("Invalid unicode escape sequence")),
                        None => return Err(self.err("Incomplete unicode escape sequence")),
                    }
                }
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| self.err("Invalid unicode code point"))?;
                out.push(
                    char::from_u32(code).ok_or_else(|| self.err("Invalid unicode character"))?,
                );
                return Ok(()); // cursor already past the sequence
            }
            other => out.push(other),
        }
        self.advance();
        Ok(())
    }

    /// Read a quoted run terminated by `closer`, processing escapes.
    /// A doubled closer is an escaped closer.
    fn read_quoted(&mut self, closer: char, what: &str) -> Result<String> {
        self.advance(); // skip opening quote
        let mut value = String::new();
        while let Some(c) = self.current() {
            if c == closer {
                if self.peek() == Some(closer) {
                    value.push(closer);
                    self.advance();
                    self.advance();
                } else {
                    self.advance();
                    return Ok(value);
                }
            } else if c == '\\' {
                self.read_escape(&mut value)?;
            } else {
                value.push(c);
                self.advance();
            }
        }
        Err(self.err(format!("Unterminated {}", what)))
    }

    /// Read NUMBER or LONGNUMBER. Returns the text (without the `L`
    /// suffix) and whether the `L` suffix was present.
    fn read_number(&mut self) -> (String, bool) {
        let start = self.position;
        while self.current().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.advance();
        }
        let mut has_decimal = false;
        if self.current() == Some('.') && self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            has_decimal = true;
            self.advance();
            while self.current().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.advance();
            }
        }
        let text: String = self.chars[start..self.position].iter().collect();
        if !has_decimal && self.current() == Some('L') {
            self.advance();
            (text, true)
        } else {
            (text, false)
        }
    }

    fn read_digits(&mut self, count: usize, what: &str) -> Result<String> {
        let mut out = String::new();
        for _ in 0..count {
            match self.current() {
                Some(c) if c.is_ascii_digit() => {
                    out.push(c);
                    self.advance();
                }
                _ => return Err(self.err(format!("Invalid {}: expected digit", what))),
            }
        }
        Ok(out)
    }

    /// Read the date portion of a temporal literal: `YYYY[-MM[-DD]]`.
    fn read_date_format(&mut self) -> Result<String> {
        let mut value = self.read_digits(4, "date")?;
        if self.current() == Some('-') {
            value.push('-');
            self.advance();
            value.push_str(&self.read_digits(2, "date month")?);
            if self.current() == Some('-') {
                value.push('-');
                self.advance();
                value.push_str(&self.read_digits(2, "date day")?);
            }
        }
        Ok(value)
    }

    /// Read the time portion of a temporal literal: `HH[:MM[:SS[.fff]]]`.
    fn read_time_format(&mut self) -> Result<String> {
        let mut value = self.read_digits(2, "time")?;
        if self.current() == Some(':') {
            value.push(':');
            self.advance();
            value.push_str(&self.read_digits(2, "time minute")?);
            if self.current() == Some(':') {
                value.push(':');
                self.advance();
                value.push_str(&self.read_digits(2, "time second")?);
                // Fraction digits only when the dot is followed by a digit;
                // `@T14:34:28.is()` keeps the dot for the invocation.
                if self.current() == Some('.')
                    && self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false)
                {
                    value.push('.');
                    self.advance();
                    while self.current().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                        value.push(self.current().unwrap());
                        self.advance();
                    }
                }
            }
        }
        Ok(value)
    }

    /// Read a timezone suffix: `Z` or `±HH:MM`.
    fn read_timezone(&mut self) -> Result<String> {
        if self.current() == Some('Z') {
            self.advance();
            return Ok("Z".to_string());
        }
        let mut value = String::new();
        if let Some(sign @ ('+' | '-')) = self.current() {
            value.push(sign);
            self.advance();
            value.push_str(&self.read_digits(2, "timezone hour")?);
            if self.current() != Some(':') {
                return Err(self.err("Invalid timezone: expected ':' and minutes"));
            }
            value.push(':');
            self.advance();
            value.push_str(&self.read_digits(2, "timezone minute")?);
        }
        Ok(value)
    }

    /// Read an `@`-prefixed temporal literal. The trailing `T` of a partial
    /// datetime (`@2015T`) is kept in the token text.
    fn read_temporal(&mut self) -> Result<(String, TokenKind)> {
        self.advance(); // skip '@'

        if self.current() == Some('T') {
            self.advance();
            return Ok((self.read_time_format()?, TokenKind::Time));
        }

        let date = self.read_date_format()?;
        if self.current() != Some('T') {
            return Ok((date, TokenKind::Date));
        }
        self.advance(); // consume 'T'

        if !self.current().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            // Partial datetime: date with a bare trailing T.
            return Ok((format!("{}T", date), TokenKind::DateTime));
        }

        let time = self.read_time_format()?;
        let tz = if matches!(self.current(), Some('Z' | '+' | '-')) {
            self.read_timezone()?
        } else {
            String::new()
        };
        Ok((format!("{}T{}{}", date, time, tz), TokenKind::DateTime))
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> Result<Token> {
        loop {
            self.skip_whitespace();
            if self.current() == Some('/') && matches!(self.peek(), Some('/') | Some('*')) {
                self.skip_comment()?;
            } else {
                break;
            }
        }

        let start = self.here();
        let Some(c) = self.current() else {
            return Ok(Token::eof(self.span_from(start)));
        };

        let simple = |lexer: &mut Lexer, kind: TokenKind, text: &str| {
            lexer.advance();
            Ok(Token::new(kind, text, lexer.span_from(start)))
        };

        match c {
            '.' => simple(self, TokenKind::Dot, "."),
            '[' => simple(self, TokenKind::OpenBracket, "["),
            ']' => simple(self, TokenKind::CloseBracket, "]"),
            '(' => simple(self, TokenKind::OpenParen, "("),
            ')' => simple(self, TokenKind::CloseParen, ")"),
            '{' => simple(self, TokenKind::OpenBrace, "{"),
            '}' => simple(self, TokenKind::CloseBrace, "}"),
            ',' => simple(self, TokenKind::Comma, ","),
            '+' => simple(self, TokenKind::Plus, "+"),
            '-' => simple(self, TokenKind::Minus, "-"),
            '*' => simple(self, TokenKind::Multiply, "*"),
            '/' => simple(self, TokenKind::Divide, "/"),
            '&' => simple(self, TokenKind::Ampersand, "&"),
            '|' => simple(self, TokenKind::Pipe, "|"),
            '=' => simple(self, TokenKind::Equal, "="),
            '~' => simple(self, TokenKind::Equivalent, "~"),
            '<' => {
                self.advance();
                if self.current() == Some('=') {
                    self.advance();
                    Ok(Token::new(
                        TokenKind::LessThanOrEqual,
                        "<=",
                        self.span_from(start),
                    ))
                } else {
                    Ok(Token::new(TokenKind::LessThan, "<", self.span_from(start)))
                }
            }
            '>' => {
                self.advance();
                if self.current() == Some('=') {
                    self.advance();
                    Ok(Token::new(
                        TokenKind::GreaterThanOrEqual,
                        ">=",
                        self.span_from(start),
                    ))
                } else {
                    Ok(Token::new(
                        TokenKind::GreaterThan,
                        ">",
                        self.span_from(start),
                    ))
                }
            }
            '!' => {
                self.advance();
                match self.current() {
                    Some('=') => {
                        self.advance();
                        Ok(Token::new(TokenKind::NotEqual, "!=", self.span_from(start)))
                    }
                    Some('~') => {
                        self.advance();
                        Ok(Token::new(
                            TokenKind::NotEquivalent,
                            "!~",
                            self.span_from(start),
                        ))
                    }
                    _ => Err(self.err("Unexpected '!' character")),
                }
            }
            '$' => {
                self.advance();
                let ident = self.read_identifier();
                let kind = match ident.as_str() {
                    "this" => TokenKind::This,
                    "index" => TokenKind::Index,
                    "total" => TokenKind::Total,
                    _ => return Err(self.err(format!("Unknown variable: ${}", ident))),
                };
                Ok(Token::new(
                    kind,
                    format!("${}", ident),
                    self.span_from(start),
                ))
            }
            '%' => {
                self.advance();
                let value = match self.current() {
                    Some('\'') => self.read_quoted('\'', "string literal")?,
                    Some('`') => self.read_quoted('`', "delimited identifier")?,
                    _ => self.read_identifier(),
                };
                Ok(Token::new(
                    TokenKind::ExternalConstant,
                    value,
                    self.span_from(start),
                ))
            }
            '@' => {
                let (text, kind) = self.read_temporal()?;
                Ok(Token::new(kind, text, self.span_from(start)))
            }
            '\'' => {
                let value = self.read_quoted('\'', "string literal")?;
                Ok(Token::new(TokenKind::String, value, self.span_from(start)))
            }
            '`' => {
                let value = self.read_quoted('`', "delimited identifier")?;
                Ok(Token::new(
                    TokenKind::DelimitedIdentifier,
                    value,
                    self.span_from(start),
                ))
            }
            c if c.is_ascii_digit() => {
                let (text, is_long) = self.read_number();
                let kind = if is_long {
                    TokenKind::LongNumber
                } else {
                    TokenKind::Number
                };
                Ok(Token::new(kind, text, self.span_from(start)))
            }
            c if c.is_alphabetic() || c == '_' => {
                let ident = self.read_identifier();
                let kind = match ident.as_str() {
                    "true" | "false" => TokenKind::Boolean,
                    "as" => TokenKind::As,
                    "is" => TokenKind::Is,
                    "div" => TokenKind::Div,
                    "mod" => TokenKind::Mod,
                    "in" => TokenKind::In,
                    "contains" => TokenKind::Contains,
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "xor" => TokenKind::Xor,
                    "implies" => TokenKind::Implies,
                    _ => TokenKind::Identifier,
                };
                Ok(Token::new(kind, ident, self.span_from(start)))
            }
            other => Err(self.err(format!("Unexpected character: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token().expect("lex failure");
            let eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if eof {
                break;
            }
        }
        tokens
    }

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn identifiers_and_paths() {
        let tokens = tokenize("Patient.name.given");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text, "Patient");
        assert_eq!(tokens[1].kind, TokenKind::Dot);
        assert_eq!(tokens[4].text, "given");
    }

    #[test]
    fn string_escapes_are_cooked() {
        let tokens = tokenize(r"'1 \'wk\''");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].text, "1 'wk'");
    }

    #[test]
    fn unicode_escape() {
        let tokens = tokenize(r"'A'");
        assert_eq!(tokens[0].text, "A");
    }

    #[test]
    fn numbers_and_long_numbers() {
        let tokens = tokenize("123 45.67 999L");
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].text, "123");
        assert_eq!(tokens[1].kind, TokenKind::Number);
        assert_eq!(tokens[1].text, "45.67");
        assert_eq!(tokens[2].kind, TokenKind::LongNumber);
        assert_eq!(tokens[2].text, "999");
    }

    #[test]
    fn trailing_dot_is_not_part_of_number() {
        assert_eq!(
            kinds("5.single()"),
            vec![
                TokenKind::Number,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::OpenParen,
                TokenKind::CloseParen,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn keywords() {
        assert_eq!(
            kinds("and or xor implies div mod in contains as is"),
            vec![
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Xor,
                TokenKind::Implies,
                TokenKind::Div,
                TokenKind::Mod,
                TokenKind::In,
                TokenKind::Contains,
                TokenKind::As,
                TokenKind::Is,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn date_literals() {
        let tokens = tokenize("@2015 @2015-02 @2015-02-04");
        assert!(tokens[..3].iter().all(|t| t.kind == TokenKind::Date));
        assert_eq!(tokens[0].text, "2015");
        assert_eq!(tokens[1].text, "2015-02");
        assert_eq!(tokens[2].text, "2015-02-04");
    }

    #[test]
    fn partial_datetime_keeps_trailing_t() {
        let tokens = tokenize("@2015T @2015-02T");
        assert_eq!(tokens[0].kind, TokenKind::DateTime);
        assert_eq!(tokens[0].text, "2015T");
        assert_eq!(tokens[1].text, "2015-02T");
    }

    #[test]
    fn full_datetime_with_timezone() {
        let tokens = tokenize("@2015-02-04T14:34:28.123+10:00");
        assert_eq!(tokens[0].kind, TokenKind::DateTime);
        assert_eq!(tokens[0].text, "2015-02-04T14:34:28.123+10:00");
    }

    #[test]
    fn time_literal_stops_before_invocation() {
        let tokens = tokenize("@T14:34:28.is(Time)");
        assert_eq!(tokens[0].kind, TokenKind::Time);
        assert_eq!(tokens[0].text, "14:34:28");
        assert_eq!(tokens[1].kind, TokenKind::Dot);
    }

    #[test]
    fn dollar_variables() {
        assert_eq!(
            kinds("$this $index $total"),
            vec![
                TokenKind::This,
                TokenKind::Index,
                TokenKind::Total,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn external_constants() {
        let tokens = tokenize("%resource %'vs-name'");
        assert_eq!(tokens[0].kind, TokenKind::ExternalConstant);
        assert_eq!(tokens[0].text, "resource");
        assert_eq!(tokens[1].text, "vs-name");
    }

    #[test]
    fn comments_are_skipped() {
        let tokens = tokenize("Patient // comment\n.name /* block */ .given");
        let idents: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Identifier)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(idents, vec!["Patient", "name", "given"]);
    }

    #[test]
    fn division_is_not_a_comment() {
        assert_eq!(
            kinds("4 / 2"),
            vec![
                TokenKind::Number,
                TokenKind::Divide,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn spans_point_into_source() {
        let source = "name.given";
        let tokens = tokenize(source);
        assert_eq!(tokens[0].span.slice(source), "name");
        assert_eq!(tokens[2].span.slice(source), "given");
        assert_eq!(tokens[2].span.column, 6);
    }

    #[test]
    fn unknown_variable_is_an_error() {
        assert!(Lexer::new("$nope").next_token().is_err());
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(Lexer::new("'open").next_token().is_err());
    }
}
