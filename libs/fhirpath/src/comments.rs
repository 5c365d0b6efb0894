//! Comment and delimiter pre-validation
//!
//! Runs over the raw expression before lexing. The lexer itself skips
//! well-formed comments; this pass exists to reject the malformed shapes
//! with a precise location: nested block comments, unterminated block
//! comments, and stray `*/` terminators. Quote and backtick contexts
//! suppress comment detection, matching the grammar's lexical rules.

use crate::error::{enrich_parse_error, Error, ParseError, ParseErrorCategory, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Code,
    SingleQuote,
    DoubleQuote,
    Backtick,
    LineComment,
    BlockComment,
}

/// Validate comment structure in `expression`. Returns `Ok(())` when every
/// comment is well formed, or a located parse error otherwise.
pub fn validate_comments(expression: &str) -> Result<()> {
    let chars: Vec<char> = expression.chars().collect();
    let mut mode = Mode::Code;
    let mut line = 1usize;
    let mut column = 1usize;
    // Location of the opening `/*`, for unterminated-comment reporting.
    let mut block_open = (0usize, 0usize);
    let mut i = 0usize;

    let fail = |message: &str, line: usize, column: usize| -> Result<()> {
        Err(Error::Parse(enrich_parse_error(
            ParseError::new(message, line, column)
                .with_category(ParseErrorCategory::Syntax),
            expression,
        )))
    };

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match mode {
            Mode::Code => match c {
                '\'' => mode = Mode::SingleQuote,
                '"' => mode = Mode::DoubleQuote,
                '`' => mode = Mode::Backtick,
                '/' if next == Some('/') => {
                    mode = Mode::LineComment;
                    i += 1;
                    column += 1;
                }
                '/' if next == Some('*') => {
                    mode = Mode::BlockComment;
                    block_open = (line, column);
                    i += 1;
                    column += 1;
                }
                '*' if next == Some('/') => {
                    return fail("Unexpected block comment terminator '*/'", line, column);
                }
                _ => {}
            },
            Mode::SingleQuote | Mode::DoubleQuote | Mode::Backtick => {
                if c == '\\' {
                    // Escaped character, including escaped closing quote.
                    if next.is_some() {
                        i += 1;
                        column += 1;
                    }
                } else {
                    let closer = match mode {
                        Mode::SingleQuote => '\'',
                        Mode::DoubleQuote => '"',
                        _ => '`',
                    };
                    if c == closer {
                        mode = Mode::Code;
                    }
                }
            }
            Mode::LineComment => {
                if c == '\n' {
                    mode = Mode::Code;
                }
            }
            Mode::BlockComment => {
                if c == '/' && next == Some('*') {
                    return fail("Nested block comments are not supported", line, column);
                }
                if c == '*' && next == Some('/') {
                    mode = Mode::Code;
                    i += 1;
                    column += 1;
                }
            }
        }

        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
        i += 1;
    }

    if mode == Mode::BlockComment {
        return fail("Unterminated block comment", block_open.0, block_open.1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_line_and_block_comments() {
        assert!(validate_comments("Patient.name // trailing").is_ok());
        assert!(validate_comments("Patient/* inline */.name").is_ok());
        assert!(validate_comments("/* leading */ Patient.name").is_ok());
        assert!(validate_comments("a /* one */ + /* two */ b").is_ok());
    }

    #[test]
    fn rejects_nested_block_comment() {
        let err = validate_comments("a /* outer /* inner */ */ b").unwrap_err();
        let parse = err.parse_error().unwrap();
        assert!(parse.message.contains("Nested"));
    }

    #[test]
    fn rejects_unterminated_block_comment() {
        let err = validate_comments("Patient.name /* never closed").unwrap_err();
        let parse = err.parse_error().unwrap();
        assert!(parse.message.contains("Unterminated"));
        assert_eq!(parse.line, 1);
        assert_eq!(parse.column, 14);
    }

    #[test]
    fn rejects_stray_terminator() {
        let err = validate_comments("Patient.name */ rest").unwrap_err();
        assert!(err.parse_error().unwrap().message.contains("terminator"));
    }

    #[test]
    fn string_context_suppresses_comment_detection() {
        assert!(validate_comments("name = '/* not a comment */'").is_ok());
        assert!(validate_comments("name = 'a // b'").is_ok());
        assert!(validate_comments("`weird/*ident*/` = 1").is_ok());
    }

    #[test]
    fn escaped_quote_does_not_close_string() {
        assert!(validate_comments("'it\\'s /* still a string'").is_ok());
    }

    #[test]
    fn reports_position_across_lines() {
        let err = validate_comments("a +\nb */").unwrap_err();
        let parse = err.parse_error().unwrap();
        assert_eq!(parse.line, 2);
        assert_eq!(parse.column, 3);
    }
}
