//! Errors raised while tokenizing or parsing save text.

use std::fmt;

/// Token positions index the token stream; `offset` is a byte offset into
/// the source text.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    UnexpectedEof { position: usize },
    UnexpectedToken {
        position: usize,
        token: String,
        expected: String,
    },
    /// Left of `=` must be an identifier.
    InvalidLhs { position: usize, found: String },
    MissingRhs { position: usize },
    UnbalancedBrace { position: usize },
    UnterminatedString { offset: usize },
    EmptyInput,
}

impl ParseError {
    /// Token position of the error, if it has one.
    pub fn position(&self) -> Option<usize> {
        match *self {
            ParseError::UnexpectedEof { position }
            | ParseError::UnexpectedToken { position, .. }
            | ParseError::InvalidLhs { position, .. }
            | ParseError::MissingRhs { position }
            | ParseError::UnbalancedBrace { position } => Some(position),
            ParseError::UnterminatedString { .. } | ParseError::EmptyInput => None,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedEof { position } => {
                write!(f, "input ends inside a block (token {position})")
            }
            ParseError::UnexpectedToken {
                position,
                token,
                expected,
            } => write!(f, "expected {expected}, found `{token}` (token {position})"),
            ParseError::InvalidLhs { position, found } => {
                write!(f, "`{found}` cannot be a key (token {position})")
            }
            ParseError::MissingRhs { position } => {
                write!(f, "`=` without a value (token {position})")
            }
            ParseError::UnbalancedBrace { position } => {
                write!(f, "`}}` without a matching `{{` (token {position})")
            }
            ParseError::UnterminatedString { offset } => {
                write!(f, "string opened at byte {offset} is never closed")
            }
            ParseError::EmptyInput => f.write_str("no tokens to parse"),
        }
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_and_message() {
        let err = ParseError::MissingRhs { position: 7 };
        assert_eq!(err.position(), Some(7));
        assert_eq!(err.to_string(), "`=` without a value (token 7)");
        assert_eq!(ParseError::EmptyInput.position(), None);
        assert_eq!(
            ParseError::UnbalancedBrace { position: 2 }.to_string(),
            "`}` without a matching `{` (token 2)"
        );
    }
}
