use thiserror::Error;

use crate::Token;

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Unexpected token `{0}`")]
    UnexpectedToken(Token),
    #[error("Unexpected EOF detected")]
    UnexpectedEOFDetected(Token),
    #[error("Expected {expected} but got `{got}`")]
    ExpectedToken { expected: &'static str, got: Token },
    #[error("Invalid assignment target")]
    InvalidAssignmentTarget(Token),
    #[error("Can't have more than 255 {1}")]
    TooManyArguments(Token, &'static str),
}

impl ParseError {
    #[cold]
    pub fn token(&self) -> &Token {
        match self {
            ParseError::UnexpectedToken(token) => token,
            ParseError::UnexpectedEOFDetected(token) => token,
            ParseError::ExpectedToken { got, .. } => got,
            ParseError::InvalidAssignmentTarget(token) => token,
            ParseError::TooManyArguments(token, _) => token,
        }
    }
}
