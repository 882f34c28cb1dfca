use thiserror::Error;

use super::token::Token;

#[derive(Error, Debug, PartialEq)]
pub enum LexerError {
    #[error("Unexpected character `{1}`")]
    UnexpectedCharacter(Token, char),
    #[error("Unterminated string")]
    UnterminatedString(Token),
}

impl LexerError {
    #[cold]
    pub fn token(&self) -> &Token {
        match self {
            LexerError::UnexpectedCharacter(token, _) => token,
            LexerError::UnterminatedString(token) => token,
        }
    }
}
