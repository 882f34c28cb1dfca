use thiserror::Error;

use crate::Token;

type ErrorToken = Token;
type Name = String;

#[derive(Error, Debug, PartialEq)]
pub enum RuntimeError {
    #[error("Undefined variable \"{1}\"")]
    UndefinedVariable(ErrorToken, Name),
    #[error("Undefined property \"{1}\"")]
    UndefinedProperty(ErrorToken, Name),
    #[error("Undefined class method \"{1}\"")]
    UndefinedClassMethod(ErrorToken, Name),
    #[error("Invalid number of arguments in \"{1}\", expected {2}, got {3}")]
    InvalidNumberOfArguments(ErrorToken, Name, usize, usize),
    #[error("Can only call functions and classes, got {1}")]
    NotCallable(ErrorToken, Name),
    #[error("Operand must be a number")]
    OperandMustBeANumber(ErrorToken),
    #[error("Operands must be numbers")]
    OperandsMustBeNumbers(ErrorToken),
    #[error("Operands must be two numbers or two strings")]
    OperandsMustBeNumbersOrStrings(ErrorToken),
    #[error("Only instances have properties")]
    OnlyInstancesHaveProperties(ErrorToken),
    #[error("Only instances have fields")]
    OnlyInstancesHaveFields(ErrorToken),
    #[error("Superclass must be a class")]
    SuperclassMustBeAClass(ErrorToken),
    #[error("Maximum call stack depth of {1} exceeded")]
    StackOverflow(ErrorToken, u32),
    #[error("Internal error: {1}")]
    InternalError(ErrorToken, String),
}

impl RuntimeError {
    #[cold]
    pub fn token(&self) -> &Token {
        match self {
            RuntimeError::UndefinedVariable(token, _) => token,
            RuntimeError::UndefinedProperty(token, _) => token,
            RuntimeError::UndefinedClassMethod(token, _) => token,
            RuntimeError::InvalidNumberOfArguments(token, _, _, _) => token,
            RuntimeError::NotCallable(token, _) => token,
            RuntimeError::OperandMustBeANumber(token) => token,
            RuntimeError::OperandsMustBeNumbers(token) => token,
            RuntimeError::OperandsMustBeNumbersOrStrings(token) => token,
            RuntimeError::OnlyInstancesHaveProperties(token) => token,
            RuntimeError::OnlyInstancesHaveFields(token) => token,
            RuntimeError::SuperclassMustBeAClass(token) => token,
            RuntimeError::StackOverflow(token, _) => token,
            RuntimeError::InternalError(token, _) => token,
        }
    }
}
