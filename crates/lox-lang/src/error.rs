use miette::{Diagnostic, SourceOffset, SourceSpan};

use crate::{
    Token, ast::error::ParseError, eval::error::RuntimeError, eval::resolver::ResolveError,
    lexer::error::LexerError,
};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InnerError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl InnerError {
    pub fn token(&self) -> &Token {
        match self {
            InnerError::Lexer(err) => err.token(),
            InnerError::Parse(err) => err.token(),
            InnerError::Resolve(err) => err.token(),
            InnerError::Runtime(err) => err.token(),
        }
    }
}

/// Represents a high-level error with diagnostic information for the user.
#[derive(PartialEq, Debug, thiserror::Error)]
#[error("{cause}")]
pub struct Error {
    /// The underlying cause of the error.
    pub cause: InnerError,
    /// The source code related to the error.
    pub source_code: String,
    /// The location in the source code for diagnostics.
    pub location: SourceSpan,
    /// Further diagnostics reported by the same pass.
    pub related: Vec<Error>,
}

impl Error {
    pub fn from_error(source_code: impl Into<String>, cause: InnerError) -> Self {
        let source_code = source_code.into();
        let location = Self::span(&source_code, cause.token());

        Self {
            cause,
            source_code,
            location,
            related: Vec::new(),
        }
    }

    /// Folds every resolver diagnostic into one error: the first becomes
    /// the primary cause, the rest are attached as related diagnostics.
    pub fn from_resolve_errors(
        source_code: impl Into<String>,
        errors: Vec<ResolveError>,
    ) -> Option<Self> {
        let source_code = source_code.into();
        let mut errors = errors.into_iter();
        let first = errors.next()?;

        let mut error = Self::from_error(source_code.clone(), InnerError::Resolve(first));
        error.related = errors
            .map(|e| Self::from_error(source_code.clone(), InnerError::Resolve(e)))
            .collect();

        Some(error)
    }

    /// Every diagnostic carried by this error, the primary one first.
    pub fn causes(&self) -> impl Iterator<Item = &InnerError> {
        std::iter::once(&self.cause).chain(self.related.iter().map(|e| &e.cause))
    }

    pub fn is_runtime_error(&self) -> bool {
        matches!(self.cause, InnerError::Runtime(_))
    }

    fn span(source_code: &str, token: &Token) -> SourceSpan {
        let start = SourceOffset::from_location(
            source_code,
            token.range.start.line as usize,
            token.range.start.column,
        );
        let end = SourceOffset::from_location(
            source_code,
            token.range.end.line as usize,
            token.range.end.column,
        );

        SourceSpan::new(
            start,
            std::cmp::max(end.offset().saturating_sub(start.offset()), 1),
        )
    }
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let c = match &self.cause {
            InnerError::Lexer(LexerError::UnexpectedCharacter(_, _)) => {
                "LexerError::UnexpectedCharacter"
            }
            InnerError::Lexer(LexerError::UnterminatedString(_)) => "LexerError::UnterminatedString",
            InnerError::Parse(ParseError::UnexpectedToken(_)) => "ParseError::UnexpectedToken",
            InnerError::Parse(ParseError::UnexpectedEOFDetected(_)) => {
                "ParseError::UnexpectedEOFDetected"
            }
            InnerError::Parse(ParseError::ExpectedToken { .. }) => "ParseError::ExpectedToken",
            InnerError::Parse(ParseError::InvalidAssignmentTarget(_)) => {
                "ParseError::InvalidAssignmentTarget"
            }
            InnerError::Parse(ParseError::TooManyArguments(_, _)) => "ParseError::TooManyArguments",
            InnerError::Resolve(ResolveError::ReturnFromTopLevel(_)) => {
                "ResolveError::ReturnFromTopLevel"
            }
            InnerError::Resolve(ResolveError::ReturnValueFromInitializer(_)) => {
                "ResolveError::ReturnValueFromInitializer"
            }
            InnerError::Resolve(ResolveError::ThisOutsideClass(_)) => "ResolveError::ThisOutsideClass",
            InnerError::Resolve(ResolveError::ThisInClassMethod(_)) => {
                "ResolveError::ThisInClassMethod"
            }
            InnerError::Resolve(ResolveError::SuperOutsideClass(_)) => {
                "ResolveError::SuperOutsideClass"
            }
            InnerError::Resolve(ResolveError::SuperWithoutSuperclass(_)) => {
                "ResolveError::SuperWithoutSuperclass"
            }
            InnerError::Resolve(ResolveError::AlreadyDeclared(_, _)) => {
                "ResolveError::AlreadyDeclared"
            }
            InnerError::Resolve(ResolveError::ReadInOwnInitializer(_, _)) => {
                "ResolveError::ReadInOwnInitializer"
            }
            InnerError::Resolve(ResolveError::InheritFromSelf(_, _)) => "ResolveError::InheritFromSelf",
            InnerError::Runtime(RuntimeError::UndefinedVariable(_, _)) => {
                "RuntimeError::UndefinedVariable"
            }
            InnerError::Runtime(RuntimeError::UndefinedProperty(_, _)) => {
                "RuntimeError::UndefinedProperty"
            }
            InnerError::Runtime(RuntimeError::UndefinedClassMethod(_, _)) => {
                "RuntimeError::UndefinedClassMethod"
            }
            InnerError::Runtime(RuntimeError::InvalidNumberOfArguments(_, _, _, _)) => {
                "RuntimeError::InvalidNumberOfArguments"
            }
            InnerError::Runtime(RuntimeError::NotCallable(_, _)) => "RuntimeError::NotCallable",
            InnerError::Runtime(RuntimeError::OperandMustBeANumber(_)) => {
                "RuntimeError::OperandMustBeANumber"
            }
            InnerError::Runtime(RuntimeError::OperandsMustBeNumbers(_)) => {
                "RuntimeError::OperandsMustBeNumbers"
            }
            InnerError::Runtime(RuntimeError::OperandsMustBeNumbersOrStrings(_)) => {
                "RuntimeError::OperandsMustBeNumbersOrStrings"
            }
            InnerError::Runtime(RuntimeError::OnlyInstancesHaveProperties(_)) => {
                "RuntimeError::OnlyInstancesHaveProperties"
            }
            InnerError::Runtime(RuntimeError::OnlyInstancesHaveFields(_)) => {
                "RuntimeError::OnlyInstancesHaveFields"
            }
            InnerError::Runtime(RuntimeError::SuperclassMustBeAClass(_)) => {
                "RuntimeError::SuperclassMustBeAClass"
            }
            InnerError::Runtime(RuntimeError::StackOverflow(_, _)) => "RuntimeError::StackOverflow",
            InnerError::Runtime(RuntimeError::InternalError(_, _)) => "RuntimeError::InternalError",
        };

        Some(Box::new(c))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let msg = match &self.cause {
            InnerError::Lexer(LexerError::UnterminatedString(_)) => {
                Some("Close the string literal with a matching `\"`.".to_string())
            }
            InnerError::Parse(ParseError::UnexpectedEOFDetected(_)) => Some(
                "Input ended unexpectedly. Check for a missing `;`, `)` or `}`.".to_string(),
            ),
            InnerError::Parse(ParseError::InvalidAssignmentTarget(_)) => {
                Some("Only variables and properties can be assigned to.".to_string())
            }
            InnerError::Resolve(ResolveError::ReturnValueFromInitializer(_)) => Some(
                "Initializers always return the new instance; use a bare `return;`.".to_string(),
            ),
            InnerError::Resolve(ResolveError::ThisInClassMethod(_)) => {
                Some("Class methods are called on the class and have no instance.".to_string())
            }
            InnerError::Resolve(ResolveError::AlreadyDeclared(_, name)) => Some(format!(
                "Rename one of the declarations or assign to '{name}' instead."
            )),
            InnerError::Resolve(ResolveError::ReadInOwnInitializer(_, name)) => Some(format!(
                "'{name}' is not ready until its initializer finishes."
            )),
            InnerError::Runtime(RuntimeError::UndefinedVariable(_, name)) => {
                Some(format!("'{name}' is not defined. Did you forget to declare it?"))
            }
            InnerError::Runtime(RuntimeError::UndefinedClassMethod(_, name)) => Some(format!(
                "Declare it inside the class body as `class {name}(...) {{ ... }}`."
            )),
            InnerError::Runtime(RuntimeError::InvalidNumberOfArguments(_, _, expected, actual)) => {
                Some(format!(
                    "Invalid number of arguments: expected {expected}, got {actual}."
                ))
            }
            InnerError::Runtime(RuntimeError::StackOverflow(_, _)) => Some(
                "Check for unbounded recursion, or raise the limit with --max-call-depth."
                    .to_string(),
            ),
            _ => None,
        };

        msg.map(|m| Box::new(m) as Box<dyn std::fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(
            miette::LabeledSpan::new_with_span(Some(format!("{}", self.cause)), self.location),
        )))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source_code)
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn Diagnostic> + 'a>> {
        if self.related.is_empty() {
            return None;
        }

        Some(Box::new(
            self.related.iter().map(|e| e as &'a dyn Diagnostic),
        ))
    }
}
