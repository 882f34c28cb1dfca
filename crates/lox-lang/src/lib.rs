//! `lox-lang` provides the lexer, parser, static resolver and tree-walking
//! evaluator for the lox language.
//!
//! ## Examples
//!
//! ```rust
//! use lox_lang::Engine;
//!
//! let mut engine = Engine::capturing();
//! engine
//!     .eval(
//!         "class Greeter {
//!            Greeter(name) { this.name = name; }
//!            greet() { print \"hello, \" + this.name; }
//!          }
//!          Greeter(\"lox\").greet();",
//!     )
//!     .unwrap();
//!
//! assert_eq!(engine.take_output(), vec!["hello, lox".to_string()]);
//!
//! // Static diagnostics are reported before anything runs.
//! assert!(engine.check("return 1;").is_err());
//! ```
mod arena;
mod ast;
mod engine;
mod error;
mod eval;
mod ident;
mod lexer;
mod number;
mod range;

use itertools::Itertools;
use std::cell::RefCell;
use std::rc::Rc;

pub use arena::{Arena, ArenaId};
pub use ast::Program;
pub use ast::TokenId;
pub use ast::error::ParseError;
pub use ast::node::{
    BinaryOp as AstBinaryOp, ClassDecl as AstClassDecl, Expr as AstExpr,
    FunctionDecl as AstFunctionDecl, IdentWithToken as AstIdent, Literal as AstLiteral,
    LogicalOp as AstLogicalOp, MethodDecl as AstMethodDecl, Node as AstNode, Stmt as AstStmt,
    UnaryOp as AstUnaryOp,
};
pub use ast::parser::Parser as AstParser;
pub use engine::Engine;
pub use error::{Error, InnerError};
pub use eval::error::RuntimeError;
pub use eval::resolver::{ResolveError, Resolutions, Resolver};
pub use eval::runtime_value::{BlockExecutor, Class, Function, Instance, RuntimeValue};
pub use eval::{Evaluator, Flow, Options as EvalOptions, Output as EvalOutput};
pub use ident::Ident;
pub use lexer::error::LexerError;
pub use lexer::token::{Token, TokenKind};
pub use number::Number;
pub use range::{Position, Range};

pub type Shared<T> = Rc<T>;
pub type SharedCell<T> = RefCell<T>;
pub type TokenArena = Shared<SharedCell<Arena<Shared<Token>>>>;

pub type LoxResult = Result<(), Error>;

const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Runs `f` with at least `STACK_RED_ZONE` bytes of native stack left,
/// switching to a fresh heap-allocated segment when the current one runs
/// low. The parser, resolver and evaluator recurse through this, so deep
/// nesting is bounded by memory and `max_call_stack_depth`, not by the
/// thread's stack size.
#[inline(always)]
pub(crate) fn ensure_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, f)
}

#[inline(always)]
pub(crate) fn token_alloc(arena: &TokenArena, token: &Shared<Token>) -> TokenId {
    arena.borrow_mut().alloc(Shared::clone(token))
}

/// Returns the token a node was parsed from. Ids always come from the
/// same arena, so a miss only happens when mixing arenas; the caller gets
/// an `Eof` token in that case.
#[inline(always)]
pub(crate) fn get_token(arena: &TokenArena, token_id: TokenId) -> Shared<Token> {
    arena
        .borrow()
        .get(token_id)
        .map(Shared::clone)
        .unwrap_or_else(|| Shared::new(Token::new(Range::default(), TokenKind::Eof)))
}

#[allow(clippy::result_large_err)]
pub fn parse(code: &str, token_arena: TokenArena) -> Result<Program, Error> {
    let tokens = tokenize(code)?
        .into_iter()
        .map(Shared::new)
        .collect_vec();

    AstParser::new(tokens.iter(), token_arena)
        .parse()
        .map_err(|e| Error::from_error(code, InnerError::Parse(e)))
}

#[allow(clippy::result_large_err)]
pub fn tokenize(code: &str) -> Result<Vec<Token>, Error> {
    lexer::tokenize(code).map_err(|e| Error::from_error(code, InnerError::Lexer(e)))
}
