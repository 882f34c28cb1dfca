//! Command-line front end for `lox-lang`: runs scripts, checks them for
//! static errors and hosts the interactive REPL.
mod cli;
mod repl;

pub use cli::{Cli, Failure, FailureKind};
pub use repl::Repl;
