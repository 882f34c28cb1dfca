use tracing::debug;

use crate::{
    Arena, LoxResult, Program, RuntimeValue, Shared, SharedCell, TokenArena,
    error::{self, InnerError},
    eval::{Evaluator, Output, resolver::Resolutions, resolver::Resolver},
    parse,
};

/// Runs lox source code: lex, parse, resolve, evaluate.
///
/// Globals survive between calls to [`Engine::eval`], which is what the
/// REPL relies on.
///
/// Tokens and resolved hop counts are kept for the lifetime of the
/// engine: a closure created by one `eval` can run during any later one
/// and still needs both. Memory therefore grows with the total amount of
/// source evaluated. Long-running hosts that do not need state carried
/// over should start a fresh engine instead of reusing one.
#[derive(Debug, Clone)]
pub struct Engine {
    pub(crate) evaluator: Evaluator,
    token_arena: TokenArena,
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_output(Output::Stdout)
    }
}

impl Engine {
    /// An engine whose `print` output is kept in memory; see
    /// [`Engine::take_output`].
    pub fn capturing() -> Self {
        Self::with_output(Output::Buffer(Vec::new()))
    }

    fn with_output(output: Output) -> Self {
        let token_arena = Shared::new(SharedCell::new(Arena::new(4096)));

        Self {
            evaluator: Evaluator::new(Shared::clone(&token_arena), output),
            token_arena,
        }
    }

    pub fn set_max_call_stack_depth(&mut self, max_call_stack_depth: u32) {
        self.evaluator.options.max_call_stack_depth = max_call_stack_depth;
    }

    /// Lines printed since the last call. Always empty for an engine
    /// writing to stdout.
    pub fn take_output(&mut self) -> Vec<String> {
        self.evaluator.take_output()
    }

    pub fn global(&self, name: &str) -> Option<RuntimeValue> {
        self.evaluator.global(name)
    }

    /// Lexes, parses and resolves `code` without running it.
    #[allow(clippy::result_large_err)]
    pub fn check(&self, code: &str) -> LoxResult {
        self.compile(code).map(|_| ())
    }

    #[allow(clippy::result_large_err)]
    pub fn eval(&mut self, code: &str) -> LoxResult {
        let (program, resolutions) = self.compile(code)?;

        debug!(statements = program.len(), resolved = resolutions.len(), "evaluating");
        self.evaluator
            .eval(&program, resolutions)
            .map_err(|e| error::Error::from_error(code, InnerError::Runtime(e)))
    }

    #[allow(clippy::result_large_err)]
    fn compile(&self, code: &str) -> Result<(Program, Resolutions), error::Error> {
        let program = parse(code, Shared::clone(&self.token_arena))?;
        debug!(statements = program.len(), "parsed");

        let (resolutions, errors) = Resolver::new(Shared::clone(&self.token_arena)).resolve(&program);
        debug!(resolved = resolutions.len(), diagnostics = errors.len(), "resolved");

        match error::Error::from_resolve_errors(code, errors) {
            Some(err) => Err(err),
            None => Ok((program, resolutions)),
        }
    }

    pub const fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}
