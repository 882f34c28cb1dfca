use clap::{Parser, Subcommand};
use colored::Colorize;
use lox_lang::Engine;
use miette::{NamedSource, miette};
use std::io;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::repl::Repl;

#[derive(Parser, Debug, Default)]
#[command(name = "lox")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To run a script:\n\
    lox script.lox\n\n\
    ## To check scripts without running them:\n\
    lox check a.lox b.lox\n\n\
    ## To start a REPL session:\n\
    lox repl")]
#[command(
    about = "lox is a small dynamically typed scripting language with closures and classes.",
    long_about = None
)]
pub struct Cli {
    #[clap(subcommand)]
    commands: Option<Commands>,

    /// Maximum depth of nested calls before a stack overflow is reported
    #[arg(long, global = true, value_name = "DEPTH")]
    max_call_depth: Option<u32>,

    /// Print debug logs to stderr
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    /// Script to run. Starts a REPL session when omitted
    file: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
enum Commands {
    /// Run a script
    Run { file: PathBuf },
    /// Report lexer, parser and binding errors without running anything
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Start a REPL session
    Repl,
}

/// Why a command failed. The ordering is by severity: when several
/// files fail, the most severe kind decides the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailureKind {
    Static,
    Runtime,
    Io,
}

impl FailureKind {
    pub fn exit_code(self) -> u8 {
        match self {
            FailureKind::Static => 65,
            FailureKind::Runtime => 70,
            FailureKind::Io => 74,
        }
    }
}

#[derive(Debug)]
pub struct Failure {
    kind: FailureKind,
    reports: Vec<miette::Report>,
}

impl Failure {
    fn new(kind: FailureKind, report: miette::Report) -> Self {
        Self {
            kind,
            reports: vec![report],
        }
    }

    fn from_lox_error(path: &Path, code: &str, err: lox_lang::Error) -> Self {
        let kind = if err.is_runtime_error() {
            FailureKind::Runtime
        } else {
            FailureKind::Static
        };
        let report = miette::Report::new(err).with_source_code(NamedSource::new(
            path.display().to_string(),
            code.to_string(),
        ));

        Self::new(kind, report)
    }

    fn merge(mut self, other: Failure) -> Self {
        self.kind = self.kind.max(other.kind);
        self.reports.extend(other.reports);
        self
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }

    pub fn reports(&self) -> &[miette::Report] {
        &self.reports
    }
}

impl Cli {
    /// Installs the stderr log subscriber. `RUST_LOG` wins unless
    /// `--verbose` is given.
    pub fn init_tracing(&self) {
        let filter = if self.verbose {
            EnvFilter::new("lox=debug")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lox=warn"))
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    }

    pub fn run(&self) -> Result<(), Failure> {
        match &self.commands {
            Some(Commands::Run { file }) => self.run_file(file),
            Some(Commands::Check { files }) => self.check_files(files),
            Some(Commands::Repl) => self.repl(),
            None => match &self.file {
                Some(file) => self.run_file(file),
                None => self.repl(),
            },
        }
    }

    fn engine(&self) -> Engine {
        let mut engine = Engine::default();

        if let Some(depth) = self.max_call_depth {
            engine.set_max_call_stack_depth(depth);
        }

        engine
    }

    fn run_file(&self, path: &Path) -> Result<(), Failure> {
        let code = read_source(path)?;
        debug!(path = %path.display(), "running script");

        self.engine()
            .eval(&code)
            .map_err(|err| Failure::from_lox_error(path, &code, err))
    }

    fn check_files(&self, files: &[PathBuf]) -> Result<(), Failure> {
        let engine = self.engine();
        let mut failure: Option<Failure> = None;

        for path in files {
            let result = read_source(path).and_then(|code| {
                engine
                    .check(&code)
                    .map_err(|err| Failure::from_lox_error(path, &code, err))
            });

            match result {
                Ok(()) => println!("{} {}", "ok".green(), path.display()),
                Err(err) => {
                    println!("{} {}", "error".red(), path.display());
                    failure = Some(match failure {
                        Some(failure) => failure.merge(err),
                        None => err,
                    });
                }
            }
        }

        failure.map_or(Ok(()), Err)
    }

    fn repl(&self) -> Result<(), Failure> {
        Repl::new(self.engine())
            .run()
            .map_err(|report| Failure::new(FailureKind::Io, report))
    }
}

fn read_source(path: &Path) -> Result<String, Failure> {
    fs::read_to_string(path).map_err(|e| {
        Failure::new(
            FailureKind::Io,
            miette!("Failed to read {}: {}", path.display(), e),
        )
    })
}
