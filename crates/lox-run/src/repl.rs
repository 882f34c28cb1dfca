use colored::*;
use lox_lang::{Arena, Engine, InnerError, LexerError, ParseError, Shared, SharedCell};
use miette::IntoDiagnostic;
use rustyline::{
    CompletionType, Config, Context, EditMode, Editor, Helper,
    completion::{Completer, Pair},
    error::ReadlineError,
    highlight::{CmdKind, Highlighter, MatchingBracketHighlighter},
    hint::Hinter,
    validate::{ValidationContext, ValidationResult, Validator},
};
use std::{borrow::Cow, fs, path::PathBuf};
use tracing::debug;

const PROMPT: &str = "> ";

const KEYWORDS: &[&str] = &[
    "and", "class", "else", "false", "for", "fun", "if", "nil", "or", "print", "return", "super",
    "this", "true", "var", "while",
];

const HELP: &str = "Enter statements terminated by `;`. Unclosed blocks continue on the next line.\n\
    :help  show this message\n\
    :quit  leave the session";

#[derive(Default)]
pub struct LoxLineHelper {
    matching_bracket_highlighter: MatchingBracketHighlighter,
}

impl Hinter for LoxLineHelper {
    type Hint = String;
}

impl Highlighter for LoxLineHelper {
    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(
        &'s self,
        prompt: &'p str,
        _default: bool,
    ) -> Cow<'b, str> {
        prompt.cyan().to_string().into()
    }

    fn highlight_char(&self, line: &str, pos: usize, kind: CmdKind) -> bool {
        self.matching_bracket_highlighter
            .highlight_char(line, pos, kind)
    }
}

impl Validator for LoxLineHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> Result<ValidationResult, ReadlineError> {
        if is_incomplete(ctx.input()) {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }

    fn validate_while_typing(&self) -> bool {
        false
    }
}

impl Completer for LoxLineHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> Result<(usize, Vec<Pair>), ReadlineError> {
        let (start, candidates) = keyword_completions(line, pos);

        Ok((
            start,
            candidates
                .into_iter()
                .map(|keyword| Pair {
                    display: keyword.to_string(),
                    replacement: keyword.to_string(),
                })
                .collect(),
        ))
    }
}

impl Helper for LoxLineHelper {}

/// Input that ran out before a statement or string was closed; the
/// editor keeps reading lines instead of submitting it.
fn is_incomplete(input: &str) -> bool {
    if input.trim().is_empty() || input.starts_with(':') || input.ends_with("\n\n") {
        return false;
    }

    let token_arena = Shared::new(SharedCell::new(Arena::new(256)));

    match lox_lang::parse(input, token_arena) {
        Ok(_) => false,
        Err(err) => matches!(
            err.cause,
            InnerError::Parse(ParseError::UnexpectedEOFDetected(_))
                | InnerError::Lexer(LexerError::UnterminatedString(_))
        ),
    }
}

fn keyword_completions(line: &str, pos: usize) -> (usize, Vec<&'static str>) {
    let head = &line[..pos];
    let start = head
        .char_indices()
        .rev()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let prefix = &head[start..];

    if prefix.is_empty() {
        return (start, Vec::new());
    }

    (
        start,
        KEYWORDS
            .iter()
            .copied()
            .filter(|keyword| keyword.starts_with(prefix))
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Help,
    Quit,
    Eval(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        match line.trim() {
            ":help" | ":h" => Command::Help,
            ":quit" | ":q" | ":exit" => Command::Quit,
            _ => Command::Eval(line.to_string()),
        }
    }
}

/// Interactive session. Globals live in one engine for the whole session,
/// so later lines see earlier declarations. Errors are printed and the
/// session carries on.
pub struct Repl {
    engine: Engine,
}

impl Repl {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn config_dir() -> Option<PathBuf> {
        std::env::var_os("LOX_CONFIG_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|d| d.join("lox")))
    }

    pub fn run(&mut self) -> miette::Result<()> {
        let config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .edit_mode(EditMode::Emacs)
            .color_mode(rustyline::ColorMode::Enabled)
            .build();
        let mut editor = Editor::with_config(config).into_diagnostic()?;
        editor.set_helper(Some(LoxLineHelper::default()));

        let history = Self::config_dir().map(|config_dir| {
            fs::create_dir_all(&config_dir).ok();
            config_dir.join("history.txt")
        });

        if let Some(history) = &history {
            if editor.load_history(history).is_err() {
                debug!(path = %history.display(), "no previous history");
            }
        }

        println!(
            "Welcome to lox {}. For help, type :help",
            Engine::version()
        );

        loop {
            let readline = editor.readline(PROMPT);

            match readline {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    editor.add_history_entry(&line).into_diagnostic()?;

                    match Command::parse(&line) {
                        Command::Help => println!("{}", HELP),
                        Command::Quit => break,
                        Command::Eval(code) => {
                            if let Err(err) = self.engine.eval(&code) {
                                eprintln!("{:?}", miette::Report::new(err));
                            }
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }

        if let Some(history) = &history {
            editor.save_history(history).into_diagnostic()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use scopeguard::defer;

    #[rstest]
    #[case::complete_statement("print 1;", false)]
    #[case::open_block("fun f() {", true)]
    #[case::open_class("class A {\n  m() {}\n", true)]
    #[case::missing_semicolon("print 1", true)]
    #[case::open_string("print \"abc", true)]
    #[case::unrecoverable_error("print );", false)]
    #[case::blank_line_submits("fun f() {\n\n", false)]
    #[case::command(":help", false)]
    #[case::empty("", false)]
    fn test_is_incomplete(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(is_incomplete(input), expected);
    }

    #[rstest]
    #[case::prefix("pr", 2, (0, vec!["print"]))]
    #[case::several("var x = t", 9, (8, vec!["this", "true"]))]
    #[case::after_paren("if (f", 5, (4, vec!["false", "for", "fun"]))]
    #[case::no_prefix("print ", 6, (6, vec![]))]
    #[case::no_match("xyz", 3, (0, vec![]))]
    #[case::after_multibyte_separator("x→pr", 6, (4, vec!["print"]))]
    #[case::multibyte_identifier("é + wh", 7, (5, vec!["while"]))]
    fn test_keyword_completions(
        #[case] line: &str,
        #[case] pos: usize,
        #[case] expected: (usize, Vec<&'static str>),
    ) {
        assert_eq!(keyword_completions(line, pos), expected);
    }

    #[rstest]
    #[case::help(":help", Command::Help)]
    #[case::quit(" :q ", Command::Quit)]
    #[case::exit(":exit", Command::Quit)]
    #[case::code("print 1;", Command::Eval("print 1;".to_string()))]
    fn test_command_parse(#[case] line: &str, #[case] expected: Command) {
        assert_eq!(Command::parse(line), expected);
    }

    #[test]
    fn test_config_dir_from_env() {
        let original = std::env::var_os("LOX_CONFIG_DIR");
        defer! {
            match &original {
                Some(value) => unsafe { std::env::set_var("LOX_CONFIG_DIR", value) },
                None => unsafe { std::env::remove_var("LOX_CONFIG_DIR") },
            }
        }

        unsafe { std::env::set_var("LOX_CONFIG_DIR", "/tmp/lox-config") };
        assert_eq!(Repl::config_dir(), Some(PathBuf::from("/tmp/lox-config")));
    }
}
