use std::sync::{LazyLock, Mutex};

use string_interner::{DefaultBackend, DefaultSymbol, StringInterner};

static STRING_INTERNER: LazyLock<Mutex<StringInterner<DefaultBackend>>> =
    LazyLock::new(|| Mutex::new(StringInterner::default()));

/// An interned identifier. Every name table in the interpreter (scope
/// frames, environments, fields, method tables) is keyed by `Ident`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(DefaultSymbol);

impl Ident {
    pub fn new(s: &str) -> Self {
        Self(
            STRING_INTERNER
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .get_or_intern(s),
        )
    }

    pub fn as_str(&self) -> String {
        self.resolve_with(|s| s.to_string())
    }

    pub fn resolve_with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        let interner = STRING_INTERNER
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(interner.resolve(self.0).unwrap_or_default())
    }
}

impl From<&str> for Ident {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.resolve_with(|s| write!(f, "{}", s))
    }
}
