use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::env::Env;
use super::error::RuntimeError;
use super::runtime_value::RuntimeValue;
use crate::ast::constants::CLOCK;
use crate::{Ident, Number, Token};

#[derive(Clone, Debug)]
pub struct BuiltinFunction {
    pub num_params: usize,
    pub func: fn(&Token, &[RuntimeValue]) -> Result<RuntimeValue, RuntimeError>,
}

impl BuiltinFunction {
    pub fn new(
        num_params: usize,
        func: fn(&Token, &[RuntimeValue]) -> Result<RuntimeValue, RuntimeError>,
    ) -> Self {
        BuiltinFunction { num_params, func }
    }
}

pub static BUILTIN_FUNCTIONS: LazyLock<FxHashMap<SmolStr, BuiltinFunction>> =
    LazyLock::new(|| {
        let mut map = FxHashMap::default();

        map.insert(
            SmolStr::new(CLOCK),
            BuiltinFunction::new(0, |token, _| {
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|elapsed| RuntimeValue::Number(Number::new(elapsed.as_secs_f64())))
                    .map_err(|e| RuntimeError::InternalError(token.clone(), e.to_string()))
            }),
        );

        map
    });

#[inline(always)]
pub fn get_builtin_function(name: Ident) -> Option<&'static BuiltinFunction> {
    name.resolve_with(|name| BUILTIN_FUNCTIONS.get(name))
}

/// Defines every builtin as a global.
pub fn define_builtins(env: &mut Env) {
    for name in BUILTIN_FUNCTIONS.keys() {
        let ident = Ident::new(name);
        env.define(ident, RuntimeValue::NativeFunction(ident));
    }
}

pub fn eval_builtin(
    name: Ident,
    token: &Token,
    args: &[RuntimeValue],
) -> Result<RuntimeValue, RuntimeError> {
    match get_builtin_function(name) {
        Some(builtin) => (builtin.func)(token, args),
        None => Err(RuntimeError::UndefinedVariable(token.clone(), name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Range, TokenKind};

    #[test]
    fn test_clock_returns_seconds_since_epoch() {
        let token = Token::new(Range::default(), TokenKind::Eof);
        let RuntimeValue::Number(now) = eval_builtin(Ident::new(CLOCK), &token, &[]).unwrap() else {
            panic!("clock must return a number");
        };

        // 2020-01-01T00:00:00Z
        assert!(now.value() > 1_577_836_800.0);
    }

    #[test]
    fn test_define_builtins() {
        let mut env = Env::default();
        define_builtins(&mut env);

        assert_eq!(
            env.get(Ident::new(CLOCK)).unwrap(),
            RuntimeValue::NativeFunction(Ident::new(CLOCK))
        );
        assert_eq!(get_builtin_function(Ident::new(CLOCK)).unwrap().num_params, 0);
    }

    #[test]
    fn test_unknown_builtin() {
        let token = Token::new(Range::default(), TokenKind::Eof);
        assert!(eval_builtin(Ident::new("nope"), &token, &[]).is_err());
        assert!(get_builtin_function(Ident::new("nope")).is_none());
    }
}
