use thiserror::Error;

use super::error::RuntimeError;
use super::runtime_value::RuntimeValue;
use crate::{Ident, Shared, SharedCell, Token};
use rustc_hash::FxHashMap;
use std::fmt::Debug;

#[derive(Error, Debug, PartialEq)]
pub enum EnvError {
    #[error("Undefined variable \"{0}\"")]
    UndefinedVariable(Ident),
}

impl EnvError {
    pub fn to_runtime_error(&self, token: &Token) -> RuntimeError {
        match self {
            EnvError::UndefinedVariable(name) => {
                RuntimeError::UndefinedVariable(token.clone(), name.to_string())
            }
        }
    }
}

/// One frame of the runtime scope chain.
///
/// Parents are held strongly: a closure keeps its whole captured chain
/// alive for as long as the closure itself is reachable.
#[derive(Debug, Clone, Default)]
pub struct Env {
    context: FxHashMap<Ident, RuntimeValue>,
    parent: Option<Shared<SharedCell<Env>>>,
}

impl PartialEq for Env {
    fn eq(&self, other: &Self) -> bool {
        self.context == other.context
            && self.parent.as_ref().map(|p| p.as_ptr()) == other.parent.as_ref().map(|p| p.as_ptr())
    }
}

impl Env {
    pub fn with_parent(parent: Shared<SharedCell<Env>>) -> Self {
        Self {
            context: FxHashMap::default(),
            parent: Some(parent),
        }
    }

    #[inline(always)]
    pub fn define(&mut self, ident: Ident, runtime_value: RuntimeValue) {
        self.context.insert(ident, runtime_value);
    }

    /// Looks `ident` up in the frame exactly `depth` parent links away.
    pub fn get_at(&self, depth: usize, ident: Ident) -> Result<RuntimeValue, EnvError> {
        if depth == 0 {
            return self
                .context
                .get(&ident)
                .cloned()
                .ok_or(EnvError::UndefinedVariable(ident));
        }

        match &self.parent {
            Some(parent) => parent.borrow().get_at(depth - 1, ident),
            None => Err(EnvError::UndefinedVariable(ident)),
        }
    }

    pub fn assign_at(
        &mut self,
        depth: usize,
        ident: Ident,
        runtime_value: RuntimeValue,
    ) -> Result<(), EnvError> {
        if depth == 0 {
            return match self.context.get_mut(&ident) {
                Some(slot) => {
                    *slot = runtime_value;
                    Ok(())
                }
                None => Err(EnvError::UndefinedVariable(ident)),
            };
        }

        match &self.parent {
            Some(parent) => parent.borrow_mut().assign_at(depth - 1, ident, runtime_value),
            None => Err(EnvError::UndefinedVariable(ident)),
        }
    }

    /// Name-based lookup used for globals, which the resolver never tracks.
    pub fn get(&self, ident: Ident) -> Result<RuntimeValue, EnvError> {
        match self.context.get(&ident) {
            Some(value) => Ok(value.clone()),
            None => match &self.parent {
                Some(parent) => parent.borrow().get(ident),
                None => Err(EnvError::UndefinedVariable(ident)),
            },
        }
    }

    pub fn assign(&mut self, ident: Ident, runtime_value: RuntimeValue) -> Result<(), EnvError> {
        match self.context.get_mut(&ident) {
            Some(slot) => {
                *slot = runtime_value;
                Ok(())
            }
            None => match &self.parent {
                Some(parent) => parent.borrow_mut().assign(ident, runtime_value),
                None => Err(EnvError::UndefinedVariable(ident)),
            },
        }
    }

    pub fn contains(&self, ident: Ident) -> bool {
        self.context.contains_key(&ident)
    }

    pub fn parent(&self) -> Option<Shared<SharedCell<Env>>> {
        self.parent.as_ref().map(Shared::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn chain(depth: usize) -> Vec<Shared<SharedCell<Env>>> {
        let mut envs = vec![Shared::new(SharedCell::new(Env::default()))];
        for i in 0..depth {
            let parent = Shared::clone(&envs[i]);
            envs.push(Shared::new(SharedCell::new(Env::with_parent(parent))));
        }
        envs
    }

    #[test]
    fn test_env_define_and_get() {
        let mut env = Env::default();
        let ident = Ident::new("x");
        let value = RuntimeValue::Number(42.0.into());
        env.define(ident, value.clone());

        assert_eq!(env.get(ident).unwrap(), value);
        assert_eq!(env.get_at(0, ident).unwrap(), value);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(3)]
    fn test_get_at_walks_exactly_depth_links(#[case] depth: usize) {
        let envs = chain(depth);
        let ident = Ident::new("target");
        envs[0]
            .borrow_mut()
            .define(ident, RuntimeValue::String("root".to_string()));

        let innermost = envs[depth].borrow();
        assert_eq!(
            innermost.get_at(depth, ident).unwrap(),
            RuntimeValue::String("root".to_string())
        );
        if depth > 0 {
            assert_eq!(
                innermost.get_at(depth - 1, ident),
                Err(EnvError::UndefinedVariable(ident))
            );
        }
    }

    #[test]
    fn test_get_at_beyond_root_fails() {
        let envs = chain(1);
        let ident = Ident::new("x");
        envs[0].borrow_mut().define(ident, RuntimeValue::Nil);

        assert!(envs[1].borrow().get_at(5, ident).is_err());
    }

    #[test]
    fn test_assign_at_updates_the_declaring_frame() {
        let envs = chain(2);
        let ident = Ident::new("counter");
        envs[0].borrow_mut().define(ident, RuntimeValue::Number(1.0.into()));

        envs[2]
            .borrow_mut()
            .assign_at(2, ident, RuntimeValue::Number(2.0.into()))
            .unwrap();

        assert_eq!(
            envs[0].borrow().get_at(0, ident).unwrap(),
            RuntimeValue::Number(2.0.into())
        );
        assert!(!envs[2].borrow().contains(ident));
    }

    #[test]
    fn test_shadowing_keeps_outer_value() {
        let envs = chain(1);
        let ident = Ident::new("x");
        envs[0].borrow_mut().define(ident, RuntimeValue::Number(1.0.into()));
        envs[1].borrow_mut().define(ident, RuntimeValue::Number(2.0.into()));

        assert_eq!(envs[1].borrow().get(ident).unwrap(), RuntimeValue::Number(2.0.into()));
        assert_eq!(envs[1].borrow().get_at(1, ident).unwrap(), RuntimeValue::Number(1.0.into()));
    }

    #[test]
    fn test_assign_undefined_global_fails() {
        let mut env = Env::default();
        let ident = Ident::new("missing");

        assert_eq!(
            env.assign(ident, RuntimeValue::Nil),
            Err(EnvError::UndefinedVariable(ident))
        );
    }

    #[test]
    fn test_child_keeps_parent_alive() {
        let child = {
            let parent = Shared::new(SharedCell::new(Env::default()));
            parent
                .borrow_mut()
                .define(Ident::new("captured"), RuntimeValue::Bool(true));
            Env::with_parent(parent)
        };

        assert_eq!(
            child.get_at(1, Ident::new("captured")).unwrap(),
            RuntimeValue::Bool(true)
        );
    }
}
