use std::fmt;

use rustc_hash::FxHashMap;

use super::Flow;
use super::env::Env;
use super::error::RuntimeError;
use crate::ast::constants::THIS;
use crate::ast::node::{FunctionDecl, IdentWithToken, Stmt};
use crate::{Ident, Number, Shared, SharedCell};

/// Runs a function body in a prepared environment. Implemented by the
/// evaluator; `Function::call` only knows how to set up the frame.
pub trait BlockExecutor {
    fn execute_block(
        &mut self,
        statements: &[Stmt],
        env: Shared<SharedCell<Env>>,
    ) -> Result<Flow, RuntimeError>;
}

#[derive(Clone, Default)]
pub enum RuntimeValue {
    #[default]
    Nil,
    Bool(bool),
    Number(Number),
    String(String),
    Function(Shared<Function>),
    NativeFunction(Ident),
    Class(Shared<Class>),
    Instance(Shared<SharedCell<Instance>>),
}

impl PartialEq for RuntimeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RuntimeValue::Nil, RuntimeValue::Nil) => true,
            (RuntimeValue::Bool(a), RuntimeValue::Bool(b)) => a == b,
            (RuntimeValue::Number(a), RuntimeValue::Number(b)) => a == b,
            (RuntimeValue::String(a), RuntimeValue::String(b)) => a == b,
            (RuntimeValue::Function(a), RuntimeValue::Function(b)) => Shared::ptr_eq(a, b),
            (RuntimeValue::NativeFunction(a), RuntimeValue::NativeFunction(b)) => a == b,
            (RuntimeValue::Class(a), RuntimeValue::Class(b)) => Shared::ptr_eq(a, b),
            (RuntimeValue::Instance(a), RuntimeValue::Instance(b)) => Shared::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for RuntimeValue {
    fn from(b: bool) -> Self {
        RuntimeValue::Bool(b)
    }
}

impl From<Number> for RuntimeValue {
    fn from(n: Number) -> Self {
        RuntimeValue::Number(n)
    }
}

impl From<String> for RuntimeValue {
    fn from(s: String) -> Self {
        RuntimeValue::String(s)
    }
}

impl From<&str> for RuntimeValue {
    fn from(s: &str) -> Self {
        RuntimeValue::String(s.to_string())
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::Nil => write!(f, "nil"),
            RuntimeValue::Bool(b) => write!(f, "{}", b),
            RuntimeValue::Number(n) => write!(f, "{}", n),
            RuntimeValue::String(s) => write!(f, "{}", s),
            RuntimeValue::Function(function) => write!(f, "{}", function),
            RuntimeValue::NativeFunction(_) => write!(f, "<native fn>"),
            RuntimeValue::Class(class) => write!(f, "<class {}>", class.name),
            RuntimeValue::Instance(instance) => write!(f, "{} instance", instance.borrow().class.name),
        }
    }
}

// Closures can reach themselves through their environment, so Debug
// prints the display form instead of walking the value graph.
impl fmt::Debug for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::String(s) => write!(f, "{:?}", s),
            _ => write!(f, "{}", self),
        }
    }
}

impl RuntimeValue {
    pub fn name(&self) -> &str {
        match self {
            RuntimeValue::Nil => "nil",
            RuntimeValue::Bool(_) => "bool",
            RuntimeValue::Number(_) => "number",
            RuntimeValue::String(_) => "string",
            RuntimeValue::Function(_) => "function",
            RuntimeValue::NativeFunction(_) => "native_function",
            RuntimeValue::Class(_) => "class",
            RuntimeValue::Instance(_) => "instance",
        }
    }

    /// `nil` and `false` are falsy, everything else is truthy.
    #[inline(always)]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, RuntimeValue::Nil | RuntimeValue::Bool(false))
    }

    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        matches!(self, RuntimeValue::Nil)
    }
}

/// A closure: a shared declaration plus the environment it captured.
#[derive(Clone)]
pub struct Function {
    declaration: Shared<FunctionDecl>,
    closure: Shared<SharedCell<Env>>,
    is_initializer: bool,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.declaration.name)
            .field("arity", &self.arity())
            .field("is_initializer", &self.is_initializer)
            .finish()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.declaration.name {
            Some(name) => write!(f, "<fn {}>", name),
            None => write!(f, "<fn>"),
        }
    }
}

impl Function {
    pub fn new(
        declaration: Shared<FunctionDecl>,
        closure: Shared<SharedCell<Env>>,
        is_initializer: bool,
    ) -> Self {
        Self {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn name(&self) -> Option<Ident> {
        self.declaration.name
    }

    pub fn is_initializer(&self) -> bool {
        self.is_initializer
    }

    pub fn closure(&self) -> Shared<SharedCell<Env>> {
        Shared::clone(&self.closure)
    }

    #[inline(always)]
    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    /// Returns a copy of this function whose environment has one extra
    /// frame holding `this`.
    pub fn bind(&self, receiver: RuntimeValue) -> Function {
        let mut env = Env::with_parent(Shared::clone(&self.closure));
        env.define(Ident::new(THIS), receiver);

        Function {
            declaration: Shared::clone(&self.declaration),
            closure: Shared::new(SharedCell::new(env)),
            is_initializer: self.is_initializer,
        }
    }

    /// Calls the function. The caller has already checked that
    /// `arguments.len() == self.arity()`.
    pub fn call<E: BlockExecutor + ?Sized>(
        &self,
        executor: &mut E,
        arguments: Vec<RuntimeValue>,
    ) -> Result<RuntimeValue, RuntimeError> {
        let mut env = Env::with_parent(Shared::clone(&self.closure));
        for (param, argument) in self.declaration.params.iter().zip(arguments) {
            env.define(param.name, argument);
        }

        let flow = executor.execute_block(&self.declaration.body, Shared::new(SharedCell::new(env)))?;

        if self.is_initializer {
            return Ok(self.this_value());
        }

        match flow {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(RuntimeValue::Nil),
        }
    }

    // An initializer that was never bound has no receiver and yields nil.
    fn this_value(&self) -> RuntimeValue {
        self.closure
            .borrow()
            .get_at(0, Ident::new(THIS))
            .unwrap_or_default()
    }
}

pub type Methods = FxHashMap<Ident, Shared<Function>>;

#[derive(Debug)]
pub struct Class {
    name: Ident,
    superclass: Option<Shared<Class>>,
    methods: Methods,
    class_methods: Methods,
    /// Written by `Class.field = value`, never read back by property access.
    fields: SharedCell<FxHashMap<Ident, RuntimeValue>>,
}

impl Class {
    pub fn new(
        name: Ident,
        superclass: Option<Shared<Class>>,
        methods: Methods,
        class_methods: Methods,
    ) -> Self {
        Self {
            name,
            superclass,
            methods,
            class_methods,
            fields: SharedCell::new(FxHashMap::default()),
        }
    }

    pub fn name(&self) -> Ident {
        self.name
    }

    pub fn superclass(&self) -> Option<&Shared<Class>> {
        self.superclass.as_ref()
    }

    pub fn find_method(&self, name: Ident) -> Option<Shared<Function>> {
        match self.methods.get(&name) {
            Some(method) => Some(Shared::clone(method)),
            None => self
                .superclass
                .as_ref()
                .and_then(|superclass| superclass.find_method(name)),
        }
    }

    pub fn find_class_method(&self, name: Ident) -> Option<Shared<Function>> {
        match self.class_methods.get(&name) {
            Some(method) => Some(Shared::clone(method)),
            None => self
                .superclass
                .as_ref()
                .and_then(|superclass| superclass.find_class_method(name)),
        }
    }

    /// The method named after the class, or failing that the one named
    /// after the direct superclass. Grandparent initializers are not
    /// consulted.
    pub fn initializer(&self) -> Option<Shared<Function>> {
        self.find_method(self.name).or_else(|| {
            self.superclass
                .as_ref()
                .and_then(|superclass| superclass.find_method(superclass.name))
        })
    }

    pub fn arity(&self) -> usize {
        self.initializer()
            .map(|initializer| initializer.arity())
            .unwrap_or(0)
    }

    /// Constructs a new instance and runs the initializer on it.
    pub fn call<E: BlockExecutor + ?Sized>(
        class: &Shared<Class>,
        executor: &mut E,
        arguments: Vec<RuntimeValue>,
    ) -> Result<RuntimeValue, RuntimeError> {
        let instance = RuntimeValue::Instance(Shared::new(SharedCell::new(Instance::new(
            Shared::clone(class),
        ))));

        if let Some(initializer) = class.initializer() {
            initializer.bind(instance.clone()).call(executor, arguments)?;
        }

        Ok(instance)
    }

    /// Property read on a class value: class methods only, bound to the
    /// class itself.
    pub fn get(class: &Shared<Class>, name: &IdentWithToken) -> Result<RuntimeValue, RuntimeError> {
        match class.find_class_method(name.name) {
            Some(method) => Ok(RuntimeValue::Function(Shared::new(
                method.bind(RuntimeValue::Class(Shared::clone(class))),
            ))),
            None => Err(RuntimeError::UndefinedClassMethod(
                (*name.token).clone(),
                name.name.to_string(),
            )),
        }
    }

    pub fn set(&self, name: Ident, value: RuntimeValue) {
        self.fields.borrow_mut().insert(name, value);
    }
}

#[derive(Debug)]
pub struct Instance {
    class: Shared<Class>,
    fields: FxHashMap<Ident, RuntimeValue>,
}

impl Instance {
    pub fn new(class: Shared<Class>) -> Self {
        Self {
            class,
            fields: FxHashMap::default(),
        }
    }

    pub fn class(&self) -> &Shared<Class> {
        &self.class
    }

    /// Fields shadow methods; methods are bound to the instance on access.
    pub fn get(
        instance: &Shared<SharedCell<Instance>>,
        name: &IdentWithToken,
    ) -> Result<RuntimeValue, RuntimeError> {
        let method = {
            let this = instance.borrow();
            if let Some(value) = this.fields.get(&name.name) {
                return Ok(value.clone());
            }
            this.class.find_method(name.name)
        };

        match method {
            Some(method) => Ok(RuntimeValue::Function(Shared::new(
                method.bind(RuntimeValue::Instance(Shared::clone(instance))),
            ))),
            None => Err(RuntimeError::UndefinedProperty(
                (*name.token).clone(),
                name.name.to_string(),
            )),
        }
    }

    pub fn set(&mut self, name: Ident, value: RuntimeValue) {
        self.fields.insert(name, value);
    }
}
