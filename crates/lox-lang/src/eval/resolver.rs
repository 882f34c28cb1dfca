//! Static resolution pass.
//!
//! Walks the syntax tree once before evaluation, computing for every local
//! variable reference (and every `this` / `super`) how many scopes lie
//! between the reference and its declaration. The scope frames pushed here
//! mirror, one for one, the environments the evaluator creates at runtime.
//!
//! Legality problems are collected rather than raised, so a single pass
//! reports every diagnostic in the program.

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::trace;

use crate::ast::constants::{SUPER, THIS};
use crate::ast::node::{ClassDecl, Expr, FunctionDecl, IdentWithToken, Node, Stmt};
use crate::ast::{Program, TokenId};
use crate::{Ident, Token, TokenArena, ensure_stack, get_token};

type Name = String;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum ResolveError {
    #[error("Can't return from top-level code")]
    ReturnFromTopLevel(Token),
    #[error("Can't return a value from an initializer")]
    ReturnValueFromInitializer(Token),
    #[error("Can't use 'this' outside of a class")]
    ThisOutsideClass(Token),
    #[error("Can't use 'this' in a class method")]
    ThisInClassMethod(Token),
    #[error("Can't use 'super' outside of a class")]
    SuperOutsideClass(Token),
    #[error("Can't use 'super' in a class with no superclass")]
    SuperWithoutSuperclass(Token),
    #[error("Already a variable named \"{1}\" in this scope")]
    AlreadyDeclared(Token, Name),
    #[error("Can't read local variable \"{1}\" in its own initializer")]
    ReadInOwnInitializer(Token, Name),
    #[error("A class can't inherit from itself")]
    InheritFromSelf(Token, Name),
}

impl ResolveError {
    #[cold]
    pub fn token(&self) -> &Token {
        match self {
            ResolveError::ReturnFromTopLevel(token) => token,
            ResolveError::ReturnValueFromInitializer(token) => token,
            ResolveError::ThisOutsideClass(token) => token,
            ResolveError::ThisInClassMethod(token) => token,
            ResolveError::SuperOutsideClass(token) => token,
            ResolveError::SuperWithoutSuperclass(token) => token,
            ResolveError::AlreadyDeclared(token, _) => token,
            ResolveError::ReadInOwnInitializer(token, _) => token,
            ResolveError::InheritFromSelf(token, _) => token,
        }
    }
}

/// Side table from a reference's node identity to its hop count.
/// References without an entry are globals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolutions(FxHashMap<TokenId, usize>);

impl Resolutions {
    #[inline(always)]
    pub fn get(&self, token_id: TokenId) -> Option<usize> {
        self.0.get(&token_id).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TokenId, usize)> + '_ {
        self.0.iter().map(|(token_id, depth)| (*token_id, *depth))
    }

    /// Merges the table produced for a later program into this one. Token
    /// ids come from a shared arena, so entries never collide.
    pub fn extend(&mut self, other: Resolutions) {
        self.0.extend(other.0);
    }

    fn insert(&mut self, token_id: TokenId, depth: usize) {
        self.0.entry(token_id).or_insert(depth);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    None,
    Function,
    Initializer,
    Method,
    ClassMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassKind {
    None,
    Class,
    Subclass,
}

/// Scope frame: `false` while a name's initializer is being resolved.
type Scope = FxHashMap<Ident, bool>;

pub struct Resolver {
    scopes: Vec<Scope>,
    current_function: FunctionKind,
    current_class: ClassKind,
    resolutions: Resolutions,
    errors: Vec<ResolveError>,
    token_arena: TokenArena,
}

impl Resolver {
    pub fn new(token_arena: TokenArena) -> Self {
        Self {
            scopes: Vec::new(),
            current_function: FunctionKind::None,
            current_class: ClassKind::None,
            resolutions: Resolutions::default(),
            errors: Vec::new(),
            token_arena,
        }
    }

    /// Resolves a whole program, returning the depth table together with
    /// every diagnostic found.
    pub fn resolve(mut self, program: &Program) -> (Resolutions, Vec<ResolveError>) {
        self.resolve_stmts(program);
        (self.resolutions, self.errors)
    }

    fn resolve_stmts(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            self.resolve_stmt(stmt);
        }
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        ensure_stack(|| self.resolve_stmt_inner(stmt))
    }

    fn resolve_stmt_inner(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(statements) => {
                self.begin_scope();
                self.resolve_stmts(statements);
                self.end_scope();
            }
            Stmt::Class(class) => self.resolve_class(class),
            Stmt::Expression(node) | Stmt::Print(node) => self.resolve_expr(node),
            Stmt::If(condition, then_branch, else_branch) => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch);
                }
            }
            Stmt::Return(keyword, value) => {
                if self.current_function == FunctionKind::None {
                    self.error(ResolveError::ReturnFromTopLevel((**keyword).clone()));
                }

                if let Some(value) = value {
                    if self.current_function == FunctionKind::Initializer {
                        self.error(ResolveError::ReturnValueFromInitializer((**keyword).clone()));
                    }
                    self.resolve_expr(value);
                }
            }
            Stmt::Var(name, initializer) => {
                self.declare(name);
                if let Some(initializer) = initializer {
                    self.resolve_expr(initializer);
                }
                self.define(name.name);
            }
            Stmt::While(condition, body) => {
                self.resolve_expr(condition);
                self.resolve_stmt(body);
            }
        }
    }

    fn resolve_expr(&mut self, node: &Node) {
        ensure_stack(|| self.resolve_expr_inner(node))
    }

    fn resolve_expr_inner(&mut self, node: &Node) {
        match &*node.expr {
            Expr::Assign(name, value) => {
                self.resolve_expr(value);
                self.resolve_local(node.token_id, name.name);
            }
            Expr::Binary(_, lhs, rhs) | Expr::Logical(_, lhs, rhs) => {
                self.resolve_expr(lhs);
                self.resolve_expr(rhs);
            }
            Expr::Call(callee, args) => {
                self.resolve_expr(callee);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            Expr::Function(function) => self.resolve_function(function, FunctionKind::Function),
            Expr::Get(object, _) => self.resolve_expr(object),
            Expr::Grouping(inner) => self.resolve_expr(inner),
            Expr::Literal(_) => {}
            Expr::Set(object, _, value) => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }
            Expr::Super(_) => {
                match self.current_class {
                    ClassKind::None => {
                        let token = self.token(node.token_id);
                        self.error(ResolveError::SuperOutsideClass(token));
                    }
                    ClassKind::Class => {
                        let token = self.token(node.token_id);
                        self.error(ResolveError::SuperWithoutSuperclass(token));
                    }
                    ClassKind::Subclass => {}
                }

                self.resolve_local(node.token_id, Ident::new(SUPER));
            }
            Expr::This => {
                if self.current_class == ClassKind::None {
                    let token = self.token(node.token_id);
                    self.error(ResolveError::ThisOutsideClass(token));
                    return;
                }

                if self.current_function == FunctionKind::ClassMethod {
                    let token = self.token(node.token_id);
                    self.error(ResolveError::ThisInClassMethod(token));
                    return;
                }

                self.resolve_local(node.token_id, Ident::new(THIS));
            }
            Expr::Unary(_, operand) => self.resolve_expr(operand),
            Expr::Variable(name) => {
                if let Some(scope) = self.scopes.last()
                    && scope.get(&name.name) == Some(&false)
                {
                    self.error(ResolveError::ReadInOwnInitializer(
                        (*name.token).clone(),
                        name.name.to_string(),
                    ));
                }

                self.resolve_local(node.token_id, name.name);
            }
        }
    }

    fn resolve_function(&mut self, function: &FunctionDecl, kind: FunctionKind) {
        let enclosing_function = self.current_function;
        self.current_function = kind;

        self.begin_scope();
        for param in &function.params {
            self.declare(param);
            self.define(param.name);
        }
        self.resolve_stmts(&function.body);
        self.end_scope();

        self.current_function = enclosing_function;
    }

    fn resolve_class(&mut self, class: &ClassDecl) {
        let enclosing_class = self.current_class;
        self.current_class = ClassKind::Class;

        self.declare(&class.name);
        self.define(class.name.name);

        if let Some(superclass) = &class.superclass {
            self.current_class = ClassKind::Subclass;

            match &*superclass.expr {
                Expr::Variable(name) if name.name == class.name.name => {
                    self.error(ResolveError::InheritFromSelf(
                        (*name.token).clone(),
                        name.name.to_string(),
                    ));
                }
                _ => self.resolve_expr(superclass),
            }

            self.begin_scope();
            self.define_synthetic(SUPER);
        }

        self.begin_scope();
        self.define_synthetic(THIS);
        for method in &class.methods {
            let kind = if method.name.name == class.name.name {
                FunctionKind::Initializer
            } else {
                FunctionKind::Method
            };
            self.resolve_function(&method.function, kind);
        }
        self.end_scope();

        // Class methods are bound to the class value, in a frame that
        // deliberately has no `this`.
        self.begin_scope();
        for method in &class.class_methods {
            self.resolve_function(&method.function, FunctionKind::ClassMethod);
        }
        self.end_scope();

        if class.superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
    }

    fn resolve_local(&mut self, token_id: TokenId, name: Ident) {
        let found = self
            .scopes
            .iter()
            .rev()
            .position(|scope| scope.contains_key(&name));

        if let Some(depth) = found {
            trace!(name = %name, depth, "resolved local");
            self.resolutions.insert(token_id, depth);
        }
    }

    fn declare(&mut self, name: &IdentWithToken) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };

        let already_declared = scope.insert(name.name, false).is_some();
        if already_declared {
            self.error(ResolveError::AlreadyDeclared(
                (*name.token).clone(),
                name.name.to_string(),
            ));
        }
    }

    #[inline(always)]
    fn define(&mut self, name: Ident) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, true);
        }
    }

    #[inline(always)]
    fn define_synthetic(&mut self, name: &str) {
        self.define(Ident::new(name));
    }

    #[inline(always)]
    fn begin_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    #[inline(always)]
    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn token(&self, token_id: TokenId) -> Token {
        (*get_token(&self.token_arena, token_id)).clone()
    }

    fn error(&mut self, error: ResolveError) {
        trace!(error = %error, range = %error.token().range, "resolve error");
        self.errors.push(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Arena, Shared, SharedCell, parse};
    use rstest::rstest;

    fn resolve(code: &str) -> (TokenArena, Resolutions, Vec<ResolveError>) {
        let token_arena = Shared::new(SharedCell::new(Arena::new(256)));
        let program = parse(code, Shared::clone(&token_arena)).unwrap();
        let (resolutions, errors) = Resolver::new(Shared::clone(&token_arena)).resolve(&program);
        (token_arena, resolutions, errors)
    }

    /// `(token text, depth)` for every resolved reference, in source order.
    fn depths(code: &str) -> Vec<(String, usize)> {
        let (token_arena, resolutions, errors) = resolve(code);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);

        let mut entries = resolutions
            .iter()
            .map(|(token_id, depth)| (get_token(&token_arena, token_id), depth))
            .collect::<Vec<_>>();
        entries.sort_by_key(|(token, _)| token.range.start);
        entries
            .into_iter()
            .map(|(token, depth)| (token.to_string(), depth))
            .collect()
    }

    fn messages(code: &str) -> Vec<String> {
        let (_, _, errors) = resolve(code);
        errors.iter().map(ToString::to_string).collect()
    }

    #[rstest]
    #[case::globals_are_not_recorded("var a = 1; print a;", vec![])]
    #[case::same_block("{ var a = 1; print a; }", vec![("a", 0)])]
    #[case::nested_blocks(
        "{ var a = 1; { var b = 2; { print a; print b; } } }",
        vec![("a", 2), ("b", 1)]
    )]
    #[case::assignment("{ var a = 1; { a = 2; } }", vec![("a", 1)])]
    #[case::closure("{ var x = 1; fun f() { print x; } }", vec![("x", 1)])]
    #[case::parameters("fun f(a) { { print a; } }", vec![("a", 1)])]
    #[case::recursive_local_function(
        "{ fun count(n) { if (n > 0) count(n - 1); } }",
        vec![("n", 0), ("count", 1), ("n", 0)]
    )]
    #[case::this_and_super(
        "class A < B { m() { print this; print super.m; } }",
        vec![("this", 1), ("super", 2)]
    )]
    #[case::this_without_superclass("class A { m() { return this; } }", vec![("this", 1)])]
    #[case::class_method_sees_enclosing_scope(
        "{ class A { class make() { return A; } } }",
        vec![("A", 2)]
    )]
    #[case::local_superclass(
        "{ class A {} class B < A { m() { super.m(); } } }",
        vec![("A", 0), ("super", 2)]
    )]
    #[case::nested_function_in_class_method_leaves_this_unresolved(
        "class A { class make() { fun inner() { return this; } return inner(); } }",
        vec![("inner", 0)]
    )]
    fn test_depths(#[case] code: &str, #[case] expected: Vec<(&str, usize)>) {
        let expected = expected
            .into_iter()
            .map(|(name, depth)| (name.to_string(), depth))
            .collect::<Vec<_>>();
        assert_eq!(depths(code), expected);
    }

    #[rstest]
    #[case::top_level_return("return 1;", vec!["Can't return from top-level code"])]
    #[case::initializer_return_value(
        "class A { A() { return 1; } }",
        vec!["Can't return a value from an initializer"]
    )]
    #[case::initializer_bare_return("class A { A() { return; } }", vec![])]
    #[case::method_named_differently_may_return("class A { B() { return 1; } }", vec![])]
    #[case::this_outside_class("print this;", vec!["Can't use 'this' outside of a class"])]
    #[case::this_in_function("fun f() { return this; }", vec!["Can't use 'this' outside of a class"])]
    #[case::this_in_class_method(
        "class A { class make() { return this; } }",
        vec!["Can't use 'this' in a class method"]
    )]
    #[case::this_in_function_nested_in_class_method(
        "class A { class make() { fun inner() { return this; } return inner(); } }",
        vec![]
    )]
    #[case::super_outside_class("print super.x;", vec!["Can't use 'super' outside of a class"])]
    #[case::super_without_superclass(
        "class A { m() { super.m(); } }",
        vec!["Can't use 'super' in a class with no superclass"]
    )]
    #[case::duplicate_local(
        "{ var a = 1; var a = 2; }",
        vec!["Already a variable named \"a\" in this scope"]
    )]
    #[case::duplicate_parameter(
        "fun f(a, a) {}",
        vec!["Already a variable named \"a\" in this scope"]
    )]
    #[case::duplicate_global("var a = 1; var a = 2;", vec![])]
    #[case::shadowing_is_legal("{ var a = 1; { var a = 2; } }", vec![])]
    #[case::self_reference(
        "{ var a = a; }",
        vec!["Can't read local variable \"a\" in its own initializer"]
    )]
    #[case::global_self_reference("var a = a;", vec![])]
    #[case::self_inheritance("class A < A {}", vec!["A class can't inherit from itself"])]
    #[case::diagnostics_accumulate(
        "return 1; print this; { var b = b; }",
        vec![
            "Can't return from top-level code",
            "Can't use 'this' outside of a class",
            "Can't read local variable \"b\" in its own initializer",
        ]
    )]
    fn test_diagnostics(#[case] code: &str, #[case] expected: Vec<&str>) {
        assert_eq!(messages(code), expected);
    }

    #[test]
    fn test_self_reference_is_still_resolved_outward() {
        let (token_arena, resolutions, errors) = resolve("{ var a = 1; { var a = a; } }");

        assert_eq!(errors.len(), 1);
        let (token_id, depth) = resolutions.iter().next().unwrap();
        assert_eq!(get_token(&token_arena, token_id).to_string(), "a");
        // The not-ready inner `a` is the innermost match.
        assert_eq!(depth, 0);
    }

    #[test]
    fn test_self_inheritance_still_opens_super_scope() {
        let (token_arena, resolutions, errors) = resolve("class A < A { m() { super.m(); } }");

        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], ResolveError::InheritFromSelf(_, name) if name == "A"));
        let entries = resolutions
            .iter()
            .map(|(token_id, depth)| (get_token(&token_arena, token_id).to_string(), depth))
            .collect::<Vec<_>>();
        assert_eq!(entries, vec![("super".to_string(), 2)]);
    }

    #[test]
    fn test_error_tokens_point_at_the_keyword() {
        let (_, _, errors) = resolve("\n  return 1;");

        assert_eq!(errors[0].token().range.start.line, 2);
        assert_eq!(errors[0].token().range.start.column, 3);
    }
}
