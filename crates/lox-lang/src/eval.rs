// Tree-walking evaluator. Statements run against a chain of environments
// that mirrors, frame for frame, the scopes the resolver walked, so every
// resolved reference is a fixed number of parent hops away.
use std::io::Write;

use tracing::{debug, trace};

use crate::ast::constants::{SUPER, THIS};
use crate::ast::node::{self as ast, BinaryOp, Expr, LogicalOp, Stmt, UnaryOp};
use crate::{
    Ident, Program, Shared, SharedCell, Token, TokenArena, TokenId, ensure_stack, get_token,
};

pub mod builtin;
pub mod env;
pub mod error;
pub mod resolver;
pub mod runtime_value;

use env::Env;
use error::RuntimeError;
use resolver::Resolutions;
use runtime_value::{BlockExecutor, Class, Function, Instance, Methods, RuntimeValue};

/// Outcome of running a statement. `Return` unwinds through blocks and
/// loops until the enclosing function call strips it.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Return(RuntimeValue),
}

#[derive(Debug, Clone)]
pub struct Options {
    /// Nested calls beyond this depth fail with a stack overflow error.
    /// The native stack grows on demand, so raising it is safe.
    pub max_call_stack_depth: u32,
}

#[cfg(debug_assertions)]
impl Default for Options {
    fn default() -> Self {
        Self {
            max_call_stack_depth: 2_000,
        }
    }
}

#[cfg(not(debug_assertions))]
impl Default for Options {
    fn default() -> Self {
        Self {
            max_call_stack_depth: 10_000,
        }
    }
}

/// Where `print` writes.
#[derive(Debug, Clone)]
pub enum Output {
    Stdout,
    Buffer(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Evaluator {
    env: Shared<SharedCell<Env>>,
    globals: Shared<SharedCell<Env>>,
    token_arena: TokenArena,
    resolutions: Resolutions,
    call_stack_depth: u32,
    pub(crate) options: Options,
    output: Output,
}

impl Evaluator {
    pub fn new(token_arena: TokenArena, output: Output) -> Self {
        let mut globals = Env::default();
        builtin::define_builtins(&mut globals);
        let globals = Shared::new(SharedCell::new(globals));

        Self {
            env: Shared::clone(&globals),
            globals,
            token_arena,
            resolutions: Resolutions::default(),
            call_stack_depth: 0,
            options: Options::default(),
            output,
        }
    }

    /// Runs a resolved program. Globals persist across calls; after a
    /// runtime error the evaluator is back at the global scope and can be
    /// used again.
    pub fn eval(&mut self, program: &Program, resolutions: Resolutions) -> Result<(), RuntimeError> {
        self.resolutions.extend(resolutions);

        let result = program
            .iter()
            .try_for_each(|stmt| self.exec_stmt(stmt).map(|_| ()));

        if result.is_err() {
            self.env = Shared::clone(&self.globals);
            self.call_stack_depth = 0;
        }

        result
    }

    pub fn take_output(&mut self) -> Vec<String> {
        match &mut self.output {
            Output::Buffer(lines) => std::mem::take(lines),
            Output::Stdout => Vec::new(),
        }
    }

    pub fn global(&self, name: &str) -> Option<RuntimeValue> {
        self.globals.borrow().get(Ident::new(name)).ok()
    }

    fn exec_stmts(&mut self, statements: &[Stmt]) -> Result<Flow, RuntimeError> {
        for stmt in statements {
            if let Flow::Return(value) = self.exec_stmt(stmt)? {
                return Ok(Flow::Return(value));
            }
        }

        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        ensure_stack(|| self.exec_stmt_inner(stmt))
    }

    fn exec_stmt_inner(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Block(statements) => {
                let env = Env::with_parent(Shared::clone(&self.env));
                self.execute_block(statements, Shared::new(SharedCell::new(env)))
            }
            Stmt::Class(class) => {
                self.eval_class(class)?;
                Ok(Flow::Normal)
            }
            Stmt::Expression(node) => {
                self.eval_expr(node)?;
                Ok(Flow::Normal)
            }
            Stmt::If(condition, then_branch, else_branch) => {
                if self.eval_expr(condition)?.is_truthy() {
                    self.exec_stmt(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.exec_stmt(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::Print(node) => {
                let value = self.eval_expr(node)?;
                self.print(value.to_string());
                Ok(Flow::Normal)
            }
            Stmt::Return(_, value) => {
                let value = match value {
                    Some(value) => self.eval_expr(value)?,
                    None => RuntimeValue::Nil,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Var(name, initializer) => {
                let value = match initializer {
                    Some(initializer) => self.eval_expr(initializer)?,
                    None => RuntimeValue::Nil,
                };
                self.env.borrow_mut().define(name.name, value);
                Ok(Flow::Normal)
            }
            Stmt::While(condition, body) => {
                while self.eval_expr(condition)?.is_truthy() {
                    if let Flow::Return(value) = self.exec_stmt(body)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal)
            }
        }
    }

    fn eval_class(&mut self, class: &ast::ClassDecl) -> Result<(), RuntimeError> {
        let name = class.name.name;
        self.env.borrow_mut().define(name, RuntimeValue::Nil);

        let superclass = match &class.superclass {
            Some(node) => match self.eval_expr(node)? {
                RuntimeValue::Class(superclass) => Some(superclass),
                _ => return Err(RuntimeError::SuperclassMustBeAClass(self.token(node.token_id))),
            },
            None => None,
        };

        // Methods close over an extra frame holding `super`.
        let enclosing = superclass.as_ref().map(|superclass| {
            let mut env = Env::with_parent(Shared::clone(&self.env));
            env.define(Ident::new(SUPER), RuntimeValue::Class(Shared::clone(superclass)));
            std::mem::replace(&mut self.env, Shared::new(SharedCell::new(env)))
        });

        let methods = class
            .methods
            .iter()
            .map(|method| {
                let is_initializer = method.name.name == name;
                (method.name.name, self.closure(&method.function, is_initializer))
            })
            .collect::<Methods>();
        let class_methods = class
            .class_methods
            .iter()
            .map(|method| (method.name.name, self.closure(&method.function, false)))
            .collect::<Methods>();

        if let Some(enclosing) = enclosing {
            self.env = enclosing;
        }

        debug!(
            class = %name,
            methods = methods.len(),
            class_methods = class_methods.len(),
            has_superclass = superclass.is_some(),
            "class declared"
        );

        let class = Class::new(name, superclass, methods, class_methods);
        self.env
            .borrow_mut()
            .define(name, RuntimeValue::Class(Shared::new(class)));

        Ok(())
    }

    fn eval_expr(&mut self, node: &Shared<ast::Node>) -> Result<RuntimeValue, RuntimeError> {
        ensure_stack(|| self.eval_expr_inner(node))
    }

    fn eval_expr_inner(&mut self, node: &Shared<ast::Node>) -> Result<RuntimeValue, RuntimeError> {
        match &*node.expr {
            Expr::Assign(name, value) => {
                let value = self.eval_expr(value)?;
                let assigned = match self.resolutions.get(node.token_id) {
                    Some(depth) => self
                        .env
                        .borrow_mut()
                        .assign_at(depth, name.name, value.clone()),
                    None => self.globals.borrow_mut().assign(name.name, value.clone()),
                };
                assigned.map_err(|e| e.to_runtime_error(&name.token))?;
                Ok(value)
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval_expr(lhs)?;
                let rhs = self.eval_expr(rhs)?;
                self.eval_binary_op(*op, lhs, rhs, node.token_id)
            }
            Expr::Call(callee, args) => {
                let callee = self.eval_expr(callee)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval_expr(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(callee, args, node.token_id)
            }
            Expr::Function(function) => Ok(RuntimeValue::Function(self.closure(function, false))),
            Expr::Get(object, name) => match self.eval_expr(object)? {
                RuntimeValue::Instance(instance) => Instance::get(&instance, name),
                RuntimeValue::Class(class) => Class::get(&class, name),
                _ => Err(RuntimeError::OnlyInstancesHaveProperties((*name.token).clone())),
            },
            Expr::Grouping(inner) => self.eval_expr(inner),
            Expr::Literal(literal) => Ok(match literal {
                ast::Literal::Number(n) => RuntimeValue::Number(*n),
                ast::Literal::String(s) => RuntimeValue::String(s.clone()),
                ast::Literal::Bool(b) => RuntimeValue::Bool(*b),
                ast::Literal::Nil => RuntimeValue::Nil,
            }),
            Expr::Logical(op, lhs, rhs) => {
                let lhs = self.eval_expr(lhs)?;
                match op {
                    LogicalOp::Or if lhs.is_truthy() => Ok(lhs),
                    LogicalOp::And if !lhs.is_truthy() => Ok(lhs),
                    _ => self.eval_expr(rhs),
                }
            }
            Expr::Set(object, name, value) => match self.eval_expr(object)? {
                RuntimeValue::Instance(instance) => {
                    let value = self.eval_expr(value)?;
                    instance.borrow_mut().set(name.name, value.clone());
                    Ok(value)
                }
                RuntimeValue::Class(class) => {
                    let value = self.eval_expr(value)?;
                    class.set(name.name, value.clone());
                    Ok(value)
                }
                _ => Err(RuntimeError::OnlyInstancesHaveFields((*name.token).clone())),
            },
            Expr::Super(method) => self.eval_super(node.token_id, method),
            Expr::This => {
                let token = get_token(&self.token_arena, node.token_id);
                self.lookup_variable(Ident::new(THIS), node.token_id, &token)
            }
            Expr::Unary(op, operand) => {
                let operand = self.eval_expr(operand)?;
                match (op, operand) {
                    (UnaryOp::Negate, RuntimeValue::Number(n)) => Ok(RuntimeValue::Number(-n)),
                    (UnaryOp::Negate, _) => Err(RuntimeError::OperandMustBeANumber(self.token(node.token_id))),
                    (UnaryOp::Not, operand) => Ok(RuntimeValue::Bool(!operand.is_truthy())),
                }
            }
            Expr::Variable(name) => self.lookup_variable(name.name, node.token_id, &name.token),
        }
    }

    fn eval_binary_op(
        &self,
        op: BinaryOp,
        lhs: RuntimeValue,
        rhs: RuntimeValue,
        token_id: TokenId,
    ) -> Result<RuntimeValue, RuntimeError> {
        use RuntimeValue::{Bool, Number};

        match (op, lhs, rhs) {
            (BinaryOp::Eq, lhs, rhs) => Ok(Bool(lhs == rhs)),
            (BinaryOp::Ne, lhs, rhs) => Ok(Bool(lhs != rhs)),
            (BinaryOp::Add, Number(a), Number(b)) => Ok(Number(a + b)),
            (BinaryOp::Add, RuntimeValue::String(a), RuntimeValue::String(b)) => {
                Ok(RuntimeValue::String(a + &b))
            }
            (BinaryOp::Add, _, _) => Err(RuntimeError::OperandsMustBeNumbersOrStrings(
                self.token(token_id),
            )),
            (BinaryOp::Sub, Number(a), Number(b)) => Ok(Number(a - b)),
            (BinaryOp::Mul, Number(a), Number(b)) => Ok(Number(a * b)),
            (BinaryOp::Div, Number(a), Number(b)) => Ok(Number(a / b)),
            (BinaryOp::Gt, Number(a), Number(b)) => Ok(Bool(a > b)),
            (BinaryOp::Gte, Number(a), Number(b)) => Ok(Bool(a >= b)),
            (BinaryOp::Lt, Number(a), Number(b)) => Ok(Bool(a < b)),
            (BinaryOp::Lte, Number(a), Number(b)) => Ok(Bool(a <= b)),
            _ => Err(RuntimeError::OperandsMustBeNumbers(self.token(token_id))),
        }
    }

    fn eval_super(
        &mut self,
        token_id: TokenId,
        method: &ast::IdentWithToken,
    ) -> Result<RuntimeValue, RuntimeError> {
        let token = get_token(&self.token_arena, token_id);
        let Some(depth) = self.resolutions.get(token_id) else {
            return Err(RuntimeError::InternalError(
                (*token).clone(),
                "unresolved `super`".to_string(),
            ));
        };

        let (superclass, receiver) = {
            let env = self.env.borrow();
            let superclass = env
                .get_at(depth, Ident::new(SUPER))
                .map_err(|e| e.to_runtime_error(&token))?;
            // `this` lives in the frame just inside the one holding `super`.
            let receiver = env
                .get_at(depth.saturating_sub(1), Ident::new(THIS))
                .map_err(|e| e.to_runtime_error(&token))?;
            (superclass, receiver)
        };

        let RuntimeValue::Class(superclass) = superclass else {
            return Err(RuntimeError::SuperclassMustBeAClass((*token).clone()));
        };

        // Inside a class method the receiver is the class itself.
        let found = match &receiver {
            RuntimeValue::Class(_) => superclass.find_class_method(method.name),
            _ => superclass.find_method(method.name),
        };

        match found {
            Some(found) => Ok(RuntimeValue::Function(Shared::new(found.bind(receiver)))),
            None => Err(RuntimeError::UndefinedProperty(
                (*method.token).clone(),
                method.name.to_string(),
            )),
        }
    }

    fn call(
        &mut self,
        callee: RuntimeValue,
        args: Vec<RuntimeValue>,
        token_id: TokenId,
    ) -> Result<RuntimeValue, RuntimeError> {
        let (name, arity) = match &callee {
            RuntimeValue::Function(function) => (
                function
                    .name()
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| "<fn>".to_string()),
                function.arity(),
            ),
            RuntimeValue::Class(class) => (class.name().to_string(), class.arity()),
            RuntimeValue::NativeFunction(name) => (
                name.to_string(),
                builtin::get_builtin_function(*name)
                    .map(|builtin| builtin.num_params)
                    .unwrap_or_default(),
            ),
            _ => {
                return Err(RuntimeError::NotCallable(
                    self.token(token_id),
                    callee.name().to_string(),
                ));
            }
        };

        if args.len() != arity {
            return Err(RuntimeError::InvalidNumberOfArguments(
                self.token(token_id),
                name,
                arity,
                args.len(),
            ));
        }

        if self.call_stack_depth >= self.options.max_call_stack_depth {
            return Err(RuntimeError::StackOverflow(
                self.token(token_id),
                self.options.max_call_stack_depth,
            ));
        }

        trace!(callee = %name, depth = self.call_stack_depth, "call");
        self.call_stack_depth += 1;
        let result = match &callee {
            RuntimeValue::Function(function) => function.call(self, args),
            RuntimeValue::Class(class) => Class::call(class, self, args),
            RuntimeValue::NativeFunction(name) => {
                builtin::eval_builtin(*name, &self.token(token_id), &args)
            }
            _ => Err(RuntimeError::NotCallable(
                self.token(token_id),
                callee.name().to_string(),
            )),
        };
        self.call_stack_depth -= 1;

        result
    }

    fn lookup_variable(
        &self,
        name: Ident,
        token_id: TokenId,
        token: &Token,
    ) -> Result<RuntimeValue, RuntimeError> {
        match self.resolutions.get(token_id) {
            Some(depth) => self.env.borrow().get_at(depth, name),
            None => self.globals.borrow().get(name),
        }
        .map_err(|e| e.to_runtime_error(token))
    }

    fn closure(&self, declaration: &Shared<ast::FunctionDecl>, is_initializer: bool) -> Shared<Function> {
        trace!(name = ?declaration.name, is_initializer, "closure created");
        Shared::new(Function::new(
            Shared::clone(declaration),
            Shared::clone(&self.env),
            is_initializer,
        ))
    }

    fn print(&mut self, line: String) {
        match &mut self.output {
            Output::Stdout => {
                let mut stdout = std::io::stdout().lock();
                // A closed pipe is not the program's fault.
                let _ = writeln!(stdout, "{}", line);
            }
            Output::Buffer(lines) => lines.push(line),
        }
    }

    #[inline(always)]
    fn token(&self, token_id: TokenId) -> Token {
        (*get_token(&self.token_arena, token_id)).clone()
    }
}

impl BlockExecutor for Evaluator {
    fn execute_block(
        &mut self,
        statements: &[Stmt],
        env: Shared<SharedCell<Env>>,
    ) -> Result<Flow, RuntimeError> {
        let previous = std::mem::replace(&mut self.env, env);
        let result = self.exec_stmts(statements);
        self.env = previous;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Arena, parse};
    use resolver::Resolver;
    use rstest::rstest;

    fn run(code: &str) -> Result<Vec<String>, RuntimeError> {
        let token_arena = Shared::new(SharedCell::new(Arena::new(256)));
        let program = parse(code, Shared::clone(&token_arena)).unwrap();
        let (resolutions, errors) = Resolver::new(Shared::clone(&token_arena)).resolve(&program);
        assert!(errors.is_empty(), "unexpected resolve errors: {:?}", errors);

        let mut evaluator = Evaluator::new(token_arena, Output::Buffer(Vec::new()));
        evaluator.eval(&program, resolutions)?;
        Ok(evaluator.take_output())
    }

    #[rstest]
    #[case::arithmetic("print 1 + 2 * 3 - 4 / 2;", vec!["5"])]
    #[case::fractions("print 1 / 4;", vec!["0.25"])]
    #[case::division_by_zero("print 1 / 0; print -1 / 0;", vec!["Infinity", "-Infinity"])]
    #[case::string_concat("print \"foo\" + \"bar\";", vec!["foobar"])]
    #[case::comparison("print 1 < 2; print 2 <= 1; print 3 > 3; print 3 >= 3;", vec!["true", "false", "false", "true"])]
    #[case::equality("print nil == nil; print 1 == \"1\"; print \"a\" != \"a\";", vec!["true", "false", "false"])]
    #[case::truthiness("print !nil; print !0; print !\"\";", vec!["true", "false", "false"])]
    #[case::logical("print nil or \"default\"; print false and boom;", vec!["default", "false"])]
    #[case::block_scoping("var a = 1; { var a = 2; print a; } print a;", vec!["2", "1"])]
    #[case::while_loop("var i = 0; while (i < 3) { print i; i = i + 1; }", vec!["0", "1", "2"])]
    #[case::for_loop("for (var i = 0; i < 2; i = i + 1) print i;", vec!["0", "1"])]
    #[case::if_else("if (false) print 1; else print 2;", vec!["2"])]
    #[case::function_display("fun f() {} print f; print fun () {}; print clock;", vec!["<fn f>", "<fn>", "<native fn>"])]
    #[case::implicit_nil_return("fun f() {} print f();", vec!["nil"])]
    #[case::return_from_loop(
        "fun find() { var i = 0; while (true) { if (i == 3) return i; i = i + 1; } } print find();",
        vec!["3"]
    )]
    #[case::recursion("fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } print fib(10);", vec!["55"])]
    #[case::closure_counter(
        "fun counter() { var n = 0; fun inc() { n = n + 1; return n; } return inc; }
         var c = counter(); c(); print c();",
        vec!["2"]
    )]
    #[case::closure_captures_declaring_scope(
        "var a = \"global\"; { fun show() { print a; } show(); var a = \"block\"; show(); }",
        vec!["global", "global"]
    )]
    fn test_eval(#[case] code: &str, #[case] expected: Vec<&str>) {
        assert_eq!(run(code).unwrap(), expected);
    }

    #[rstest]
    #[case::instance_display("class Point {} print Point; print Point();", vec!["<class Point>", "Point instance"])]
    #[case::fields("class Box {} var b = Box(); b.value = 42; print b.value;", vec!["42"])]
    #[case::initializer(
        "class Point { Point(x, y) { this.x = x; this.y = y; } sum() { return this.x + this.y; } }
         print Point(1, 2).sum();",
        vec!["3"]
    )]
    #[case::initializer_returns_this(
        "class A { A() { this.n = 1; return; } } var a = A(); print a.A() == a;",
        vec!["true"]
    )]
    #[case::inherited_method(
        "class A { hello() { return \"A\"; } } class B < A {} print B().hello();",
        vec!["A"]
    )]
    #[case::super_call(
        "class A { name() { return \"A\"; } }
         class B < A { name() { return \"B of \" + super.name(); } }
         print B().name();",
        vec!["B of A"]
    )]
    #[case::inherited_initializer(
        "class Shape { Shape(w, h) { this.area = w * h; } } class Rect < Shape {}
         print Rect(2, 3).area;",
        vec!["6"]
    )]
    #[case::class_method(
        "class Math { class square(n) { return n * n; } } print Math.square(4);",
        vec!["16"]
    )]
    #[case::inherited_class_method(
        "class A { class make() { return \"made\"; } } class B < A {} print B.make();",
        vec!["made"]
    )]
    #[case::super_in_class_method(
        "class A { class id() { return \"A\"; } }
         class B < A { class id() { return \"B\" + super.id(); } }
         print B.id();",
        vec!["BA"]
    )]
    #[case::class_method_constructs(
        "class P { P(v) { this.v = v; } class of(v) { return P(v); } } print P.of(7).v;",
        vec!["7"]
    )]
    #[case::bound_method_keeps_receiver(
        "class C { C(n) { this.n = n; } get() { return this.n; } } var g = C(5).get; print g();",
        vec!["5"]
    )]
    #[case::shared_outer_variable(
        "fun make() {
           var log = \"\";
           class T { a() { log = log + \"a\"; } b() { log = log + \"b\"; } show() { return log; } }
           return T();
         }
         var t = make(); var a = t.a; var b = t.b; a(); b(); a(); print t.show();",
        vec!["aba"]
    )]
    #[case::field_shadows_method(
        "class C { m() { return \"method\"; } } var c = C(); c.m = \"field\"; print c.m;",
        vec!["field"]
    )]
    #[case::class_field_write_is_accepted("class C {} C.x = 1; print \"ok\";", vec!["ok"])]
    fn test_classes(#[case] code: &str, #[case] expected: Vec<&str>) {
        assert_eq!(run(code).unwrap(), expected);
    }

    #[rstest]
    #[case::undefined_variable("print missing;", "Undefined variable \"missing\"")]
    #[case::undefined_assignment("missing = 1;", "Undefined variable \"missing\"")]
    #[case::undefined_property("class A {} print A().x;", "Undefined property \"x\"")]
    #[case::undefined_class_method("class A {} A.make();", "Undefined class method \"make\"")]
    #[case::class_field_is_not_readable("class C {} C.x = 1; print C.x;", "Undefined class method \"x\"")]
    #[case::arity("fun f(a) {} f(1, 2);", "Invalid number of arguments in \"f\", expected 1, got 2")]
    #[case::class_arity("class A {} A(1);", "Invalid number of arguments in \"A\", expected 0, got 1")]
    #[case::not_callable("\"str\"();", "Can only call functions and classes, got string")]
    #[case::negate("print -\"a\";", "Operand must be a number")]
    #[case::add_mixed("print 1 + \"a\";", "Operands must be two numbers or two strings")]
    #[case::compare_mixed("print 1 < \"a\";", "Operands must be numbers")]
    #[case::property_on_number("var n = 1; print n.x;", "Only instances have properties")]
    #[case::field_on_number("var n = 1; n.x = 2;", "Only instances have fields")]
    #[case::superclass_not_class("var NotClass = 1; class A < NotClass {}", "Superclass must be a class")]
    #[case::super_missing_method(
        "class A {} class B < A { m() { return super.nope(); } } B().m();",
        "Undefined property \"nope\""
    )]
    #[case::grandparent_initializer_not_inherited(
        "class A { A(x) {} } class B < A {} class C < B {} C(1);",
        "Invalid number of arguments in \"C\", expected 0, got 1"
    )]
    fn test_runtime_errors(#[case] code: &str, #[case] expected: &str) {
        assert_eq!(run(code).unwrap_err().to_string(), expected);
    }

    #[test]
    fn test_stack_overflow() {
        let token_arena = Shared::new(SharedCell::new(Arena::new(64)));
        let program = parse("fun f() { f(); } f();", Shared::clone(&token_arena)).unwrap();
        let (resolutions, _) = Resolver::new(Shared::clone(&token_arena)).resolve(&program);

        let mut evaluator = Evaluator::new(token_arena, Output::Buffer(Vec::new()));
        evaluator.options.max_call_stack_depth = 8;

        assert_eq!(
            evaluator.eval(&program, resolutions).unwrap_err().to_string(),
            "Maximum call stack depth of 8 exceeded"
        );
    }

    const SUM: &str = "fun sum(n) { if (n == 0) return 0; return n + sum(n - 1); }";

    #[test]
    fn test_deep_recursion_with_default_options() {
        assert_eq!(
            run(&format!("{SUM} print sum(1000);")).unwrap(),
            vec!["500500"]
        );
    }

    #[test]
    fn test_raised_limit_grows_native_stack() {
        let token_arena = Shared::new(SharedCell::new(Arena::new(64)));
        let program = parse(&format!("{SUM} print sum(3000);"), Shared::clone(&token_arena)).unwrap();
        let (resolutions, _) = Resolver::new(Shared::clone(&token_arena)).resolve(&program);

        let mut evaluator = Evaluator::new(token_arena, Output::Buffer(Vec::new()));
        evaluator.options.max_call_stack_depth = 100_000;

        evaluator.eval(&program, resolutions).unwrap();
        assert_eq!(evaluator.take_output(), vec!["4501500".to_string()]);
    }

    #[test]
    fn test_evaluator_recovers_after_runtime_error() {
        let token_arena = Shared::new(SharedCell::new(Arena::new(256)));
        let mut evaluator = Evaluator::new(Shared::clone(&token_arena), Output::Buffer(Vec::new()));

        for (code, ok) in [
            ("var a = 1; { var b = 2; print nope; }", false),
            ("print a;", true),
        ] {
            let program = parse(code, Shared::clone(&token_arena)).unwrap();
            let (resolutions, _) = Resolver::new(Shared::clone(&token_arena)).resolve(&program);
            assert_eq!(evaluator.eval(&program, resolutions).is_ok(), ok);
        }

        assert_eq!(evaluator.take_output(), vec!["1".to_string()]);
        assert!(Shared::ptr_eq(&evaluator.env, &evaluator.globals));
        assert_eq!(evaluator.call_stack_depth, 0);
    }

    #[test]
    fn test_global_lookup() {
        let token_arena = Shared::new(SharedCell::new(Arena::new(16)));
        let mut evaluator = Evaluator::new(Shared::clone(&token_arena), Output::Buffer(Vec::new()));
        let program = parse("var answer = 42;", Shared::clone(&token_arena)).unwrap();
        evaluator.eval(&program, Resolutions::default()).unwrap();

        assert_eq!(evaluator.global("answer"), Some(RuntimeValue::Number(42.0.into())));
        assert_eq!(evaluator.global("question"), None);
    }
}
