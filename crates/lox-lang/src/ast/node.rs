use smallvec::SmallVec;

use crate::{Ident, Shared, Token, number::Number};

use super::{Program, TokenId};

pub type Args = SmallVec<[Shared<Node>; 4]>;
pub type Params = SmallVec<[IdentWithToken; 4]>;

/// An expression together with the identity of the token it was parsed
/// from. `token_id` is unique per node, so it also keys the resolver's
/// side table.
#[derive(PartialEq, Debug, Clone)]
pub struct Node {
    pub token_id: TokenId,
    pub expr: Shared<Expr>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct IdentWithToken {
    pub name: Ident,
    pub token: Shared<Token>,
}

impl IdentWithToken {
    pub fn new_with_token(name: &str, token: Shared<Token>) -> Self {
        Self {
            name: Ident::new(name),
            token,
        }
    }
}

impl std::fmt::Display for IdentWithToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum Literal {
    Number(Number),
    String(String),
    Bool(bool),
    Nil,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum LogicalOp {
    And,
    Or,
}

/// Parameters and body of a function, method or function expression.
/// Shared by every closure created from it.
#[derive(PartialEq, Debug, Clone)]
pub struct FunctionDecl {
    pub name: Option<Ident>,
    pub params: Params,
    pub body: Program,
}

#[derive(PartialEq, Debug, Clone)]
pub struct MethodDecl {
    pub name: IdentWithToken,
    pub function: Shared<FunctionDecl>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ClassDecl {
    pub name: IdentWithToken,
    /// Always an `Expr::Variable` node.
    pub superclass: Option<Shared<Node>>,
    pub methods: Vec<MethodDecl>,
    pub class_methods: Vec<MethodDecl>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Expr {
    Assign(IdentWithToken, Shared<Node>),
    Binary(BinaryOp, Shared<Node>, Shared<Node>),
    Call(Shared<Node>, Args),
    Function(Shared<FunctionDecl>),
    Get(Shared<Node>, IdentWithToken),
    Grouping(Shared<Node>),
    Literal(Literal),
    Logical(LogicalOp, Shared<Node>, Shared<Node>),
    Set(Shared<Node>, IdentWithToken, Shared<Node>),
    Super(IdentWithToken),
    This,
    Unary(UnaryOp, Shared<Node>),
    Variable(IdentWithToken),
}

#[derive(PartialEq, Debug, Clone)]
pub enum Stmt {
    Block(Program),
    Class(Shared<ClassDecl>),
    Expression(Shared<Node>),
    If(Shared<Node>, Box<Stmt>, Option<Box<Stmt>>),
    Print(Shared<Node>),
    Return(Shared<Token>, Option<Shared<Node>>),
    Var(IdentWithToken, Option<Shared<Node>>),
    While(Shared<Node>, Box<Stmt>),
}
