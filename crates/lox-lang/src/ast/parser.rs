use crate::lexer::token::{Token, TokenKind};
use crate::range::Range;
use crate::{Shared, TokenArena, ensure_stack, token_alloc};
use smallvec::SmallVec;
use std::iter::Peekable;

use super::constants::MAX_ARGUMENTS;
use super::error::ParseError;
use super::node::{
    Args, BinaryOp, ClassDecl, Expr, FunctionDecl, IdentWithToken, Literal, LogicalOp,
    MethodDecl, Node, Params, Stmt, UnaryOp,
};
use super::Program;

pub struct Parser<'a> {
    tokens: Peekable<core::slice::Iter<'a, Shared<Token>>>,
    token_arena: TokenArena,
    eof: Shared<Token>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: core::slice::Iter<'a, Shared<Token>>, token_arena: TokenArena) -> Self {
        let eof = tokens
            .as_slice()
            .last()
            .map(Shared::clone)
            .unwrap_or_else(|| Shared::new(Token::new(Range::default(), TokenKind::Eof)));

        Self {
            tokens: tokens.peekable(),
            token_arena,
            eof,
        }
    }

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let mut program = Vec::new();

        while !self.peek_token().is_eof() {
            program.push(self.parse_declaration()?);
        }

        Ok(program)
    }

    fn parse_declaration(&mut self) -> Result<Stmt, ParseError> {
        let token = self.peek_token();

        match &token.kind {
            TokenKind::Class => {
                self.next_token()?;
                self.parse_class()
            }
            // `fun (` starts a function expression statement, not a declaration.
            TokenKind::Fun if matches!(self.peek_second_kind(), Some(TokenKind::Ident(_))) => {
                let fun_token = self.next_token()?;
                self.parse_fun_declaration(fun_token)
            }
            TokenKind::Var => {
                self.next_token()?;
                self.parse_var_declaration()
            }
            _ => self.parse_statement(),
        }
    }

    fn parse_class(&mut self) -> Result<Stmt, ParseError> {
        let name = self.consume_ident("class name")?;

        let superclass = match self.tokens.next_if(|t| t.kind == TokenKind::Less) {
            Some(_) => {
                let superclass = self.consume_ident("superclass name")?;
                Some(self.node(&Shared::clone(&superclass.token), Expr::Variable(superclass)))
            }
            None => None,
        };

        self.consume(TokenKind::LBrace, "`{` before class body")?;

        let mut methods = Vec::new();
        let mut class_methods = Vec::new();

        loop {
            let token = self.peek_token();
            match &token.kind {
                TokenKind::RBrace | TokenKind::Eof => break,
                TokenKind::Class => {
                    self.next_token()?;
                    class_methods.push(self.parse_method()?);
                }
                _ => methods.push(self.parse_method()?),
            }
        }

        self.consume(TokenKind::RBrace, "`}` after class body")?;

        Ok(Stmt::Class(Shared::new(ClassDecl {
            name,
            superclass,
            methods,
            class_methods,
        })))
    }

    fn parse_method(&mut self) -> Result<MethodDecl, ParseError> {
        let name = self.consume_ident("method name")?;
        let function = self.parse_function_body(Some(&name))?;
        Ok(MethodDecl { name, function })
    }

    /// `fun name(...) { ... }` is sugar for `var name = fun (...) { ... };`.
    fn parse_fun_declaration(&mut self, fun_token: Shared<Token>) -> Result<Stmt, ParseError> {
        let name = self.consume_ident("function name")?;
        let function = self.parse_function_body(Some(&name))?;
        let initializer = self.node(&fun_token, Expr::Function(function));
        Ok(Stmt::Var(name, Some(initializer)))
    }

    fn parse_function_body(
        &mut self,
        name: Option<&IdentWithToken>,
    ) -> Result<Shared<FunctionDecl>, ParseError> {
        self.consume(TokenKind::LParen, "`(` before parameters")?;

        let mut params: Params = SmallVec::new();
        if self.tokens.next_if(|t| t.kind == TokenKind::RParen).is_none() {
            loop {
                let param = self.consume_ident("parameter name")?;
                if params.len() >= MAX_ARGUMENTS {
                    return Err(ParseError::TooManyArguments((*param.token).clone(), "parameters"));
                }
                params.push(param);

                if self.tokens.next_if(|t| t.kind == TokenKind::Comma).is_none() {
                    break;
                }
            }
            self.consume(TokenKind::RParen, "`)` after parameters")?;
        }

        self.consume(TokenKind::LBrace, "`{` before function body")?;
        let body = self.parse_block_body()?;

        Ok(Shared::new(FunctionDecl {
            name: name.map(|name| name.name),
            params,
            body,
        }))
    }

    fn parse_var_declaration(&mut self) -> Result<Stmt, ParseError> {
        let name = self.consume_ident("variable name")?;

        let initializer = match self.tokens.next_if(|t| t.kind == TokenKind::Equal) {
            Some(_) => Some(self.parse_expr()?),
            None => None,
        };

        self.consume(TokenKind::SemiColon, "`;` after variable declaration")?;
        Ok(Stmt::Var(name, initializer))
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        ensure_stack(|| self.parse_statement_inner())
    }

    fn parse_statement_inner(&mut self) -> Result<Stmt, ParseError> {
        let token = self.peek_token();

        match &token.kind {
            TokenKind::Print => {
                self.next_token()?;
                let value = self.parse_expr()?;
                self.consume(TokenKind::SemiColon, "`;` after value")?;
                Ok(Stmt::Print(value))
            }
            TokenKind::Return => {
                let keyword = self.next_token()?;
                let value = if self.peek_token().kind == TokenKind::SemiColon {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.consume(TokenKind::SemiColon, "`;` after return value")?;
                Ok(Stmt::Return(keyword, value))
            }
            TokenKind::If => {
                self.next_token()?;
                self.parse_if()
            }
            TokenKind::While => {
                self.next_token()?;
                self.consume(TokenKind::LParen, "`(` after `while`")?;
                let condition = self.parse_expr()?;
                self.consume(TokenKind::RParen, "`)` after condition")?;
                let body = self.parse_statement()?;
                Ok(Stmt::While(condition, Box::new(body)))
            }
            TokenKind::For => {
                let for_token = self.next_token()?;
                self.parse_for(for_token)
            }
            TokenKind::LBrace => {
                self.next_token()?;
                Ok(Stmt::Block(self.parse_block_body()?))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.consume(TokenKind::SemiColon, "`;` after expression")?;
                Ok(Stmt::Expression(expr))
            }
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenKind::LParen, "`(` after `if`")?;
        let condition = self.parse_expr()?;
        self.consume(TokenKind::RParen, "`)` after if condition")?;

        let then_branch = self.parse_statement()?;
        let else_branch = match self.tokens.next_if(|t| t.kind == TokenKind::Else) {
            Some(_) => Some(Box::new(self.parse_statement()?)),
            None => None,
        };

        Ok(Stmt::If(condition, Box::new(then_branch), else_branch))
    }

    /// Desugars `for (init; cond; incr) body` into
    /// `{ init; while (cond) { body; incr; } }`.
    fn parse_for(&mut self, for_token: Shared<Token>) -> Result<Stmt, ParseError> {
        self.consume(TokenKind::LParen, "`(` after `for`")?;

        let token = self.peek_token();
        let initializer = match &token.kind {
            TokenKind::SemiColon => {
                self.next_token()?;
                None
            }
            TokenKind::Var => {
                self.next_token()?;
                Some(self.parse_var_declaration()?)
            }
            _ => {
                let expr = self.parse_expr()?;
                self.consume(TokenKind::SemiColon, "`;` after loop initializer")?;
                Some(Stmt::Expression(expr))
            }
        };

        let condition = if self.peek_token().kind == TokenKind::SemiColon {
            self.node(&for_token, Expr::Literal(Literal::Bool(true)))
        } else {
            self.parse_expr()?
        };
        self.consume(TokenKind::SemiColon, "`;` after loop condition")?;

        let increment = if self.peek_token().kind == TokenKind::RParen {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.consume(TokenKind::RParen, "`)` after for clauses")?;

        let body = self.parse_statement()?;
        let body = match increment {
            Some(increment) => Stmt::Block(vec![body, Stmt::Expression(increment)]),
            None => body,
        };

        let looped = Stmt::While(condition, Box::new(body));
        Ok(match initializer {
            Some(initializer) => Stmt::Block(vec![initializer, looped]),
            None => looped,
        })
    }

    /// Parses declarations up to and including the closing `}`.
    fn parse_block_body(&mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();

        loop {
            let token = self.peek_token();
            match &token.kind {
                TokenKind::RBrace | TokenKind::Eof => break,
                _ => statements.push(self.parse_declaration()?),
            }
        }

        self.consume(TokenKind::RBrace, "`}` after block")?;
        Ok(statements)
    }

    fn parse_expr(&mut self) -> Result<Shared<Node>, ParseError> {
        ensure_stack(|| self.parse_assignment())
    }

    fn parse_assignment(&mut self) -> Result<Shared<Node>, ParseError> {
        let lhs = self.parse_unary()?;
        let expr = self.parse_binary_op(1, lhs)?;

        let equals = match self.tokens.next_if(|t| t.kind == TokenKind::Equal) {
            Some(equals) => Shared::clone(equals),
            None => return Ok(expr),
        };

        let value = self.parse_assignment()?;

        match &*expr.expr {
            // The target keeps the identity of the variable node it replaces.
            Expr::Variable(ident) => Ok(Shared::new(Node {
                token_id: expr.token_id,
                expr: Shared::new(Expr::Assign(ident.clone(), value)),
            })),
            Expr::Get(object, name) => Ok(Shared::new(Node {
                token_id: expr.token_id,
                expr: Shared::new(Expr::Set(Shared::clone(object), name.clone(), value)),
            })),
            _ => Err(ParseError::InvalidAssignmentTarget((*equals).clone())),
        }
    }

    #[inline(always)]
    fn binary_op_precedence(kind: &TokenKind) -> u8 {
        match kind {
            TokenKind::Or => 1,
            TokenKind::And => 2,
            TokenKind::EqualEqual | TokenKind::BangEqual => 3,
            TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual => 4,
            TokenKind::Plus | TokenKind::Minus => 5,
            TokenKind::Star | TokenKind::Slash => 6,
            _ => 0,
        }
    }

    fn parse_binary_op(
        &mut self,
        min_prec: u8,
        mut lhs: Shared<Node>,
    ) -> Result<Shared<Node>, ParseError> {
        loop {
            let prec = Self::binary_op_precedence(&self.peek_token().kind);
            if prec == 0 || prec < min_prec {
                break;
            }

            let operator_token = self.next_token()?;
            let mut rhs = self.parse_unary()?;

            loop {
                let next_prec = Self::binary_op_precedence(&self.peek_token().kind);
                if next_prec > prec {
                    rhs = self.parse_binary_op(next_prec, rhs)?;
                } else {
                    break;
                }
            }

            let expr = match &operator_token.kind {
                TokenKind::Or => Expr::Logical(LogicalOp::Or, lhs, rhs),
                TokenKind::And => Expr::Logical(LogicalOp::And, lhs, rhs),
                TokenKind::EqualEqual => Expr::Binary(BinaryOp::Eq, lhs, rhs),
                TokenKind::BangEqual => Expr::Binary(BinaryOp::Ne, lhs, rhs),
                TokenKind::Greater => Expr::Binary(BinaryOp::Gt, lhs, rhs),
                TokenKind::GreaterEqual => Expr::Binary(BinaryOp::Gte, lhs, rhs),
                TokenKind::Less => Expr::Binary(BinaryOp::Lt, lhs, rhs),
                TokenKind::LessEqual => Expr::Binary(BinaryOp::Lte, lhs, rhs),
                TokenKind::Plus => Expr::Binary(BinaryOp::Add, lhs, rhs),
                TokenKind::Minus => Expr::Binary(BinaryOp::Sub, lhs, rhs),
                TokenKind::Star => Expr::Binary(BinaryOp::Mul, lhs, rhs),
                TokenKind::Slash => Expr::Binary(BinaryOp::Div, lhs, rhs),
                _ => return Err(ParseError::UnexpectedToken((*operator_token).clone())),
            };
            lhs = self.node(&operator_token, expr);
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Shared<Node>, ParseError> {
        let token = self.peek_token();

        let op = match &token.kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Negate,
            _ => return self.parse_call(),
        };

        let operator_token = self.next_token()?;
        let operand = ensure_stack(|| self.parse_unary())?;
        Ok(self.node(&operator_token, Expr::Unary(op, operand)))
    }

    fn parse_call(&mut self) -> Result<Shared<Node>, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            let token = self.peek_token();
            match &token.kind {
                TokenKind::LParen => {
                    self.next_token()?;
                    expr = self.finish_call(expr)?;
                }
                TokenKind::Dot => {
                    self.next_token()?;
                    let name = self.consume_ident("property name after `.`")?;
                    expr = self.node(&Shared::clone(&name.token), Expr::Get(expr, name));
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Shared<Node>) -> Result<Shared<Node>, ParseError> {
        let mut args: Args = SmallVec::new();

        if self.peek_token().kind != TokenKind::RParen {
            loop {
                let token = self.peek_token();
                if args.len() >= MAX_ARGUMENTS {
                    return Err(ParseError::TooManyArguments((*token).clone(), "arguments"));
                }
                args.push(self.parse_expr()?);

                if self.tokens.next_if(|t| t.kind == TokenKind::Comma).is_none() {
                    break;
                }
            }
        }

        // Call errors are reported at the closing parenthesis.
        let paren = self.consume(TokenKind::RParen, "`)` after arguments")?;
        Ok(self.node(&paren, Expr::Call(callee, args)))
    }

    fn parse_primary(&mut self) -> Result<Shared<Node>, ParseError> {
        let token = self.next_token()?;

        let expr = match &token.kind {
            TokenKind::BoolLiteral(b) => Expr::Literal(Literal::Bool(*b)),
            TokenKind::Nil => Expr::Literal(Literal::Nil),
            TokenKind::NumberLiteral(n) => Expr::Literal(Literal::Number(*n)),
            TokenKind::StringLiteral(s) => Expr::Literal(Literal::String(s.clone())),
            TokenKind::This => Expr::This,
            TokenKind::Super => {
                self.consume(TokenKind::Dot, "`.` after `super`")?;
                Expr::Super(self.consume_ident("superclass method name")?)
            }
            TokenKind::Ident(name) => {
                Expr::Variable(IdentWithToken::new_with_token(name, Shared::clone(&token)))
            }
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                self.consume(TokenKind::RParen, "`)` after expression")?;
                Expr::Grouping(inner)
            }
            TokenKind::Fun => Expr::Function(self.parse_function_body(None)?),
            TokenKind::Eof => return Err(ParseError::UnexpectedEOFDetected((*token).clone())),
            _ => return Err(ParseError::UnexpectedToken((*token).clone())),
        };

        Ok(self.node(&token, expr))
    }

    fn node(&self, token: &Shared<Token>, expr: Expr) -> Shared<Node> {
        Shared::new(Node {
            token_id: token_alloc(&self.token_arena, token),
            expr: Shared::new(expr),
        })
    }

    fn peek_token(&mut self) -> Shared<Token> {
        self.tokens
            .peek()
            .map(|token| Shared::clone(token))
            .unwrap_or_else(|| Shared::clone(&self.eof))
    }

    fn peek_second_kind(&self) -> Option<TokenKind> {
        self.tokens.clone().nth(1).map(|token| token.kind.clone())
    }

    fn next_token(&mut self) -> Result<Shared<Token>, ParseError> {
        match self.tokens.next() {
            Some(token) => Ok(Shared::clone(token)),
            None => Err(ParseError::UnexpectedEOFDetected((*self.eof).clone())),
        }
    }

    fn consume(&mut self, kind: TokenKind, expected: &'static str) -> Result<Shared<Token>, ParseError> {
        let token = self.peek_token();

        if token.kind == kind {
            return self.next_token();
        }

        if token.is_eof() {
            Err(ParseError::UnexpectedEOFDetected((*token).clone()))
        } else {
            Err(ParseError::ExpectedToken {
                expected,
                got: (*token).clone(),
            })
        }
    }

    fn consume_ident(&mut self, expected: &'static str) -> Result<IdentWithToken, ParseError> {
        let token = self.peek_token();

        match &token.kind {
            TokenKind::Ident(name) => {
                self.next_token()?;
                Ok(IdentWithToken::new_with_token(name, Shared::clone(&token)))
            }
            TokenKind::Eof => Err(ParseError::UnexpectedEOFDetected((*token).clone())),
            _ => Err(ParseError::ExpectedToken {
                expected,
                got: (*token).clone(),
            }),
        }
    }
}
