use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::{number::Number, range::Range};

#[derive(PartialEq, PartialOrd, Debug, Clone)]
pub struct Token {
    pub range: Range,
    pub kind: TokenKind,
}

impl Token {
    pub fn new(range: Range, kind: TokenKind) -> Self {
        Self { range, kind }
    }

    #[inline(always)]
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

#[derive(PartialEq, PartialOrd, Debug, Clone)]
pub enum TokenKind {
    And,
    Bang,
    BangEqual,
    BoolLiteral(bool),
    Class,
    Comma,
    Dot,
    Else,
    Eof,
    Equal,
    EqualEqual,
    For,
    Fun,
    Greater,
    GreaterEqual,
    Ident(SmolStr),
    If,
    LBrace,
    LParen,
    Less,
    LessEqual,
    Minus,
    Nil,
    NumberLiteral(Number),
    Or,
    Plus,
    Print,
    RBrace,
    RParen,
    Return,
    SemiColon,
    Slash,
    Star,
    StringLiteral(String),
    Super,
    This,
    Var,
    While,
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.kind)
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match &self {
            TokenKind::And => write!(f, "and"),
            TokenKind::Bang => write!(f, "!"),
            TokenKind::BangEqual => write!(f, "!="),
            TokenKind::BoolLiteral(b) => write!(f, "{}", b),
            TokenKind::Class => write!(f, "class"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Else => write!(f, "else"),
            TokenKind::Eof => write!(f, "EOF"),
            TokenKind::Equal => write!(f, "="),
            TokenKind::EqualEqual => write!(f, "=="),
            TokenKind::For => write!(f, "for"),
            TokenKind::Fun => write!(f, "fun"),
            TokenKind::Greater => write!(f, ">"),
            TokenKind::GreaterEqual => write!(f, ">="),
            TokenKind::Ident(ident) => write!(f, "{}", ident),
            TokenKind::If => write!(f, "if"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::Less => write!(f, "<"),
            TokenKind::LessEqual => write!(f, "<="),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Nil => write!(f, "nil"),
            TokenKind::NumberLiteral(n) => write!(f, "{}", n),
            TokenKind::Or => write!(f, "or"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Print => write!(f, "print"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Return => write!(f, "return"),
            TokenKind::SemiColon => write!(f, ";"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::StringLiteral(s) => write!(f, "\"{}\"", s),
            TokenKind::Super => write!(f, "super"),
            TokenKind::This => write!(f, "this"),
            TokenKind::Var => write!(f, "var"),
            TokenKind::While => write!(f, "while"),
        }
    }
}
