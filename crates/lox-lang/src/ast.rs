use crate::{Shared, Token, arena::ArenaId};

pub mod constants;
pub mod error;
pub mod node;
pub mod parser;

pub type Program = Vec<node::Stmt>;
pub type TokenId = ArenaId<Shared<Token>>;
