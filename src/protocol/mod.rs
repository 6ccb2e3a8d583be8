//! The command lexer/parser and framed transport (C1-C3 of the design).

pub mod lexer;
pub mod parser;
pub mod token;
pub mod transport;

pub use lexer::lex;
pub use parser::{parse, Command, CommandKind};
pub use token::{Keyword, Token};
