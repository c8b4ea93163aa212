//! Formula language: lexing, parsing, evaluation and calculation passes

pub mod ast;
pub mod calc;
pub(crate) mod eval;
mod functions;
pub mod lexer;
pub mod parser;
pub(crate) mod rewrite;

pub use ast::{BinaryOp, CellRef, Coord, Expr, RefTarget, Reference, UnaryOp, quote_sheet_name};
pub use calc::{CalcReport, CalcScope};
pub use functions::SUPPORTED_FUNCTIONS;
pub use lexer::{LexError, Token, TokenKind, tokenize};
pub use parser::{ParseError, parse_formula};
