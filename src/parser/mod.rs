//! Text MIR parser
//!
//! A line-oriented format for writing machine functions by hand:
//!
//! ```text
//! func sum {
//!     param v0
//!     param v1
//!     ret v2
//! block entry depth 0:
//!     add v2, v0, v1
//!     ret
//! }
//! ```
//!
//! Directives inside a function: `param vN`, `ret vN`, `class vN NAME`,
//! `hint vN REG[,REG...]`. Blocks start with `block LABEL:` or
//! `block LABEL depth N:`. `#` and `;` start comments.

pub mod parser;

pub use parser::{parse, parse_named};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Unexpected end of input: function '{0}' is not closed")]
    UnexpectedEof(String),

    #[error("Invalid instruction at line {line}: {text}")]
    InvalidInstruction { line: usize, text: String },

    #[error("Invalid operand at line {line}: '{operand}'")]
    InvalidOperand { line: usize, operand: String },

    #[error("Branch to unknown block '{label}' in function '{func}'")]
    UnknownLabel { func: String, label: String },
}

pub type ParseResult<T> = Result<T, ParseError>;
