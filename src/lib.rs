//! Resolve batches of arithmetic expressions and equations.
//!
//! A batch is a string of statements separated by `;`. Each statement is
//! either an expression, which gets simplified, or an equation, which gets
//! solved for every unknown it contains.
//!
//! ```rust
//! let batch = resolver::resolve("2 * (3 + 4); x^2 = 4; 1/0");
//!
//! assert_eq!(batch.len(), 3);
//! assert_eq!(batch[0].outcome.as_ref().unwrap().to_string(), "14");
//! assert_eq!(
//!     batch[1].outcome.as_ref().unwrap().to_string(),
//!     "x = -2 or x = 2"
//! );
//! assert!(batch[2].outcome.is_err());
//!
//! for entry in &batch {
//!     println!("{}", entry.steps);
//! }
//! ```
//!
//! Statements never affect each other, so a mistake in one of them doesn't
//! stop the rest of the batch from being resolved.

#![forbid(unsafe_code)]

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

mod config;
mod equations;
mod expr;
pub mod ops;
mod parse;
mod polynomial;
pub mod quiz;
mod resolve;
mod solve;

pub use config::{ConfigError, ResolverConfig};
pub use equations::Equation;
pub use expr::{format_number, BinaryOperation, Expression, Parameter};
pub use parse::{parse, parse_with_depth, ParseError, TokenKind};
pub use polynomial::{ClosedForm, InTermsOf, Polynomial};
pub use resolve::{
    resolve, BatchResult, Entry, ResolveError, Resolver, Solution,
    StatementKind, StepTrace,
};
