#![cfg(target_endian = "little")]
#![deny(missing_docs)]

//! The colwire type system.
//!
//! Columns on the wire are described only by a type name such as `Array(Nullable(String))`.
//! This crate parses those names with [`TypeLexer`] into immutable [`DataType`] descriptors
//! through a caching [`TypeRegistry`], and defines the [`Value`] model that descriptors read,
//! write, coerce and parse from SQL literal text.

pub use decimal::*;
pub use dtype::*;
pub use lexer::*;
pub use literal::*;
pub use number::*;
pub use registry::*;
pub use u256::*;
pub use value::*;

mod binary;
mod coerce;
pub mod datetime;
mod decimal;
mod dtype;
mod lexer;
mod literal;
mod number;
mod registry;
mod u256;
mod value;
