//! Reader/writer for the classic skin/osage binary model data (unofficial).
//!
//! The crate is IO-free: it parses and serializes fully buffered byte slices.
//! Container/archive handling and any editing UI live with the caller.

#![forbid(unsafe_code)]

mod blocks;
mod error;
mod format;
mod model;
mod reader;
mod skin;
mod strings;
mod writer;

pub use blocks::*;
pub use error::*;
pub use format::*;
pub use model::*;
pub use reader::*;
pub use skin::*;
pub use strings::*;
pub use writer::*;




#[cfg(test)]
mod skin_tests;
