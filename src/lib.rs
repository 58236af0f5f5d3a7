#![allow(clippy::needless_range_loop)]
#![warn(unused_mut)]
#![warn(unused_imports)]
#![warn(unused_labels)]
#![warn(unused_parens)]
#![warn(unused_variables)]

//! An XML object model with namespace-aware mutation, serialization and
//! canonicalization.
//!
//! Trees are built from [`tree`] handles, checked by the name and data verifiers
//! on every mutation, written by [`save::Serializer`] and canonicalized by
//! [`c14n::Canonicalizer`]. [`parser`] builds trees from text.

#[cfg(feature = "c14n")]
pub mod c14n;
pub mod chvalid;
pub mod encoding;
pub mod error;
pub mod globals;
#[cfg(feature = "output")]
pub mod io;
#[cfg(feature = "parser")]
pub mod parser;
#[cfg(feature = "output")]
pub mod save;
pub mod tree;
pub mod uri;

pub use error::{XmlError, XmlErrorKind};
