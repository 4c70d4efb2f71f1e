//! Lume core types: interned strings and number semantics shared by the
//! compiler and any virtual machine built on top of it.

pub mod number;
pub mod string;
