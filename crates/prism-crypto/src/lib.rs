//! Hashing primitives used for request signing

pub mod hash;

pub use hash::*;
