//! Shared low level machinery for the codec modules

pub mod bits;
pub mod tree;
pub mod linalg;
