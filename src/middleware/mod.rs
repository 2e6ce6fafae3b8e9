//! Request interceptors that run before any handler.

pub mod admission;

pub use admission::admit;
