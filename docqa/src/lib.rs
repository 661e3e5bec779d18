//! Grounded question answering over a local document collection.
//!
//! Documents are extracted, chunked and embedded into a vector index; questions
//! retrieve the closest chunks and an answer generator replies from them alone.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod services;

pub use error::{DocQaError, Result};
