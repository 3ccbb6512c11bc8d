//! Configuration codec.
//!
//! This module converts between the platform's flat wire strings and the
//! structured model, driven by the [`registry`](crate::registry).

pub mod decoder;
pub mod encoder;

pub use decoder::{decode, decode_lenient, decode_value};
pub use encoder::{encode, encode_value};
