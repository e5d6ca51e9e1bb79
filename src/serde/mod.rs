//! Helpers for serializing and deserializing configuration values.

pub mod duration;
pub mod hash_map;
