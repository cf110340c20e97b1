//! Shared utility modules used across Stratum components.

pub mod bit_vector;
pub mod varint;
