//! Text analysis: splitting field values into indexed tokens.

pub mod analyzer;
pub mod token;
