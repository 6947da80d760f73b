//! Natural-language responses for task results
//!
//! - Error normalization into short user-safe phrases
//! - Template dispatch from action kind to response text

pub mod errors;
pub mod synthesizer;

pub use errors::{classify_error, normalize_error, NormalizedError};
pub use synthesizer::{generate_response, template_for, ResponseTemplate};
