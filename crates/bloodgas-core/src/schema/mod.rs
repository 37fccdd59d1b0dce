//! Panel Schema: the authoritative definition of the 18 indicators.
//!
//! Pipeline: raw mapping → key normalization → numeric parsing → bound check → [`Panel`]

mod field;
mod normalizer;
mod validate;

pub use field::*;
pub use normalizer::*;
pub use validate::*;
