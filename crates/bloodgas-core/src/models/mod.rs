//! Data models: panel, weight, clinical context, analysis result, request state.

mod analysis;
mod context;
mod panel;
mod state;

pub use analysis::*;
pub use context::*;
pub use panel::*;
pub use state::*;
