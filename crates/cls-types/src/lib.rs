//! Core types and traits for the text classification service.
//!
//! Request/response DTOs keep the camelCase JSON shape used by the retraining API.

mod dto;
mod job;
mod model;
mod traits;

pub use dto::*;
pub use job::*;
pub use model::*;
pub use traits::*;
