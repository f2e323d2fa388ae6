//! Shared utilities

pub mod error;
pub mod extract;
pub mod validation;

pub use error::{AppError, AppResult, ErrorResponse};
pub use extract::{client_ip, ClientDevice, ValidatedJson};
