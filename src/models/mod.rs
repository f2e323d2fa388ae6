//! Data models

mod api_key;
mod auth;
mod one_time_token;
mod organization;
mod refresh_token;
mod session;
mod user;

pub use api_key::*;
pub use auth::*;
pub use one_time_token::*;
pub use organization::*;
pub use refresh_token::*;
pub use session::*;
pub use user::*;
