//! Business logic services

pub mod api_key;
pub mod crypto;
pub mod one_time_token;
pub mod rate_limiter;
pub mod session;
pub mod signature;
pub mod token;

pub use api_key::ApiKeyService;
pub use crypto::PasswordHasherPool;
pub use one_time_token::{IssuedOneTimeToken, OneTimeTokenService};
pub use rate_limiter::{RateLimitDecision, RateLimitStore, SlidingWindowLimiter};
pub use session::{IssuedTokens, SessionService};
pub use signature::{SignatureError, SignatureVerifier};
pub use token::{Claims, TokenError, TokenSigner, TokenType};
