mod middleware;
mod session;
mod token;

pub use middleware::{AuthError, RequireUser};
pub use session::{SessionClaims, SessionKeys, default_session_ttl};
pub use token::{ParsedToken, TokenGenerator, TokenKind, parse_token};
