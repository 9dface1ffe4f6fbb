//! Authentication: password hashing, login sessions, role checks and the
//! stateless password-reset token flow.

pub mod password;
pub mod service;
pub mod session;
pub mod token;

pub use service::{require_any_role, AuthService, AuthUser, LoginDenied, LoginOutcome};
pub use session::{Session, SessionManager};
pub use token::{ResetTokenSigner, TokenError, DEFAULT_RESET_MAX_AGE_SECS};
