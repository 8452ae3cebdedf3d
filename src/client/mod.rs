//! Client side of the memo API: token persistence and the refresh-on-401
//! session guard.

pub mod session;
pub mod token_store;

pub use session::{SessionError, SessionEvent, SessionGuard};
pub use token_store::{FileTokenStore, MemoryTokenStore, SessionTokens, TokenStore};
