pub mod connection_session;
pub mod session_manager;

pub use connection_session::{CancelHandle, ConnectionSession, SessionId};
pub use session_manager::{SessionInfo, SessionManager, DEFAULT_MAX_SESSIONS};
