pub mod error;

// 错误和结果类型
pub use error::{
    DBError, DBResult, ErrorCode, ExecutionError, ExecutionResult, PublicError, SessionError,
    SessionResult, StoreError, StoreResult, ToPublicError,
};
