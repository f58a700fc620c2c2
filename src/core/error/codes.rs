//! 对外错误码定义
//!
//! 错误码格式: XXYY
//! - XX: 错误类别 (00=成功, 01=语法, 02=执行, 03=验证, 05=资源, 09=系统)
//! - YY: 具体错误

use serde::{Deserialize, Serialize};

/// 对外错误码 - 用于客户端响应
///
/// 错误码一旦定义不应随意修改，客户端会依据数值判断是否可以重试整个事务
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    Success = 0,

    // ==================== 语法错误 (01xx) ====================
    /// 解析错误
    ParseError = 101,
    /// 不支持的语句
    UnsupportedStatement = 104,

    // ==================== 执行错误 (02xx) ====================
    /// 通用执行错误
    ExecutionError = 200,
    /// 并发写冲突导致事务中止
    Conflict = 203,
    /// 语句被取消
    Cancelled = 205,
    /// 当前事务状态不允许该操作
    InvalidTransactionState = 206,

    // ==================== 验证错误 (03xx) ====================
    /// 类型错误
    TypeError = 301,
    /// 约束违反
    ConstraintViolation = 303,

    // ==================== 资源错误 (05xx) ====================
    /// 对象未找到
    ResourceNotFound = 500,
    /// 对象已存在
    ResourceAlreadyExists = 501,
    /// 会话数超过上限
    ResourceExhausted = 502,

    // ==================== 系统错误 (09xx) ====================
    /// 内部错误
    InternalError = 900,
}

impl ErrorCode {
    /// 获取错误码的 i32 值
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self.as_i32() {
            0 => ErrorCategory::Success,
            100..=199 => ErrorCategory::Syntax,
            200..=299 => ErrorCategory::Execution,
            300..=399 => ErrorCategory::Validation,
            500..=599 => ErrorCategory::Resource,
            _ => ErrorCategory::System,
        }
    }

    /// 获取默认的错误消息
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Success => "成功",
            ErrorCode::ParseError => "解析错误",
            ErrorCode::UnsupportedStatement => "不支持的语句",
            ErrorCode::ExecutionError => "执行错误",
            ErrorCode::Conflict => "并发冲突",
            ErrorCode::Cancelled => "语句已取消",
            ErrorCode::InvalidTransactionState => "无效的事务状态",
            ErrorCode::TypeError => "类型错误",
            ErrorCode::ConstraintViolation => "约束违反",
            ErrorCode::ResourceNotFound => "对象未找到",
            ErrorCode::ResourceAlreadyExists => "对象已存在",
            ErrorCode::ResourceExhausted => "资源不足",
            ErrorCode::InternalError => "内部错误",
        }
    }

    /// 判断错误是否可重试
    ///
    /// 只有写冲突是可重试的，客户端应当重试整个事务而不是单条语句
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::Conflict)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.as_i32(), self.default_message())
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Success,
    Syntax,
    Execution,
    Validation,
    Resource,
    System,
}

/// 对外错误信息 - 用于序列化到响应中
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicError {
    pub code: ErrorCode,
    pub message: String,
    /// 客户端是否应当重试整个事务
    pub retryable: bool,
}

impl PublicError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }
}

/// 内部错误到对外错误的转换 trait
pub trait ToPublicError {
    /// 转换为对外错误
    fn to_public_error(&self) -> PublicError {
        PublicError::new(self.to_error_code(), self.to_public_message())
    }

    /// 获取对外错误码
    fn to_error_code(&self) -> ErrorCode;

    /// 获取对外错误消息
    fn to_public_message(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::Success.category(), ErrorCategory::Success);
        assert_eq!(ErrorCode::ParseError.category(), ErrorCategory::Syntax);
        assert_eq!(ErrorCode::Conflict.category(), ErrorCategory::Execution);
        assert_eq!(ErrorCode::ConstraintViolation.category(), ErrorCategory::Validation);
        assert_eq!(ErrorCode::ResourceNotFound.category(), ErrorCategory::Resource);
        assert_eq!(ErrorCode::InternalError.category(), ErrorCategory::System);
    }

    #[test]
    fn test_only_conflict_is_retryable() {
        assert!(ErrorCode::Conflict.is_retryable());
        assert!(!ErrorCode::ParseError.is_retryable());
        assert!(!ErrorCode::ResourceNotFound.is_retryable());
        assert!(!ErrorCode::InvalidTransactionState.is_retryable());
    }

    #[test]
    fn test_public_error() {
        let err = PublicError::new(ErrorCode::Conflict, "写冲突");
        assert_eq!(err.code, ErrorCode::Conflict);
        assert_eq!(err.message, "写冲突");
        assert!(err.retryable);

        let err = PublicError::new(ErrorCode::ResourceNotFound, "表不存在");
        assert!(!err.retryable);
    }
}
