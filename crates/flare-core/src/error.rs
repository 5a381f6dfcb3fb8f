//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义服务器边界上可观测的全部错误码，保证握手引擎、多路复用器与编排器对外
//!   给出同一套稳定语义；
//! - 区分“契约错误 / 握手错误 / 连接致命错误”，瞬时状态（`pending`、`more_data`）
//!   不进入错误通道，而是由 [`Transfer`](crate::Transfer) 与
//!   [`ParseOutcome`](crate::protocol::ParseOutcome) 表达。
//!
//! ## 设计要求（What）
//! - [`FlareError`] 派生 `thiserror::Error`，满足 `Send + Sync + 'static`；
//! - 每个变体通过 [`FlareError::code`] 映射到唯一的 [`ErrorCode`]；
//! - [`ErrorCode::as_str`] 返回 `flare.<reason>` 形式的稳定字符串，供日志与告警聚合。

use std::{fmt, io};

use thiserror::Error;

/// 服务器边界上暴露的错误码全集。
///
/// - **契约 (What)**：成员与对外接口一一对应，新增成员必须同步更新 [`ErrorCode::ALL`]；
/// - **风险 (Trade-offs)**：字符串一旦发布即视为稳定契约，禁止改名。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorCode {
    Success,
    InvalidParameter,
    InvalidContext,
    Disconnect,
    ErrorConnect,
    ErrorHandshake,
    Pending,
    MoreData,
    NotFound,
    Empty,
    Canceled,
}

impl ErrorCode {
    /// 全部错误码，按对外文档顺序排列。
    pub const ALL: [ErrorCode; 11] = [
        ErrorCode::Success,
        ErrorCode::InvalidParameter,
        ErrorCode::InvalidContext,
        ErrorCode::Disconnect,
        ErrorCode::ErrorConnect,
        ErrorCode::ErrorHandshake,
        ErrorCode::Pending,
        ErrorCode::MoreData,
        ErrorCode::NotFound,
        ErrorCode::Empty,
        ErrorCode::Canceled,
    ];

    /// 稳定字符串表示。
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Success => "flare.success",
            ErrorCode::InvalidParameter => "flare.invalid_parameter",
            ErrorCode::InvalidContext => "flare.invalid_context",
            ErrorCode::Disconnect => "flare.disconnect",
            ErrorCode::ErrorConnect => "flare.error_connect",
            ErrorCode::ErrorHandshake => "flare.error_handshake",
            ErrorCode::Pending => "flare.pending",
            ErrorCode::MoreData => "flare.more_data",
            ErrorCode::NotFound => "flare.not_found",
            ErrorCode::Empty => "flare.empty",
            ErrorCode::Canceled => "flare.canceled",
        }
    }

    /// 是否属于“调用方应重新挂载事件后重试”的瞬时状态。
    pub const fn is_transient(self) -> bool {
        matches!(self, ErrorCode::Pending | ErrorCode::MoreData | ErrorCode::Empty)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flare 统一错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：让握手、套接字、编排三层共享一个错误类型，调用方无需在 crate 之间做转换；
/// - **契约 (What)**：
///   - 契约类错误（`InvalidParameter`/`InvalidContext`）立即返回，从不重试；
///   - 握手类错误（`Connect`/`Handshake`/`Disconnect`）在握手引擎有界重试耗尽后才出现；
///   - `Io` 保留底层 `io::Error` 作为 `source`，便于排障；
/// - **执行逻辑 (How)**：[`FlareError::from_io`] 将对端断开类的 `io::ErrorKind` 归一为
///   `Disconnect`，其余保持 `Io`；`WouldBlock` 不应走到这里，由调用方转为 `Transfer::Pending`。
#[derive(Debug, Error)]
pub enum FlareError {
    /// 参数或句柄无效，例如套接字没有对端地址。
    #[error("invalid parameter: {detail}")]
    InvalidParameter { detail: String },

    /// 服务器上下文已关闭或正在关闭。
    #[error("server context is no longer valid")]
    InvalidContext,

    /// 对端在 `stage` 阶段断开。
    #[error("peer disconnected during {stage}")]
    Disconnect { stage: &'static str },

    /// 客户端方向握手失败。
    #[error("connect handshake failed: {detail}")]
    Connect { detail: String },

    /// 服务端方向握手失败或超出重试预算。
    #[error("accept handshake failed: {detail}")]
    Handshake { detail: String },

    /// 按标识查找的对象不存在。
    #[error("{what} not found")]
    NotFound { what: String },

    /// 操作被取消标志中止。
    #[error("operation canceled")]
    Canceled,

    /// 未归类的底层 I/O 错误。
    #[error("i/o failure during {op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl FlareError {
    /// 映射到稳定错误码。
    pub fn code(&self) -> ErrorCode {
        match self {
            FlareError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            FlareError::InvalidContext => ErrorCode::InvalidContext,
            FlareError::Disconnect { .. } => ErrorCode::Disconnect,
            FlareError::Connect { .. } => ErrorCode::ErrorConnect,
            FlareError::Handshake { .. } => ErrorCode::ErrorHandshake,
            FlareError::NotFound { .. } => ErrorCode::NotFound,
            FlareError::Canceled => ErrorCode::Canceled,
            // 未归类的 I/O 失败对调用方而言等价于连接致命。
            FlareError::Io { .. } => ErrorCode::Disconnect,
        }
    }

    pub fn invalid_parameter(detail: impl Into<String>) -> Self {
        FlareError::InvalidParameter {
            detail: detail.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        FlareError::NotFound { what: what.into() }
    }

    /// 将 `io::Error` 归类为领域错误。
    ///
    /// - 对端复位、提前 EOF、管道破裂 ⇒ [`FlareError::Disconnect`]；
    /// - 其余 ⇒ [`FlareError::Io`]。
    pub fn from_io(op: &'static str, source: io::Error) -> Self {
        if is_disconnect(&source) {
            FlareError::Disconnect { stage: op }
        } else {
            FlareError::Io { op, source }
        }
    }

    /// 是否属于连接致命错误，需要走断开拆除路径。
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            FlareError::Disconnect { .. }
                | FlareError::Io { .. }
                | FlareError::Handshake { .. }
                | FlareError::Connect { .. }
        )
    }
}

/// 对端断开类错误。
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}

/// 非阻塞 I/O 的“稍后重试”信号。
pub fn is_would_block(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// crate 内统一的 `Result` 别名。
pub type Result<T, E = FlareError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique_and_namespaced() {
        let mut seen = std::collections::HashSet::new();
        for code in ErrorCode::ALL {
            assert!(code.as_str().starts_with("flare."), "错误码必须带命名空间");
            assert!(seen.insert(code.as_str()), "错误码字符串不得重复: {code}");
        }
        assert_eq!(seen.len(), 11);
    }

    #[test]
    fn io_errors_are_classified() {
        let reset = FlareError::from_io("read", io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(reset.code(), ErrorCode::Disconnect);
        assert!(matches!(reset, FlareError::Disconnect { stage: "read" }));

        let denied = FlareError::from_io("bind", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(denied, FlareError::Io { op: "bind", .. }));
        assert!(std::error::Error::source(&denied).is_some(), "Io 变体需保留底层错误");
    }

    #[test]
    fn transient_codes_are_not_errors() {
        assert!(ErrorCode::Pending.is_transient());
        assert!(ErrorCode::MoreData.is_transient());
        assert!(!ErrorCode::Disconnect.is_transient());
        assert!(!FlareError::InvalidContext.is_connection_fatal());
        assert!(is_would_block(&io::Error::from(io::ErrorKind::WouldBlock)));
    }
}
