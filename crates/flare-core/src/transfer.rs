//! 非阻塞读写的结果形态。

use crate::error::ErrorCode;

/// 一次非阻塞读写的结果。
///
/// `Pending` 不是错误：调用方应在事件循环上重新挂载，而不是忙等重试。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transfer {
    /// 完成，携带实际搬运的字节数（读方向为 0 表示本次没有新的明文）。
    Complete(usize),
    /// 底层报告“会阻塞”。
    Pending,
}

impl Transfer {
    pub fn code(self) -> ErrorCode {
        match self {
            Transfer::Complete(_) => ErrorCode::Success,
            Transfer::Pending => ErrorCode::Pending,
        }
    }

    /// 已完成的字节数，`Pending` 视为 0。
    pub fn bytes(self) -> usize {
        match self {
            Transfer::Complete(n) => n,
            Transfer::Pending => 0,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Transfer::Pending)
    }
}
