//! # protocol 模块：可插拔的协议集合契约
//!
//! ## 角色定位（Why）
//! - 服务器不理解任何应用层线格式，分帧工作全部交给注入的协议集合；
//! - 消费线程对会话的重组缓冲逐个尝试协议，第一条成功解析的协议随即钉在该会话上。
//!
//! ## 契约（What）
//! - [`Protocol::try_parse`] 只看缓冲，不修改缓冲；返回值告诉调用方消费多少字节、
//!   载荷位于哪个区间、建议的调度优先级；
//! - [`ParseOutcome::NeedMore`] 对应错误码 `more_data`，属于瞬时状态；
//! - [`ParseOutcome::Invalid`] 与“所有协议都 `NoMatch`”对流式会话是连接致命的。
//!
//! ## 注意事项（Trade-offs）
//! - 协议对象在多个消费线程间共享，必须无内部可变状态或自行同步；
//! - 载荷以区间而非拷贝返回，调用方负责从缓冲切出，保持零拷贝。

use std::{fmt, ops::Range, sync::Arc};

use crate::error::ErrorCode;

/// 多级反馈调度的优先级，`0` 最急切。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Priority(u8);

impl Priority {
    /// 级别数量。
    pub const LEVELS: usize = 4;
    pub const HIGHEST: Priority = Priority(0);
    pub const LOWEST: Priority = Priority(Self::LEVELS as u8 - 1);
    /// 新会话的初始级别。
    pub const DEFAULT: Priority = Priority(1);

    /// 构造级别，超出范围的值钳制到最低级。
    pub fn new(level: u8) -> Self {
        Priority(level.min(Self::LOWEST.0))
    }

    pub fn level(self) -> usize {
        self.0 as usize
    }

    /// 向更急切的方向移动一级。
    pub fn promote(self) -> Self {
        Priority(self.0.saturating_sub(1))
    }

    /// 向更懒惰的方向移动一级。
    pub fn demote(self) -> Self {
        Priority::new(self.0.saturating_add(1))
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// 单次解析结果。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParseOutcome {
    /// 解析出一条完整消息。
    Message {
        /// 需要从缓冲头部丢弃的字节数，至少覆盖 `payload`。
        consumed: usize,
        /// 载荷在缓冲中的区间。
        payload: Range<usize>,
        /// 协议建议的调度优先级；`None` 时沿用会话自身的反馈级别。
        priority: Option<Priority>,
    },
    /// 缓冲中的字节属于本协议，但还不完整。
    NeedMore,
    /// 本协议不认识这段字节。
    NoMatch,
    /// 本协议认识这段字节，但内容违规。
    Invalid(String),
}

impl ParseOutcome {
    /// 便捷构造：载荷紧贴缓冲头部的消息。
    pub fn message(consumed: usize, payload: Range<usize>) -> Self {
        ParseOutcome::Message {
            consumed,
            payload,
            priority: None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ParseOutcome::Message { .. } => ErrorCode::Success,
            ParseOutcome::NeedMore => ErrorCode::MoreData,
            ParseOutcome::NoMatch => ErrorCode::NotFound,
            ParseOutcome::Invalid(_) => ErrorCode::InvalidParameter,
        }
    }
}

/// 单个协议匹配器。
pub trait Protocol: Send + Sync {
    fn name(&self) -> &str;

    /// 尝试从 `buffered` 头部解析一条消息。
    fn try_parse(&self, buffered: &[u8]) -> ParseOutcome;
}

/// 有序的协议集合。
///
/// 空集合表示“透传”：字节不经分帧直接交给用户回调。
#[derive(Clone, Default)]
pub struct ProtocolSet {
    protocols: Vec<Arc<dyn Protocol>>,
}

impl ProtocolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个协议，顺序即匹配优先级。
    pub fn with(mut self, protocol: impl Protocol + 'static) -> Self {
        self.protocols.push(Arc::new(protocol));
        self
    }

    pub fn push(&mut self, protocol: Arc<dyn Protocol>) {
        self.protocols.push(protocol);
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<dyn Protocol>> {
        self.protocols.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Protocol>> {
        self.protocols.iter()
    }
}

impl fmt::Debug for ProtocolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.protocols.iter().map(|p| p.name().to_owned()))
            .finish()
    }
}

const NEWLINE: u8 = b'\n';

/// 换行分帧协议。
///
/// # 教案式说明
/// - **意图 (Why)**：为演示程序与集成测试提供一个真实可用的分帧器；
/// - **契约 (What)**：载荷不含结尾的 `\n`（以及可选的 `\r`）；单行超过 `max_frame`
///   字节，或缓冲已超过 `max_frame` 仍未见换行，均返回 `Invalid`，防止恶意超长行；
/// - **风险 (Trade-offs)**：不做转义，载荷内部不能含换行。
#[derive(Clone, Debug)]
pub struct LineProtocol {
    max_frame: usize,
}

impl LineProtocol {
    pub fn new(max_frame: usize) -> Self {
        Self { max_frame }
    }
}

impl Default for LineProtocol {
    fn default() -> Self {
        Self::new(8 * 1024)
    }
}

impl Protocol for LineProtocol {
    fn name(&self) -> &str {
        "line"
    }

    fn try_parse(&self, buffered: &[u8]) -> ParseOutcome {
        match buffered.iter().position(|byte| *byte == NEWLINE) {
            Some(pos) if pos > self.max_frame => ParseOutcome::Invalid(format!(
                "line length {pos} exceeds frame budget {}",
                self.max_frame
            )),
            Some(pos) => {
                let end = if pos > 0 && buffered[pos - 1] == b'\r' {
                    pos - 1
                } else {
                    pos
                };
                ParseOutcome::message(pos + 1, 0..end)
            }
            None if buffered.len() > self.max_frame => ParseOutcome::Invalid(format!(
                "{} bytes buffered without newline, frame budget {}",
                buffered.len(),
                self.max_frame
            )),
            None => ParseOutcome::NeedMore,
        }
    }
}
