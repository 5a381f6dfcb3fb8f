//! # 多级事件队列
//!
//! ## 角色定位（Why）
//! - I/O 分发线程把“有待解析数据的会话”推入队列，消费线程按优先级取出；
//! - 高优先级会话持续涌入时，低优先级会话不能被无限饿死。
//!
//! ## 契约（What）
//! - [`Priority::LEVELS`] 条 FIFO 车道，级别 0 最先被服务；
//! - 每次出队时，除被选中车道外的所有非空车道“被跳过次数”加一，被选中车道清零；
//!   某车道累计跳过达到 [`STARVATION_LIMIT`] 后，下一次出队必定服务它（多条车道同时达到
//!   时服务级别最高者）；
//! - 同一车道内严格 FIFO，条目不会丢失也不会重复。
//!
//! ## 风险（Trade-offs）
//! - 单把锁保护全部车道，出队的选择逻辑是 O(LEVELS) 的常数开销。

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use flare_core::Priority;
use parking_lot::{Condvar, Mutex};

/// 车道累计被跳过的上限，到达后强制服务。
pub const STARVATION_LIMIT: u32 = 8;

#[derive(Debug)]
struct Lanes<T> {
    queues: [VecDeque<T>; Priority::LEVELS],
    skipped: [u32; Priority::LEVELS],
    len: usize,
}

impl<T> Lanes<T> {
    fn new() -> Self {
        Self {
            queues: std::array::from_fn(|_| VecDeque::new()),
            skipped: [0; Priority::LEVELS],
            len: 0,
        }
    }

    fn select(&self) -> Option<usize> {
        let starving = (0..Priority::LEVELS)
            .find(|&lane| !self.queues[lane].is_empty() && self.skipped[lane] >= STARVATION_LIMIT);
        starving.or_else(|| (0..Priority::LEVELS).find(|&lane| !self.queues[lane].is_empty()))
    }

    fn pop(&mut self) -> Option<T> {
        let chosen = self.select()?;
        for lane in 0..Priority::LEVELS {
            if lane == chosen {
                self.skipped[lane] = 0;
            } else if !self.queues[lane].is_empty() {
                self.skipped[lane] = self.skipped[lane].saturating_add(1);
            }
        }
        let item = self.queues[chosen].pop_front();
        if item.is_some() {
            self.len -= 1;
        }
        item
    }
}

/// 带防饿死规则的多级 FIFO。
#[derive(Debug)]
pub struct EventQueue<T> {
    lanes: Mutex<Lanes<T>>,
    ready: Condvar,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        Self {
            lanes: Mutex::new(Lanes::new()),
            ready: Condvar::new(),
        }
    }

    pub fn push(&self, priority: Priority, item: T) {
        {
            let mut lanes = self.lanes.lock();
            lanes.queues[priority.level()].push_back(item);
            lanes.len += 1;
        }
        self.ready.notify_one();
    }

    pub fn pop(&self) -> Option<T> {
        self.lanes.lock().pop()
    }

    /// 出队；全部车道为空时最多等待 `timeout`。
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut lanes = self.lanes.lock();
        while lanes.len == 0 {
            if self.ready.wait_until(&mut lanes, deadline).timed_out() {
                break;
            }
        }
        lanes.pop()
    }

    /// 丢弃全部条目并重置跳过计数，返回被丢弃的数量。
    pub fn clear(&self) -> usize {
        let mut lanes = self.lanes.lock();
        let dropped = lanes.len;
        *lanes = Lanes::new();
        dropped
    }

    pub fn wake_all(&self) {
        self.ready.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lanes.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
