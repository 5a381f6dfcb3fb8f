//! # 受理队列
//!
//! ## 角色定位（Why）
//! - 把“套接字 accept”与“可能很慢的 TLS 握手”解耦：受理侧只负责入队，握手线程按自己的
//!   节奏出队；
//! - 队列中的连接尚未完成握手，不存在对应的会话；关闭服务器时剩余条目直接强制关闭。
//!
//! ## 契约（What）
//! - 单把锁保护的 FIFO，`push`/`pop` 都是短临界区，任何调用方不会持锁执行 I/O；
//! - [`AcceptQueue::pop_timeout`] 借助条件变量阻塞至多给定时长，`push` 唤醒一个等待者，
//!   [`AcceptQueue::wake_all`] 唤醒全部等待者（停止路径）。

use std::{
    collections::VecDeque,
    net::{SocketAddr, TcpStream},
    time::{Duration, Instant},
};

use flare_core::SocketId;
use parking_lot::{Condvar, Mutex};

/// 已 accept、尚未握手的连接。只会被一个握手线程消费一次。
#[derive(Debug)]
pub struct AcceptedConnection {
    pub socket: SocketId,
    pub peer: SocketAddr,
    pub stream: TcpStream,
}

impl AcceptedConnection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            socket: SocketId::of(&stream),
            peer,
            stream,
        }
    }
}

/// 锁保护的 FIFO。
#[derive(Debug)]
pub struct AcceptQueue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Condvar,
}

impl<T> Default for AcceptQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AcceptQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.ready.notify_one();
    }

    pub fn pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// 取出队首；队列为空时最多等待 `timeout`。
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        while items.is_empty() {
            if self.ready.wait_until(&mut items, deadline).timed_out() {
                break;
            }
        }
        items.pop_front()
    }

    /// 非阻塞窥视：队列中是否有待握手的连接。
    pub fn is_ready(&self) -> bool {
        !self.items.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn wake_all(&self) {
        self.ready.notify_all();
    }

    /// 取走全部条目，按入队顺序返回。
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }
}
