//! # SessionTable：套接字到会话的唯一映射
//!
//! ## 核心意图（Why）
//! - 保证任一套接字身份同一时刻至多对应一个存活会话；
//! - 把“出表”与“销毁”拆成两步：[`SessionTable::ready_to_close`] 原子地移除条目并交回
//!   最后一份表内引用，真正的销毁发生在所有持有者释放之后。
//!
//! ## 行为契约（What）
//! - `connected` / `dgram_start`：插入新会话，身份已存在时返回 `invalid_parameter`；
//! - `find`：返回新增的一份引用（`Arc` 克隆），调用方用完即释放；
//! - `ready_to_close`：并发调用时恰有一方得到会话，其余得到 `not_found`。
//!
//! ## 风险提示（Trade-offs）
//! - `DashMap` 分片锁只在单次操作内持有，任何调用方都不会持锁执行 I/O。

use std::{net::SocketAddr, sync::Arc};

use dashmap::{DashMap, mapref::entry::Entry};
use flare_core::{FlareError, Result, SocketId, config::LimitsConfig};
use tracing::debug;

use crate::{io::SessionIo, session::Session};

/// 会话的共享引用。
pub type SessionRef = Arc<Session>;

#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: DashMap<SocketId, SessionRef>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为已受理（TLS 路径上已完成握手）的流连接创建会话。
    pub fn connected(
        &self,
        socket: SocketId,
        peer: SocketAddr,
        listener: SocketId,
        io: Box<dyn SessionIo>,
        limits: LimitsConfig,
    ) -> Result<SessionRef> {
        self.insert(Session::new(socket, listener, Some(peer), io, limits))
    }

    /// 为无连接传输创建绑定在监听套接字上的长期会话。
    pub fn dgram_start(
        &self,
        listener: SocketId,
        io: Box<dyn SessionIo>,
        limits: LimitsConfig,
    ) -> Result<SessionRef> {
        self.insert(Session::new(listener, listener, None, io, limits))
    }

    fn insert(&self, session: Session) -> Result<SessionRef> {
        let socket = session.socket();
        match self.sessions.entry(socket) {
            Entry::Occupied(_) => Err(FlareError::invalid_parameter(format!(
                "socket {socket} already owns a session"
            ))),
            Entry::Vacant(vacant) => {
                let session = Arc::new(session);
                session.mark_registered();
                vacant.insert(Arc::clone(&session));
                debug!(socket = %socket, peer = ?session.peer(), "session created");
                Ok(session)
            }
        }
    }

    /// 查找会话并取得一份引用。
    pub fn find(&self, socket: SocketId) -> Result<SessionRef> {
        self.sessions
            .get(&socket)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| FlareError::not_found(format!("session {socket}")))
    }

    /// 原子地移除会话，交回表内引用供最终拆除。
    pub fn ready_to_close(&self, socket: SocketId) -> Result<SessionRef> {
        let (_, session) = self
            .sessions
            .remove(&socket)
            .ok_or_else(|| FlareError::not_found(format!("session {socket}")))?;
        session.mark_unregistered();
        Ok(session)
    }

    /// 移除全部会话（关闭路径）。
    pub fn drain(&self) -> Vec<SessionRef> {
        let sockets: Vec<SocketId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        sockets
            .into_iter()
            .filter_map(|socket| self.ready_to_close(socket).ok())
            .collect()
    }

    pub fn contains(&self, socket: SocketId) -> bool {
        self.sessions.contains_key(&socket)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
