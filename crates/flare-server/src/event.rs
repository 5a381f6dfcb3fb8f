//! 用户回调与受理准入的契约。

use std::{
    fmt,
    net::{SocketAddr, TcpStream},
};

use bytes::Bytes;
use flare_core::{SocketId, SocketType};

use crate::table::SessionRef;

/// 回调可见的套接字身份信息。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SocketInfo {
    pub socket: SocketId,
    /// 所属监听套接字。
    pub listener: SocketId,
    /// 流会话的对端；数据报会话为 `None`，对端随每个数据报给出。
    pub peer: Option<SocketAddr>,
    pub socket_type: SocketType,
    pub secure: bool,
}

/// 派发给用户回调的事件。
///
/// - `TryConnect` 仅出现在 TLS 受理路径上，此时尚无会话；
/// - `Connect` 保证会话已进入会话表；
/// - 同一会话的 `Disconnect` 恰好派发一次。
pub enum ServerEvent<'a> {
    TryConnect {
        socket: SocketId,
        peer: SocketAddr,
    },
    Connect {
        info: SocketInfo,
    },
    Read {
        info: SocketInfo,
        payload: Bytes,
        session: &'a SessionRef,
        peer: Option<SocketAddr>,
    },
    Datagram {
        info: SocketInfo,
        payload: Bytes,
        session: &'a SessionRef,
        peer: SocketAddr,
    },
    Disconnect {
        info: SocketInfo,
    },
}

impl ServerEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::TryConnect { .. } => "try_connect",
            ServerEvent::Connect { .. } => "connect",
            ServerEvent::Read { .. } => "read",
            ServerEvent::Datagram { .. } => "datagram",
            ServerEvent::Disconnect { .. } => "disconnect",
        }
    }

    /// 事件涉及的套接字。
    pub fn socket(&self) -> SocketId {
        match self {
            ServerEvent::TryConnect { socket, .. } => *socket,
            ServerEvent::Connect { info }
            | ServerEvent::Disconnect { info }
            | ServerEvent::Read { info, .. }
            | ServerEvent::Datagram { info, .. } => info.socket,
        }
    }
}

impl fmt::Debug for ServerEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("ServerEvent");
        out.field("kind", &self.name()).field("socket", &self.socket());
        match self {
            ServerEvent::Read { payload, .. } | ServerEvent::Datagram { payload, .. } => {
                out.field("len", &payload.len());
            }
            ServerEvent::TryConnect { peer, .. } => {
                out.field("peer", peer);
            }
            _ => {}
        }
        out.finish()
    }
}

/// 用户事件回调。在工作线程上调用，不应长时间阻塞。
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: ServerEvent<'_>);
}

impl<F> EventHandler for F
where
    F: Fn(ServerEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: ServerEvent<'_>) {
        self(event)
    }
}

/// 准入裁决。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Admission {
    #[default]
    Continue,
    /// 立即关闭原始套接字，不创建会话。
    Stop,
}

/// 受理后、握手前的准入检查。
pub trait AdmissionControl: Send + Sync {
    fn admit(&self, stream: &TcpStream, peer: SocketAddr) -> Admission;
}

impl<F> AdmissionControl for F
where
    F: Fn(&TcpStream, SocketAddr) -> Admission + Send + Sync,
{
    fn admit(&self, stream: &TcpStream, peer: SocketAddr) -> Admission {
        self(stream, peer)
    }
}
