//! 套接字标识与地址族。
//!
//! [`SocketId`] 是会话表的主键，也是多路复用器中的属主标签来源。它直接取自操作系统
//! 描述符数值：会话只有在离开会话表之后才会关闭套接字，因此同一数值不会在会话仍登记时
//! 被内核复用。

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
};

use serde::Deserialize;

/// 活跃套接字的唯一标识。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SocketId(u64);

impl SocketId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// 读取任意持有描述符的对象的标识。
    #[cfg(unix)]
    pub fn of<S: std::os::fd::AsRawFd + ?Sized>(socket: &S) -> Self {
        // 描述符非负，拓宽为 u64 不丢失信息。
        Self(socket.as_raw_fd() as u64)
    }

    /// 读取任意持有描述符的对象的标识。
    #[cfg(windows)]
    pub fn of<S: std::os::windows::io::AsRawSocket + ?Sized>(socket: &S) -> Self {
        Self(socket.as_raw_socket())
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 与套接字一同绑定进多路复用器的不透明属主标签。
///
/// 服务器以套接字标识作为标签，事件回来时经会话表解析，绝不携带裸指针。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct OwnerTag(pub u64);

impl From<SocketId> for OwnerTag {
    fn from(id: SocketId) -> Self {
        OwnerTag(id.as_raw())
    }
}

impl From<OwnerTag> for SocketId {
    fn from(tag: OwnerTag) -> Self {
        SocketId::from_raw(tag.0)
    }
}

/// 传输语义。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SocketType {
    /// 面向连接的字节流（TCP / TLS）。
    Stream,
    /// 无连接数据报（UDP / DTLS）。
    Datagram,
}

/// 监听地址族。
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    #[default]
    V4,
    V6,
    /// 仅监听本地回环，测试与演示程序使用。
    Loopback,
}

impl AddressFamily {
    /// 该地址族下绑定 `port` 的监听地址。
    pub fn bind_addr(self, port: u16) -> SocketAddr {
        let ip = match self {
            AddressFamily::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            AddressFamily::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            AddressFamily::Loopback => IpAddr::V4(Ipv4Addr::LOCALHOST),
        };
        SocketAddr::new(ip, port)
    }
}
