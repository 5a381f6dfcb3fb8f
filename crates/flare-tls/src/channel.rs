//! 加密库连接对象的抽象边界。
//!
//! # 设计动机（Why）
//! - 握手引擎只依赖“需要读 / 需要写 / 握手是否结束”这几个信号推进状态机，记录层加密、
//!   密钥交换都属于外部加密库；
//! - 以 trait 表达这条边界后，TLS 由 rustls 实现（[`RustlsChannel`]），DTLS 可由任何提供
//!   无状态 cookie 校验的库实现（[`DatagramChannel`]），测试也可以注入脚本化的假连接。
//!
//! # 契约（What）
//! - `read_tls` / `write_tls` 只在字节源与库缓冲之间搬运密文；
//! - `process_new_packets` 消化已读入的密文，失败即为协议级致命错误；
//! - `read_plaintext` 无可读明文时返回 `WouldBlock`，收到 close_notify 后返回 `Ok(0)`。

use std::{fmt, io, net::SocketAddr};

use thiserror::Error;

/// 加密库拒绝了对端数据。
#[derive(Debug, Error)]
#[error("{detail}")]
pub struct ChannelError {
    pub detail: String,
}

impl ChannelError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl From<rustls::Error> for ChannelError {
    fn from(err: rustls::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// `process_new_packets` 之后的库内状态。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PacketState {
    /// 可立即读取的明文字节数。
    pub plaintext_ready: usize,
    /// 对端已发送 close_notify。
    pub peer_closed: bool,
}

/// 一条加密连接。
pub trait SecureChannel: Send {
    fn is_handshaking(&self) -> bool;
    fn wants_read(&self) -> bool;
    fn wants_write(&self) -> bool;
    fn read_tls(&mut self, source: &mut dyn io::Read) -> io::Result<usize>;
    fn write_tls(&mut self, sink: &mut dyn io::Write) -> io::Result<usize>;
    fn process_new_packets(&mut self) -> Result<PacketState, ChannelError>;
    fn read_plaintext(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_plaintext(&mut self, data: &[u8]) -> io::Result<usize>;
    fn send_close_notify(&mut self);
}

/// 无状态 cookie 校验的裁决。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ListenVerdict {
    /// 对端地址已验证，库已吸收该数据报，可以进入握手循环。
    Verified,
    /// 需要把这段字节（通常是 HelloVerifyRequest）回给对端，然后继续监听。
    Reply(Vec<u8>),
    /// 丢弃该数据报。
    Discard,
}

/// 支持 DTLS 监听步骤的数据报连接。
pub trait DatagramChannel: SecureChannel {
    fn listen(&mut self, datagram: &[u8], peer: SocketAddr) -> ListenVerdict;
}

/// rustls 客户端或服务端连接。
pub enum RustlsChannel {
    Server(rustls::ServerConnection),
    Client(rustls::ClientConnection),
}

impl RustlsChannel {
    pub fn server(conn: rustls::ServerConnection) -> Self {
        RustlsChannel::Server(conn)
    }

    pub fn client(conn: rustls::ClientConnection) -> Self {
        RustlsChannel::Client(conn)
    }
}

impl From<rustls::ServerConnection> for RustlsChannel {
    fn from(conn: rustls::ServerConnection) -> Self {
        RustlsChannel::Server(conn)
    }
}

impl From<rustls::ClientConnection> for RustlsChannel {
    fn from(conn: rustls::ClientConnection) -> Self {
        RustlsChannel::Client(conn)
    }
}

impl fmt::Debug for RustlsChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self {
            RustlsChannel::Server(_) => "server",
            RustlsChannel::Client(_) => "client",
        };
        f.debug_struct("RustlsChannel")
            .field("side", &side)
            .field("handshaking", &self.is_handshaking())
            .finish()
    }
}

macro_rules! delegate {
    ($self:ident, $conn:ident => $body:expr) => {
        match $self {
            RustlsChannel::Server($conn) => $body,
            RustlsChannel::Client($conn) => $body,
        }
    };
}

impl SecureChannel for RustlsChannel {
    fn is_handshaking(&self) -> bool {
        delegate!(self, conn => conn.is_handshaking())
    }

    fn wants_read(&self) -> bool {
        delegate!(self, conn => conn.wants_read())
    }

    fn wants_write(&self) -> bool {
        delegate!(self, conn => conn.wants_write())
    }

    fn read_tls(&mut self, source: &mut dyn io::Read) -> io::Result<usize> {
        delegate!(self, conn => conn.read_tls(source))
    }

    fn write_tls(&mut self, sink: &mut dyn io::Write) -> io::Result<usize> {
        delegate!(self, conn => conn.write_tls(sink))
    }

    fn process_new_packets(&mut self) -> Result<PacketState, ChannelError> {
        let state = delegate!(self, conn => conn.process_new_packets())?;
        Ok(PacketState {
            plaintext_ready: state.plaintext_bytes_to_read(),
            peer_closed: state.peer_has_closed(),
        })
    }

    fn read_plaintext(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use io::Read;
        delegate!(self, conn => conn.reader().read(buf))
    }

    fn write_plaintext(&mut self, data: &[u8]) -> io::Result<usize> {
        use io::Write;
        delegate!(self, conn => conn.writer().write(data))
    }

    fn send_close_notify(&mut self) {
        delegate!(self, conn => conn.send_close_notify())
    }
}
