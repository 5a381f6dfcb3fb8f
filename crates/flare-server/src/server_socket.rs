//! # 服务端套接字协作者
//!
//! ## 设计动机（Why）
//! - 网络服务器只编排“监听 → 受理 → （握手）→ 会话”的流程，套接字如何创建、是否加密
//!   由注入的 [`ServerSocket`] 决定；
//! - 三个内置实现覆盖明文 TCP、rustls TLS 与 UDP，测试也可注入自定义实现。
//!
//! ## 契约（What）
//! - `open` 返回的 [`Listening`] 一律处于非阻塞模式；
//! - `accept` 无待受理连接时返回 `Ok(None)`；
//! - `tls_accept` 只在 `support_tls()` 为真时被调用，失败时原始套接字随之关闭；
//! - `tls_stop_accept` 使进行中的握手尽快以 `canceled` 结束。

use std::{
    io,
    net::{SocketAddr, TcpListener, TcpStream, UdpSocket},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use flare_core::{
    AddressFamily, FlareError, Result, SocketId, SocketType, config::LimitsConfig,
    error::is_would_block,
};
use flare_mux::Registration;
use flare_tls::{EngineFlags, HandshakeEngine, HandshakeOptions, HotTlsConfig};
use socket2::{Domain, Protocol as IpProtocol, Socket, Type};
use tracing::{debug, info};

use crate::io::{DatagramIo, PlainStream, SecureStream, SessionIo};

/// 默认监听积压队列长度。
pub const DEFAULT_BACKLOG: i32 = 1024;

/// 已打开的监听套接字。
#[derive(Debug)]
pub enum Listening {
    Stream(TcpListener),
    Datagram(UdpSocket),
}

impl Listening {
    pub fn id(&self) -> SocketId {
        match self {
            Listening::Stream(listener) => SocketId::of(listener),
            Listening::Datagram(socket) => SocketId::of(socket),
        }
    }

    pub fn socket_type(&self) -> SocketType {
        match self {
            Listening::Stream(_) => SocketType::Stream,
            Listening::Datagram(_) => SocketType::Datagram,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Listening::Stream(listener) => listener.local_addr(),
            Listening::Datagram(socket) => socket.local_addr(),
        }
    }

    /// 供多路复用器绑定的副本。
    pub fn registration(&self) -> io::Result<Registration> {
        match self {
            Listening::Stream(listener) => Registration::listener(listener),
            Listening::Datagram(socket) => Registration::datagram(socket),
        }
    }
}

/// 注入网络服务器的套接字协作者。
pub trait ServerSocket: Send + Sync {
    fn name(&self) -> &'static str;

    fn socket_type(&self) -> SocketType;

    fn support_tls(&self) -> bool {
        false
    }

    /// 绑定并监听（数据报仅绑定）。
    fn open(&self, family: AddressFamily, port: u16) -> Result<Listening>;

    /// 受理一条连接，没有待受理连接时返回 `None`。
    fn accept(&self, listening: &Listening) -> Result<Option<(TcpStream, SocketAddr)>> {
        let Listening::Stream(listener) = listening else {
            return Err(FlareError::invalid_parameter(
                "datagram listeners do not accept connections",
            ));
        };
        match listener.accept() {
            Ok((stream, peer)) => {
                let _ = stream.set_nodelay(true);
                Ok(Some((stream, peer)))
            }
            Err(err) if is_would_block(&err) => Ok(None),
            Err(err) => Err(FlareError::from_io("accept", err)),
        }
    }

    fn close(&self, listening: Listening) {
        debug!(socket = %listening.id(), transport = self.name(), "listener closed");
        drop(listening);
    }

    /// 明文流连接的会话端点。
    fn stream_io(&self, stream: TcpStream, limits: &LimitsConfig) -> Result<Box<dyn SessionIo>> {
        let io = PlainStream::new(stream, limits.max_buffered)
            .map_err(|err| FlareError::from_io("configure stream", err))?;
        Ok(Box::new(io))
    }

    /// 数据报监听会话的端点。
    fn datagram_io(&self, listening: &Listening) -> Result<Box<dyn SessionIo>> {
        let Listening::Datagram(socket) = listening else {
            return Err(FlareError::invalid_parameter(
                "stream listeners cannot host a datagram session",
            ));
        };
        let io = DatagramIo::new(socket).map_err(|err| FlareError::from_io("clone datagram", err))?;
        Ok(Box::new(io))
    }

    /// 在受理线程上完成服务端握手。
    fn tls_accept(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        options: &HandshakeOptions,
    ) -> Result<Box<dyn SessionIo>> {
        let _ = (stream, options);
        Err(FlareError::invalid_parameter(format!(
            "transport {} cannot terminate TLS for {peer}",
            self.name()
        )))
    }

    fn tls_stop_accept(&self) {}
}

/// 创建非阻塞的 TCP 监听套接字，开启 `SO_REUSEADDR`。
pub fn listen_stream(family: AddressFamily, port: u16, backlog: i32) -> Result<TcpListener> {
    let addr = family.bind_addr(port);
    let build = || -> io::Result<TcpListener> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(IpProtocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(backlog)?;
        socket.set_nonblocking(true)?;
        Ok(socket.into())
    };
    let listener = build().map_err(|err| FlareError::from_io("listen", err))?;
    info!(addr = ?listener.local_addr().ok(), backlog, "stream listener opened");
    Ok(listener)
}

/// 创建非阻塞的 UDP 套接字。
pub fn bind_datagram(family: AddressFamily, port: u16) -> Result<UdpSocket> {
    let addr = family.bind_addr(port);
    let build = || -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(IpProtocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.set_nonblocking(true)?;
        Ok(socket.into())
    };
    let socket = build().map_err(|err| FlareError::from_io("bind", err))?;
    info!(addr = ?socket.local_addr().ok(), "datagram socket bound");
    Ok(socket)
}

/// 明文 TCP。
#[derive(Clone, Copy, Debug)]
pub struct TcpServerSocket {
    backlog: i32,
}

impl TcpServerSocket {
    pub fn new() -> Self {
        Self {
            backlog: DEFAULT_BACKLOG,
        }
    }

    pub fn with_backlog(backlog: i32) -> Self {
        Self { backlog }
    }
}

impl Default for TcpServerSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerSocket for TcpServerSocket {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn socket_type(&self) -> SocketType {
        SocketType::Stream
    }

    fn open(&self, family: AddressFamily, port: u16) -> Result<Listening> {
        listen_stream(family, port, self.backlog).map(Listening::Stream)
    }
}

/// 基于 rustls 的 TLS over TCP。
#[derive(Debug)]
pub struct TlsServerSocket {
    config: HotTlsConfig,
    backlog: i32,
    cancel: Arc<AtomicBool>,
}

impl TlsServerSocket {
    pub fn new(config: HotTlsConfig) -> Self {
        Self {
            config,
            backlog: DEFAULT_BACKLOG,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// 热更新入口：替换后新握手立即使用新证书。
    pub fn config(&self) -> &HotTlsConfig {
        &self.config
    }
}

impl ServerSocket for TlsServerSocket {
    fn name(&self) -> &'static str {
        "tls"
    }

    fn socket_type(&self) -> SocketType {
        SocketType::Stream
    }

    fn support_tls(&self) -> bool {
        true
    }

    fn open(&self, family: AddressFamily, port: u16) -> Result<Listening> {
        self.cancel.store(false, Ordering::Release);
        listen_stream(family, port, self.backlog).map(Listening::Stream)
    }

    fn tls_accept(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        options: &HandshakeOptions,
    ) -> Result<Box<dyn SessionIo>> {
        let channel = self.config.server_channel()?;
        let flags = EngineFlags {
            nonblocking: true,
            close_on_destroy: false,
        };
        let mut engine = HandshakeEngine::open(stream, channel, flags)?;
        engine.accept(&options.clone().with_cancel(Arc::clone(&self.cancel)))?;
        debug!(socket = %engine.id(), %peer, "tls handshake finished");
        Ok(Box::new(SecureStream::new(engine)))
    }

    fn tls_stop_accept(&self) {
        self.cancel.store(true, Ordering::Release);
    }
}

/// UDP 数据报。
#[derive(Clone, Copy, Debug, Default)]
pub struct UdpServerSocket;

impl ServerSocket for UdpServerSocket {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn socket_type(&self) -> SocketType {
        SocketType::Datagram
    }

    fn open(&self, family: AddressFamily, port: u16) -> Result<Listening> {
        bind_datagram(family, port).map(Listening::Datagram)
    }
}
