//! # 握手引擎
//!
//! ## 设计动机（Why）
//! - 一个实例包裹一条 TLS/DTLS 连接：在非阻塞套接字上以有界重试推进握手，握手完成后
//!   提供可拆分子步骤的读写，让事件循环只执行被唤醒事件真正需要的那一步；
//! - 推进信号严格来自加密库的“需要读 / 需要写”，引擎本身不理解任何握手报文。
//!
//! ## 核心契约（What）
//! - [`HandshakeEngine::open`] / [`HandshakeEngine::open_dtls`]：校验套接字，按标志切换为非阻塞；
//! - [`HandshakeEngine::accept`] / [`HandshakeEngine::connect`]：有界循环；每轮至多等待
//!   `attempt_timeout`，共 `max_attempts` 轮；中途断开返回 `disconnect`，其余失败按方向返回
//!   `error_handshake` / `error_connect`，取消标志返回 `canceled`；
//! - [`HandshakeEngine::accept_dtls`]：先做无状态 cookie 监听，验证后的对端地址用于后续步骤；
//! - [`HandshakeEngine::read`] / [`HandshakeEngine::send`]：子步骤由 [`ReadSteps`] / [`SendSteps`]
//!   选择，“会阻塞”以 [`Transfer::Pending`] 返回；
//! - [`HandshakeEngine::close`]：幂等；尽力发送 close_notify，仅在 `close_on_destroy` 时关闭套接字。
//!
//! ## 风险与权衡（Trade-offs）
//! - 握手期间引擎用私有 `Poll` 等待套接字，调用线程会阻塞至多
//!   `max_attempts × attempt_timeout`，因此握手只应在专用的 TLS 受理线程上执行；
//! - 握手结束即释放等待器，之后的读写完全由外部事件循环驱动。

use std::{
    io,
    net::{SocketAddr, TcpStream, UdpSocket},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use flare_core::{
    FlareError, Result, SocketId, SocketType, Transfer,
    config::HandshakeConfig,
    error::{is_disconnect, is_would_block},
};
use mio::Interest;
use tracing::{debug, trace, warn};

use crate::{
    channel::{ChannelError, DatagramChannel, ListenVerdict, SecureChannel},
    socket::EngineSocket,
    wait::Waiter,
};

/// 引擎标志。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EngineFlags {
    /// `open` 时把套接字切换为非阻塞模式。
    pub nonblocking: bool,
    /// `close` 时一并关闭原始套接字；否则把套接字交还调用方。
    pub close_on_destroy: bool,
}

impl Default for EngineFlags {
    fn default() -> Self {
        Self {
            nonblocking: true,
            close_on_destroy: true,
        }
    }
}

/// 握手重试预算与取消信号。
#[derive(Clone, Debug)]
pub struct HandshakeOptions {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl HandshakeOptions {
    pub fn from_config(config: &HandshakeConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            attempt_timeout: config.attempt_timeout(),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn canceled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }
}

impl Default for HandshakeOptions {
    fn default() -> Self {
        Self::from_config(&HandshakeConfig::default())
    }
}

/// 读方向的子步骤。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadSteps {
    /// 从套接字读密文进库缓冲。
    pub socket: bool,
    /// 从库缓冲解密明文到调用方缓冲。
    pub decrypt: bool,
}

impl ReadSteps {
    pub const ALL: ReadSteps = ReadSteps {
        socket: true,
        decrypt: true,
    };
    pub const DECRYPT: ReadSteps = ReadSteps {
        socket: false,
        decrypt: true,
    };
    pub const SOCKET: ReadSteps = ReadSteps {
        socket: true,
        decrypt: false,
    };
}

/// 写方向的子步骤。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SendSteps {
    /// 明文交给库加密。
    pub encrypt: bool,
    /// 把库缓冲中的密文写到套接字。
    pub flush: bool,
}

impl SendSteps {
    pub const ALL: SendSteps = SendSteps {
        encrypt: true,
        flush: true,
    };
    pub const ENCRYPT: SendSteps = SendSteps {
        encrypt: true,
        flush: false,
    };
    pub const FLUSH: SendSteps = SendSteps {
        encrypt: false,
        flush: true,
    };
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Direction {
    Accept,
    Connect,
}

impl Direction {
    fn failure(self, detail: impl Into<String>) -> FlareError {
        match self {
            Direction::Accept => FlareError::Handshake {
                detail: detail.into(),
            },
            Direction::Connect => FlareError::Connect {
                detail: detail.into(),
            },
        }
    }

    fn io_failure(self, err: io::Error) -> FlareError {
        if is_disconnect(&err) {
            FlareError::Disconnect { stage: "handshake" }
        } else {
            self.failure(format!("socket error: {err}"))
        }
    }
}

/// 一条 TLS/DTLS 连接的握手与读写上下文。
pub struct HandshakeEngine<C: SecureChannel> {
    socket: Option<EngineSocket>,
    id: SocketId,
    peer: Option<SocketAddr>,
    channel: C,
    flags: EngineFlags,
    waiter: Option<Waiter>,
}

impl<C: SecureChannel> HandshakeEngine<C> {
    /// 绑定一个已连接的流套接字。
    ///
    /// 套接字没有对端地址（未连接或已失效）时返回 `invalid_parameter`，套接字随之释放。
    pub fn open(socket: TcpStream, channel: C, flags: EngineFlags) -> Result<Self> {
        let peer = socket.peer_addr().map_err(|err| {
            FlareError::invalid_parameter(format!("stream socket has no peer: {err}"))
        })?;
        Self::with_socket(EngineSocket::Stream(socket), Some(peer), channel, flags)
    }

    /// 绑定一个数据报套接字。
    ///
    /// 已连接的套接字直接进入握手；未连接的套接字需先经 [`Self::accept_dtls`] 的监听步骤。
    pub fn open_dtls(socket: UdpSocket, channel: C, flags: EngineFlags) -> Result<Self> {
        socket.local_addr().map_err(|err| {
            FlareError::invalid_parameter(format!("datagram socket is not bound: {err}"))
        })?;
        let peer = socket.peer_addr().ok();
        Self::with_socket(EngineSocket::Datagram(socket), peer, channel, flags)
    }

    fn with_socket(
        socket: EngineSocket,
        peer: Option<SocketAddr>,
        channel: C,
        flags: EngineFlags,
    ) -> Result<Self> {
        if flags.nonblocking {
            socket
                .set_nonblocking(true)
                .map_err(|source| FlareError::Io { op: "set_nonblocking", source })?;
        }
        Ok(Self {
            id: socket.id(),
            socket: Some(socket),
            peer,
            channel,
            flags,
            waiter: None,
        })
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn flags(&self) -> EngineFlags {
        self.flags
    }

    pub fn socket(&self) -> Option<&EngineSocket> {
        self.socket.as_ref()
    }

    pub fn socket_type(&self) -> Option<SocketType> {
        self.socket.as_ref().map(EngineSocket::socket_type)
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    pub fn is_handshaking(&self) -> bool {
        self.channel.is_handshaking()
    }

    /// 库缓冲中还有待写出的密文。
    pub fn wants_write(&self) -> bool {
        self.channel.wants_write()
    }

    /// 服务端方向握手。
    pub fn accept(&mut self, options: &HandshakeOptions) -> Result<()> {
        self.drive(Direction::Accept, options)
    }

    /// 客户端方向握手。
    pub fn connect(&mut self, options: &HandshakeOptions) -> Result<()> {
        self.drive(Direction::Connect, options)
    }

    fn drive(&mut self, direction: Direction, options: &HandshakeOptions) -> Result<()> {
        let result = self.drive_inner(direction, options);
        // 握手阶段之外不再需要私有等待器。
        self.waiter = None;
        match &result {
            Ok(()) => debug!(socket = %self.id, ?direction, "handshake finished"),
            Err(err) => debug!(socket = %self.id, ?direction, code = %err.code(), %err, "handshake failed"),
        }
        result
    }

    fn drive_inner(&mut self, direction: Direction, options: &HandshakeOptions) -> Result<()> {
        let mut attempts = 0u32;
        loop {
            if options.canceled() {
                return Err(FlareError::Canceled);
            }

            let mut interest = None;
            match self.flush_pending().map_err(|err| direction.io_failure(err))? {
                Transfer::Pending => interest = Some(Interest::WRITABLE),
                Transfer::Complete(_) => {}
            }

            if !self.channel.is_handshaking() {
                if interest.is_none() {
                    return Ok(());
                }
            } else if interest.is_none() {
                let datagram = self.socket_type() == Some(SocketType::Datagram);
                match self.channel_read_tls() {
                    Ok(0) if !datagram => {
                        return Err(FlareError::Disconnect { stage: "handshake" });
                    }
                    Ok(_) => {
                        if let Err(err) = self.channel.process_new_packets() {
                            // 尽力把告警写回对端。
                            let _ = self.flush_pending();
                            return Err(direction.failure(err.detail));
                        }
                        continue;
                    }
                    Err(err) if is_would_block(&err) => interest = Some(Interest::READABLE),
                    Err(err) => return Err(direction.io_failure(err)),
                }
            }

            attempts += 1;
            if attempts > options.max_attempts {
                warn!(socket = %self.id, attempts = options.max_attempts, ?direction, "handshake attempt budget exhausted");
                return Err(direction.failure(format!(
                    "no handshake progress after {} attempts",
                    options.max_attempts
                )));
            }
            let interest = interest.unwrap_or(Interest::READABLE);
            let ready = self
                .wait_for(interest, options.attempt_timeout)
                .map_err(|err| direction.io_failure(err))?;
            trace!(socket = %self.id, attempts, ready, ?interest, "handshake wait");
        }
    }

    /// 从套接字读入库缓冲、解密到 `buf`，或两者兼做。
    ///
    /// - `Complete(n)`：解密步骤返回 n 字节明文；仅套接字步骤时为读入的密文字节数；
    /// - `Pending`：套接字已读空且库中没有明文；
    /// - 对端关闭（TCP 读到 0 或收到 close_notify）返回 `disconnect`。
    pub fn read(&mut self, buf: &mut [u8], steps: ReadSteps) -> Result<Transfer> {
        self.socket_mut()?;
        loop {
            if steps.decrypt {
                match self.channel.read_plaintext(buf) {
                    Ok(0) if !buf.is_empty() => {
                        return Err(FlareError::Disconnect { stage: "read" });
                    }
                    Ok(n) => return Ok(Transfer::Complete(n)),
                    Err(err) if is_would_block(&err) => {}
                    Err(err) => return Err(FlareError::from_io("decrypt", err)),
                }
            }
            if !steps.socket {
                return Ok(Transfer::Pending);
            }
            let datagram = self.socket_type() == Some(SocketType::Datagram);
            match self.channel_read_tls() {
                Ok(0) if !datagram => return Err(FlareError::Disconnect { stage: "read" }),
                Ok(n) => {
                    self.process().map_err(record_failure)?;
                    if !steps.decrypt {
                        return Ok(Transfer::Complete(n));
                    }
                }
                Err(err) if is_would_block(&err) => return Ok(Transfer::Pending),
                Err(err) => return Err(FlareError::from_io("read", err)),
            }
        }
    }

    /// 数据报版本的读取：返回明文长度与对端地址。
    pub fn recv_from(&mut self, buf: &mut [u8], steps: ReadSteps) -> Result<(Transfer, Option<SocketAddr>)> {
        let transfer = self.read(buf, steps)?;
        Ok((transfer, self.peer))
    }

    /// 加密 `data` 并/或把库缓冲冲刷到套接字。
    ///
    /// 含加密步骤时返回被库接收的明文字节数，即使冲刷因“会阻塞”未完成；
    /// 仅冲刷时返回写出的密文字节数或 `Pending`。
    pub fn send(&mut self, data: &[u8], steps: SendSteps) -> Result<Transfer> {
        self.socket_mut()?;
        let mut accepted = None;
        if steps.encrypt {
            let n = self
                .channel
                .write_plaintext(data)
                .map_err(|err| FlareError::from_io("encrypt", err))?;
            accepted = Some(n);
        }
        let flushed = if steps.flush {
            self.flush_pending()
                .map_err(|err| FlareError::from_io("write", err))?
        } else {
            Transfer::Complete(0)
        };
        Ok(match accepted {
            Some(n) => Transfer::Complete(n),
            None => flushed,
        })
    }

    /// 数据报版本的发送；已连接套接字上 `peer` 必须与握手对端一致。
    pub fn send_to(&mut self, data: &[u8], peer: SocketAddr, steps: SendSteps) -> Result<Transfer> {
        if self.peer.is_some_and(|known| known != peer) {
            return Err(FlareError::invalid_parameter(format!(
                "engine is bound to {:?}, cannot send to {peer}",
                self.peer
            )));
        }
        self.send(data, steps)
    }

    /// 冲刷库缓冲。
    pub fn flush(&mut self) -> Result<Transfer> {
        self.socket_mut()?;
        self.flush_pending()
            .map_err(|err| FlareError::from_io("write", err))
    }

    /// 完成式后端：把外部已经读出的密文喂给库。
    pub fn feed(&mut self, mut ciphertext: &[u8]) -> Result<usize> {
        self.socket_mut()?;
        let total = ciphertext.len();
        while !ciphertext.is_empty() {
            let n = self
                .channel
                .read_tls(&mut ciphertext)
                .map_err(|err| FlareError::from_io("feed", err))?;
            self.process().map_err(record_failure)?;
            if n == 0 {
                break;
            }
        }
        Ok(total - ciphertext.len())
    }

    /// 优雅关闭并释放连接对象。
    ///
    /// 重复调用为空操作。`close_on_destroy` 为假时返回原始套接字。
    pub fn close(&mut self) -> Option<EngineSocket> {
        if self.socket.is_none() {
            return None;
        }
        self.channel.send_close_notify();
        if let Err(err) = self.flush_pending() {
            trace!(socket = %self.id, ?err, "close_notify not delivered");
        }
        self.waiter = None;
        let socket = self.socket.take()?;
        debug!(socket = %self.id, close_socket = self.flags.close_on_destroy, "engine closed");
        if self.flags.close_on_destroy {
            drop(socket);
            None
        } else {
            Some(socket)
        }
    }

    fn socket_mut(&mut self) -> Result<&mut EngineSocket> {
        self.socket.as_mut().ok_or(FlareError::InvalidContext)
    }

    fn channel_read_tls(&mut self) -> io::Result<usize> {
        match self.socket.as_mut() {
            Some(socket) => self.channel.read_tls(socket),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    fn process(&mut self) -> std::result::Result<(), ChannelError> {
        match self.channel.process_new_packets() {
            Ok(_) => Ok(()),
            Err(err) => {
                let _ = self.flush_pending();
                Err(err)
            }
        }
    }

    /// 写出库缓冲中的全部密文，遇到“会阻塞”返回 `Pending`。
    fn flush_pending(&mut self) -> io::Result<Transfer> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        };
        let mut written = 0;
        while self.channel.wants_write() {
            match self.channel.write_tls(socket) {
                Ok(n) => written += n,
                Err(err) if is_would_block(&err) => return Ok(Transfer::Pending),
                Err(err) => return Err(err),
            }
        }
        Ok(Transfer::Complete(written))
    }

    fn wait_for(&mut self, interest: Interest, timeout: Duration) -> io::Result<bool> {
        if self.waiter.is_none() {
            let socket = self
                .socket
                .as_ref()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
            self.waiter = Some(Waiter::new(socket)?);
        }
        match self.waiter.as_mut() {
            Some(waiter) => waiter.wait(interest, timeout),
            None => Ok(false),
        }
    }
}

impl<C: DatagramChannel> HandshakeEngine<C> {
    /// DTLS 服务端握手：无状态 cookie 监听 + 握手循环。
    ///
    /// 未连接的套接字先监听：每个数据报交给库裁决，验证通过后把套接字 `connect` 到该对端，
    /// 随后所有步骤只与该对端通信。返回握手对端地址。
    pub fn accept_dtls(&mut self, options: &HandshakeOptions) -> Result<SocketAddr> {
        let peer = match self.peer {
            Some(peer) => peer,
            None => {
                let peer = self.listen(options)?;
                let socket = self.socket_mut()?;
                if let EngineSocket::Datagram(udp) = socket {
                    udp.connect(peer)
                        .map_err(|source| FlareError::Io { op: "connect", source })?;
                }
                self.peer = Some(peer);
                peer
            }
        };
        self.accept(options)?;
        Ok(peer)
    }

    fn listen(&mut self, options: &HandshakeOptions) -> Result<SocketAddr> {
        let mut datagram = vec![0u8; 65_535];
        let mut attempts = 0u32;
        loop {
            if options.canceled() {
                return Err(FlareError::Canceled);
            }
            let received = match self.socket_mut()? {
                EngineSocket::Datagram(udp) => udp.recv_from(&mut datagram),
                EngineSocket::Stream(_) => {
                    return Err(FlareError::invalid_parameter("listen requires a datagram socket"));
                }
            };
            match received {
                Ok((n, peer)) => match self.channel.listen(&datagram[..n], peer) {
                    ListenVerdict::Verified => {
                        debug!(socket = %self.id, %peer, "dtls peer verified");
                        return Ok(peer);
                    }
                    ListenVerdict::Reply(reply) => {
                        if let Some(udp) = self.socket.as_ref().and_then(EngineSocket::as_datagram) {
                            if let Err(err) = udp.send_to(&reply, peer) {
                                debug!(socket = %self.id, %peer, ?err, "cookie reply not sent");
                            }
                        }
                        continue;
                    }
                    ListenVerdict::Discard => continue,
                },
                Err(err) if is_would_block(&err) => {}
                Err(err) => return Err(Direction::Accept.io_failure(err)),
            }
            attempts += 1;
            if attempts > options.max_attempts {
                return Err(Direction::Accept.failure(format!(
                    "no verified peer after {} attempts",
                    options.max_attempts
                )));
            }
            self.wait_for(Interest::READABLE, options.attempt_timeout)
                .map_err(|err| Direction::Accept.io_failure(err))?;
        }
    }
}

impl<C: SecureChannel> Drop for HandshakeEngine<C> {
    fn drop(&mut self) {
        // 未显式关闭的引擎在析构时补做一次优雅关闭；交还的套接字无人接收，随之释放。
        drop(self.close());
    }
}

fn record_failure(err: ChannelError) -> FlareError {
    FlareError::Io {
        op: "tls record",
        source: io::Error::new(io::ErrorKind::InvalidData, err),
    }
}

impl<C: SecureChannel> std::fmt::Debug for HandshakeEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeEngine")
            .field("socket", &self.id)
            .field("peer", &self.peer)
            .field("flags", &self.flags)
            .field("closed", &self.socket.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        net::{TcpListener, UdpSocket},
        thread,
    };

    use flare_core::ErrorCode;
    use tracing_test::traced_test;

    use super::*;
    use crate::channel::PacketState;

    /// 脚本化连接：收到 `finish` 才结束握手，并回写 `done`。
    #[derive(Default)]
    struct Scripted {
        received: Vec<u8>,
        outgoing: Vec<u8>,
        finished: bool,
    }

    impl SecureChannel for Scripted {
        fn is_handshaking(&self) -> bool {
            !self.finished
        }

        fn wants_read(&self) -> bool {
            true
        }

        fn wants_write(&self) -> bool {
            !self.outgoing.is_empty()
        }

        fn read_tls(&mut self, source: &mut dyn Read) -> io::Result<usize> {
            let mut buf = [0u8; 512];
            let n = source.read(&mut buf)?;
            self.received.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn write_tls(&mut self, sink: &mut dyn Write) -> io::Result<usize> {
            let n = sink.write(&self.outgoing)?;
            self.outgoing.drain(..n);
            Ok(n)
        }

        fn process_new_packets(&mut self) -> std::result::Result<PacketState, ChannelError> {
            if !self.finished && self.received.windows(6).any(|w| w == b"finish") {
                self.finished = true;
                self.outgoing.extend_from_slice(b"done");
            }
            Ok(PacketState::default())
        }

        fn read_plaintext(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::WouldBlock))
        }

        fn write_plaintext(&mut self, data: &[u8]) -> io::Result<usize> {
            Ok(data.len())
        }

        fn send_close_notify(&mut self) {}
    }

    impl DatagramChannel for Scripted {
        fn listen(&mut self, datagram: &[u8], _peer: SocketAddr) -> ListenVerdict {
            if datagram.starts_with(b"cookie") {
                ListenVerdict::Verified
            } else {
                ListenVerdict::Reply(b"verify".to_vec())
            }
        }
    }

    #[test]
    #[traced_test]
    fn exhausted_budget_is_logged_and_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("绑定回环监听");
        let _client = TcpStream::connect(listener.local_addr().expect("地址")).expect("连接");
        let (server, _) = listener.accept().expect("受理");

        let mut engine =
            HandshakeEngine::open(server, Scripted::default(), EngineFlags::default()).expect("打开引擎");
        let options = HandshakeOptions {
            max_attempts: 2,
            attempt_timeout: Duration::from_millis(10),
            cancel: None,
        };
        let err = engine.accept(&options).expect_err("沉默对端必须耗尽预算");
        assert_eq!(err.code(), ErrorCode::ErrorHandshake);
        assert!(logs_contain("handshake attempt budget exhausted"));
    }

    #[test]
    fn dtls_cookie_exchange_precedes_the_handshake() {
        let server = UdpSocket::bind("127.0.0.1:0").expect("绑定 UDP");
        let server_addr = server.local_addr().expect("地址");
        let mut engine =
            HandshakeEngine::open_dtls(server, Scripted::default(), EngineFlags::default())
                .expect("打开 DTLS 引擎");
        assert_eq!(engine.peer_addr(), None, "未连接的套接字尚无对端");

        let client = thread::spawn(move || {
            let socket = UdpSocket::bind("127.0.0.1:0").expect("绑定客户端");
            socket
                .set_read_timeout(Some(Duration::from_secs(5)))
                .expect("读超时");
            let mut buf = [0u8; 64];

            socket.send_to(b"hello", server_addr).expect("首个报文");
            let (n, _) = socket.recv_from(&mut buf).expect("cookie 回复");
            assert_eq!(&buf[..n], b"verify");

            socket.send_to(b"cookie", server_addr).expect("带 cookie 的报文");
            socket.send_to(b"finish", server_addr).expect("握手收尾");
            let (n, _) = socket.recv_from(&mut buf).expect("握手完成回复");
            assert_eq!(&buf[..n], b"done");
            socket.local_addr().expect("客户端地址")
        });

        let options = HandshakeOptions {
            max_attempts: 100,
            attempt_timeout: Duration::from_millis(50),
            cancel: None,
        };
        let peer = engine.accept_dtls(&options).expect("DTLS 握手");
        let client_addr = client.join().expect("客户端线程不应 panic");
        assert_eq!(peer, client_addr);
        assert_eq!(engine.peer_addr(), Some(client_addr));
        assert_eq!(engine.socket_type(), Some(SocketType::Datagram));

        let err = engine
            .send_to(b"x", server_addr, SendSteps::ALL)
            .expect_err("已连接的 DTLS 引擎只能发往握手对端");
        assert_eq!(err.code(), ErrorCode::InvalidParameter);
    }
}
