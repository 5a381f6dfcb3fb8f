//! 会话 I/O 端点。
//!
//! 会话只通过 [`SessionIo`] 接触套接字：明文流、TLS 流（握手引擎）与数据报监听套接字
//! 各有一个实现。所有实现都工作在非阻塞套接字上，“会阻塞”以 [`Inbound::Pending`] /
//! [`Transfer::Pending`] 表达，从不作为错误返回。

use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, UdpSocket},
};

use bytes::{Buf, Bytes, BytesMut};
use flare_core::{
    FlareError, Result, SocketType, Transfer,
    error::{is_disconnect, is_would_block},
};
use flare_mux::Registration;
use flare_tls::{ReadSteps, SendSteps, TlsEngine};
use tracing::trace;

/// 一次接收的结果。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Inbound {
    /// 流上读到 n 字节。
    Data(usize),
    /// 收到一个数据报。
    Datagram { len: usize, peer: SocketAddr },
    /// 暂无更多数据。
    Pending,
    /// 对端已关闭。
    Closed,
}

/// 会话底层的读写端点。
pub trait SessionIo: Send {
    fn socket_type(&self) -> SocketType;

    fn is_secure(&self) -> bool {
        false
    }

    /// 读取一段入站数据。`from_socket` 为假时只消化端点内部已缓冲的数据
    /// （完成式后端已经替会话读过套接字）。
    fn recv(&mut self, buf: &mut [u8], from_socket: bool) -> Result<Inbound>;

    /// 接收完成式后端读出的原始字节。返回值为可直接进入重组缓冲的明文；
    /// 需要解密的端点吸收密文后返回 `None`，明文随后经 `recv` 取出。
    fn absorb(&mut self, staged: Bytes) -> Result<Option<Bytes>> {
        Ok(Some(staged))
    }

    /// 发送应用数据；数据报端点必须给出 `peer`。
    fn send(&mut self, data: &[u8], peer: Option<SocketAddr>) -> Result<Transfer>;

    /// 冲刷此前因“会阻塞”而滞留的出站数据。
    fn flush(&mut self) -> Result<Transfer>;

    /// 供多路复用器绑定的句柄副本。
    fn registration(&self) -> io::Result<Registration>;

    /// 关闭端点，重复调用为空操作。
    fn close(&mut self);
}

/// 明文 TCP 流。
#[derive(Debug)]
pub struct PlainStream {
    stream: Option<TcpStream>,
    outgoing: BytesMut,
    max_backlog: usize,
}

impl PlainStream {
    pub fn new(stream: TcpStream, max_backlog: usize) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream: Some(stream),
            outgoing: BytesMut::new(),
            max_backlog,
        })
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(FlareError::InvalidContext)
    }

    fn drain_outgoing(&mut self) -> Result<Transfer> {
        let mut written = 0;
        while !self.outgoing.is_empty() {
            let Some(stream) = self.stream.as_mut() else {
                return Err(FlareError::InvalidContext);
            };
            match stream.write(&self.outgoing) {
                Ok(0) => return Err(FlareError::Disconnect { stage: "write" }),
                Ok(n) => {
                    self.outgoing.advance(n);
                    written += n;
                }
                Err(err) if is_would_block(&err) => return Ok(Transfer::Pending),
                Err(err) => return Err(FlareError::from_io("write", err)),
            }
        }
        Ok(Transfer::Complete(written))
    }
}

impl SessionIo for PlainStream {
    fn socket_type(&self) -> SocketType {
        SocketType::Stream
    }

    fn recv(&mut self, buf: &mut [u8], from_socket: bool) -> Result<Inbound> {
        if !from_socket {
            return Ok(Inbound::Pending);
        }
        match self.stream()?.read(buf) {
            Ok(0) => Ok(Inbound::Closed),
            Ok(n) => Ok(Inbound::Data(n)),
            Err(err) if is_would_block(&err) => Ok(Inbound::Pending),
            Err(err) if is_disconnect(&err) => Ok(Inbound::Closed),
            Err(err) => Err(FlareError::from_io("read", err)),
        }
    }

    fn send(&mut self, data: &[u8], _peer: Option<SocketAddr>) -> Result<Transfer> {
        if self.drain_outgoing()?.is_pending() {
            if self.outgoing.len() + data.len() > self.max_backlog {
                return Err(FlareError::Disconnect {
                    stage: "send backlog",
                });
            }
            self.outgoing.extend_from_slice(data);
            return Ok(Transfer::Pending);
        }
        let mut sent = 0;
        while sent < data.len() {
            match self.stream()?.write(&data[sent..]) {
                Ok(0) => return Err(FlareError::Disconnect { stage: "write" }),
                Ok(n) => sent += n,
                Err(err) if is_would_block(&err) => {
                    self.outgoing.extend_from_slice(&data[sent..]);
                    trace!(queued = data.len() - sent, "plain send deferred");
                    return Ok(Transfer::Pending);
                }
                Err(err) => return Err(FlareError::from_io("write", err)),
            }
        }
        Ok(Transfer::Complete(sent))
    }

    fn flush(&mut self) -> Result<Transfer> {
        self.drain_outgoing()
    }

    fn registration(&self) -> io::Result<Registration> {
        match &self.stream {
            Some(stream) => Registration::stream(stream),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.outgoing.clear();
            // 多路复用器可能仍持有副本，shutdown 保证对端立即看到关闭。
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// 经握手引擎加解密的 TLS 流。
#[derive(Debug)]
pub struct SecureStream {
    engine: TlsEngine,
}

impl SecureStream {
    pub fn new(engine: TlsEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &TlsEngine {
        &self.engine
    }
}

impl SessionIo for SecureStream {
    fn socket_type(&self) -> SocketType {
        SocketType::Stream
    }

    fn is_secure(&self) -> bool {
        true
    }

    fn recv(&mut self, buf: &mut [u8], from_socket: bool) -> Result<Inbound> {
        let steps = if from_socket {
            ReadSteps::ALL
        } else {
            ReadSteps::DECRYPT
        };
        match self.engine.read(buf, steps) {
            Ok(Transfer::Complete(n)) => Ok(Inbound::Data(n)),
            Ok(Transfer::Pending) => Ok(Inbound::Pending),
            Err(FlareError::Disconnect { .. }) => Ok(Inbound::Closed),
            Err(err) => Err(err),
        }
    }

    fn absorb(&mut self, staged: Bytes) -> Result<Option<Bytes>> {
        self.engine.feed(&staged)?;
        Ok(None)
    }

    fn send(&mut self, data: &[u8], _peer: Option<SocketAddr>) -> Result<Transfer> {
        let mut accepted = 0;
        while accepted < data.len() {
            match self.engine.send(&data[accepted..], SendSteps::ALL)? {
                Transfer::Complete(0) | Transfer::Pending => break,
                Transfer::Complete(n) => accepted += n,
            }
        }
        if accepted == 0 && !data.is_empty() {
            return Ok(Transfer::Pending);
        }
        Ok(Transfer::Complete(accepted))
    }

    fn flush(&mut self) -> Result<Transfer> {
        self.engine.flush()
    }

    fn registration(&self) -> io::Result<Registration> {
        match self.engine.socket().and_then(|socket| socket.as_stream()) {
            Some(stream) => Registration::stream(stream),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    fn close(&mut self) {
        if let Some(socket) = self.engine.close()
            && let Some(stream) = socket.as_stream()
        {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// 无连接传输的监听套接字端点，由唯一的数据报会话持有。
#[derive(Debug)]
pub struct DatagramIo {
    socket: Option<UdpSocket>,
}

impl DatagramIo {
    /// 复制监听套接字；原套接字仍归服务器所有。
    pub fn new(listener: &UdpSocket) -> io::Result<Self> {
        let socket = listener.try_clone()?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket: Some(socket),
        })
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket.as_ref().ok_or(FlareError::InvalidContext)
    }
}

impl SessionIo for DatagramIo {
    fn socket_type(&self) -> SocketType {
        SocketType::Datagram
    }

    fn recv(&mut self, buf: &mut [u8], from_socket: bool) -> Result<Inbound> {
        if !from_socket {
            return Ok(Inbound::Pending);
        }
        match self.socket()?.recv_from(buf) {
            Ok((len, peer)) => Ok(Inbound::Datagram { len, peer }),
            Err(err) if is_would_block(&err) => Ok(Inbound::Pending),
            // ICMP 类错误（如端口不可达）只影响单个对端，不终止监听会话。
            Err(err) if is_disconnect(&err) => Ok(Inbound::Pending),
            Err(err) => Err(FlareError::from_io("recv_from", err)),
        }
    }

    fn send(&mut self, data: &[u8], peer: Option<SocketAddr>) -> Result<Transfer> {
        let peer = peer.ok_or_else(|| {
            FlareError::invalid_parameter("datagram sessions need a destination address")
        })?;
        match self.socket()?.send_to(data, peer) {
            Ok(n) => Ok(Transfer::Complete(n)),
            Err(err) if is_would_block(&err) => Ok(Transfer::Pending),
            Err(err) => Err(FlareError::from_io("send_to", err)),
        }
    }

    fn flush(&mut self) -> Result<Transfer> {
        Ok(Transfer::Complete(0))
    }

    fn registration(&self) -> io::Result<Registration> {
        match &self.socket {
            Some(socket) => Registration::datagram(socket),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    fn close(&mut self) {
        self.socket = None;
    }
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener, thread, time::Duration};

    use super::*;

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("绑定回环监听");
        let client = TcpStream::connect(listener.local_addr().expect("地址")).expect("连接");
        let (server, _) = listener.accept().expect("受理");
        (client, server)
    }

    #[test]
    fn plain_stream_reports_pending_then_closed() {
        let (mut client, server) = pair();
        let mut io = PlainStream::new(server, 1024).expect("端点");
        let mut buf = [0u8; 16];
        assert_eq!(io.recv(&mut buf, true).expect("读"), Inbound::Pending);

        client.write_all(b"abc").expect("写");
        let mut got = Inbound::Pending;
        for _ in 0..100 {
            got = io.recv(&mut buf, true).expect("读");
            if got != Inbound::Pending {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(got, Inbound::Data(3));
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(io.recv(&mut buf, false).expect("读"), Inbound::Pending, "未授权读套接字时不读");

        drop(client);
        let mut closed = false;
        for _ in 0..100 {
            if io.recv(&mut buf, true).expect("读") == Inbound::Closed {
                closed = true;
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(closed, "对端关闭必须被识别");
    }

    #[test]
    fn datagram_io_needs_a_peer_to_send() {
        let listener = UdpSocket::bind("127.0.0.1:0").expect("绑定 UDP");
        let mut io = DatagramIo::new(&listener).expect("端点");
        let err = io.send(b"x", None).expect_err("缺少目的地址");
        assert_eq!(err.code(), flare_core::ErrorCode::InvalidParameter);

        let peer = UdpSocket::bind("127.0.0.1:0").expect("绑定对端");
        let sent = io
            .send(b"pong", Some(peer.local_addr().expect("地址")))
            .expect("发送");
        assert_eq!(sent, Transfer::Complete(4));
        io.close();
        assert_eq!(
            io.send(b"x", Some(peer.local_addr().expect("地址")))
                .expect_err("关闭后不可发送")
                .code(),
            flare_core::ErrorCode::InvalidContext
        );
    }
}
