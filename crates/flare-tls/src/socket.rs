//! 握手引擎持有的原始套接字。

use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpStream, UdpSocket},
};

use flare_core::{SocketId, SocketType};

/// 流或数据报套接字。
///
/// 数据报方向要求套接字已 `connect` 到对端，`Read`/`Write` 因此映射为 `recv`/`send`，
/// 每次调用搬运一个完整数据报。
#[derive(Debug)]
pub enum EngineSocket {
    Stream(TcpStream),
    Datagram(UdpSocket),
}

impl EngineSocket {
    pub fn id(&self) -> SocketId {
        match self {
            EngineSocket::Stream(s) => SocketId::of(s),
            EngineSocket::Datagram(s) => SocketId::of(s),
        }
    }

    pub fn socket_type(&self) -> SocketType {
        match self {
            EngineSocket::Stream(_) => SocketType::Stream,
            EngineSocket::Datagram(_) => SocketType::Datagram,
        }
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match self {
            EngineSocket::Stream(s) => s.set_nonblocking(nonblocking),
            EngineSocket::Datagram(s) => s.set_nonblocking(nonblocking),
        }
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            EngineSocket::Stream(s) => s.peer_addr(),
            EngineSocket::Datagram(s) => s.peer_addr(),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            EngineSocket::Stream(s) => s.local_addr(),
            EngineSocket::Datagram(s) => s.local_addr(),
        }
    }

    pub fn as_stream(&self) -> Option<&TcpStream> {
        match self {
            EngineSocket::Stream(s) => Some(s),
            EngineSocket::Datagram(_) => None,
        }
    }

    pub fn as_datagram(&self) -> Option<&UdpSocket> {
        match self {
            EngineSocket::Stream(_) => None,
            EngineSocket::Datagram(s) => Some(s),
        }
    }

    pub fn into_stream(self) -> Option<TcpStream> {
        match self {
            EngineSocket::Stream(s) => Some(s),
            EngineSocket::Datagram(_) => None,
        }
    }
}

impl Read for EngineSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            EngineSocket::Stream(s) => s.read(buf),
            EngineSocket::Datagram(s) => s.recv(buf),
        }
    }
}

impl Write for EngineSocket {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self {
            EngineSocket::Stream(s) => s.write(data),
            EngineSocket::Datagram(s) => s.send(data),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            EngineSocket::Stream(s) => s.flush(),
            EngineSocket::Datagram(_) => Ok(()),
        }
    }
}
