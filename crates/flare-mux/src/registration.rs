//! 绑定进多路复用器的套接字句柄。
//!
//! # 教案式说明
//! - **意图 (Why)**：会话独占原始套接字并负责关闭它；多路复用器只需要一个能注册、
//!   能读取的副本。这里用 `try_clone` 复制描述符，绑定即把副本的所有权交给后端，
//!   解绑即释放副本；
//! - **契约 (What)**：构造时把底层文件描述置为非阻塞（副本与原件共享该标志）；
//!   完成式后端通过 [`Reader`] 在表锁外读取数据，读取与交付由句柄自带的互斥量串行化；
//! - **风险 (Trade-offs)**：每个流占用两个额外描述符，换取后端与会话之间没有共享可变状态。

use std::{
    io,
    net::{TcpListener, TcpStream, UdpSocket},
    sync::Arc,
};

use mio::{Interest, Registry, Token, event::Source};
use parking_lot::Mutex;

/// 后端持有的套接字副本。
#[derive(Debug)]
pub struct Registration {
    source: SourceHandle,
    reader: Reader,
}

#[derive(Debug)]
enum SourceHandle {
    Listener(mio::net::TcpListener),
    Stream(mio::net::TcpStream),
    Datagram(mio::net::UdpSocket),
}

/// 注册句柄的种类。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SourceKind {
    Listener,
    Stream,
    Datagram,
}

/// 完成式后端在表锁外读取时使用的共享句柄。
///
/// 边沿触发的注册不是一次性的：某个线程仍在读空套接字时，新边沿可能被另一个轮询线程取到。
/// 持有互斥量直到读出的数据交付完毕，同一套接字的字节因此按序上报。
#[derive(Clone, Debug)]
pub(crate) enum Reader {
    None,
    Stream(Arc<Mutex<TcpStream>>),
    Datagram(Arc<Mutex<UdpSocket>>),
}

impl Registration {
    pub fn listener(listener: &TcpListener) -> io::Result<Self> {
        let dup = listener.try_clone()?;
        dup.set_nonblocking(true)?;
        Ok(Self {
            source: SourceHandle::Listener(mio::net::TcpListener::from_std(dup)),
            reader: Reader::None,
        })
    }

    pub fn stream(stream: &TcpStream) -> io::Result<Self> {
        let dup = stream.try_clone()?;
        dup.set_nonblocking(true)?;
        let reader = Arc::new(Mutex::new(stream.try_clone()?));
        Ok(Self {
            source: SourceHandle::Stream(mio::net::TcpStream::from_std(dup)),
            reader: Reader::Stream(reader),
        })
    }

    pub fn datagram(socket: &UdpSocket) -> io::Result<Self> {
        let dup = socket.try_clone()?;
        dup.set_nonblocking(true)?;
        let reader = Arc::new(Mutex::new(socket.try_clone()?));
        Ok(Self {
            source: SourceHandle::Datagram(mio::net::UdpSocket::from_std(dup)),
            reader: Reader::Datagram(reader),
        })
    }

    pub fn kind(&self) -> SourceKind {
        match self.source {
            SourceHandle::Listener(_) => SourceKind::Listener,
            SourceHandle::Stream(_) => SourceKind::Stream,
            SourceHandle::Datagram(_) => SourceKind::Datagram,
        }
    }

    pub(crate) fn reader(&self) -> Reader {
        self.reader.clone()
    }
}

impl Source for Registration {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match &mut self.source {
            SourceHandle::Listener(s) => s.register(registry, token, interests),
            SourceHandle::Stream(s) => s.register(registry, token, interests),
            SourceHandle::Datagram(s) => s.register(registry, token, interests),
        }
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        match &mut self.source {
            SourceHandle::Listener(s) => s.reregister(registry, token, interests),
            SourceHandle::Stream(s) => s.reregister(registry, token, interests),
            SourceHandle::Datagram(s) => s.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match &mut self.source {
            SourceHandle::Listener(s) => s.deregister(registry),
            SourceHandle::Stream(s) => s.deregister(registry),
            SourceHandle::Datagram(s) => s.deregister(registry),
        }
    }
}
