//! 单套接字的有界等待。
//!
//! 握手循环在库报告“需要读/需要写”时，需要在该套接字上等待对应条件，且每轮等待有上限。
//! 这里为引擎私有一个 mio `Poll`，注册套接字的副本；每轮等待前重新注册兴趣，
//! 边沿触发下重新注册会立即报告当前已满足的条件。

use std::{io, time::Duration};

use mio::{Events, Interest, Poll, Registry, Token, event::Source};

use crate::socket::EngineSocket;

const WAIT_TOKEN: Token = Token(1);

pub(crate) struct Waiter {
    poll: Poll,
    events: Events,
    source: WaitSource,
    registered: bool,
}

enum WaitSource {
    Stream(mio::net::TcpStream),
    Datagram(mio::net::UdpSocket),
}

impl Source for WaitSource {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            WaitSource::Stream(s) => s.register(registry, token, interests),
            WaitSource::Datagram(s) => s.register(registry, token, interests),
        }
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            WaitSource::Stream(s) => s.reregister(registry, token, interests),
            WaitSource::Datagram(s) => s.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            WaitSource::Stream(s) => s.deregister(registry),
            WaitSource::Datagram(s) => s.deregister(registry),
        }
    }
}

impl Waiter {
    pub(crate) fn new(socket: &EngineSocket) -> io::Result<Self> {
        let source = match socket {
            EngineSocket::Stream(s) => WaitSource::Stream(mio::net::TcpStream::from_std(s.try_clone()?)),
            EngineSocket::Datagram(s) => WaitSource::Datagram(mio::net::UdpSocket::from_std(s.try_clone()?)),
        };
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(4),
            source,
            registered: false,
        })
    }

    /// 等待 `interest` 满足或超时；返回条件是否已满足。
    pub(crate) fn wait(&mut self, interest: Interest, timeout: Duration) -> io::Result<bool> {
        if self.registered {
            self.poll.registry().reregister(&mut self.source, WAIT_TOKEN, interest)?;
        } else {
            self.poll.registry().register(&mut self.source, WAIT_TOKEN, interest)?;
            self.registered = true;
        }
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => Ok(!self.events.is_empty()),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => Ok(false),
            Err(err) => Err(err),
        }
    }
}
