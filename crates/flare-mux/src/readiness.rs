use std::time::Duration;

use flare_core::{OwnerTag, Result, SocketId};
use mio::Interest;
use tracing::trace;

use crate::{
    Multiplexer, MuxFlavor,
    event::{MuxEvent, MuxEventKind},
    reactor::Reactor,
    registration::{Registration, SourceKind},
};

/// 就绪式后端。
///
/// 只告知“哪个套接字可以操作”，不搬运数据：流上的可读、可写、挂断都归一为
/// `Read { payload: None }`，会话读到零字节时自行推断断开。
pub struct ReadinessMux {
    reactor: Reactor,
}

impl ReadinessMux {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            reactor: Reactor::new(capacity)?,
        })
    }
}

impl Multiplexer for ReadinessMux {
    fn flavor(&self) -> MuxFlavor {
        MuxFlavor::Readiness
    }

    fn bind(&self, socket: SocketId, registration: Registration, owner: OwnerTag) -> Result<()> {
        let interest = match registration.kind() {
            SourceKind::Listener | SourceKind::Datagram => Interest::READABLE,
            // 可写边沿用于冲刷握手库中积压的密文。
            SourceKind::Stream => Interest::READABLE | Interest::WRITABLE,
        };
        self.reactor.bind(socket, registration, owner, interest)
    }

    fn unbind(&self, socket: SocketId) -> Result<()> {
        self.reactor.unbind(socket)
    }

    fn poll_once(&self, timeout: Duration, sink: &mut dyn FnMut(MuxEvent)) -> Result<usize> {
        let mut delivered = 0;
        for ready in self.reactor.poll_ready(timeout)? {
            let kind = match ready.kind {
                SourceKind::Listener if ready.readable => MuxEventKind::Connect,
                SourceKind::Listener => continue,
                SourceKind::Stream => MuxEventKind::Read { payload: None },
                SourceKind::Datagram => MuxEventKind::Datagram {
                    payload: None,
                    peer: None,
                },
            };
            trace!(owner = ready.owner.0, ?kind, hangup = ready.hangup, "readiness event");
            sink(MuxEvent {
                owner: ready.owner,
                kind,
            });
            delivered += 1;
        }
        Ok(delivered)
    }

    fn wake(&self) -> Result<()> {
        self.reactor.wake()
    }

    fn bound(&self) -> usize {
        self.reactor.bound()
    }
}

impl std::fmt::Debug for ReadinessMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessMux")
            .field("bound", &self.reactor.bound())
            .finish()
    }
}
