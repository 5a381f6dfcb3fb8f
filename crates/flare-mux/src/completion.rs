use std::{io::Read, time::Duration};

use bytes::{Bytes, BytesMut};
use flare_core::{FlareError, OwnerTag, Result, SocketId, error::is_would_block};
use mio::Interest;
use tracing::{debug, trace};

use crate::{
    Multiplexer, MuxFlavor,
    event::{MuxEvent, MuxEventKind},
    reactor::{Reactor, Readiness},
    registration::{Reader, Registration, SourceKind},
};

const READ_CHUNK: usize = 16 * 1024;
const MAX_DATAGRAM: usize = 65_535;

/// 完成式后端。
///
/// # 教案式说明
/// - **意图 (Why)**：在只提供“操作完成”通知的平台上，数据在事件到达时已经位于用户缓冲中；
///   本后端在分发前自行把套接字读空，再以 `Read { payload: Some(..) }` 交出，编排层因此
///   与真实的完成式平台看到同一种事件形态；
/// - **契约 (What)**：
///   - 读到流结束或致命读错误时，在已读数据之后追加一条显式 `Disconnect`；
///   - 数据报逐个上报并附带来源地址；
///   - 不接受监听套接字，服务器需为受理启动专用线程；
/// - **风险 (Trade-offs)**：多个 I/O 线程共享轮询时，同一套接字的新边沿可能在前一轮读取尚未
///   交付时被另一线程取到；读取与 `sink` 都在句柄互斥量内完成，后到的线程只能读到更晚的字节，
///   代价是该线程在前一轮交付期间阻塞。
pub struct CompletionMux {
    reactor: Reactor,
}

impl CompletionMux {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            reactor: Reactor::new(capacity)?,
        })
    }

    fn complete(&self, ready: Readiness, chunk: &mut [u8], sink: &mut dyn FnMut(MuxEvent)) -> usize {
        if !(ready.readable || ready.hangup) {
            return 0;
        }
        match ready.reader {
            Reader::Stream(stream) => {
                let stream = stream.lock();
                let mut collected = BytesMut::new();
                let mut closed = false;
                loop {
                    match (&*stream).read(chunk) {
                        Ok(0) => {
                            closed = true;
                            break;
                        }
                        Ok(n) => collected.extend_from_slice(&chunk[..n]),
                        Err(err) if is_would_block(&err) => break,
                        Err(err) => {
                            debug!(owner = ready.owner.0, ?err, "completion read failed");
                            closed = true;
                            break;
                        }
                    }
                }
                let mut delivered = 0;
                if !collected.is_empty() {
                    sink(MuxEvent {
                        owner: ready.owner,
                        kind: MuxEventKind::Read {
                            payload: Some(collected.freeze()),
                        },
                    });
                    delivered += 1;
                }
                if closed {
                    sink(MuxEvent {
                        owner: ready.owner,
                        kind: MuxEventKind::Disconnect,
                    });
                    delivered += 1;
                }
                delivered
            }
            Reader::Datagram(socket) => {
                let socket = socket.lock();
                let mut delivered = 0;
                loop {
                    match socket.recv_from(chunk) {
                        Ok((n, peer)) => {
                            sink(MuxEvent {
                                owner: ready.owner,
                                kind: MuxEventKind::Datagram {
                                    payload: Some(Bytes::copy_from_slice(&chunk[..n])),
                                    peer: Some(peer),
                                },
                            });
                            delivered += 1;
                        }
                        Err(err) if is_would_block(&err) => break,
                        Err(err) => {
                            // 数据报套接字上的 ICMP 类错误不终止监听会话。
                            debug!(owner = ready.owner.0, ?err, "completion recv_from failed");
                            break;
                        }
                    }
                }
                delivered
            }
            Reader::None => 0,
        }
    }
}

impl Multiplexer for CompletionMux {
    fn flavor(&self) -> MuxFlavor {
        MuxFlavor::Completion
    }

    fn bind(&self, socket: SocketId, registration: Registration, owner: OwnerTag) -> Result<()> {
        if registration.kind() == SourceKind::Listener {
            return Err(FlareError::invalid_parameter(
                "completion backend does not accept listening sockets",
            ));
        }
        self.reactor
            .bind(socket, registration, owner, Interest::READABLE)
    }

    fn unbind(&self, socket: SocketId) -> Result<()> {
        self.reactor.unbind(socket)
    }

    fn poll_once(&self, timeout: Duration, sink: &mut dyn FnMut(MuxEvent)) -> Result<usize> {
        let ready = self.reactor.poll_ready(timeout)?;
        if ready.is_empty() {
            return Ok(0);
        }
        let mut chunk = vec![0u8; READ_CHUNK.max(MAX_DATAGRAM)];
        let mut delivered = 0;
        for item in ready {
            delivered += self.complete(item, &mut chunk, sink);
        }
        trace!(delivered, "completion events delivered");
        Ok(delivered)
    }

    fn wake(&self) -> Result<()> {
        self.reactor.wake()
    }

    fn bound(&self) -> usize {
        self.reactor.bound()
    }
}

impl std::fmt::Debug for CompletionMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionMux")
            .field("bound", &self.reactor.bound())
            .finish()
    }
}
