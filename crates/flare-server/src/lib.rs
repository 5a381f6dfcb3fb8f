#![doc = r#"
# flare-server

## 设计动机（Why）
- **定位**：网络服务器核心的编排层，把监听套接字、多路复用器、会话表、受理队列、事件队列
  与四类工作线程池组装成一个可伸缩的服务器；
- **分层**：加密握手在 `flare-tls`，事件后端在 `flare-mux`，本 crate 只面向它们的 trait
  编程，套接字创建与 TLS 终止则由注入的 [`ServerSocket`] 决定。

## 核心契约（What）
- 用户回调只会在会话完整存在后观察到 `Connect`，每个会话恰好观察到一次 `Disconnect`；
- 会话以 `Arc` 计数，出表与销毁分两步完成，并发的 I/O 线程不会操作已释放的会话；
- 受理队列与事件队列是仅有的跨线程可变结构，临界区内不执行任何阻塞 I/O。

## 风险与考量（Trade-offs）
- 工作者是 OS 线程，以有界等待轮询停止标志；空闲 CPU 由 `[polling]` 节拍限定。
"#]

pub mod accept_queue;
pub mod event;
pub mod event_queue;
pub mod io;
pub mod pool;
pub mod server;
pub mod server_socket;
pub mod session;
pub mod table;

pub use accept_queue::{AcceptQueue, AcceptedConnection};
pub use event::{Admission, AdmissionControl, EventHandler, ServerEvent, SocketInfo};
pub use event_queue::{EventQueue, STARVATION_LIMIT};
pub use io::{DatagramIo, Inbound, PlainStream, SecureStream, SessionIo};
pub use pool::WorkerPool;
pub use server::{NetworkServer, ServerBuilder, ServerHandle, ServerState, WorkerCounts};
pub use server_socket::{Listening, ServerSocket, TcpServerSocket, TlsServerSocket, UdpServerSocket};
pub use session::{Backlog, Consumed, Message, ProduceOutcome, Session, Staged};
pub use table::{SessionRef, SessionTable};

#[cfg(test)]
pub(crate) mod test_support {
    use std::{
        collections::VecDeque,
        io,
        net::SocketAddr,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use flare_core::{Result, SocketId, SocketType, Transfer, config::LimitsConfig};
    use flare_mux::Registration;

    use crate::{
        io::{Inbound, SessionIo},
        session::Session,
    };

    /// 按脚本吐出数据的端点，记录关闭次数。
    pub struct FakeIo {
        kind: SocketType,
        chunks: VecDeque<Vec<u8>>,
        eof: bool,
        closed: bool,
        closes: Arc<AtomicUsize>,
    }

    impl FakeIo {
        fn build(kind: SocketType, chunks: Vec<Vec<u8>>, eof: bool) -> (Self, Arc<AtomicUsize>) {
            let closes = Arc::new(AtomicUsize::new(0));
            let io = Self {
                kind,
                chunks: chunks.into(),
                eof,
                closed: false,
                closes: Arc::clone(&closes),
            };
            (io, closes)
        }

        pub fn stream(chunks: Vec<Vec<u8>>) -> (Self, Arc<AtomicUsize>) {
            Self::build(SocketType::Stream, chunks, false)
        }

        pub fn stream_then_eof(chunks: Vec<Vec<u8>>) -> (Self, Arc<AtomicUsize>) {
            Self::build(SocketType::Stream, chunks, true)
        }

        pub fn datagram() -> (Self, Arc<AtomicUsize>) {
            Self::build(SocketType::Datagram, Vec::new(), false)
        }
    }

    impl SessionIo for FakeIo {
        fn socket_type(&self) -> SocketType {
            self.kind
        }

        fn recv(&mut self, buf: &mut [u8], _from_socket: bool) -> Result<Inbound> {
            match self.chunks.front_mut() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    chunk.drain(..n);
                    if chunk.is_empty() {
                        self.chunks.pop_front();
                    }
                    Ok(Inbound::Data(n))
                }
                None if self.eof => Ok(Inbound::Closed),
                None => Ok(Inbound::Pending),
            }
        }

        fn send(&mut self, data: &[u8], _peer: Option<SocketAddr>) -> Result<Transfer> {
            Ok(Transfer::Complete(data.len()))
        }

        fn flush(&mut self) -> Result<Transfer> {
            Ok(Transfer::Complete(0))
        }

        fn registration(&self) -> io::Result<Registration> {
            Err(io::Error::from(io::ErrorKind::Unsupported))
        }

        fn close(&mut self) {
            if !self.closed {
                self.closed = true;
                self.closes.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    pub fn fake_session(io: FakeIo) -> Session {
        let peer: SocketAddr = "127.0.0.1:4000".parse().expect("地址");
        Session::new(
            SocketId::from_raw(7),
            SocketId::from_raw(1),
            Some(peer),
            Box::new(io),
            LimitsConfig::default(),
        )
    }
}
