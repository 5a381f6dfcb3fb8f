//! # Session：单条逻辑连接的运行期状态
//!
//! ## 核心意图（Why）
//! - 会话持有套接字端点（明文、TLS 或数据报）、对端地址与流重组缓冲，是 I/O 分发线程与
//!   消费线程之间唯一共享的连接状态；
//! - 以 `Arc<Session>` 表达引用计数，以 `registered` 标志表达“仍在会话表中”，二者同时
//!   失效（已出表且计数归零）时才真正销毁、关闭套接字。
//!
//! ## 行为契约（What）
//! - [`Session::produce`]：在 I/O 线程上把套接字（或完成式后端交来的字节）读入重组缓冲，
//!   有新数据且尚未排队时给出入队优先级；
//! - [`Session::consume`]：在消费线程上用协议集合切分消息，并按多级反馈调整优先级；
//! - 两者可并发调用：锁顺序固定为 `io` → `inbox`，`consume` 只持有 `inbox`；
//! - 调度权从 `produce` 入队起，一直保持到回调派发结束后的 [`Session::settle`]，
//!   同一会话因此任一时刻只被一个消费线程服务，消息按到达顺序交付。
//!
//! ## 风险提示（Trade-offs）
//! - 入站缓冲上限由 `[limits] max_buffered` 约束，超出即视为连接致命；
//! - `produce` 期间 `send` 会等待 `io` 锁，回调中的发送因此可能被一次读排空所延迟。

use std::{
    collections::VecDeque,
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
    },
};

use bytes::{Bytes, BytesMut};
use flare_core::{
    ParseOutcome, Priority, ProtocolSet, Result, SocketId, SocketType, Transfer,
    config::LimitsConfig,
};
use flare_mux::Registration;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    event::SocketInfo,
    io::{Inbound, SessionIo},
};

/// 完成式后端已经读出的数据。
#[derive(Clone, Debug, Default)]
pub enum Staged {
    #[default]
    None,
    Stream(Bytes),
    Datagram(Bytes, SocketAddr),
}

/// 一次 `produce` 的结果。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ProduceOutcome {
    /// 需要以该优先级推入事件队列。
    pub enqueue: Option<Priority>,
    /// 连接已结束，调用方需走断开拆除路径。
    pub closed: bool,
}

/// 协议切分出的一条应用消息。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    pub payload: Bytes,
    pub peer: Option<SocketAddr>,
}

/// 一次 `consume` 的结果。
#[derive(Debug, Default)]
pub struct Consumed {
    pub messages: Vec<Message>,
    /// 协议层判定连接不可恢复时的原因。
    pub fatal: Option<String>,
    /// 派发完成后交还给 [`Session::settle`]。
    pub backlog: Backlog,
}

/// 一次消费留下的积压情况。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Backlog {
    more: bool,
    seen: u64,
}

impl Backlog {
    /// 批量上限截断后缓冲中仍有完整消息。
    pub fn has_more(&self) -> bool {
        self.more
    }
}

#[derive(Debug, Default)]
struct Inbox {
    buffer: BytesMut,
    pinned: Option<usize>,
    datagrams: VecDeque<(Bytes, SocketAddr)>,
    datagram_bytes: usize,
    scratch: Vec<u8>,
}

enum Step {
    Frame {
        protocol: usize,
        consumed: usize,
        payload: std::ops::Range<usize>,
        priority: Option<Priority>,
    },
    NeedMore,
    Fatal(String),
}

/// 单条连接（或数据报监听）的会话。
pub struct Session {
    socket: SocketId,
    listener: SocketId,
    peer: Option<SocketAddr>,
    socket_type: SocketType,
    secure: bool,
    limits: LimitsConfig,
    io: Mutex<Box<dyn SessionIo>>,
    inbox: Mutex<Inbox>,
    registered: AtomicBool,
    scheduled: AtomicBool,
    arrivals: AtomicU64,
    level: AtomicU8,
}

impl Session {
    pub fn new(
        socket: SocketId,
        listener: SocketId,
        peer: Option<SocketAddr>,
        io: Box<dyn SessionIo>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            socket,
            listener,
            peer,
            socket_type: io.socket_type(),
            secure: io.is_secure(),
            limits,
            io: Mutex::new(io),
            inbox: Mutex::new(Inbox::default()),
            registered: AtomicBool::new(false),
            scheduled: AtomicBool::new(false),
            arrivals: AtomicU64::new(0),
            level: AtomicU8::new(Priority::DEFAULT.level() as u8),
        }
    }

    pub fn socket(&self) -> SocketId {
        self.socket
    }

    pub fn listener(&self) -> SocketId {
        self.listener
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn info(&self) -> SocketInfo {
        SocketInfo {
            socket: self.socket,
            listener: self.listener,
            peer: self.peer,
            socket_type: self.socket_type,
            secure: self.secure,
        }
    }

    /// 当前的多级反馈优先级。
    pub fn priority(&self) -> Priority {
        Priority::new(self.level.load(Ordering::Acquire))
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// 当前存活的引用数量。
    pub fn ref_count(self: &Arc<Self>) -> usize {
        Arc::strong_count(self)
    }

    /// 已缓冲、尚未被协议消费的入站字节数。
    pub fn buffered(&self) -> usize {
        let inbox = self.inbox.lock();
        inbox.buffer.len() + inbox.datagram_bytes
    }

    pub(crate) fn mark_registered(&self) {
        self.registered.store(true, Ordering::Release);
    }

    /// 置为“已出表”，返回此前是否在表中。
    pub(crate) fn mark_unregistered(&self) -> bool {
        self.registered.swap(false, Ordering::AcqRel)
    }

    /// 多路复用器绑定所需的句柄副本。
    pub(crate) fn registration(&self) -> std::io::Result<Registration> {
        self.io.lock().registration()
    }

    /// 发送应用数据。
    pub fn send(&self, data: &[u8]) -> Result<Transfer> {
        self.io.lock().send(data, None)
    }

    /// 向指定对端发送数据报；流会话忽略 `peer`。
    pub fn send_to(&self, data: &[u8], peer: SocketAddr) -> Result<Transfer> {
        self.io.lock().send(data, Some(peer))
    }

    /// 读取入站数据到重组缓冲。
    ///
    /// `from_socket` 为假时不触碰套接字，只处理 `staged` 与端点内部缓冲。
    pub fn produce(&self, staged: Staged, from_socket: bool) -> ProduceOutcome {
        let (arrived, closed) = {
            let mut io = self.io.lock();
            let mut inbox = self.inbox.lock();
            match self.pump(io.as_mut(), &mut inbox, staged, from_socket) {
                Ok(progress) => progress,
                // 监听会话承载所有对端，单次收包失败不结束它。
                Err(err) if self.socket_type == SocketType::Datagram => {
                    warn!(socket = %self.socket, error = %err, "datagram receive failed");
                    (0, false)
                }
                Err(err) => {
                    warn!(socket = %self.socket, error = %err, code = %err.code(), "session read failed");
                    (0, true)
                }
            }
        };
        if arrived > 0 {
            self.arrivals.fetch_add(1, Ordering::SeqCst);
        }
        let enqueue = (arrived > 0 && !closed && !self.scheduled.swap(true, Ordering::SeqCst))
            .then(|| self.priority());
        trace!(socket = %self.socket, arrived, closed, queued = enqueue.is_some(), "session produced");
        ProduceOutcome { enqueue, closed }
    }

    fn pump(
        &self,
        io: &mut dyn SessionIo,
        inbox: &mut Inbox,
        staged: Staged,
        from_socket: bool,
    ) -> Result<(usize, bool)> {
        let mut arrived = 0;
        match staged {
            Staged::None => {}
            Staged::Stream(bytes) => {
                if let Some(plain) = io.absorb(bytes)? {
                    arrived += plain.len();
                    inbox.buffer.extend_from_slice(&plain);
                }
            }
            Staged::Datagram(bytes, peer) => {
                if self.queue_datagram(inbox, bytes, peer) {
                    arrived += 1;
                }
            }
        }
        io.flush()?;

        let chunk = match self.socket_type {
            SocketType::Stream => self.limits.read_chunk,
            SocketType::Datagram => self.limits.max_datagram,
        };
        let mut scratch = std::mem::take(&mut inbox.scratch);
        if scratch.len() < chunk {
            scratch.resize(chunk, 0);
        }
        let drained = self.drain(io, inbox, &mut scratch[..chunk], from_socket, &mut arrived);
        inbox.scratch = scratch;
        drained.map(|closed| (arrived, closed))
    }

    /// 读到“会阻塞”为止，返回连接是否已结束。
    fn drain(
        &self,
        io: &mut dyn SessionIo,
        inbox: &mut Inbox,
        scratch: &mut [u8],
        from_socket: bool,
        arrived: &mut usize,
    ) -> Result<bool> {
        loop {
            match io.recv(scratch, from_socket)? {
                Inbound::Data(0) | Inbound::Pending => return Ok(false),
                Inbound::Data(n) => {
                    inbox.buffer.extend_from_slice(&scratch[..n]);
                    *arrived += n;
                    if inbox.buffer.len() > self.limits.max_buffered {
                        warn!(
                            socket = %self.socket,
                            buffered = inbox.buffer.len(),
                            limit = self.limits.max_buffered,
                            "inbound buffer limit exceeded"
                        );
                        return Ok(true);
                    }
                }
                Inbound::Datagram { len, peer } => {
                    let bytes = Bytes::copy_from_slice(&scratch[..len]);
                    if self.queue_datagram(inbox, bytes, peer) {
                        *arrived += 1;
                    }
                }
                Inbound::Closed => {
                    debug!(socket = %self.socket, "peer closed the connection");
                    return Ok(true);
                }
            }
        }
    }

    fn queue_datagram(&self, inbox: &mut Inbox, bytes: Bytes, peer: SocketAddr) -> bool {
        if inbox.datagram_bytes + bytes.len() > self.limits.max_buffered {
            debug!(socket = %self.socket, %peer, len = bytes.len(), "datagram dropped, backlog full");
            return false;
        }
        inbox.datagram_bytes += bytes.len();
        inbox.datagrams.push_back((bytes, peer));
        true
    }

    /// 用协议集合切分至多 `batch` 条消息。
    ///
    /// 调度权仍由调用方持有，派发完消息后须以 `backlog` 调用 [`Session::settle`]。
    pub fn consume(&self, protocols: &ProtocolSet, batch: usize) -> Consumed {
        let seen = self.arrivals.load(Ordering::SeqCst);
        let mut consumed = Consumed::default();
        let mut assigned = None;
        let more = {
            let mut inbox = self.inbox.lock();
            match self.socket_type {
                SocketType::Stream => {
                    self.consume_stream(&mut inbox, protocols, batch, &mut consumed, &mut assigned)
                }
                SocketType::Datagram => {
                    self.consume_datagrams(&mut inbox, protocols, batch, &mut consumed, &mut assigned)
                }
            }
        };

        let current = self.priority();
        let next = match assigned {
            Some(priority) => priority,
            None if consumed.messages.is_empty() => current.demote(),
            None => current.promote(),
        };
        self.level.store(next.level() as u8, Ordering::Release);
        consumed.backlog = Backlog { more, seen };
        trace!(
            socket = %self.socket,
            messages = consumed.messages.len(),
            level = next.level(),
            "session consumed"
        );
        consumed
    }

    /// 交还调度权。仍有积压，或派发期间到达了新数据时，返回重新入队的优先级。
    pub fn settle(&self, backlog: Backlog) -> Option<Priority> {
        self.scheduled.store(false, Ordering::SeqCst);
        let arrived = self.arrivals.load(Ordering::SeqCst) != backlog.seen;
        ((backlog.more || arrived) && !self.scheduled.swap(true, Ordering::SeqCst))
            .then(|| self.priority())
    }

    fn consume_stream(
        &self,
        inbox: &mut Inbox,
        protocols: &ProtocolSet,
        batch: usize,
        out: &mut Consumed,
        assigned: &mut Option<Priority>,
    ) -> bool {
        if protocols.is_empty() {
            if !inbox.buffer.is_empty() {
                out.messages.push(Message {
                    payload: inbox.buffer.split().freeze(),
                    peer: self.peer,
                });
            }
            return false;
        }
        while out.messages.len() < batch && !inbox.buffer.is_empty() {
            match parse_stream(protocols, inbox.pinned, &inbox.buffer) {
                Step::Frame {
                    protocol,
                    consumed,
                    payload,
                    priority,
                } => {
                    if inbox.pinned.is_none() {
                        debug!(socket = %self.socket, protocol, "protocol pinned");
                    }
                    inbox.pinned = Some(protocol);
                    let frame = inbox.buffer.split_to(consumed).freeze();
                    out.messages.push(Message {
                        payload: frame.slice(payload),
                        peer: self.peer,
                    });
                    if priority.is_some() {
                        *assigned = priority;
                    }
                }
                Step::NeedMore => return false,
                Step::Fatal(reason) => {
                    out.fatal = Some(reason);
                    return false;
                }
            }
        }
        !inbox.buffer.is_empty()
    }

    fn consume_datagrams(
        &self,
        inbox: &mut Inbox,
        protocols: &ProtocolSet,
        batch: usize,
        out: &mut Consumed,
        assigned: &mut Option<Priority>,
    ) -> bool {
        while out.messages.len() < batch {
            let Some((datagram, peer)) = inbox.datagrams.pop_front() else {
                return false;
            };
            inbox.datagram_bytes -= datagram.len();
            if protocols.is_empty() {
                out.messages.push(Message {
                    payload: datagram,
                    peer: Some(peer),
                });
                continue;
            }
            match parse_stream(protocols, None, &datagram) {
                Step::Frame {
                    consumed,
                    payload,
                    priority,
                    ..
                } => {
                    out.messages.push(Message {
                        payload: datagram.slice(..consumed).slice(payload),
                        peer: Some(peer),
                    });
                    if priority.is_some() {
                        *assigned = priority;
                    }
                }
                Step::NeedMore | Step::Fatal(_) => {
                    debug!(socket = %self.socket, %peer, len = datagram.len(), "unparseable datagram dropped");
                }
            }
        }
        !inbox.datagrams.is_empty()
    }
}

/// 依次询问协议；已固定协议的会话只询问该协议。
fn parse_stream(protocols: &ProtocolSet, pinned: Option<usize>, buffered: &[u8]) -> Step {
    if let Some(index) = pinned {
        let Some(protocol) = protocols.get(index) else {
            return Step::Fatal(format!("pinned protocol #{index} was removed"));
        };
        return match protocol.try_parse(buffered) {
            ParseOutcome::Message {
                consumed,
                payload,
                priority,
            } => frame(protocol.name(), index, buffered, consumed, payload, priority),
            ParseOutcome::NeedMore => Step::NeedMore,
            ParseOutcome::NoMatch => {
                Step::Fatal(format!("protocol {} no longer matches the stream", protocol.name()))
            }
            ParseOutcome::Invalid(reason) => {
                Step::Fatal(format!("protocol {} rejected the stream: {reason}", protocol.name()))
            }
        };
    }

    let mut need_more = false;
    let mut invalid = None;
    for (index, protocol) in protocols.iter().enumerate() {
        match protocol.try_parse(buffered) {
            ParseOutcome::Message {
                consumed,
                payload,
                priority,
            } => return frame(protocol.name(), index, buffered, consumed, payload, priority),
            ParseOutcome::NeedMore => need_more = true,
            ParseOutcome::NoMatch => {}
            ParseOutcome::Invalid(reason) => {
                invalid.get_or_insert_with(|| format!("protocol {} rejected the stream: {reason}", protocol.name()));
            }
        }
    }
    if need_more {
        Step::NeedMore
    } else {
        Step::Fatal(invalid.unwrap_or_else(|| "no protocol matches the stream".to_owned()))
    }
}

fn frame(
    name: &str,
    protocol: usize,
    buffered: &[u8],
    consumed: usize,
    payload: std::ops::Range<usize>,
    priority: Option<Priority>,
) -> Step {
    if consumed == 0 || consumed > buffered.len() || payload.start > payload.end || payload.end > consumed {
        return Step::Fatal(format!(
            "protocol {name} returned a malformed frame (consumed {consumed}, payload {payload:?})"
        ));
    }
    Step::Frame {
        protocol,
        consumed,
        payload,
        priority,
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("socket", &self.socket)
            .field("peer", &self.peer)
            .field("socket_type", &self.socket_type)
            .field("secure", &self.secure)
            .field("registered", &self.is_registered())
            .field("level", &self.priority().level())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.io.get_mut().close();
        debug!(socket = %self.socket, "session destroyed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use flare_core::{LineProtocol, Protocol};
    use tracing_test::traced_test;

    use super::*;
    use crate::test_support::{FakeIo, fake_session};

    fn lines() -> ProtocolSet {
        ProtocolSet::new().with(LineProtocol::default())
    }

    #[test]
    fn produce_enqueues_once_until_consumed() {
        let (io, _closes) = FakeIo::stream(vec![b"one\ntw".to_vec()]);
        let session = fake_session(io);
        let first = session.produce(Staged::None, true);
        assert_eq!(first.enqueue, Some(Priority::DEFAULT));
        assert!(!first.closed);

        let again = session.produce(Staged::Stream(Bytes::from_static(b"o\n")), false);
        assert_eq!(again.enqueue, None, "已排队的会话不重复入队");

        let consumed = session.consume(&lines(), 16);
        let payloads: Vec<&[u8]> = consumed.messages.iter().map(|m| &m.payload[..]).collect();
        assert_eq!(payloads, vec![&b"one"[..], &b"two"[..]]);
        assert!(consumed.fatal.is_none());
        assert_eq!(session.priority(), Priority::DEFAULT.promote(), "产出消息后提升一级");
        assert_eq!(session.buffered(), 0);
    }

    #[test]
    fn idle_consume_demotes() {
        let (io, _closes) = FakeIo::stream(vec![b"partial".to_vec()]);
        let session = fake_session(io);
        session.produce(Staged::None, true);
        let consumed = session.consume(&lines(), 16);
        assert!(consumed.messages.is_empty());
        assert!(consumed.fatal.is_none(), "不完整的帧只需等待");
        assert_eq!(session.priority(), Priority::DEFAULT.demote());
    }

    #[test]
    fn batch_limit_requests_a_requeue() {
        let (io, _closes) = FakeIo::stream(vec![b"a\nb\nc\n".to_vec()]);
        let session = fake_session(io);
        session.produce(Staged::None, true);
        let consumed = session.consume(&lines(), 2);
        assert_eq!(consumed.messages.len(), 2);
        assert!(consumed.backlog.has_more());
        assert!(session.settle(consumed.backlog).is_some(), "剩余消息需要重新入队");
        let rest = session.consume(&lines(), 2);
        assert_eq!(rest.messages.len(), 1);
        assert_eq!(session.settle(rest.backlog), None);
    }

    #[test]
    fn data_arriving_during_dispatch_waits_for_settle() {
        let (io, _closes) = FakeIo::stream(vec![b"one\n".to_vec()]);
        let session = fake_session(io);
        assert!(session.produce(Staged::None, true).enqueue.is_some());
        let consumed = session.consume(&lines(), 16);
        assert_eq!(consumed.messages.len(), 1);

        // 回调尚未结束，新到的数据不能让会话被第二个消费线程取走。
        let during = session.produce(Staged::Stream(Bytes::from_static(b"two\n")), false);
        assert_eq!(during.enqueue, None, "派发期间不得重复入队");
        assert_eq!(session.settle(consumed.backlog), Some(session.priority()));

        let rest = session.consume(&lines(), 16);
        let payloads: Vec<&[u8]> = rest.messages.iter().map(|m| &m.payload[..]).collect();
        assert_eq!(payloads, vec![&b"two"[..]]);
        assert_eq!(session.settle(rest.backlog), None, "没有新数据时释放调度权");
        let later = session.produce(Staged::Stream(Bytes::from_static(b"three\n")), false);
        assert!(later.enqueue.is_some(), "释放后新数据重新入队");
    }

    #[test]
    fn unmatched_stream_is_fatal() {
        struct Never;
        impl Protocol for Never {
            fn name(&self) -> &str {
                "never"
            }
            fn try_parse(&self, _buffered: &[u8]) -> ParseOutcome {
                ParseOutcome::NoMatch
            }
        }
        let (io, _closes) = FakeIo::stream(vec![b"hello\n".to_vec()]);
        let session = fake_session(io);
        session.produce(Staged::None, true);
        let consumed = session.consume(&ProtocolSet::new().with(Never), 16);
        assert!(consumed.messages.is_empty());
        assert!(consumed.fatal.is_some(), "所有协议都不匹配时连接不可恢复");
    }

    #[test]
    fn empty_protocol_set_passes_bytes_through() {
        let (io, _closes) = FakeIo::stream(vec![b"raw bytes".to_vec()]);
        let session = fake_session(io);
        session.produce(Staged::None, true);
        let consumed = session.consume(&ProtocolSet::new(), 16);
        assert_eq!(consumed.messages.len(), 1);
        assert_eq!(&consumed.messages[0].payload[..], b"raw bytes");
    }

    #[test]
    fn end_of_stream_is_reported_as_closed() {
        let (io, _closes) = FakeIo::stream_then_eof(vec![b"bye\n".to_vec()]);
        let session = fake_session(io);
        let outcome = session.produce(Staged::None, true);
        assert!(outcome.closed);
        assert_eq!(outcome.enqueue, None);
    }

    #[test]
    #[traced_test]
    fn buffer_limit_is_connection_fatal() {
        let (io, _closes) = FakeIo::stream(vec![vec![b'x'; 64]]);
        let limits = LimitsConfig {
            read_chunk: 16,
            max_buffered: 32,
            max_datagram: 64,
        };
        let session = Session::new(SocketId::from_raw(9), SocketId::from_raw(1), None, Box::new(io), limits);
        assert!(session.produce(Staged::None, true).closed);
        assert!(logs_contain("inbound buffer limit exceeded"));
    }

    #[test]
    fn unparseable_datagrams_are_dropped() {
        let (io, _closes) = FakeIo::datagram();
        let session = fake_session(io);
        let peer: SocketAddr = "127.0.0.1:5000".parse().expect("地址");
        session.produce(Staged::Datagram(Bytes::from_static(b"no newline"), peer), false);
        session.produce(Staged::Datagram(Bytes::from_static(b"ping\n"), peer), false);
        let consumed = session.consume(&lines(), 16);
        assert!(consumed.fatal.is_none(), "数据报会话从不因协议失败而拆除");
        assert_eq!(consumed.messages.len(), 1);
        assert_eq!(&consumed.messages[0].payload[..], b"ping");
        assert_eq!(consumed.messages[0].peer, Some(peer));
    }

    #[test]
    fn endpoint_is_closed_exactly_once_on_final_release() {
        let (io, closes) = FakeIo::stream(Vec::new());
        let session = Arc::new(fake_session(io));
        let extra = Arc::clone(&session);
        assert_eq!(session.ref_count(), 2);
        drop(session);
        assert_eq!(closes.load(Ordering::SeqCst), 0, "仍有引用时不得关闭");
        drop(extra);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
