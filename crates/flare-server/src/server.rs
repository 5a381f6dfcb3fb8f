//! # NetworkServer：监听、受理、分发与消费的编排者
//!
//! ## 核心意图（Why）
//! - 持有监听套接字、多路复用器、会话表、受理队列与事件队列，并把它们与四个工作池连接起来：
//!   平台受理池（完成式后端的流传输）、TLS 握手池、I/O 分发池与消费池；
//! - 生命周期为 `Open → Running → Stopping → Closed`，关闭开始后的任何操作都返回
//!   `invalid_context`，不会触碰已拆除的结构。
//!
//! ## 行为契约（What）
//! - 受理：准入回调返回 `Stop` 时立即关闭原始套接字；TLS 传输入受理队列并派发
//!   `TryConnect`，明文传输直接建立会话；
//! - 会话建立：入表 → 派发 `Connect` → 绑定多路复用器 → 立即执行一次 `produce`，
//!   避免边沿触发下握手期间已缓冲的数据无人读取；
//! - 断开拆除：`ready_to_close` 的赢家负责解绑并派发唯一一次 `Disconnect`；
//! - 关闭顺序：监听套接字 → 取消握手并清空受理队列 → 依次停止各工作池 → 拆除残余会话
//!   → 清空事件队列与协议集合。
//!
//! ## 风险提示（Trade-offs）
//! - 用户回调在工作线程上同步执行，阻塞回调会拖慢同池的其它连接；
//! - 由连接一同带来的最后一批字节可能在 `Disconnect` 之后才以 `Read` 交付。

use std::{
    fmt,
    net::{Shutdown, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    thread,
    time::Duration,
};

use arc_swap::ArcSwap;
use flare_core::{
    AddressFamily, FlareError, OwnerTag, ProtocolSet, Result, ServerConfig, SocketId, SocketType,
};
use flare_mux::{Multiplexer, MuxEvent, MuxEventKind, MuxFlavor};
use flare_tls::HandshakeOptions;
use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use crate::{
    accept_queue::{AcceptQueue, AcceptedConnection},
    event::{Admission, AdmissionControl, EventHandler, ServerEvent},
    event_queue::EventQueue,
    io::SessionIo,
    pool::WorkerPool,
    server_socket::{Listening, ServerSocket},
    session::Staged,
    table::{SessionRef, SessionTable},
};

/// 单次消费最多切分的消息数，超出部分重新入队。
const CONSUME_BATCH: usize = 64;

/// 服务器生命周期状态。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum ServerState {
    Closed = 0,
    Open = 1,
    Running = 2,
    Stopping = 3,
}

impl ServerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ServerState::Open,
            2 => ServerState::Running,
            3 => ServerState::Stopping,
            _ => ServerState::Closed,
        }
    }

    pub fn is_live(self) -> bool {
        matches!(self, ServerState::Open | ServerState::Running)
    }
}

/// 各工作池当前的线程数。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WorkerCounts {
    pub accept: usize,
    pub tls: usize,
    pub io: usize,
    pub consumers: usize,
}

/// 网络服务器的构造器。
pub struct ServerBuilder {
    config: ServerConfig,
    protocols: ProtocolSet,
    admission: Option<Arc<dyn AdmissionControl>>,
    flavor: MuxFlavor,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            protocols: ProtocolSet::new(),
            admission: None,
            flavor: MuxFlavor::default(),
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn protocols(mut self, protocols: ProtocolSet) -> Self {
        self.protocols = protocols;
        self
    }

    pub fn admission(mut self, admission: impl AdmissionControl + 'static) -> Self {
        self.admission = Some(Arc::new(admission));
        self
    }

    pub fn multiplexer(mut self, flavor: MuxFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// 打开监听套接字并完成装配；任何一步失败都会逆序回收已创建的资源。
    pub fn open(
        self,
        family: AddressFamily,
        port: u16,
        transport: Arc<dyn ServerSocket>,
        handler: impl EventHandler + 'static,
    ) -> Result<NetworkServer> {
        self.config.validate()?;
        let listening = transport.open(family, port)?;
        let listener = listening.id();
        let local_addr = match listening.local_addr() {
            Ok(addr) => addr,
            Err(err) => {
                transport.close(listening);
                return Err(FlareError::from_io("local_addr", err));
            }
        };
        let mux = match self.flavor.create(self.config.concurrency.max_events) {
            Ok(mux) => mux,
            Err(err) => {
                transport.close(listening);
                return Err(err);
            }
        };

        let shared = Arc::new(Shared {
            state: AtomicU8::new(ServerState::Open as u8),
            handshake: HandshakeOptions::from_config(&self.config.handshake),
            config: self.config,
            transport,
            socket_type: listening.socket_type(),
            listening: RwLock::new(Some(listening)),
            listener,
            local_addr,
            mux,
            sessions: SessionTable::new(),
            accepts: AcceptQueue::new(),
            events: EventQueue::new(),
            protocols: ArcSwap::from_pointee(self.protocols),
            admission: self.admission,
            handler: Arc::new(handler),
        });

        let limit = shared.config.concurrency.max_workers_per_pool;
        let mut server = NetworkServer {
            accept: worker_pool(&shared, "accept", limit, Shared::platform_accept_loop, |_| {}),
            tls: worker_pool(&shared, "tls", limit, Shared::handshake_loop, |shared| {
                shared.accepts.wake_all()
            }),
            io: worker_pool(&shared, "io", limit, Shared::dispatch_loop, |shared| {
                let _ = shared.mux.wake();
            }),
            consumers: worker_pool(&shared, "consumer", limit, Shared::consume_loop, |shared| {
                shared.events.wake_all()
            }),
            shared,
        };
        if let Err(err) = server.wire() {
            warn!(error = %err, code = %err.code(), "server open failed, unwinding");
            server.shutdown();
            return Err(err);
        }
        info!(
            addr = %server.shared.local_addr,
            transport = server.shared.transport.name(),
            backend = ?server.shared.mux.flavor(),
            "server opened"
        );
        Ok(server)
    }
}

fn worker_pool(
    shared: &Arc<Shared>,
    name: &'static str,
    limit: usize,
    routine: fn(&Shared, &AtomicBool),
    wake: fn(&Shared),
) -> WorkerPool {
    let for_routine = Arc::clone(shared);
    let for_wake = Arc::clone(shared);
    WorkerPool::new(
        name,
        limit,
        Arc::new(move |stop: &AtomicBool| routine(&for_routine, stop)),
        Arc::new(move || wake(&for_wake)),
    )
}

/// 工作线程之间共享的服务器上下文。
struct Shared {
    state: AtomicU8,
    config: ServerConfig,
    transport: Arc<dyn ServerSocket>,
    socket_type: SocketType,
    listening: RwLock<Option<Listening>>,
    listener: SocketId,
    local_addr: SocketAddr,
    mux: Arc<dyn Multiplexer>,
    sessions: SessionTable,
    accepts: AcceptQueue<AcceptedConnection>,
    events: EventQueue<SessionRef>,
    protocols: ArcSwap<ProtocolSet>,
    admission: Option<Arc<dyn AdmissionControl>>,
    handler: Arc<dyn EventHandler>,
    handshake: HandshakeOptions,
}

/// TLS 握手池与平台受理池的自适应等待节拍。
struct Backoff {
    fast: Duration,
    slow: Duration,
    current: Duration,
}

impl Backoff {
    fn new(fast: Duration, slow: Duration) -> Self {
        Self {
            fast,
            slow,
            current: fast,
        }
    }

    fn hit(&mut self) {
        self.current = self.fast;
    }

    fn miss(&mut self) {
        self.current = (self.current * 2).clamp(self.fast, self.slow);
    }

    fn tick(&self) -> Duration {
        self.current
    }
}

impl Shared {
    fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn ensure_live(&self) -> Result<()> {
        if self.state().is_live() {
            Ok(())
        } else {
            Err(FlareError::InvalidContext)
        }
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(
            self.config.polling.accept_fast_tick(),
            self.config.polling.accept_slow_tick(),
        )
    }

    fn platform_accept_loop(&self, stop: &AtomicBool) {
        let mut backoff = self.backoff();
        while !stop.load(Ordering::Acquire) {
            if self.accept_ready() > 0 {
                backoff.hit();
            } else {
                backoff.miss();
            }
            thread::sleep(backoff.tick());
        }
    }

    fn handshake_loop(&self, stop: &AtomicBool) {
        let mut backoff = self.backoff();
        while !stop.load(Ordering::Acquire) {
            match self.accepts.pop_timeout(backoff.tick()) {
                Some(connection) => {
                    backoff.hit();
                    self.handshake(connection);
                }
                None => backoff.miss(),
            }
        }
    }

    fn dispatch_loop(&self, stop: &AtomicBool) {
        let timeout = self.config.polling.io_poll_timeout();
        while !stop.load(Ordering::Acquire) {
            if let Err(err) = self.mux.poll_once(timeout, &mut |event| self.dispatch(event)) {
                warn!(error = %err, "multiplexer poll failed");
                thread::sleep(self.config.polling.accept_slow_tick());
            }
        }
    }

    fn consume_loop(&self, stop: &AtomicBool) {
        let wait = self.config.polling.consumer_wait();
        while !stop.load(Ordering::Acquire) {
            if let Some(session) = self.events.pop_timeout(wait) {
                self.consume(session);
            }
        }
    }

    fn dispatch(&self, event: MuxEvent) {
        let socket = SocketId::from(event.owner);
        trace!(socket = %socket, kind = ?event.kind, "dispatching event");
        match event.kind {
            MuxEventKind::Connect => {
                self.accept_ready();
            }
            MuxEventKind::Read { payload } => match payload {
                Some(bytes) => self.produce(socket, Staged::Stream(bytes), false),
                None => self.produce(socket, Staged::None, true),
            },
            MuxEventKind::Datagram { payload, peer } => match (payload, peer) {
                (Some(bytes), Some(peer)) => self.produce(socket, Staged::Datagram(bytes, peer), false),
                _ => self.produce(socket, Staged::None, true),
            },
            MuxEventKind::Disconnect => {
                let _ = self.teardown(socket, "peer disconnected");
            }
        }
    }

    /// 受理全部待受理连接，返回受理数量。
    fn accept_ready(&self) -> usize {
        let mut accepted = 0;
        while self.state().is_live() {
            let next = {
                let listening = self.listening.read();
                let Some(listening) = listening.as_ref() else {
                    break;
                };
                self.transport.accept(listening)
            };
            match next {
                Ok(Some((stream, peer))) => {
                    accepted += 1;
                    self.admit(stream, peer);
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    break;
                }
            }
        }
        accepted
    }

    fn admit(&self, stream: std::net::TcpStream, peer: SocketAddr) {
        let socket = SocketId::of(&stream);
        if let Some(admission) = &self.admission
            && admission.admit(&stream, peer) == Admission::Stop
        {
            warn!(socket = %socket, %peer, "connection rejected by admission control");
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }
        if self.transport.support_tls() {
            self.accepts.push(AcceptedConnection::new(stream, peer));
            self.handler.on_event(ServerEvent::TryConnect { socket, peer });
            return;
        }
        match self.transport.stream_io(stream, &self.config.limits) {
            Ok(io) => self.session_accepted(socket, peer, io),
            Err(err) => warn!(socket = %socket, %peer, error = %err, "cannot prepare accepted stream"),
        }
    }

    fn handshake(&self, connection: AcceptedConnection) {
        let AcceptedConnection {
            socket,
            peer,
            stream,
        } = connection;
        if !self.state().is_live() {
            drop(stream);
            return;
        }
        match self.transport.tls_accept(stream, peer, &self.handshake) {
            Ok(io) => self.session_accepted(socket, peer, io),
            Err(err) => {
                warn!(socket = %socket, %peer, code = %err.code(), error = %err, "tls handshake failed");
            }
        }
    }

    fn session_accepted(&self, socket: SocketId, peer: SocketAddr, io: Box<dyn SessionIo>) {
        let session = match self.sessions.connected(
            socket,
            peer,
            self.listener,
            io,
            self.config.limits.clone(),
        ) {
            Ok(session) => session,
            Err(err) => {
                warn!(socket = %socket, %peer, error = %err, "session rejected");
                return;
            }
        };
        self.handler.on_event(ServerEvent::Connect {
            info: session.info(),
        });

        let bound = session
            .registration()
            .map_err(|err| FlareError::from_io("duplicate socket", err))
            .and_then(|registration| self.mux.bind(socket, registration, OwnerTag::from(socket)));
        if let Err(err) = bound {
            warn!(socket = %socket, error = %err, "cannot bind session to the multiplexer");
            let _ = self.teardown(socket, "bind failed");
            return;
        }

        let from_socket = self.mux.flavor() == MuxFlavor::Readiness;
        self.after_produce(&session, session.produce(Staged::None, from_socket));
    }

    fn produce(&self, socket: SocketId, staged: Staged, from_socket: bool) {
        let Ok(session) = self.sessions.find(socket) else {
            trace!(socket = %socket, "event for a closed session ignored");
            return;
        };
        let outcome = session.produce(staged, from_socket);
        self.after_produce(&session, outcome);
    }

    fn after_produce(&self, session: &SessionRef, outcome: crate::session::ProduceOutcome) {
        if let Some(priority) = outcome.enqueue {
            self.events.push(priority, Arc::clone(session));
        }
        // 仍持有引用，套接字身份不会被复用。
        if outcome.closed {
            let _ = self.teardown(session.socket(), "connection closed");
        }
    }

    fn consume(&self, session: SessionRef) {
        let protocols = self.protocols.load();
        let consumed = session.consume(&protocols, CONSUME_BATCH);
        let info = session.info();
        for message in consumed.messages {
            let event = match (info.socket_type, message.peer) {
                (SocketType::Datagram, Some(peer)) => ServerEvent::Datagram {
                    info,
                    payload: message.payload,
                    session: &session,
                    peer,
                },
                (SocketType::Datagram, None) => continue,
                (SocketType::Stream, peer) => ServerEvent::Read {
                    info,
                    payload: message.payload,
                    session: &session,
                    peer,
                },
            };
            self.handler.on_event(event);
        }
        if let Some(reason) = consumed.fatal {
            warn!(socket = %info.socket, reason, "protocol failure, closing session");
            let _ = self.teardown(info.socket, "protocol failure");
        } else if let Some(priority) = session.settle(consumed.backlog) {
            self.events.push(priority, Arc::clone(&session));
        }
    }

    /// 断开拆除：只有赢得 `ready_to_close` 的调用方派发 `Disconnect`。
    fn teardown(&self, socket: SocketId, reason: &'static str) -> Result<()> {
        let session = self.sessions.ready_to_close(socket)?;
        if let Err(err) = self.mux.unbind(socket) {
            trace!(socket = %socket, error = %err, "session was not bound");
        }
        debug!(socket = %socket, reason, refs = session.ref_count(), "session torn down");
        self.handler.on_event(ServerEvent::Disconnect {
            info: session.info(),
        });
        Ok(())
    }
}

/// 网络服务器句柄。`close` 消费句柄；句柄被丢弃时自动关闭。
pub struct NetworkServer {
    shared: Arc<Shared>,
    accept: WorkerPool,
    tls: WorkerPool,
    io: WorkerPool,
    consumers: WorkerPool,
}

impl NetworkServer {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    fn wire(&self) -> Result<()> {
        let shared = &self.shared;
        let listening = shared.listening.read();
        let Some(listening) = listening.as_ref() else {
            return Err(FlareError::InvalidContext);
        };
        let registration = || {
            listening
                .registration()
                .map_err(|err| FlareError::from_io("duplicate listener", err))
        };
        match shared.socket_type {
            SocketType::Datagram => {
                let io = shared.transport.datagram_io(listening)?;
                shared
                    .sessions
                    .dgram_start(shared.listener, io, shared.config.limits.clone())?;
                shared
                    .mux
                    .bind(shared.listener, registration()?, OwnerTag::from(shared.listener))?;
            }
            SocketType::Stream if shared.mux.flavor().binds_listener() => {
                shared
                    .mux
                    .bind(shared.listener, registration()?, OwnerTag::from(shared.listener))?;
            }
            SocketType::Stream => {
                self.accept.spawn(1)?;
            }
        }
        if shared.transport.support_tls() {
            self.tls.spawn(shared.config.concurrency.tls_accept_workers)?;
        }
        Ok(())
    }

    fn scaled(&self, pool: &WorkerPool, count: usize) -> Result<usize> {
        self.shared.ensure_live()?;
        let started = pool.spawn(count)?;
        let _ = self.shared.state.compare_exchange(
            ServerState::Open as u8,
            ServerState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        Ok(started)
    }

    fn accept_side(&self) -> Option<&WorkerPool> {
        if self.shared.transport.support_tls() {
            Some(&self.tls)
        } else if self.shared.socket_type == SocketType::Stream
            && !self.shared.mux.flavor().binds_listener()
        {
            Some(&self.accept)
        } else {
            None
        }
    }

    /// 扩充受理侧：TLS 传输扩充握手池，完成式后端的明文流扩充平台受理池。
    pub fn run_accept(&self, count: usize) -> Result<usize> {
        match self.accept_side() {
            Some(pool) => self.scaled(pool, count),
            None => {
                self.shared.ensure_live()?;
                debug!("accepts are driven by the I/O pool for this transport");
                Ok(0)
            }
        }
    }

    pub fn run_io(&self, count: usize) -> Result<usize> {
        self.scaled(&self.io, count)
    }

    pub fn run_consumers(&self, count: usize) -> Result<usize> {
        self.scaled(&self.consumers, count)
    }

    pub fn stop_accept(&self, count: usize) -> Result<usize> {
        self.shared.ensure_live()?;
        Ok(self.accept_side().map_or(0, |pool| pool.retire(count)))
    }

    pub fn stop_io(&self, count: usize) -> Result<usize> {
        self.shared.ensure_live()?;
        Ok(self.io.retire(count))
    }

    pub fn stop_consumers(&self, count: usize) -> Result<usize> {
        self.shared.ensure_live()?;
        Ok(self.consumers.retire(count))
    }

    /// 按配置启动 I/O 分发与消费线程。
    pub fn start(&self) -> Result<()> {
        let concurrency = &self.shared.config.concurrency;
        self.run_io(concurrency.io_workers)?;
        self.run_consumers(concurrency.consumer_workers)?;
        Ok(())
    }

    pub fn state(&self) -> ServerState {
        self.shared.state()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    /// 监听套接字身份；数据报传输下也是唯一会话的身份。
    pub fn listener(&self) -> SocketId {
        self.shared.listener
    }

    pub fn worker_counts(&self) -> WorkerCounts {
        WorkerCounts {
            accept: self.accept.active(),
            tls: self.tls.active(),
            io: self.io.active(),
            consumers: self.consumers.active(),
        }
    }

    /// 可跨线程共享的轻量句柄，供回调内部使用。
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn session(&self, socket: SocketId) -> Result<SessionRef> {
        self.handle().session(socket)
    }

    pub fn close_session(&self, socket: SocketId) -> Result<()> {
        self.handle().close_session(socket)
    }

    pub fn replace_protocols(&self, protocols: ProtocolSet) -> Result<()> {
        self.handle().replace_protocols(protocols)
    }

    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let shared = Arc::clone(&self.shared);
        let previous = ServerState::from_u8(
            shared
                .state
                .swap(ServerState::Stopping as u8, Ordering::AcqRel),
        );
        if !previous.is_live() {
            shared.state.store(previous as u8, Ordering::Release);
            return;
        }
        info!(addr = %shared.local_addr, "server closing");

        if let Some(listening) = shared.listening.write().take() {
            let _ = shared.mux.unbind(shared.listener);
            shared.transport.close(listening);
        }

        shared.transport.tls_stop_accept();
        let pending = force_close(shared.accepts.drain());
        shared.accepts.wake_all();

        self.accept.retire_all();
        self.tls.retire_all();
        self.io.retire_all();
        self.consumers.retire_all();
        let late = force_close(shared.accepts.drain());

        let sessions = shared.sessions.drain();
        let torn_down = sessions.len();
        for session in sessions {
            let _ = shared.mux.unbind(session.socket());
            shared.handler.on_event(ServerEvent::Disconnect {
                info: session.info(),
            });
        }
        let queued = shared.events.clear();
        shared.protocols.store(Arc::new(ProtocolSet::new()));
        shared.state.store(ServerState::Closed as u8, Ordering::Release);
        info!(
            addr = %shared.local_addr,
            sessions = torn_down,
            unhandshaked = pending + late,
            queued,
            "server closed"
        );
    }
}

fn force_close(connections: Vec<AcceptedConnection>) -> usize {
    let count = connections.len();
    for connection in connections {
        debug!(socket = %connection.socket, peer = %connection.peer, "closing unhandshaked connection");
        let _ = connection.stream.shutdown(Shutdown::Both);
    }
    count
}

impl Drop for NetworkServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for NetworkServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkServer")
            .field("addr", &self.shared.local_addr)
            .field("state", &self.state())
            .field("sessions", &self.shared.sessions.len())
            .field("workers", &self.worker_counts())
            .finish()
    }
}

/// 服务器的共享句柄，服务器关闭后所有操作返回 `invalid_context`。
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    pub fn state(&self) -> ServerState {
        self.shared.state()
    }

    pub fn session(&self, socket: SocketId) -> Result<SessionRef> {
        self.shared.ensure_live()?;
        self.shared.sessions.find(socket)
    }

    /// 应用主动发起的断开拆除。
    pub fn close_session(&self, socket: SocketId) -> Result<()> {
        self.shared.ensure_live()?;
        self.shared.teardown(socket, "closed by application")
    }

    /// 替换协议集合；已固定协议的会话按下标继续使用新集合。
    pub fn replace_protocols(&self, protocols: ProtocolSet) -> Result<()> {
        self.shared.ensure_live()?;
        debug!(protocols = ?protocols, "protocol set replaced");
        self.shared.protocols.store(Arc::new(protocols));
        Ok(())
    }

    pub fn sessions(&self) -> usize {
        self.shared.sessions.len()
    }
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("addr", &self.shared.local_addr)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_slow_tick() {
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(10));
        assert_eq!(backoff.tick(), Duration::from_millis(1));
        backoff.miss();
        assert_eq!(backoff.tick(), Duration::from_millis(2));
        for _ in 0..10 {
            backoff.miss();
        }
        assert_eq!(backoff.tick(), Duration::from_millis(10));
        backoff.hit();
        assert_eq!(backoff.tick(), Duration::from_millis(1), "取到连接后回到快节拍");
    }

    #[test]
    fn state_round_trips_through_the_atomic() {
        for state in [
            ServerState::Closed,
            ServerState::Open,
            ServerState::Running,
            ServerState::Stopping,
        ] {
            assert_eq!(ServerState::from_u8(state as u8), state);
        }
        assert!(ServerState::Running.is_live());
        assert!(!ServerState::Stopping.is_live());
    }
}
