//! 两种后端共用的 mio 反应器：注册表、令牌分配、唤醒器与“锁内收集、锁外分发”的轮询。

use std::{collections::HashMap, io, time::Duration};

use flare_core::{FlareError, OwnerTag, Result, SocketId};
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::registration::{Reader, Registration, SourceKind};

const WAKE_TOKEN: Token = Token(0);

pub(crate) struct Reactor {
    poller: Mutex<Poller>,
    registry: Registry,
    waker: Waker,
    table: Mutex<BindTable>,
    capacity: usize,
}

struct Poller {
    poll: Poll,
    events: Events,
}

#[derive(Default)]
struct BindTable {
    by_token: HashMap<Token, Bound>,
    by_socket: HashMap<SocketId, Token>,
    // 令牌单调递增，解绑后重新绑定同一描述符也不会收到旧令牌的残留事件。
    next_token: usize,
}

struct Bound {
    owner: OwnerTag,
    registration: Registration,
}

/// 一条锁外待分发的就绪记录。
pub(crate) struct Readiness {
    pub owner: OwnerTag,
    pub kind: SourceKind,
    pub reader: Reader,
    pub readable: bool,
    pub hangup: bool,
}

impl Reactor {
    pub(crate) fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(FlareError::invalid_parameter("multiplexer capacity must be > 0"));
        }
        let poll = Poll::new().map_err(|source| FlareError::Io { op: "poll create", source })?;
        let registry = poll
            .registry()
            .try_clone()
            .map_err(|source| FlareError::Io { op: "registry clone", source })?;
        let waker = Waker::new(poll.registry(), WAKE_TOKEN)
            .map_err(|source| FlareError::Io { op: "waker create", source })?;
        Ok(Self {
            poller: Mutex::new(Poller {
                poll,
                events: Events::with_capacity(capacity),
            }),
            registry,
            waker,
            table: Mutex::new(BindTable::default()),
            capacity,
        })
    }

    pub(crate) fn bind(
        &self,
        socket: SocketId,
        mut registration: Registration,
        owner: OwnerTag,
        interest: Interest,
    ) -> Result<()> {
        let mut table = self.table.lock();
        if table.by_socket.contains_key(&socket) {
            return Err(FlareError::invalid_parameter(format!(
                "socket {socket} is already bound"
            )));
        }
        if table.by_socket.len() >= self.capacity {
            return Err(FlareError::invalid_parameter(format!(
                "multiplexer capacity {} exhausted",
                self.capacity
            )));
        }
        table.next_token += 1;
        let token = Token(table.next_token);
        // 持表锁注册：轮询线程若抢先收到该令牌的事件，会在查表时等待插入完成。
        self.registry
            .register(&mut registration, token, interest)
            .map_err(|source| FlareError::Io { op: "register", source })?;
        table.by_token.insert(token, Bound { owner, registration });
        table.by_socket.insert(socket, token);
        trace!(%socket, token = token.0, "socket bound");
        Ok(())
    }

    pub(crate) fn unbind(&self, socket: SocketId) -> Result<()> {
        let bound = {
            let mut table = self.table.lock();
            let token = table
                .by_socket
                .remove(&socket)
                .ok_or_else(|| FlareError::not_found(format!("bound socket {socket}")))?;
            table.by_token.remove(&token)
        };
        if let Some(mut bound) = bound {
            if let Err(err) = self.registry.deregister(&mut bound.registration) {
                debug!(%socket, ?err, "deregister failed; dropping handle anyway");
            }
        }
        trace!(%socket, "socket unbound");
        Ok(())
    }

    pub(crate) fn bound(&self) -> usize {
        self.table.lock().by_socket.len()
    }

    /// 单轮轮询。
    ///
    /// 多个 I/O 分发线程共享同一个 `Poll`：拿不到轮询锁的线程最多等待 `timeout` 后空手返回，
    /// 从而保证每个线程都能在有界时间内复查自己的停止标志。
    pub(crate) fn poll_ready(&self, timeout: Duration) -> Result<Vec<Readiness>> {
        let raw: Vec<(Token, bool, bool)> = {
            let Some(mut poller) = self.poller.try_lock_for(timeout) else {
                return Ok(Vec::new());
            };
            let Poller { poll, events } = &mut *poller;
            match poll.poll(events, Some(timeout)) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
                Err(source) => return Err(FlareError::Io { op: "poll", source }),
            }
            events
                .iter()
                .filter(|event| event.token() != WAKE_TOKEN)
                .map(|event| {
                    let hangup =
                        event.is_read_closed() || event.is_write_closed() || event.is_error();
                    let ready = event.is_readable() || event.is_writable();
                    (event.token(), ready, hangup)
                })
                .collect()
        };

        let table = self.table.lock();
        Ok(raw
            .into_iter()
            .filter_map(|(token, readable, hangup)| {
                table.by_token.get(&token).map(|bound| Readiness {
                    owner: bound.owner,
                    kind: bound.registration.kind(),
                    reader: bound.registration.reader(),
                    readable,
                    hangup,
                })
            })
            .collect())
    }

    pub(crate) fn wake(&self) -> Result<()> {
        self.waker
            .wake()
            .map_err(|source| FlareError::Io { op: "wake", source })
    }
}
