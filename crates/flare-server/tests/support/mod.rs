//! 集成测试共用的记录器、回显回调与回环客户端工具。

#![allow(dead_code)]

use std::{
    io::{BufRead, BufReader, Write},
    net::{SocketAddr, TcpStream},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use flare_core::{LineProtocol, ProtocolSet, ServerConfig, SocketId};
use flare_server::ServerEvent;
use parking_lot::Mutex;

/// 回调观察到的一条事件。
#[derive(Clone, Debug)]
pub struct Seen {
    pub name: &'static str,
    pub socket: SocketId,
    pub secure: bool,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct Recorder {
    log: Mutex<Vec<Seen>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, event: &ServerEvent<'_>) {
        let (secure, payload) = match event {
            ServerEvent::TryConnect { .. } => (false, Vec::new()),
            ServerEvent::Connect { info } | ServerEvent::Disconnect { info } => {
                (info.secure, Vec::new())
            }
            ServerEvent::Read { info, payload, .. } | ServerEvent::Datagram { info, payload, .. } => {
                (info.secure, payload.to_vec())
            }
        };
        self.log.lock().push(Seen {
            name: event.name(),
            socket: event.socket(),
            secure,
            payload,
        });
    }

    pub fn snapshot(&self) -> Vec<Seen> {
        self.log.lock().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.log.lock().iter().filter(|seen| seen.name == name).count()
    }

    pub fn count_for(&self, name: &str, socket: SocketId) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|seen| seen.name == name && seen.socket == socket)
            .count()
    }

    /// 第 `index` 个 `Connect` 的会话身份。
    pub fn connected(&self, index: usize) -> Option<SocketId> {
        self.log
            .lock()
            .iter()
            .filter(|seen| seen.name == "connect")
            .nth(index)
            .map(|seen| seen.socket)
    }
}

/// 记录全部事件，并把每条消息加上换行回写给发送方。
pub fn echo_handler(recorder: Arc<Recorder>) -> impl for<'a> Fn(ServerEvent<'a>) + Send + Sync + 'static {
    move |event: ServerEvent<'_>| {
        recorder.record(&event);
        match event {
            ServerEvent::Read {
                payload, session, ..
            } => {
                let mut line = payload.to_vec();
                line.push(b'\n');
                let _ = session.send(&line);
            }
            ServerEvent::Datagram {
                payload,
                session,
                peer,
                ..
            } => {
                let _ = session.send_to(&payload, peer);
            }
            _ => {}
        }
    }
}

pub fn line_protocols() -> ProtocolSet {
    ProtocolSet::new().with(LineProtocol::default())
}

/// 节拍调快的配置，缩短测试中的空闲等待。
pub fn quick_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.polling.io_poll_timeout_ms = 20;
    config.polling.consumer_wait_ms = 20;
    config.polling.accept_slow_tick_ms = 10;
    config
}

/// 在期限内反复检查条件。
pub fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("连接服务器");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("设置读超时");
    stream
}

/// 读取 `count` 行回显。
pub fn read_lines(stream: &TcpStream, count: usize) -> Vec<String> {
    let mut reader = BufReader::new(stream);
    let mut lines = Vec::with_capacity(count);
    for _ in 0..count {
        let mut line = String::new();
        let n = reader.read_line(&mut line).expect("读取回显");
        assert!(n > 0, "连接在收齐回显前被关闭");
        lines.push(line.trim_end().to_owned());
    }
    lines
}

pub fn send(mut stream: &TcpStream, data: &[u8]) {
    stream.write_all(data).expect("写入请求");
}
