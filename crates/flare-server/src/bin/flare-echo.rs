//! 行回显服务器：演示 `flare-server` 的装配方式，也用于手工压测。
//!
//! # 使用方法
//! ```bash
//! cargo run --bin flare-echo -- echo.toml
//! ```
//! 配置文件示例：
//! ```toml
//! [listen]
//! family = "loopback"
//! port = 7000
//! transport = "tls"        # tcp | tls | udp
//! backend = "readiness"    # readiness | completion
//!
//! [tls]
//! cert = "server.pem"
//! key = "server.key"
//!
//! [concurrency]
//! consumer_workers = 4
//! ```
//! 其余节（`concurrency` / `handshake` / `polling` / `limits`）与库配置同名同义。
//! 标准输入关闭（Ctrl-D）后服务器有序关闭。

use std::{
    env,
    io::{self, Read},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, bail};
use flare_core::{
    AddressFamily, LineProtocol, ProtocolSet, ServerConfig,
    config::{ConcurrencyConfig, HandshakeConfig, LimitsConfig, PollingConfig},
    telemetry,
};
use flare_mux::MuxFlavor;
use flare_server::{
    NetworkServer, ServerEvent, ServerSocket, TcpServerSocket, TlsServerSocket, UdpServerSocket,
};
use flare_tls::{HotTlsConfig, pem};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct EchoConfig {
    listen: ListenConfig,
    tls: Option<TlsFiles>,
    concurrency: ConcurrencyConfig,
    handshake: HandshakeConfig,
    polling: PollingConfig,
    limits: LimitsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ListenConfig {
    family: AddressFamily,
    port: u16,
    transport: TransportKind,
    backend: Backend,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            family: AddressFamily::Loopback,
            port: 7000,
            transport: TransportKind::Tcp,
            backend: Backend::Readiness,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
enum TransportKind {
    Tcp,
    Tls,
    Udp,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Backend {
    Readiness,
    Completion,
}

impl From<Backend> for MuxFlavor {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Readiness => MuxFlavor::Readiness,
            Backend::Completion => MuxFlavor::Completion,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TlsFiles {
    cert: PathBuf,
    key: PathBuf,
}

impl EchoConfig {
    fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置失败: {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("解析配置失败: {}", path.display()))
    }

    fn server_config(&self) -> anyhow::Result<ServerConfig> {
        let config = ServerConfig {
            concurrency: self.concurrency.clone(),
            handshake: self.handshake.clone(),
            polling: self.polling.clone(),
            limits: self.limits.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    fn transport(&self) -> anyhow::Result<Arc<dyn ServerSocket>> {
        Ok(match (self.listen.transport, &self.tls) {
            (TransportKind::Tcp, _) => Arc::new(TcpServerSocket::new()),
            (TransportKind::Udp, _) => Arc::new(UdpServerSocket),
            (TransportKind::Tls, Some(files)) => {
                let config = pem::server_config_from_pem(&files.cert, &files.key)?;
                Arc::new(TlsServerSocket::new(HotTlsConfig::from_config(config)))
            }
            (TransportKind::Tls, None) => bail!("transport = \"tls\" 需要 [tls] cert/key"),
        })
    }
}

fn echo(event: ServerEvent<'_>) {
    let sent = match &event {
        ServerEvent::Read {
            payload, session, ..
        } => {
            let mut line = payload.to_vec();
            line.push(b'\n');
            session.send(&line)
        }
        ServerEvent::Datagram {
            payload,
            session,
            peer,
            ..
        } => session.send_to(payload, *peer),
        ServerEvent::Connect { info } => {
            info!(socket = %info.socket, peer = ?info.peer, secure = info.secure, "client connected");
            return;
        }
        ServerEvent::Disconnect { info } => {
            info!(socket = %info.socket, "client disconnected");
            return;
        }
        ServerEvent::TryConnect { .. } => return,
    };
    if let Err(err) = sent {
        warn!(socket = %event.socket(), error = %err, "echo failed");
    }
}

fn run() -> anyhow::Result<()> {
    telemetry::install("info")?;
    let path = env::args_os().nth(1).map(PathBuf::from);
    let config = EchoConfig::load(path.as_deref())?;
    let server_config = config.server_config()?;
    let transport = config.transport()?;

    let server = NetworkServer::builder()
        .config(server_config)
        .protocols(ProtocolSet::new().with(LineProtocol::default()))
        .multiplexer(config.listen.backend.into())
        .open(config.listen.family, config.listen.port, transport, echo)?;
    server.start()?;
    info!(addr = %server.local_addr(), "echo server ready; close stdin to stop");

    let mut sink = Vec::new();
    io::stdin()
        .read_to_end(&mut sink)
        .context("读取标准输入失败")?;
    server.close();
    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("flare-echo 失败: {error:#}");
        std::process::exit(1);
    }
}
