#![doc = r#"
# flare-tls

## 设计动机（Why）
- **定位**：握手引擎。一个 [`HandshakeEngine`] 包裹一条 TLS/DTLS 连接，在非阻塞套接字上
  按加密库给出的“需要读 / 需要写”信号推进有界重试握手，并提供可拆分子步骤的读写；
- **架构角色**：服务器的 TLS 受理线程在这里完成握手，会话随后持有引擎做加解密；
- **边界**：记录层加密、密钥交换属于外部加密库，经 [`SecureChannel`] 接入。TLS 由 rustls
  提供；DTLS 通过 [`DatagramChannel`] 接入任何支持无状态 cookie 的实现。

## 核心契约（What）
- 失败语义：中途断开 ⇒ `disconnect`；其余握手失败或预算耗尽 ⇒ `error_handshake` / `error_connect`；
  “会阻塞”从不作为错误，而是 [`Transfer::Pending`](flare_core::Transfer::Pending)；
- [`HotTlsConfig`]：`ArcSwap` 承载的服务端配置，证书热更无需重建监听器。
"#]

mod channel;
mod engine;
mod hot_reload;
pub mod pem;
mod socket;
mod wait;

pub use channel::{
    ChannelError, DatagramChannel, ListenVerdict, PacketState, RustlsChannel, SecureChannel,
};
pub use engine::{EngineFlags, HandshakeEngine, HandshakeOptions, ReadSteps, SendSteps};
pub use hot_reload::HotTlsConfig;
pub use socket::EngineSocket;

/// rustls 支撑的 TLS 流引擎。
pub type TlsEngine = HandshakeEngine<RustlsChannel>;
