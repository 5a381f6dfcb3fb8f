#![doc = r#"
# flare-core

## 设计动机（Why）
- **定位**：Flare 网络服务器各层共享的最小契约集合：错误码、配置、套接字标识与
  协议集合；
- **架构角色**：位于依赖图最底层，`flare-mux`、`flare-tls`、`flare-server` 都只向下依赖本 crate；
- **设计理念**：瞬时状态不进错误通道，错误码字符串稳定可聚合。

## 核心契约（What）
- [`FlareError`] / [`ErrorCode`]：服务器边界上的全部错误语义；
- [`ServerConfig`]：TOML 可装载的四个工作池规模、握手预算与轮询节拍；
- [`SocketId`] / [`OwnerTag`]：会话表主键与多路复用属主标签；
- [`protocol`]：可插拔分帧协议契约与内置换行协议；
- [`telemetry::install`]：`tracing` 全局 Subscriber 初始化。
"#]

pub mod config;
pub mod error;
pub mod protocol;
pub mod socket;
pub mod telemetry;
mod transfer;

pub use config::ServerConfig;
pub use error::{ErrorCode, FlareError, Result};
pub use protocol::{LineProtocol, ParseOutcome, Priority, Protocol, ProtocolSet};
pub use socket::{AddressFamily, OwnerTag, SocketId, SocketType};
pub use transfer::Transfer;
