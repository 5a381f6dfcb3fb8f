use std::{fmt, sync::Arc};

use arc_swap::ArcSwap;
use flare_core::{FlareError, Result};
use rustls::ServerConfig;

use crate::channel::RustlsChannel;

/// TLS 服务端配置的热更新容器。
///
/// # 设计动机（Why）
/// - 证书轮换不应要求重建监听器：受理线程每次握手前读取一次快照，替换立即对后续握手可见；
/// - 利用 `ArcSwap` 读无锁、写常数时间的特性实现 RCU 式配置广播。
///
/// # 核心契约（What）
/// - 写入的 `ServerConfig` 必须已装载证书链与私钥；
/// - 进行中的握手持有旧快照的 `Arc`，不受替换影响。
#[derive(Clone)]
pub struct HotTlsConfig {
    inner: Arc<ArcSwap<ServerConfig>>,
}

impl HotTlsConfig {
    pub fn new(initial: Arc<ServerConfig>) -> Self {
        Self {
            inner: Arc::new(ArcSwap::new(initial)),
        }
    }

    #[inline]
    pub fn from_config(initial: ServerConfig) -> Self {
        Self::new(Arc::new(initial))
    }

    /// 当前配置快照。
    #[inline]
    pub fn snapshot(&self) -> Arc<ServerConfig> {
        self.inner.load_full()
    }

    /// 替换配置并返回旧值。
    #[inline]
    pub fn replace(&self, next: Arc<ServerConfig>) -> Arc<ServerConfig> {
        self.inner.swap(next)
    }

    /// 以当前快照创建一条服务端连接对象。
    pub fn server_channel(&self) -> Result<RustlsChannel> {
        let conn = rustls::ServerConnection::new(self.inner.load_full()).map_err(|err| {
            FlareError::Handshake {
                detail: format!("cannot create server connection: {err}"),
            }
        })?;
        Ok(RustlsChannel::server(conn))
    }
}

impl fmt::Debug for HotTlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotTlsConfig").finish_non_exhaustive()
    }
}
