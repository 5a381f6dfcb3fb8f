//! 服务器配置：TOML 装载、默认值与一致性校验。
//!
//! # 教案式说明
//! - **意图 (Why)**：四个工作池的规模、握手重试预算与轮询节拍都属于部署期调优参数，
//!   统一收敛到一个 `serde` 结构，避免散落在构造函数参数中；
//! - **契约 (What)**：所有字段均可省略，缺省值与对外文档一致（1024 并发事件、1 个 TLS
//!   受理线程、1 个 I/O 分发线程、2 个消费线程）；装载后必须调用 [`ServerConfig::validate`]；
//! - **风险 (Trade-offs)**：节拍参数只影响空闲 CPU 与握手延迟，不构成正确性契约。

use std::{path::Path, time::Duration};

use serde::Deserialize;

use crate::error::{FlareError, Result};

/// 顶层配置。
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub concurrency: ConcurrencyConfig,
    pub handshake: HandshakeConfig,
    pub polling: PollingConfig,
    pub limits: LimitsConfig,
}

/// 工作池规模。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ConcurrencyConfig {
    /// 多路复用器可跟踪的套接字上限，同时决定事件缓冲容量。
    pub max_events: usize,
    pub tls_accept_workers: usize,
    pub io_workers: usize,
    pub consumer_workers: usize,
    /// 单个池可扩容到的线程上限，超出部分的 `run` 调用为空操作。
    pub max_workers_per_pool: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_events: 1024,
            tls_accept_workers: 1,
            io_workers: 1,
            consumer_workers: 2,
            max_workers_per_pool: 64,
        }
    }
}

/// 握手重试预算。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct HandshakeConfig {
    /// 单次握手最多推进的轮数。
    pub max_attempts: u32,
    /// 每轮等待套接字可读/可写的上限。
    pub attempt_timeout_ms: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 64,
            attempt_timeout_ms: 250,
        }
    }
}

impl HandshakeConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

/// 各工作线程的等待节拍。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PollingConfig {
    pub accept_fast_tick_ms: u64,
    pub accept_slow_tick_ms: u64,
    pub consumer_wait_ms: u64,
    pub io_poll_timeout_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            accept_fast_tick_ms: 1,
            accept_slow_tick_ms: 50,
            consumer_wait_ms: 50,
            io_poll_timeout_ms: 100,
        }
    }
}

impl PollingConfig {
    pub fn accept_fast_tick(&self) -> Duration {
        Duration::from_millis(self.accept_fast_tick_ms)
    }

    pub fn accept_slow_tick(&self) -> Duration {
        Duration::from_millis(self.accept_slow_tick_ms)
    }

    pub fn consumer_wait(&self) -> Duration {
        Duration::from_millis(self.consumer_wait_ms)
    }

    pub fn io_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.io_poll_timeout_ms)
    }
}

/// 单会话资源上限。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// 单次从套接字读取的字节数。
    pub read_chunk: usize,
    /// 会话入站缓冲上限，超出视为连接致命。
    pub max_buffered: usize,
    pub max_datagram: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            read_chunk: 16 * 1024,
            max_buffered: 1024 * 1024,
            max_datagram: 65_535,
        }
    }
}

impl ServerConfig {
    /// 从 TOML 文本装载并校验。
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ServerConfig = toml::from_str(text)
            .map_err(|err| FlareError::invalid_parameter(format!("config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件装载并校验。
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|source| FlareError::Io { op: "read config", source })?;
        Self::from_toml_str(&text)
    }

    /// 校验字段间约束。
    ///
    /// - 所有计数与容量必须非零；
    /// - 初始线程数不得超过 `max_workers_per_pool`；
    /// - 快节拍不得大于慢节拍。
    pub fn validate(&self) -> Result<()> {
        let c = &self.concurrency;
        let nonzero = [
            ("concurrency.max_events", c.max_events),
            ("concurrency.tls_accept_workers", c.tls_accept_workers),
            ("concurrency.io_workers", c.io_workers),
            ("concurrency.consumer_workers", c.consumer_workers),
            ("concurrency.max_workers_per_pool", c.max_workers_per_pool),
            ("limits.read_chunk", self.limits.read_chunk),
            ("limits.max_buffered", self.limits.max_buffered),
            ("limits.max_datagram", self.limits.max_datagram),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(FlareError::invalid_parameter(format!("{name} must be > 0")));
            }
        }
        for (name, value) in [
            ("tls_accept_workers", c.tls_accept_workers),
            ("io_workers", c.io_workers),
            ("consumer_workers", c.consumer_workers),
        ] {
            if value > c.max_workers_per_pool {
                return Err(FlareError::invalid_parameter(format!(
                    "concurrency.{name} ({value}) exceeds max_workers_per_pool ({})",
                    c.max_workers_per_pool
                )));
            }
        }
        if self.handshake.max_attempts == 0 {
            return Err(FlareError::invalid_parameter(
                "handshake.max_attempts must be > 0",
            ));
        }
        if self.polling.accept_fast_tick_ms > self.polling.accept_slow_tick_ms {
            return Err(FlareError::invalid_parameter(
                "polling.accept_fast_tick_ms must not exceed accept_slow_tick_ms",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServerConfig::from_toml_str("").expect("空配置应使用缺省值");
        assert_eq!(config.concurrency.max_events, 1024);
        assert_eq!(config.concurrency.tls_accept_workers, 1);
        assert_eq!(config.concurrency.io_workers, 1);
        assert_eq!(config.concurrency.consumer_workers, 2);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = ServerConfig::from_toml_str(
            r#"
            [concurrency]
            consumer_workers = 4

            [polling]
            accept_slow_tick_ms = 20
            "#,
        )
        .expect("部分配置应可装载");
        assert_eq!(config.concurrency.consumer_workers, 4);
        assert_eq!(config.concurrency.io_workers, 1);
        assert_eq!(config.polling.accept_slow_tick(), Duration::from_millis(20));
        assert_eq!(config.polling.accept_fast_tick_ms, 1);
    }

    #[test]
    fn rejects_inconsistent_values() {
        let zero = ServerConfig::from_toml_str("[concurrency]\nio_workers = 0\n")
            .expect_err("零线程必须被拒绝");
        assert_eq!(zero.code(), ErrorCode::InvalidParameter);

        let ticks = ServerConfig::from_toml_str(
            "[polling]\naccept_fast_tick_ms = 100\naccept_slow_tick_ms = 10\n",
        )
        .expect_err("快节拍大于慢节拍必须被拒绝");
        assert_eq!(ticks.code(), ErrorCode::InvalidParameter);

        let unknown = ServerConfig::from_toml_str("[concurrency]\nthreads = 3\n")
            .expect_err("未知字段必须被拒绝");
        assert_eq!(unknown.code(), ErrorCode::InvalidParameter);
    }
}
