//! 日志初始化。
//!
//! # 教案式说明
//! - **意图 (Why)**：演示程序与集成环境只需调用一次 [`install`] 即可获得结构化日志；
//! - **逻辑 (How)**：`RUST_LOG` 存在时以其为过滤规则，否则回落到调用方给出的缺省指令；
//!   组装 `fmt` 层后设置为全局 Subscriber；
//! - **契约 (What)**：全局 Subscriber 已被他人设置时返回错误而非 panic。

use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// 日志安装失败。
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log directive `{directive}`: {source}")]
    Directive {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("global tracing subscriber already installed: {0}")]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}

/// 安装全局 `fmt + EnvFilter` Subscriber。
pub fn install(default_directive: &str) -> Result<(), TelemetryError> {
    let filter = build_env_filter(default_directive)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .try_init()?;
    Ok(())
}

fn build_env_filter(default_directive: &str) -> Result<EnvFilter, TelemetryError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_directive).map_err(|source| {
            TelemetryError::Directive {
                directive: default_directive.to_owned(),
                source,
            }
        }),
    }
}
