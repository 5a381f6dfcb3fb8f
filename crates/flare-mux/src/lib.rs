#![doc = r#"
# flare-mux

## 设计动机（Why）
- **定位**：把操作系统的多路复用机制收敛为一个 [`Multiplexer`] trait，服务器编排层只面向
  [`MuxEvent`] 编程；
- **两种后端**：[`ReadinessMux`] 只报告“可读”，由会话自行读取；[`CompletionMux`]
  由后端读出数据并显式上报断开，模拟完成式 I/O 的事件形态。两者在启动期通过
  [`MuxFlavor::create`] 选择。

## 核心契约（What）
- `bind` 把套接字副本连同不透明的 [`OwnerTag`](flare_core::OwnerTag) 交给后端；同一套接字重复绑定、
  超出容量、在完成式后端上绑定监听套接字，均返回 `invalid_parameter`；
- `poll_once` 在后端锁内收集事件、锁外分发，多个 I/O 分发线程可以共享同一后端；
- `wake` 是停止路径上的“打断”原语，使并发的 `poll_once` 及时返回。

## 风险与考量（Trade-offs）
- 两个后端都建立在 mio 的边沿触发语义之上：就绪式后端要求会话把数据读到 `WouldBlock`，
  完成式后端在分发前自行排空套接字。
"#]

mod completion;
mod event;
mod reactor;
mod readiness;
mod registration;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use flare_core::{OwnerTag, Result, SocketId};

pub use completion::CompletionMux;
pub use event::{MuxEvent, MuxEventKind};
pub use readiness::ReadinessMux;
pub use registration::{Registration, SourceKind};

/// 后端种类。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum MuxFlavor {
    #[default]
    Readiness,
    Completion,
}

impl MuxFlavor {
    /// 构造对应后端，`capacity` 限制可跟踪的套接字数量。
    pub fn create(self, capacity: usize) -> Result<Arc<dyn Multiplexer>> {
        Ok(match self {
            MuxFlavor::Readiness => Arc::new(ReadinessMux::new(capacity)?),
            MuxFlavor::Completion => Arc::new(CompletionMux::new(capacity)?),
        })
    }

    /// 监听套接字能否绑定进该后端；不能时服务器需启动专用的受理线程。
    pub fn binds_listener(self) -> bool {
        matches!(self, MuxFlavor::Readiness)
    }
}

/// 多路复用适配器。
pub trait Multiplexer: Send + Sync {
    fn flavor(&self) -> MuxFlavor;

    /// 绑定套接字副本与属主标签。
    fn bind(&self, socket: SocketId, registration: Registration, owner: OwnerTag) -> Result<()>;

    /// 解绑并释放副本；未绑定的套接字返回 `not_found`。
    fn unbind(&self, socket: SocketId) -> Result<()>;

    /// 执行一轮事件投递，返回投递的事件数。
    fn poll_once(&self, timeout: Duration, sink: &mut dyn FnMut(MuxEvent)) -> Result<usize>;

    /// 打断正在进行的 `poll_once`。
    fn wake(&self) -> Result<()>;

    /// 当前绑定的套接字数量。
    fn bound(&self) -> usize;

    /// 循环投递事件直到观察到 `stop`。
    fn run(
        &self,
        stop: &AtomicBool,
        timeout: Duration,
        sink: &mut dyn FnMut(MuxEvent),
    ) -> Result<()> {
        while !stop.load(Ordering::Acquire) {
            self.poll_once(timeout, sink)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::{Duration, Instant};

    use super::{MuxEvent, Multiplexer};

    /// 反复轮询直到 `done` 满足或超时，返回收集到的全部事件。
    pub fn poll_until(
        mux: &dyn Multiplexer,
        mut done: impl FnMut(&[MuxEvent]) -> bool,
    ) -> Vec<MuxEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = Vec::new();
        while Instant::now() < deadline && !done(&seen) {
            mux.poll_once(Duration::from_millis(50), &mut |event| seen.push(event))
                .expect("轮询不应失败");
        }
        seen
    }
}
