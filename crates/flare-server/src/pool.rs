//! # 工作线程池
//!
//! ## 角色定位（Why）
//! - 服务器的四类工作者（平台受理、TLS 握手、I/O 分发、消费）都是“循环执行同一例程直到
//!   被要求停止”的 OS 线程，只在唤醒方式上不同；
//! - 池的规模在运行期按调用累加：`spawn(3)` 两次再 `retire(3)` 一次，剩余 3 个。
//!
//! ## 契约（What）
//! - 每个工作者拥有独立的停止标志；`retire(n)` 为最近启动的 `n` 个工作者各置位一次，
//!   调用一次唤醒钩子，再逐个 join；
//! - 例程需在有界等待之间检查停止标志，唤醒钩子只负责缩短等待。

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
};

use flare_core::{FlareError, Result};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// 工作者例程：循环直到停止标志置位。
pub type Routine = Arc<dyn Fn(&AtomicBool) + Send + Sync>;

/// 唤醒阻塞中的工作者。
pub type WakeHook = Arc<dyn Fn() + Send + Sync>;

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// 同构工作者的可伸缩集合。
pub struct WorkerPool {
    name: &'static str,
    limit: usize,
    routine: Routine,
    wake: WakeHook,
    workers: Mutex<Vec<Worker>>,
    spawned: AtomicUsize,
}

impl WorkerPool {
    pub fn new(name: &'static str, limit: usize, routine: Routine, wake: WakeHook) -> Self {
        Self {
            name,
            limit,
            routine,
            wake,
            workers: Mutex::new(Vec::new()),
            spawned: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 追加至多 `count` 个工作者，超过上限的部分被忽略；返回实际启动的数量。
    pub fn spawn(&self, count: usize) -> Result<usize> {
        let mut workers = self.workers.lock();
        let room = self.limit.saturating_sub(workers.len());
        let wanted = count.min(room);
        for _ in 0..wanted {
            let index = self.spawned.fetch_add(1, Ordering::Relaxed);
            let stop = Arc::new(AtomicBool::new(false));
            let routine = Arc::clone(&self.routine);
            let flag = Arc::clone(&stop);
            let handle = thread::Builder::new()
                .name(format!("flare-{}-{index}", self.name))
                .spawn(move || routine(&flag))
                .map_err(|err| FlareError::from_io("spawn worker", err))?;
            workers.push(Worker { stop, handle });
        }
        if wanted < count {
            debug!(pool = self.name, requested = count, started = wanted, "pool limit reached");
        }
        if wanted > 0 {
            info!(pool = self.name, started = wanted, workers = workers.len(), "pool scaled up");
        }
        Ok(wanted)
    }

    /// 停止并 join 最近启动的至多 `count` 个工作者；返回实际停止的数量。
    pub fn retire(&self, count: usize) -> usize {
        let retiring: Vec<Worker> = {
            let mut workers = self.workers.lock();
            let keep = workers.len().saturating_sub(count);
            workers.split_off(keep)
        };
        if retiring.is_empty() {
            return 0;
        }
        for worker in &retiring {
            worker.stop.store(true, Ordering::Release);
            (self.wake)();
        }
        let retired = retiring.len();
        for worker in retiring {
            if worker.handle.join().is_err() {
                warn!(pool = self.name, "worker panicked before retiring");
            }
        }
        info!(pool = self.name, retired, workers = self.active(), "pool scaled down");
        retired
    }

    pub fn retire_all(&self) -> usize {
        self.retire(usize::MAX)
    }

    pub fn active(&self) -> usize {
        self.workers.lock().len()
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("limit", &self.limit)
            .field("active", &self.active())
            .finish()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.retire_all();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::{Condvar, Mutex};

    use super::*;

    struct Bell {
        rung: Mutex<u64>,
        signal: Condvar,
    }

    fn bell_pool(limit: usize) -> (WorkerPool, Arc<AtomicUsize>) {
        let bell = Arc::new(Bell {
            rung: Mutex::new(0),
            signal: Condvar::new(),
        });
        let running = Arc::new(AtomicUsize::new(0));
        let routine: Routine = {
            let bell = Arc::clone(&bell);
            let running = Arc::clone(&running);
            Arc::new(move |stop: &AtomicBool| {
                running.fetch_add(1, Ordering::SeqCst);
                let mut rung = bell.rung.lock();
                while !stop.load(Ordering::Acquire) {
                    bell.signal.wait_for(&mut rung, Duration::from_secs(5));
                }
                drop(rung);
                running.fetch_sub(1, Ordering::SeqCst);
            })
        };
        let wake: WakeHook = {
            let bell = Arc::clone(&bell);
            Arc::new(move || {
                *bell.rung.lock() += 1;
                bell.signal.notify_all();
            })
        };
        (WorkerPool::new("test", limit, routine, wake), running)
    }

    #[test]
    fn scaling_is_additive() {
        let (pool, running) = bell_pool(16);
        assert_eq!(pool.spawn(3).expect("启动"), 3);
        assert_eq!(pool.spawn(3).expect("启动"), 3);
        assert_eq!(pool.retire(3), 3);
        assert_eq!(pool.active(), 3, "run 3 两次再 stop 3 一次应剩 3 个");
        assert_eq!(pool.retire_all(), 3);
        assert_eq!(running.load(Ordering::SeqCst), 0, "被停止的线程必须已退出");
    }

    #[test]
    fn spawn_is_capped_by_the_limit() {
        let (pool, _running) = bell_pool(2);
        assert_eq!(pool.spawn(5).expect("启动"), 2);
        assert_eq!(pool.spawn(1).expect("启动"), 0, "超过上限为空操作");
        assert_eq!(pool.retire(10), 2);
        assert_eq!(pool.retire(1), 0);
    }

    #[test]
    fn workers_carry_pool_thread_names() {
        let names = Arc::new(Mutex::new(Vec::new()));
        let routine: Routine = {
            let names = Arc::clone(&names);
            Arc::new(move |_stop: &AtomicBool| {
                if let Some(name) = thread::current().name() {
                    names.lock().push(name.to_owned());
                }
            })
        };
        let pool = WorkerPool::new("io", 4, routine, Arc::new(|| {}));
        pool.spawn(2).expect("启动");
        pool.retire_all();
        let mut names = names.lock().clone();
        names.sort();
        assert_eq!(names, vec!["flare-io-0".to_owned(), "flare-io-1".to_owned()]);
    }
}
