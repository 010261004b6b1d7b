//! Where `parallel` regions run.
//!
//! The engine only needs to hand a closure off to some other thread. A tokio
//! runtime [`Handle`] is the usual choice; its blocking pool suits render work,
//! which never awaits. Without an executor, `parallel` bodies render inline.

use std::fmt;
use std::thread;

use tokio::runtime::Handle;

/// A unit of render work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

impl Executor for Handle {
    fn execute(&self, task: Task) {
        self.spawn_blocking(task);
    }
}

/// Spawns an OS thread per task. Useful where no runtime is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn execute(&self, task: Task) {
        if let Err(e) = thread::Builder::new().name("cobble-parallel".to_string()).spawn(task) {
            // the dropped task drops its completer, so the waiting writer reports the failure
            tracing::warn!(target: "cobble::render", "Failed to spawn parallel render thread: {}", e);
        }
    }
}

impl fmt::Debug for dyn Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Executor")
    }
}
