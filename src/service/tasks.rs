use dashmap::DashMap;
use std::future::Future;
use tokio::task::AbortHandle;

/// 后台任务句柄表, 按用途分键
///
/// 同键新任务会先中止旧任务; 表被丢弃时中止全部任务,
/// 因此组件卸载后不会再有迟到的状态写入.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: DashMap<&'static str, AbortHandle>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, key: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel(key);
        let handle = tokio::spawn(fut);
        self.tasks.insert(key, handle.abort_handle());
    }

    pub fn cancel(&self, key: &'static str) -> bool {
        match self.tasks.remove(key) {
            Some((_, handle)) => {
                handle.abort();
                tracing::debug!("cancelled task `{}`", key);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
        self.tasks.clear();
    }

    pub fn is_running(&self, key: &'static str) -> bool {
        self.tasks
            .get(key)
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
