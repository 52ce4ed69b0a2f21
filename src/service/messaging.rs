use crate::client::{MessageStream, MessagingBackend};
use crate::error::{FinanceError, Result};
use crate::models::{Message, Thread, UnreadSummary};
use crate::service::tasks::TaskRegistry;
use futures::StreamExt;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const STREAM_TASK: &str = "thread-stream";
const POLL_TASK: &str = "unread-poll";

/// 消息面板状态
#[derive(Debug, Clone, Default)]
pub struct PanelState {
    pub threads: IndexMap<String, Thread>,
    pub active_thread: Option<String>,
    /// 当前线程消息, 按到达顺序, 以 message_id 去重
    pub messages: IndexMap<String, Message>,
    pub unread: UnreadSummary,
    pub stream_connected: bool,
    pub error: Option<String>,
    generation: u64,
}

impl PanelState {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn mark_local_read(&mut self, thread_id: &str) {
        if let Some(t) = self.threads.get_mut(thread_id) {
            t.unread_count = 0;
        }
        if let Some(n) = self.unread.by_thread.remove(thread_id) {
            self.unread.total_unread = self.unread.total_unread.saturating_sub(n);
        }
    }

    fn apply_unread(&mut self, summary: UnreadSummary) {
        for (id, thread) in self.threads.iter_mut() {
            thread.unread_count = summary.by_thread.get(id).copied().unwrap_or(0);
        }
        self.unread = summary;
    }

    /// 追加消息, 已存在返回 false
    fn push_message(&mut self, msg: Message) -> bool {
        if let Some(t) = self.threads.get_mut(&msg.thread_id) {
            if t.last_message_at.map_or(true, |at| at < msg.created_at) {
                t.last_message_at = Some(msg.created_at);
            }
        }
        self.messages.insert(msg.message_id.clone(), msg).is_none()
    }
}

/// 消息面板
///
/// 同一时刻只保持一个线程的实时订阅; 切换线程时先关闭旧订阅再打开新订阅.
/// 面板被丢弃时所有后台任务随 `TaskRegistry` 一起中止.
pub struct MessagingPanel {
    backend: Arc<dyn MessagingBackend>,
    state: Arc<Mutex<PanelState>>,
    tasks: TaskRegistry,
}

impl MessagingPanel {
    pub fn new(backend: Arc<dyn MessagingBackend>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(PanelState::default())),
            tasks: TaskRegistry::new(),
        }
    }

    pub async fn snapshot(&self) -> PanelState {
        self.state.lock().await.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.tasks.is_running(STREAM_TASK)
    }

    pub async fn dismiss_error(&self) {
        self.state.lock().await.error = None;
    }

    async fn record_error(&self, e: &FinanceError) {
        self.state.lock().await.error = Some(e.to_string());
    }

    pub async fn load_threads(&self) -> Result<()> {
        match self.backend.list_threads().await {
            Ok(threads) => {
                let mut st = self.state.lock().await;
                st.threads = threads
                    .into_iter()
                    .map(|t| (t.thread_id.clone(), t))
                    .collect();
                Ok(())
            }
            Err(e) => {
                self.record_error(&e).await;
                Err(e)
            }
        }
    }

    /// 打开线程: 拉历史, 标记已读, 订阅实时流
    pub async fn open_thread(&self, thread_id: &str) -> Result<()> {
        let generation = {
            let mut st = self.state.lock().await;
            self.tasks.cancel(STREAM_TASK);
            st.generation += 1;
            st.active_thread = Some(thread_id.to_string());
            st.messages.clear();
            st.stream_connected = false;
            st.error = None;
            st.generation
        };

        let result = self.attach(thread_id, generation).await;
        if let Err(e) = &result {
            tracing::warn!("opening thread {} failed: {}", thread_id, e);
            self.record_error(e).await;
        }
        result
    }

    async fn attach(&self, thread_id: &str, generation: u64) -> Result<()> {
        let mut history = self.backend.list_messages(thread_id).await?;
        history.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        {
            let mut st = self.state.lock().await;
            if st.generation != generation {
                return Ok(());
            }
            for msg in history {
                st.push_message(msg);
            }
        }

        mark_read(self.backend.as_ref(), &self.state, thread_id).await;

        let stream = self.backend.subscribe_thread(thread_id).await?;
        // 代次检查与登记任务在同一把锁内, 迟到的旧订阅不会替换新任务
        let mut st = self.state.lock().await;
        if st.generation != generation {
            tracing::debug!("discarding stale subscription to thread {}", thread_id);
            return Ok(());
        }
        st.stream_connected = true;
        self.tasks.spawn(
            STREAM_TASK,
            pump(
                stream,
                Arc::clone(&self.backend),
                Arc::clone(&self.state),
                thread_id.to_string(),
                generation,
            ),
        );
        Ok(())
    }

    pub async fn close_thread(&self) {
        let mut st = self.state.lock().await;
        self.tasks.cancel(STREAM_TASK);
        st.generation += 1;
        st.active_thread = None;
        st.messages.clear();
        st.stream_connected = false;
    }

    pub async fn send_message(&self, body: &str) -> Result<Message> {
        let body = body.trim();
        let (thread_id, generation) = {
            let st = self.state.lock().await;
            match &st.active_thread {
                Some(id) => (id.clone(), st.generation),
                None => return Err(FinanceError::validation("Open a conversation first")),
            }
        };
        if body.is_empty() {
            return Err(FinanceError::validation("Message cannot be empty"));
        }
        match self.backend.send_message(&thread_id, body).await {
            Ok(msg) => {
                let mut st = self.state.lock().await;
                if st.generation == generation {
                    st.push_message(msg.clone());
                }
                Ok(msg)
            }
            Err(e) => {
                self.record_error(&e).await;
                Err(e)
            }
        }
    }

    pub async fn refresh_unread(&self) -> Result<UnreadSummary> {
        refresh_unread(self.backend.as_ref(), &self.state).await
    }

    /// 周期性刷新未读数
    pub fn start_unread_poll(&self, period: Duration) {
        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        self.tasks.spawn(POLL_TASK, async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = refresh_unread(backend.as_ref(), &state).await {
                    tracing::warn!("unread poll failed: {}", e);
                }
            }
        });
    }

    pub fn stop_unread_poll(&self) {
        self.tasks.cancel(POLL_TASK);
    }

    pub fn shutdown(&self) {
        self.tasks.cancel_all();
    }
}

async fn refresh_unread(
    backend: &dyn MessagingBackend,
    state: &Mutex<PanelState>,
) -> Result<UnreadSummary> {
    let summary = backend.unread_summary().await?;
    let mut st = state.lock().await;
    st.apply_unread(summary.clone());
    if let Some(active) = st.active_thread.clone() {
        st.mark_local_read(&active);
    }
    Ok(summary)
}

async fn mark_read(backend: &dyn MessagingBackend, state: &Mutex<PanelState>, thread_id: &str) {
    match backend.mark_thread_read(thread_id).await {
        Ok(()) => state.lock().await.mark_local_read(thread_id),
        Err(e) => tracing::warn!("marking thread {} read failed: {}", thread_id, e),
    }
}

/// 订阅循环: 只接受当前代次、当前线程的消息
async fn pump(
    mut stream: MessageStream,
    backend: Arc<dyn MessagingBackend>,
    state: Arc<Mutex<PanelState>>,
    thread_id: String,
    generation: u64,
) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(msg) if msg.thread_id == thread_id => {
                let is_new = {
                    let mut st = state.lock().await;
                    if st.generation != generation {
                        return;
                    }
                    st.push_message(msg)
                };
                if is_new {
                    mark_read(backend.as_ref(), &state, &thread_id).await;
                }
            }
            Ok(msg) => {
                tracing::debug!(
                    "dropping message {} for thread {} on stream {}",
                    msg.message_id,
                    msg.thread_id,
                    thread_id
                );
            }
            Err(e) => tracing::warn!("thread {} stream error: {}", thread_id, e),
        }
    }

    tracing::info!("thread {} stream closed", thread_id);
    let mut st = state.lock().await;
    if st.generation == generation {
        st.stream_connected = false;
    }
}
