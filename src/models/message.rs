use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 会话线程
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub thread_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub load_id: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub thread_id: String,
    pub sender_uid: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// 未读汇总 (轮询兜底)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnreadSummary {
    #[serde(default)]
    pub total_unread: u32,
    #[serde(default)]
    pub by_thread: HashMap<String, u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub body: String,
}
