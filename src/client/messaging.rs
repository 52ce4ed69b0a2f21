use super::{decode_entity, decode_list, sse, ApiClient, MessageStream, MessagingBackend};
use crate::error::Result;
use crate::models::{Message, NewMessage, Thread, UnreadSummary};
use async_trait::async_trait;

#[async_trait]
impl MessagingBackend for ApiClient {
    async fn list_threads(&self) -> Result<Vec<Thread>> {
        let value = self
            .get_json::<_, ()>(&["messaging", "threads"], None)
            .await?;
        decode_list(value, "threads")
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        let value = self
            .get_json::<_, ()>(&["messaging", "threads", thread_id, "messages"], None)
            .await?;
        decode_list(value, "messages")
    }

    async fn send_message(&self, thread_id: &str, body: &str) -> Result<Message> {
        let req = NewMessage {
            body: body.to_string(),
        };
        let value = self
            .post_json(&["messaging", "threads", thread_id, "messages"], Some(&req))
            .await?;
        decode_entity(value, "message")
    }

    async fn mark_thread_read(&self, thread_id: &str) -> Result<()> {
        self.post_json::<()>(&["messaging", "threads", thread_id, "read"], None)
            .await?;
        Ok(())
    }

    async fn unread_summary(&self) -> Result<UnreadSummary> {
        self.get_json::<_, ()>(&["messaging", "unread-summary"], None)
            .await
    }

    async fn subscribe_thread(&self, thread_id: &str) -> Result<MessageStream> {
        let resp = self
            .open_stream(&["messaging", "threads", thread_id, "stream"])
            .await?;
        tracing::info!("subscribed to thread {}", thread_id);
        Ok(sse::message_stream(Box::pin(resp.bytes_stream())))
    }
}
