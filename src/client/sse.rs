//! text/event-stream 解码

use crate::error::{FinanceError, Result};
use crate::models::Message;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::VecDeque;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// 增量解码器: 字节块可以在任意位置被切开
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    last_id: Option<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(ev) = self.feed_line(&line) {
                out.push(ev);
            }
        }
        out
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_id.as_deref()
    }

    fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.last_id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        let ev = SseEvent {
            event: self.event.take(),
            data: self.data.join("\n"),
            id: self.last_id.clone(),
        };
        self.data.clear();
        Some(ev)
    }
}

/// 把字节流解码为事件流; 流末尾未以空行结束的事件被丢弃
pub fn decode_stream<S, B, E>(bytes: S) -> BoxStream<'static, Result<SseEvent>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<FinanceError> + Send + 'static,
{
    let init = (bytes, SseDecoder::default(), VecDeque::new(), false);
    stream::unfold(init, |(mut bytes, mut dec, mut pending, mut done)| async move {
        loop {
            if let Some(ev) = pending.pop_front() {
                return Some((Ok(ev), (bytes, dec, pending, done)));
            }
            if done {
                return None;
            }
            match bytes.next().await {
                Some(Ok(chunk)) => pending.extend(dec.push(chunk.as_ref())),
                Some(Err(e)) => {
                    done = true;
                    return Some((Err(e.into()), (bytes, dec, pending, done)));
                }
                None => return None,
            }
        }
    })
    .boxed()
}

/// 事件 -> 消息; 心跳等其他事件跳过
pub fn parse_message_event(ev: &SseEvent) -> Option<Result<Message>> {
    match ev.event.as_deref() {
        None | Some("message") => {
            Some(serde_json::from_str::<Message>(&ev.data).map_err(FinanceError::from))
        }
        Some(other) => {
            tracing::trace!("ignoring sse event `{}`", other);
            None
        }
    }
}

pub fn message_stream<S, B, E>(bytes: S) -> BoxStream<'static, Result<Message>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<FinanceError> + Send + 'static,
{
    decode_stream(bytes)
        .filter_map(|ev| async move {
            match ev {
                Ok(ev) => parse_message_event(&ev),
                Err(e) => Some(Err(e)),
            }
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_events_split_across_chunks() {
        let mut dec = SseDecoder::default();
        assert!(dec.push(b"event: mess").is_empty());
        assert!(dec.push(b"age\r\ndata: {\"a\":").is_empty());
        let out = dec.push(b"1}\r\nid: 7\r\n\r\n");
        assert_eq!(
            out,
            vec![SseEvent {
                event: Some("message".into()),
                data: "{\"a\":1}".into(),
                id: Some("7".into()),
            }]
        );
        assert_eq!(dec.last_event_id(), Some("7"));
    }

    #[test]
    fn joins_multiline_data_and_skips_comments() {
        let mut dec = SseDecoder::default();
        let out = dec.push(b": keepalive\n\ndata: one\ndata: two\n\n");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, "one\ntwo");
        assert_eq!(out[0].event, None);
    }

    #[tokio::test]
    async fn message_stream_skips_pings_and_drops_trailing_partial_event() {
        let body = concat!(
            "event: ping\ndata: {}\n\n",
            "data: {\"message_id\":\"m1\",\"thread_id\":\"t1\",\"sender_uid\":\"u2\",",
            "\"body\":\"hi\",\"created_at\":\"2026-01-02T03:04:05Z\"}\n\n",
            "data: {\"partial\": true}\n"
        );
        let chunks: Vec<std::result::Result<Vec<u8>, FinanceError>> = body
            .as_bytes()
            .chunks(13)
            .map(|c| Ok(c.to_vec()))
            .collect();
        let msgs: Vec<_> = message_stream(stream::iter(chunks)).collect().await;
        assert_eq!(msgs.len(), 1);
        let msg = msgs.into_iter().next().unwrap().unwrap();
        assert_eq!(msg.message_id, "m1");
        assert_eq!(msg.body, "hi");
    }
}
