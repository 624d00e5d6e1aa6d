//! Public pipeline event vocabulary
//!
//! Every invocation, streaming or buffered, is reported as an ordered
//! sequence of `PipelineEvent`s: `connected`, then any number of
//! `processing`/`step`, then exactly one of `result` or `error`, with
//! `done` following `result` only.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Event emitted while a pipeline invocation runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Session resolved, run is starting
    Connected { session_id: String },
    /// A stage began executing
    Processing { message: String },
    /// Incremental progress from the running stage
    Step { text: String },
    /// Terminal success with the reduced output
    Result { content: String, session_id: String },
    /// Terminal failure
    Error { message: String },
    /// End-of-stream marker, follows `result` only
    Done,
}

impl PipelineEvent {
    /// Whether this event terminates the run (`result` or `error`)
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::Result { .. } | PipelineEvent::Error { .. })
    }

    /// SSE event name for this variant
    pub fn event_name(&self) -> &'static str {
        match self {
            PipelineEvent::Connected { .. } => "connected",
            PipelineEvent::Processing { .. } => "processing",
            PipelineEvent::Step { .. } => "step",
            PipelineEvent::Result { .. } => "result",
            PipelineEvent::Error { .. } => "error",
            PipelineEvent::Done => "done",
        }
    }
}

/// Stream of pipeline events backed by an mpsc channel
pub struct EventStream {
    receiver: mpsc::Receiver<PipelineEvent>,
}

impl EventStream {
    /// Create a channel pair for building an event stream
    pub fn channel(buffer: usize) -> (mpsc::Sender<PipelineEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { receiver: rx })
    }

    /// Drain the stream, returning every event in order
    pub async fn collect_all(mut self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.receiver.recv().await {
            events.push(event);
        }
        events
    }

    /// Drain the stream and return the terminal outcome
    ///
    /// Returns `Ok(content)` from the `result` event or `Err(message)` from
    /// the `error` event. A stream that closes without a terminal event is
    /// reported as an error.
    pub async fn into_outcome(mut self) -> Result<String, String> {
        let mut outcome = None;
        while let Some(event) = self.receiver.recv().await {
            match event {
                PipelineEvent::Result { content, .. } => outcome = Some(Ok(content)),
                PipelineEvent::Error { message } => outcome = Some(Err(message)),
                _ => {}
            }
        }
        outcome.unwrap_or_else(|| Err("stream closed before a terminal event".to_string()))
    }
}

impl Stream for EventStream {
    type Item = PipelineEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = PipelineEvent::Result {
            content: "done".to_string(),
            session_id: "s1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "result");
        assert_eq!(json["content"], "done");
        assert_eq!(json["session_id"], "s1");
    }

    #[test]
    fn terminal_classification() {
        assert!(PipelineEvent::Error {
            message: "x".to_string()
        }
        .is_terminal());
        assert!(!PipelineEvent::Done.is_terminal());
        assert!(!PipelineEvent::Connected {
            session_id: "s".to_string()
        }
        .is_terminal());
    }

    #[tokio::test]
    async fn into_outcome_picks_terminal_event() {
        let (tx, stream) = EventStream::channel(8);
        tx.send(PipelineEvent::Connected {
            session_id: "s".to_string(),
        })
        .await
        .unwrap();
        tx.send(PipelineEvent::Result {
            content: "final".to_string(),
            session_id: "s".to_string(),
        })
        .await
        .unwrap();
        tx.send(PipelineEvent::Done).await.unwrap();
        drop(tx);

        assert_eq!(stream.into_outcome().await, Ok("final".to_string()));
    }
}
