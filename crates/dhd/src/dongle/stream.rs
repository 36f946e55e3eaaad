//! Event fan-out as an async stream.
//!
//! [`channel`] returns a [`ChannelSink`] to hand to the
//! [`EventRouter`](super::router::EventRouter) and an [`EventStream`] that
//! yields every delivered frame.
//!
//! ```ignore
//! use tokio_stream::StreamExt;
//!
//! let (sink, mut events) = dhd::dongle::stream::channel();
//! // ... router.route(&frame, 0)?;
//! while let Some(ev) = events.next().await {
//!     println!("{} on if{}", ev.event.event_type, ev.ifidx);
//! }
//! ```

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::event::WlEvent;
use super::router::EventSink;

/// A frame as handed to the sink.
#[derive(Debug, Clone)]
pub struct DeliveredEvent {
    pub ifidx: usize,
    /// Header plus payload, exactly as delivered.
    pub frame: Bytes,
    pub event: WlEvent,
}

/// [`EventSink`] that queues frames for an [`EventStream`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DeliveredEvent>,
}

impl EventSink for ChannelSink {
    fn deliver(&self, ifidx: usize, frame: &[u8], event: &WlEvent) {
        let ev = DeliveredEvent {
            ifidx,
            frame: Bytes::copy_from_slice(frame),
            event: event.clone(),
        };
        if self.tx.send(ev).is_err() {
            tracing::trace!(ifidx, "event stream closed, frame dropped");
        }
    }
}

/// Stream of delivered events. Ends when every sink is dropped.
#[derive(Debug)]
pub struct EventStream {
    inner: UnboundedReceiverStream<DeliveredEvent>,
}

impl Stream for EventStream {
    type Item = DeliveredEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Create a connected sink and stream.
pub fn channel() -> (ChannelSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ChannelSink { tx },
        EventStream {
            inner: UnboundedReceiverStream::new(rx),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dongle::event::{EventBuilder, EventType};
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_stream_yields_delivered() {
        let (sink, mut events) = channel();
        let frame = EventBuilder::new(EventType::Link).ifname("wl0").build();
        let event = crate::dongle::event::EventFrame::parse(&frame).unwrap().event;
        sink.deliver(1, &frame, &event);
        drop(sink);

        let ev = events.next().await.unwrap();
        assert_eq!(ev.ifidx, 1);
        assert_eq!(&ev.frame[..], &frame[..]);
        assert_eq!(ev.event.event_type, EventType::Link);
        assert!(events.next().await.is_none());
    }
}
