//! Sink registration and dispatch order.

use std::sync::Arc;

use super::frame::VideoFrame;

/// Opaque consumer identity. Uniqueness is the registrant's contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(pub u64);

/// A registered consumer of captured frames. Delivery is synchronous on the
/// capture thread; any failure past this call is the sink's own business.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: VideoFrame);
}

/// Insertion-ordered sink registry. Dispatch iterates in registration order;
/// no fairness or priority scheme.
#[derive(Default)]
pub struct SinkSet {
    entries: Vec<(SinkId, Arc<dyn FrameSink>)>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink, replacing in place any previous sink with the same id.
    pub fn add(&mut self, id: SinkId, sink: Arc<dyn FrameSink>) {
        if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            entry.1 = sink;
        } else {
            self.entries.push((id, sink));
        }
    }

    pub fn remove(&mut self, id: SinkId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn FrameSink>> {
        self.entries.iter().map(|(_, sink)| sink)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    struct TagSink {
        tag: u64,
        seen: Arc<Mutex<Vec<u64>>>,
    }

    impl FrameSink for TagSink {
        fn on_frame(&self, _frame: VideoFrame) {
            self.seen.lock().unwrap().push(self.tag);
        }
    }

    struct CountSink(AtomicUsize);

    impl FrameSink for CountSink {
        fn on_frame(&self, _frame: VideoFrame) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn test_frame() -> VideoFrame {
        use crate::capture::convert::packed_to_i420;
        use crate::capture::frame::{FrameBuffer, PixelFormat, Rotation};

        let src = vec![0u8; 2 * 2 * 4];
        VideoFrame {
            buffer: FrameBuffer::I420(packed_to_i420(&src, 8, PixelFormat::Bgra8, 2, 2)),
            width: 2,
            height: 2,
            rotation: Rotation::None,
            timestamp_ns: 0,
            ntp_time_ms: None,
        }
    }

    #[test]
    fn dispatch_follows_insertion_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sinks = SinkSet::new();
        for tag in [3u64, 1, 2] {
            sinks.add(
                SinkId(tag),
                Arc::new(TagSink {
                    tag,
                    seen: Arc::clone(&seen),
                }),
            );
        }

        for sink in sinks.iter() {
            sink.on_frame(test_frame());
        }
        assert_eq!(*seen.lock().unwrap(), vec![3, 1, 2]);
    }

    #[test]
    fn duplicate_id_replaces_without_reordering() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sinks = SinkSet::new();
        sinks.add(
            SinkId(1),
            Arc::new(TagSink {
                tag: 10,
                seen: Arc::clone(&seen),
            }),
        );
        sinks.add(SinkId(2), Arc::new(CountSink(AtomicUsize::new(0))));
        sinks.add(
            SinkId(1),
            Arc::new(TagSink {
                tag: 11,
                seen: Arc::clone(&seen),
            }),
        );

        assert_eq!(sinks.len(), 2);
        for sink in sinks.iter() {
            sink.on_frame(test_frame());
        }
        assert_eq!(*seen.lock().unwrap(), vec![11]);
    }

    #[test]
    fn remove_reports_presence() {
        let mut sinks = SinkSet::new();
        sinks.add(SinkId(7), Arc::new(CountSink(AtomicUsize::new(0))));
        assert!(sinks.remove(SinkId(7)));
        assert!(!sinks.remove(SinkId(7)));
        assert!(sinks.is_empty());
    }
}
