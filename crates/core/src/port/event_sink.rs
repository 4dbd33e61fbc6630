// Event Sink Port
// Follow-up work (e.g. applying optimized content) subscribes here

use crate::domain::JobEvent;
use tracing::info;

/// Receives job lifecycle events; must not block
pub trait JobEventSink: Send + Sync {
    fn emit(&self, event: JobEvent);
}

/// Default sink: structured log line per event
pub struct TracingEventSink;

impl JobEventSink for TracingEventSink {
    fn emit(&self, event: JobEvent) {
        match &event {
            JobEvent::Completed {
                job_id, subject_id, ..
            } => {
                info!(
                    job_id = %job_id,
                    subject_id = %subject_id,
                    target_reached = ?event.target_reached(),
                    "Job completed"
                );
            }
            JobEvent::Abandoned {
                job_id,
                subject_id,
                attempts,
                last_error,
            } => {
                info!(
                    job_id = %job_id,
                    subject_id = %subject_id,
                    attempts = %attempts,
                    last_error = %last_error,
                    "Job abandoned"
                );
            }
        }
    }
}

/// Fan-out over a tokio broadcast channel
pub struct BroadcastEventSink {
    tx: tokio::sync::broadcast::Sender<JobEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }
}

impl JobEventSink for BroadcastEventSink {
    fn emit(&self, event: JobEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records every event for assertions
    #[derive(Default)]
    pub struct RecordingEventSink {
        events: Mutex<Vec<JobEvent>>,
    }

    impl RecordingEventSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<JobEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl JobEventSink for RecordingEventSink {
        fn emit(&self, event: JobEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(current: Option<f64>, target: Option<f64>) -> JobEvent {
        JobEvent::Completed {
            job_id: "job-1".into(),
            subject_id: "post-42".into(),
            result: None,
            current_score: current,
            target_score: target,
        }
    }

    #[tokio::test]
    async fn test_broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastEventSink::new(8);
        let mut rx = sink.subscribe();
        sink.emit(completed(Some(95.0), Some(90.0)));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id(), "job-1");
        assert_eq!(event.target_reached(), Some(true));
    }

    #[test]
    fn test_target_reached() {
        assert_eq!(completed(Some(70.0), Some(90.0)).target_reached(), Some(false));
        assert_eq!(completed(Some(70.0), None).target_reached(), None);
        // Emitting without subscribers must not panic
        BroadcastEventSink::new(1).emit(completed(None, None));
    }
}
