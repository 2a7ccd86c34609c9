//! Event Recorder
//!
//! Subscribes to the app event stream and keeps everything it has seen, so
//! tests can wait for a specific event and then assert on the full order.

use courier_core::{AppEvent, AppEventReceiver, JobId};
use std::time::Duration;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

pub struct EventRecorder {
    receiver: AppEventReceiver,
    seen: Vec<AppEvent>,
}

impl EventRecorder {
    pub fn new(receiver: AppEventReceiver) -> Self {
        Self {
            receiver,
            seen: Vec::new(),
        }
    }

    /// Next event, skipping over lag; `None` once the bus is gone
    pub async fn next(&mut self) -> Option<AppEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    self.seen.push(event.clone());
                    return Some(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event recorder lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the first event matching `predicate`
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<AppEvent>
    where
        F: FnMut(&AppEvent) -> bool,
    {
        while let Some(event) = self.next().await {
            if predicate(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Like [`wait_for`](Self::wait_for) but gives up after `timeout`
    pub async fn wait_for_timeout<F>(&mut self, timeout: Duration, predicate: F) -> Option<AppEvent>
    where
        F: FnMut(&AppEvent) -> bool,
    {
        tokio::time::timeout(timeout, self.wait_for(predicate))
            .await
            .ok()
            .flatten()
    }

    /// Wait for the summary of `job_id`
    pub async fn batch_summary(&mut self, job_id: JobId) -> Option<AppEvent> {
        self.wait_for(|event| {
            matches!(event, AppEvent::BatchSummary { job_id: id, .. } if *id == job_id)
        })
        .await
    }

    /// Record whatever is already buffered without waiting
    pub fn drain(&mut self) -> &[AppEvent] {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => self.seen.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        &self.seen
    }

    pub fn seen(&self) -> &[AppEvent] {
        &self.seen
    }

    /// Status texts seen so far, in order
    pub fn statuses(&self) -> Vec<String> {
        self.seen
            .iter()
            .filter_map(|event| match event {
                AppEvent::Status { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Seen events with status noise removed
    pub fn milestones(&self) -> Vec<AppEvent> {
        self.seen
            .iter()
            .filter(|event| !matches!(event, AppEvent::Status { .. }))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{create_app_event_channel, ChannelConfig};

    #[tokio::test]
    async fn test_wait_for_keeps_history() {
        let (tx, rx) = create_app_event_channel(&ChannelConfig::testing());
        let mut recorder = EventRecorder::new(rx);

        tx.send(AppEvent::status("connecting")).unwrap();
        tx.send(AppEvent::Connected).unwrap();
        tx.send(AppEvent::status("after")).unwrap();

        let found = recorder
            .wait_for(|e| matches!(e, AppEvent::Connected))
            .await;
        assert_eq!(found, Some(AppEvent::Connected));
        assert_eq!(recorder.seen().len(), 2);

        recorder.drain();
        assert_eq!(recorder.statuses(), vec!["connecting", "after"]);
        assert_eq!(recorder.milestones(), vec![AppEvent::Connected]);
    }

    #[tokio::test]
    async fn test_closed_bus_ends_waiting() {
        let (tx, rx) = create_app_event_channel(&ChannelConfig::testing());
        let mut recorder = EventRecorder::new(rx);
        drop(tx);
        assert!(recorder.next().await.is_none());
    }
}
