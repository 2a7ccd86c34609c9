//! Rate-Limited Batch Dispatcher
//!
//! Turns one list of recipients into a paced sequence of sends. At most one
//! job runs at a time (single-flight latch). Each recipient is normalized,
//! de-duplicated within the job, checked against the daily quota and its
//! cooldown, and then sent through the session currently owned by the
//! connection supervisor.
//!
//! Every suspension point (typing pause, presence update, send, pacing
//! delay, long break) is raced against the supervisor leaving Online, so a
//! dropped connection stops the job before the next send instead of after
//! the next delay.

use crate::cooldown::CooldownStore;
use crate::events::EventBus;
use crate::pacing::Pacer;
use crate::quota::DailyQuotaTracker;
use crate::supervisor::SupervisorSnapshot;
use courier_core::{
    parse_recipient_list, AppEvent, BatchEnd, CourierError, CourierResult, DispatchRejection,
    ItemOutcome, JobId, Presence, Recipient, RecipientNormalizer, SendError, Session,
    TimeSource,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ----------------------------------------------------------------------------
// Job Types
// ----------------------------------------------------------------------------

/// One batch of work: the same message to an ordered list of raw recipients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchJob {
    recipients: Vec<String>,
    message: String,
}

impl DispatchJob {
    pub fn new<I, S>(recipients: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            recipients: recipients.into_iter().map(Into::into).collect(),
            message: message.into(),
        }
    }

    /// Build a job from a comma, semicolon or newline separated list
    pub fn from_list(list: &str, message: impl Into<String>) -> Self {
        Self::new(parse_recipient_list(list), message)
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

/// Final tally of a dispatch job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub job_id: JobId,
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped_cooldown: usize,
    pub skipped_quota: usize,
    pub skipped_duplicate: usize,
    pub end: BatchEnd,
}

impl DispatchSummary {
    fn new(job_id: JobId, total: usize) -> Self {
        Self {
            job_id,
            total,
            sent: 0,
            failed: 0,
            skipped_cooldown: 0,
            skipped_quota: 0,
            skipped_duplicate: 0,
            end: BatchEnd::Completed,
        }
    }

    fn to_event(&self) -> AppEvent {
        AppEvent::BatchSummary {
            job_id: self.job_id,
            sent: self.sent,
            failed: self.failed,
            skipped_cooldown: self.skipped_cooldown,
            skipped_quota: self.skipped_quota,
            skipped_duplicate: self.skipped_duplicate,
            end: self.end,
        }
    }
}

/// Handle to an accepted job running in the background
#[derive(Debug)]
pub struct DispatchTicket {
    job_id: JobId,
    handle: JoinHandle<DispatchSummary>,
}

impl DispatchTicket {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the job to finish and return its summary
    pub async fn wait(self) -> CourierResult<DispatchSummary> {
        self.handle
            .await
            .map_err(|e| CourierError::channel_error(format!("Dispatch task failed: {}", e)))
    }
}

// ----------------------------------------------------------------------------
// Single-flight Latch
// ----------------------------------------------------------------------------

/// Releases the latch on every exit path, including panics and aborts
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

enum Attempt {
    Sent,
    Failed(SendError),
    Offline,
}

// ----------------------------------------------------------------------------
// Batch Dispatcher
// ----------------------------------------------------------------------------

pub struct BatchDispatcher {
    normalizer: RecipientNormalizer,
    pacer: Pacer,
    cooldown: Arc<CooldownStore>,
    quota: Arc<DailyQuotaTracker>,
    supervisor: watch::Receiver<SupervisorSnapshot>,
    events: EventBus,
    time_source: Arc<dyn TimeSource>,
    in_flight: Arc<AtomicBool>,
}

impl BatchDispatcher {
    pub fn new(
        normalizer: RecipientNormalizer,
        pacer: Pacer,
        cooldown: Arc<CooldownStore>,
        quota: Arc<DailyQuotaTracker>,
        supervisor: watch::Receiver<SupervisorSnapshot>,
        events: EventBus,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            normalizer,
            pacer,
            cooldown,
            quota,
            supervisor,
            events,
            time_source,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn cooldown(&self) -> &Arc<CooldownStore> {
        &self.cooldown
    }

    pub fn quota(&self) -> &Arc<DailyQuotaTracker> {
        &self.quota
    }

    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    /// Accept a job and run it on a background task.
    ///
    /// Rejections happen synchronously and leave no state behind.
    pub fn submit(self: &Arc<Self>, job: DispatchJob) -> Result<DispatchTicket, DispatchRejection> {
        let (guard, generation) = self.admit(&job)?;
        let job_id = JobId::new();
        let dispatcher = Arc::clone(self);
        let handle =
            tokio::spawn(async move { dispatcher.run(job_id, job, generation, guard).await });
        Ok(DispatchTicket { job_id, handle })
    }

    /// Accept a job and run it to completion on the calling task
    pub async fn dispatch(&self, job: DispatchJob) -> Result<DispatchSummary, DispatchRejection> {
        let (guard, generation) = self.admit(&job)?;
        Ok(self.run(JobId::new(), job, generation, guard).await)
    }

    fn admit(&self, job: &DispatchJob) -> Result<(InFlightGuard, u64), DispatchRejection> {
        self.check_admission(job).map_err(|rejection| {
            info!(reason = rejection.code(), "Dispatch rejected");
            self.events
                .status(format!("dispatch rejected ({}): {}", rejection.code(), rejection));
            rejection
        })
    }

    fn check_admission(&self, job: &DispatchJob) -> Result<(InFlightGuard, u64), DispatchRejection> {
        if job.is_empty() {
            return Err(DispatchRejection::EmptyBatch);
        }
        if job.message.trim().is_empty() {
            return Err(DispatchRejection::EmptyMessage);
        }

        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| DispatchRejection::AlreadyInFlight)?;
        let guard = InFlightGuard {
            flag: self.in_flight.clone(),
        };

        let (state, generation) = {
            let snapshot = self.supervisor.borrow();
            (snapshot.state, snapshot.generation)
        };
        if !state.is_online() {
            return Err(DispatchRejection::NotOnline { state });
        }

        Ok((guard, generation))
    }

    async fn run(
        &self,
        job_id: JobId,
        job: DispatchJob,
        generation: u64,
        guard: InFlightGuard,
    ) -> DispatchSummary {
        let total = job.len();
        let mut summary = DispatchSummary::new(job_id, total);
        let mut online = self.supervisor.clone();
        let mut seen: HashSet<String> = HashSet::with_capacity(total);

        info!(%job_id, total, generation, "Dispatch job started");
        self.events
            .status(format!("dispatch {} started: {} recipients", job_id, total));

        // Pacing owed before the next send: whether an item reached the
        // session, and whether a long break came due with it
        let mut pace_due = false;
        let mut break_due = false;

        for (index, raw) in job.recipients.iter().enumerate() {
            let position = index + 1;

            let recipient = match self.normalizer.normalize(raw) {
                Ok(recipient) => recipient,
                Err(e) => {
                    summary.failed += 1;
                    self.emit_item(job_id, raw, position, total, ItemOutcome::Failed, Some(e.to_string()));
                    continue;
                }
            };

            if !seen.insert(recipient.digits().to_string()) {
                summary.skipped_duplicate += 1;
                self.emit_item(
                    job_id,
                    recipient.digits(),
                    position,
                    total,
                    ItemOutcome::SkippedDuplicate,
                    Some("already processed in this job".to_string()),
                );
                continue;
            }

            if self.quota.remaining() == 0 {
                self.quota_exhausted(&mut summary, total - index);
                break;
            }

            if let Some(remaining) = self.cooldown.remaining(&recipient) {
                summary.skipped_cooldown += 1;
                self.emit_item(
                    job_id,
                    recipient.digits(),
                    position,
                    total,
                    ItemOutcome::SkippedCooldown,
                    Some(format!("cooling down, {} remaining", humanize(remaining))),
                );
                continue;
            }

            if pace_due {
                let mut pause = self.pacer.inter_message_delay();
                if break_due {
                    let long_break = self.pacer.session_break();
                    info!(%job_id, sent = summary.sent, break_ms = long_break.as_millis() as u64, "Taking a long break");
                    self.events.status(format!(
                        "pausing {} after {} sends",
                        humanize(long_break),
                        summary.sent
                    ));
                    pause += long_break;
                }
                debug!(%job_id, delay_ms = pause.as_millis() as u64, "Pacing");
                if !self.pause(pause, generation, &mut online).await {
                    self.connection_lost(&mut summary, index);
                    break;
                }
            }

            match self.attempt(&recipient, &job.message, generation, &mut online).await {
                Attempt::Sent => {
                    self.cooldown.record_sent(&recipient, self.time_source.now());
                    if !self.quota.try_consume() {
                        warn!(%job_id, "Quota slot was taken outside the dispatcher");
                    }
                    summary.sent += 1;
                    self.emit_item(job_id, recipient.digits(), position, total, ItemOutcome::Sent, None);
                    pace_due = true;
                    break_due = self.pacer.break_due(summary.sent);

                    if self.quota.remaining() == 0 && position < total {
                        self.quota_exhausted(&mut summary, total - position);
                        break;
                    }
                }
                Attempt::Failed(e) => {
                    summary.failed += 1;
                    warn!(%job_id, recipient = %recipient.masked(), error = %e, "Send failed");
                    self.emit_item(
                        job_id,
                        recipient.digits(),
                        position,
                        total,
                        ItemOutcome::Failed,
                        Some(e.to_string()),
                    );
                    pace_due = true;
                    break_due = false;
                }
                Attempt::Offline => {
                    self.connection_lost(&mut summary, index);
                    break;
                }
            }
        }

        let pruned = self.cooldown.prune_expired();
        drop(guard);

        info!(
            %job_id,
            sent = summary.sent,
            failed = summary.failed,
            skipped_cooldown = summary.skipped_cooldown,
            skipped_quota = summary.skipped_quota,
            skipped_duplicate = summary.skipped_duplicate,
            end = ?summary.end,
            pruned,
            "Dispatch job finished"
        );
        self.events.publish(summary.to_event());
        summary
    }

    async fn attempt(
        &self,
        recipient: &Recipient,
        body: &str,
        generation: u64,
        online: &mut watch::Receiver<SupervisorSnapshot>,
    ) -> Attempt {
        let Some(session) = current_session(online, generation) else {
            return Attempt::Offline;
        };

        if let Some(typing) = self.pacer.typing_delay(body) {
            if !self
                .presence(&*session, recipient, Presence::Composing, generation, online)
                .await
            {
                return Attempt::Offline;
            }
            if !self.pause(typing, generation, online).await {
                return Attempt::Offline;
            }
            if !self
                .presence(&*session, recipient, Presence::Paused, generation, online)
                .await
            {
                return Attempt::Offline;
            }
            if current_session(online, generation).is_none() {
                return Attempt::Offline;
            }
        }

        let result = tokio::select! {
            biased;
            result = session.send_text(recipient, body) => Some(result),
            _ = wait_offline(online, generation) => None,
        };

        match result {
            Some(Ok(())) => Attempt::Sent,
            Some(Err(SendError::NotConnected)) | None => Attempt::Offline,
            Some(Err(e)) => Attempt::Failed(e),
        }
    }

    /// Presence failures never fail the item; returns false only when the
    /// connection went away
    async fn presence(
        &self,
        session: &dyn Session,
        recipient: &Recipient,
        presence: Presence,
        generation: u64,
        online: &mut watch::Receiver<SupervisorSnapshot>,
    ) -> bool {
        let result = tokio::select! {
            biased;
            result = session.send_presence(recipient, presence) => Some(result),
            _ = wait_offline(online, generation) => None,
        };
        match result {
            Some(Ok(())) => true,
            Some(Err(SendError::NotConnected)) | None => false,
            Some(Err(e)) => {
                debug!(recipient = %recipient.masked(), ?presence, error = %e, "Presence update failed");
                true
            }
        }
    }

    /// Sleep for `duration` unless the session leaves Online first
    async fn pause(
        &self,
        duration: Duration,
        generation: u64,
        online: &mut watch::Receiver<SupervisorSnapshot>,
    ) -> bool {
        if duration.is_zero() {
            return current_session(online, generation).is_some();
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = wait_offline(online, generation) => false,
        }
    }

    fn quota_exhausted(&self, summary: &mut DispatchSummary, unsent: usize) {
        summary.skipped_quota = unsent;
        summary.end = BatchEnd::QuotaExhausted;
        warn!(
            job_id = %summary.job_id,
            unsent,
            cap = self.quota.cap(),
            "Daily cap reached; truncating job"
        );
        self.events.status(format!(
            "daily cap of {} reached; {} recipients left unsent",
            self.quota.cap(),
            unsent
        ));
    }

    fn connection_lost(&self, summary: &mut DispatchSummary, processed: usize) {
        summary.end = BatchEnd::ConnectionLost;
        warn!(
            job_id = %summary.job_id,
            processed,
            total = summary.total,
            "Connection lost mid-batch; aborting job"
        );
        self.events.status(format!(
            "connection lost mid-batch after {} of {} recipients",
            processed, summary.total
        ));
    }

    fn emit_item(
        &self,
        job_id: JobId,
        recipient: &str,
        index: usize,
        total: usize,
        outcome: ItemOutcome,
        detail: Option<String>,
    ) {
        debug!(%job_id, recipient, index, total, ?outcome, detail = detail.as_deref(), "Item processed");
        self.events.publish(AppEvent::ItemResult {
            job_id,
            recipient: recipient.to_string(),
            index,
            total,
            outcome,
            detail,
        });
    }
}

impl std::fmt::Debug for BatchDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchDispatcher")
            .field("in_flight", &self.is_in_flight())
            .field("pacer", &self.pacer)
            .field("cooldown", &self.cooldown)
            .field("quota", &self.quota)
            .finish()
    }
}

fn current_session(
    online: &watch::Receiver<SupervisorSnapshot>,
    generation: u64,
) -> Option<Arc<dyn Session>> {
    let snapshot = online.borrow();
    if snapshot.generation == generation {
        snapshot.session()
    } else {
        None
    }
}

/// Resolves once the session that started the job is no longer usable
async fn wait_offline(online: &mut watch::Receiver<SupervisorSnapshot>, generation: u64) {
    let _ = online
        .wait_for(|snapshot| snapshot.generation != generation || !snapshot.is_online())
        .await;
}

fn humanize(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3_600 {
        format!("{}h {}m", secs / 3_600, (secs % 3_600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{ChannelConfig, PacingConfig, SessionState};
    use courier_harness::MockTimeSource;

    fn create_test_dispatcher() -> (BatchDispatcher, watch::Sender<SupervisorSnapshot>) {
        let time: Arc<dyn TimeSource> = Arc::new(MockTimeSource::new(1_000_000));
        let (snapshot_tx, snapshot_rx) = watch::channel(SupervisorSnapshot::initial());
        let dispatcher = BatchDispatcher::new(
            RecipientNormalizer::default(),
            Pacer::with_seed(PacingConfig::testing(), 7),
            Arc::new(CooldownStore::new(60_000, time.clone())),
            Arc::new(DailyQuotaTracker::new(10, time.clone())),
            snapshot_rx,
            EventBus::new(&ChannelConfig::testing()),
            time,
        );
        (dispatcher, snapshot_tx)
    }

    #[tokio::test]
    async fn test_rejects_empty_batch_and_message() {
        let (dispatcher, _tx) = create_test_dispatcher();

        let empty = DispatchJob::new(Vec::<String>::new(), "hi");
        assert_eq!(
            dispatcher.dispatch(empty).await.unwrap_err(),
            DispatchRejection::EmptyBatch
        );

        let blank = DispatchJob::new(["9876543210"], "   ");
        assert_eq!(
            dispatcher.dispatch(blank).await.unwrap_err(),
            DispatchRejection::EmptyMessage
        );
        assert!(!dispatcher.is_in_flight());
    }

    #[tokio::test]
    async fn test_rejects_when_not_online_and_releases_latch() {
        let (dispatcher, _tx) = create_test_dispatcher();
        let job = DispatchJob::new(["9876543210"], "hi");

        assert_eq!(
            dispatcher.dispatch(job).await.unwrap_err(),
            DispatchRejection::NotOnline {
                state: SessionState::Idle
            }
        );
        assert!(!dispatcher.is_in_flight());
    }

    #[tokio::test]
    async fn test_rejection_publishes_status() {
        let (dispatcher, _tx) = create_test_dispatcher();
        let mut events = dispatcher.events.subscribe();

        let _ = dispatcher.dispatch(DispatchJob::new(["1"], "hi")).await;
        match events.recv().await.unwrap() {
            AppEvent::Status { text } => assert!(text.contains("not-online")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_job_from_list() {
        let job = DispatchJob::from_list("111, 222\n333", "hello");
        assert_eq!(job.recipients(), ["111", "222", "333"]);
        assert_eq!(job.message(), "hello");
        assert_eq!(job.len(), 3);
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize(Duration::from_millis(250)), "250ms");
        assert_eq!(humanize(Duration::from_secs(42)), "42s");
        assert_eq!(humanize(Duration::from_secs(125)), "2m 5s");
        assert_eq!(humanize(Duration::from_secs(3 * 3_600 + 720)), "3h 12m");
    }
}
