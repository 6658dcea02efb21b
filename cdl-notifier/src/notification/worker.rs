//! Background dispatch worker.
//!
//! Each cycle scans the repository for due jobs and sends them one at a time.
//! Every attempt is persisted before the next job is touched. A job that keeps
//! failing is retried on later cycles until `max_attempts` is reached, then
//! it is marked `failed`.
//!
//! Cycles never overlap: the timer loop awaits each cycle before waiting for
//! the next tick, and [`DispatchWorker::run_once`] holds a cycle lock so a
//! manual call cannot race the timer either.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::channels::Channels;
use super::delivery::Delivery;
use crate::Result;
use crate::config::duration_to_millis;
use crate::database::repositories::NotificationRepository;
use crate::domain::{DEFAULT_MAX_ATTEMPTS, NotificationJob, NotificationStatus};

/// Shortest accepted poll interval.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Worker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Attempts after which an undeliverable job is marked `failed`.
    pub max_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Outcome of a single cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Jobs found due at the start of the cycle.
    pub due: usize,
    pub sent: usize,
    /// Failed this cycle but still queued for another attempt.
    pub retrying: usize,
    /// Reached the attempt cap this cycle.
    pub failed: usize,
}

/// Cumulative counters since the worker was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub cycles: u64,
    pub attempts: u64,
    pub sent: u64,
    pub failed: u64,
    pub retried: u64,
    /// Cycles aborted by a store error or a panic outside job processing.
    pub cycle_errors: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    cycles: AtomicU64,
    attempts: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    cycle_errors: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            cycle_errors: self.cycle_errors.load(Ordering::Relaxed),
        }
    }
}

struct RunningWorker {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Notification dispatch worker.
pub struct DispatchWorker {
    repo: Arc<dyn NotificationRepository>,
    channels: Channels,
    config: WorkerConfig,
    cycle_lock: tokio::sync::Mutex<()>,
    stats: StatsCounters,
    running: Mutex<Option<RunningWorker>>,
}

impl DispatchWorker {
    /// Create a new, stopped worker.
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        channels: Channels,
        config: WorkerConfig,
    ) -> Self {
        Self {
            repo,
            channels,
            config,
            cycle_lock: tokio::sync::Mutex::new(()),
            stats: StatsCounters::default(),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Start periodic dispatch. The first cycle runs immediately.
    ///
    /// Returns `false` without doing anything if the worker is already
    /// running.
    pub fn start(self: &Arc<Self>, poll_interval: Duration) -> bool {
        let mut running = self.running.lock();
        if let Some(current) = running.as_ref()
            && !current.task.is_finished()
        {
            debug!("Notification worker already running");
            return false;
        }

        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        let cancel = CancellationToken::new();
        let worker = Arc::clone(self);
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            worker.run_loop(poll_interval, token).await;
        });

        *running = Some(RunningWorker { cancel, task });
        info!(
            poll_interval_ms = duration_to_millis(poll_interval),
            max_attempts = self.config.max_attempts,
            "Notification worker started"
        );
        true
    }

    /// Stop periodic dispatch.
    ///
    /// No further cycles are started; a cycle already in flight runs to
    /// completion in the background. Returns `false` if the worker was not
    /// running.
    pub fn stop(&self) -> bool {
        let Some(current) = self.running.lock().take() else {
            return false;
        };
        current.cancel.cancel();
        info!("Notification worker stopped");
        true
    }

    /// Stop periodic dispatch and wait for the in-flight cycle to finish.
    pub async fn shutdown(&self) {
        let Some(current) = self.running.lock().take() else {
            return;
        };
        current.cancel.cancel();
        if let Err(e) = current.task.await {
            warn!(error = %e, "Notification worker task ended abnormally");
        }
        info!("Notification worker shut down");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|current| !current.task.is_finished())
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.snapshot()
    }

    async fn run_loop(self: Arc<Self>, poll_interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.run_cycle().await,
            }
        }

        debug!("Notification worker loop exited");
    }

    /// One timer-driven cycle. Errors and panics are logged; the timer keeps
    /// going.
    async fn run_cycle(&self) {
        match AssertUnwindSafe(self.run_once()).catch_unwind().await {
            Ok(Ok(report)) => {
                if report.due > 0 {
                    info!(
                        due = report.due,
                        sent = report.sent,
                        retrying = report.retrying,
                        failed = report.failed,
                        "Notification cycle finished"
                    );
                }
            }
            Ok(Err(e)) => {
                self.stats.cycle_errors.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Notification cycle failed");
            }
            Err(panic) => {
                self.stats.cycle_errors.fetch_add(1, Ordering::Relaxed);
                error!(panic = %panic_message(&*panic), "Notification cycle panicked");
            }
        }
    }

    /// Run a single dispatch cycle.
    ///
    /// Store errors abort the cycle and are returned; jobs already processed
    /// in this cycle stay persisted. Channel failures and panics only affect
    /// their own job.
    pub async fn run_once(&self) -> Result<CycleReport> {
        let _cycle = self.cycle_lock.lock().await;
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);

        let due = self.repo.find_due_jobs(Utc::now()).await?;
        let mut report = CycleReport {
            due: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            trace!("No due notifications");
            return Ok(report);
        }

        debug!(due = due.len(), "Dispatching due notifications");
        for mut job in due {
            job.begin_attempt(Utc::now());
            self.stats.attempts.fetch_add(1, Ordering::Relaxed);

            let delivered = self.attempt(&job).await;
            let status = job
                .finish_attempt(delivered, Utc::now(), self.config.max_attempts)
                .clone();

            match status {
                NotificationStatus::Sent => {
                    report.sent += 1;
                    self.stats.sent.fetch_add(1, Ordering::Relaxed);
                }
                NotificationStatus::Failed => {
                    report.failed += 1;
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        job.id = job.id,
                        attempts = job.attempts,
                        "Notification failed permanently"
                    );
                }
                _ => {
                    report.retrying += 1;
                    self.stats.retried.fetch_add(1, Ordering::Relaxed);
                }
            }

            match self.repo.update_job(&job).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn!(job.id = job.id, "Notification job removed during dispatch; skipping");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    /// Deliver one job. Returns whether the channel accepted the message.
    async fn attempt(&self, job: &NotificationJob) -> bool {
        let delivery = match Delivery::for_job(job) {
            Ok(delivery) => delivery,
            Err(e) => {
                warn!(
                    job.id = job.id,
                    kind = %job.kind,
                    attempts = job.attempts,
                    error = %e,
                    "Notification job cannot be delivered"
                );
                return false;
            }
        };

        let outcome = AssertUnwindSafe(self.channels.deliver(&delivery))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                info!(
                    job.id = job.id,
                    channel = delivery.channel_type(),
                    to = delivery.recipient(),
                    "Notification sent"
                );
                true
            }
            Ok(Err(e)) => {
                warn!(
                    job.id = job.id,
                    channel = delivery.channel_type(),
                    attempts = job.attempts,
                    error = %e,
                    "Notification delivery failed"
                );
                false
            }
            Err(panic) => {
                error!(
                    job.id = job.id,
                    channel = delivery.channel_type(),
                    attempts = job.attempts,
                    panic = %panic_message(&*panic),
                    "Notification channel panicked"
                );
                false
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::document::{Document, MemoryDocumentStore};
    use crate::database::repositories::DocumentNotificationRepository;
    use crate::domain::NewNotification;
    use crate::notification::channels::{EmailSender, SmsSender};
    use crate::notification::delivery::{EmailMessage, SmsMessage};
    use crate::{Error, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration};
    use std::sync::atomic::AtomicU32;

    type MemoryRepo = DocumentNotificationRepository<MemoryDocumentStore>;

    /// Email stub that fails its first `failures` calls.
    #[derive(Default)]
    struct TestEmail {
        failures: AtomicU32,
        calls: AtomicU32,
        sent: Mutex<Vec<EmailMessage>>,
    }

    impl TestEmail {
        fn failing(failures: u32) -> Self {
            Self {
                failures: AtomicU32::new(failures),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl EmailSender for TestEmail {
        fn is_enabled(&self) -> bool {
            true
        }

        async fn send_email(&self, message: &EmailMessage) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::channel("email", "connection refused"));
            }
            self.sent.lock().push(message.clone());
            Ok(())
        }
    }

    /// SMS stub that panics for one recipient.
    #[derive(Default)]
    struct TestSms {
        panic_for: Option<String>,
        sent: Mutex<Vec<SmsMessage>>,
    }

    #[async_trait]
    impl SmsSender for TestSms {
        fn is_enabled(&self) -> bool {
            true
        }

        async fn send_sms(&self, message: &SmsMessage) -> Result<()> {
            if self.panic_for.as_deref() == Some(message.to.as_str()) {
                panic!("gateway client bug");
            }
            self.sent.lock().push(message.clone());
            Ok(())
        }
    }

    /// Repository whose reads always fail.
    struct BrokenRepo;

    #[async_trait]
    impl NotificationRepository for BrokenRepo {
        async fn find_due_jobs(&self, _now: DateTime<Utc>) -> Result<Vec<NotificationJob>> {
            Err(Error::Other("disk unavailable".to_string()))
        }
        async fn update_job(&self, _job: &NotificationJob) -> Result<()> {
            Ok(())
        }
        async fn enqueue(&self, _request: NewNotification) -> Result<NotificationJob> {
            Err(Error::Other("disk unavailable".to_string()))
        }
        async fn list_pending(&self) -> Result<Vec<NotificationJob>> {
            Ok(Vec::new())
        }
        async fn list_all(&self) -> Result<Vec<NotificationJob>> {
            Ok(Vec::new())
        }
        async fn get(&self, id: i64) -> Result<NotificationJob> {
            Err(Error::not_found("NotificationJob", id))
        }
    }

    fn setup(
        email: Arc<TestEmail>,
        sms: Arc<TestSms>,
        config: WorkerConfig,
    ) -> (Arc<DispatchWorker>, Arc<MemoryRepo>) {
        let repo = Arc::new(DocumentNotificationRepository::new(
            MemoryDocumentStore::with_document(Document::new()),
        ));
        let worker = Arc::new(DispatchWorker::new(
            repo.clone(),
            Channels::new(email, sms),
            config,
        ));
        (worker, repo)
    }

    fn past() -> DateTime<Utc> {
        Utc::now() - ChronoDuration::seconds(1)
    }

    #[tokio::test]
    async fn test_email_job_is_sent() {
        let email = Arc::new(TestEmail::default());
        let (worker, repo) = setup(email.clone(), Arc::default(), WorkerConfig::default());
        let job = repo
            .enqueue(NewNotification::email("student@example.com", "Welcome", "Hi").send_at(past()))
            .await
            .unwrap();

        let report = worker.run_once().await.unwrap();
        assert_eq!(
            report,
            CycleReport {
                due: 1,
                sent: 1,
                retrying: 0,
                failed: 0
            }
        );

        let stored = repo.get(job.id).await.unwrap();
        assert_eq!(stored.status, NotificationStatus::Sent);
        assert_eq!(stored.attempts, 1);
        assert!(stored.sent_at.is_some());
        assert!(stored.last_attempt.is_some());

        let sent = email.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Welcome");
        assert_eq!(sent[0].to, "student@example.com");
    }

    #[tokio::test]
    async fn test_retry_until_cap_then_terminal() {
        let email = Arc::new(TestEmail::failing(u32::MAX));
        let (worker, repo) = setup(email.clone(), Arc::default(), WorkerConfig::default());
        let job = repo
            .enqueue(NewNotification::email("a@x.com", "s", "t").send_at(past()))
            .await
            .unwrap();

        for expected_attempts in 1..=2 {
            let report = worker.run_once().await.unwrap();
            assert_eq!(report.retrying, 1);
            let stored = repo.get(job.id).await.unwrap();
            assert_eq!(stored.status, NotificationStatus::Queued);
            assert_eq!(stored.attempts, expected_attempts);
        }

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.failed, 1);
        let stored = repo.get(job.id).await.unwrap();
        assert_eq!(stored.status, NotificationStatus::Failed);
        assert_eq!(stored.attempts, 3);
        assert!(stored.sent_at.is_none());

        // Terminal jobs are never picked up again.
        let report = worker.run_once().await.unwrap();
        assert_eq!(report.due, 0);
        assert_eq!(email.calls.load(Ordering::SeqCst), 3);
        assert_eq!(repo.get(job.id).await.unwrap(), stored);
    }

    #[tokio::test]
    async fn test_success_on_second_attempt_stops_retrying() {
        let email = Arc::new(TestEmail::failing(1));
        let (worker, repo) = setup(email.clone(), Arc::default(), WorkerConfig::default());
        let job = repo
            .enqueue(NewNotification::email("a@x.com", "s", "t").send_at(past()))
            .await
            .unwrap();

        worker.run_once().await.unwrap();
        worker.run_once().await.unwrap();
        worker.run_once().await.unwrap();

        let stored = repo.get(job.id).await.unwrap();
        assert_eq!(stored.status, NotificationStatus::Sent);
        assert_eq!(stored.attempts, 2);
        assert_eq!(email.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_future_job_is_not_touched() {
        let email = Arc::new(TestEmail::default());
        let (worker, repo) = setup(email.clone(), Arc::default(), WorkerConfig::default());
        let job = repo
            .enqueue(
                NewNotification::email("a@x.com", "s", "t")
                    .send_at(Utc::now() + ChronoDuration::hours(1)),
            )
            .await
            .unwrap();

        let before = repo.get(job.id).await.unwrap();

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.due, 0);
        assert_eq!(repo.get(job.id).await.unwrap(), before);
        assert_eq!(email.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reminder_to_phone_goes_out_as_sms() {
        let sms = Arc::new(TestSms::default());
        let (worker, repo) = setup(Arc::default(), sms.clone(), WorkerConfig::default());
        let job = repo
            .enqueue(
                NewNotification::new(
                    crate::domain::NotificationKind::Reminder,
                    "+15551234567",
                    Default::default(),
                )
                .send_at(past()),
            )
            .await
            .unwrap();

        worker.run_once().await.unwrap();

        assert_eq!(
            repo.get(job.id).await.unwrap().status,
            NotificationStatus::Sent
        );
        let sent = sms.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "+15551234567");
        assert_eq!(sent[0].body, "Reminder");
    }

    #[tokio::test]
    async fn test_panicking_channel_does_not_stop_cycle() {
        let email = Arc::new(TestEmail::default());
        let sms = Arc::new(TestSms {
            panic_for: Some("+10000000000".to_string()),
            ..Default::default()
        });
        let (worker, repo) = setup(email.clone(), sms, WorkerConfig::default());
        let broken = repo
            .enqueue(NewNotification::sms("+10000000000", "x").send_at(past()))
            .await
            .unwrap();
        let healthy = repo
            .enqueue(NewNotification::email("a@x.com", "s", "t").send_at(past()))
            .await
            .unwrap();

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.retrying, 1);
        assert_eq!(report.sent, 1);

        let broken = repo.get(broken.id).await.unwrap();
        assert_eq!(broken.status, NotificationStatus::Queued);
        assert_eq!(broken.attempts, 1);
        let healthy = repo.get(healthy.id).await.unwrap();
        assert_eq!(healthy.status, NotificationStatus::Sent);
    }

    #[tokio::test]
    async fn test_unknown_type_counts_as_failure() {
        let (worker, repo) = setup(
            Arc::default(),
            Arc::default(),
            WorkerConfig { max_attempts: 1 },
        );
        let job = repo
            .enqueue(
                NewNotification::new(
                    crate::domain::NotificationKind::Other("fax".to_string()),
                    "555",
                    Default::default(),
                )
                .send_at(past()),
            )
            .await
            .unwrap();

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.failed, 1);
        let stored = repo.get(job.id).await.unwrap();
        assert_eq!(stored.status, NotificationStatus::Failed);
        assert_eq!(stored.attempts, 1);
    }

    fn setup_with_records(
        email: Arc<TestEmail>,
        sms: Arc<TestSms>,
        records: serde_json::Value,
    ) -> (Arc<DispatchWorker>, Arc<MemoryRepo>) {
        let document = Document::from_value(serde_json::json!({ "notifications": records })).unwrap();
        let repo = Arc::new(DocumentNotificationRepository::new(
            MemoryDocumentStore::with_document(document),
        ));
        let worker = Arc::new(DispatchWorker::new(
            repo.clone(),
            Channels::new(email, sms),
            WorkerConfig::default(),
        ));
        (worker, repo)
    }

    #[tokio::test]
    async fn test_null_payload_fails_after_max_attempts() {
        let email = Arc::new(TestEmail::default());
        let (worker, repo) = setup_with_records(
            email.clone(),
            Arc::default(),
            serde_json::json!([
                { "id": 1, "type": "email", "to": "a@x.com", "payload": null,
                  "sendAt": "2020-01-01T00:00:00.000Z", "status": "queued" }
            ]),
        );

        for cycle in 1..=DEFAULT_MAX_ATTEMPTS {
            let report = worker.run_once().await.unwrap();
            assert_eq!(report.due, 1);
            let stored = repo.get(1).await.unwrap();
            assert_eq!(stored.attempts, cycle);
        }

        let stored = repo.get(1).await.unwrap();
        assert_eq!(stored.status, NotificationStatus::Failed);
        assert_eq!(email.calls.load(Ordering::SeqCst), 0);
        assert_eq!(worker.run_once().await.unwrap().due, 0);

        let saved = repo.store().snapshot().into_value();
        assert_eq!(saved["notifications"][0]["payload"], serde_json::Value::Null);
        assert_eq!(saved["notifications"][0]["status"], "failed");
    }

    #[tokio::test]
    async fn test_loosely_typed_records_are_dispatched() {
        let email = Arc::new(TestEmail::default());
        let sms = Arc::new(TestSms::default());
        let (worker, repo) = setup_with_records(
            email.clone(),
            sms.clone(),
            serde_json::json!([
                { "id": 1, "type": "email", "to": "a@x.com", "payload": null,
                  "sendAt": "2020-01-01T00:00:00.000Z", "status": "queued" },
                { "id": 2, "type": "email", "to": "b@x.com", "payload": { "text": "date only" },
                  "sendAt": "2020-01-01", "status": "queued" },
                { "id": 3, "type": "sms", "to": 5550100, "payload": { "text": "numeric to" },
                  "sendAt": "2020-01-01T00:00:00.000Z", "status": "queued" },
                { "id": 4, "type": "sms", "to": "+1", "payload": { "text": "null attempts" },
                  "sendAt": "2020-01-01T00:00:00.000Z", "status": "queued", "attempts": null }
            ]),
        );

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.due, 4);
        assert_eq!(report.sent, 3);
        assert_eq!(report.retrying, 1);

        for id in [2, 3, 4] {
            let stored = repo.get(id).await.unwrap();
            assert_eq!(stored.status, NotificationStatus::Sent);
            assert_eq!(stored.attempts, 1);
        }
        assert_eq!(email.sent.lock()[0].to, "b@x.com");
        let sms_sent: Vec<String> = sms.sent.lock().iter().map(|m| m.to.clone()).collect();
        assert_eq!(sms_sent, vec!["5550100".to_string(), "+1".to_string()]);

        worker.run_once().await.unwrap();
        let report = worker.run_once().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(worker.run_once().await.unwrap().due, 0);
    }

    #[tokio::test]
    async fn test_unscheduled_record_is_left_alone() {
        let records = serde_json::json!([
            { "id": 1, "type": "email", "to": "a@x.com", "payload": { "text": "x" },
              "sendAt": "next week", "status": "queued" }
        ]);
        let email = Arc::new(TestEmail::default());
        let (worker, repo) = setup_with_records(email.clone(), Arc::default(), records.clone());

        assert_eq!(worker.run_once().await.unwrap().due, 0);
        assert_eq!(email.calls.load(Ordering::SeqCst), 0);
        assert_eq!(repo.store().snapshot().into_value()["notifications"], records);
    }

    #[tokio::test]
    async fn test_start_twice_then_stop() {
        let (worker, _repo) = setup(Arc::default(), Arc::default(), WorkerConfig::default());

        assert!(worker.start(Duration::from_millis(1000)));
        assert!(!worker.start(Duration::from_millis(1000)));
        assert!(worker.is_running());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(worker.stats().cycles, 1);

        assert!(worker.stop());
        assert!(!worker.stop());
        assert!(!worker.is_running());

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(worker.stats().cycles, 1);
    }

    #[tokio::test]
    async fn test_store_errors_do_not_kill_timer() {
        let worker = Arc::new(DispatchWorker::new(
            Arc::new(BrokenRepo),
            Channels::new(Arc::new(TestEmail::default()), Arc::new(TestSms::default())),
            WorkerConfig::default(),
        ));

        assert!(worker.run_once().await.is_err());

        worker.start(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(worker.is_running());
        assert!(worker.stats().cycle_errors >= 2);

        worker.shutdown().await;
        assert!(!worker.is_running());
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let (worker, _repo) = setup(Arc::default(), Arc::default(), WorkerConfig::default());

        assert!(worker.start(Duration::from_secs(60)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        worker.shutdown().await;
        assert_eq!(worker.stats().cycles, 1);

        assert!(worker.start(Duration::from_secs(60)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(worker.stats().cycles, 2);
        worker.shutdown().await;
    }
}
