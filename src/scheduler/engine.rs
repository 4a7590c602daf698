//! Scheduler engine.
//!
//! The scheduler owns the live job table inside a single task. Callers talk to
//! it through [`SchedulerHandle`]; fires are handed to a [`JobDispatcher`] on
//! their own tasks so a slow delivery never delays the tick loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;

use super::handle::{COMMAND_CHANNEL_BUFFER, SchedulerHandle};
use super::job::{FiredJob, JobDispatcher, JobSnapshot, JobSpec, ScheduledJob};
use super::types::{SchedulerCommand, SchedulerError, SchedulerState};
use crate::core::clock::Clock;
use crate::core::types::{FireId, JobId};
use crate::events::{Event, EventBus};

/// Scheduler service for one-shot and daily recurring jobs.
pub struct Scheduler {
    /// Live jobs keyed by deterministic id.
    jobs: HashMap<JobId, ScheduledJob>,
    /// Source of "now" for due checks.
    clock: Arc<dyn Clock>,
    /// Event bus for emitting events.
    event_bus: Arc<EventBus>,
    /// Tick interval for checking due jobs.
    tick_interval: Duration,
    /// Dispatches still running.
    in_flight: HashMap<FireId, (JobId, JoinHandle<()>)>,
    /// Graceful shutdown timeout (default: 30 seconds).
    shutdown_timeout: Duration,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: Option<mpsc::Receiver<SchedulerCommand>>,
    state: Arc<RwLock<SchedulerState>>,
}

impl Scheduler {
    /// Create a new scheduler reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
        Self {
            jobs: HashMap::new(),
            clock,
            event_bus: Arc::new(EventBus::new()),
            tick_interval: Duration::from_secs(1),
            in_flight: HashMap::new(),
            shutdown_timeout: Duration::from_secs(30),
            command_tx,
            command_rx: Some(command_rx),
            state: Arc::new(RwLock::new(SchedulerState::Stopped)),
        }
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Set the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the graceful shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Get a handle before the scheduler is started.
    ///
    /// Components that register jobs can be built with this handle; their
    /// commands are served once [`Scheduler::start`] runs.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            command_tx: self.command_tx.clone(),
            state: Arc::clone(&self.state),
        }
    }

    /// Start the scheduler and return a handle for controlling it.
    ///
    /// The loop stops on [`SchedulerHandle::shutdown`] or once every handle
    /// has been dropped.
    pub async fn start(
        self,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        let handle = self.handle();
        *self.state.write().await = SchedulerState::Running;

        let scheduler_task = tokio::spawn(async move {
            self.run(dispatcher).await;
        });

        (handle, scheduler_task)
    }

    /// Main scheduler loop.
    async fn run(mut self, dispatcher: Arc<dyn JobDispatcher>) {
        let Some(mut command_rx) = self.command_rx.take() else {
            return;
        };
        // Only handles keep the channel open from here on.
        let (closed_tx, _) = mpsc::channel(1);
        self.command_tx = closed_tx;

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            jobs = self.jobs.len(),
            tick_ms = self.tick_interval.as_millis() as u64,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let current_state = *self.state.read().await;
                    if current_state == SchedulerState::Running {
                        self.fire_due(&dispatcher).await;
                    }

                    self.in_flight.retain(|_, (_, handle)| !handle.is_finished());
                }

                command = command_rx.recv() => {
                    let Some(command) = command else {
                        tracing::info!("All scheduler handles dropped, stopping");
                        *self.state.write().await = SchedulerState::Stopped;
                        self.await_in_flight().await;
                        break;
                    };

                    match command {
                        SchedulerCommand::Register { spec, response } => {
                            let _ = response.send(self.register(spec));
                        }
                        SchedulerCommand::Cancel { job_id, response } => {
                            let existed = self.jobs.remove(&job_id).is_some();
                            tracing::debug!(job_id = %job_id, existed, "Job cancelled");
                            let _ = response.send(Ok(existed));
                        }
                        SchedulerCommand::Snapshot { response } => {
                            let _ = response.send(Ok(self.snapshot()));
                        }
                        SchedulerCommand::Pause { response } => {
                            *self.state.write().await = SchedulerState::Paused;
                            let _ = response.send(());
                        }
                        SchedulerCommand::Resume { response } => {
                            *self.state.write().await = SchedulerState::Running;
                            self.skip_missed_recurring();
                            tracing::info!("Scheduler resumed, skipping daily occurrences missed during pause");
                            let _ = response.send(());
                        }
                        SchedulerCommand::Shutdown { response } => {
                            *self.state.write().await = SchedulerState::Stopped;

                            // Wait for dispatches to complete with timeout
                            self.await_in_flight().await;

                            let _ = response.send(());
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Insert or replace a job.
    fn register(&mut self, spec: JobSpec) -> Result<(), SchedulerError> {
        let job = ScheduledJob::resolve(spec, self.clock.now())?;
        let job_id = job.spec.id.clone();
        let replaced = self.jobs.insert(job_id.clone(), job).is_some();
        tracing::debug!(job_id = %job_id, replaced, "Job registered");
        Ok(())
    }

    fn snapshot(&self) -> Vec<JobSnapshot> {
        let mut jobs: Vec<_> = self.jobs.values().map(ScheduledJob::snapshot).collect();
        jobs.sort_by(|a, b| a.spec.id.cmp(&b.spec.id));
        jobs
    }

    /// Move daily jobs whose occurrence passed while paused to their next occurrence.
    fn skip_missed_recurring(&mut self) {
        let now = self.clock.now();
        let mut broken = Vec::new();
        for (job_id, job) in self.jobs.iter_mut() {
            if job.is_recurring() && job.next_fire <= now {
                if let Err(e) = job.advance(now) {
                    tracing::warn!(job_id = %job_id, error = %e, "Dropping job with unresolvable schedule");
                    broken.push(job_id.clone());
                }
            }
        }
        for job_id in broken {
            self.jobs.remove(&job_id);
        }
    }

    /// Fire every job whose next fire instant has been reached.
    ///
    /// One-shot jobs leave the table when they fire. Daily jobs move to their
    /// next occurrence; several missed occurrences fire only once.
    async fn fire_due(&mut self, dispatcher: &Arc<dyn JobDispatcher>) {
        let now = self.clock.now();
        let mut due: Vec<(chrono::DateTime<chrono::Utc>, JobId)> = self
            .jobs
            .values()
            .filter(|job| job.next_fire <= now)
            .map(|job| (job.next_fire, job.spec.id.clone()))
            .collect();
        due.sort();

        for (scheduled_for, job_id) in due {
            let Some(job) = self.jobs.get_mut(&job_id) else {
                continue;
            };

            let fire = FiredJob {
                fire_id: FireId::new(),
                job_id: job_id.clone(),
                payload: job.spec.payload.clone(),
                scheduled_for,
            };

            if job.is_recurring() {
                if let Err(e) = job.advance(now) {
                    tracing::warn!(job_id = %job_id, error = %e, "Dropping job with unresolvable schedule");
                    self.jobs.remove(&job_id);
                }
            } else {
                self.jobs.remove(&job_id);
            }

            self.dispatch(fire, Arc::clone(dispatcher)).await;
        }
    }

    /// Hand one fire to the dispatcher on its own task.
    async fn dispatch(&mut self, fire: FiredJob, dispatcher: Arc<dyn JobDispatcher>) {
        tracing::debug!(
            job_id = %fire.job_id,
            fire_id = %fire.fire_id,
            scheduled_for = %fire.scheduled_for,
            "Job fired"
        );
        self.event_bus
            .emit(Event::JobFired {
                job_id: fire.job_id.clone(),
                fire_id: fire.fire_id,
                scheduled_for: fire.scheduled_for,
                at: self.clock.now(),
            })
            .await;

        let fire_id = fire.fire_id;
        let job_id = fire.job_id.clone();
        let event_bus = Arc::clone(&self.event_bus);
        let clock = Arc::clone(&self.clock);

        let handle = tokio::spawn(async move {
            let job_id = fire.job_id.clone();
            let fire_id = fire.fire_id;
            if let Err(e) = dispatcher.dispatch(fire).await {
                // At-least-once delivery with no retry: a failed fire is dropped.
                tracing::warn!(job_id = %job_id, fire_id = %fire_id, error = %e, "Dispatch failed, dropping fire");
                event_bus
                    .emit(Event::JobDispatchFailed {
                        job_id,
                        fire_id,
                        error: e.to_string(),
                        at: clock.now(),
                    })
                    .await;
            }
        });

        self.in_flight.insert(fire_id, (job_id, handle));
    }

    /// Wait for all in-flight dispatches to complete with a timeout.
    async fn await_in_flight(&mut self) {
        self.in_flight.retain(|_, (_, handle)| !handle.is_finished());
        if self.in_flight.is_empty() {
            tracing::info!("No dispatches in flight during shutdown");
            return;
        }

        tracing::info!(
            "Graceful shutdown: waiting for {} dispatch(es) to complete (timeout: {:?})",
            self.in_flight.len(),
            self.shutdown_timeout
        );

        let start = tokio::time::Instant::now();
        let deadline = start + self.shutdown_timeout;

        loop {
            self.in_flight.retain(|_, (_, handle)| !handle.is_finished());
            let remaining = self.in_flight.len();

            if remaining == 0 {
                tracing::info!("All dispatches completed gracefully in {:?}", start.elapsed());
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                let pending: Vec<String> = self
                    .in_flight
                    .values()
                    .map(|(job_id, _)| job_id.to_string())
                    .collect();
                tracing::warn!(
                    pending = ?pending,
                    "Graceful shutdown timeout ({:?}) exceeded with {} dispatch(es) still running",
                    self.shutdown_timeout,
                    remaining
                );
                break;
            }

            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::local_time::LocalTime;
    use crate::core::models::CheckinKind;
    use crate::core::types::{SessionId, UserId};
    use crate::scheduler::job::{DispatchError, JobPayload};
    use crate::scheduler::JobScheduler;
    use crate::testing::ManualClock;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    struct RecordingDispatcher {
        fires: Mutex<Vec<FiredJob>>,
        fail: AtomicBool,
    }

    impl RecordingDispatcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fires: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            })
        }

        async fn job_ids(&self) -> Vec<String> {
            self.fires
                .lock()
                .await
                .iter()
                .map(|f| f.job_id.to_string())
                .collect()
        }
    }

    #[async_trait]
    impl JobDispatcher for RecordingDispatcher {
        async fn dispatch(&self, fire: FiredJob) -> Result<(), DispatchError> {
            self.fires.lock().await.push(fire);
            if self.fail.load(Ordering::SeqCst) {
                return Err(DispatchError::Delivery("channel down".into()));
            }
            Ok(())
        }
    }

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap()
    }

    fn checkin_payload(kind: CheckinKind) -> JobPayload {
        JobPayload::Checkin {
            user_id: UserId::new(1),
            session_id: SessionId::new(1),
            kind,
        }
    }

    async fn start(
        clock: Arc<ManualClock>,
        dispatcher: Arc<RecordingDispatcher>,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        Scheduler::new(clock)
            .with_tick_interval(Duration::from_millis(10))
            .start(dispatcher)
            .await
    }

    async fn wait_for_fires(dispatcher: &RecordingDispatcher, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while dispatcher.fires.lock().await.len() < count {
            if tokio::time::Instant::now() > deadline {
                panic!("timed out waiting for {} fire(s)", count);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_register_same_id_keeps_one_job() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let dispatcher = RecordingDispatcher::new();
        let (handle, task) = start(clock, dispatcher).await;

        let id = JobId::checkin(SessionId::new(1), CheckinKind::ThreeHours);
        let first = start_time() + chrono::Duration::hours(3);
        let second = start_time() + chrono::Duration::hours(4);
        handle
            .schedule_once(id.clone(), first, checkin_payload(CheckinKind::ThreeHours))
            .await
            .unwrap();
        handle
            .schedule_once(id.clone(), second, checkin_payload(CheckinKind::SixHours))
            .await
            .unwrap();

        let jobs = handle.jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].next_fire, second);
        assert_eq!(jobs[0].spec.payload, checkin_payload(CheckinKind::SixHours));

        handle.shutdown().await.unwrap();
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_one_shot_fires_once_when_due() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let dispatcher = RecordingDispatcher::new();
        let (handle, task) = start(clock.clone(), dispatcher.clone()).await;

        let id = JobId::checkin(SessionId::new(1), CheckinKind::ThreeHours);
        handle
            .schedule_once(
                id.clone(),
                start_time() + chrono::Duration::hours(3),
                checkin_payload(CheckinKind::ThreeHours),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(dispatcher.fires.lock().await.is_empty());

        clock.advance(chrono::Duration::hours(3));
        wait_for_fires(&dispatcher, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(dispatcher.job_ids().await, vec!["checkin:1:t3".to_string()]);
        assert!(handle.job(&id).await.unwrap().is_none());

        handle.shutdown().await.unwrap();
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_failed_dispatch_is_not_retried() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let dispatcher = RecordingDispatcher::new();
        dispatcher.fail.store(true, Ordering::SeqCst);

        let bus = Arc::new(EventBus::new());
        let recorder = Arc::new(crate::testing::RecordingHandler::new());
        bus.register(recorder.clone()).await;

        let (handle, task) = Scheduler::new(clock.clone())
            .with_event_bus(bus)
            .with_tick_interval(Duration::from_millis(10))
            .start(dispatcher.clone())
            .await;

        handle
            .schedule_once(
                JobId::evening(SessionId::new(1), 1),
                start_time(),
                JobPayload::EveningReminder {
                    user_id: UserId::new(1),
                    session_id: SessionId::new(1),
                    attempt: 1,
                },
            )
            .await
            .unwrap();

        wait_for_fires(&dispatcher, 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(dispatcher.fires.lock().await.len(), 1);
        assert!(handle.jobs().await.unwrap().is_empty());
        let names: Vec<_> = recorder.events().await.iter().map(|e| e.name()).collect();
        assert!(names.contains(&"job_fired"));
        assert!(names.contains(&"job_dispatch_failed"));

        handle.shutdown().await.unwrap();
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_recurring_job_fires_daily_in_user_timezone() {
        // 08:00 in Moscow.
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap()));
        let dispatcher = RecordingDispatcher::new();
        let (handle, task) = start(clock.clone(), dispatcher.clone()).await;

        let id = JobId::morning(UserId::new(1));
        handle
            .schedule_recurring(
                id.clone(),
                LocalTime::new(9, 0).unwrap(),
                chrono_tz::Europe::Moscow,
                JobPayload::MorningPrompt {
                    user_id: UserId::new(1),
                },
            )
            .await
            .unwrap();

        let job = handle.job(&id).await.unwrap().unwrap();
        assert_eq!(job.next_fire, Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap());

        clock.advance(chrono::Duration::hours(1));
        wait_for_fires(&dispatcher, 1).await;

        let job = handle.job(&id).await.unwrap().unwrap();
        assert_eq!(job.next_fire, Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap());

        handle.shutdown().await.unwrap();
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_cancel_removes_job() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let dispatcher = RecordingDispatcher::new();
        let (handle, task) = start(clock.clone(), dispatcher.clone()).await;

        let id = JobId::evening(SessionId::new(4), 2);
        handle
            .schedule_once(
                id.clone(),
                start_time() + chrono::Duration::minutes(30),
                JobPayload::EveningReminder {
                    user_id: UserId::new(1),
                    session_id: SessionId::new(4),
                    attempt: 2,
                },
            )
            .await
            .unwrap();

        assert!(handle.cancel(&id).await.unwrap());
        assert!(!handle.cancel(&id).await.unwrap());

        clock.advance(chrono::Duration::hours(1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(dispatcher.fires.lock().await.is_empty());

        handle.shutdown().await.unwrap();
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_pause_holds_fires_and_resume_skips_missed_daily() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap()));
        let dispatcher = RecordingDispatcher::new();
        let (handle, task) = start(clock.clone(), dispatcher.clone()).await;

        assert!(handle.is_running().await);
        handle.pause().await.unwrap();
        assert!(handle.is_paused().await);

        let morning = JobId::morning(UserId::new(1));
        handle
            .schedule_recurring(
                morning.clone(),
                LocalTime::new(9, 0).unwrap(),
                chrono_tz::Europe::Moscow,
                JobPayload::MorningPrompt {
                    user_id: UserId::new(1),
                },
            )
            .await
            .unwrap();
        let checkin = JobId::checkin(SessionId::new(1), CheckinKind::SixHours);
        handle
            .schedule_once(
                checkin.clone(),
                Utc.with_ymd_and_hms(2024, 1, 1, 6, 30, 0).unwrap(),
                checkin_payload(CheckinKind::SixHours),
            )
            .await
            .unwrap();

        clock.set(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(dispatcher.fires.lock().await.is_empty());

        handle.resume().await.unwrap();
        wait_for_fires(&dispatcher, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The one-shot fires late; the missed morning is skipped to tomorrow.
        assert_eq!(dispatcher.job_ids().await, vec![checkin.to_string()]);
        let job = handle.job(&morning).await.unwrap().unwrap();
        assert_eq!(job.next_fire, Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap());

        handle.shutdown().await.unwrap();
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_handle_clone_controls_same_scheduler() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let scheduler = Scheduler::new(clock).with_tick_interval(Duration::from_millis(10));
        let early = scheduler.handle();
        let (handle, task) = scheduler.start(RecordingDispatcher::new()).await;

        early
            .schedule_once(
                JobId::new("early"),
                start_time() + chrono::Duration::days(1),
                checkin_payload(CheckinKind::ThreeHours),
            )
            .await
            .unwrap();
        assert_eq!(handle.jobs().await.unwrap().len(), 1);

        let cloned = handle.clone();
        cloned.shutdown().await.unwrap();
        let _ = task.await;
        assert_eq!(handle.state().await, SchedulerState::Stopped);
    }
}
