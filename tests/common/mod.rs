//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use coachloop::collaborators::OutboundMessage;
use coachloop::testing::{ManualClock, RecordingChannel, RecordingHandler, ScriptedAnalysis};
use coachloop::{
    Clock, Coach, EventBus, InMemoryStorage, LocalTime, Notice, Scheduler, SchedulerHandle,
    Sphere, Storage, User,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A running coach wired to a real scheduler and a manual clock.
pub struct Harness {
    pub storage: Arc<InMemoryStorage>,
    pub clock: Arc<ManualClock>,
    pub channel: Arc<RecordingChannel>,
    pub analysis: Arc<ScriptedAnalysis>,
    pub events: Arc<RecordingHandler>,
    pub event_bus: Arc<EventBus>,
    pub coach: Arc<Coach<InMemoryStorage>>,
    pub handle: SchedulerHandle,
    pub task: JoinHandle<()>,
}

impl Harness {
    /// Start on fresh storage.
    pub async fn start(now: DateTime<Utc>) -> Self {
        Self::start_with(Arc::new(InMemoryStorage::new()), now).await
    }

    /// Start on existing storage, as a restarted process would.
    pub async fn start_with(storage: Arc<InMemoryStorage>, now: DateTime<Utc>) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let channel = Arc::new(RecordingChannel::new());
        let analysis = Arc::new(ScriptedAnalysis::new());
        let events = Arc::new(RecordingHandler::new());
        let event_bus = Arc::new(EventBus::new());
        event_bus.register(events.clone()).await;

        let scheduler = Scheduler::new(clock.clone())
            .with_event_bus(Arc::clone(&event_bus))
            .with_tick_interval(Duration::from_millis(10))
            .with_shutdown_timeout(Duration::from_secs(2));
        let jobs = Arc::new(scheduler.handle());

        let coach = Arc::new(
            Coach::new(Arc::clone(&storage), jobs, clock.clone())
                .with_channel(channel.clone())
                .with_analysis(analysis.clone())
                .with_event_bus(Arc::clone(&event_bus)),
        );
        let (handle, task) = scheduler.start(coach.clone()).await;

        Self {
            storage,
            clock,
            channel,
            analysis,
            events,
            event_bus,
            coach,
            handle,
            task,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Move the clock and give the scheduler a few ticks to notice.
    pub async fn advance(&self, by: ChronoDuration) {
        self.clock.advance(by);
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    pub async fn stop(self) {
        self.handle.shutdown().await.unwrap();
        self.task.await.unwrap();
    }
}

/// Insert an onboarded user directly into storage.
pub async fn onboarded_user(
    storage: &InMemoryStorage,
    external_id: i64,
    timezone: Tz,
    morning: Option<(u32, u32)>,
    evening: Option<(u32, u32)>,
    now: DateTime<Utc>,
) -> User {
    let mut user = storage
        .create_user(
            coachloop::core::models::NewUser {
                external_id,
                timezone,
            },
            now,
        )
        .await
        .unwrap();
    user.spheres = vec![Sphere::Work, Sphere::Health, Sphere::Learning];
    user.weekly_focus = Some("ship the release".into());
    user.monthly_focus = Some("get fit".into());
    user.morning_time = morning.map(|(h, m)| LocalTime::new(h, m).unwrap());
    user.evening_time = evening.map(|(h, m)| LocalTime::new(h, m).unwrap());
    user.onboarded = true;
    storage.update_user(user.clone()).await.unwrap();
    user
}

/// Wait until the channel has delivered a message matching `predicate`.
///
/// Polls every 10ms and panics after `timeout`.
pub async fn wait_for_notice<F>(channel: &RecordingChannel, predicate: F, timeout: Duration) -> Notice
where
    F: Fn(&Notice) -> bool,
{
    let start = tokio::time::Instant::now();
    loop {
        if let Some(notice) = channel.notices().into_iter().find(|n| predicate(n)) {
            return notice;
        }
        if start.elapsed() > timeout {
            panic!(
                "Timeout waiting for notice, delivered so far: {:?}",
                channel.notices()
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Notices carried by a list of delivered messages.
pub fn notices(messages: &[(i64, OutboundMessage)]) -> Vec<&Notice> {
    messages.iter().map(|(_, m)| &m.notice).collect()
}
