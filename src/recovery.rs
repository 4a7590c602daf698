//! Rebuild of the live job table from storage.
//!
//! The scheduler's table is process-local, so after a restart it is empty.
//! [`RebuildManager::rebuild`] re-registers every job whose next fire is still
//! in the future. Registration replaces jobs by id, so running it twice in a
//! row leaves the same table as running it once.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::core::clock::Clock;
use crate::core::models::User;
use crate::error::RecoveryError;
use crate::events::{Event, EventBus};
use crate::scheduler::{JobScheduler, JobSpec};
use crate::storage::{Storage, StorageError};
use crate::timing::{checkin_jobs, evening_jobs, is_future, local_day_start, morning_job};

/// Outcome of a rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Jobs registered.
    pub registered: usize,
    /// Planned one-shot jobs whose instant had already passed.
    pub skipped: usize,
    /// Users or registrations that failed.
    pub failures: usize,
}

/// Reconstructs scheduled jobs on startup.
pub struct RebuildManager<S: Storage> {
    storage: Arc<S>,
    scheduler: Arc<dyn JobScheduler>,
    clock: Arc<dyn Clock>,
    event_bus: Arc<EventBus>,
}

impl<S: Storage> RebuildManager<S> {
    pub fn new(storage: Arc<S>, scheduler: Arc<dyn JobScheduler>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            scheduler,
            clock,
            event_bus: Arc::new(EventBus::new()),
        }
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Rebuild against the clock's current instant.
    pub async fn rebuild(&self) -> Result<RebuildReport, RecoveryError> {
        self.rebuild_at(self.clock.now()).await
    }

    /// Rebuild as if the process started at `now`.
    ///
    /// A failure for one user is counted and logged; the other users are
    /// still rebuilt.
    pub async fn rebuild_at(&self, now: DateTime<Utc>) -> Result<RebuildReport, RecoveryError> {
        let users = self
            .storage
            .list_users()
            .await
            .map_err(RecoveryError::ListUsers)?;

        let mut report = RebuildReport::default();
        for user in &users {
            let plan = match self.plan_for_user(user, now).await {
                Ok(plan) => plan,
                Err(e) => {
                    tracing::warn!(user_id = %user.id, error = %e, "Failed to plan jobs for user");
                    report.failures += 1;
                    continue;
                }
            };

            for spec in plan {
                if !is_future(&spec, now) {
                    tracing::debug!(job_id = %spec.id, "Skipping past-due job");
                    report.skipped += 1;
                    continue;
                }
                let job_id = spec.id.clone();
                match self.scheduler.register(spec).await {
                    Ok(()) => report.registered += 1,
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "Failed to register job");
                        report.failures += 1;
                    }
                }
            }
        }

        tracing::info!(
            users = users.len(),
            registered = report.registered,
            skipped = report.skipped,
            failures = report.failures,
            "Rebuild completed"
        );
        self.event_bus
            .emit(Event::RebuildCompleted {
                registered: report.registered,
                skipped: report.skipped,
                failures: report.failures,
                at: now,
            })
            .await;

        Ok(report)
    }

    /// Every job the user should have, past-due ones included.
    async fn plan_for_user(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobSpec>, StorageError> {
        let mut plan = Vec::new();
        if user.wants_morning_prompt() {
            plan.extend(morning_job(user));
        }

        // From the start of local yesterday so check-ins running past
        // midnight are still found.
        let today = user.local_today(now);
        let since = today
            .pred_opt()
            .map(|yesterday| local_day_start(yesterday, user.timezone))
            .unwrap_or(now - Duration::days(1));
        let sessions = self
            .storage
            .list_sessions_accepted_between(user.id, since, now + Duration::seconds(1))
            .await?;

        for session in sessions {
            let Some(accepted_at) = session.accepted_at else {
                continue;
            };
            plan.extend(checkin_jobs(user.id, session.id, accepted_at));
            if self.storage.find_evening_report(session.id).await?.is_none() {
                plan.extend(evening_jobs(user, &session, now));
            }
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::local_time::LocalTime;
    use crate::core::models::{CheckinKind, DumpCapture, EveningStatus, NewUser};
    use crate::core::types::JobId;
    use crate::scheduler::{JobPayload, SchedulerError, TriggerSpec};
    use crate::storage::InMemoryStorage;
    use crate::testing::ManualClock;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::Tz;
    use std::collections::BTreeMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct TableScheduler {
        jobs: Mutex<BTreeMap<JobId, TriggerSpec>>,
    }

    #[async_trait]
    impl JobScheduler for TableScheduler {
        async fn schedule_once(
            &self,
            job_id: JobId,
            fire_at: DateTime<Utc>,
            _payload: JobPayload,
        ) -> Result<(), SchedulerError> {
            self.jobs.lock().await.insert(job_id, TriggerSpec::At(fire_at));
            Ok(())
        }

        async fn schedule_recurring(
            &self,
            job_id: JobId,
            time: LocalTime,
            timezone: Tz,
            _payload: JobPayload,
        ) -> Result<(), SchedulerError> {
            self.jobs
                .lock()
                .await
                .insert(job_id, TriggerSpec::Daily { time, timezone });
            Ok(())
        }

        async fn cancel(&self, job_id: &JobId) -> Result<bool, SchedulerError> {
            Ok(self.jobs.lock().await.remove(job_id).is_some())
        }
    }

    fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap()
    }

    async fn user(storage: &InMemoryStorage, evening: Option<&str>) -> User {
        let mut user = storage
            .create_user(
                NewUser {
                    external_id: 1,
                    timezone: chrono_tz::Europe::Moscow,
                },
                utc(1, 0, 0),
            )
            .await
            .unwrap();
        user.onboarded = true;
        user.morning_time = Some(LocalTime::new(8, 0).unwrap());
        user.evening_time = evening.map(|t| t.parse().unwrap());
        storage.update_user(user.clone()).await.unwrap();
        user
    }

    async fn accepted(
        storage: &InMemoryStorage,
        user: &User,
        day: u32,
        at: DateTime<Utc>,
    ) -> crate::core::types::SessionId {
        let outcome = storage
            .save_dump(
                user.id,
                NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
                DumpCapture {
                    text: "a long enough dump".into(),
                    via_voice: false,
                    analysis: serde_json::json!({}),
                },
                at,
            )
            .await
            .unwrap();
        storage.accept_session(outcome.session().id, 3, at).await.unwrap().id
    }

    fn manager(
        storage: Arc<InMemoryStorage>,
        scheduler: Arc<TableScheduler>,
        now: DateTime<Utc>,
    ) -> RebuildManager<InMemoryStorage> {
        RebuildManager::new(storage, scheduler, Arc::new(ManualClock::new(now)))
    }

    #[tokio::test]
    async fn test_restart_registers_only_future_checkin() {
        let storage = Arc::new(InMemoryStorage::new());
        let scheduler = Arc::new(TableScheduler::default());
        let user = user(&storage, None).await;
        // Accepted at 09:00 Moscow, restart at 13:00 Moscow.
        let session = accepted(&storage, &user, 1, utc(1, 6, 0)).await;

        let report = manager(storage, scheduler.clone(), utc(1, 10, 0))
            .rebuild()
            .await
            .unwrap();

        let jobs = scheduler.jobs.lock().await.clone();
        assert!(!jobs.contains_key(&JobId::checkin(session, CheckinKind::ThreeHours)));
        assert_eq!(
            jobs.get(&JobId::checkin(session, CheckinKind::SixHours)),
            Some(&TriggerSpec::At(utc(1, 12, 0)))
        );
        assert!(jobs.contains_key(&JobId::morning(user.id)));
        assert_eq!(report.registered, 2);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_rebuild_after_evening_time_skips_chain() {
        let storage = Arc::new(InMemoryStorage::new());
        let scheduler = Arc::new(TableScheduler::default());
        let user = user(&storage, Some("21:00")).await;
        let session = accepted(&storage, &user, 1, utc(1, 6, 0)).await;

        // 21:05 Moscow.
        manager(storage, scheduler.clone(), utc(1, 18, 5))
            .rebuild()
            .await
            .unwrap();

        let jobs = scheduler.jobs.lock().await.clone();
        for attempt in 1..=3 {
            assert!(!jobs.contains_key(&JobId::evening(session, attempt)));
        }
    }

    #[tokio::test]
    async fn test_rebuild_at_exact_evening_time_registers_no_partial_chain() {
        let storage = Arc::new(InMemoryStorage::new());
        let scheduler = Arc::new(TableScheduler::default());
        let user = user(&storage, Some("21:00")).await;
        let session = accepted(&storage, &user, 1, utc(1, 6, 0)).await;

        // 21:00 Moscow exactly.
        manager(storage, scheduler.clone(), utc(1, 18, 0))
            .rebuild()
            .await
            .unwrap();

        let jobs = scheduler.jobs.lock().await.clone();
        for attempt in 1..=3 {
            assert!(!jobs.contains_key(&JobId::evening(session, attempt)));
        }
    }

    #[tokio::test]
    async fn test_report_suppresses_evening_chain() {
        let storage = Arc::new(InMemoryStorage::new());
        let scheduler = Arc::new(TableScheduler::default());
        let user = user(&storage, Some("21:00")).await;
        let session = accepted(&storage, &user, 1, utc(1, 6, 0)).await;
        storage
            .upsert_evening_report(session, EveningStatus::Partial, "ok".into(), utc(1, 8, 0))
            .await
            .unwrap();

        manager(storage, scheduler.clone(), utc(1, 10, 0))
            .rebuild()
            .await
            .unwrap();
        let jobs = scheduler.jobs.lock().await.clone();
        assert!(!jobs.contains_key(&JobId::evening(session, 1)));
    }

    #[tokio::test]
    async fn test_rebuild_twice_gives_same_table() {
        let storage = Arc::new(InMemoryStorage::new());
        let scheduler = Arc::new(TableScheduler::default());
        let user = user(&storage, Some("21:00")).await;
        accepted(&storage, &user, 1, utc(1, 6, 0)).await;

        let manager = manager(storage, scheduler.clone(), utc(1, 7, 0));
        let first = manager.rebuild().await.unwrap();
        let after_first = scheduler.jobs.lock().await.clone();
        let second = manager.rebuild().await.unwrap();
        let after_second = scheduler.jobs.lock().await.clone();

        assert_eq!(first, second);
        assert_eq!(after_first, after_second);
        // morning + t3 + t6 + three evening reminders
        assert_eq!(after_first.len(), 6);
    }

    #[tokio::test]
    async fn test_checkins_crossing_local_midnight_are_rebuilt() {
        let storage = Arc::new(InMemoryStorage::new());
        let scheduler = Arc::new(TableScheduler::default());
        let user = user(&storage, None).await;
        // Accepted 22:00 Moscow on Jan 1; +3h is 01:00 on Jan 2.
        let session = accepted(&storage, &user, 1, utc(1, 19, 0)).await;

        // 00:30 Moscow on Jan 2.
        manager(storage, scheduler.clone(), utc(1, 21, 30))
            .rebuild()
            .await
            .unwrap();
        let jobs = scheduler.jobs.lock().await.clone();
        assert_eq!(
            jobs.get(&JobId::checkin(session, CheckinKind::ThreeHours)),
            Some(&TriggerSpec::At(utc(1, 22, 0)))
        );
    }

    #[tokio::test]
    async fn test_users_not_onboarded_get_no_morning_job() {
        let storage = Arc::new(InMemoryStorage::new());
        let scheduler = Arc::new(TableScheduler::default());
        storage
            .create_user(
                NewUser {
                    external_id: 5,
                    timezone: chrono_tz::UTC,
                },
                utc(1, 0, 0),
            )
            .await
            .unwrap();

        let report = manager(storage, scheduler.clone(), utc(1, 7, 0))
            .rebuild()
            .await
            .unwrap();
        assert_eq!(report, RebuildReport::default());
        assert!(scheduler.jobs.lock().await.is_empty());
    }
}
