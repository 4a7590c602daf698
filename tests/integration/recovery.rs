//! Recovery integration tests.
//!
//! Tests that verify pending jobs are reconstructed from storage after a
//! restart, and that rebuilding twice never duplicates anything.

use crate::common::{Harness, onboarded_user};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use coachloop::core::models::DumpCapture;
use coachloop::testing::RecordingHandler;
use coachloop::{
    CheckinKind, Event, EventBus, EveningStatus, InMemoryStorage, JobId, JobScheduler,
    RebuildManager, RebuildReport, SessionId, Storage, TriggerSpec, User,
};
use std::sync::Arc;

fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, h, m, 0).unwrap()
}

async fn accepted_session<S: Storage>(
    storage: &S,
    user: &User,
    date: NaiveDate,
    at: DateTime<Utc>,
) -> SessionId {
    let outcome = storage
        .save_dump(
            user.id,
            date,
            DumpCapture {
                text: "the report, the gym and groceries".into(),
                via_voice: false,
                analysis: serde_json::json!({}),
            },
            at,
        )
        .await
        .unwrap();
    let id = outcome.session().id;
    storage.accept_session(id, 3, at).await.unwrap();
    id
}

fn manager(h: &Harness) -> RebuildManager<InMemoryStorage> {
    let jobs: Arc<dyn JobScheduler> = Arc::new(h.handle.clone());
    RebuildManager::new(Arc::clone(&h.storage), jobs, h.clock.clone())
        .with_event_bus(Arc::clone(&h.event_bus))
}

/// Test: Rebuilding twice registers the same table.
#[tokio::test]
async fn test_rebuild_is_idempotent() {
    // 09:30 Moscow.
    let h = Harness::start(utc(1, 6, 30)).await;
    let user = onboarded_user(
        &h.storage,
        1,
        chrono_tz::Europe::Moscow,
        Some((9, 0)),
        Some((21, 0)),
        utc(1, 6, 0),
    )
    .await;
    let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let session_id = accepted_session(&*h.storage, &user, day, utc(1, 6, 0)).await;

    let first = manager(&h).rebuild().await.unwrap();
    let table = h.handle.jobs().await.unwrap();
    let second = manager(&h).rebuild().await.unwrap();

    assert_eq!(
        first,
        RebuildReport {
            registered: 6,
            skipped: 0,
            failures: 0,
        }
    );
    assert_eq!(first, second);
    assert_eq!(h.handle.jobs().await.unwrap(), table);

    let morning = h
        .handle
        .job(&JobId::morning(user.id))
        .await
        .unwrap()
        .expect("morning job");
    assert!(matches!(morning.spec.trigger, TriggerSpec::Daily { .. }));
    // Today's 09:00 has passed; the next one is tomorrow.
    assert_eq!(morning.next_fire, utc(2, 6, 0));
    assert!(
        h.handle
            .job(&JobId::checkin(session_id, CheckinKind::SixHours))
            .await
            .unwrap()
            .is_some()
    );

    h.stop().await;
}

/// Test: A stored evening report keeps the reminder chain from coming back.
#[tokio::test]
async fn test_report_suppresses_evening_chain_on_rebuild() {
    let h = Harness::start(utc(1, 10, 0)).await;
    let user = onboarded_user(
        &h.storage,
        2,
        chrono_tz::Europe::Moscow,
        None,
        Some((21, 0)),
        utc(1, 6, 0),
    )
    .await;
    let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let session_id = accepted_session(&*h.storage, &user, day, utc(1, 6, 0)).await;
    h.storage
        .upsert_evening_report(
            session_id,
            EveningStatus::Partial,
            "half of it".into(),
            utc(1, 9, 0),
        )
        .await
        .unwrap();

    let report = manager(&h).rebuild().await.unwrap();
    assert_eq!(report.registered, 1);
    let ids: Vec<_> = h
        .handle
        .jobs()
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.spec.id)
        .collect();
    assert_eq!(ids, vec![JobId::checkin(session_id, CheckinKind::SixHours)]);

    h.stop().await;
}

/// Test: Check-ins of a session accepted late yesterday survive midnight.
#[tokio::test]
async fn test_checkins_from_yesterday_are_rebuilt() {
    // 00:30 on 2 January in New York (UTC-5).
    let h = Harness::start(utc(2, 5, 30)).await;
    let user = onboarded_user(
        &h.storage,
        3,
        chrono_tz::America::New_York,
        None,
        None,
        utc(1, 12, 0),
    )
    .await;
    // Accepted at 23:00 local on 1 January.
    let yesterday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let session_id = accepted_session(&*h.storage, &user, yesterday, utc(2, 4, 0)).await;

    let report = manager(&h).rebuild().await.unwrap();
    assert_eq!(report.registered, 2);
    let t3 = h
        .handle
        .job(&JobId::checkin(session_id, CheckinKind::ThreeHours))
        .await
        .unwrap()
        .expect("t3 job");
    assert_eq!(t3.next_fire, utc(2, 7, 0));

    h.stop().await;
}

/// Test: Users who never finished onboarding get no jobs, and the rebuild is reported.
#[tokio::test]
async fn test_rebuild_reports_through_event_bus() {
    let h = Harness::start(utc(1, 6, 0)).await;
    h.storage
        .create_user(
            coachloop::core::models::NewUser {
                external_id: 4,
                timezone: chrono_tz::Europe::Moscow,
            },
            utc(1, 5, 0),
        )
        .await
        .unwrap();

    let handler = Arc::new(RecordingHandler::new());
    let bus = Arc::new(EventBus::new());
    bus.register(handler.clone()).await;
    let jobs: Arc<dyn JobScheduler> = Arc::new(h.handle.clone());
    let report = RebuildManager::new(Arc::clone(&h.storage), jobs, h.clock.clone())
        .with_event_bus(bus)
        .rebuild()
        .await
        .unwrap();

    assert_eq!(report, RebuildReport::default());
    assert!(h.handle.jobs().await.unwrap().is_empty());
    assert_eq!(
        handler.events().await,
        vec![Event::RebuildCompleted {
            registered: 0,
            skipped: 0,
            failures: 0,
            at: utc(1, 6, 0),
        }]
    );

    h.stop().await;
}

/// Test: Jobs come back from a SQLite file after the process restarts.
#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_rebuild_from_sqlite_file() {
    use async_trait::async_trait;
    use coachloop::testing::ManualClock;
    use coachloop::{DispatchError, FiredJob, JobDispatcher, Scheduler, SqliteStorage};

    struct Ignore;

    #[async_trait]
    impl JobDispatcher for Ignore {
        async fn dispatch(&self, _fire: FiredJob) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("coachloop.db");
    let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

    let session_id = {
        let storage = SqliteStorage::new(&path).await.unwrap();
        let mut user = storage
            .create_user(
                coachloop::core::models::NewUser {
                    external_id: 5,
                    timezone: chrono_tz::Europe::Moscow,
                },
                utc(1, 5, 0),
            )
            .await
            .unwrap();
        user.onboarded = true;
        storage.update_user(user.clone()).await.unwrap();
        let id = accepted_session(&storage, &user, day, utc(1, 6, 0)).await;
        storage.close().await;
        id
    };

    // 13:00 Moscow: only the six-hour check-in is still ahead.
    let storage = Arc::new(SqliteStorage::new(&path).await.unwrap());
    let clock = Arc::new(ManualClock::new(utc(1, 10, 0)));
    let (handle, task) = Scheduler::new(clock.clone()).start(Arc::new(Ignore)).await;
    let jobs: Arc<dyn JobScheduler> = Arc::new(handle.clone());

    let report = RebuildManager::new(storage, jobs, clock).rebuild().await.unwrap();
    assert_eq!(
        report,
        RebuildReport {
            registered: 1,
            skipped: 1,
            failures: 0,
        }
    );
    assert!(
        handle
            .job(&JobId::checkin(session_id, CheckinKind::SixHours))
            .await
            .unwrap()
            .is_some()
    );

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}
