//! End-to-end timing scenarios.
//!
//! A user in Europe/Moscow (UTC+3) accepts a focus at 09:00 local time. The
//! tests follow the jobs that acceptance registers through a restart.

use crate::common::{Harness, onboarded_user};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use coachloop::core::models::NewTodo;
use coachloop::session::CallbackCommand;
use coachloop::{
    CheckinKind, FocusChoice, InboundEvent, JobId, JobScheduler, Notice, RebuildManager,
    RebuildReport, SessionId, Storage, TodoResolver, TodoStatus, User,
};
use std::sync::Arc;

const EXTERNAL_ID: i64 = 4242;

fn utc(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
}

/// Dump, pick option A and confirm energy. Returns today's session id.
async fn accept_focus(h: &Harness, user: &User) -> SessionId {
    for event in [
        InboundEvent::text("so much to do today: the report, the gym, groceries"),
        InboundEvent::Command(CallbackCommand::Focus(FocusChoice::A)),
        InboundEvent::Command(CallbackCommand::Energy(4)),
    ] {
        h.coach.on_user_event(EXTERNAL_ID, event).await.unwrap();
    }
    let session = h
        .storage
        .find_session(user.id, user.local_today(h.now()))
        .await
        .unwrap()
        .expect("session for today");
    assert!(session.is_accepted());
    session.id
}

async fn rebuild(h: &Harness) -> RebuildReport {
    let jobs: Arc<dyn JobScheduler> = Arc::new(h.handle.clone());
    RebuildManager::new(Arc::clone(&h.storage), jobs, h.clock.clone())
        .with_event_bus(Arc::clone(&h.event_bus))
        .rebuild()
        .await
        .unwrap()
}

/// Scenario A: accepting at 09:00 local registers check-ins at 12:00 and 15:00.
#[tokio::test]
async fn test_acceptance_registers_checkins_three_and_six_hours_later() {
    let h = Harness::start(utc(6, 0)).await;
    let user = onboarded_user(
        &h.storage,
        EXTERNAL_ID,
        chrono_tz::Europe::Moscow,
        None,
        None,
        utc(6, 0),
    )
    .await;

    let session_id = accept_focus(&h, &user).await;

    let t3 = h
        .handle
        .job(&JobId::checkin(session_id, CheckinKind::ThreeHours))
        .await
        .unwrap()
        .expect("t3 registered");
    let t6 = h
        .handle
        .job(&JobId::checkin(session_id, CheckinKind::SixHours))
        .await
        .unwrap()
        .expect("t6 registered");
    // 12:00 and 15:00 in Moscow.
    assert_eq!(t3.next_fire, utc(9, 0));
    assert_eq!(t6.next_fire, utc(12, 0));
    assert_eq!(h.handle.jobs().await.unwrap().len(), 2);

    assert!(h.events.names().await.contains(&"focus_accepted"));

    h.stop().await;
}

/// Scenario B: a restart at 13:00 local re-registers only the six-hour check-in.
#[tokio::test]
async fn test_restart_after_first_checkin_rebuilds_only_the_second() {
    let h = Harness::start(utc(6, 0)).await;
    let user = onboarded_user(
        &h.storage,
        EXTERNAL_ID,
        chrono_tz::Europe::Moscow,
        None,
        None,
        utc(6, 0),
    )
    .await;
    let session_id = accept_focus(&h, &user).await;
    let storage = Arc::clone(&h.storage);
    h.stop().await;

    let restarted = Harness::start_with(storage, utc(10, 0)).await;
    assert!(restarted.handle.jobs().await.unwrap().is_empty());

    let report = rebuild(&restarted).await;
    assert_eq!(
        report,
        RebuildReport {
            registered: 1,
            skipped: 1,
            failures: 0,
        }
    );

    let jobs = restarted.handle.jobs().await.unwrap();
    let ids: Vec<_> = jobs.iter().map(|j| j.spec.id.clone()).collect();
    assert_eq!(ids, vec![JobId::checkin(session_id, CheckinKind::SixHours)]);
    assert_eq!(jobs[0].next_fire, utc(12, 0));

    restarted.stop().await;
}

/// Scenario C: a rebuild after the first evening reminder skips the whole chain.
#[tokio::test]
async fn test_rebuild_after_evening_time_skips_whole_chain() {
    let h = Harness::start(utc(6, 0)).await;
    let user = onboarded_user(
        &h.storage,
        EXTERNAL_ID,
        chrono_tz::Europe::Moscow,
        None,
        Some((21, 0)),
        utc(6, 0),
    )
    .await;
    let session_id = accept_focus(&h, &user).await;
    for attempt in 1..=3 {
        assert!(
            h.handle
                .job(&JobId::evening(session_id, attempt))
                .await
                .unwrap()
                .is_some()
        );
    }
    let storage = Arc::clone(&h.storage);
    h.stop().await;

    // 21:05 Moscow. The 21:30 and 22:30 follow-ups are not rebuilt either.
    let restarted = Harness::start_with(storage, utc(18, 5)).await;
    let report = rebuild(&restarted).await;
    assert_eq!(report.registered, 0);
    assert!(restarted.handle.jobs().await.unwrap().is_empty());

    restarted.stop().await;
}

#[tokio::test]
async fn test_rebuild_before_evening_time_registers_whole_chain() {
    let h = Harness::start(utc(6, 0)).await;
    let user = onboarded_user(
        &h.storage,
        EXTERNAL_ID,
        chrono_tz::Europe::Moscow,
        None,
        Some((21, 0)),
        utc(6, 0),
    )
    .await;
    let session_id = accept_focus(&h, &user).await;
    let storage = Arc::clone(&h.storage);
    h.stop().await;

    // 20:55 Moscow.
    let restarted = Harness::start_with(storage, utc(17, 55)).await;
    let report = rebuild(&restarted).await;
    assert_eq!(report.registered, 3);

    let expected = [(1, utc(18, 0)), (2, utc(18, 30)), (3, utc(19, 30))];
    for (attempt, at) in expected {
        let job = restarted
            .handle
            .job(&JobId::evening(session_id, attempt))
            .await
            .unwrap()
            .expect("evening job");
        assert_eq!(job.next_fire, at);
    }

    restarted.stop().await;
}

/// Scenario D: pending items from yesterday move onto the new session once.
#[tokio::test]
async fn test_pending_items_from_yesterday_attach_to_new_session() {
    let h = Harness::start(utc(6, 0)).await;
    let user = onboarded_user(
        &h.storage,
        EXTERNAL_ID,
        chrono_tz::Europe::Moscow,
        None,
        None,
        utc(6, 0),
    )
    .await;
    let yesterday = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
    let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let carried = h
        .storage
        .create_todos(
            ["renew passport", "call grandma"]
                .into_iter()
                .map(|text| NewTodo {
                    user_id: user.id,
                    session_id: None,
                    date_local: yesterday,
                    text: text.into(),
                    carried_from: None,
                })
                .collect(),
            utc(5, 0),
        )
        .await
        .unwrap();

    let session_id = accept_focus(&h, &user).await;

    for item in &carried {
        let item = h.storage.get_todo(item.id).await.unwrap();
        assert_eq!(item.session_id, Some(session_id));
        assert_eq!(item.date_local, today);
        assert_eq!(item.status, TodoStatus::Pending);
    }
    let attached = h.storage.list_session_todos(session_id, None).await.unwrap();
    assert_eq!(attached.len(), 2);

    assert!(h.channel.notices().contains(&Notice::AskTodos {
        carried: vec!["renew passport".into(), "call grandma".into()],
    }));

    // Attaching again finds nothing and creates nothing.
    let session = h.storage.get_session(session_id).await.unwrap();
    let again = TodoResolver::new(Arc::clone(&h.storage))
        .attach_to_session(&session)
        .await
        .unwrap();
    assert!(again.is_empty());
    assert_eq!(
        h.storage.list_session_todos(session_id, None).await.unwrap().len(),
        2
    );

    h.stop().await;
}
