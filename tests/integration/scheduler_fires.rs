//! Scheduler fires delivered through the running scheduler.
//!
//! Each test drives a real scheduler loop with a manual clock. Fires re-check
//! storage when they arrive, so a job whose session or report changed since
//! registration does nothing.

use crate::common::{Harness, onboarded_user, wait_for_notice};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use coachloop::session::{CallbackCommand, MorningAnswer};
use coachloop::{
    CheckinKind, CheckinStatus, ConversationState, EveningStatus, FocusChoice, InboundEvent,
    JobId, JobScheduler, Notice, RebuildManager, SessionId, Storage, User,
};
use std::sync::Arc;
use std::time::Duration;

const EXTERNAL_ID: i64 = 77;
const WAIT: Duration = Duration::from_secs(2);

fn utc(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
}

/// Accept a focus and skip the todo step so the user ends up idle.
async fn accepted_session(h: &Harness, user: &User) -> SessionId {
    for event in [
        InboundEvent::text("so much to do today: the report, the gym, groceries"),
        InboundEvent::Command(CallbackCommand::Focus(FocusChoice::A)),
        InboundEvent::Command(CallbackCommand::Energy(3)),
        InboundEvent::Command(CallbackCommand::SkipTodos),
    ] {
        h.coach.on_user_event(EXTERNAL_ID, event).await.unwrap();
    }
    assert_eq!(h.coach.conversation_state(user.id), ConversationState::Idle);
    h.storage
        .find_session(user.id, user.local_today(h.now()))
        .await
        .unwrap()
        .expect("session for today")
        .id
}

#[tokio::test]
async fn test_checkin_fires_and_answer_is_recorded() {
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
    let session_id = accepted_session(&h, &user).await;
    h.channel.clear();

    h.advance(ChronoDuration::hours(3)).await;
    wait_for_notice(
        &h.channel,
        |n| matches!(n, Notice::CheckinPrompt { kind: CheckinKind::ThreeHours, .. }),
        WAIT,
    )
    .await;
    assert!(matches!(
        h.coach.conversation_state(user.id),
        ConversationState::AwaitingCheckinResponse(_)
    ));

    // The answer arrives as a raw button token.
    let token = CallbackCommand::Checkin {
        session_id,
        kind: CheckinKind::ThreeHours,
        status: CheckinStatus::Partial,
    }
    .encode();
    h.coach
        .on_user_event(EXTERNAL_ID, InboundEvent::callback(&token).unwrap())
        .await
        .unwrap();

    let checkin = h
        .storage
        .find_checkin(session_id, CheckinKind::ThreeHours)
        .await
        .unwrap()
        .expect("check-in stored");
    assert_eq!(checkin.status, CheckinStatus::Partial);
    assert_eq!(h.coach.conversation_state(user.id), ConversationState::Idle);
    assert!(h.channel.notices().contains(&Notice::CheckinThanks {
        status: CheckinStatus::Partial
    }));

    // One-shot jobs leave the table once fired.
    assert!(
        h.handle
            .job(&JobId::checkin(session_id, CheckinKind::ThreeHours))
            .await
            .unwrap()
            .is_none()
    );

    h.stop().await;
}

#[tokio::test]
async fn test_fire_for_deleted_session_sends_nothing() {
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
    let session_id = accepted_session(&h, &user).await;
    h.storage.delete_session(session_id).await.unwrap();
    h.channel.clear();

    h.advance(ChronoDuration::hours(3)).await;
    let start = tokio::time::Instant::now();
    while !h.events.names().await.contains(&"job_fired") {
        assert!(start.elapsed() < WAIT, "check-in never fired");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.channel.messages().is_empty());
    assert_eq!(h.coach.conversation_state(user.id), ConversationState::Idle);
    assert!(!h.events.names().await.contains(&"job_dispatch_failed"));

    h.stop().await;
}

#[tokio::test]
async fn test_evening_chain_stops_after_report() {
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
    let session_id = accepted_session(&h, &user).await;

    // 21:00 Moscow. Both check-ins fire on the way.
    h.advance(ChronoDuration::hours(12)).await;
    wait_for_notice(
        &h.channel,
        |n| *n == Notice::EveningPrompt { attempt: 1 },
        WAIT,
    )
    .await;

    for event in [
        InboundEvent::Command(CallbackCommand::Evening {
            session_id,
            status: EveningStatus::Done,
        }),
        InboundEvent::text("shipped the outline, skipped the gym"),
    ] {
        h.coach.on_user_event(EXTERNAL_ID, event).await.unwrap();
    }
    let report = h
        .storage
        .find_evening_report(session_id)
        .await
        .unwrap()
        .expect("report stored");
    assert_eq!(report.status, EveningStatus::Done);
    assert!(h.channel.notices().contains(&Notice::DayClosed {
        status: EveningStatus::Done
    }));

    // The 21:30 and 22:30 reminders fire but find the report.
    h.advance(ChronoDuration::minutes(30)).await;
    h.advance(ChronoDuration::minutes(60)).await;
    assert!(h.handle.jobs().await.unwrap().is_empty());
    let reminders = h
        .channel
        .notices()
        .into_iter()
        .filter(|n| matches!(n, Notice::EveningPrompt { .. }))
        .count();
    assert_eq!(reminders, 1);

    h.stop().await;
}

#[tokio::test]
async fn test_morning_prompt_repeats_daily() {
    // 08:00 Moscow.
    let h = Harness::start(utc(5, 0)).await;
    let user = onboarded_user(
        &h.storage,
        EXTERNAL_ID,
        chrono_tz::Europe::Moscow,
        Some((9, 0)),
        None,
        utc(5, 0),
    )
    .await;
    let jobs: Arc<dyn JobScheduler> = Arc::new(h.handle.clone());
    let report = RebuildManager::new(Arc::clone(&h.storage), jobs, h.clock.clone())
        .rebuild()
        .await
        .unwrap();
    assert_eq!(report.registered, 1);
    assert_eq!(
        h.handle
            .job(&JobId::morning(user.id))
            .await
            .unwrap()
            .map(|j| j.next_fire),
        Some(utc(6, 0))
    );

    h.advance(ChronoDuration::hours(1)).await;
    wait_for_notice(&h.channel, |n| *n == Notice::MorningPrompt, WAIT).await;
    h.coach
        .on_user_event(
            EXTERNAL_ID,
            InboundEvent::Command(CallbackCommand::Morning(MorningAnswer::Later)),
        )
        .await
        .unwrap();
    assert_eq!(h.channel.notices().last(), Some(&Notice::MorningLater));

    h.advance(ChronoDuration::days(1)).await;
    let start = tokio::time::Instant::now();
    loop {
        let prompts = h
            .channel
            .notices()
            .into_iter()
            .filter(|n| *n == Notice::MorningPrompt)
            .count();
        if prompts == 2 {
            break;
        }
        assert!(start.elapsed() < WAIT, "second morning prompt never arrived");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    h.stop().await;
}

#[tokio::test]
async fn test_paused_scheduler_delivers_one_shot_on_resume() {
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
    accepted_session(&h, &user).await;
    h.channel.clear();

    h.handle.pause().await.unwrap();
    h.advance(ChronoDuration::hours(3)).await;
    assert!(h.channel.messages().is_empty());

    h.handle.resume().await.unwrap();
    wait_for_notice(
        &h.channel,
        |n| matches!(n, Notice::CheckinPrompt { kind: CheckinKind::ThreeHours, .. }),
        WAIT,
    )
    .await;

    h.stop().await;
}
