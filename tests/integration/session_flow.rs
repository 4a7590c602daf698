//! Conversation flows driven through the public inbound API.

use crate::common::{Harness, onboarded_user};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use coachloop::session::{CallbackCommand, MenuAction, SettingKey};
use coachloop::{
    ConversationState, FocusChoice, InboundEvent, JobId, LocalTime, Notice, SessionId, Sphere,
    Storage, TodoStatus, Tone, TriggerSpec, User,
};
use std::sync::Arc;

fn utc(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
}

async fn send(h: &Harness, external_id: i64, event: InboundEvent) {
    h.coach.on_user_event(external_id, event).await.unwrap();
}

async fn tap(h: &Harness, external_id: i64, token: &str) {
    send(h, external_id, InboundEvent::callback(token).unwrap()).await;
}

async fn accept_focus(h: &Harness, user: &User) -> SessionId {
    send(
        h,
        user.external_id,
        InboundEvent::text("report, gym, groceries, call mom"),
    )
    .await;
    tap(h, user.external_id, "focus:A").await;
    tap(h, user.external_id, "energy:4").await;
    h.storage
        .find_session(user.id, user.local_today(h.now()))
        .await
        .unwrap()
        .expect("session for today")
        .id
}

#[tokio::test]
async fn test_onboarding_through_button_tokens() {
    let h = Harness::start(utc(6, 0)).await;
    let id = 501;

    send(&h, id, InboundEvent::Start).await;
    tap(&h, id, "sphere:work").await;
    tap(&h, id, "sphere:health").await;
    tap(&h, id, "spheres:done").await;
    assert_eq!(
        h.channel.notices().last(),
        Some(&Notice::TooFewSpheres { min: 3 })
    );
    tap(&h, id, "sphere:finance").await;
    tap(&h, id, "sphere:health").await;
    tap(&h, id, "sphere:home").await;
    tap(&h, id, "spheres:done").await;

    send(&h, id, InboundEvent::text("ok")).await;
    assert_eq!(
        h.channel.notices().last(),
        Some(&Notice::FocusTooShort { min: 3 })
    );
    send(&h, id, InboundEvent::text("ship the release")).await;
    send(&h, id, InboundEvent::text("get fit")).await;
    tap(&h, id, "tone:soft").await;

    send(&h, id, InboundEvent::text("25:00")).await;
    assert_eq!(h.channel.notices().last(), Some(&Notice::InvalidTime));
    tap(&h, id, "morning_time:08:00").await;
    tap(&h, id, "evening_time:22:00").await;

    let user = h.storage.find_user_by_external(id).await.unwrap().unwrap();
    assert!(user.onboarded);
    assert_eq!(user.tone, Tone::Soft);
    assert_eq!(user.spheres, vec![Sphere::Work, Sphere::Finance, Sphere::Home]);
    assert_eq!(user.morning_time, Some(LocalTime::new(8, 0).unwrap()));
    assert_eq!(user.evening_time, Some(LocalTime::new(22, 0).unwrap()));
    assert_eq!(h.coach.conversation_state(user.id), ConversationState::Idle);

    let morning = h
        .handle
        .job(&JobId::morning(user.id))
        .await
        .unwrap()
        .expect("morning job");
    assert_eq!(
        morning.spec.trigger,
        TriggerSpec::Daily {
            time: LocalTime::new(8, 0).unwrap(),
            timezone: chrono_tz::Europe::Moscow,
        }
    );
    assert_eq!(
        h.events.names().await,
        vec!["start", "onboarding_complete"]
    );

    h.stop().await;
}

#[tokio::test]
async fn test_second_dump_after_acceptance_shows_existing_focus() {
    let h = Harness::start(utc(6, 0)).await;
    let user = onboarded_user(
        &h.storage,
        601,
        chrono_tz::Europe::Moscow,
        None,
        None,
        utc(6, 0),
    )
    .await;
    accept_focus(&h, &user).await;
    tap(&h, 601, "todos:skip").await;

    send(&h, 601, InboundEvent::Menu(MenuAction::StartDump)).await;
    assert_eq!(
        h.channel.notices().last(),
        Some(&Notice::AlreadyHaveFocus {
            focus: Some("Finish the report".into())
        })
    );

    send(&h, 601, InboundEvent::Menu(MenuAction::ShowFocus)).await;
    assert_eq!(
        h.channel.notices().last(),
        Some(&Notice::TodayFocus {
            focus: "Finish the report".into(),
            step: "Write the outline".into(),
            plan_b: "Write one paragraph".into(),
            energy: Some(4),
        })
    );

    h.stop().await;
}

#[tokio::test]
async fn test_changing_evening_time_moves_todays_chain() {
    let h = Harness::start(utc(6, 0)).await;
    let user = onboarded_user(
        &h.storage,
        701,
        chrono_tz::Europe::Moscow,
        None,
        Some((21, 0)),
        utc(6, 0),
    )
    .await;
    let session_id = accept_focus(&h, &user).await;
    tap(&h, 701, "todos:skip").await;

    send(&h, 701, InboundEvent::Menu(MenuAction::Settings)).await;
    tap(&h, 701, "set:evening_time").await;
    assert_eq!(
        h.coach.conversation_state(user.id),
        ConversationState::EditingSetting(SettingKey::EveningTime)
    );
    send(&h, 701, InboundEvent::text("22:15")).await;
    assert_eq!(
        h.channel.notices().last(),
        Some(&Notice::SettingSaved(SettingKey::EveningTime))
    );

    let first = h
        .handle
        .job(&JobId::evening(session_id, 1))
        .await
        .unwrap()
        .expect("evening reminder");
    assert_eq!(first.next_fire, utc(19, 15));

    // Turning reminders off drops the chain.
    tap(&h, 701, "set:evening_time").await;
    tap(&h, 701, "evening_time:off").await;
    for attempt in 1..=3 {
        assert!(
            h.handle
                .job(&JobId::evening(session_id, attempt))
                .await
                .unwrap()
                .is_none()
        );
    }
    let user = h.storage.get_user(user.id).await.unwrap();
    assert_eq!(user.evening_time, None);

    h.stop().await;
}

#[tokio::test]
async fn test_todos_complete_and_carry_once() {
    let h = Harness::start(utc(6, 0)).await;
    let user = onboarded_user(
        &h.storage,
        801,
        chrono_tz::Europe::Moscow,
        None,
        None,
        utc(6, 0),
    )
    .await;
    let session_id = accept_focus(&h, &user).await;

    send(&h, 801, InboundEvent::text("- buy milk\n- reply to Anna")).await;
    assert_eq!(h.coach.conversation_state(user.id), ConversationState::Idle);
    let items = h.storage.list_session_todos(session_id, None).await.unwrap();
    let texts: Vec<_> = items.iter().map(|i| i.text.as_str()).collect();
    assert_eq!(texts, vec!["buy milk", "reply to Anna"]);

    tap(&h, 801, &format!("todo:{}:done", items[0].id)).await;
    assert_eq!(
        h.channel.notices().last(),
        Some(&Notice::TodoDone {
            text: "buy milk".into()
        })
    );

    let carry = format!("todo:{}:carry", items[1].id);
    tap(&h, 801, &carry).await;
    assert_eq!(
        h.channel.notices().last(),
        Some(&Notice::TodoCarried {
            text: "reply to Anna".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        })
    );
    tap(&h, 801, &carry).await;
    assert_eq!(
        h.channel.notices().last(),
        Some(&Notice::TodoAlreadyResolved)
    );

    let original = h.storage.get_todo(items[1].id).await.unwrap();
    assert_eq!(original.status, TodoStatus::CarriedOver);
    assert_eq!(
        h.events.names().await.iter().filter(|n| **n == "todo_carried").count(),
        1
    );

    h.stop().await;
}

#[tokio::test]
async fn test_deeper_session_ends_on_stop_word() {
    let h = Harness::start(utc(6, 0)).await;
    let user = onboarded_user(
        &h.storage,
        901,
        chrono_tz::Europe::Moscow,
        None,
        None,
        utc(6, 0),
    )
    .await;
    let session_id = accept_focus(&h, &user).await;
    h.analysis
        .push_reflection("It sounds like the report carries more weight than it seems.");

    tap(&h, 901, &format!("deeper:{}", session_id)).await;
    assert!(matches!(
        h.coach.conversation_state(user.id),
        ConversationState::InDeeperSession(_)
    ));
    assert!(matches!(
        h.channel.notices().last(),
        Some(Notice::DeeperReflection { .. })
    ));

    send(&h, 901, InboundEvent::text("it is about my manager")).await;
    assert_eq!(h.channel.notices().last(), Some(&Notice::DeeperAcknowledged));

    send(&h, 901, InboundEvent::text("Хватит")).await;
    assert_eq!(h.channel.notices().last(), Some(&Notice::DeeperClosed));
    assert_eq!(h.coach.conversation_state(user.id), ConversationState::Idle);
    assert!(
        h.events
            .names()
            .await
            .ends_with(&["go_deeper_started", "go_deeper_completed"])
    );

    h.stop().await;
}

#[tokio::test]
async fn test_users_progress_independently() {
    let h = Harness::start(utc(6, 0)).await;
    let first = onboarded_user(
        &h.storage,
        1001,
        chrono_tz::Europe::Moscow,
        None,
        None,
        utc(6, 0),
    )
    .await;
    let second = onboarded_user(
        &h.storage,
        1002,
        chrono_tz::Asia::Tokyo,
        None,
        None,
        utc(6, 0),
    )
    .await;

    let coach = Arc::clone(&h.coach);
    let a = tokio::spawn(async move {
        coach
            .on_user_event(1001, InboundEvent::text("report, gym, groceries"))
            .await
    });
    let coach = Arc::clone(&h.coach);
    let b = tokio::spawn(async move {
        coach
            .on_user_event(1002, InboundEvent::Menu(MenuAction::StartDump))
            .await
    });
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert!(matches!(
        h.coach.conversation_state(first.id),
        ConversationState::ChoosingFocusOption(_)
    ));
    assert_eq!(
        h.coach.conversation_state(second.id),
        ConversationState::AwaitingDump
    );

    send(&h, 1001, InboundEvent::Command(CallbackCommand::Focus(FocusChoice::B))).await;
    assert!(matches!(
        h.coach.conversation_state(first.id),
        ConversationState::ConfirmingEnergy(_)
    ));
    assert_eq!(
        h.coach.conversation_state(second.id),
        ConversationState::AwaitingDump
    );

    let session = h
        .storage
        .find_session(first.id, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        .await
        .unwrap()
        .expect("first user's session");
    assert_eq!(session.focus_text.as_deref(), Some("Go to the gym"));
    assert!(
        h.storage
            .find_session(second.id, second.local_today(h.now()))
            .await
            .unwrap()
            .is_none()
    );

    h.stop().await;
}

#[tokio::test]
async fn test_same_user_events_apply_in_arrival_order() {
    let h = Harness::start(utc(6, 0)).await;
    let user = onboarded_user(
        &h.storage,
        1101,
        chrono_tz::Europe::Moscow,
        None,
        None,
        utc(6, 0),
    )
    .await;
    h.analysis.set_latency(std::time::Duration::from_millis(100));

    let coach = Arc::clone(&h.coach);
    let dump = tokio::spawn(async move {
        coach
            .on_user_event(1101, InboundEvent::text("report, gym, groceries"))
            .await
    });
    // The dump holds the user's lane while the analysis is running.
    let start = tokio::time::Instant::now();
    while h.analysis.analyzed().is_empty() {
        assert!(start.elapsed() < std::time::Duration::from_secs(2));
        tokio::task::yield_now().await;
    }
    let coach = Arc::clone(&h.coach);
    let pick = tokio::spawn(async move {
        coach
            .on_user_event(1101, InboundEvent::Command(CallbackCommand::Focus(FocusChoice::A)))
            .await
    });
    dump.await.unwrap().unwrap();
    pick.await.unwrap().unwrap();

    // The pick saw the finished analysis, not a half-built proposal.
    assert!(matches!(
        h.coach.conversation_state(user.id),
        ConversationState::ConfirmingEnergy(_)
    ));
    let notices = h.channel.notices();
    assert!(!notices.contains(&Notice::StillAnalyzing));
    assert!(!notices.contains(&Notice::ChooseOption));
    assert_eq!(
        notices
            .iter()
            .filter(|n| matches!(n, Notice::AnalysisSummary(_)))
            .count(),
        1
    );
    assert!(matches!(notices.last(), Some(Notice::AskEnergy { .. })));

    let session = h
        .storage
        .find_session(user.id, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        .await
        .unwrap()
        .expect("session for today");
    assert_eq!(session.focus_text.as_deref(), Some("Finish the report"));

    h.stop().await;
}
