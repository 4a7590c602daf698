//! Fire-instant planning for check-ins, evening reminders and morning prompts.
//!
//! Everything here is pure: callers pass the current instant and get job specs
//! back. The orchestrator registers them after acceptance and the rebuild
//! manager registers the still-future subset on startup, so both paths agree
//! on ids and instants.
//!
//! Relative offsets (+3h, +6h, +30m, +90m) are elapsed time. Wall-clock times
//! (evening time, morning time) are resolved in the user's zone: a time that
//! falls in a daylight-saving gap moves forward by the gap, and an ambiguous
//! time takes its earlier instant.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::core::local_time::LocalTime;
use crate::core::models::{CheckinKind, DailySession, User};
use crate::core::types::{JobId, SessionId, UserId};
use crate::scheduler::{JobPayload, JobSpec, TriggerSpec};

/// Minutes after the evening time at which each reminder attempt fires.
pub const EVENING_ATTEMPTS: [(u8, i64); 3] = [(1, 0), (2, 30), (3, 90)];

/// Resolve a local wall-clock time on `date` in `tz` to a UTC instant.
pub fn resolve_local(date: NaiveDate, time: LocalTime, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(time.to_naive());
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(local) => local.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // Gap: apply the offset in force before the transition.
            let before = tz
                .offset_from_utc_datetime(&(naive - Duration::days(1)))
                .fix();
            let utc = naive - Duration::seconds(i64::from(before.local_minus_utc()));
            Utc.from_utc_datetime(&utc)
        }
    }
}

/// First instant of the local calendar day `date` in `tz`.
pub fn local_day_start(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    resolve_local(date, LocalTime::MIDNIGHT, tz)
}

/// Check-in jobs anchored at the acceptance instant.
pub fn checkin_jobs(
    user_id: UserId,
    session_id: SessionId,
    accepted_at: DateTime<Utc>,
) -> Vec<JobSpec> {
    CheckinKind::ALL
        .iter()
        .map(|&kind| {
            JobSpec::once(
                JobId::checkin(session_id, kind),
                accepted_at + kind.offset(),
                JobPayload::Checkin {
                    user_id,
                    session_id,
                    kind,
                },
            )
        })
        .collect()
}

/// The evening escalation chain for a session.
///
/// Empty when the user has no evening time or when the evening instant of the
/// session's day is not after `now`. The boundary matches `is_future`, so a
/// rebuild never keeps the follow-ups without the first reminder.
pub fn evening_jobs(user: &User, session: &DailySession, now: DateTime<Utc>) -> Vec<JobSpec> {
    let Some(time) = user.evening_time else {
        return Vec::new();
    };

    let base = resolve_local(session.date_local, time, user.timezone);
    if base <= now {
        return Vec::new();
    }

    EVENING_ATTEMPTS
        .iter()
        .map(|&(attempt, minutes)| {
            JobSpec::once(
                JobId::evening(session.id, attempt),
                base + Duration::minutes(minutes),
                JobPayload::EveningReminder {
                    user_id: user.id,
                    session_id: session.id,
                    attempt,
                },
            )
        })
        .collect()
}

/// The recurring morning prompt, if the user wants one.
pub fn morning_job(user: &User) -> Option<JobSpec> {
    let time = user.morning_time.filter(|_| user.onboarded)?;
    Some(JobSpec::daily(
        JobId::morning(user.id),
        time,
        user.timezone,
        JobPayload::MorningPrompt { user_id: user.id },
    ))
}

/// Whether a job would still fire after `now`. Daily jobs always do.
pub fn is_future(spec: &JobSpec, now: DateTime<Utc>) -> bool {
    match spec.trigger {
        TriggerSpec::At(at) => at > now,
        TriggerSpec::Daily { .. } => true,
    }
}
