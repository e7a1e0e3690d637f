//! Login eligibility of a [`User`] according to its ban state.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};

use crate::error::{Result, ServerError};
use crate::user::User;

/// Format moderators write `banned_until` with.
pub const BAN_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Ban state of a user at a given instant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BanStatus {
    Active,
    TemporarilyBanned {
        until: DateTime<Utc>,
        remaining: TimeDelta,
    },
    PermanentlyBanned,
}

impl BanStatus {
    /// Evaluate the ban state of `user` at `now`.
    ///
    /// The permanent flag always wins over `banned_until`. A `banned_until`
    /// that cannot be parsed counts as no ban: it is logged and left as is.
    pub fn evaluate(user: &User, now: DateTime<Utc>) -> Self {
        if user.permanently_banned {
            return BanStatus::PermanentlyBanned;
        }

        let Some(raw) = user.banned_until.as_deref().map(str::trim) else {
            return BanStatus::Active;
        };
        if raw.is_empty() {
            return BanStatus::Active;
        }

        match parse_ban_timestamp(raw) {
            Some(until) if until > now => BanStatus::TemporarilyBanned {
                until,
                remaining: until - now,
            },
            Some(_) => BanStatus::Active,
            None => {
                tracing::warn!(
                    user_id = user.id,
                    banned_until = raw,
                    "unparsable ban timestamp, ignoring it"
                );
                BanStatus::Active
            },
        }
    }

    /// Turn a non-active state into [`ServerError::Banned`].
    pub fn ensure_active(&self) -> Result<()> {
        match self {
            BanStatus::Active => Ok(()),
            BanStatus::PermanentlyBanned => Err(ServerError::Banned(
                "account is permanently banned".to_owned(),
            )),
            BanStatus::TemporarilyBanned { remaining, .. } => Err(ServerError::Banned(format!(
                "account is temporarily banned for another {}",
                format_remaining(*remaining)
            ))),
        }
    }
}

/// Parse a ban expiry written either as `YYYY-MM-DD HH:MM:SS` (UTC) or as
/// RFC 3339.
pub fn parse_ban_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, BAN_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|date| date.with_timezone(&Utc)))
        .ok()
}

/// Human readable duration, rounded up to the minute.
fn format_remaining(remaining: TimeDelta) -> String {
    let minutes = (remaining.num_seconds().max(0) + 59) / 60;
    let (days, hours, minutes) = (minutes / 1440, (minutes % 1440) / 60, minutes % 60);

    let mut parts = Vec::with_capacity(3);
    for (value, unit) in [(days, "day"), (hours, "hour"), (minutes, "minute")] {
        match value {
            0 => {},
            1 => parts.push(format!("1 {unit}")),
            n => parts.push(format!("{n} {unit}s")),
        }
    }

    if parts.is_empty() {
        "less than a minute".to_owned()
    } else {
        parts.join(" ")
    }
}
