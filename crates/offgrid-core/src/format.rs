//! Human-readable time labels for listings.

use chrono::{DateTime, Utc};

/// Minutes in a day
const MINUTES_PER_DAY: i64 = 1440;

/// How long ago `then` was, relative to `now`.
///
/// Hours round up from the half hour and days from the half day, so 1h 30m
/// reads as "2h ago".
pub fn relative_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - then).num_minutes();
    if minutes < 1 {
        // Clock skew lands here too
        "just now".to_string()
    } else {
        format!("{} ago", span_label(minutes))
    }
}

/// "expired" once `expires_at` is reached, otherwise the time left.
pub fn expiry_display(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    if expires_at <= now {
        return "expired".to_string();
    }
    let minutes = (expires_at - now).num_minutes();
    if minutes < 1 {
        "expires in <1m".to_string()
    } else {
        format!("expires in {}", span_label(minutes))
    }
}

fn span_label(minutes: i64) -> String {
    if minutes < 60 {
        format!("{}m", minutes)
    } else if minutes < MINUTES_PER_DAY {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h", hours + 1)
        } else {
            format!("{}h", hours)
        }
    } else {
        let days = minutes / MINUTES_PER_DAY;
        if (minutes % MINUTES_PER_DAY) / 60 >= 12 {
            format!("{}d", days + 1)
        } else {
            format!("{}d", days)
        }
    }
}
