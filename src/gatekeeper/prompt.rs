//! Builds the context-rich user message for the reasoning provider.
//!
//! The provider sees the request, the clock, where the device physically
//! is, whether a configured relax window is active, and the day's request
//! history. The richer the context, the harder the prompt is to game with
//! a vague "I need it for work".

use crate::config::Schedule;
use crate::gatekeeper::DecisionContext;
use chrono::{DateTime, Datelike, Local, Timelike};
use std::fmt::Write;

pub const FALLBACK_SYSTEM_PROMPT: &str = "You are a strict productivity gatekeeper. \
    Default to DENY. Respond in JSON format: \
    {\"approved\": bool, \"scope\": str, \"duration_minutes\": int, \"message\": str}";

/// Whether `now` falls inside the configured relax window for its weekday.
pub fn is_relax_window(schedule: &Schedule, now: DateTime<Local>) -> bool {
    let key = if now.weekday().number_from_monday() >= 6 {
        "weekend"
    } else {
        "weekday"
    };
    let window = match schedule.relax_windows.get(key) {
        Some(w) => w,
        None => return false,
    };

    let (Some(start), Some(end)) = (parse_hhmm(&window.start), parse_hhmm(&window.end)) else {
        return false;
    };
    let current = now.hour() * 60 + now.minute();
    start <= current && current <= end
}

fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.trim().parse().ok()?;
    let m: u32 = m.trim().parse().ok()?;
    Some(h * 60 + m)
}

/// Render the user message sent alongside the system prompt.
pub fn build_user_message(context: &DecisionContext, schedule: &Schedule) -> String {
    let now = context.now;
    let mut msg = String::new();

    let _ = writeln!(msg, "## Access Request");
    let _ = writeln!(msg, "- **URL**: {}", context.url);
    let _ = writeln!(msg, "- **Reason given**: {}", context.reason);
    let _ = writeln!(msg);
    let _ = writeln!(msg, "## Context");
    let _ = writeln!(
        msg,
        "- **Time**: {}, {} at {}",
        now.format("%A"),
        now.format("%Y-%m-%d"),
        now.format("%I:%M %p")
    );
    let _ = writeln!(
        msg,
        "- **Device**: {} ({})",
        context.device_name.as_deref().unwrap_or("unknown"),
        context.device_kind.as_deref().unwrap_or("unknown")
    );
    let _ = writeln!(
        msg,
        "- **Room**: {}",
        context.room.as_deref().unwrap_or("unknown")
    );

    let relax = is_relax_window(schedule, now);
    let _ = writeln!(
        msg,
        "- **Relax window active**: {}",
        if relax { "YES" } else { "NO" }
    );
    if relax && !schedule.relax_rooms.is_empty() {
        let in_relax_room = context
            .room
            .as_deref()
            .map(|room| {
                schedule
                    .relax_rooms
                    .iter()
                    .any(|r| normalize_room(r) == normalize_room(room))
            })
            .unwrap_or(false);
        let _ = writeln!(
            msg,
            "- **In relax-eligible room**: {} (eligible rooms: {})",
            if in_relax_room { "YES" } else { "NO" },
            schedule.relax_rooms.join(", ")
        );
    }

    let _ = writeln!(msg, "- **Request #{} today**", context.request_count_today + 1);

    if !context.recent.is_empty() {
        let _ = writeln!(msg);
        let _ = writeln!(
            msg,
            "## Recent Request History (last {})",
            context.recent.len()
        );
        for record in &context.recent {
            let status = if record.approved { "APPROVED" } else { "DENIED" };
            let _ = writeln!(
                msg,
                "- [{}] {} - reason: \"{}\" (at {})",
                status,
                record.url,
                record.reason,
                record.timestamp.format("%Y-%m-%d %H:%M")
            );
        }
    }

    let _ = writeln!(msg);
    msg.push_str(
        "Evaluate this request and respond with a JSON object. Remember: your default \
         is DENY. You need a genuinely compelling, specific reason to approve.",
    );
    msg
}

fn normalize_room(room: &str) -> String {
    room.to_lowercase().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelaxWindow;
    use crate::history::RequestRecord;
    use crate::scope::ScopePattern;
    use chrono::TimeZone;

    fn schedule_with_weekday_window(start: &str, end: &str) -> Schedule {
        let mut schedule = Schedule::default();
        schedule.relax_windows.insert(
            "weekday".to_string(),
            RelaxWindow {
                start: start.to_string(),
                end: end.to_string(),
            },
        );
        schedule.relax_rooms = vec!["Living Room".to_string()];
        schedule
    }

    // Wednesday 2026-01-07
    fn weekday_at(hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 7, hour, minute, 0).unwrap()
    }

    fn context() -> DecisionContext {
        DecisionContext {
            url: "https://reddit.com/r/esp32/thread".to_string(),
            reason: "Checking a wiring pinout".to_string(),
            device_name: Some("Alex's phone".to_string()),
            device_kind: Some("phone".to_string()),
            room: Some("living room".to_string()),
            request_count_today: 2,
            recent: vec![],
            now: weekday_at(19, 0),
        }
    }

    #[test]
    fn test_relax_window_bounds() {
        let schedule = schedule_with_weekday_window("18:30", "21:00");
        assert!(is_relax_window(&schedule, weekday_at(18, 30)));
        assert!(is_relax_window(&schedule, weekday_at(21, 0)));
        assert!(!is_relax_window(&schedule, weekday_at(21, 1)));
        assert!(!is_relax_window(&schedule, weekday_at(9, 0)));
    }

    #[test]
    fn test_no_window_configured_means_inactive() {
        assert!(!is_relax_window(&Schedule::default(), weekday_at(19, 0)));
    }

    #[test]
    fn test_message_includes_context_and_history() {
        let schedule = schedule_with_weekday_window("18:30", "21:00");
        let mut ctx = context();
        ctx.recent.push(RequestRecord {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            device_ip: "10.0.0.2".to_string(),
            device_name: None,
            url: "https://reddit.com/r/memes".to_string(),
            domain: "reddit.com".to_string(),
            reason: "bored".to_string(),
            room: None,
            approved: false,
            scope: ScopePattern::unrestricted(),
            duration_minutes: None,
            message: "denied".to_string(),
            request_number_today: 2,
        });

        let msg = build_user_message(&ctx, &schedule);
        assert!(msg.contains("https://reddit.com/r/esp32/thread"));
        assert!(msg.contains("Checking a wiring pinout"));
        assert!(msg.contains("Relax window active**: YES"));
        assert!(msg.contains("In relax-eligible room**: YES"));
        assert!(msg.contains("Request #3 today"));
        assert!(msg.contains("[DENIED] https://reddit.com/r/memes"));
        assert!(msg.contains("your default is DENY"));
    }

    #[test]
    fn test_unknown_context_degrades_in_message() {
        let mut ctx = context();
        ctx.device_name = None;
        ctx.device_kind = None;
        ctx.room = None;
        let msg = build_user_message(&ctx, &Schedule::default());
        assert!(msg.contains("**Device**: unknown (unknown)"));
        assert!(msg.contains("**Room**: unknown"));
    }
}
