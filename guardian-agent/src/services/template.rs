//! Notification template rendering.
//!
//! Templates carry literal placeholder tokens that are substituted from the
//! event; leftover empty bracket artifacts from unfilled tokens are stripped
//! afterwards. Rendering is a pure function of its inputs.

use crate::models::ThreatEvent;
use chrono::{TimeZone, Utc};

/// Field values substituted into a template.
#[derive(Debug, Clone, Default)]
pub struct EventFields {
    pub ip: String,
    pub ip_reverse: String,
    pub city: String,
    pub user_agent: String,
    pub system: String,
    pub date: String,
    pub time: String,
}

impl EventFields {
    /// Extract fields from an event, formatting the timestamp with the
    /// configured date and time formats.
    pub fn from_event(event: &ThreatEvent, date_format: &str, time_format: &str) -> Self {
        let (date, time) = match Utc.timestamp_opt(event.time, 0).single() {
            Some(ts) => (
                ts.format(date_format).to_string(),
                ts.format(time_format).to_string(),
            ),
            None => (String::new(), String::new()),
        };

        Self {
            ip: event.ip.clone(),
            ip_reverse: event.ip_reverse.clone(),
            city: event.city.clone(),
            user_agent: event.user_agent.clone(),
            system: event.system.clone(),
            date,
            time,
        }
    }
}

/// Substitute the placeholder tokens and strip leftover `[]` / `()`
/// artifacts from unfilled neighbours.
pub fn render(template: &str, fields: &EventFields) -> String {
    let rendered = template
        .replace("[IP]", &fields.ip)
        .replace("[IP_REVERSE]", &fields.ip_reverse)
        .replace("[CITY]", &fields.city)
        .replace("[USER_AGENT]", &fields.user_agent)
        .replace("[SYSTEM]", &fields.system)
        .replace("[DATE]", &fields.date)
        .replace("[TIME]", &fields.time);

    rendered.replace("[]", "").replace("()", "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> EventFields {
        EventFields {
            ip: "1.2.3.4".to_string(),
            ip_reverse: "host.example.net".to_string(),
            city: "Lisbon".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            system: "desktop".to_string(),
            date: "2026-08-08".to_string(),
            time: "14:05:00".to_string(),
        }
    }

    #[test]
    fn substitutes_all_tokens() {
        let out = render(
            "From [IP] ([IP_REVERSE]) in [CITY] via [USER_AGENT] on [SYSTEM] at [DATE] [TIME]",
            &fields(),
        );
        assert_eq!(
            out,
            "From 1.2.3.4 (host.example.net) in Lisbon via Mozilla/5.0 on desktop at 2026-08-08 14:05:00"
        );
        assert!(!out.contains('['));
    }

    #[test]
    fn rendering_is_idempotent() {
        let once = render("Login from [IP] at [TIME]", &fields());
        let twice = render(&once, &fields());
        assert_eq!(once, twice);
    }

    #[test]
    fn strips_leftover_artifacts() {
        let mut empty = fields();
        empty.ip_reverse = String::new();
        empty.city = String::new();

        let out = render("From [IP] ([IP_REVERSE]) in [CITY][]", &empty);
        assert_eq!(out, "From 1.2.3.4  in ");
        assert!(!out.contains("()"));
        assert!(!out.contains("[]"));
    }

    #[test]
    fn token_order_does_not_matter() {
        let a = render("[TIME] [IP]", &fields());
        let b = render("[IP] [TIME]", &fields());
        assert_eq!(a, "14:05:00 1.2.3.4");
        assert_eq!(b, "1.2.3.4 14:05:00");
    }

    #[test]
    fn formats_event_timestamp() {
        let event = crate::models::ThreatEvent {
            user_hash: "h".to_string(),
            time: 1754659500,
            ip: "1.2.3.4".to_string(),
            ip_reverse: String::new(),
            city: String::new(),
            user_agent: String::new(),
            system: String::new(),
        };

        let f = EventFields::from_event(&event, "%Y-%m-%d", "%H:%M:%S");
        assert_eq!(f.date, "2025-08-08");
        assert_eq!(f.time, "13:25:00");
    }
}
