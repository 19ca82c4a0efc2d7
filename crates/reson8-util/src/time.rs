use chrono::{DateTime, SecondsFormat, Utc};

/// Timestamps are stored and emitted in one fixed shape so that SQL text
/// comparison equals chronological comparison: RFC 3339, UTC, millisecond
/// precision, trailing `Z`.
pub fn now_rfc3339() -> String {
    format_rfc3339(Utc::now())
}

pub fn format_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a client-supplied cursor. Accepts any RFC 3339 offset and
/// normalizes to the canonical UTC shape.
pub fn normalize_rfc3339(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| format_rfc3339(dt.with_timezone(&Utc)))
}
