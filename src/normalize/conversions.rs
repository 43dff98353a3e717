//! Field conversions shared by the entity normalizers

use chrono::{DateTime, TimeZone, Utc};

/// Card stages accepted downstream
pub const STAGES: [&str; 4] = ["backlog", "in_development", "in_review", "completed"];

/// 24 hex characters, the first 8 of which encode the creation time
pub fn is_object_id(id: &str) -> bool {
    id.len() == 24 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Creation time embedded in an object id
pub fn created_from_id(id: &str) -> Option<DateTime<Utc>> {
    if !is_object_id(id) {
        return None;
    }
    let secs = i64::from_str_radix(&id[..8], 16).ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

/// Parse an RFC3339 timestamp as sent by the API
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Map a list name to a stage by keyword
pub fn stage_for_list_name(name: &str) -> Option<&'static str> {
    let name = name.to_lowercase();
    let stage = if name.contains("backlog") || name.contains("to do") || name.contains("todo") {
        "backlog"
    } else if name.contains("doing") || name.contains("progress") {
        "in_development"
    } else if name.contains("review") {
        "in_review"
    } else if name.contains("done") || name.contains("archive") {
        "completed"
    } else {
        return None;
    };
    Some(stage)
}

const LABEL_COLORS: &[(&str, &str)] = &[
    ("green", "#008000"),
    ("yellow", "#FFFF00"),
    ("orange", "#FFA500"),
    ("red", "#FF0000"),
    ("purple", "#800080"),
    ("blue", "#0000FF"),
    ("sky", "#87CEEB"),
    ("lime", "#00FF00"),
    ("pink", "#FFC0CB"),
    ("black", "#000000"),
    ("white", "#FFFFFF"),
    ("gray", "#808080"),
    ("brown", "#A52A2A"),
    ("cyan", "#00FFFF"),
    ("magenta", "#FF00FF"),
    ("navy", "#000080"),
    ("maroon", "#800000"),
    ("olive", "#808000"),
    ("teal", "#008080"),
    ("silver", "#C0C0C0"),
];

/// Hex code of a label color; `_light`/`_dark` variants share the base code
pub fn label_color_hex(color: &str) -> Option<&'static str> {
    let color = color.trim().to_lowercase();
    let base = color
        .strip_suffix("_light")
        .or_else(|| color.strip_suffix("_dark"))
        .unwrap_or(&color);
    LABEL_COLORS
        .iter()
        .find(|(name, _)| *name == base)
        .map(|(_, hex)| *hex)
}

/// Point hosted attachment URLs at the API download endpoint
pub fn rewrite_attachment_url(
    url: &str,
    base_url: &str,
    card_id: &str,
    attachment_id: &str,
    file_name: &str,
) -> String {
    if url.starts_with("https://trello.com") {
        format!(
            "{}/cards/{}/attachments/{}/download/{}",
            base_url.trim_end_matches('/'),
            card_id,
            attachment_id,
            file_name
        )
    } else {
        url.to_string()
    }
}
