//! Normalizer: raw source entity to [`CanonicalRecord`]
//!
//! Normalization is pure. Everything it needs beyond the raw item (the board's
//! list-to-stage map, the API base URL) is carried by [`NormalizeContext`].
//! A record that cannot be mapped yields a [`NormalizeError`]; the caller
//! skips and counts it.

pub mod conversions;

use crate::model::{CanonicalRecord, Phase, RichText, Value};
use crate::source::{item_id, RawItem};
use crate::SyncError;
use chrono::{DateTime, SecondsFormat, Utc};
use conversions::{created_from_id, is_object_id, label_color_hex, parse_timestamp};
use std::collections::HashMap;
use thiserror::Error;

/// Why a single record was dropped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("item is not a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("malformed id '{0}'")]
    InvalidId(String),

    #[error("invalid timestamp in '{field}': {value}")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("value '{value}' of '{field}' is not in the allow-list")]
    UnmappedEnum { field: &'static str, value: String },
}

impl From<NormalizeError> for SyncError {
    fn from(err: NormalizeError) -> Self {
        SyncError::Normalization(err.to_string())
    }
}

/// Lookup data for one board
#[derive(Debug, Clone, Default)]
pub struct NormalizeContext {
    base_url: String,
    stages: HashMap<String, &'static str>,
}

impl NormalizeContext {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            stages: HashMap::new(),
        }
    }

    /// Derive stages from the board's lists. Unmatched list names get no stage.
    pub fn with_lists(mut self, lists: &[RawItem]) -> Self {
        for list in lists {
            let (Some(id), Some(name)) = (item_id(list), str_field(list, "name")) else {
                continue;
            };
            if let Some(stage) = conversions::stage_for_list_name(name) {
                self.stages.insert(id.to_string(), stage);
            }
        }
        self
    }

    pub fn stage_for_list(&self, list_id: &str) -> Option<&'static str> {
        self.stages.get(list_id).copied()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Split a raw page item into the items a phase normalizes
///
/// Attachment pages contain cards; each attachment inherits its card's id as
/// `idCard`. Every other phase normalizes page items as-is.
pub fn expand(phase: Phase, raw: RawItem) -> Vec<RawItem> {
    if phase != Phase::Attachments {
        return vec![raw];
    }

    let Some(card_id) = item_id(&raw).map(String::from) else {
        return Vec::new();
    };
    let Some(attachments) = raw.get("attachments").and_then(|a| a.as_array()) else {
        return Vec::new();
    };

    attachments
        .iter()
        .filter_map(|attachment| {
            let mut attachment = attachment.as_object()?.clone();
            attachment.insert("idCard".to_string(), RawItem::String(card_id.clone()));
            Some(RawItem::Object(attachment))
        })
        .collect()
}

/// Map one raw item of `phase` to a canonical record
pub fn normalize(
    phase: Phase,
    raw: &RawItem,
    ctx: &NormalizeContext,
) -> Result<CanonicalRecord, NormalizeError> {
    if !raw.is_object() {
        return Err(NormalizeError::NotAnObject);
    }
    let id = item_id(raw).ok_or(NormalizeError::MissingField("id"))?;
    let created = created_from_id(id).ok_or_else(|| NormalizeError::InvalidId(id.to_string()))?;

    match phase {
        Phase::Users => normalize_user(id, created, raw),
        Phase::Cards => normalize_card(id, created, raw, ctx),
        Phase::Attachments => normalize_attachment(id, created, raw, ctx),
        Phase::Labels => normalize_label(id, created, raw),
    }
}

/// Add the card creator found by a separate lookup
pub fn attach_creator(record: &mut CanonicalRecord, creator_id: &str) -> bool {
    match reference(creator_id) {
        Some(value) => {
            record.data.insert("created_by_id".to_string(), value);
            true
        }
        None => false,
    }
}

fn str_field<'a>(raw: &'a RawItem, name: &str) -> Option<&'a str> {
    raw.get(name).and_then(|v| v.as_str())
}

fn non_empty<'a>(raw: &'a RawItem, name: &str) -> Option<&'a str> {
    str_field(raw, name).filter(|s| !s.trim().is_empty())
}

/// References must point at well-formed ids; anything else is dropped
fn reference(id: &str) -> Option<Value> {
    is_object_id(id).then(|| Value::Reference(id.to_string()))
}

fn timestamp_field(
    raw: &RawItem,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, NormalizeError> {
    match non_empty(raw, field) {
        Some(value) => parse_timestamp(value)
            .map(Some)
            .ok_or_else(|| NormalizeError::InvalidTimestamp {
                field,
                value: value.to_string(),
            }),
        None => Ok(None),
    }
}

fn normalize_user(
    id: &str,
    created: DateTime<Utc>,
    raw: &RawItem,
) -> Result<CanonicalRecord, NormalizeError> {
    let username = non_empty(raw, "username").ok_or(NormalizeError::MissingField("username"))?;
    let full_name = str_field(raw, "fullName").unwrap_or_default();

    Ok(CanonicalRecord::new(id, created, created)
        .with_field("full_name", Value::Text(full_name.to_string()))
        .with_field("username", Value::Text(username.to_string())))
}

fn normalize_card(
    id: &str,
    created: DateTime<Utc>,
    raw: &RawItem,
    ctx: &NormalizeContext,
) -> Result<CanonicalRecord, NormalizeError> {
    let title = non_empty(raw, "name").ok_or(NormalizeError::MissingField("name"))?;
    let modified = timestamp_field(raw, "dateLastActivity")?.unwrap_or(created);

    let list_id = str_field(raw, "idList").unwrap_or_default();
    let stage = ctx
        .stage_for_list(list_id)
        .ok_or_else(|| NormalizeError::UnmappedEnum {
            field: "stage",
            value: list_id.to_string(),
        })?;

    let due = timestamp_field(raw, "due")?
        .map(|d| Value::Text(d.to_rfc3339_opts(SecondsFormat::Millis, true)));
    let owner = raw
        .get("idMembers")
        .and_then(|m| m.as_array())
        .and_then(|m| m.first())
        .and_then(|m| m.as_str())
        .and_then(reference);

    Ok(CanonicalRecord::new(id, created, modified)
        .with_field("title", Value::Text(title.to_string()))
        .with_optional(
            "body",
            str_field(raw, "desc")
                .and_then(RichText::from_text)
                .map(Value::RichText),
        )
        .with_field("stage", Value::Enum(stage))
        .with_optional("item_url_field", str_field(raw, "url").map(|u| Value::Text(u.to_string())))
        .with_optional("owned_by_id", owner)
        .with_optional("target_close_date", due)
        .with_optional("due_complete", raw.get("dueComplete").and_then(|v| v.as_bool()).map(Value::Bool))
        .with_optional("closed", raw.get("closed").and_then(|v| v.as_bool()).map(Value::Bool))
        .with_optional("position", raw.get("pos").and_then(|v| v.as_f64()).map(Value::Number)))
}

fn normalize_label(
    id: &str,
    created: DateTime<Utc>,
    raw: &RawItem,
) -> Result<CanonicalRecord, NormalizeError> {
    let color = str_field(raw, "color");
    let hex = match color {
        Some(color) => Some(label_color_hex(color).ok_or_else(|| NormalizeError::UnmappedEnum {
            field: "color",
            value: color.to_string(),
        })?),
        None => None,
    };

    let name = match non_empty(raw, "name") {
        Some(name) => name.to_string(),
        None => format!("label-{}", color.unwrap_or("none")),
    };
    let description = RichText::new(vec![name.clone()]).map(Value::RichText);

    Ok(CanonicalRecord::new(id, created, created)
        .with_field("name", Value::Text(name))
        .with_optional("color", hex.map(|h| Value::Text(h.to_string())))
        .with_optional("description", description))
}

fn normalize_attachment(
    id: &str,
    created: DateTime<Utc>,
    raw: &RawItem,
    ctx: &NormalizeContext,
) -> Result<CanonicalRecord, NormalizeError> {
    let file_name = non_empty(raw, "fileName")
        .or_else(|| non_empty(raw, "name"))
        .ok_or(NormalizeError::MissingField("fileName"))?;
    let card_id = str_field(raw, "idCard").ok_or(NormalizeError::MissingField("idCard"))?;
    let parent = reference(card_id).ok_or_else(|| NormalizeError::InvalidId(card_id.to_string()))?;
    let modified = timestamp_field(raw, "date")?.unwrap_or(created);

    let url = str_field(raw, "url").map(|url| {
        Value::Text(conversions::rewrite_attachment_url(
            url,
            ctx.base_url(),
            card_id,
            id,
            file_name,
        ))
    });

    Ok(CanonicalRecord::new(id, created, modified)
        .with_field("file_name", Value::Text(file_name.to_string()))
        .with_optional("url", url)
        .with_field("parent_id", parent)
        .with_optional("author_id", str_field(raw, "idMember").and_then(reference))
        .with_optional(
            "mime_type",
            non_empty(raw, "mimeType").map(|m| Value::Text(m.to_string())),
        )
        .with_optional("bytes", raw.get("bytes").and_then(|b| b.as_f64()).map(Value::Number)))
}
