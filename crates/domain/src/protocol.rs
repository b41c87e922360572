use crate::error::SchemaError;
use crate::models::{Address, Author, CommentNode, Reactions, SortKey, THUMBS_UP};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const MAX_PLAIN_TEXT_CHARS: usize = 250;

pub const PREVIEW_CHARS: usize = 125;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub address: Address,
    pub data: Value,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NodeDocument {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_photo: String,
    pub comment_text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    // null and absent read the same
    #[serde(default)]
    pub reactions: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub attachments: Option<Vec<Value>>,
}

pub fn build_node_document(author: &Author, body_html: &str, attachments: &[String]) -> Value {
    serde_json::json!({
        "userId": author.id,
        "userName": author.name,
        "userPhoto": author.avatar_url,
        "commentText": body_html,
        "timestamp": Value::Null,
        "reactions": {},
        "attachments": attachments,
    })
}

/// Rejects documents that are not objects, lack `commentText`, or carry an
/// unreadable `timestamp`. Coerces the rest: null collections read as empty,
/// reaction counts that are not positive integers and non-string
/// attachments are dropped.
pub fn decode_node(doc: &Document) -> Result<CommentNode, SchemaError> {
    if !doc.data.is_object() {
        return Err(SchemaError::NotAnObject(doc.address.to_string()));
    }
    let parsed: NodeDocument =
        serde_json::from_value(doc.data.clone()).map_err(|e| SchemaError::Invalid {
            path: doc.address.to_string(),
            reason: e.to_string(),
        })?;

    let reactions = parsed
        .reactions
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(emoji, count)| count.as_u64().map(|c| (emoji, c)))
        .collect::<Reactions>();

    let attachments = parsed
        .attachments
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();

    Ok(CommentNode {
        id: doc.address.target().clone(),
        author: Author {
            id: parsed.user_id,
            name: parsed.user_name,
            avatar_url: parsed.user_photo,
        },
        body_html: parsed.comment_text,
        attachments,
        reactions,
        created_at: parsed.timestamp,
        children: Vec::new(),
    })
}

pub fn read_reactions(data: &Value) -> Reactions {
    data.get("reactions")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(emoji, count)| count.as_u64().map(|c| (emoji.clone(), c)))
                .collect()
        })
        .unwrap_or_default()
}

pub fn write_reactions(data: &mut Value, reactions: &Reactions) {
    if let Some(obj) = data.as_object_mut() {
        let map = reactions
            .iter()
            .map(|(emoji, count)| (emoji.to_string(), Value::from(count)))
            .collect::<serde_json::Map<_, _>>();
        obj.insert("reactions".to_string(), Value::Object(map));
    }
}

pub fn read_timestamp(data: &Value) -> Option<DateTime<Utc>> {
    data.get("timestamp")
        .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v.clone()).ok())
}

pub fn write_timestamp(data: &mut Value, at: DateTime<Utc>) {
    if let Some(obj) = data.as_object_mut() {
        obj.insert("timestamp".to_string(), serde_json::json!(at));
    }
}

pub fn thumbs_up(data: &Value) -> i64 {
    i64::try_from(read_reactions(data).get(THUMBS_UP)).unwrap_or(i64::MAX)
}

pub fn sort_value(order: SortKey, data: &Value) -> i64 {
    match order {
        SortKey::Latest => read_timestamp(data)
            .map(|t| t.timestamp_micros())
            .unwrap_or(i64::MIN),
        SortKey::Popular => thumbs_up(data),
    }
}

pub fn plain_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    html_escape::decode_html_entities(&text).into_owned()
}

pub fn plain_text_len(html: &str) -> usize {
    plain_text(html).chars().count()
}

pub fn preview(html: &str, limit: usize) -> (String, bool) {
    let text = plain_text(html);
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(limit).collect();
    let truncated = chars.next().is_some();
    (head, truncated)
}
