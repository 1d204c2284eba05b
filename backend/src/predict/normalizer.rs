use serde::Serialize;
use shared::{RawInstance, WrappedInstance};

use crate::error::ValidationError;

const DATA_SCHEME: &str = "data:";
const MISSING_CONTENT: &str = "instance must contain image content";

/// Canonical image payload: whitespace-free encoded content with no scheme prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedInstance {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

pub fn normalize(instances: &[RawInstance]) -> Result<Vec<NormalizedInstance>, ValidationError> {
    if instances.is_empty() {
        return Err(ValidationError::new("request must contain at least one instance"));
    }

    instances
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            normalize_one(raw).ok_or_else(|| ValidationError::at(MISSING_CONTENT, index))
        })
        .collect()
}

fn normalize_one(raw: &RawInstance) -> Option<NormalizedInstance> {
    match raw {
        RawInstance::Text(text) if !has_data_scheme(text) => plain(text, None),
        RawInstance::Wrapped(WrappedInstance {
            content: Some(content),
            mime_type,
        }) => {
            let declared = mime_type.as_deref().map(str::trim).filter(|m| !m.is_empty());
            if has_data_scheme(content) {
                let mut instance = data_uri(content)?;
                if instance.mime_type.is_none() {
                    instance.mime_type = declared.map(str::to_string);
                }
                Some(instance)
            } else {
                plain(content, declared.map(str::to_string))
            }
        }
        RawInstance::Text(text) => data_uri(text),
        _ => None,
    }
}

fn plain(content: &str, mime_type: Option<String>) -> Option<NormalizedInstance> {
    let content = strip_whitespace(content);
    if content.is_empty() {
        return None;
    }
    Some(NormalizedInstance { content, mime_type })
}

/// `data:<media type>[;params],<content>`; the media type is optional.
fn data_uri(value: &str) -> Option<NormalizedInstance> {
    let rest = &value.trim_start()[DATA_SCHEME.len()..];
    let (header, body) = rest.split_once(',')?;
    let media_type = header
        .split(';')
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);
    plain(body, media_type)
}

fn has_data_scheme(value: &str) -> bool {
    let trimmed = value.trim_start();
    trimmed
        .get(..DATA_SCHEME.len())
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case(DATA_SCHEME))
}

fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}
