use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};

pub const DEFAULT_PAGE_LIMIT: u64 = 50;
const MAX_PAGE_LIMIT: u64 = 500;

#[derive(Deserialize)]
#[serde(untagged)]
enum U64Input {
    Number(u64),
    Text(String),
}

/// Accepts `limit=20` as well as `limit="20"`.
pub fn deserialize_optional_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<U64Input>::deserialize(deserializer)? {
        None => Ok(None),
        Some(U64Input::Number(n)) => Ok(Some(n)),
        Some(U64Input::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(U64Input::Text(text)) => text.trim().parse().map(Some).map_err(DeError::custom),
    }
}

/// Clamped `(limit, offset)`.
pub fn page_bounds(limit: Option<u64>, offset: Option<u64>) -> (usize, usize) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    (limit as usize, offset.unwrap_or(0) as usize)
}

/// The `limit`/`offset` window of `items`.
pub fn paginate<T>(items: Vec<T>, limit: usize, offset: usize) -> Vec<T> {
    items.into_iter().skip(offset).take(limit).collect()
}
