//! Routing key and timestamp extraction from document ids

/// Extracts the routing key and timestamp from a document id
pub trait KeyExtractor: Send + Sync {
    fn key(&self, id: &str) -> Option<String>;
    fn time(&self, id: &str) -> Option<i64>;
}

/// Parses ids of the form `k/<key>/t/<millis>[/...]`
///
/// The key may itself contain slashes; it runs up to the `/t/` marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdKeys;

const KEY_PREFIX: &str = "k/";
const TIME_MARKER: &str = "/t/";

impl KeyExtractor for IdKeys {
    fn key(&self, id: &str) -> Option<String> {
        let rest = id.strip_prefix(KEY_PREFIX)?;
        let key = match rest.find(TIME_MARKER) {
            Some(end) => &rest[..end],
            None => rest,
        };
        (!key.is_empty()).then(|| key.to_string())
    }

    fn time(&self, id: &str) -> Option<i64> {
        let start = if let Some(rest) = id.strip_prefix("t/") {
            rest
        } else {
            let at = id.find(TIME_MARKER)?;
            &id[at + TIME_MARKER.len()..]
        };
        let digits = start.split('/').next()?;
        digits.parse().ok()
    }
}
