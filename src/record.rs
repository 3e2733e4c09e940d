use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Bound for caller payloads: anything serde can round-trip and threads can share.
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// The unit of storage.
///
/// `id` is the primary key; `group` tags records for bulk deletion and atomic
/// replacement; `date` drives recency eviction and tie-breaking. The embedding
/// is derived by the store from `text` and is not part of the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub date: DateTime<Utc>,
    pub text: String,
    pub data: T,
}

impl<T> Record<T> {
    /// New ungrouped record dated now.
    pub fn new(id: impl Into<String>, text: impl Into<String>, data: T) -> Self {
        Self {
            id: id.into(),
            group: None,
            date: Utc::now(),
            text: text.into(),
            data,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.group.as_deref() == Some(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let date = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let record = Record::new("a1", "I like apples", 7u32)
            .with_group("fruit")
            .with_date(date);

        assert_eq!(record.id, "a1");
        assert_eq!(record.date, date);
        assert!(record.in_group("fruit"));
        assert!(!record.in_group("veg"));
    }

    #[test]
    fn test_ungrouped_omits_group_field() {
        let record = Record::new("a1", "text", ());
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("group").is_none());
    }
}
