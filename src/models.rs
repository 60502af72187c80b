use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message snapshot as fetched from Gmail.
///
/// Snapshots are read-only: remote state is the source of truth, so nothing
/// in the crate mutates a `Message` after it has been fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserializers::deserialize_gmail_timestamp",
        serialize_with = "deserializers::serialize_gmail_timestamp"
    )]
    pub internal_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

impl Message {
    /// Whether the message currently carries the given label id
    pub fn has_label(&self, label_id: &str) -> bool {
        self.label_ids.iter().any(|l| l == label_id)
    }
}

/// One node of the MIME tree: its headers and nested parts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    /// True when there is nothing to classify
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.parts.is_empty()
    }

    /// Case-insensitive header lookup; the first occurrence wins
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Custom (de)serializers for Gmail API types
pub mod deserializers {
    use chrono::{DateTime, Utc};
    use serde::{
        de::{self, Deserializer},
        Deserialize, Serializer,
    };

    /// Deserialize Gmail timestamp (milliseconds since epoch as string)
    pub fn deserialize_gmail_timestamp<'de, D>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => {
                let millis = s.parse::<i64>().map_err(de::Error::custom)?;
                let dt = DateTime::from_timestamp_millis(millis)
                    .ok_or_else(|| de::Error::custom("Invalid timestamp"))?;
                Ok(Some(dt))
            }
            None => Ok(None),
        }
    }

    /// Serialize back into the Gmail millisecond-string form
    pub fn serialize_gmail_timestamp<S>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.timestamp_millis().to_string()),
            None => serializer.serialize_none(),
        }
    }
}
