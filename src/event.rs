/// Consent events as received from the host application.
///
/// An event is opaque to the core apart from the five fields that make up
/// its leaf hash:
///
/// ```text
/// leaf = H(context_text | url | timestamp_millis | action_label | category)
/// ```
///
/// `|` is a literal separator and missing fields contribute the empty
/// string. Identical events therefore produce identical leaves; the core
/// keeps both, and de-duplication is left to the caller.
use serde::{Deserialize, Serialize};

use crate::crypto::hash::{Hash256, HashProvider};
use crate::error::{AnchorError, Result};

const FIELD_SEPARATOR: u8 = b'|';

/// One observed consent action.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsentEvent {
    /// Text of the consent prompt the action was taken on.
    pub context_text: String,
    pub url: String,
    pub timestamp_millis: i64,
    /// What the user chose, e.g. "accept_all".
    pub action_label: String,
    pub category: String,
}

impl ConsentEvent {
    pub fn new(url: &str, action_label: &str, timestamp_millis: i64) -> Self {
        Self {
            url: url.to_string(),
            action_label: action_label.to_string(),
            timestamp_millis,
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context_text: &str) -> Self {
        self.context_text = context_text.to_string();
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    /// The byte string the leaf hash is computed over.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let timestamp = self.timestamp_millis.to_string();
        let fields: [&[u8]; 5] = [
            self.context_text.as_bytes(),
            self.url.as_bytes(),
            timestamp.as_bytes(),
            self.action_label.as_bytes(),
            self.category.as_bytes(),
        ];

        let len = fields.iter().map(|f| f.len()).sum::<usize>() + fields.len() - 1;
        let mut out = Vec::with_capacity(len);
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                out.push(FIELD_SEPARATOR);
            }
            out.extend_from_slice(field);
        }
        out
    }

    pub fn leaf_hash(&self, hasher: &dyn HashProvider) -> Hash256 {
        hasher.hash(&self.canonical_bytes())
    }

    /// Reject malformed events before they touch any batch state.
    pub fn validate(&self, max_field_len: usize) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(AnchorError::Validation("url is required".into()));
        }
        if self.action_label.trim().is_empty() {
            return Err(AnchorError::Validation("actionLabel is required".into()));
        }
        if self.timestamp_millis < 0 {
            return Err(AnchorError::Validation(format!(
                "timestampMillis must be non-negative, got {}",
                self.timestamp_millis
            )));
        }

        for (name, value) in [
            ("contextText", &self.context_text),
            ("url", &self.url),
            ("actionLabel", &self.action_label),
            ("category", &self.category),
        ] {
            if value.len() > max_field_len {
                return Err(AnchorError::Validation(format!(
                    "{name} is {} bytes, limit is {max_field_len}",
                    value.len()
                )));
            }
        }

        Ok(())
    }
}
