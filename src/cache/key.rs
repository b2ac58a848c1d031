//! Deterministic cache keys.
//!
//! A key is the BLAKE3 digest of the canonical JSON form of `{feature, text, ...options}`
//! with sorted keys. Text is NFC-normalized first so canonically equal input shares a key.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    fields: BTreeMap<String, Value>,
    digest: String,
}

impl CacheKey {
    pub fn new(feature: &str, text: &str) -> Self {
        Self::from_fields(feature, text, BTreeMap::new())
    }

    /// Add a named option; `None` is kept as `null` so "no hint" and an absent option
    /// stay distinct from any concrete hint.
    pub fn with_option<V: Serialize>(self, name: &str, value: Option<V>) -> Self {
        let mut options = self.options();
        let value = value
            .and_then(|v| serde_json::to_value(v).ok())
            .unwrap_or(Value::Null);
        options.insert(name.to_string(), value);
        let feature = self.feature().to_string();
        let text = self.text().to_string();
        Self::from_fields(&feature, &text, options)
    }

    fn from_fields(feature: &str, text: &str, options: BTreeMap<String, Value>) -> Self {
        let mut fields = options;
        // Reserved names win over options of the same name.
        fields.insert("feature".to_string(), Value::String(feature.to_string()));
        fields.insert("text".to_string(), Value::String(text.nfc().collect()));

        let canonical = canonical_json(&fields);
        let digest = hex::encode(blake3::hash(canonical.as_bytes()).as_bytes());
        Self { fields, digest }
    }

    fn options(&self) -> BTreeMap<String, Value> {
        self.fields
            .iter()
            .filter(|(k, _)| k.as_str() != "feature" && k.as_str() != "text")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn feature(&self) -> &str {
        self.fields
            .get("feature")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn text(&self) -> &str {
        self.fields
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Sorted-key JSON the digest is computed over
    pub fn canonical(&self) -> String {
        canonical_json(&self.fields)
    }

    /// Hex-encoded BLAKE3 digest
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.digest.as_bytes()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest)
    }
}

fn canonical_json(fields: &BTreeMap<String, Value>) -> String {
    // BTreeMap iteration is sorted, and serde_json objects are BTreeMap-backed.
    serde_json::to_string(fields).unwrap_or_default()
}
