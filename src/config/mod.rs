//! External settings.
//!
//! A small typed key/value layer over JSON documents. Writes are validated
//! against the key's schema and rejected with a descriptive error, so a
//! malformed policy can never be stored and discovered later at read time.
//! Reads fall back to compiled-in defaults for absent keys.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use thiserror::Error;
use tracing::info;

use crate::correlate::SeverityRuleTable;
use crate::retention::{RetentionPolicy, RetentionTable};

/// The settings keys the system understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    /// Severity classification rules for blocking correlation.
    SeverityRules,
    /// Per-table retention horizon overrides, in months.
    RetentionOverrides,
}

impl SettingKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::SeverityRules => "severity_rules",
            SettingKey::RetentionOverrides => "retention_overrides",
        }
    }
}

/// Errors surfaced by settings writes.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The document does not parse as the key's schema.
    #[error("invalid value for setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// In-process settings store with validated writes.
#[derive(Debug, Default)]
pub struct Settings {
    values: Mutex<HashMap<SettingKey, serde_json::Value>>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and stores a settings document.
    pub fn set(&self, key: SettingKey, value: serde_json::Value) -> Result<(), SettingsError> {
        match key {
            SettingKey::SeverityRules => validate_severity_rules(&value)?,
            SettingKey::RetentionOverrides => {
                validate_retention_overrides(&value)?;
            }
        }
        let mut values = self.values.lock().expect("settings poisoned");
        values.insert(key, value);
        info!(key = key.as_str(), "setting updated");
        Ok(())
    }

    /// The active severity rule table; the compiled-in policy when unset.
    pub fn severity_rules(&self) -> SeverityRuleTable {
        let values = self.values.lock().expect("settings poisoned");
        values
            .get(&SettingKey::SeverityRules)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_else(SeverityRuleTable::default_policy)
    }

    /// The active retention policy: defaults with any stored overrides
    /// merged on top.
    pub fn retention_policy(&self) -> RetentionPolicy {
        let values = self.values.lock().expect("settings poisoned");
        let overrides = values
            .get(&SettingKey::RetentionOverrides)
            .and_then(|v| validate_retention_overrides(v).ok())
            .unwrap_or_default();
        RetentionPolicy::with_overrides(&overrides)
    }
}

fn validate_severity_rules(value: &serde_json::Value) -> Result<(), SettingsError> {
    let invalid = |reason: String| SettingsError::Invalid {
        key: SettingKey::SeverityRules.as_str(),
        reason,
    };
    let table: SeverityRuleTable =
        serde_json::from_value(value.clone()).map_err(|e| invalid(e.to_string()))?;
    for (index, rule) in table.rules.iter().enumerate() {
        if rule
            .max_impacted
            .is_some_and(|max| max < rule.min_impacted)
        {
            return Err(invalid(format!(
                "rule {index}: max_impacted {} is below min_impacted {}",
                rule.max_impacted.unwrap_or_default(),
                rule.min_impacted
            )));
        }
        if let (Some(min), Some(max)) = (rule.min_confidence, rule.max_confidence) {
            if max <= min {
                return Err(invalid(format!(
                    "rule {index}: confidence range [{min}, {max}) is empty"
                )));
            }
        }
    }
    Ok(())
}

fn validate_retention_overrides(
    value: &serde_json::Value,
) -> Result<BTreeMap<RetentionTable, u32>, SettingsError> {
    let invalid = |reason: String| SettingsError::Invalid {
        key: SettingKey::RetentionOverrides.as_str(),
        reason,
    };
    let overrides: BTreeMap<RetentionTable, u32> =
        serde_json::from_value(value.clone()).map_err(|e| invalid(e.to_string()))?;
    for (table, months) in &overrides {
        if *months == 0 {
            return Err(invalid(format!(
                "{}: horizon must be at least one month",
                table.as_str()
            )));
        }
    }
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::Severity;
    use serde_json::json;

    #[test]
    fn absent_keys_fall_back_to_defaults() {
        let settings = Settings::new();
        assert_eq!(settings.severity_rules(), SeverityRuleTable::default_policy());
        assert_eq!(settings.retention_policy(), RetentionPolicy::defaults());
    }

    #[test]
    fn valid_severity_rules_round_trip() {
        let settings = Settings::new();
        settings
            .set(
                SettingKey::SeverityRules,
                json!({
                    "rules": [
                        {"min_impacted": 2, "max_confidence": 50.0, "severity": "critical"}
                    ],
                    "fallback": "low"
                }),
            )
            .unwrap();

        let table = settings.severity_rules();
        assert_eq!(table.rules.len(), 1);
        assert_eq!(table.classify(2, Some(40.0)), Severity::Critical);
        assert_eq!(table.classify(1, Some(40.0)), Severity::Low);
    }

    #[test]
    fn malformed_severity_rules_are_rejected_at_write_time() {
        let settings = Settings::new();
        let err = settings
            .set(SettingKey::SeverityRules, json!({"rules": "nope"}))
            .unwrap_err();
        assert!(err.to_string().contains("severity_rules"));

        // Store is unchanged; reads still serve the default.
        assert_eq!(settings.severity_rules(), SeverityRuleTable::default_policy());
    }

    #[test]
    fn empty_confidence_range_is_rejected() {
        let settings = Settings::new();
        let err = settings
            .set(
                SettingKey::SeverityRules,
                json!({
                    "rules": [{
                        "min_impacted": 1,
                        "min_confidence": 80.0,
                        "max_confidence": 70.0,
                        "severity": "high"
                    }],
                    "fallback": "low"
                }),
            )
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn retention_overrides_merge_over_defaults() {
        let settings = Settings::new();
        settings
            .set(
                SettingKey::RetentionOverrides,
                json!({"queued_events": 3}),
            )
            .unwrap();

        let policy = settings.retention_policy();
        assert_eq!(policy.months_for(RetentionTable::QueuedEvents), 3);
        assert_eq!(policy.months_for(RetentionTable::CanonicalEvents), 24);
    }

    #[test]
    fn zero_month_retention_is_rejected() {
        let settings = Settings::new();
        let err = settings
            .set(
                SettingKey::RetentionOverrides,
                json!({"canonical_events": 0}),
            )
            .unwrap_err();
        assert!(err.to_string().contains("at least one month"));
    }

    #[test]
    fn unknown_retention_table_names_are_rejected() {
        let settings = Settings::new();
        assert!(settings
            .set(
                SettingKey::RetentionOverrides,
                json!({"mystery_table": 5}),
            )
            .is_err());
    }
}
