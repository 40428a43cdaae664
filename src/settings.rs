//! Typed component settings with partial JSON overrides.
//!
//! Every detector carries its own settings struct. Overrides arrive as nested
//! key/value objects and are merged onto the current values, then re-parsed so
//! unknown keys and wrongly typed values are rejected at call time.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings override must be a JSON object, got `{0}`")]
    NotAnObject(String),

    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl SettingsError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub trait Settings: Serialize + DeserializeOwned + Sized {
    /// Checks value ranges that the type system cannot express.
    fn validate(&self) -> Result<(), SettingsError>;

    /// Returns a copy of `self` with `patch` merged on top.
    ///
    /// Nested objects are merged key by key, any other value replaces the
    /// current one.
    fn merged(&self, patch: &Value) -> Result<Self, SettingsError> {
        if !patch.is_object() {
            return Err(SettingsError::NotAnObject(patch.to_string()));
        }
        let mut current = serde_json::to_value(self)?;
        merge_values(&mut current, patch);
        let updated: Self = serde_json::from_value(current)?;
        updated.validate()?;
        Ok(updated)
    }
}

fn merge_values(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

pub(crate) fn ensure_positive(key: &'static str, value: f64) -> Result<(), SettingsError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SettingsError::invalid(key, format!("expected a positive number, got {value}")))
    }
}

pub(crate) fn ensure_non_negative(key: &'static str, value: f64) -> Result<(), SettingsError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SettingsError::invalid(key, format!("expected a non-negative number, got {value}")))
    }
}

pub(crate) fn ensure_fraction(key: &'static str, value: f64) -> Result<(), SettingsError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(SettingsError::invalid(key, format!("expected a value in (0, 1], got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Inner {
        a: u32,
        b: f64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Outer {
        inner: Inner,
        flag: bool,
    }

    impl Settings for Outer {
        fn validate(&self) -> Result<(), SettingsError> {
            ensure_positive("inner.b", self.inner.b)
        }
    }

    fn outer() -> Outer {
        Outer {
            inner: Inner { a: 1, b: 2.0 },
            flag: false,
        }
    }

    #[test]
    fn nested_override_keeps_siblings() {
        let merged = outer().merged(&json!({"inner": {"a": 7}})).unwrap();
        assert_eq!(merged.inner, Inner { a: 7, b: 2.0 });
        assert!(!merged.flag);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = outer().merged(&json!({"inner": {"c": 1}})).unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = outer().merged(&json!({"flag": "yes"})).unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn validation_runs_after_merge() {
        let err = outer().merged(&json!({"inner": {"b": -1.0}})).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { key: "inner.b", .. }));
    }

    #[test]
    fn non_object_patch_is_rejected() {
        let err = outer().merged(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, SettingsError::NotAnObject(_)));
    }
}
