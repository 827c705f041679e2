//! The in-memory codeplug: a raw buffer plus the schema-driven view over it.
//!
//! A [`Codeplug`] pairs a byte buffer with the [`crate::model::RadioModel`] that describes its
//! layout. All access goes through field ids — nothing outside this module and [`crate::field`]
//! ever computes a bit offset by hand.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::field::Value;
use crate::model::RadioModel;

/// Free-form descriptive fields carried alongside a codeplug's raw image.
///
/// Field names match the persisted JSON keys in the file container's `metadata_json` (§6), not
/// Rust conventions — this is what ships on disk and what older tooling reading `.cplg` files
/// expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "radio_serial_number")]
    pub serial_number: Option<String>,
    #[serde(rename = "radio_model_name")]
    pub model_name: Option<String>,
    pub firmware_version: Option<String>,
    pub created_date: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub last_read_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: String,
}

impl Metadata {
    pub fn new(now: DateTime<Utc>) -> Self {
        Metadata {
            serial_number: None,
            model_name: None,
            firmware_version: None,
            created_date: now,
            last_modified: now,
            last_read_date: None,
            notes: String::new(),
        }
    }
}

/// How serious a [`ValidationIssue`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One finding from [`Codeplug::validate`].
///
/// Distinct from [`crate::error::ConstraintFailure`], which is raised synchronously by a single
/// `set` call; a `ValidationIssue` can describe a cross-field condition found by scanning the
/// whole codeplug (e.g. "channel 3 refers to zone 9, which does not exist").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub field_id: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    pub fn error(field_id: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            severity: Severity::Error,
            field_id: Some(field_id.into()),
            message: message.into(),
        }
    }

    pub fn warning(field_id: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            severity: Severity::Warning,
            field_id: Some(field_id.into()),
            message: message.into(),
        }
    }
}

/// An in-memory codeplug image: a raw buffer, the model that describes it, and the set of field
/// ids modified since the buffer was loaded (or since [`Codeplug::clear_modifications`] was last
/// called).
#[derive(Debug, Clone)]
pub struct Codeplug {
    model: RadioModel,
    buf: Vec<u8>,
    pub metadata: Metadata,
    dirty: BTreeSet<String>,
    /// Set while a dependency reactor is applying its own writes, so those writes don't
    /// re-trigger the reactor and recurse.
    in_reactor: bool,
}

impl Codeplug {
    /// Builds a codeplug from `model`'s registered defaults: every field in the schema is written
    /// with its declared default value.
    pub fn from_defaults(model: RadioModel) -> Result<Self, Error> {
        let mut cp = Codeplug {
            buf: vec![0u8; model.image_size()],
            model,
            metadata: Metadata::new(Utc::now()),
            dirty: BTreeSet::new(),
            in_reactor: false,
        };
        for field in cp.model.fields().iter() {
            let default = field.default.clone();
            field.set(default, &mut cp.buf)?;
        }
        cp.dirty.clear();
        Ok(cp)
    }

    /// Wraps an existing raw image with the given metadata, trusting the image was already
    /// written in `model`'s layout. The buffer length must equal `model.image_size()`.
    pub fn from_raw(model: RadioModel, buf: Vec<u8>, metadata: Metadata) -> Result<Self, Error> {
        if buf.len() != model.image_size() {
            return Err(Error::PartitionSizeMismatch {
                expected: model.image_size(),
                actual: buf.len(),
            });
        }
        Ok(Codeplug {
            model,
            buf,
            metadata,
            dirty: BTreeSet::new(),
            in_reactor: false,
        })
    }

    pub fn model(&self) -> &RadioModel {
        &self.model
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Reads a field's current value.
    pub fn get(&self, field_id: &str) -> Result<Value, Error> {
        let field = self
            .model
            .fields()
            .get(field_id)
            .ok_or_else(|| Error::UnknownField(field_id.to_string()))?;
        Ok(field.get(&self.buf))
    }

    /// Validates and writes `value` to `field_id`, marks it dirty, then runs the model's
    /// dependency reactor for that field.
    ///
    /// If the reactor itself calls `set` (via [`Codeplug::apply_dependency_write`]), those nested
    /// writes mark their own targets dirty but do not re-trigger the reactor — a model's
    /// `apply_dependencies` is responsible for not looping on its own side effects.
    pub fn set(&mut self, field_id: &str, value: Value) -> Result<(), Error> {
        let field = self
            .model
            .fields()
            .get(field_id)
            .ok_or_else(|| Error::UnknownField(field_id.to_string()))?
            .clone();
        field.set(value, &mut self.buf)?;
        self.dirty.insert(field_id.to_string());
        self.metadata.last_modified = Utc::now();

        if !self.in_reactor {
            self.in_reactor = true;
            let result = self.model.clone().apply_dependencies(field_id, self);
            self.in_reactor = false;
            result?;
        }
        Ok(())
    }

    /// Writes `value` to `field_id` without invoking the dependency reactor. Reserved for use
    /// from within a model's `apply_dependencies` implementation.
    pub fn apply_dependency_write(&mut self, field_id: &str, value: Value) -> Result<(), Error> {
        let field = self
            .model
            .fields()
            .get(field_id)
            .ok_or_else(|| Error::UnknownField(field_id.to_string()))?
            .clone();
        field.set(value, &mut self.buf)?;
        self.dirty.insert(field_id.to_string());
        Ok(())
    }

    pub fn is_modified(&self, field_id: &str) -> bool {
        self.dirty.contains(field_id)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn modified_fields(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    pub fn clear_modifications(&mut self) {
        self.dirty.clear();
    }

    /// Runs every registered model-level validation rule and returns all findings, most severe
    /// first. An empty result means the codeplug is clean.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = self.model.validate(self);
        issues.sort_by(|a, b| b.severity.cmp(&a.severity));
        issues
    }

    /// [`Codeplug::validate`], turned into a `Result`: `Err` if any issue is `Severity::Error`.
    pub fn validate_for_write(&self) -> Result<(), Error> {
        let issues = self.validate();
        if issues.iter().any(|i| i.severity == Severity::Error) {
            Err(Error::ValidationFailed(issues))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::rdu2020::Rdu2020;

    #[test]
    fn defaults_round_trip_and_start_clean() {
        let cp = Codeplug::from_defaults(RadioModel::new(Rdu2020::schema())).unwrap();
        assert!(!cp.has_unsaved_changes());
        assert_eq!(cp.as_bytes().len(), cp.model().image_size());
    }

    #[test]
    fn set_marks_dirty_and_get_reflects_it() {
        let mut cp = Codeplug::from_defaults(RadioModel::new(Rdu2020::schema())).unwrap();
        cp.set("rdu2020.channel0.rxFreq", Value::U32(4_625_625)).unwrap();
        assert!(cp.is_modified("rdu2020.channel0.rxFreq"));
        assert_eq!(cp.get("rdu2020.channel0.rxFreq").unwrap(), Value::U32(4_625_625));
    }

    #[test]
    fn clear_modifications_empties_dirty_set() {
        let mut cp = Codeplug::from_defaults(RadioModel::new(Rdu2020::schema())).unwrap();
        cp.set("rdu2020.channel0.rxFreq", Value::U32(4_625_625)).unwrap();
        cp.clear_modifications();
        assert!(!cp.has_unsaved_changes());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let cp = Codeplug::from_defaults(RadioModel::new(Rdu2020::schema())).unwrap();
        assert!(matches!(cp.get("nonexistent"), Err(Error::UnknownField(_))));
    }

    #[test]
    fn from_raw_rejects_wrong_size() {
        let err = Codeplug::from_raw(
            RadioModel::new(Rdu2020::schema()),
            vec![0u8; 4],
            Metadata::new(Utc::now()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::PartitionSizeMismatch { .. }));
    }
}
