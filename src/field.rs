//! Field definitions: the schema's leaf unit.
//!
//! A [`FieldDef`] is an immutable descriptor of a named, typed, bit-addressed slice of a codeplug
//! buffer. Field definitions are data, not code — a model contributes a tree of [`crate::node::Node`]s
//! whose leaves are `FieldDef`s, and the schema is the single source of truth for layout. Nothing
//! outside a field definition is allowed to hard-code a bit offset.

use crate::error::{ConstraintFailure, Error};

/// Where a field shows up in a UI built from the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    General,
    Channel,
    Audio,
    Signaling,
    Scan,
    Contacts,
    Bluetooth,
    Advanced,
    VoicePrompts,
}

/// The type of value a field stores, and the bit width that type occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    Bool,
    /// Fixed-length string, `len` bytes wide in the buffer.
    String { len: usize, encoding: crate::bits::TextEncoding },
    /// Fixed-length opaque byte block.
    Bytes { len: usize },
    /// An enumeration; `labels` maps raw numeric tags to display labels. The field itself stores
    /// the raw tag in `bit_length` bits.
    Enum { labels: Vec<(u32, &'static str)> },
    /// An opaque bit-field of `bits` width with no further interpretation.
    BitField { bits: u32 },
}

impl ValueType {
    /// The bit width a fixed primitive type must occupy. Variable-shaped types (`String`,
    /// `Bytes`, `Enum`, `BitField`) carry their own width and return `None` here — their width is
    /// checked separately in [`FieldDef::validate_self`].
    fn fixed_bit_width(&self) -> Option<u32> {
        match self {
            ValueType::U8 | ValueType::I8 => Some(8),
            ValueType::U16 | ValueType::I16 => Some(16),
            ValueType::U32 | ValueType::I32 => Some(32),
            ValueType::Bool => Some(1),
            ValueType::String { .. }
            | ValueType::Bytes { .. }
            | ValueType::Enum { .. }
            | ValueType::BitField { .. } => None,
        }
    }
}

/// A constraint checked by [`crate::codeplug::Codeplug::set`] before a write is committed.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Inclusive numeric range, checked against the value's `as i64` representation.
    Range { min: i64, max: i64 },
    /// The raw value must be a key in the field's `Enum` labels.
    EnumMember,
    /// Maximum string length in characters.
    MaxLen(usize),
    /// The string must match this regex.
    Regex(regex::Regex),
    /// An arbitrary predicate, for cross-cutting rules too specific to model generically.
    Custom {
        description: &'static str,
        check: fn(&Value) -> bool,
    },
}

impl Constraint {
    fn check(&self, value: &Value, field: &FieldDef) -> Result<(), String> {
        match self {
            Constraint::Range { min, max } => {
                let n = value.as_i64().ok_or_else(|| "value is not numeric".to_string())?;
                if n < *min || n > *max {
                    Err(format!("{} is outside the range [{}, {}]", n, min, max))
                } else {
                    Ok(())
                }
            }
            Constraint::EnumMember => {
                let n = value.as_i64().ok_or_else(|| "value is not numeric".to_string())? as u32;
                match &field.value_type {
                    ValueType::Enum { labels } if labels.iter().any(|(tag, _)| *tag == n) => Ok(()),
                    ValueType::Enum { .. } => Err(format!("{} is not a valid enum member", n)),
                    _ => Err("field is not an enum".to_string()),
                }
            }
            Constraint::MaxLen(max) => match value {
                Value::String(s) if s.chars().count() > *max => {
                    Err(format!("string exceeds maximum length of {}", max))
                }
                Value::String(_) => Ok(()),
                _ => Err("value is not a string".to_string()),
            },
            Constraint::Regex(re) => match value {
                Value::String(s) if re.is_match(s) => Ok(()),
                Value::String(s) => Err(format!("{:?} does not match {}", s, re.as_str())),
                _ => Err("value is not a string".to_string()),
            },
            Constraint::Custom { description, check } => {
                if check(value) {
                    Ok(())
                } else {
                    Err(description.to_string())
                }
            }
        }
    }
}

/// A typed field value.
///
/// Enumerations surface as their raw numeric tag; translating to a display label is the caller's
/// job via the field's `ValueType::Enum` labels (see [`crate::transforms`] for the common
/// human-domain transforms layered on top).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    I8(i8),
    I16(i16),
    I32(i32),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Enum(u32),
    BitField(u32),
}

impl Value {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::U8(v) => Some(*v as i64),
            Value::U16(v) => Some(*v as i64),
            Value::U32(v) => Some(*v as i64),
            Value::I8(v) => Some(*v as i64),
            Value::I16(v) => Some(*v as i64),
            Value::I32(v) => Some(*v as i64),
            Value::Bool(v) => Some(*v as i64),
            Value::Enum(v) => Some(*v as i64),
            Value::BitField(v) => Some(*v as i64),
            Value::String(_) | Value::Bytes(_) => None,
        }
    }
}

/// An immutable, stable-id field descriptor: the schema's single source of truth for a field's
/// wire layout, display metadata, and validation.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub id: &'static str,
    pub name: &'static str,
    pub category: Category,
    pub value_type: ValueType,
    /// Absolute bit offset into the owning codeplug buffer.
    pub bit_offset: usize,
    pub bit_length: u32,
    pub default: Value,
    pub constraint: Option<Constraint>,
    pub dependencies: Vec<&'static str>,
    pub read_only: bool,
    pub help: &'static str,
}

impl FieldDef {
    /// Checks this field's own internal invariants: its value type's width (if fixed) must equal
    /// `bit_length`, and any enum labels must fit within `bit_length` bits.
    ///
    /// Called at model-registration time; a violation is a schema-authoring bug and is reported
    /// via `Error::BoundsError` rather than allowed to silently corrupt a buffer later.
    pub fn validate_self(&self) -> Result<(), Error> {
        if let Some(width) = self.value_type.fixed_bit_width() {
            if width != self.bit_length {
                return Err(Error::BoundsError(format!(
                    "field {:?} declares bit_length {} but its value type requires {}",
                    self.id, self.bit_length, width
                )));
            }
        }
        if let ValueType::Enum { labels } = &self.value_type {
            let max_representable = if self.bit_length >= 32 {
                u32::MAX
            } else {
                (1u32 << self.bit_length) - 1
            };
            for (tag, _) in labels {
                if *tag > max_representable {
                    return Err(Error::BoundsError(format!(
                        "field {:?} enum tag {} does not fit in {} bits",
                        self.id, tag, self.bit_length
                    )));
                }
            }
        }
        Ok(())
    }

    /// Whether this field's bit range fits inside a buffer of `buffer_len` bytes.
    pub fn fits_in(&self, buffer_len: usize) -> bool {
        self.bit_offset + self.bit_length as usize <= buffer_len * 8
    }

    /// Reads this field's value out of `buf` at its declared offset.
    pub fn get(&self, buf: &[u8]) -> Value {
        use crate::bits::{BitReader, Endian};
        let mut r = BitReader::new(buf);
        r.seek_bit(self.bit_offset);
        match &self.value_type {
            ValueType::U8 => Value::U8(r.read_u8()),
            ValueType::U16 => Value::U16(r.read_u16(Endian::Big)),
            ValueType::U32 => Value::U32(r.read_u32(Endian::Big)),
            ValueType::I8 => Value::I8(r.read_u8() as i8),
            ValueType::I16 => Value::I16(r.read_u16(Endian::Big) as i16),
            ValueType::I32 => Value::I32(r.read_u32(Endian::Big) as i32),
            ValueType::Bool => Value::Bool(r.read_bit() != 0),
            ValueType::String { len, encoding } => {
                Value::String(r.read_fixed_string(*len, *encoding))
            }
            ValueType::Bytes { len } => Value::Bytes(r.read_bytes(*len)),
            ValueType::Enum { .. } => Value::Enum(r.read_uint(self.bit_length)),
            ValueType::BitField { bits } => Value::BitField(r.read_uint(*bits)),
        }
    }

    /// Validates `value` against this field's constraint, then writes it to `buf` at its declared
    /// offset. Leaves `buf` untouched on constraint failure.
    pub fn set(&self, value: Value, buf: &mut [u8]) -> Result<(), Error> {
        if self.read_only {
            return Err(Error::ConstraintFailed(ConstraintFailure {
                field_id: self.id.to_string(),
                message: "field is read-only".to_string(),
            }));
        }
        if let Some(constraint) = &self.constraint {
            constraint.check(&value, self).map_err(|message| {
                Error::ConstraintFailed(ConstraintFailure {
                    field_id: self.id.to_string(),
                    message,
                })
            })?;
        }

        use crate::bits::{BitWriter, Endian};
        let mut w = BitWriter::new(buf);
        w.seek_bit(self.bit_offset);
        match (&self.value_type, &value) {
            (ValueType::U8, Value::U8(v)) => w.write_u8(*v),
            (ValueType::U16, Value::U16(v)) => w.write_u16(*v, Endian::Big),
            (ValueType::U32, Value::U32(v)) => w.write_u32(*v, Endian::Big),
            (ValueType::I8, Value::I8(v)) => w.write_u8(*v as u8),
            (ValueType::I16, Value::I16(v)) => w.write_u16(*v as u16, Endian::Big),
            (ValueType::I32, Value::I32(v)) => w.write_u32(*v as u32, Endian::Big),
            (ValueType::Bool, Value::Bool(v)) => w.write_bit(*v as u8),
            (ValueType::String { len, encoding }, Value::String(s)) => {
                w.write_fixed_string(s, *len, *encoding)
            }
            (ValueType::Bytes { len }, Value::Bytes(b)) => {
                let mut padded = vec![0u8; *len];
                let n = b.len().min(*len);
                padded[..n].copy_from_slice(&b[..n]);
                w.write_bytes(&padded)
            }
            (ValueType::Enum { .. }, Value::Enum(v)) => w.write_uint(*v, self.bit_length),
            (ValueType::BitField { bits }, Value::BitField(v)) => w.write_uint(*v, *bits),
            _ => {
                return Err(Error::ConstraintFailed(ConstraintFailure {
                    field_id: self.id.to_string(),
                    message: "value type does not match field's declared type".to_string(),
                }))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::TextEncoding;
    use proptest::prelude::*;

    fn u16_field(id: &'static str, bit_offset: usize) -> FieldDef {
        FieldDef {
            id,
            name: id,
            category: Category::General,
            value_type: ValueType::U16,
            bit_offset,
            bit_length: 16,
            default: Value::U16(0),
            constraint: None,
            dependencies: vec![],
            read_only: false,
            help: "",
        }
    }

    proptest! {
        /// get/set round trip for an in-range `u8` field at any byte-aligned offset.
        #[test]
        fn u8_field_round_trips(value in 0u8..=200, byte_offset in 0usize..4) {
            let field = u8_field("x", byte_offset * 8);
            let mut buf = [0u8; 5];
            field.set(Value::U8(value), &mut buf).unwrap();
            prop_assert_eq!(field.get(&buf), Value::U8(value));
        }

        /// get/set round trip for a `u16` field across the full value range and several offsets.
        #[test]
        fn u16_field_round_trips(value in any::<u16>(), byte_offset in 0usize..4) {
            let field = u16_field("x", byte_offset * 8);
            let mut buf = [0u8; 6];
            field.set(Value::U16(value), &mut buf).unwrap();
            prop_assert_eq!(field.get(&buf), Value::U16(value));
        }

        /// a value outside the field's constraint is rejected and never touches the buffer.
        #[test]
        fn out_of_range_u8_is_rejected_without_mutating_buffer(value in 201u32..=255) {
            let field = u8_field("x", 0);
            let mut buf = [9u8; 1];
            let err = field.set(Value::U8(value as u8), &mut buf).unwrap_err();
            prop_assert!(matches!(err, Error::ConstraintFailed(_)));
            prop_assert_eq!(buf[0], 9);
        }
    }

    fn u8_field(id: &'static str, bit_offset: usize) -> FieldDef {
        FieldDef {
            id,
            name: id,
            category: Category::General,
            value_type: ValueType::U8,
            bit_offset,
            bit_length: 8,
            default: Value::U8(0),
            constraint: Some(Constraint::Range { min: 0, max: 200 }),
            dependencies: vec![],
            read_only: false,
            help: "",
        }
    }

    #[test]
    fn get_set_round_trip() {
        let field = u8_field("x", 0);
        let mut buf = [0u8; 1];
        field.set(Value::U8(42), &mut buf).unwrap();
        assert_eq!(field.get(&buf), Value::U8(42));
    }

    #[test]
    fn constraint_rejects_and_leaves_buffer_untouched() {
        let field = u8_field("x", 0);
        let mut buf = [7u8; 1];
        let err = field.set(Value::U8(255), &mut buf).unwrap_err();
        assert!(matches!(err, Error::ConstraintFailed(_)));
        assert_eq!(buf[0], 7);
    }

    #[test]
    fn read_only_field_rejects_writes() {
        let mut field = u8_field("x", 0);
        field.read_only = true;
        let mut buf = [0u8; 1];
        assert!(field.set(Value::U8(1), &mut buf).is_err());
    }

    #[test]
    fn bit_length_mismatch_is_rejected_at_registration() {
        let mut field = u8_field("x", 0);
        field.bit_length = 7;
        assert!(field.validate_self().is_err());
    }

    #[test]
    fn string_field_slot_boundaries() {
        let field = FieldDef {
            id: "s",
            name: "s",
            category: Category::General,
            value_type: ValueType::String { len: 4, encoding: TextEncoding::Ascii },
            bit_offset: 0,
            bit_length: 32,
            default: Value::String(String::new()),
            constraint: None,
            dependencies: vec![],
            read_only: false,
            help: "",
        };
        let mut buf = [0u8; 4];
        field.set(Value::String("ab".into()), &mut buf).unwrap();
        assert_eq!(field.get(&buf), Value::String("ab".into()));
        field.set(Value::String("abcd".into()), &mut buf).unwrap();
        assert_eq!(field.get(&buf), Value::String("abcd".into()));
        field.set(Value::String("abcdef".into()), &mut buf).unwrap();
        assert_eq!(field.get(&buf), Value::String("abcd".into()));
    }
}
