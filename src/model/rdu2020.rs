//! The RDU2020: an entry-level UHF business radio, 16 channels, no display.
//!
//! Channel ids deliberately do not go through [`crate::node::Node::repeating`]'s generic
//! `#<index>` suffixing — this model's wire format (and every tool that already speaks it) names
//! channels `channel0`, `channel1`, ... with no separator, so the per-channel fields are built by
//! hand in a loop instead.

use crate::bits::TextEncoding;
use crate::codeplug::{Codeplug, ValidationIssue};
use crate::error::Error;
use crate::field::{Category, Constraint, FieldDef, Value, ValueType};
use crate::model::{Band, ModelSchema};
use crate::node::Node;

const MAX_CHANNELS: usize = 16;
const DEFAULT_CHANNELS: u8 = 2;
const CHANNEL_BASE_BIT: usize = 128;
const CHANNEL_STRIDE_BITS: usize = 224;
const BAND_LOWER_100HZ: i64 = 4_000_000;
const BAND_UPPER_100HZ: i64 = 4_700_000;

pub struct Rdu2020;

impl Rdu2020 {
    pub fn schema() -> ModelSchema {
        ModelSchema {
            id: "RDU2020",
            display_name: "RDU2020",
            family: "business-uhf",
            size_bytes: 4096,
            max_channels: MAX_CHANNELS,
            band: Band {
                name: "UHF",
                lower_mhz: 400.0,
                upper_mhz: 470.0,
                spacing_khz: 12.5,
            },
            tree: vec![header_node(), channels_node()],
            apply_dependencies,
            validate,
        }
    }
}

fn header_node() -> Node {
    Node::group("header").with_fields(vec![
        FieldDef {
            id: "rdu2020.numberOfChannels",
            name: "Number of Channels",
            category: Category::General,
            value_type: ValueType::U8,
            bit_offset: 0,
            bit_length: 8,
            default: Value::U8(DEFAULT_CHANNELS),
            constraint: Some(Constraint::Range { min: 1, max: MAX_CHANNELS as i64 }),
            dependencies: vec![],
            read_only: false,
            help: "How many of the 16 channel slots are presented to the user.",
        },
        FieldDef {
            id: "rdu2020.scrambleEnabled",
            name: "Voice Scramble",
            category: Category::Signaling,
            value_type: ValueType::Bool,
            bit_offset: 8,
            bit_length: 1,
            default: Value::Bool(false),
            constraint: None,
            dependencies: vec![],
            read_only: false,
            help: "Master enable for per-channel voice scrambling.",
        },
    ])
}

fn channels_node() -> Node {
    let mut channels = Vec::with_capacity(MAX_CHANNELS);
    for i in 0..MAX_CHANNELS {
        let base = CHANNEL_BASE_BIT + i * CHANNEL_STRIDE_BITS;
        channels.push(channel_node(i, base));
    }
    Node::group("channels").with_children(channels)
}

fn channel_node(index: usize, base: usize) -> Node {
    let prefix = format!("rdu2020.channel{}", index);
    let leak = |suffix: &str| -> &'static str {
        Box::leak(format!("{}.{}", prefix, suffix).into_boxed_str())
    };
    Node::group("channel").with_fields(vec![
        FieldDef {
            id: leak("rxFreq"),
            name: "RX Frequency",
            category: Category::Channel,
            value_type: ValueType::U32,
            bit_offset: base,
            bit_length: 32,
            default: Value::U32(4_625_000),
            constraint: Some(Constraint::Range { min: BAND_LOWER_100HZ, max: BAND_UPPER_100HZ }),
            dependencies: vec![],
            read_only: false,
            help: "Receive frequency, in 100 Hz units.",
        },
        FieldDef {
            id: leak("txFreq"),
            name: "TX Frequency",
            category: Category::Channel,
            value_type: ValueType::U32,
            bit_offset: base + 32,
            bit_length: 32,
            default: Value::U32(4_625_000),
            constraint: Some(Constraint::Range { min: BAND_LOWER_100HZ, max: BAND_UPPER_100HZ }),
            dependencies: vec![],
            read_only: false,
            help: "Transmit frequency, in 100 Hz units.",
        },
        FieldDef {
            id: leak("name"),
            name: "Channel Name",
            category: Category::Channel,
            value_type: ValueType::String { len: 16, encoding: TextEncoding::Ascii },
            bit_offset: base + 64,
            bit_length: 128,
            default: Value::String(String::new()),
            constraint: Some(Constraint::MaxLen(16)),
            dependencies: vec![],
            read_only: false,
            help: "Display name shown on the radio's channel selector.",
        },
        FieldDef {
            id: leak("ctcssRx"),
            name: "RX CTCSS Tone",
            category: Category::Signaling,
            value_type: ValueType::U8,
            bit_offset: base + 192,
            bit_length: 8,
            default: Value::U8(0),
            constraint: Some(Constraint::Range { min: 0, max: 50 }),
            dependencies: vec![],
            read_only: false,
            help: "0 = None; see crate::transforms::CtcssTransform.",
        },
        FieldDef {
            id: leak("ctcssTx"),
            name: "TX CTCSS Tone",
            category: Category::Signaling,
            value_type: ValueType::U8,
            bit_offset: base + 200,
            bit_length: 8,
            default: Value::U8(0),
            constraint: Some(Constraint::Range { min: 0, max: 50 }),
            dependencies: vec![],
            read_only: false,
            help: "0 = None; see crate::transforms::CtcssTransform.",
        },
        FieldDef {
            id: leak("txPowerHigh"),
            name: "High Power",
            category: Category::Channel,
            value_type: ValueType::Bool,
            bit_offset: base + 208,
            bit_length: 1,
            default: Value::Bool(true),
            constraint: None,
            dependencies: vec![],
            read_only: false,
            help: "",
        },
        FieldDef {
            id: leak("scrambleCode"),
            name: "Scramble Code",
            category: Category::Signaling,
            value_type: ValueType::BitField { bits: 8 },
            bit_offset: base + 216,
            bit_length: 8,
            default: Value::BitField(0),
            constraint: None,
            dependencies: vec!["rdu2020.scrambleEnabled"],
            read_only: false,
            help: "Cleared automatically when rdu2020.scrambleEnabled is turned off.",
        },
    ])
}

/// Clears every channel's scramble code when the master scramble flag is turned off.
fn apply_dependencies(field_id: &str, cp: &mut Codeplug) -> Result<(), Error> {
    if field_id != "rdu2020.scrambleEnabled" {
        return Ok(());
    }
    if cp.get("rdu2020.scrambleEnabled")? != Value::Bool(false) {
        return Ok(());
    }
    for i in 0..MAX_CHANNELS {
        let field_id = format!("rdu2020.channel{}.scrambleCode", i);
        cp.apply_dependency_write(&field_id, Value::BitField(0))?;
    }
    Ok(())
}

/// Re-checks every active channel's frequencies against the band plan.
///
/// This duplicates the field-level `Range` constraint deliberately: `set` enforces it on the
/// validated write path, but a codeplug opened from a raw buffer (file container, radio read)
/// skips per-field validation, so this is the only check that runs on that path.
fn validate(cp: &Codeplug) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let active = match cp.get("rdu2020.numberOfChannels") {
        Ok(Value::U8(n)) => n as usize,
        _ => return issues,
    };
    for i in 0..active.min(MAX_CHANNELS) {
        for leaf in ["rxFreq", "txFreq"] {
            let field_id = format!("rdu2020.channel{}.{}", i, leaf);
            if let Ok(Value::U32(hz)) = cp.get(&field_id) {
                if (hz as i64) < BAND_LOWER_100HZ || (hz as i64) > BAND_UPPER_100HZ {
                    issues.push(ValidationIssue::error(
                        field_id,
                        format!(
                            "{} is outside the UHF band [{:.4}, {:.4}] MHz",
                            hz as f64 / 10_000.0,
                            BAND_LOWER_100HZ as f64 / 10_000.0,
                            BAND_UPPER_100HZ as f64 / 10_000.0
                        ),
                    ));
                }
            }
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codeplug::{Metadata, Severity};
    use crate::model::RadioModel;
    use chrono::Utc;

    #[test]
    fn default_codeplug_matches_scenario_s1() {
        let cp = Codeplug::from_defaults(RadioModel::new(Rdu2020::schema())).unwrap();
        assert_eq!(cp.as_bytes().len(), 4096);
        assert_eq!(cp.get("rdu2020.numberOfChannels").unwrap(), Value::U8(2));
        let freq = match cp.get("rdu2020.channel0.rxFreq").unwrap() {
            Value::U32(v) => v as i64,
            _ => unreachable!(),
        };
        assert!((BAND_LOWER_100HZ..=BAND_UPPER_100HZ).contains(&freq));
        assert!(!cp.has_unsaved_changes());
    }

    #[test]
    fn clearing_scramble_flag_clears_channel_codes() {
        let mut cp = Codeplug::from_defaults(RadioModel::new(Rdu2020::schema())).unwrap();
        cp.set("rdu2020.channel0.scrambleCode", Value::BitField(7)).unwrap();
        cp.set("rdu2020.scrambleEnabled", Value::Bool(false)).unwrap();
        assert_eq!(cp.get("rdu2020.channel0.scrambleCode").unwrap(), Value::BitField(0));
    }

    #[test]
    fn out_of_band_frequency_written_around_constraints_fails_validation() {
        use crate::bits::{BitWriter, Endian};

        let model = RadioModel::new(Rdu2020::schema());
        let mut raw = Codeplug::from_defaults(model.clone()).unwrap().as_bytes().to_vec();
        let field = model.fields().get("rdu2020.channel0.rxFreq").unwrap();
        // Bypasses the field's own Range constraint, simulating a raw buffer loaded from a file
        // or radio read rather than written through the validated setter.
        let mut w = BitWriter::new(&mut raw);
        w.seek_bit(field.bit_offset);
        w.write_u32(9_000_000, Endian::Big);

        let cp = Codeplug::from_raw(model, raw, Metadata::new(Utc::now())).unwrap();
        let issues = cp.validate();
        assert_eq!(issues.iter().filter(|i| i.severity == Severity::Error).count(), 1);
    }
}
