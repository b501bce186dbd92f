use serde::{Deserialize, Serialize};
use std::fmt;

use super::color::Color;
use crate::layout::addressing::signal_boundaries;

/// Stable arena id of a signal within a [`DbcFile`](super::DbcFile)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalId(pub u32);

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A signal definition: a named bit-field inside a CAN message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Arena id, assigned by the owning DBC file
    pub id: SignalId,
    pub name: String,
    /// Start bit in DBC notation (lsb for Intel, msb for Motorola)
    pub start_bit: usize,
    /// Number of bits
    pub size: usize,
    pub is_little_endian: bool,
    pub is_signed: bool,
    pub factor: f64,
    pub offset: f64,
    /// Minimum physical value
    pub min: Option<f64>,
    /// Maximum physical value
    pub max: Option<f64>,
    pub unit: String,
    pub comment: String,
    pub color: Color,
    pub value_descriptions: Vec<ValueDescription>,
    pub multiplexor: Option<Multiplexor>,
}

impl Signal {
    /// Create a new unsigned signal with unit scaling
    pub fn new(name: &str, start_bit: usize, size: usize, is_little_endian: bool) -> Self {
        Self {
            id: SignalId(0),
            name: name.to_string(),
            start_bit,
            size,
            is_little_endian,
            is_signed: false,
            factor: 1.0,
            offset: 0.0,
            min: None,
            max: None,
            unit: String::new(),
            comment: String::new(),
            color: Color::default(),
            value_descriptions: Vec::new(),
            multiplexor: None,
        }
    }

    pub fn with_scaling(mut self, factor: f64, offset: f64) -> Self {
        self.factor = factor;
        self.offset = offset;
        self
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn signed(mut self) -> Self {
        self.is_signed = true;
        self
    }

    /// Least significant bit position (DBC numbering)
    pub fn lsb(&self) -> usize {
        signal_boundaries(self.start_bit, self.size, self.is_little_endian).0
    }

    /// Most significant bit position (DBC numbering)
    pub fn msb(&self) -> usize {
        signal_boundaries(self.start_bit, self.size, self.is_little_endian).1
    }

    /// Largest raw value the signal can carry
    pub fn raw_max(&self) -> u64 {
        if self.size >= 64 {
            u64::MAX
        } else {
            (1u64 << self.size) - 1
        }
    }

    /// Look up the text for a raw value, if the signal is enum-like
    pub fn describe(&self, raw: i64) -> Option<&str> {
        self.value_descriptions
            .iter()
            .find(|d| d.value == raw)
            .map(|d| d.description.as_str())
    }
}

/// Multiplexor configuration for multiplexed signals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Multiplexor {
    /// This signal is the multiplexor selector
    Selector,
    /// This signal appears when the multiplexor has this value
    Value(u32),
}

/// Value description for enum-like signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueDescription {
    pub value: i64,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_boundaries() {
        let sig = Signal::new("Speed", 4, 12, true);
        assert_eq!(sig.lsb(), 4);
        assert_eq!(sig.msb(), 15);
    }

    #[test]
    fn test_big_endian_boundaries() {
        // Motorola 16-bit signal starting at the top of byte 0
        let sig = Signal::new("Rpm", 7, 16, false);
        assert_eq!(sig.msb(), 7);
        assert_eq!(sig.lsb(), 8);

        let sig = Signal::new("Nibble", 3, 4, false);
        assert_eq!(sig.msb(), 3);
        assert_eq!(sig.lsb(), 0);
    }

    #[test]
    fn test_raw_max() {
        assert_eq!(Signal::new("A", 0, 8, true).raw_max(), 255);
        assert_eq!(Signal::new("B", 0, 64, true).raw_max(), u64::MAX);
    }

    #[test]
    fn test_describe() {
        let mut sig = Signal::new("Gear", 0, 3, true);
        sig.value_descriptions.push(ValueDescription { value: 1, description: "Drive".into() });
        assert_eq!(sig.describe(1), Some("Drive"));
        assert_eq!(sig.describe(2), None);
    }
}
