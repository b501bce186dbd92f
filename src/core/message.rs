use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use super::color::Color;

/// Identifies a CAN message stream: bus plus arbitration ID
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId {
    pub bus: u8,
    pub address: u32,
}

impl MessageId {
    pub fn new(bus: u8, address: u32) -> Self {
        Self { bus, address }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:X}", self.bus, self.address)
    }
}

impl FromStr for MessageId {
    type Err = anyhow::Error;

    /// Accepts `bus:ADDRESS` or a bare `ADDRESS` (bus 0); the address is hex,
    /// with or without a `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bus, address) = match s.split_once(':') {
            Some((bus, address)) => (bus.parse::<u8>()?, address),
            None => (0, s),
        };
        let address = address.trim_start_matches("0x").trim_start_matches("0X");
        let address = u32::from_str_radix(address, 16)
            .map_err(|e| anyhow::anyhow!("Invalid message address {:?}: {}", s, e))?;
        Ok(Self { bus, address })
    }
}

/// A raw CAN message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanMessage {
    /// Timestamp in UTC
    pub timestamp: DateTime<Utc>,

    /// CAN bus ID (0, 1, 2, etc.)
    pub bus: u8,

    /// CAN message ID (11-bit or 29-bit)
    pub id: u32,

    /// Raw data bytes (up to 64 for CAN FD)
    pub data: Vec<u8>,
}

impl CanMessage {
    /// Create a new CAN message
    pub fn new(bus: u8, id: u32, data: Vec<u8>) -> Self {
        Self {
            timestamp: Utc::now(),
            bus,
            id,
            data,
        }
    }

    pub fn message_id(&self) -> MessageId {
        MessageId::new(self.bus, self.id)
    }

    /// Parse hex string to data bytes
    pub fn parse_hex(hex: &str) -> anyhow::Result<Vec<u8>> {
        let hex = hex.replace(' ', "");
        let hex = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X")).unwrap_or(&hex);

        if !hex.is_ascii() {
            anyhow::bail!("Hex string must be ASCII: {:?}", hex);
        }
        if hex.len() % 2 != 0 {
            anyhow::bail!("Hex string must have even length");
        }

        hex.as_bytes()
            .chunks(2)
            .map(|pair| -> anyhow::Result<u8> { Ok(u8::from_str_radix(std::str::from_utf8(pair)?, 16)?) })
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(|e| anyhow::anyhow!("Failed to parse hex: {}", e))
    }
}

/// Color of a byte whose value went up since the previous sample
const RISING_COLOR: Color = Color::rgb(102, 255, 102);
/// Color of a byte whose value went down since the previous sample
const FALLING_COLOR: Color = Color::rgb(255, 77, 77);

/// Last received payload of a message plus its bit activity statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanData {
    /// Latest payload bytes
    pub dat: Vec<u8>,
    /// Per byte, how many times each bit toggled (index 0 = least significant bit)
    pub bit_change_counts: Vec<[u32; 8]>,
    /// Number of samples received
    pub count: u64,
    /// Per byte highlight color, fading while the byte is stable
    pub colors: Vec<Color>,
    pub last_update: Option<DateTime<Utc>>,
}

impl CanData {
    /// Fold a new sample into the statistics
    pub fn update(&mut self, msg: &CanMessage) {
        let len = msg.data.len();
        if self.bit_change_counts.len() < len {
            self.bit_change_counts.resize(len, [0; 8]);
        }
        if self.colors.len() < len {
            self.colors.resize(len, Color::default());
        }

        for (i, &byte) in msg.data.iter().enumerate() {
            let previous = if self.count > 0 { self.dat.get(i).copied() } else { None };
            match previous {
                Some(old) if old != byte => {
                    let changed = old ^ byte;
                    for bit in 0..8 {
                        if (changed >> bit) & 1 == 1 {
                            self.bit_change_counts[i][bit] += 1;
                        }
                    }
                    self.colors[i] = if byte > old { RISING_COLOR } else { FALLING_COLOR };
                }
                _ => {
                    let faded = self.colors[i].a / 2;
                    self.colors[i] = self.colors[i].with_alpha(faded);
                }
            }
        }

        self.dat = msg.data.clone();
        self.count += 1;
        self.last_update = Some(msg.timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_parse() {
        assert_eq!("1:1A0".parse::<MessageId>().unwrap(), MessageId::new(1, 0x1A0));
        assert_eq!("0x123".parse::<MessageId>().unwrap(), MessageId::new(0, 0x123));
        assert!("x:12".parse::<MessageId>().is_err());
        assert!("zz".parse::<MessageId>().is_err());
        assert_eq!(MessageId::new(2, 0x7FF).to_string(), "2:7FF");
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(CanMessage::parse_hex("0x01 ff").unwrap(), vec![0x01, 0xFF]);
        assert!(CanMessage::parse_hex("123").is_err());
        assert!(CanMessage::parse_hex("zz").is_err());
        // Multi-byte characters must not split a pair mid-character
        assert!(CanMessage::parse_hex("a\u{e9}0").is_err());
        assert!(CanMessage::parse_hex("\u{e9}").is_err());
    }

    #[test]
    fn test_bit_toggle_counts() {
        let mut data = CanData::default();
        data.update(&CanMessage::new(0, 0x10, vec![0b0000_0000]));
        data.update(&CanMessage::new(0, 0x10, vec![0b0000_0101]));
        data.update(&CanMessage::new(0, 0x10, vec![0b0000_0001]));

        assert_eq!(data.count, 3);
        assert_eq!(data.bit_change_counts[0][0], 1);
        assert_eq!(data.bit_change_counts[0][2], 2);
        assert_eq!(data.bit_change_counts[0][1], 0);
        assert_eq!(data.colors[0], FALLING_COLOR);
    }

    #[test]
    fn test_first_sample_does_not_count_as_toggle() {
        let mut data = CanData::default();
        data.update(&CanMessage::new(0, 0x10, vec![0xFF, 0xFF]));
        assert!(data.bit_change_counts.iter().all(|c| c.iter().all(|&n| n == 0)));
    }

    #[test]
    fn test_payload_growth_extends_counters() {
        let mut data = CanData::default();
        data.update(&CanMessage::new(0, 0x10, vec![0x00]));
        data.update(&CanMessage::new(0, 0x10, vec![0x00, 0x01, 0x02]));
        assert_eq!(data.bit_change_counts.len(), 3);
        assert_eq!(data.colors.len(), 3);
        assert_eq!(data.dat, vec![0x00, 0x01, 0x02]);
    }

    #[test]
    fn test_color_fades_when_stable() {
        let mut data = CanData::default();
        data.update(&CanMessage::new(0, 0x10, vec![0x01]));
        data.update(&CanMessage::new(0, 0x10, vec![0x02]));
        assert_eq!(data.colors[0], RISING_COLOR);
        data.update(&CanMessage::new(0, 0x10, vec![0x02]));
        assert_eq!(data.colors[0].a, 127);
    }
}
