use crate::core::{DbcMessage, Signal};

/// A decoded signal value from a CAN payload
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSignal {
    pub name: String,
    /// Raw value (before sign extension and factor/offset)
    pub raw_value: u64,
    /// Physical value after factor/offset
    pub physical_value: f64,
    pub unit: String,
    /// Value description text, if the raw value has one
    pub description: Option<String>,
}

/// Decode every signal of `msg` that fits in `data`
pub fn decode_message(msg: &DbcMessage, data: &[u8]) -> Vec<DecodedSignal> {
    msg.signals()
        .iter()
        .filter_map(|signal| decode_signal(signal, data))
        .collect()
}

pub fn decode_signal(signal: &Signal, data: &[u8]) -> Option<DecodedSignal> {
    let raw_value = raw_value(signal, data)?;
    let signed = signal_integer(signal, raw_value);
    Some(DecodedSignal {
        name: signal.name.clone(),
        raw_value,
        physical_value: signed as f64 * signal.factor + signal.offset,
        unit: signal.unit.clone(),
        description: signal.describe(signed).map(str::to_string),
    })
}

/// Extract the raw bits of a signal, walking from the msb byte to the lsb
/// byte. Bit `n` of the payload is bit `n % 8` of byte `n / 8`.
///
/// Returns None for an empty or wider-than-64-bit signal, or when the
/// payload is too short to hold it.
pub fn raw_value(signal: &Signal, data: &[u8]) -> Option<u64> {
    if signal.size == 0 || signal.size > 64 {
        return None;
    }
    let (lsb, msb) = (signal.lsb(), signal.msb());

    let mut result: u64 = 0;
    let mut bits_remaining = signal.size;
    let mut byte = msb / 8;
    while bits_remaining > 0 {
        let value = *data.get(byte)?;
        let low = if lsb / 8 == byte { lsb } else { byte * 8 };
        let high = if msb / 8 == byte { msb } else { byte * 8 + 7 };
        let bits = high - low + 1;

        // Use u32 for the mask calculation to avoid overflow when bits is 8
        let chunk = (value >> (low - byte * 8)) as u32 & ((1u32 << bits) - 1);
        result |= (chunk as u64) << (bits_remaining - bits);
        bits_remaining -= bits;

        if signal.is_little_endian {
            if byte == 0 {
                break;
            }
            byte -= 1;
        } else {
            byte += 1;
        }
    }

    (bits_remaining == 0).then_some(result)
}

/// Sign extend a value of `size` bits to 64 bits
pub fn sign_extend(value: u64, size: usize) -> i64 {
    if size == 0 || size >= 64 {
        return value as i64;
    }

    let sign_bit = 1u64 << (size - 1);
    if value & sign_bit != 0 {
        (value | !((1u64 << size) - 1)) as i64
    } else {
        value as i64
    }
}

/// Physical value of a raw value: sign extension, then factor and offset
pub fn physical_value(signal: &Signal, raw: u64) -> f64 {
    signal_integer(signal, raw) as f64 * signal.factor + signal.offset
}

fn signal_integer(signal: &Signal, raw: u64) -> i64 {
    if signal.is_signed {
        sign_extend(raw, signal.size)
    } else {
        raw as i64
    }
}
