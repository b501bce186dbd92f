mod decoder;

pub use decoder::{decode_message, decode_signal, physical_value, raw_value, sign_extend, DecodedSignal};
