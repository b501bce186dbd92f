use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::color::{signal_color, Color};
use super::message::MessageId;
use super::signal::{Multiplexor, Signal, SignalId, ValueDescription};

/// Suffix appended to the file name for auto-save snapshots
pub const AUTO_SAVE_EXTENSION: &str = ".tmp";

/// Placeholder node name used when no transmitter/receiver is known
const DEFAULT_NODE: &str = "XXX";

/// Bits in the largest (CAN FD, 64-byte) payload
const MAX_PAYLOAD_BITS: usize = 64 * 8;

const NEW_SYMBOLS: [&str; 8] = [
    "NS_DESC_", "CM_", "BA_DEF_", "BA_", "VAL_", "BA_DEF_DEF_", "SIG_VALTYPE_", "BO_TX_BU_",
];

/// Errors found while parsing DBC text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbcError {
    #[error("line {line}: invalid message definition: {text}")]
    InvalidMessage { line: usize, text: String },

    #[error("line {line}: invalid signal definition: {text}")]
    InvalidSignal { line: usize, text: String },

    #[error("line {line}: signal defined before any message")]
    OrphanSignal { line: usize },

    #[error("line {line}: duplicate message address {address:#X}")]
    DuplicateMessage { line: usize, address: u32 },
}

/// An editable DBC database
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbcFile {
    /// Version string
    pub version: String,
    /// File path (if loaded from or saved to a file)
    #[serde(skip)]
    pub filename: Option<PathBuf>,
    name: String,
    /// Messages keyed by address
    messages: BTreeMap<u32, DbcMessage>,
    next_signal_id: u32,
    /// Bumped on every definition change
    generation: u64,
}

impl DbcFile {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Create a database from DBC text
    pub fn from_content(name: &str, content: &str) -> Result<Self, DbcError> {
        let mut dbc = Self::new(name);
        dbc.open(content)?;
        Ok(dbc)
    }

    /// Load a DBC file from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read DBC file: {:?}", path))?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut dbc = Self::from_content(&name, &content)
            .with_context(|| format!("Failed to parse DBC file: {:?}", path))?;
        dbc.filename = Some(path.to_path_buf());
        info!("Loaded {} messages, {} signals from {:?}", dbc.msg_count(), dbc.signal_count(), path);
        Ok(dbc)
    }

    /// Replace all definitions with the ones parsed from `content`.
    /// On error the current definitions are left untouched.
    pub fn open(&mut self, content: &str) -> Result<(), DbcError> {
        let mut next_signal_id = self.next_signal_id;
        let (version, messages) = parse_content(content, &mut next_signal_id)?;
        self.version = version;
        self.messages = messages;
        self.next_signal_id = next_signal_id;
        self.generation += 1;
        Ok(())
    }

    /// Save to the current file name
    pub fn save(&mut self) -> Result<()> {
        let path = self
            .filename
            .clone()
            .context("DBC file has no file name, use save_as")?;
        self.write_contents(&path)?;
        self.cleanup_auto_save_file();
        info!("Saved DBC file {:?}", path);
        Ok(())
    }

    /// Save under a new file name, which becomes the current one
    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.cleanup_auto_save_file();
        self.filename = Some(path.to_path_buf());
        if let Some(stem) = path.file_stem() {
            self.name = stem.to_string_lossy().to_string();
        }
        self.save()
    }

    /// Write a snapshot next to the current file. Returns false when the
    /// database has never been saved.
    pub fn auto_save(&self) -> Result<bool> {
        match self.auto_save_path() {
            Some(path) => {
                self.write_contents(&path)?;
                debug!("Auto-saved DBC to {:?}", path);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn auto_save_path(&self) -> Option<PathBuf> {
        self.filename.as_ref().map(|f| {
            let mut s: OsString = f.clone().into_os_string();
            s.push(AUTO_SAVE_EXTENSION);
            PathBuf::from(s)
        })
    }

    pub fn cleanup_auto_save_file(&self) {
        if let Some(path) = self.auto_save_path() {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!("Failed to remove auto-save file {:?}: {}", path, e);
                }
            }
        }
    }

    pub fn write_contents<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.generate_dbc())
            .with_context(|| format!("Failed to write DBC file: {:?}", path))
    }

    /// Convert to DBC file format string
    pub fn generate_dbc(&self) -> String {
        let mut output = String::new();
        let mut comments = String::new();
        let mut value_descriptions = String::new();

        output.push_str(&format!("VERSION \"{}\"\n\n", self.version));
        output.push_str("NS_ :\n");
        for symbol in NEW_SYMBOLS {
            output.push_str(&format!("\t{}\n", symbol));
        }
        output.push_str("\nBS_:\n\n");
        output.push_str(&format!("BU_: {}\n\n", DEFAULT_NODE));

        for msg in self.messages.values() {
            let transmitter = if msg.transmitter.is_empty() { DEFAULT_NODE } else { &msg.transmitter };
            output.push_str(&format!(
                "BO_ {} {}: {} {}\n",
                msg.address, msg.name, msg.size, transmitter
            ));
            if !msg.comment.is_empty() {
                comments.push_str(&format!(
                    "CM_ BO_ {} \"{}\";\n",
                    msg.address,
                    escape(&msg.comment)
                ));
            }

            for sig in &msg.signals {
                let multiplexor = match sig.multiplexor {
                    Some(Multiplexor::Selector) => " M".to_string(),
                    Some(Multiplexor::Value(v)) => format!(" m{}", v),
                    None => String::new(),
                };
                output.push_str(&format!(
                    " SG_ {}{} : {}|{}@{}{} ({},{}) [{}|{}] \"{}\" {}\n",
                    sig.name,
                    multiplexor,
                    sig.start_bit,
                    sig.size,
                    if sig.is_little_endian { '1' } else { '0' },
                    if sig.is_signed { '-' } else { '+' },
                    sig.factor,
                    sig.offset,
                    sig.min.unwrap_or(0.0),
                    sig.max.unwrap_or(0.0),
                    sig.unit,
                    DEFAULT_NODE
                ));
                if !sig.comment.is_empty() {
                    comments.push_str(&format!(
                        "CM_ SG_ {} {} \"{}\";\n",
                        msg.address,
                        sig.name,
                        escape(&sig.comment)
                    ));
                }
                if !sig.value_descriptions.is_empty() {
                    value_descriptions.push_str(&format!("VAL_ {} {}", msg.address, sig.name));
                    for val in &sig.value_descriptions {
                        value_descriptions.push_str(&format!(" {} \"{}\"", val.value, val.description));
                    }
                    value_descriptions.push_str(";\n");
                }
            }
            output.push('\n');
        }

        output.push_str(&comments);
        if !value_descriptions.is_empty() {
            output.push('\n');
            output.push_str(&value_descriptions);
        }
        output
    }

    /// Create or update a message definition
    pub fn update_msg(&mut self, id: &MessageId, name: &str, size: usize, comment: &str) {
        let msg = self
            .messages
            .entry(id.address)
            .or_insert_with(|| DbcMessage::new(id.address, name, size));
        msg.name = name.to_string();
        msg.size = size;
        msg.comment = comment.to_string();
        self.generation += 1;
    }

    pub fn remove_msg(&mut self, id: &MessageId) -> Option<DbcMessage> {
        let removed = self.messages.remove(&id.address);
        if removed.is_some() {
            self.generation += 1;
        }
        removed
    }

    pub fn messages(&self) -> impl Iterator<Item = &DbcMessage> {
        self.messages.values()
    }

    pub fn msg(&self, address: u32) -> Option<&DbcMessage> {
        self.messages.get(&address)
    }

    pub fn msg_by_name(&self, name: &str) -> Option<&DbcMessage> {
        self.messages.values().find(|m| m.name == name)
    }

    /// Append a signal to a message, assigning it a fresh id (and a palette
    /// color when none is set). Returns None if the message does not exist.
    pub fn add_signal(&mut self, address: u32, mut signal: Signal) -> Option<SignalId> {
        let msg = self.messages.get_mut(&address)?;
        let id = SignalId(self.next_signal_id);
        self.next_signal_id += 1;
        signal.id = id;
        if signal.color == Color::default() {
            signal.color = signal_color(id);
        }
        msg.signals.push(signal);
        self.generation += 1;
        Some(id)
    }

    /// Replace the signal carrying `signal.id`, keeping its position
    pub fn update_signal(&mut self, address: u32, signal: Signal) -> bool {
        let Some(slot) = self
            .messages
            .get_mut(&address)
            .and_then(|m| m.signals.iter_mut().find(|s| s.id == signal.id))
        else {
            return false;
        };
        *slot = signal;
        self.generation += 1;
        true
    }

    pub fn remove_signal(&mut self, address: u32, id: SignalId) -> Option<Signal> {
        let msg = self.messages.get_mut(&address)?;
        let pos = msg.signals.iter().position(|s| s.id == id)?;
        self.generation += 1;
        Some(msg.signals.remove(pos))
    }

    pub fn signal_count(&self) -> usize {
        self.messages.values().map(|m| m.signals.len()).sum()
    }

    pub fn msg_count(&self) -> usize {
        self.messages.len()
    }

    pub fn name(&self) -> &str {
        if self.name.is_empty() { "untitled" } else { &self.name }
    }

    pub fn is_empty(&self) -> bool {
        self.signal_count() == 0 && self.name.is_empty()
    }

    /// Change counter for definition edits; observers rebuild when it moves
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A CAN message defined in the DBC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbcMessage {
    pub address: u32,
    pub name: String,
    /// Payload size in bytes
    pub size: usize,
    pub transmitter: String,
    pub comment: String,
    signals: Vec<Signal>,
}

impl DbcMessage {
    pub fn new(address: u32, name: &str, size: usize) -> Self {
        Self {
            address,
            name: name.to_string(),
            size,
            transmitter: String::new(),
            comment: String::new(),
            signals: Vec::new(),
        }
    }

    /// Signals in insertion order
    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn signal(&self, id: SignalId) -> Option<&Signal> {
        self.signals.iter().find(|s| s.id == id)
    }

    pub fn signal_by_name(&self, name: &str) -> Option<&Signal> {
        self.signals.iter().find(|s| s.name == name)
    }
}

fn parse_content(
    content: &str,
    next_signal_id: &mut u32,
) -> Result<(String, BTreeMap<u32, DbcMessage>), DbcError> {
    let mut version = String::new();
    let mut messages: BTreeMap<u32, DbcMessage> = BTreeMap::new();
    let mut current: Option<u32> = None;
    // CM_ statements may span several lines
    let mut pending_comment: Option<String> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();

        if let Some(mut buf) = pending_comment.take() {
            buf.push('\n');
            buf.push_str(raw);
            if statement_complete(&buf) {
                apply_comment(&buf, &mut messages);
            } else {
                pending_comment = Some(buf);
            }
            continue;
        }

        if line.starts_with("VERSION") {
            version = line
                .strip_prefix("VERSION")
                .unwrap_or("")
                .trim()
                .trim_matches('"')
                .to_string();
        } else if line.starts_with("BO_ ") {
            let msg = parse_message_line(line).ok_or_else(|| DbcError::InvalidMessage {
                line: line_no,
                text: line.to_string(),
            })?;
            if messages.contains_key(&msg.address) {
                return Err(DbcError::DuplicateMessage { line: line_no, address: msg.address });
            }
            current = Some(msg.address);
            messages.insert(msg.address, msg);
        } else if line.starts_with("SG_ ") {
            let msg = current
                .and_then(|address| messages.get_mut(&address))
                .ok_or(DbcError::OrphanSignal { line: line_no })?;
            let mut signal = parse_signal_line(line).ok_or_else(|| DbcError::InvalidSignal {
                line: line_no,
                text: line.to_string(),
            })?;
            signal.id = SignalId(*next_signal_id);
            signal.color = signal_color(signal.id);
            *next_signal_id += 1;
            msg.signals.push(signal);
        } else if line.starts_with("CM_ ") {
            if statement_complete(line) {
                apply_comment(line, &mut messages);
            } else {
                pending_comment = Some(line.to_string());
            }
        } else if line.starts_with("VAL_ ") {
            if let Some((address, name, values)) = parse_val_line(line) {
                if let Some(sig) = messages
                    .get_mut(&address)
                    .and_then(|m| m.signals.iter_mut().find(|s| s.name == name))
                {
                    sig.value_descriptions = values;
                }
            }
        }
    }

    Ok((version, messages))
}

/// Parse a message line from DBC format
/// Format: BO_ <id> <name>: <dlc> <transmitter>
fn parse_message_line(line: &str) -> Option<DbcMessage> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 || parts[0] != "BO_" || !parts[2].ends_with(':') {
        return None;
    }

    let address = parts[1].parse::<u32>().ok()?;
    let name = parts[2].trim_end_matches(':');
    if name.is_empty() {
        return None;
    }
    let size = parts[3].parse::<usize>().ok()?;

    let mut msg = DbcMessage::new(address, name, size);
    if let Some(transmitter) = parts.get(4) {
        if *transmitter != DEFAULT_NODE && *transmitter != "Vector__XXX" {
            msg.transmitter = transmitter.to_string();
        }
    }
    Some(msg)
}

/// Parse a signal line from DBC format
/// Format: SG_ <name> [M|m<val>] : <start_bit>|<size>@<byte_order><value_type> (<factor>,<offset>) [<min>|<max>] "<unit>" <receiver>
fn parse_signal_line(line: &str) -> Option<Signal> {
    let line = line.strip_prefix("SG_ ")?;

    let colon_pos = line.find(':')?;
    let mut name_part = line[..colon_pos].split_whitespace();
    let rest = line[colon_pos + 1..].trim_start();

    let name = name_part.next()?;
    let multiplexor = match name_part.next() {
        None => None,
        Some("M") => Some(Multiplexor::Selector),
        Some(m) => Some(Multiplexor::Value(m.strip_prefix('m')?.trim_end_matches('M').parse().ok()?)),
    };

    let parts: Vec<&str> = rest.split_whitespace().collect();
    let bit_info = parts.first()?;

    let at_pos = bit_info.find('@')?;
    let (start_bit, size) = bit_info[..at_pos].split_once('|')?;
    let start_bit = start_bit.parse::<usize>().ok().filter(|&b| b < MAX_PAYLOAD_BITS)?;
    let size = size.parse::<usize>().ok().filter(|s| (1..=64).contains(s))?;
    let (is_little_endian, is_signed) = parse_order_and_type(&bit_info[at_pos..])?;

    let mut signal = Signal::new(name, start_bit, size, is_little_endian);
    signal.is_signed = is_signed;
    signal.multiplexor = multiplexor;

    if let Some(fo) = parts.iter().find(|p| p.starts_with('(')) {
        let (factor, offset) = fo.trim_matches(|c| c == '(' || c == ')').split_once(',')?;
        signal.factor = factor.parse().ok()?;
        signal.offset = offset.parse().ok()?;
    }

    if let Some(range) = parts.iter().find(|p| p.starts_with('[')) {
        let (min, max) = parse_min_max(range);
        // [0|0] is what gets written for an unset range
        if min != Some(0.0) || max != Some(0.0) {
            signal.min = min;
            signal.max = max;
        }
    }

    if let Some(start) = rest.find('"') {
        let after = &rest[start + 1..];
        let end = after.find('"')?;
        signal.unit = after[..end].to_string();
    }

    Some(signal)
}

/// Parse byte order and value type from format like "@1+"
fn parse_order_and_type(s: &str) -> Option<(bool, bool)> {
    let mut chars = s.strip_prefix('@')?.chars();

    let is_little_endian = match chars.next()? {
        '0' => false,
        '1' => true,
        _ => return None,
    };

    let is_signed = match chars.next()? {
        '+' => false,
        '-' => true,
        _ => return None,
    };

    Some((is_little_endian, is_signed))
}

/// Parse min and max from format like "[0|255]"
fn parse_min_max(s: &str) -> (Option<f64>, Option<f64>) {
    let s = s.trim_matches(|c| c == '[' || c == ']');
    match s.split_once('|') {
        Some((min, max)) => (min.parse::<f64>().ok(), max.parse::<f64>().ok()),
        None => (None, None),
    }
}

/// Parse a VAL line (value descriptions/enums)
/// Format: VAL_ <id> <signal_name> <value1> "<description1>" <value2> "<description2>" ;
fn parse_val_line(line: &str) -> Option<(u32, String, Vec<ValueDescription>)> {
    let line = line.strip_prefix("VAL_ ")?;
    let parts: Vec<&str> = line.split('"').collect();

    let header: Vec<&str> = parts.first()?.split_whitespace().collect();
    if header.len() < 3 {
        return None;
    }
    let address = header[0].parse::<u32>().ok()?;
    let signal_name = header[1].to_string();

    // Even parts hold the numbers, odd parts the descriptions
    let mut values = Vec::new();
    let mut i = 0;
    while i + 1 < parts.len() {
        let value = parts[i]
            .split_whitespace()
            .last()
            .and_then(|s| s.parse::<i64>().ok());
        if let Some(value) = value {
            values.push(ValueDescription { value, description: parts[i + 1].to_string() });
        }
        i += 2;
    }

    if values.is_empty() {
        return None;
    }
    Some((address, signal_name, values))
}

/// Apply `CM_ BO_ <id> "<text>";` or `CM_ SG_ <id> <signal> "<text>";`
fn apply_comment(statement: &str, messages: &mut BTreeMap<u32, DbcMessage>) {
    let (Some(open), Some(close)) = (statement.find('"'), statement.rfind('"')) else {
        return;
    };
    if close <= open {
        return;
    }
    let text = unescape(&statement[open + 1..close]);
    let header: Vec<&str> = statement[..open].split_whitespace().collect();

    match header.as_slice() {
        ["CM_", "BO_", address] => {
            if let Some(msg) = address.parse::<u32>().ok().and_then(|a| messages.get_mut(&a)) {
                msg.comment = text;
            }
        }
        ["CM_", "SG_", address, name] => {
            if let Some(sig) = address
                .parse::<u32>()
                .ok()
                .and_then(|a| messages.get_mut(&a))
                .and_then(|m| m.signals.iter_mut().find(|s| s.name == *name))
            {
                sig.comment = text;
            }
        }
        _ => {}
    }
}

/// A statement is complete once it ends in `;` outside of a quoted string
fn statement_complete(s: &str) -> bool {
    let quotes = s.matches('"').count() - s.matches("\\\"").count();
    quotes % 2 == 0 && s.trim_end().ends_with(';')
}

fn escape(s: &str) -> String {
    s.replace('"', "\\\"")
}

fn unescape(s: &str) -> String {
    s.replace("\\\"", "\"")
}
