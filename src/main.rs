use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dbc_bitview::config::Settings;
use dbc_bitview::core::{CanMessage, DbcFile, DbcMessage, MessageId, SignalId};
use dbc_bitview::decode::decode_message;
use dbc_bitview::layout::{BinaryView, GridPos, HEX_COLUMN};
use dbc_bitview::store::PayloadCache;

const USAGE: &str = "usage: dbc-bitview <file.dbc> [address [hex-payload]]";

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let path = args.next().context(USAGE)?;
    let target = args
        .next()
        .map(|s| s.parse::<MessageId>())
        .transpose()
        .context("Invalid message address")?;
    let payload = args
        .next()
        .map(|s| CanMessage::parse_hex(&s))
        .transpose()
        .context("Invalid hex payload")?;

    let dbc = DbcFile::load(&path)?;
    let settings = Settings::load();
    info!("Drag direction: {:?}", settings.drag_direction);

    let mut payloads = PayloadCache::new();
    let mut view = BinaryView::new(settings.drag_direction);

    let ids: Vec<MessageId> = match target {
        Some(id) => vec![id],
        None => dbc.messages().map(|m| MessageId::new(0, m.address)).collect(),
    };

    for id in ids {
        if let Some(data) = &payload {
            payloads.push(&CanMessage::new(id.bus, id.address, data.clone()));
        }
        view.set_message(id, &dbc, &payloads);
        print_message(&view, dbc.msg(id.address), id);
        if let (Some(msg), Some(data)) = (dbc.msg(id.address), &payload) {
            print_values(msg, data);
        }
        println!();
    }

    Ok(())
}

/// Letter shown on the grid for the n-th signal of a message
fn signal_letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

fn print_message(view: &BinaryView, msg: Option<&DbcMessage>, id: MessageId) {
    let layout = view.layout();
    match msg {
        Some(msg) => println!(
            "{} ({}) {} bytes, {} signals",
            msg.name,
            id,
            msg.size,
            msg.signals().len()
        ),
        None => println!("{} (undefined) {} bytes", id, layout.row_count()),
    }

    let signals = msg.map(|m| m.signals()).unwrap_or_default();
    let letter_of = |sig: SignalId| signals.iter().position(|s| s.id == sig).map(signal_letter);

    for row in 0..layout.row_count() {
        let mut bits = String::new();
        let mut owners = String::new();
        for col in 0..8 {
            let Some(cell) = layout.cell(GridPos::new(row, col)) else {
                continue;
            };
            bits.push_str(match cell.val.as_str() {
                "" => " -",
                "1" => " 1",
                _ => " 0",
            });
            owners.push(' ');
            owners.push(cell.topmost().and_then(letter_of).unwrap_or('.'));
        }
        let hex = layout
            .cell(GridPos::new(row, HEX_COLUMN))
            .map(|c| c.val.as_str())
            .unwrap_or("");
        println!("  {:>2} |{} | {:<2} |{}", row, bits, hex, owners);
    }

    for (i, sig) in signals.iter().enumerate() {
        println!(
            "  {} {} start {} size {} {} lsb {} msb {}",
            signal_letter(i),
            sig.name,
            sig.start_bit,
            sig.size,
            if sig.is_little_endian { "LE" } else { "BE" },
            sig.lsb(),
            sig.msb()
        );
    }

    let overlapping = view.overlapping_signals();
    if !overlapping.is_empty() {
        let names: Vec<&str> = signals
            .iter()
            .filter(|s| overlapping.contains(&s.id))
            .map(|s| s.name.as_str())
            .collect();
        println!("  overlapping: {}", names.join(", "));
    }
    for (sig, err) in layout.out_of_bounds() {
        let name = signals.iter().find(|s| s.id == *sig).map_or("?", |s| s.name.as_str());
        println!("  not shown: {} ({})", name, err);
    }
}

fn print_values(msg: &DbcMessage, data: &[u8]) {
    for value in decode_message(msg, data) {
        match value.description {
            Some(text) => println!("  {} = {} ({})", value.name, value.physical_value, text),
            None => println!("  {} = {} {}", value.name, value.physical_value, value.unit),
        }
    }
}
