//! Field rendering and fault-cause decoding for blackbox records.

use std::collections::BTreeMap;

use crate::platform_spec::DpmPlatformSpec;
use crate::record::{FaultRecord, NUM_VH_RAILS, NUM_VP_RAILS};

/// The DPM exposes 9 general-purpose I/O channels on bits 0..=8.
const NUM_GPIO_CHANNELS: u32 = 9;
/// And 16 programmable digital I/O channels on bits 0..=15.
const NUM_PDIO_CHANNELS: u32 = 16;

/// Which I/O bank a bitfield belongs to. Channel numbering is 1-based on the
/// device pinout, so bit 0 is GPIO1/PDIO1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelBank {
    Gpio,
    Pdio,
}

/// A fully decoded blackbox record, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlackboxRecord {
    pub uid: u16,
    pub dpm_name: String,
    /// Decoded DPM fault description, or `"Unknown"` when the fault code has
    /// no table entry.
    pub cause: String,
    pub debug_msg: String,
    /// Rendered field values keyed by field or rail name.
    pub fields: BTreeMap<String, String>,
}

/// Renders a power-on-relative timestamp.
pub fn time_since(seconds: u64) -> String {
    format!("{seconds} seconds after power-on")
}

/// Names the set bits of a GPIO/PDIO bitfield.
///
/// Bits beyond the bank's channel count have no name; they are rendered
/// together as a binary literal so nothing is silently dropped.
pub fn channel_names(bank: ChannelBank, bits: u16) -> String {
    let (prefix, channels) = match bank {
        ChannelBank::Gpio => ("GPIO", NUM_GPIO_CHANNELS),
        ChannelBank::Pdio => ("PDIO", NUM_PDIO_CHANNELS),
    };
    let mut names = Vec::new();
    let mut residue = bits;
    for bit in 0..channels.min(16) {
        if bits & (1u16 << bit) != 0 {
            names.push(format!("{prefix}{}", bit + 1));
            residue &= !(1u16 << bit);
        }
    }
    if residue != 0 {
        names.push(format!("0b{residue:b}"));
    }
    if names.is_empty() {
        "0b0".to_string()
    } else {
        names.join(" ")
    }
}

/// Decodes the composite fault code the PDIO inputs encode.
///
/// Each PDIO channel listed in `dpm_signals` contributes one bit of a compact
/// fault index: for every set channel, `1 << dpm_signals[channel]` is OR-ed
/// into the code, which is then looked up in `dpm_table`. Returns `None` when
/// the table has no (or an empty) entry for the code.
pub fn decode_dpm_fault(
    dpm_table: &BTreeMap<u32, String>,
    dpm_signals: &BTreeMap<u32, u32>,
    pdio_input: u16,
) -> Option<String> {
    let mut code = 0u32;
    for (&channel, &code_bit) in dpm_signals {
        if channel == 0 || channel > NUM_PDIO_CHANNELS {
            continue;
        }
        if pdio_input & (1u16 << (channel - 1)) != 0 {
            code |= 1u32 << code_bit;
        }
    }
    dpm_table
        .get(&code)
        .filter(|description| !description.is_empty())
        .cloned()
}

/// The rail descriptions of every rail whose status byte is non-zero.
pub fn faulted_rails(record: &FaultRecord, spec: &DpmPlatformSpec) -> Vec<String> {
    let mut rails = Vec::new();
    for (index, &status) in record.vp.iter().enumerate() {
        if status != 0 {
            rails.push(spec.vp_desc(index as u32));
        }
    }
    for (index, &status) in record.vh.iter().enumerate() {
        if status != 0 {
            rails.push(spec.vh_desc(index as u32));
        }
    }
    rails
}

/// Renders a raw record against the platform's mapping tables.
pub fn render_record(record: &FaultRecord, spec: &DpmPlatformSpec) -> BlackboxRecord {
    let mut fields = BTreeMap::new();
    fields.insert("timestamp".to_string(), time_since(record.timestamp));
    fields.insert("state".to_string(), record.state.to_string());
    fields.insert(
        "dpm_status_flags".to_string(),
        format!("0x{:02x}", record.dpm_status_flags),
    );
    fields.insert(
        "gpio_in".to_string(),
        channel_names(ChannelBank::Gpio, record.gpio_in),
    );
    fields.insert(
        "gpio_out".to_string(),
        channel_names(ChannelBank::Gpio, record.gpio_out),
    );
    fields.insert(
        "pdio_in".to_string(),
        channel_names(ChannelBank::Pdio, record.pdio_in),
    );
    fields.insert(
        "pdio_out".to_string(),
        channel_names(ChannelBank::Pdio, record.pdio_out),
    );
    for index in 0..NUM_VP_RAILS {
        fields.insert(
            spec.vp_desc(index as u32),
            format!("0x{:02x}", record.vp[index]),
        );
    }
    for index in 0..NUM_VH_RAILS {
        fields.insert(
            spec.vh_desc(index as u32),
            format!("0x{:02x}", record.vh[index]),
        );
    }

    let cause = decode_dpm_fault(&spec.dpm_table, &spec.dpm_signals, record.pdio_in)
        .unwrap_or_else(|| "Unknown".to_string());

    let rails = faulted_rails(record, spec);
    let mut debug_msg = format!("DPM fault: {cause}");
    if !rails.is_empty() {
        debug_msg.push_str(&format!(" (faulted rails: {})", rails.join(", ")));
    }

    BlackboxRecord {
        uid: record.uid,
        dpm_name: spec.name.clone(),
        cause,
        debug_msg,
        fields,
    }
}
