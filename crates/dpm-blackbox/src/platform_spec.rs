//! Platform-specific configuration for one DPM device.
//!
//! The board vendor ships these tables as plugin JSON: which board rail each
//! VP/VH input samples, how the PDIO fault bits compress into the fault-table
//! index, and which PDIO input maps to which canonical reboot cause. All maps
//! are immutable once the spec is built.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::BlackboxError;

/// The reboot-cause entry one PDIO input maps to.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FaultCauseEntry {
    /// A canonical reboot-cause string, e.g. `REBOOT_CAUSE_POWER_LOSS`.
    pub reboot_cause: String,
    /// Human-readable description of the fault for the debug message.
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct RawDpmInfo {
    nvmem_path: String,
    vpx_to_rail_desc: BTreeMap<String, String>,
    vhx_to_rail_desc: BTreeMap<String, String>,
    dpm_signals: BTreeMap<String, u32>,
    dpm_table: BTreeMap<String, String>,
    pdio_input_to_fault_cause: BTreeMap<String, FaultCauseEntry>,
}

/// Platform-specific mapping tables for one DPM device.
#[derive(Debug, Clone)]
pub struct DpmPlatformSpec {
    pub name: String,
    /// Path of the NVMEM device exposing the blackbox bytes.
    pub nvmem_path: String,
    /// VP input index to board rail description.
    pub vpx_to_rail_desc: BTreeMap<u32, String>,
    /// VH input index to board rail description.
    pub vhx_to_rail_desc: BTreeMap<u32, String>,
    /// PDIO channel number (1-based) to fault-code bit position.
    pub dpm_signals: BTreeMap<u32, u32>,
    /// Composite fault code to description.
    pub dpm_table: BTreeMap<u32, String>,
    /// PDIO channel number (1-based) to reboot-cause mapping.
    pub pdio_input_to_fault_cause: BTreeMap<u32, FaultCauseEntry>,
}

impl DpmPlatformSpec {
    /// Builds the spec for device `name` from the platform plugin data
    /// (`plugin_data["DPM"][name]`).
    ///
    /// The plugin JSON carries integer keys in stringified form; they are
    /// parsed back here and a non-integer key is fatal.
    pub fn from_plugin_data(
        name: &str,
        plugin_data: &serde_json::Value,
    ) -> Result<Self, BlackboxError> {
        let info = plugin_data
            .get("DPM")
            .and_then(|dpms| dpms.get(name))
            .ok_or_else(|| BlackboxError::PlatformSpec {
                device: name.to_string(),
                reason: "no DPM entry in plugin data".to_string(),
            })?;
        let raw: RawDpmInfo =
            serde_json::from_value(info.clone()).map_err(|e| BlackboxError::PlatformSpec {
                device: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name: name.to_string(),
            nvmem_path: raw.nvmem_path,
            vpx_to_rail_desc: parse_int_keys(name, raw.vpx_to_rail_desc)?,
            vhx_to_rail_desc: parse_int_keys(name, raw.vhx_to_rail_desc)?,
            dpm_signals: parse_int_keys(name, raw.dpm_signals)?,
            dpm_table: parse_int_keys(name, raw.dpm_table)?,
            pdio_input_to_fault_cause: parse_int_keys(name, raw.pdio_input_to_fault_cause)?,
        })
    }

    /// Description of VP rail `index`, falling back to `VP{index}`.
    pub fn vp_desc(&self, index: u32) -> String {
        self.vpx_to_rail_desc
            .get(&index)
            .cloned()
            .unwrap_or_else(|| format!("VP{index}"))
    }

    /// Description of VH rail `index`, falling back to `VH{index}`.
    pub fn vh_desc(&self, index: u32) -> String {
        self.vhx_to_rail_desc
            .get(&index)
            .cloned()
            .unwrap_or_else(|| format!("VH{index}"))
    }
}

fn parse_int_keys<V>(
    device: &str,
    raw: BTreeMap<String, V>,
) -> Result<BTreeMap<u32, V>, BlackboxError> {
    raw.into_iter()
        .map(|(key, value)| {
            let parsed = key.parse::<u32>().map_err(|_| BlackboxError::PlatformSpec {
                device: device.to_string(),
                reason: format!("non-integer map key '{key}'"),
            })?;
            Ok((parsed, value))
        })
        .collect()
}
