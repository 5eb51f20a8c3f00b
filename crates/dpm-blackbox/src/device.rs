//! The NVMEM-backed DPM device handle.

use std::fs;

use anyhow::{Context, Result};
use tracing::info;

use crate::decode::{render_record, BlackboxRecord};
use crate::platform_spec::DpmPlatformSpec;
use crate::record::{parse_blackbox, NO_RECORDS_SENTINEL};
use crate::resolver;

/// One DPM device, addressed through its NVMEM path.
///
/// Reads are single-shot: every query re-reads the device, which always
/// presents the latest fault history. Concurrent queries are the caller's
/// responsibility to serialise.
#[derive(Debug, Clone)]
pub struct DpmDevice {
    spec: DpmPlatformSpec,
}

impl DpmDevice {
    pub fn new(spec: DpmPlatformSpec) -> Self {
        Self { spec }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &DpmPlatformSpec {
        &self.spec
    }

    /// Reads the raw blackbox bytes from the NVMEM device.
    pub fn read_blackbox(&self) -> Result<Vec<u8>> {
        fs::read(&self.spec.nvmem_path)
            .with_context(|| format!("reading blackbox from {}", self.spec.nvmem_path))
    }

    /// Reads and decodes every fault record in the blackbox.
    pub fn blackbox_records(&self) -> Result<Vec<BlackboxRecord>> {
        let blob = self.read_blackbox()?;
        let records = parse_blackbox(&blob)
            .with_context(|| format!("parsing blackbox of '{}'", self.spec.name))?;
        Ok(records
            .iter()
            .map(|record| render_record(record, &self.spec))
            .collect())
    }

    /// Resolves the reboot cause from the current blackbox contents.
    ///
    /// Returns `(reboot_cause, debug_msg)`; a cleared blackbox yields the
    /// no-fault sentinel rather than an error.
    pub fn reboot_cause(&self) -> Result<(String, String)> {
        let blob = self.read_blackbox()?;
        let records = parse_blackbox(&blob)
            .with_context(|| format!("parsing blackbox of '{}'", self.spec.name))?;
        Ok(resolver::resolve(&records, &self.spec))
    }

    /// Clears the fault history.
    ///
    /// The device treats a write of the literal `"1"` as the clear command;
    /// subsequent reads return that sentinel until a new fault is trapped.
    pub fn clear_blackbox(&self) -> Result<()> {
        fs::write(&self.spec.nvmem_path, NO_RECORDS_SENTINEL)
            .with_context(|| format!("clearing blackbox at {}", self.spec.nvmem_path))?;
        info!("cleared blackbox of '{}'", self.spec.name);
        Ok(())
    }
}
