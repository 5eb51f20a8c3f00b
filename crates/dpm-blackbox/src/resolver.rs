//! Reboot-cause resolution from parsed blackbox records.

use tracing::debug;

use crate::decode::render_record;
use crate::platform_spec::DpmPlatformSpec;
use crate::record::FaultRecord;

pub const REBOOT_CAUSE_POWER_LOSS: &str = "REBOOT_CAUSE_POWER_LOSS";
pub const REBOOT_CAUSE_WATCHDOG: &str = "REBOOT_CAUSE_WATCHDOG";
pub const REBOOT_CAUSE_THERMAL_OVERLOAD_ASIC: &str = "REBOOT_CAUSE_THERMAL_OVERLOAD_ASIC";
pub const REBOOT_CAUSE_THERMAL_OVERLOAD_CPU: &str = "REBOOT_CAUSE_THERMAL_OVERLOAD_CPU";
pub const REBOOT_CAUSE_THERMAL_OVERLOAD_OTHER: &str = "REBOOT_CAUSE_THERMAL_OVERLOAD_OTHER";
pub const REBOOT_CAUSE_HARDWARE_OTHER: &str = "REBOOT_CAUSE_HARDWARE_OTHER";
pub const REBOOT_CAUSE_NON_HARDWARE: &str = "REBOOT_CAUSE_NON_HARDWARE";

/// Debug message returned when the blackbox holds no records.
pub const NO_FAULT_RECORDED: &str = "No fault recorded in DPM blackbox";

/// Specific causes outrank the generic hardware bucket.
const CAUSE_PRIORITY: &[&str] = &[
    REBOOT_CAUSE_POWER_LOSS,
    REBOOT_CAUSE_WATCHDOG,
    REBOOT_CAUSE_THERMAL_OVERLOAD_ASIC,
    REBOOT_CAUSE_THERMAL_OVERLOAD_CPU,
    REBOOT_CAUSE_THERMAL_OVERLOAD_OTHER,
    REBOOT_CAUSE_HARDWARE_OTHER,
];

/// Picks the single representative cause out of the candidates.
///
/// With no candidates at all there is nothing tying the reboot to the power
/// hardware, so the non-hardware cause is returned.
pub fn get_reboot_cause_type(causes: &[String]) -> &'static str {
    for &candidate in CAUSE_PRIORITY {
        if causes.iter().any(|cause| cause == candidate) {
            return candidate;
        }
    }
    if causes.is_empty() {
        REBOOT_CAUSE_NON_HARDWARE
    } else {
        REBOOT_CAUSE_HARDWARE_OTHER
    }
}

/// Resolves the reboot cause from parsed records.
///
/// The record with the greatest `uid` is the triggering fault; its PDIO
/// inputs select the candidate causes from the platform tables. The result
/// depends only on that record. Returns `(reboot_cause, debug_msg)`.
pub fn resolve(records: &[FaultRecord], spec: &DpmPlatformSpec) -> (String, String) {
    let Some(triggering) = records.iter().max_by_key(|record| record.uid) else {
        return (
            REBOOT_CAUSE_NON_HARDWARE.to_string(),
            NO_FAULT_RECORDED.to_string(),
        );
    };
    debug!(
        "resolving reboot cause from fault uid {} of '{}'",
        triggering.uid, spec.name
    );

    let mut causes = Vec::new();
    let mut descriptions = Vec::new();
    for bit in 0..16u32 {
        if triggering.pdio_in & (1u16 << bit) == 0 {
            continue;
        }
        if let Some(entry) = spec.pdio_input_to_fault_cause.get(&(bit + 1)) {
            causes.push(entry.reboot_cause.clone());
            descriptions.push(entry.description.clone());
        }
    }

    // A recorded fault with no mapped PDIO cause is still a hardware event.
    let reboot_cause = if causes.is_empty() {
        REBOOT_CAUSE_HARDWARE_OTHER
    } else {
        get_reboot_cause_type(&causes)
    };

    let rendered = render_record(triggering, spec);
    let mut parts = vec![rendered.debug_msg];
    parts.extend(descriptions);
    let debug_msg = parts.join("; ");

    (reboot_cause.to_string(), debug_msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn causes(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn power_loss_outranks_watchdog() {
        let result = get_reboot_cause_type(&causes(&[
            REBOOT_CAUSE_WATCHDOG,
            REBOOT_CAUSE_POWER_LOSS,
        ]));
        assert_eq!(result, REBOOT_CAUSE_POWER_LOSS);
    }

    #[test]
    fn unranked_candidates_fall_back_to_hardware_other() {
        let result = get_reboot_cause_type(&causes(&["REBOOT_CAUSE_SOMETHING_CUSTOM"]));
        assert_eq!(result, REBOOT_CAUSE_HARDWARE_OTHER);
    }

    #[test]
    fn no_candidates_resolve_to_non_hardware() {
        assert_eq!(get_reboot_cause_type(&[]), REBOOT_CAUSE_NON_HARDWARE);
    }
}
