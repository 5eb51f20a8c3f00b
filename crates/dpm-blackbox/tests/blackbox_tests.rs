use std::fs;

use serde_json::json;

use dpm_blackbox::resolver::{NO_FAULT_RECORDED, REBOOT_CAUSE_NON_HARDWARE, REBOOT_CAUSE_POWER_LOSS};
use dpm_blackbox::{parse_blackbox, resolve, DpmDevice, DpmPlatformSpec, RECORD_SIZE};

/// Builds one 64-byte record with the datasheet layout; unset bytes are zero.
fn record_bytes(uid: u16, timestamp: u64, pdio_in: u16, vp_faults: &[(usize, u8)]) -> Vec<u8> {
    let mut chunk = vec![0u8; RECORD_SIZE];
    chunk[0..2].copy_from_slice(&uid.to_le_bytes());
    chunk[2..10].copy_from_slice(&timestamp.to_le_bytes());
    chunk[16..18].copy_from_slice(&pdio_in.to_le_bytes());
    for &(rail, status) in vp_faults {
        chunk[20 + rail] = status;
    }
    chunk
}

fn test_spec(nvmem_path: &str) -> DpmPlatformSpec {
    let plugin_data = json!({
        "DPM": {
            "dpm0": {
                "nvmem_path": nvmem_path,
                "vpx_to_rail_desc": { "0": "VDD_CORE", "1": "VDD_3V3" },
                "vhx_to_rail_desc": { "0": "VIN_12V" },
                "dpm_signals": { "2": 0 },
                "dpm_table": { "1": "Overcurrent VDD" },
                "pdio_input_to_fault_cause": {
                    "2": {
                        "reboot_cause": "REBOOT_CAUSE_POWER_LOSS",
                        "description": "VDD overcurrent shutdown"
                    }
                }
            }
        }
    });
    DpmPlatformSpec::from_plugin_data("dpm0", &plugin_data).unwrap()
}

/// Two faults; the newer one (uid 2) trips PDIO2 and marks VP0 faulted.
fn fixture_blob() -> Vec<u8> {
    let mut blob = record_bytes(1, 1000, 0, &[]);
    blob.extend(record_bytes(2, 49163897, 0b10, &[(0, 0x11), (1, 0x04)]));
    blob
}

#[test]
fn triggering_fault_resolves_to_its_mapped_cause() {
    let spec = test_spec("/dev/null");
    let records = parse_blackbox(&fixture_blob()).unwrap();
    assert_eq!(records.len(), 2);

    let (cause, debug_msg) = resolve(&records, &spec);

    assert_eq!(cause, REBOOT_CAUSE_POWER_LOSS);
    // The decoded DPM fault and the faulted rail descriptions both show up
    // in the debug message.
    assert!(debug_msg.contains("Overcurrent VDD"), "{debug_msg}");
    assert!(debug_msg.contains("VDD_CORE"), "{debug_msg}");
    assert!(debug_msg.contains("VDD_3V3"), "{debug_msg}");
    assert!(debug_msg.contains("VDD overcurrent shutdown"), "{debug_msg}");
}

#[test]
fn resolution_depends_only_on_the_greatest_uid() {
    let spec = test_spec("/dev/null");

    let mut forward = record_bytes(1, 1000, 0, &[]);
    forward.extend(record_bytes(2, 2000, 0b10, &[(0, 1)]));
    let mut reversed = record_bytes(2, 2000, 0b10, &[(0, 1)]);
    reversed.extend(record_bytes(1, 1000, 0, &[]));
    // Extra stale records with other PDIO bits must not influence the result.
    let mut padded = forward.clone();
    padded.extend(record_bytes(0, 1, 0b1111, &[(1, 0xff)]));

    let forward = parse_blackbox(&forward).unwrap();
    let reversed = parse_blackbox(&reversed).unwrap();
    let padded = parse_blackbox(&padded).unwrap();

    assert_eq!(resolve(&forward, &spec), resolve(&reversed, &spec));
    assert_eq!(resolve(&forward, &spec), resolve(&padded, &spec));
}

#[test]
fn no_records_resolve_to_the_no_fault_sentinel() {
    let spec = test_spec("/dev/null");
    let (cause, debug_msg) = resolve(&[], &spec);
    assert_eq!(cause, REBOOT_CAUSE_NON_HARDWARE);
    assert_eq!(debug_msg, NO_FAULT_RECORDED);
}

#[test]
fn rendered_records_carry_the_platform_names() {
    let spec = test_spec("/dev/null");
    let records = parse_blackbox(&fixture_blob()).unwrap();
    let rendered = dpm_blackbox::render_record(&records[1], &spec);

    assert_eq!(rendered.uid, 2);
    assert_eq!(rendered.dpm_name, "dpm0");
    assert_eq!(rendered.cause, "Overcurrent VDD");
    assert_eq!(
        rendered.fields["timestamp"],
        "49163897 seconds after power-on"
    );
    assert_eq!(rendered.fields["pdio_in"], "PDIO2");
    assert_eq!(rendered.fields["VDD_CORE"], "0x11");
    assert_eq!(rendered.fields["VDD_3V3"], "0x04");
    // Unmapped rails fall back to their index name.
    assert_eq!(rendered.fields["VP5"], "0x00");
    assert_eq!(rendered.fields["VIN_12V"], "0x00");
}

#[test]
fn device_reads_parse_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let nvmem = dir.path().join("nvmem");
    fs::write(&nvmem, fixture_blob()).unwrap();

    let device = DpmDevice::new(test_spec(nvmem.to_str().unwrap()));
    assert_eq!(device.name(), "dpm0");

    // Reading is single-shot and repeatable.
    assert_eq!(device.read_blackbox().unwrap(), fixture_blob());
    assert_eq!(device.read_blackbox().unwrap(), fixture_blob());

    let records = device.blackbox_records().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].uid, 1);
    assert_eq!(records[1].uid, 2);

    let (cause, _) = device.reboot_cause().unwrap();
    assert_eq!(cause, REBOOT_CAUSE_POWER_LOSS);

    // Clearing leaves the sentinel byte; queries then see no faults.
    device.clear_blackbox().unwrap();
    assert_eq!(device.read_blackbox().unwrap(), b"1");
    assert!(device.blackbox_records().unwrap().is_empty());
    let (cause, debug_msg) = device.reboot_cause().unwrap();
    assert_eq!(cause, REBOOT_CAUSE_NON_HARDWARE);
    assert_eq!(debug_msg, NO_FAULT_RECORDED);
}

#[test]
fn truncated_blobs_are_a_decoding_error() {
    let dir = tempfile::tempdir().unwrap();
    let nvmem = dir.path().join("nvmem");
    let mut blob = fixture_blob();
    blob.truncate(RECORD_SIZE + 9);
    fs::write(&nvmem, &blob).unwrap();

    let device = DpmDevice::new(test_spec(nvmem.to_str().unwrap()));
    assert!(device.blackbox_records().is_err());
    assert!(device.reboot_cause().is_err());
}
