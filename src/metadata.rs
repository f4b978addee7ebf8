//! Decoding of firmware and kernel version metadata.
//!
//! Each slot carries an OEM-format header partition and a kernel partition
//! with version text at fixed offsets. The alternate OS does not maintain the
//! OEM header, so its firmware revision is reported as a fixed placeholder
//! and only the kernel version text is trusted.

use serde::Serialize;

use crate::selector::BootSelector;
use crate::{Error, RawDevice, Slot};

/// Offset of the firmware version text in the header partition.
pub const FIRMWARE_VERSION_OFFSET: u64 = 8;
/// Length of the firmware version text.
pub const FIRMWARE_VERSION_LEN: usize = 16;
/// Offset of the kernel version text in the kernel partition.
pub const KERNEL_VERSION_OFFSET: u64 = 32;
/// Length of the kernel version text.
pub const KERNEL_VERSION_LEN: usize = 25;

/// Reported as the firmware revision of alternate-OS images.
pub const UNKNOWN_REVISION: &str = "unknown revision";

const LINUX_MARKER: &str = "Linux-";

/// Which firmware family produced a slot's kernel image.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FirmwareKind {
    Oem,
    AlternateOs,
}

/// Everything known about one slot's firmware, recomputed on every query.
#[derive(Clone, Debug, Serialize)]
pub struct FirmwareInfo {
    pub slot: Slot,
    pub kind: FirmwareKind,
    pub root_device: &'static str,
    pub header_device: &'static str,
    pub kernel_device: &'static str,
    pub firmware_version: String,
    pub kernel_version: String,
    pub uname_version: String,
    pub active: bool,
}

/// Decode a raw version byte range into display text.
///
/// The bytes are opaque: non-UTF-8 content is replaced, trailing NUL and
/// space padding is trimmed, nothing else is validated.
fn decode_text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\0', ' '])
        .to_string()
}

fn classify(kernel_version: &str) -> Result<FirmwareKind, Error> {
    if kernel_version.starts_with("ARM") && kernel_version.contains(LINUX_MARKER) {
        Ok(FirmwareKind::AlternateOs)
    } else if kernel_version.starts_with(LINUX_MARKER) {
        Ok(FirmwareKind::Oem)
    } else {
        Err(Error::UndecodableVersion(kernel_version.to_string()))
    }
}

/// Version as `uname -r` would report it: everything after the last
/// `Linux-` occurrence.
fn uname_version(kernel_version: &str) -> String {
    match kernel_version.rfind(LINUX_MARKER) {
        Some(at) => kernel_version[at + LINUX_MARKER.len()..].to_string(),
        None => kernel_version.to_string(),
    }
}

/// Describe the firmware in `slot` from its header and kernel partitions.
///
/// `selector` is consulted for a fresh boot flag read on every call, so
/// `active` reflects current hardware state rather than a cached value.
pub fn describe<H, K, S>(
    slot: Slot,
    header: &H,
    kernel: &K,
    selector: &BootSelector<S>,
) -> Result<FirmwareInfo, Error>
where
    H: RawDevice,
    K: RawDevice,
    S: RawDevice,
{
    let mut raw_firmware = [0u8; FIRMWARE_VERSION_LEN];
    header.read_at(&mut raw_firmware, FIRMWARE_VERSION_OFFSET)?;
    let mut raw_kernel = [0u8; KERNEL_VERSION_LEN];
    kernel.read_at(&mut raw_kernel, KERNEL_VERSION_OFFSET)?;

    let kernel_version = decode_text(&raw_kernel);
    let kind = classify(&kernel_version)?;
    let firmware_version = match kind {
        FirmwareKind::Oem => decode_text(&raw_firmware),
        FirmwareKind::AlternateOs => UNKNOWN_REVISION.to_string(),
    };
    let active = selector.read_active_slot()? == slot;

    Ok(FirmwareInfo {
        slot,
        kind,
        root_device: slot.root_device(),
        header_device: slot.header_device(),
        kernel_device: slot.kernel_device(),
        firmware_version,
        uname_version: uname_version(&kernel_version),
        kernel_version,
        active,
    })
}
