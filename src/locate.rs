//! Resolution of logical partition labels to block device nodes.
//!
//! The selector region is published under a different partition label
//! depending on which firmware environment created the partition table, so
//! lookup walks an ordered candidate list and takes the first label that
//! resolves to a live block device.

use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::{Error, SELECTOR_PARTITIONS};

/// Label-to-device lookup provided by the host environment.
pub trait PartitionTable {
    /// Device node published under `label`, if any.
    fn device_for(&self, label: &str) -> Option<PathBuf>;
}

/// Partition table as exported by the kernel under `/sys/class/block`.
///
/// Each block node carries a `uevent` file; partitions list their GPT name as
/// a `PARTNAME=` line there.
pub struct SysfsPartitionTable {
    sysfs: PathBuf,
    dev: PathBuf,
}

impl SysfsPartitionTable {
    pub fn new() -> Self {
        Self::with_roots("/sys/class/block", "/dev")
    }

    pub fn with_roots(sysfs: impl Into<PathBuf>, dev: impl Into<PathBuf>) -> Self {
        Self {
            sysfs: sysfs.into(),
            dev: dev.into(),
        }
    }
}

impl Default for SysfsPartitionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionTable for SysfsPartitionTable {
    fn device_for(&self, label: &str) -> Option<PathBuf> {
        let wanted = format!("PARTNAME={label}");
        for entry in fs::read_dir(&self.sysfs).ok()?.flatten() {
            let Ok(uevent) = fs::read_to_string(entry.path().join("uevent")) else {
                continue;
            };
            if uevent.lines().any(|line| line == wanted) {
                return Some(self.dev.join(entry.file_name()));
            }
        }
        None
    }
}

/// Resolve the selector region device, trying each known label in order.
pub fn selector_device(table: &impl PartitionTable) -> Result<PathBuf, Error> {
    locate(table, &SELECTOR_PARTITIONS)
}

/// First label in `labels` that resolves to a block special device.
///
/// The device set is fixed per boot, so a miss is terminal: no retry.
pub fn locate(table: &impl PartitionTable, labels: &[&str]) -> Result<PathBuf, Error> {
    locate_by(table, labels, is_block_device)
}

fn locate_by(
    table: &impl PartitionTable,
    labels: &[&str],
    probe: impl Fn(&Path) -> bool,
) -> Result<PathBuf, Error> {
    for label in labels {
        match table.device_for(label) {
            Some(path) if probe(&path) => {
                debug!("partition {label} resolved to {}", path.display());
                return Ok(path);
            }
            Some(path) => {
                debug!(
                    "partition {label} resolved to {} which is not a block device",
                    path.display()
                );
            }
            None => debug!("no partition labelled {label}"),
        }
    }
    Err(Error::DeviceNotFound)
}

/// Whether `path` exists and is a block special device.
pub fn is_block_device(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.file_type().is_block_device())
        .unwrap_or(false)
}

/// Refuse `path` unless it is a live block device.
pub fn ensure_block_device(path: &Path) -> Result<(), Error> {
    if is_block_device(path) {
        Ok(())
    } else {
        Err(Error::InvalidSlot(path.display().to_string()))
    }
}
