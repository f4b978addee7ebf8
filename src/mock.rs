//! In-memory stand-ins for flash partitions and the partition table.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use crate::locate::PartitionTable;
use crate::{Error, FILL_BYTE, REGION_SIZE, RawDevice, Slot};

/// A partition backed by a plain byte buffer.
pub struct MockDevice(RefCell<Vec<u8>>);

impl MockDevice {
    pub fn new(content: Vec<u8>) -> Self {
        Self(RefCell::new(content))
    }

    /// A selector region in its canonical state for `slot`.
    pub fn pristine_region(slot: Slot) -> Self {
        let mut region = vec![FILL_BYTE; REGION_SIZE];
        region[0] = slot.flag();
        Self::new(region)
    }

    /// A fill-initialized selector region with an arbitrary flag byte.
    pub fn region_with_flag(flag: u8) -> Self {
        let mut region = vec![FILL_BYTE; REGION_SIZE];
        region[0] = flag;
        Self::new(region)
    }

    /// A partition whose only interesting content is `text` in a
    /// fixed-offset field, zero-padded to the field length.
    pub fn with_field(offset: u64, len: usize, text: &str) -> Self {
        assert!(text.len() <= len, "field text longer than the field");
        let mut content = vec![0u8; offset as usize + len];
        content[offset as usize..offset as usize + text.len()].copy_from_slice(text.as_bytes());
        Self::new(content)
    }

    /// Overwrite a single byte, bypassing the device interface.
    pub fn poke(&self, offset: u64, value: u8) {
        self.0.borrow_mut()[offset as usize] = value;
    }
}

impl RawDevice for MockDevice {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<(), Error> {
        let content = self.0.borrow();
        let start = offset as usize;
        let end = start + buf.len();
        if end > content.len() {
            return Err(Error::Io(io::ErrorKind::UnexpectedEof.into()));
        }
        buf.copy_from_slice(&content[start..end]);
        Ok(())
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<(), Error> {
        let mut content = self.0.borrow_mut();
        let start = offset as usize;
        let end = start + buf.len();
        if end > content.len() {
            return Err(Error::Io(io::ErrorKind::UnexpectedEof.into()));
        }
        content[start..end].copy_from_slice(buf);
        Ok(())
    }
}

/// A partition table with a fixed label-to-device mapping.
pub struct MockPartitionTable(BTreeMap<String, PathBuf>);

impl MockPartitionTable {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self(
            entries
                .iter()
                .map(|(label, path)| (label.to_string(), PathBuf::from(path)))
                .collect(),
        )
    }
}

impl PartitionTable for MockPartitionTable {
    fn device_for(&self, label: &str) -> Option<PathBuf> {
        self.0.get(label).cloned()
    }
}
