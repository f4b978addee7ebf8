//! Toolkit for managing dual-boot firmware selection on routers with two
//! redundant firmware slots.
//!
//! The boot slot is chosen by a single flag byte at the start of a small
//! reserved flash region. This crate locates that region, reads and writes the
//! flag, verifies the region content against the two known-good layouts, and
//! decodes the version metadata embedded in each slot's header and kernel
//! partitions.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

pub mod locate;
pub mod metadata;
pub mod selector;

#[cfg(test)]
mod mock;

/// Size of the reserved selector region in bytes.
pub const REGION_SIZE: usize = 64 * 1024;

/// Value of every region byte past the flag itself in a valid state.
pub const FILL_BYTE: u8 = 0xff;

/// Partition labels under which the selector region is published.
/// LEDE naming first, OEM naming second; tried in order.
pub const SELECTOR_PARTITIONS: [&str; 2] = ["0:DUAL_FLAG", "dualflag"];

/// Board identifier this tool is willing to touch flash on.
pub const SUPPORTED_BOARD: &str = "zyxel,nbg6817";

#[derive(Debug, Error)]
pub enum Error {
    #[error("no selector partition found under any of {SELECTOR_PARTITIONS:?}")]
    DeviceNotFound,

    #[error("unrecognized boot flag byte {0:#04x}")]
    UnrecognizedBootFlag(u8),

    #[error("{0:?} is not a known root filesystem device")]
    InvalidSlot(String),

    #[error("cannot decode kernel version {0:?}")]
    UndecodableVersion(String),

    #[error("selector region digest {0} matches neither slot layout")]
    CorruptSelectorRegion(String),

    #[error("running on board {found:?}, need {expected:?}")]
    WrongBoard { found: String, expected: String },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Stable process exit code for this error kind.
    ///
    /// Code 2 is left to the argument parser's own usage errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Io(_) => 1,
            Error::WrongBoard { .. } => 3,
            Error::DeviceNotFound => 4,
            Error::UnrecognizedBootFlag(_) => 5,
            Error::InvalidSlot(_) => 6,
            Error::UndecodableVersion(_) => 7,
            Error::CorruptSelectorRegion(_) => 8,
        }
    }
}

/// One of the two fixed firmware configurations.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize)]
pub enum Slot {
    A,
    B,
}

/// Compiled-in per-slot constants. Never computed at runtime.
struct SlotLayout {
    root: &'static str,
    header: &'static str,
    kernel: &'static str,
    /// Flag byte at region offset 0 marking this slot active.
    flag: u8,
    /// SHA-256 over the whole region when this slot is active and the region
    /// is otherwise pristine fill.
    fingerprint: [u8; 32],
}

static LAYOUT_A: SlotLayout = SlotLayout {
    root: "/dev/mmcblk0p5",
    header: "/dev/mmcblk0p3",
    kernel: "/dev/mmcblk0p4",
    flag: 0xff,
    fingerprint: [
        0x71, 0x18, 0x9f, 0x7f, 0xb6, 0xae, 0xd6, 0x38, 0x64, 0x00, 0x78, 0xfb, 0xa3, 0xa3, 0x5f,
        0xda, 0x6c, 0x39, 0xc8, 0x96, 0x2e, 0x74, 0xdc, 0xc7, 0x59, 0x35, 0xaa, 0xc9, 0x48, 0xda,
        0x90, 0x63,
    ],
};

static LAYOUT_B: SlotLayout = SlotLayout {
    root: "/dev/mmcblk0p8",
    header: "/dev/mmcblk0p6",
    kernel: "/dev/mmcblk0p7",
    flag: 0x01,
    fingerprint: [
        0x80, 0x99, 0xe9, 0x77, 0xc3, 0xfb, 0xe9, 0x4b, 0xc0, 0x7b, 0x29, 0x33, 0x8e, 0x38, 0x38,
        0xda, 0x43, 0x50, 0x72, 0x7b, 0xf2, 0x0f, 0x56, 0x66, 0xe1, 0x8b, 0x31, 0x8d, 0xb5, 0x42,
        0x83, 0x2e,
    ],
};

impl Slot {
    /// Both slots, in declaration order.
    pub const ALL: [Slot; 2] = [Slot::A, Slot::B];

    fn layout(self) -> &'static SlotLayout {
        match self {
            Slot::A => &LAYOUT_A,
            Slot::B => &LAYOUT_B,
        }
    }

    /// Slot marked active by the given flag byte.
    pub fn from_flag(flag: u8) -> Result<Slot, Error> {
        Slot::ALL
            .into_iter()
            .find(|slot| slot.flag() == flag)
            .ok_or(Error::UnrecognizedBootFlag(flag))
    }

    /// Slot whose root filesystem lives at `path`.
    pub fn from_root_device(path: &Path) -> Result<Slot, Error> {
        Slot::ALL
            .into_iter()
            .find(|slot| Path::new(slot.root_device()) == path)
            .ok_or_else(|| Error::InvalidSlot(path.display().to_string()))
    }

    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    pub fn root_device(self) -> &'static str {
        self.layout().root
    }

    pub fn header_device(self) -> &'static str {
        self.layout().header
    }

    pub fn kernel_device(self) -> &'static str {
        self.layout().kernel
    }

    /// Flag byte at region offset 0 marking this slot active.
    pub fn flag(self) -> u8 {
        self.layout().flag
    }

    /// Expected whole-region digest when this slot is active.
    pub fn fingerprint(self) -> &'static [u8; 32] {
        &self.layout().fingerprint
    }
}

/// Positional byte access to a raw flash partition.
///
/// Production code uses the block device node directly; tests substitute an
/// in-memory buffer.
pub trait RawDevice {
    /// Read exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<(), Error>;

    /// Write all of `buf` starting at `offset`.
    fn write_at(&self, buf: &[u8], offset: u64) -> Result<(), Error>;
}

impl RawDevice for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<(), Error> {
        Ok(self.read_exact_at(buf, offset)?)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<(), Error> {
        self.write_all_at(buf, offset)?;
        Ok(self.sync_data()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_bytes_map_to_slots() {
        assert_eq!(Slot::from_flag(0xff).unwrap(), Slot::A);
        assert_eq!(Slot::from_flag(0x01).unwrap(), Slot::B);
    }

    #[test]
    fn unknown_flag_bytes_are_rejected() {
        for flag in [0x00, 0x02, 0x7f, 0xfe] {
            assert!(matches!(
                Slot::from_flag(flag),
                Err(Error::UnrecognizedBootFlag(f)) if f == flag
            ));
        }
    }

    #[test]
    fn root_devices_map_to_slots() {
        assert_eq!(
            Slot::from_root_device(Path::new("/dev/mmcblk0p5")).unwrap(),
            Slot::A
        );
        assert_eq!(
            Slot::from_root_device(Path::new("/dev/mmcblk0p8")).unwrap(),
            Slot::B
        );
        assert!(matches!(
            Slot::from_root_device(Path::new("/dev/mmcblk0p1")),
            Err(Error::InvalidSlot(_))
        ));
    }

    #[test]
    fn slots_disagree_on_every_constant() {
        assert_ne!(Slot::A.root_device(), Slot::B.root_device());
        assert_ne!(Slot::A.header_device(), Slot::B.header_device());
        assert_ne!(Slot::A.kernel_device(), Slot::B.kernel_device());
        assert_ne!(Slot::A.flag(), Slot::B.flag());
        assert_ne!(Slot::A.fingerprint(), Slot::B.fingerprint());
    }

    #[test]
    fn exit_codes_are_distinct_per_kind() {
        let errors = [
            Error::Io(io::Error::other("boom")),
            Error::WrongBoard {
                found: "x".into(),
                expected: "y".into(),
            },
            Error::DeviceNotFound,
            Error::UnrecognizedBootFlag(0x42),
            Error::InvalidSlot("/dev/null".into()),
            Error::UndecodableVersion("garbage".into()),
            Error::CorruptSelectorRegion("00".repeat(32)),
        ];
        let mut codes: Vec<i32> = errors.iter().map(Error::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        // 2 is reserved for usage errors from the argument parser.
        assert!(!codes.contains(&2));
    }
}
