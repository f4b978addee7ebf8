//! Reading, writing and verifying the boot flag region.

use log::{info, warn};
use sha2::{Digest, Sha256};

use crate::{Error, FILL_BYTE, REGION_SIZE, RawDevice, Slot};

/// Boot slot selection over a located selector region.
pub struct BootSelector<D> {
    device: D,
}

impl<D: RawDevice> BootSelector<D> {
    pub fn new(device: D) -> Self {
        Self { device }
    }

    /// Slot the bootloader will pick on next boot.
    ///
    /// Reads exactly the flag byte; the rest of the region is not consulted.
    pub fn read_active_slot(&self) -> Result<Slot, Error> {
        let mut flag = [0u8; 1];
        self.device.read_at(&mut flag, 0)?;
        Slot::from_flag(flag[0])
    }

    /// Mark `slot` active by rewriting only the flag byte.
    ///
    /// All other region bytes are left untouched, so this cannot repair a
    /// region that already fails [`BootSelector::check_integrity`].
    pub fn set_active_slot(&self, slot: Slot) -> Result<(), Error> {
        self.device.write_at(&[slot.flag()], 0)?;
        info!("boot flag set to {:#04x} ({slot:?})", slot.flag());
        Ok(())
    }

    /// Rewrite the entire region to its canonical content for `slot`.
    ///
    /// The region is written in a single pass: fill bytes everywhere, the
    /// slot's flag at offset 0. An interrupted write (power loss) leaves the
    /// region corrupt with no recovery path, which is why the flag-only
    /// [`BootSelector::set_active_slot`] is the preferred operation.
    pub fn reset_and_set_active_slot(&self, slot: Slot) -> Result<(), Error> {
        warn!("rewriting whole selector region for {slot:?}");
        let mut region = vec![FILL_BYTE; REGION_SIZE];
        region[0] = slot.flag();
        self.device.write_at(&region, 0)?;
        info!("selector region reset, boot flag {:#04x}", slot.flag());
        Ok(())
    }

    /// Verify the whole region against the two known-good layouts.
    ///
    /// Returns the slot whose canonical fingerprint the region matches.
    pub fn check_integrity(&self) -> Result<Slot, Error> {
        let mut region = vec![0u8; REGION_SIZE];
        self.device.read_at(&mut region, 0)?;
        let digest: [u8; 32] = Sha256::digest(&region).into();
        Slot::ALL
            .into_iter()
            .find(|slot| *slot.fingerprint() == digest)
            .ok_or_else(|| Error::CorruptSelectorRegion(hex::encode(digest)))
    }
}
