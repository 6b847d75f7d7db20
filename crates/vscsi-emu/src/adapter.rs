//! Virtual controller state: identity strings, the authoritative unit list and the per-address slot
//! cache in front of it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::defs::{LUN_LIST_ENTRY_LEN, LUN_LIST_HEADER_LEN, MAX_LUNS};
use crate::error::ScsiError;
use crate::priority::{ExecutionContext, FloorLock};
use crate::request::DeviceNumber;
use crate::slots::SlotCache;
use crate::unit::LogicalUnit;

pub const DEFAULT_SLOT_CACHE_SIZE: usize = 64;

/// Writes `src` into `dst`, truncating or padding with ASCII spaces.
fn write_scsi_ascii(dst: &mut [u8], src: &str) {
    dst.fill(b' ');
    for (d, s) in dst.iter_mut().zip(src.bytes()) {
        *d = s;
    }
}

/// Vendor / product / revision strings in their fixed INQUIRY field widths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterIdentity {
    vendor_id: [u8; 8],
    product_id: [u8; 16],
    product_revision: [u8; 4],
    serial_prefix: String,
}

impl AdapterIdentity {
    pub fn new(vendor_id: &str, product_id: &str, product_revision: &str) -> Self {
        let mut identity = Self {
            vendor_id: [b' '; 8],
            product_id: [b' '; 16],
            product_revision: [b' '; 4],
            serial_prefix: String::new(),
        };
        write_scsi_ascii(&mut identity.vendor_id, vendor_id);
        write_scsi_ascii(&mut identity.product_id, product_id);
        write_scsi_ascii(&mut identity.product_revision, product_revision);
        identity
    }

    pub fn with_serial_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.serial_prefix = prefix.into();
        self
    }

    pub fn vendor_id(&self) -> &[u8; 8] {
        &self.vendor_id
    }

    pub fn product_id(&self) -> &[u8; 16] {
        &self.product_id
    }

    pub fn product_revision(&self) -> &[u8; 4] {
        &self.product_revision
    }

    /// Serial number for `device`: the configured prefix followed by the address in hex.
    pub fn serial_number(&self, device: DeviceNumber) -> String {
        format!(
            "{}{:02X}{:02X}{:02X}",
            self.serial_prefix, device.path_id, device.target_id, device.lun
        )
    }
}

impl Default for AdapterIdentity {
    fn default() -> Self {
        Self::new("VSCSI", "Virtual Disk", "0001").with_serial_prefix("VSCSI")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("a live unit already exists at {0}")]
    DuplicateUnit(DeviceNumber),

    #[error("address {0} is reserved for the controller unit")]
    ReservedAddress(DeviceNumber),
}

/// Which units a removal applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitSelector {
    One(DeviceNumber),
    All,
}

impl UnitSelector {
    fn matches(&self, device: DeviceNumber) -> bool {
        match self {
            UnitSelector::One(wanted) => *wanted == device,
            UnitSelector::All => true,
        }
    }
}

pub struct Adapter {
    identity: AdapterIdentity,
    controller_unit: bool,
    pub(crate) units: FloorLock<Vec<Arc<LogicalUnit>>>,
    pub(crate) slots: SlotCache,
    enumerated: AtomicBool,
}

impl Adapter {
    pub fn new(identity: AdapterIdentity) -> Self {
        Self {
            identity,
            controller_unit: true,
            units: FloorLock::new(Vec::new()),
            slots: SlotCache::new(DEFAULT_SLOT_CACHE_SIZE),
            enumerated: AtomicBool::new(false),
        }
    }

    pub fn with_slot_cache_size(mut self, size: usize) -> Self {
        self.slots = SlotCache::new(size);
        self
    }

    /// Enables or disables the synthetic unit at 0:0:0.
    pub fn with_controller_unit(mut self, enabled: bool) -> Self {
        self.controller_unit = enabled;
        self
    }

    pub fn identity(&self) -> &AdapterIdentity {
        &self.identity
    }

    pub fn has_controller_unit(&self) -> bool {
        self.controller_unit
    }

    pub fn slots(&self) -> &SlotCache {
        &self.slots
    }

    /// Whether REPORT LUNS has been answered at least once.
    pub fn enumeration_done(&self) -> bool {
        self.enumerated.load(Ordering::Acquire)
    }

    pub(crate) fn mark_enumerated(&self) {
        self.enumerated.store(true, Ordering::Release);
    }

    pub fn attach_unit(
        &self,
        unit: Arc<LogicalUnit>,
        cx: &ExecutionContext,
    ) -> Result<Arc<LogicalUnit>, AdapterError> {
        let device = unit.device();
        if self.controller_unit && device.is_controller() {
            return Err(AdapterError::ReservedAddress(device));
        }
        let mut units = self.units.lock(cx);
        if units
            .iter()
            .any(|existing| existing.device() == device && !existing.is_stopping())
        {
            return Err(AdapterError::DuplicateUnit(device));
        }
        units.push(Arc::clone(&unit));
        tracing::debug!(%device, "unit attached");
        Ok(unit)
    }

    /// Unlinks every stopping unit from the list. Returns the units removed.
    pub fn detach_stopped(&self, cx: &ExecutionContext) -> Vec<Arc<LogicalUnit>> {
        let mut units = self.units.lock(cx);
        let (stopped, live) = units.drain(..).partition(|unit| unit.is_stopping());
        *units = live;
        stopped
    }

    /// Snapshot of the unit list in attach order.
    pub fn units(&self, cx: &ExecutionContext) -> Vec<Arc<LogicalUnit>> {
        self.units.lock(cx).clone()
    }

    /// Marks matching units as stopping, wakes their workers and drops their slot hints.
    ///
    /// Returns the number of units newly stopped, or `NotPresent` if none matched.
    pub fn report_removed(
        &self,
        selector: UnitSelector,
        cx: &ExecutionContext,
    ) -> Result<usize, ScsiError> {
        let stopped: Vec<DeviceNumber> = {
            let units = self.units.lock(cx);
            units
                .iter()
                .filter(|unit| selector.matches(unit.device()))
                .filter(|unit| unit.stop())
                .map(|unit| unit.device())
                .collect()
        };

        for device in &stopped {
            self.slots.invalidate(*device, cx);
            tracing::debug!(%device, "unit reported removed");
        }

        if stopped.is_empty() {
            Err(ScsiError::NotPresent)
        } else {
            Ok(stopped.len())
        }
    }

    /// Writes a REPORT LUNS parameter list for `(path_id, target_id)` into `buffer`.
    ///
    /// Lists live units in attach order, up to [`MAX_LUNS`] and as many as fit. Returns the number of
    /// LUNs reported.
    pub fn report_luns(
        &self,
        path_id: u8,
        target_id: u8,
        buffer: &mut [u8],
        cx: &ExecutionContext,
    ) -> usize {
        self.mark_enumerated();
        buffer.fill(0);

        let capacity = buffer.len().saturating_sub(LUN_LIST_HEADER_LEN) / LUN_LIST_ENTRY_LEN;
        let limit = capacity.min(MAX_LUNS);
        let mut count = 0;
        {
            let units = self.units.lock(cx);
            let luns = units
                .iter()
                .filter(|unit| !unit.is_stopping())
                .map(|unit| unit.device())
                .filter(|device| device.path_id == path_id && device.target_id == target_id)
                .take(limit);
            for device in luns {
                let at = LUN_LIST_HEADER_LEN + count * LUN_LIST_ENTRY_LEN;
                buffer[at + 1] = device.lun;
                count += 1;
            }
        }

        if let Some(header) = buffer.get_mut(..4) {
            let list_len = (count * LUN_LIST_ENTRY_LEN) as u32;
            header.copy_from_slice(&list_len.to_be_bytes());
        }
        tracing::trace!(path_id, target_id, count, "report luns");
        count
    }
}
