use std::sync::Arc;

use crate::priority::{ExecutionContext, FloorLock};
use crate::request::DeviceNumber;
use crate::unit::LogicalUnit;

type Slot = Option<(DeviceNumber, Arc<LogicalUnit>)>;

/// Direct-mapped per-address unit hints, consulted before the adapter's unit list.
///
/// A slot remembers the address it was filled for; a lookup that lands on a slot filled for a
/// different address is an ordinary miss. A size of zero disables the cache.
pub struct SlotCache {
    slots: Box<[FloorLock<Slot>]>,
}

impl SlotCache {
    pub fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(|_| FloorLock::new(None)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, device: DeviceNumber) -> Option<&FloorLock<Slot>> {
        if self.slots.is_empty() {
            return None;
        }
        let key = u32::from_be_bytes([0, device.path_id, device.target_id, device.lun]);
        let hash = key.wrapping_mul(0x9E37_79B1);
        self.slots.get(hash as usize % self.slots.len())
    }

    /// Hinted unit for `device`, or `None` if the slot is empty or belongs to another address.
    ///
    /// The returned unit's own identity is not checked here.
    pub fn get(&self, device: DeviceNumber, cx: &ExecutionContext) -> Option<Arc<LogicalUnit>> {
        let slot = self.slot(device)?.lock(cx);
        match slot.as_ref() {
            Some((key, unit)) if *key == device => Some(Arc::clone(unit)),
            _ => None,
        }
    }

    pub fn set(&self, device: DeviceNumber, unit: Arc<LogicalUnit>, cx: &ExecutionContext) {
        if let Some(slot) = self.slot(device) {
            *slot.lock(cx) = Some((device, unit));
        }
    }

    /// Clears the slot for `device` if it currently holds a hint for that address.
    pub fn invalidate(&self, device: DeviceNumber, cx: &ExecutionContext) {
        if let Some(slot) = self.slot(device) {
            let mut slot = slot.lock(cx);
            if matches!(slot.as_ref(), Some((key, _)) if *key == device) {
                *slot = None;
            }
        }
    }

    pub fn clear(&self, cx: &ExecutionContext) {
        for slot in self.slots.iter() {
            *slot.lock(cx) = None;
        }
    }
}
