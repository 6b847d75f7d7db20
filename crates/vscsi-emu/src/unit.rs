//! Per-unit state: identity, geometry, lifecycle signals, the intermediate read cache and the
//! hand-off queue drained by the deferred worker.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use thiserror::Error;

use crate::backend::BlockBackend;
use crate::defs::{DIRECT_ACCESS_DEVICE, READ_ONLY_DIRECT_ACCESS_DEVICE};
use crate::error::ScsiError;
use crate::event::Event;
use crate::priority::{ExecutionContext, FloorLock};
use crate::request::DeviceNumber;
use crate::worker::WorkItem;

pub const MIN_BLOCK_POWER: u32 = 9;
pub const MAX_BLOCK_POWER: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Disk,
    /// Read-only optical (DVD-ROM profile).
    Optical,
}

impl DeviceClass {
    /// Peripheral device type reported by INQUIRY.
    pub fn device_type(self) -> u8 {
        match self {
            DeviceClass::Disk => DIRECT_ACCESS_DEVICE,
            DeviceClass::Optical => READ_ONLY_DIRECT_ACCESS_DEVICE,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UnitFlags: u8 {
        const REMOVABLE = 1 << 0;
        const READ_ONLY = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("block size exponent {0} outside 9..=16")]
    BlockPowerOutOfRange(u32),

    #[error("disk size {disk_size} is not a multiple of the {block_size}-byte block size")]
    UnalignedCapacity { disk_size: u64, block_size: u64 },
}

/// Block size exponent and capacity. The capacity is always a whole number of blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    block_power: u32,
    disk_size: u64,
}

impl Geometry {
    pub fn new(block_power: u32, disk_size: u64) -> Result<Self, GeometryError> {
        if !(MIN_BLOCK_POWER..=MAX_BLOCK_POWER).contains(&block_power) {
            return Err(GeometryError::BlockPowerOutOfRange(block_power));
        }
        let block_size = 1u64 << block_power;
        if disk_size & (block_size - 1) != 0 {
            return Err(GeometryError::UnalignedCapacity {
                disk_size,
                block_size,
            });
        }
        Ok(Self {
            block_power,
            disk_size,
        })
    }

    pub fn block_power(&self) -> u32 {
        self.block_power
    }

    pub fn block_size(&self) -> u64 {
        1 << self.block_power
    }

    pub fn disk_size(&self) -> u64 {
        self.disk_size
    }

    pub fn block_count(&self) -> u64 {
        self.disk_size >> self.block_power
    }

    /// Highest addressable block, or 0 for an empty unit.
    pub fn max_lba(&self) -> u64 {
        self.block_count().saturating_sub(1)
    }
}

/// Single most-recent-read range.
#[derive(Debug, Default)]
pub struct IoCache {
    buffer: Vec<u8>,
    start_sector: u64,
}

impl IoCache {
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn start_sector(&self) -> u64 {
        self.start_sector
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Cached bytes for `[sector, sector + len)` when that byte range lies wholly inside the cached
    /// range.
    pub fn lookup(&self, sector: u64, block_power: u32, len: usize) -> Option<&[u8]> {
        if self.buffer.is_empty() || sector < self.start_sector {
            return None;
        }
        let skip = (sector - self.start_sector).checked_mul(1u64 << block_power)?;
        let skip = usize::try_from(skip).ok()?;
        let end = skip.checked_add(len)?;
        self.buffer.get(skip..end)
    }

    pub fn store(&mut self, start_sector: u64, data: Vec<u8>) {
        self.start_sector = start_sector;
        self.buffer = data;
    }

    pub fn clear(&mut self) {
        self.buffer = Vec::new();
        self.start_sector = 0;
    }

    fn overlaps(&self, block_power: u32, offset: u64, len: u64) -> bool {
        if self.buffer.is_empty() || len == 0 {
            return false;
        }
        let start = self.start_sector << block_power;
        let end = start.saturating_add(self.buffer.len() as u64);
        offset < end && start < offset.saturating_add(len)
    }
}

/// How data-moving requests on a unit are serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    /// Queued for the deferred worker.
    Deferred,
    /// Serviced synchronously through the unit's direct handle. The caller must be able to block.
    Inline,
}

pub const DEFAULT_READAHEAD_BYTES: u64 = 64 * 1024;

/// One virtual block device.
pub struct LogicalUnit {
    device: DeviceNumber,
    class: DeviceClass,
    flags: UnitFlags,
    geometry: Geometry,
    mode: ServiceMode,
    readahead: u64,

    initialized: Event,
    stopping: Event,
    request_event: Event,

    cache: FloorLock<IoCache>,
    requests: FloorLock<VecDeque<WorkItem>>,
    backend: Arc<dyn BlockBackend>,
}

impl fmt::Debug for LogicalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalUnit")
            .field("device", &self.device)
            .field("class", &self.class)
            .field("flags", &self.flags)
            .field("geometry", &self.geometry)
            .field("mode", &self.mode)
            .field("initialized", &self.initialized.is_set())
            .field("stopping", &self.stopping.is_set())
            .finish_non_exhaustive()
    }
}

impl LogicalUnit {
    /// Optical units are always read-only.
    pub fn new(
        device: DeviceNumber,
        class: DeviceClass,
        mut flags: UnitFlags,
        geometry: Geometry,
        backend: Arc<dyn BlockBackend>,
    ) -> Self {
        if class == DeviceClass::Optical {
            flags |= UnitFlags::READ_ONLY;
        }
        Self {
            device,
            class,
            flags,
            geometry,
            mode: ServiceMode::Deferred,
            readahead: DEFAULT_READAHEAD_BYTES,
            initialized: Event::new(),
            stopping: Event::new(),
            request_event: Event::new(),
            cache: FloorLock::new(IoCache::default()),
            requests: FloorLock::new(VecDeque::new()),
            backend,
        }
    }

    pub fn with_mode(mut self, mode: ServiceMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_readahead(mut self, bytes: u64) -> Self {
        self.readahead = bytes;
        self
    }

    pub fn device(&self) -> DeviceNumber {
        self.device
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub fn flags(&self) -> UnitFlags {
        self.flags
    }

    pub fn is_removable(&self) -> bool {
        self.flags.contains(UnitFlags::REMOVABLE)
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(UnitFlags::READ_ONLY)
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn mode(&self) -> ServiceMode {
        self.mode
    }

    pub fn readahead(&self) -> u64 {
        self.readahead
    }

    pub fn backend(&self) -> &Arc<dyn BlockBackend> {
        &self.backend
    }

    /// Handle for inline servicing; `None` when requests go through the deferred queue.
    pub fn direct_handle(&self) -> Option<&Arc<dyn BlockBackend>> {
        match self.mode {
            ServiceMode::Inline => Some(&self.backend),
            ServiceMode::Deferred => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.is_set()
    }

    pub fn set_initialized(&self) {
        self.initialized.set();
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.is_set()
    }

    /// Marks the unit as torn down and wakes its worker. Returns `false` if it was already stopping.
    pub fn stop(&self) -> bool {
        if self.stopping.is_set() {
            return false;
        }
        self.stopping.set();
        self.request_event.set();
        true
    }

    pub fn request_event(&self) -> &Event {
        &self.request_event
    }

    /// Appends a work item and signals the worker.
    ///
    /// A stopping unit takes no new work. Queue growth is fallible; a failed reservation leaves the
    /// queue untouched.
    pub fn enqueue(&self, item: WorkItem, cx: &ExecutionContext) -> Result<(), ScsiError> {
        {
            let mut queue = self.requests.lock(cx);
            if self.is_stopping() {
                tracing::debug!(device = %self.device, "work item rejected by stopping unit");
                return Err(ScsiError::NotPresent);
            }
            if let Err(err) = queue.try_reserve(1) {
                tracing::warn!(device = %self.device, %err, "work item allocation failed");
                return Err(ScsiError::HardwareError);
            }
            queue.push_back(item);
        }
        self.request_event.set();
        Ok(())
    }

    pub fn take_work(&self, cx: &ExecutionContext) -> Option<WorkItem> {
        self.requests.lock(cx).pop_front()
    }

    pub fn pending(&self, cx: &ExecutionContext) -> usize {
        self.requests.lock(cx).len()
    }

    /// `true` once the unit is stopping and its queue is empty. Checked under the queue lock, so no
    /// later [`LogicalUnit::enqueue`] can succeed after this returns `true`.
    pub fn is_drained(&self, cx: &ExecutionContext) -> bool {
        let queue = self.requests.lock(cx);
        self.is_stopping() && queue.is_empty()
    }

    /// Copies `dst.len()` bytes starting at `sector` out of the intermediate cache. Returns `false`
    /// on a miss; `dst` is untouched in that case.
    pub fn read_cached(&self, sector: u64, dst: &mut [u8], cx: &ExecutionContext) -> bool {
        let cache = self.cache.lock(cx);
        match cache.lookup(sector, self.geometry.block_power, dst.len()) {
            Some(hit) => {
                dst.copy_from_slice(hit);
                true
            }
            None => false,
        }
    }

    pub fn fill_cache(&self, start_sector: u64, data: Vec<u8>, cx: &ExecutionContext) {
        self.cache.lock(cx).store(start_sector, data);
    }

    /// Drops the cached range if it overlaps `[offset, offset + len)`.
    pub fn invalidate_cache(&self, offset: u64, len: u64, cx: &ExecutionContext) {
        let mut cache = self.cache.lock(cx);
        if cache.overlaps(self.geometry.block_power, offset, len) {
            tracing::trace!(device = %self.device, offset, len, "cached range invalidated");
            cache.clear();
        }
    }

    /// Start sector and byte length of the cached range, if any.
    pub fn cached_range(&self, cx: &ExecutionContext) -> Option<(u64, usize)> {
        let cache = self.cache.lock(cx);
        (!cache.is_empty()).then(|| (cache.start_sector(), cache.len()))
    }
}
