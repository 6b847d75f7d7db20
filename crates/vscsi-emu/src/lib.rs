//! SCSI command emulation and I/O dispatch for virtual logical units.
//!
//! An [`Adapter`] owns a list of [`LogicalUnit`]s, each addressed by a [`DeviceNumber`]
//! (path, target, lun). The host integration layer hands every command to
//! [`Adapter::dispatch`], which:
//!
//! - answers REPORT LUNS and the synthetic controller unit at 0:0:0
//! - resolves the unit through a per-address slot cache in front of the unit list
//! - emulates INQUIRY, READ CAPACITY, MODE SENSE and the read-only optical subset in place
//! - serves reads from the unit's intermediate cache, or services them inline
//! - queues everything else as a [`WorkItem`] for a [`DeferredWorker`]
//!
//! Locks taken from the dispatch path are [`FloorLock`]s: acquiring one raises the caller's
//! [`ExecutionContext`] to [`Priority::Dispatch`] until the guard is dropped.

mod adapter;
mod backend;
mod capacity;
mod config;
pub mod defs;
mod dispatch;
mod error;
mod event;
mod inquiry;
mod mode;
mod optical;
mod pnp;
mod priority;
mod request;
mod resolve;
mod rw;
mod slots;
mod unit;
mod worker;

pub use adapter::{Adapter, AdapterError, AdapterIdentity, UnitSelector, DEFAULT_SLOT_CACHE_SIZE};
pub use backend::{BackendError, BlockBackend, FileBackend, MemBackend};
pub use capacity::{read_capacity10_data, read_capacity16_data};
pub use config::{AdapterConfig, ConfigError, DeviceType, UnitConfig};
pub use error::{Direction, ScsiError};
pub use event::Event;
pub use pnp::{DeviceCapabilities, PnpAction, PnpRequest, DEVICE_CAPABILITIES_LEN};
pub use priority::{ExecutionContext, FloorGuard, FloorLock, Priority};
pub use request::{Completion, DeviceNumber, Request, RequestHandle};
pub use rw::{check_bounds, decode_transfer, Transfer};
pub use slots::SlotCache;
pub use unit::{
    DeviceClass, Geometry, GeometryError, IoCache, LogicalUnit, ServiceMode, UnitFlags,
    DEFAULT_READAHEAD_BYTES, MAX_BLOCK_POWER, MIN_BLOCK_POWER,
};
pub use worker::{DeferredWorker, WorkItem};

#[cfg(test)]
mod proptests;
