//! Hand-off envelopes and a reference deferred worker.
//!
//! The engine never performs backing-store I/O for deferred units; it queues a [`WorkItem`] on the
//! unit and signals the unit's wake event. [`DeferredWorker`] is one consumer of that queue: it runs
//! in a context that may block, services each item against the unit's [`crate::BlockBackend`],
//! completes the request and hands the finished item to a completion callback.

use std::fmt;
use std::io;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crate::adapter::Adapter;
use crate::error::{Direction, ScsiError};
use crate::priority::ExecutionContext;
use crate::request::RequestHandle;
use crate::rw::Transfer;
use crate::unit::LogicalUnit;

/// Deferred request bound to its adapter and unit.
pub struct WorkItem {
    adapter: Weak<Adapter>,
    unit: Arc<LogicalUnit>,
    request: RequestHandle,
    transfer: Transfer,
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("device", &self.unit.device())
            .field("transfer", &self.transfer)
            .finish_non_exhaustive()
    }
}

impl WorkItem {
    pub(crate) fn new(
        adapter: Weak<Adapter>,
        unit: Arc<LogicalUnit>,
        request: RequestHandle,
        transfer: Transfer,
    ) -> Self {
        Self {
            adapter,
            unit,
            request,
            transfer,
        }
    }

    /// The owning adapter, unless it has been dropped since the item was queued.
    pub fn adapter(&self) -> Option<Arc<Adapter>> {
        self.adapter.upgrade()
    }

    pub fn unit(&self) -> &Arc<LogicalUnit> {
        &self.unit
    }

    pub fn request(&self) -> &RequestHandle {
        &self.request
    }

    pub fn transfer(&self) -> Transfer {
        self.transfer
    }
}

fn try_alloc_zeroed(len: usize) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).ok()?;
    buf.resize(len, 0);
    Some(buf)
}

/// Drains unit queues and completes requests through `complete`.
pub struct DeferredWorker<F> {
    complete: F,
}

impl<F> DeferredWorker<F>
where
    F: Fn(WorkItem),
{
    pub fn new(complete: F) -> Self {
        Self { complete }
    }

    /// Services every item currently queued on `unit`. Returns the number of requests completed.
    pub fn run_pending(&self, unit: &LogicalUnit) -> usize {
        let cx = ExecutionContext::passive();
        let mut completed = 0;
        while let Some(item) = unit.take_work(&cx) {
            let result = self.service(&item, &cx);
            item.request.lock().complete(result);
            (self.complete)(item);
            completed += 1;
        }
        completed
    }

    fn service(&self, item: &WorkItem, cx: &ExecutionContext) -> Result<usize, ScsiError> {
        let unit = &item.unit;
        if unit.is_stopping() || item.adapter().is_none() {
            return Err(ScsiError::NotPresent);
        }

        let Transfer {
            direction,
            sector,
            offset,
            length,
            ..
        } = item.transfer;
        let mut req = item.request.lock();
        let Some(buffer) = req.data_buffer_mut() else {
            tracing::warn!(device = %unit.device(), length, "data buffer translation failed");
            return Err(ScsiError::HardwareError);
        };

        match direction {
            Direction::Read => {
                let remaining = unit.geometry().disk_size().saturating_sub(offset);
                let span = (length as u64)
                    .saturating_add(unit.readahead())
                    .min(remaining)
                    .max(length as u64);
                let span = usize::try_from(span).map_err(|_| ScsiError::HardwareError)?;
                let Some(mut data) = try_alloc_zeroed(span) else {
                    tracing::warn!(device = %unit.device(), span, "read buffer allocation failed");
                    return Err(ScsiError::HardwareError);
                };
                if let Err(err) = unit.backend().read_at(offset, &mut data) {
                    tracing::warn!(device = %unit.device(), offset, span, %err, "backing store read failed");
                    return Err(ScsiError::MediumError(Direction::Read));
                }
                buffer.copy_from_slice(&data[..length]);
                unit.fill_cache(sector, data, cx);
            }
            Direction::Write => {
                unit.invalidate_cache(offset, length as u64, cx);
                if let Err(err) = unit.backend().write_at(offset, buffer) {
                    tracing::warn!(device = %unit.device(), offset, length, %err, "backing store write failed");
                    return Err(ScsiError::MediumError(Direction::Write));
                }
            }
        }

        tracing::trace!(device = %unit.device(), %direction, sector, length, "deferred request serviced");
        Ok(length)
    }
}

impl<F> DeferredWorker<F>
where
    F: Fn(WorkItem) + Send + 'static,
{
    /// Runs the worker on its own thread until `unit` is drained (see [`LogicalUnit::is_drained`]).
    pub fn spawn(self, unit: Arc<LogicalUnit>) -> io::Result<JoinHandle<()>> {
        let name = format!("vscsi-worker-{}", unit.device());
        thread::Builder::new().name(name).spawn(move || {
            let cx = ExecutionContext::passive();
            loop {
                unit.request_event().wait();
                unit.request_event().reset();
                self.run_pending(&unit);
                if unit.is_drained(&cx) {
                    break;
                }
            }
            tracing::debug!(device = %unit.device(), "deferred worker exiting");
        })
    }
}
