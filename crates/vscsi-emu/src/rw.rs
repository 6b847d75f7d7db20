//! READ/WRITE (10) and (16): address decoding, validation, the intermediate cache fast path and the
//! inline-or-deferred dispatch decision.

use std::sync::Arc;

use crate::adapter::Adapter;
use crate::defs::{ScsiOp, MAX_BYTE_OFFSET};
use crate::error::{Direction, ScsiError};
use crate::priority::ExecutionContext;
use crate::request::{Request, RequestHandle};
use crate::unit::{Geometry, LogicalUnit};
use crate::worker::WorkItem;

/// Decoded data-moving command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub direction: Direction,
    pub sector: u64,
    /// Byte offset of `sector` on the unit.
    pub offset: u64,
    pub blocks: u64,
    /// Bytes to move; the request's transfer length.
    pub length: usize,
}

/// Result of the read/write path when it does not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RwOutcome {
    Complete(usize),
    Queued,
}

/// Decodes the LBA and checks that it can be scaled to a byte offset.
///
/// Only READ/WRITE opcodes are accepted; anything else is an illegal request.
pub fn decode_transfer(
    cdb: &[u8; 16],
    transfer_length: u32,
    geometry: &Geometry,
) -> Result<Transfer, ScsiError> {
    let op = ScsiOp(cdb[0]);
    let direction = if op.is_read() {
        Direction::Read
    } else if op.is_write() {
        Direction::Write
    } else {
        return Err(ScsiError::IllegalRequest);
    };

    let sector = match op {
        ScsiOp::READ16 | ScsiOp::WRITE16 => {
            u64::from_be_bytes([
                cdb[2], cdb[3], cdb[4], cdb[5], cdb[6], cdb[7], cdb[8], cdb[9],
            ])
        }
        _ => u64::from(u32::from_be_bytes([cdb[2], cdb[3], cdb[4], cdb[5]])),
    };

    let power = geometry.block_power();
    if sector & !(MAX_BYTE_OFFSET >> power) != 0 {
        tracing::debug!(sector, power, "sector address overflows byte offset");
        return Err(ScsiError::IllegalBlock);
    }

    Ok(Transfer {
        direction,
        sector,
        offset: sector << power,
        blocks: u64::from(transfer_length) >> power,
        length: transfer_length as usize,
    })
}

/// Rejects transfers that end past the last block.
pub fn check_bounds(transfer: &Transfer, geometry: &Geometry) -> Result<(), ScsiError> {
    match transfer.sector.checked_add(transfer.blocks) {
        Some(end) if end <= geometry.block_count() => Ok(()),
        _ => Err(ScsiError::IllegalBlock),
    }
}

pub(crate) fn read_write(
    adapter: &Arc<Adapter>,
    unit: &Arc<LogicalUnit>,
    handle: &RequestHandle,
    req: &mut Request,
    cx: &ExecutionContext,
) -> Result<RwOutcome, ScsiError> {
    let device = unit.device();
    let geometry = unit.geometry();
    let transfer = decode_transfer(&req.cdb, req.data_transfer_length, geometry)?;

    tracing::trace!(
        %device,
        direction = %transfer.direction,
        sector = transfer.sector,
        blocks = transfer.blocks,
        length = transfer.length,
        "read/write"
    );

    if !unit.is_initialized() {
        return Err(ScsiError::NotReady);
    }
    if unit.is_stopping() {
        tracing::debug!(%device, "request for stopping unit");
        return Err(ScsiError::NotPresent);
    }
    if transfer.direction == Direction::Write && unit.is_read_only() {
        tracing::debug!(%device, "write to read-only unit");
        return Err(ScsiError::DataProtect);
    }
    if let Err(err) = check_bounds(&transfer, geometry) {
        tracing::debug!(
            %device,
            sector = transfer.sector,
            blocks = transfer.blocks,
            block_count = geometry.block_count(),
            "access beyond end of unit"
        );
        return Err(err);
    }

    let Some(buffer) = req.data_buffer_mut() else {
        tracing::warn!(%device, length = transfer.length, "data buffer translation failed");
        return Err(ScsiError::HardwareError);
    };

    if let Some(direct) = unit.direct_handle() {
        let io = match transfer.direction {
            Direction::Read => direct.read_at(transfer.offset, buffer),
            Direction::Write => direct.write_at(transfer.offset, buffer),
        };
        return match io {
            Ok(()) => Ok(RwOutcome::Complete(transfer.length)),
            Err(err) => {
                tracing::debug!(%device, direction = %transfer.direction, %err, "inline I/O failed");
                Err(ScsiError::MediumError(transfer.direction))
            }
        };
    }

    match transfer.direction {
        Direction::Read => {
            if unit.read_cached(transfer.sector, buffer, cx) {
                tracing::debug!(%device, sector = transfer.sector, "intermediate cache hit");
                return Ok(RwOutcome::Complete(transfer.length));
            }
        }
        Direction::Write => {
            unit.invalidate_cache(transfer.offset, transfer.length as u64, cx);
        }
    }

    let item = WorkItem::new(Arc::downgrade(adapter), Arc::clone(unit), handle.clone(), transfer);
    unit.enqueue(item, cx)?;
    Ok(RwOutcome::Queued)
}
