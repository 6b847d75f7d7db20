//! Request routing: adapter-level commands, the synthetic controller unit, readiness gating and the
//! per-opcode handler table.

use std::sync::Arc;

use crate::adapter::{Adapter, UnitSelector};
use crate::capacity;
use crate::defs::{ScsiOp, SrbStatus};
use crate::error::ScsiError;
use crate::inquiry;
use crate::mode;
use crate::optical;
use crate::priority::ExecutionContext;
use crate::request::{Completion, Request, RequestHandle};
use crate::rw::{self, RwOutcome};
use crate::unit::LogicalUnit;

const START_STOP_START: u8 = 1 << 0;
const START_STOP_LOAD_EJECT: u8 = 1 << 1;

impl Adapter {
    /// Executes one request.
    ///
    /// Returns [`Completion::Queued`] when the request was handed to the deferred worker; its status
    /// stays pending until the worker completes it. The request must not be locked by the caller.
    pub fn dispatch(self: &Arc<Self>, handle: &RequestHandle, cx: &ExecutionContext) -> Completion {
        let mut req = handle.lock();
        let op = req.opcode();
        let device = req.device;
        tracing::trace!(%device, opcode = %op, length = req.data_transfer_length, "dispatch");

        if op == ScsiOp::REPORT_LUNS {
            let result = self.report_luns_request(&mut req, cx);
            req.complete(result);
            return Completion::Done;
        }

        if self.has_controller_unit() && device.is_controller() {
            let result = self.execute_controller_unit(op, &mut req);
            req.complete(result);
            return Completion::Done;
        }

        let Some(unit) = self.resolve_unit(device, cx) else {
            tracing::debug!(%device, opcode = %op, "no unit at address");
            req.complete(Err(ScsiError::NotPresent));
            return Completion::Done;
        };

        if !unit.is_initialized() {
            tracing::debug!(%device, opcode = %op, "unit not ready");
            req.complete(Err(ScsiError::NotReady));
            return Completion::Done;
        }

        if op.is_read() || op.is_write() {
            match rw::read_write(self, &unit, handle, &mut req, cx) {
                Ok(RwOutcome::Complete(tx)) => req.complete(Ok(tx)),
                Ok(RwOutcome::Queued) => {
                    req.srb_status = SrbStatus::PENDING;
                    return Completion::Queued;
                }
                Err(err) => req.complete(Err(err)),
            }
            return Completion::Done;
        }

        let result = self.execute(&unit, op, &mut req, cx);
        if let Err(err) = &result {
            tracing::debug!(%device, opcode = %op, %err, "request failed");
        }
        req.complete(result);
        Completion::Done
    }

    fn execute(
        &self,
        unit: &LogicalUnit,
        op: ScsiOp,
        req: &mut Request,
        cx: &ExecutionContext,
    ) -> Result<usize, ScsiError> {
        if unit.is_stopping() {
            return Err(ScsiError::NotPresent);
        }

        match op {
            ScsiOp::TEST_UNIT_READY
            | ScsiOp::SYNCHRONIZE_CACHE
            | ScsiOp::SYNCHRONIZE_CACHE16
            | ScsiOp::VERIFY
            | ScsiOp::VERIFY16
            | ScsiOp::UNMAP => Ok(0),
            ScsiOp::START_STOP_UNIT => self.start_stop_unit(unit, req, cx),
            ScsiOp::INQUIRY => inquiry::inquiry(self.identity(), unit, req),
            ScsiOp::READ_CAPACITY => capacity::read_capacity(unit.geometry(), req),
            ScsiOp::SERVICE_ACTION_IN16 => capacity::service_action_in16(unit.geometry(), req),
            ScsiOp::READ_TOC => optical::read_toc(unit, req),
            ScsiOp::GET_CONFIGURATION => optical::get_configuration(unit, req),
            ScsiOp::READ_DISC_INFORMATION => optical::read_disc_information(unit, req),
            ScsiOp::READ_TRACK_INFORMATION => optical::read_track_information(unit, req),
            ScsiOp::MEDIUM_REMOVAL => medium_removal(unit, req),
            ScsiOp::MODE_SENSE => mode::mode_sense6(unit, req),
            ScsiOp::MODE_SENSE10 => mode::mode_sense10(unit, req),
            _ => {
                tracing::debug!(device = %unit.device(), opcode = %op, "unknown opcode");
                Err(ScsiError::IllegalRequest)
            }
        }
    }

    /// The unit at 0:0:0 only answers enough for the host to enumerate the adapter.
    fn execute_controller_unit(&self, op: ScsiOp, req: &mut Request) -> Result<usize, ScsiError> {
        match op {
            ScsiOp::TEST_UNIT_READY
            | ScsiOp::SYNCHRONIZE_CACHE
            | ScsiOp::START_STOP_UNIT
            | ScsiOp::VERIFY => Ok(0),
            ScsiOp::INQUIRY => inquiry::controller_inquiry(self.identity(), req),
            _ => {
                tracing::debug!(opcode = %op, "unsupported opcode for controller unit");
                Err(ScsiError::IllegalRequest)
            }
        }
    }

    fn report_luns_request(
        &self,
        req: &mut Request,
        cx: &ExecutionContext,
    ) -> Result<usize, ScsiError> {
        let device = req.device;
        let buffer = req.transfer_buffer()?;
        let len = buffer.len();
        self.report_luns(device.path_id, device.target_id, buffer, cx);
        Ok(len)
    }

    /// LoadEject with Start clear ejects the unit; every other combination is a no-op.
    fn start_stop_unit(
        &self,
        unit: &LogicalUnit,
        req: &mut Request,
        cx: &ExecutionContext,
    ) -> Result<usize, ScsiError> {
        let device = unit.device();
        let flags = req.cdb[4];
        if flags & START_STOP_LOAD_EJECT == 0 || flags & START_STOP_START != 0 {
            tracing::trace!(%device, flags, "start stop unit ignored");
            return Ok(0);
        }

        tracing::debug!(%device, "eject requested");
        match self.report_removed(UnitSelector::One(device), cx) {
            Ok(_) => Ok(req.transfer_length()),
            Err(err) => {
                tracing::debug!(%device, %err, "eject failed");
                Err(ScsiError::IllegalRequest)
            }
        }
    }

    pub fn reset_lun(&self, handle: &RequestHandle) {
        handle.lock().complete(Ok(0));
    }

    pub fn reset_device(&self, handle: &RequestHandle) {
        handle.lock().complete(Ok(0));
    }
}

fn medium_removal(unit: &LogicalUnit, req: &mut Request) -> Result<usize, ScsiError> {
    if !unit.is_removable() {
        return Err(ScsiError::IllegalRequest);
    }
    let buffer = req.transfer_buffer()?;
    buffer.fill(0);
    Ok(buffer.len())
}
