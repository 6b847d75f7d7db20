//! Plug-and-play requests: whole-adapter removal and per-unit capability queries.

use bitflags::bitflags;

use crate::adapter::{Adapter, UnitSelector};
use crate::defs::SrbStatus;
use crate::error::ScsiError;
use crate::priority::ExecutionContext;
use crate::request::DeviceNumber;

/// Size of the capabilities record: version (u16), reserved (u16), flags (u32), little-endian.
pub const DEVICE_CAPABILITIES_LEN: usize = 8;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeviceCapabilities: u32 {
        const DEVICE_D1 = 1 << 0;
        const DEVICE_D2 = 1 << 1;
        const LOCK_SUPPORTED = 1 << 2;
        const EJECT_SUPPORTED = 1 << 3;
        const REMOVABLE = 1 << 4;
        const DOCK_DEVICE = 1 << 5;
        const UNIQUE_ID = 1 << 6;
        const SILENT_INSTALL = 1 << 7;
        const SURPRISE_REMOVAL_OK = 1 << 8;
        const NO_DISPLAY_IN_UI = 1 << 9;
    }
}

impl DeviceCapabilities {
    pub fn to_bytes(self) -> [u8; DEVICE_CAPABILITIES_LEN] {
        let mut out = [0u8; DEVICE_CAPABILITIES_LEN];
        out[4..8].copy_from_slice(&self.bits().to_le_bytes());
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PnpAction {
    RemoveDevice,
    QueryCapabilities,
    Other(u8),
}

#[derive(Debug, Clone)]
pub struct PnpRequest {
    pub device: DeviceNumber,
    pub action: PnpAction,
    pub data: Vec<u8>,
    pub data_transfer_length: u32,
    pub srb_status: SrbStatus,
}

impl PnpRequest {
    pub fn new(device: DeviceNumber, action: PnpAction, transfer_length: u32) -> Self {
        Self {
            device,
            action,
            data: vec![0; transfer_length as usize],
            data_transfer_length: transfer_length,
            srb_status: SrbStatus::PENDING,
        }
    }

    fn fail(&mut self, status: SrbStatus) {
        self.srb_status = status;
        self.data_transfer_length = 0;
    }
}

impl Adapter {
    pub fn pnp(&self, req: &mut PnpRequest, cx: &ExecutionContext) {
        tracing::trace!(device = %req.device, action = ?req.action, "pnp");
        match req.action {
            PnpAction::RemoveDevice => {
                if let Ok(count) = self.report_removed(UnitSelector::All, cx) {
                    tracing::debug!(count, "pnp remove device");
                }
                req.srb_status = SrbStatus::SUCCESS;
            }
            PnpAction::QueryCapabilities => {
                self.query_capabilities(req, cx);
            }
            PnpAction::Other(_) => req.srb_status = SrbStatus::SUCCESS,
        }
    }

    /// Capabilities of the live, initialized unit at `device`.
    pub fn capabilities(
        &self,
        device: DeviceNumber,
        cx: &ExecutionContext,
    ) -> Result<DeviceCapabilities, ScsiError> {
        let unit = self.resolve_unit(device, cx).ok_or(ScsiError::NotPresent)?;
        if !unit.is_initialized() {
            return Err(ScsiError::NotReady);
        }
        let mut caps = DeviceCapabilities::EJECT_SUPPORTED | DeviceCapabilities::SILENT_INSTALL;
        caps.set(DeviceCapabilities::REMOVABLE, unit.is_removable());
        Ok(caps)
    }

    pub fn query_capabilities(&self, req: &mut PnpRequest, cx: &ExecutionContext) {
        let caps = match self.capabilities(req.device, cx) {
            Ok(caps) => caps,
            Err(err) => {
                tracing::debug!(device = %req.device, %err, "capability query failed");
                req.fail(err.srb_status());
                return;
            }
        };

        let len = req.data_transfer_length as usize;
        let Some(buffer) = req.data.get_mut(..len) else {
            tracing::warn!(device = %req.device, len, "data buffer translation failed");
            req.fail(SrbStatus::ERROR);
            return;
        };
        if buffer.len() < DEVICE_CAPABILITIES_LEN {
            req.fail(SrbStatus::DATA_OVERRUN);
            return;
        }
        buffer.fill(0);
        buffer[..DEVICE_CAPABILITIES_LEN].copy_from_slice(&caps.to_bytes());
        req.data_transfer_length = DEVICE_CAPABILITIES_LEN as u32;
        req.srb_status = SrbStatus::SUCCESS;
    }
}
