use core::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::defs::{
    ScsiOp, ScsiStatus, Sense, SrbStatus, SENSE_DATA_LEN, SENSE_RESPONSE_CODE_CURRENT,
    SRB_STATUS_AUTOSENSE_VALID,
};
use crate::error::ScsiError;

/// Identity triple of a logical unit: (bus path, target, unit number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceNumber {
    pub path_id: u8,
    pub target_id: u8,
    pub lun: u8,
}

impl DeviceNumber {
    /// Address reserved for the synthetic controller unit.
    pub const CONTROLLER: Self = Self::new(0, 0, 0);

    pub const fn new(path_id: u8, target_id: u8, lun: u8) -> Self {
        Self {
            path_id,
            target_id,
            lun,
        }
    }

    pub fn is_controller(&self) -> bool {
        (self.path_id | self.target_id | self.lun) == 0
    }
}

impl fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path_id, self.target_id, self.lun)
    }
}

/// How the engine left a request after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Status fields are final.
    Done,
    /// Handed to the deferred worker, which completes it later.
    Queued,
}

/// One SCSI command instance.
///
/// `data` is the caller's data buffer; `data_transfer_length` is the requested transfer length on
/// input and the number of bytes transferred on output.
#[derive(Debug, Clone)]
pub struct Request {
    pub device: DeviceNumber,
    pub cdb: [u8; 16],
    pub data: Vec<u8>,
    pub data_transfer_length: u32,
    pub sense: Vec<u8>,
    pub srb_status: SrbStatus,
    pub autosense_valid: bool,
    pub scsi_status: ScsiStatus,
}

impl Request {
    /// Builds a request with a zeroed data buffer of `transfer_length` bytes and a full-size sense
    /// buffer. CDBs longer than 16 bytes are truncated.
    pub fn new(device: DeviceNumber, cdb: &[u8], transfer_length: u32) -> Self {
        let mut cdb16 = [0u8; 16];
        let len = cdb.len().min(cdb16.len());
        cdb16[..len].copy_from_slice(&cdb[..len]);
        Self {
            device,
            cdb: cdb16,
            data: vec![0; transfer_length as usize],
            data_transfer_length: transfer_length,
            sense: vec![0; SENSE_DATA_LEN],
            srb_status: SrbStatus::PENDING,
            autosense_valid: false,
            scsi_status: ScsiStatus::GOOD,
        }
    }

    pub fn with_sense_len(mut self, len: usize) -> Self {
        self.sense = vec![0; len];
        self
    }

    pub fn opcode(&self) -> ScsiOp {
        ScsiOp(self.cdb[0])
    }

    pub fn transfer_length(&self) -> usize {
        self.data_transfer_length as usize
    }

    /// Maps the declared transfer length onto the data buffer.
    ///
    /// Returns `None` when the buffer cannot back the declared length, which handlers report as a
    /// hardware error.
    pub fn data_buffer_mut(&mut self) -> Option<&mut [u8]> {
        let len = self.transfer_length();
        self.data.get_mut(..len)
    }

    pub fn data_buffer(&self) -> Option<&[u8]> {
        self.data.get(..self.transfer_length())
    }

    /// [`Request::data_buffer_mut`] for handlers: a failed mapping is a hardware error.
    pub(crate) fn transfer_buffer(&mut self) -> Result<&mut [u8], ScsiError> {
        let device = self.device;
        let len = self.transfer_length();
        self.data.get_mut(..len).ok_or_else(|| {
            tracing::warn!(%device, len, "data buffer translation failed");
            ScsiError::HardwareError
        })
    }

    /// Status byte as the port driver sees it, including the autosense flag.
    pub fn srb_status_byte(&self) -> u8 {
        let flag = if self.autosense_valid {
            SRB_STATUS_AUTOSENSE_VALID
        } else {
            0
        };
        self.srb_status.0 | flag
    }

    /// Sense triple from the sense buffer, if a check condition populated it.
    pub fn sense_data(&self) -> Option<Sense> {
        if !self.autosense_valid || self.sense.len() < SENSE_DATA_LEN {
            return None;
        }
        Some(Sense::new(self.sense[2] & 0x0F, self.sense[12], self.sense[13]))
    }

    pub fn set_success(&mut self, tx: usize) {
        self.srb_status = SrbStatus::SUCCESS;
        self.scsi_status = ScsiStatus::GOOD;
        self.autosense_valid = false;
        self.data_transfer_length = u32::try_from(tx).unwrap_or(u32::MAX);
    }

    pub fn set_error(&mut self, status: SrbStatus) {
        self.srb_status = status;
        self.scsi_status = ScsiStatus::GOOD;
        self.autosense_valid = false;
        self.data_transfer_length = 0;
    }

    /// Fails the request with autosense.
    ///
    /// Returns `false` when the caller's sense buffer is shorter than the fixed sense data; the
    /// status is still set but no sense bytes are written.
    pub fn set_check_condition(&mut self, status: SrbStatus, sense: Sense) -> bool {
        self.srb_status = status;
        self.autosense_valid = true;
        self.scsi_status = ScsiStatus::CHECK_CONDITION;
        self.data_transfer_length = 0;

        self.sense.fill(0);
        if self.sense.len() < SENSE_DATA_LEN {
            tracing::warn!(
                device = %self.device,
                len = self.sense.len(),
                "insufficient sense data buffer"
            );
            return false;
        }

        self.sense[0] = SENSE_RESPONSE_CODE_CURRENT;
        self.sense[2] = sense.key & 0x0F;
        self.sense[7] = (SENSE_DATA_LEN - 8) as u8;
        self.sense[12] = sense.asc;
        self.sense[13] = sense.ascq;
        true
    }

    /// Applies a handler result through the success / error / check-condition helpers.
    pub fn complete(&mut self, result: Result<usize, ScsiError>) {
        match result {
            Ok(tx) => self.set_success(tx),
            Err(err) => match err.sense() {
                Some(sense) => {
                    self.set_check_condition(err.srb_status(), sense);
                }
                None => self.set_error(err.srb_status()),
            },
        }
    }
}

/// Shared handle to a caller-owned request.
///
/// The dispatcher borrows the request for the duration of one call; a queued request is also held
/// by its work item until the deferred worker completes it.
#[derive(Debug, Clone)]
pub struct RequestHandle(Arc<Mutex<Request>>);

impl RequestHandle {
    pub fn new(request: Request) -> Self {
        Self(Arc::new(Mutex::new(request)))
    }

    pub fn lock(&self) -> MutexGuard<'_, Request> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn ptr_eq(&self, other: &RequestHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Request> for RequestHandle {
    fn from(request: Request) -> Self {
        Self::new(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::{ASC_INVALID_CDB, SENSE_ILLEGAL_REQUEST};

    #[test]
    fn check_condition_writes_fixed_sense() {
        let mut req = Request::new(DeviceNumber::new(0, 1, 0), &[0xFF], 512);
        req.data_transfer_length = 512;
        let sense = Sense::new(SENSE_ILLEGAL_REQUEST, ASC_INVALID_CDB, 0);

        assert!(req.set_check_condition(SrbStatus::ERROR, sense));
        assert_eq!(req.data_transfer_length, 0);
        assert_eq!(req.scsi_status, ScsiStatus::CHECK_CONDITION);
        assert_eq!(req.srb_status_byte(), 0x04 | SRB_STATUS_AUTOSENSE_VALID);
        assert_eq!(req.sense[0], 0x70);
        assert_eq!(req.sense_data(), Some(sense));
    }

    #[test]
    fn short_sense_buffer_is_left_zeroed() {
        let mut req = Request::new(DeviceNumber::new(0, 1, 0), &[0xFF], 0).with_sense_len(8);
        req.sense.fill(0xAA);

        let wrote = req.set_check_condition(
            SrbStatus::ERROR,
            Sense::new(SENSE_ILLEGAL_REQUEST, ASC_INVALID_CDB, 0),
        );

        assert!(!wrote);
        assert!(req.sense.iter().all(|b| *b == 0));
        assert_eq!(req.sense.len(), 8);
        assert_eq!(req.srb_status, SrbStatus::ERROR);
        assert!(req.autosense_valid);
    }

    #[test]
    fn plain_error_zeroes_transfer_length() {
        let mut req = Request::new(DeviceNumber::new(0, 1, 0), &[0x43], 64);
        req.complete(Err(ScsiError::Failed));
        assert_eq!(req.srb_status, SrbStatus::ERROR);
        assert_eq!(req.data_transfer_length, 0);
        assert!(!req.autosense_valid);
    }

    #[test]
    fn plain_error_clears_earlier_check_condition() {
        let mut req = Request::new(DeviceNumber::new(0, 1, 0), &[0x28], 64);
        req.complete(Err(ScsiError::IllegalRequest));
        assert_eq!(req.scsi_status, ScsiStatus::CHECK_CONDITION);

        req.data_transfer_length = 64;
        req.complete(Err(ScsiError::NotPresent));
        assert_eq!(req.srb_status, SrbStatus::NO_DEVICE);
        assert_eq!(req.scsi_status, ScsiStatus::GOOD);
        assert!(!req.autosense_valid);
    }

    #[test]
    fn translation_fails_when_buffer_is_short() {
        let mut req = Request::new(DeviceNumber::new(0, 1, 0), &[0x28], 512);
        req.data.truncate(100);
        assert!(req.data_buffer_mut().is_none());
    }
}
