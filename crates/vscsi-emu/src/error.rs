use core::fmt;

use thiserror::Error;

use crate::defs::{
    Sense, SrbStatus, ASCQ_BECOMING_READY, ASC_ILLEGAL_BLOCK, ASC_INVALID_CDB,
    ASC_LUN_NOT_READY, ASC_NO_SENSE, ASC_UNRECOVERED_READ_ERROR, ASC_WRITE_ERROR,
    ASC_WRITE_PROTECT, SENSE_DATA_PROTECT, SENSE_HARDWARE_ERROR, SENSE_ILLEGAL_REQUEST,
    SENSE_MEDIUM_ERROR, SENSE_NOT_READY,
};

/// Direction of a data-moving command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => f.write_str("read"),
            Direction::Write => f.write_str("write"),
        }
    }
}

/// Per-request failure.
///
/// Every handler returns `Result<usize, ScsiError>`; [`crate::Request::complete`] turns the error
/// into either a plain error status or a check condition carrying [`ScsiError::sense`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScsiError {
    /// Unit unknown, or torn down while the request was in flight.
    #[error("logical unit not present")]
    NotPresent,

    /// Unit known but not initialized yet; the caller should retry.
    #[error("logical unit is becoming ready")]
    NotReady,

    #[error("illegal request")]
    IllegalRequest,

    #[error("write attempted on a read-only unit")]
    DataProtect,

    /// Address overflow or an access past the end of the unit.
    #[error("logical block address out of range")]
    IllegalBlock,

    /// Resource exhaustion or a data buffer that could not be mapped.
    #[error("hardware error")]
    HardwareError,

    #[error("data buffer too small: need {needed} bytes, have {available}")]
    DataOverrun { needed: usize, available: usize },

    /// Plain failure without sense data.
    #[error("request failed")]
    Failed,

    /// Inline backing-store I/O failed.
    #[error("backing store {0} failed")]
    MediumError(Direction),
}

impl ScsiError {
    pub fn srb_status(&self) -> SrbStatus {
        match self {
            ScsiError::NotPresent => SrbStatus::NO_DEVICE,
            ScsiError::NotReady => SrbStatus::BUSY,
            ScsiError::DataOverrun { .. } => SrbStatus::DATA_OVERRUN,
            ScsiError::IllegalRequest
            | ScsiError::DataProtect
            | ScsiError::IllegalBlock
            | ScsiError::HardwareError
            | ScsiError::Failed
            | ScsiError::MediumError(_) => SrbStatus::ERROR,
        }
    }

    /// Sense triple reported with the check condition, or `None` for plain errors.
    pub fn sense(&self) -> Option<Sense> {
        let sense = match self {
            ScsiError::NotPresent | ScsiError::DataOverrun { .. } | ScsiError::Failed => {
                return None
            }
            ScsiError::NotReady => {
                Sense::new(SENSE_NOT_READY, ASC_LUN_NOT_READY, ASCQ_BECOMING_READY)
            }
            ScsiError::IllegalRequest => Sense::new(SENSE_ILLEGAL_REQUEST, ASC_INVALID_CDB, 0),
            ScsiError::DataProtect => Sense::new(SENSE_DATA_PROTECT, ASC_WRITE_PROTECT, 0),
            ScsiError::IllegalBlock => Sense::new(SENSE_HARDWARE_ERROR, ASC_ILLEGAL_BLOCK, 0),
            ScsiError::HardwareError => Sense::new(SENSE_HARDWARE_ERROR, ASC_NO_SENSE, 0),
            ScsiError::MediumError(Direction::Read) => {
                Sense::new(SENSE_MEDIUM_ERROR, ASC_UNRECOVERED_READ_ERROR, 0)
            }
            ScsiError::MediumError(Direction::Write) => {
                Sense::new(SENSE_MEDIUM_ERROR, ASC_WRITE_ERROR, 0)
            }
        };
        Some(sense)
    }

    pub(crate) fn overrun(needed: usize, available: usize) -> Self {
        ScsiError::DataOverrun { needed, available }
    }
}
