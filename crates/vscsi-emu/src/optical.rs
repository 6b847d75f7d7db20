//! Minimal read-only optical (DVD-ROM) command subset. Every handler rejects non-optical units.

use crate::defs::{
    CDROM_TOC_LEN, DISC_INFORMATION_LEN, DISC_INFORMATION_MIN_LEN, GET_CONFIGURATION_HEADER_LEN,
    PROFILE_DVD_ROM, READ_TOC_FORMAT_FULL_TOC, READ_TOC_FORMAT_SESSION, READ_TOC_FORMAT_TOC,
    TOC_DATA_TRACK, TRACK_INFORMATION_MIN_LEN,
};
use crate::error::ScsiError;
use crate::request::Request;
use crate::unit::{DeviceClass, LogicalUnit};

fn require_optical(unit: &LogicalUnit) -> Result<(), ScsiError> {
    if unit.class() == DeviceClass::Optical {
        Ok(())
    } else {
        tracing::debug!(device = %unit.device(), "optical command on non-optical unit");
        Err(ScsiError::IllegalRequest)
    }
}

/// Single data track TOC: first = last = track 1. The length field carries the whole layout size
/// and the track descriptor's number byte stays zero.
fn single_track_toc() -> [u8; CDROM_TOC_LEN] {
    let mut toc = [0u8; CDROM_TOC_LEN];
    toc[0..2].copy_from_slice(&(CDROM_TOC_LEN as u16).to_be_bytes());
    toc[2] = 1;
    toc[3] = 1;
    // ADR 1, control: data track.
    toc[5] = 0x10 | TOC_DATA_TRACK;
    toc
}

pub(crate) fn read_toc(unit: &LogicalUnit, req: &mut Request) -> Result<usize, ScsiError> {
    require_optical(unit)?;

    let format = req.cdb[2] & 0x0F;
    let buffer = req.transfer_buffer()?;
    match format {
        READ_TOC_FORMAT_TOC | READ_TOC_FORMAT_SESSION | READ_TOC_FORMAT_FULL_TOC => {
            if buffer.len() < CDROM_TOC_LEN {
                return Err(ScsiError::overrun(CDROM_TOC_LEN, buffer.len()));
            }
            buffer.fill(0);
            buffer[..CDROM_TOC_LEN].copy_from_slice(&single_track_toc());
            Ok(CDROM_TOC_LEN)
        }
        _ => {
            tracing::debug!(device = %unit.device(), format, "unsupported toc format");
            Err(ScsiError::Failed)
        }
    }
}

pub(crate) fn get_configuration(unit: &LogicalUnit, req: &mut Request) -> Result<usize, ScsiError> {
    require_optical(unit)?;

    let buffer = req.transfer_buffer()?;
    if buffer.len() < GET_CONFIGURATION_HEADER_LEN {
        return Err(ScsiError::IllegalRequest);
    }
    buffer.fill(0);
    buffer[6..8].copy_from_slice(&PROFILE_DVD_ROM.to_be_bytes());
    Ok(GET_CONFIGURATION_HEADER_LEN)
}

pub(crate) fn read_disc_information(
    unit: &LogicalUnit,
    req: &mut Request,
) -> Result<usize, ScsiError> {
    require_optical(unit)?;

    let selector = req.cdb[1] >> 5;
    let buffer = req.transfer_buffer()?;
    if buffer.len() < DISC_INFORMATION_MIN_LEN {
        return Err(ScsiError::IllegalRequest);
    }
    buffer.fill(0);

    if selector != 0 {
        tracing::debug!(device = %unit.device(), selector, "unsupported disc information type");
        return Err(ScsiError::Failed);
    }
    if buffer.len() < DISC_INFORMATION_LEN {
        return Err(ScsiError::overrun(DISC_INFORMATION_LEN, buffer.len()));
    }
    buffer[2] = 0x0A;
    buffer[7] = 0x20;
    Ok(DISC_INFORMATION_LEN)
}

/// Track information is not emulated; validated requests fail without sense data.
pub(crate) fn read_track_information(
    unit: &LogicalUnit,
    req: &mut Request,
) -> Result<usize, ScsiError> {
    require_optical(unit)?;

    let buffer = req.transfer_buffer()?;
    if buffer.len() < TRACK_INFORMATION_MIN_LEN {
        return Err(ScsiError::IllegalRequest);
    }
    buffer.fill(0);
    Err(ScsiError::Failed)
}
