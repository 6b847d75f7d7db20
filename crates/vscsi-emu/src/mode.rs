use crate::defs::{
    MEDIUM_TYPE_REMOVABLE, MODE_DSP_WRITE_PROTECT, MODE_PARAMETER_HEADER10_LEN,
    MODE_PARAMETER_HEADER_LEN,
};
use crate::error::ScsiError;
use crate::request::Request;
use crate::unit::LogicalUnit;

/// MODE SENSE(6): parameter header only, no mode pages. The mode data length carries the header
/// size and the whole zero-filled transfer length is reported.
pub(crate) fn mode_sense6(unit: &LogicalUnit, req: &mut Request) -> Result<usize, ScsiError> {
    let buffer = req.transfer_buffer()?;
    if buffer.len() < MODE_PARAMETER_HEADER_LEN {
        return Err(ScsiError::overrun(MODE_PARAMETER_HEADER_LEN, buffer.len()));
    }
    buffer.fill(0);

    buffer[0] = MODE_PARAMETER_HEADER_LEN as u8;
    if unit.is_removable() {
        buffer[1] = MEDIUM_TYPE_REMOVABLE;
    }
    if unit.is_read_only() {
        buffer[2] = MODE_DSP_WRITE_PROTECT;
    }
    Ok(buffer.len())
}

/// MODE SENSE(10): parameter header only, no mode pages.
pub(crate) fn mode_sense10(unit: &LogicalUnit, req: &mut Request) -> Result<usize, ScsiError> {
    let buffer = req.transfer_buffer()?;
    if buffer.len() < MODE_PARAMETER_HEADER10_LEN {
        return Err(ScsiError::overrun(MODE_PARAMETER_HEADER10_LEN, buffer.len()));
    }
    buffer.fill(0);

    let mode_data_length = MODE_PARAMETER_HEADER10_LEN as u16;
    buffer[0..2].copy_from_slice(&mode_data_length.to_be_bytes());
    if unit.is_removable() {
        buffer[2] = MEDIUM_TYPE_REMOVABLE;
    }
    if unit.is_read_only() {
        buffer[3] = MODE_DSP_WRITE_PROTECT;
    }
    Ok(buffer.len())
}
