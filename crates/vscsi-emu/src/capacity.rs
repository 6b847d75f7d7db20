use crate::defs::{
    READ_CAPACITY16_DATA_LEN, READ_CAPACITY_DATA_EX_LEN, READ_CAPACITY_DATA_LEN,
    SERVICE_ACTION_READ_CAPACITY16,
};
use crate::error::ScsiError;
use crate::request::Request;
use crate::unit::Geometry;

/// READ CAPACITY(10) payload. The LBA saturates at `u32::MAX`.
pub fn read_capacity10_data(geometry: &Geometry) -> [u8; READ_CAPACITY_DATA_LEN] {
    let lba = u32::try_from(geometry.max_lba()).unwrap_or(u32::MAX);
    let mut data = [0u8; READ_CAPACITY_DATA_LEN];
    data[0..4].copy_from_slice(&lba.to_be_bytes());
    data[4..8].copy_from_slice(&(geometry.block_size() as u32).to_be_bytes());
    data
}

pub fn read_capacity16_data(geometry: &Geometry) -> [u8; READ_CAPACITY16_DATA_LEN] {
    let mut data = [0u8; READ_CAPACITY16_DATA_LEN];
    data[0..8].copy_from_slice(&geometry.max_lba().to_be_bytes());
    data[8..12].copy_from_slice(&(geometry.block_size() as u32).to_be_bytes());
    data
}

pub(crate) fn read_capacity(geometry: &Geometry, req: &mut Request) -> Result<usize, ScsiError> {
    let buffer = req.transfer_buffer()?;
    if buffer.len() < READ_CAPACITY_DATA_LEN {
        return Err(ScsiError::overrun(READ_CAPACITY_DATA_LEN, buffer.len()));
    }
    buffer.fill(0);
    buffer[..READ_CAPACITY_DATA_LEN].copy_from_slice(&read_capacity10_data(geometry));
    Ok(READ_CAPACITY_DATA_LEN)
}

/// SERVICE ACTION IN(16); only READ CAPACITY(16) is implemented.
pub(crate) fn service_action_in16(
    geometry: &Geometry,
    req: &mut Request,
) -> Result<usize, ScsiError> {
    let service_action = req.cdb[1] & 0x1F;
    if service_action != SERVICE_ACTION_READ_CAPACITY16 {
        tracing::debug!(service_action, "unsupported service action");
        return Err(ScsiError::IllegalRequest);
    }

    let buffer = req.transfer_buffer()?;
    if buffer.len() < READ_CAPACITY_DATA_EX_LEN {
        return Err(ScsiError::overrun(READ_CAPACITY_DATA_EX_LEN, buffer.len()));
    }
    buffer.fill(0);
    let data = read_capacity16_data(geometry);
    let tx = buffer.len().min(data.len());
    buffer[..tx].copy_from_slice(&data[..tx]);
    Ok(tx)
}
