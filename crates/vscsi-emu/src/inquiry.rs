//! INQUIRY: standard data for ordinary and controller units, and VPD pages 0x00 / 0x80 / 0x83.

use crate::adapter::AdapterIdentity;
use crate::defs::{
    ARRAY_CONTROLLER_DEVICE, INQUIRY_COMMAND_QUEUE, INQUIRY_DATA_LEN, INQUIRY_ENABLE_VPD,
    INQUIRY_REMOVABLE_MEDIA, T10_RESPONSE_DATA_SPC3, T10_VERSION_SPC3, VPD_CODE_SET_ASCII,
    VPD_DEVICE_IDENTIFIERS, VPD_IDENTIFIER_TYPE_VENDOR_ID, VPD_PAGE_HEADER_LEN,
    VPD_SERIAL_NUMBER, VPD_SERIAL_NUMBER_LEN, VPD_SUPPORTED_PAGES,
};
use crate::error::ScsiError;
use crate::request::{DeviceNumber, Request};
use crate::unit::LogicalUnit;

fn standard_inquiry_data(
    identity: &AdapterIdentity,
    device_type: u8,
    removable: bool,
) -> [u8; INQUIRY_DATA_LEN] {
    let mut data = [0u8; INQUIRY_DATA_LEN];
    data[0] = device_type;
    if removable {
        data[1] = INQUIRY_REMOVABLE_MEDIA;
    }
    data[2] = T10_VERSION_SPC3;
    data[3] = T10_RESPONSE_DATA_SPC3;
    data[4] = (INQUIRY_DATA_LEN - 5) as u8;
    data[7] = INQUIRY_COMMAND_QUEUE;
    data[8..16].copy_from_slice(identity.vendor_id());
    data[16..32].copy_from_slice(identity.product_id());
    data[32..36].copy_from_slice(identity.product_revision());
    data
}

fn vpd_requested(req: &Request) -> Option<u8> {
    (req.cdb[1] & INQUIRY_ENABLE_VPD != 0).then_some(req.cdb[2])
}

/// Copies as much of `data` as fits; returns the bytes written.
fn write_truncated(buffer: &mut [u8], data: &[u8]) -> usize {
    let tx = buffer.len().min(data.len());
    buffer[..tx].copy_from_slice(&data[..tx]);
    tx
}

pub(crate) fn inquiry(
    identity: &AdapterIdentity,
    unit: &LogicalUnit,
    req: &mut Request,
) -> Result<usize, ScsiError> {
    let device = unit.device();
    let device_type = unit.class().device_type();
    let vpd_page = vpd_requested(req);
    let buffer = req.transfer_buffer()?;
    buffer.fill(0);

    if let Some(page) = vpd_page {
        return vital_product_data(identity, device, device_type, page, buffer);
    }

    if !unit.is_initialized() {
        tracing::debug!(%device, "inquiry rejected, unit not initialized");
        return Err(ScsiError::NotReady);
    }

    let data = standard_inquiry_data(identity, device_type, unit.is_removable());
    Ok(write_truncated(buffer, &data))
}

/// INQUIRY for the synthetic unit at 0:0:0.
pub(crate) fn controller_inquiry(
    identity: &AdapterIdentity,
    req: &mut Request,
) -> Result<usize, ScsiError> {
    let vpd_page = vpd_requested(req);
    let buffer = req.transfer_buffer()?;
    buffer.fill(0);

    if let Some(page) = vpd_page {
        return vital_product_data(
            identity,
            DeviceNumber::CONTROLLER,
            ARRAY_CONTROLLER_DEVICE,
            page,
            buffer,
        );
    }

    let data = standard_inquiry_data(identity, ARRAY_CONTROLLER_DEVICE, false);
    Ok(write_truncated(buffer, &data))
}

/// Writes a whole VPD page (header plus `payload`) or fails with a data overrun without touching
/// `buffer`.
fn write_vpd_page(
    buffer: &mut [u8],
    device_type: u8,
    page_code: u8,
    payload: &[u8],
) -> Result<usize, ScsiError> {
    let len = VPD_PAGE_HEADER_LEN + payload.len();
    let page_length = u8::try_from(payload.len()).map_err(|_| ScsiError::IllegalRequest)?;
    if buffer.len() < len {
        return Err(ScsiError::overrun(len, buffer.len()));
    }
    buffer[0] = device_type;
    buffer[1] = page_code;
    buffer[2] = 0;
    buffer[3] = page_length;
    buffer[VPD_PAGE_HEADER_LEN..len].copy_from_slice(payload);
    Ok(len)
}

fn serial_number(identity: &AdapterIdentity, device: DeviceNumber) -> [u8; VPD_SERIAL_NUMBER_LEN] {
    let mut serial = [b' '; VPD_SERIAL_NUMBER_LEN];
    for (dst, src) in serial.iter_mut().zip(identity.serial_number(device).bytes()) {
        *dst = src;
    }
    serial
}

fn vital_product_data(
    identity: &AdapterIdentity,
    device: DeviceNumber,
    device_type: u8,
    page: u8,
    buffer: &mut [u8],
) -> Result<usize, ScsiError> {
    tracing::trace!(%device, page, "vpd inquiry");

    match page {
        VPD_SUPPORTED_PAGES => write_vpd_page(
            buffer,
            device_type,
            page,
            &[VPD_SUPPORTED_PAGES, VPD_SERIAL_NUMBER, VPD_DEVICE_IDENTIFIERS],
        ),
        VPD_SERIAL_NUMBER => {
            write_vpd_page(buffer, device_type, page, &serial_number(identity, device))
        }
        VPD_DEVICE_IDENTIFIERS => {
            let serial = identity.serial_number(device);
            let mut identifier = Vec::with_capacity(24 + serial.len());
            identifier.extend_from_slice(identity.vendor_id());
            identifier.extend_from_slice(identity.product_id());
            identifier.extend_from_slice(serial.as_bytes());
            identifier.truncate(u8::MAX as usize - 4);

            let mut descriptor = Vec::with_capacity(4 + identifier.len());
            descriptor.extend_from_slice(&[
                VPD_CODE_SET_ASCII,
                VPD_IDENTIFIER_TYPE_VENDOR_ID,
                0,
                identifier.len() as u8,
            ]);
            descriptor.extend_from_slice(&identifier);
            write_vpd_page(buffer, device_type, page, &descriptor)
        }
        _ => {
            tracing::debug!(%device, page, "unsupported vpd page");
            Err(ScsiError::IllegalRequest)
        }
    }
}
