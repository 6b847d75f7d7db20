//! SCSI wire constants: operation codes, request/SCSI status values, sense triples and the fixed
//! response layout sizes the emulation handlers produce.

use core::fmt;

/// SCSI operation code (CDB byte 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScsiOp(pub u8);

impl ScsiOp {
    pub const TEST_UNIT_READY: Self = Self(0x00);
    pub const INQUIRY: Self = Self(0x12);
    pub const MODE_SENSE: Self = Self(0x1A);
    pub const START_STOP_UNIT: Self = Self(0x1B);
    pub const MEDIUM_REMOVAL: Self = Self(0x1E);
    pub const READ_CAPACITY: Self = Self(0x25);
    pub const READ: Self = Self(0x28);
    pub const WRITE: Self = Self(0x2A);
    pub const VERIFY: Self = Self(0x2F);
    pub const SYNCHRONIZE_CACHE: Self = Self(0x35);
    pub const UNMAP: Self = Self(0x42);
    pub const READ_TOC: Self = Self(0x43);
    pub const GET_CONFIGURATION: Self = Self(0x46);
    pub const READ_DISC_INFORMATION: Self = Self(0x51);
    pub const READ_TRACK_INFORMATION: Self = Self(0x52);
    pub const MODE_SENSE10: Self = Self(0x5A);
    pub const READ16: Self = Self(0x88);
    pub const WRITE16: Self = Self(0x8A);
    pub const VERIFY16: Self = Self(0x8F);
    pub const SYNCHRONIZE_CACHE16: Self = Self(0x91);
    pub const SERVICE_ACTION_IN16: Self = Self(0x9E);
    pub const REPORT_LUNS: Self = Self(0xA0);

    pub fn is_read(self) -> bool {
        self == Self::READ || self == Self::READ16
    }

    pub fn is_write(self) -> bool {
        self == Self::WRITE || self == Self::WRITE16
    }
}

impl fmt::Display for ScsiOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Request-block status reported back to the host integration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SrbStatus(pub u8);

impl SrbStatus {
    pub const PENDING: Self = Self(0x00);
    pub const SUCCESS: Self = Self(0x01);
    pub const ERROR: Self = Self(0x04);
    pub const BUSY: Self = Self(0x05);
    pub const NO_DEVICE: Self = Self(0x08);
    pub const DATA_OVERRUN: Self = Self(0x12);
}

/// Flag OR-ed into the status byte when the sense buffer holds valid sense data.
pub const SRB_STATUS_AUTOSENSE_VALID: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScsiStatus(pub u8);

impl ScsiStatus {
    pub const GOOD: Self = Self(0x00);
    pub const CHECK_CONDITION: Self = Self(0x02);
}

pub const SENSE_NOT_READY: u8 = 0x02;
pub const SENSE_MEDIUM_ERROR: u8 = 0x03;
pub const SENSE_HARDWARE_ERROR: u8 = 0x04;
pub const SENSE_ILLEGAL_REQUEST: u8 = 0x05;
pub const SENSE_DATA_PROTECT: u8 = 0x07;

pub const ASC_NO_SENSE: u8 = 0x00;
pub const ASC_LUN_NOT_READY: u8 = 0x04;
pub const ASC_WRITE_ERROR: u8 = 0x0C;
pub const ASC_UNRECOVERED_READ_ERROR: u8 = 0x11;
pub const ASC_ILLEGAL_BLOCK: u8 = 0x21;
pub const ASC_INVALID_CDB: u8 = 0x24;
pub const ASC_WRITE_PROTECT: u8 = 0x27;

pub const ASCQ_BECOMING_READY: u8 = 0x01;

/// Sense key / additional sense code / qualifier triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sense {
    pub key: u8,
    pub asc: u8,
    pub ascq: u8,
}

impl Sense {
    pub const fn new(key: u8, asc: u8, ascq: u8) -> Self {
        Self { key, asc, ascq }
    }
}

/// Fixed-format sense data length (response code 0x70).
pub const SENSE_DATA_LEN: usize = 18;
pub const SENSE_RESPONSE_CODE_CURRENT: u8 = 0x70;

pub const DIRECT_ACCESS_DEVICE: u8 = 0x00;
pub const READ_ONLY_DIRECT_ACCESS_DEVICE: u8 = 0x05;
pub const ARRAY_CONTROLLER_DEVICE: u8 = 0x0C;

pub const INQUIRY_ENABLE_VPD: u8 = 0x01;
pub const INQUIRY_DATA_LEN: usize = 36;
pub const INQUIRY_REMOVABLE_MEDIA: u8 = 0x80;
pub const INQUIRY_COMMAND_QUEUE: u8 = 0x02;
pub const T10_VERSION_SPC3: u8 = 0x05;
pub const T10_RESPONSE_DATA_SPC3: u8 = 0x02;

pub const VPD_SUPPORTED_PAGES: u8 = 0x00;
pub const VPD_SERIAL_NUMBER: u8 = 0x80;
pub const VPD_DEVICE_IDENTIFIERS: u8 = 0x83;
pub const VPD_PAGE_HEADER_LEN: usize = 4;
pub const VPD_SERIAL_NUMBER_LEN: usize = 40;
pub const VPD_CODE_SET_ASCII: u8 = 2;
pub const VPD_IDENTIFIER_TYPE_VENDOR_ID: u8 = 1;

pub const READ_CAPACITY_DATA_LEN: usize = 8;
/// Meaningful prefix of the READ CAPACITY(16) response (LBA + block length).
pub const READ_CAPACITY_DATA_EX_LEN: usize = 12;
pub const READ_CAPACITY16_DATA_LEN: usize = 32;
pub const SERVICE_ACTION_READ_CAPACITY16: u8 = 0x10;

pub const MODE_PARAMETER_HEADER_LEN: usize = 4;
pub const MODE_PARAMETER_HEADER10_LEN: usize = 8;
pub const MODE_DSP_WRITE_PROTECT: u8 = 0x80;
/// Medium type code for removable media in the mode parameter header.
pub const MEDIUM_TYPE_REMOVABLE: u8 = 0x0B;

pub const READ_TOC_FORMAT_TOC: u8 = 0x00;
pub const READ_TOC_FORMAT_SESSION: u8 = 0x01;
pub const READ_TOC_FORMAT_FULL_TOC: u8 = 0x02;
pub const READ_TOC_FORMAT_PMA: u8 = 0x03;
pub const READ_TOC_FORMAT_ATIP: u8 = 0x04;
pub const TOC_DATA_TRACK: u8 = 0x04;
pub const CDROM_TOC_HEADER_LEN: usize = 4;
pub const TRACK_DATA_LEN: usize = 8;
/// TOC header plus exactly one track descriptor.
pub const CDROM_TOC_LEN: usize = CDROM_TOC_HEADER_LEN + TRACK_DATA_LEN;

pub const GET_CONFIGURATION_HEADER_LEN: usize = 8;
pub const PROFILE_DVD_ROM: u16 = 0x0010;

pub const DISC_INFORMATION_MIN_LEN: usize = 4;
pub const DISC_INFORMATION_LEN: usize = 34;
pub const TRACK_INFORMATION_MIN_LEN: usize = 4;

pub const LUN_LIST_HEADER_LEN: usize = 8;
pub const LUN_LIST_ENTRY_LEN: usize = 8;
pub const MAX_LUNS: usize = 256;

/// Largest byte offset a unit may address; sector offsets must stay below it after scaling.
pub const MAX_BYTE_OFFSET: u64 = i64::MAX as u64;
