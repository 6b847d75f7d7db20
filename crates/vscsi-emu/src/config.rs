//! JSON adapter configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::adapter::{Adapter, AdapterIdentity, DEFAULT_SLOT_CACHE_SIZE};
use crate::backend::BlockBackend;
use crate::request::DeviceNumber;
use crate::unit::{
    DeviceClass, Geometry, GeometryError, LogicalUnit, ServiceMode, UnitFlags,
    DEFAULT_READAHEAD_BYTES,
};

const VENDOR_ID_LEN: usize = 8;
const PRODUCT_ID_LEN: usize = 16;
const PRODUCT_REVISION_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct AdapterConfig {
    pub vendor_id: String,
    pub product_id: String,
    pub product_revision: String,
    #[serde(default)]
    pub serial_prefix: String,
    /// Answer a minimal command set at 0:0:0 so hosts always see one unit.
    #[serde(default = "default_controller_unit")]
    pub controller_unit: bool,
    #[serde(default = "default_slot_cache_size")]
    pub slot_cache_size: usize,
    #[serde(default)]
    pub units: Vec<UnitConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Disk,
    Optical,
}

impl From<DeviceType> for DeviceClass {
    fn from(value: DeviceType) -> Self {
        match value {
            DeviceType::Disk => DeviceClass::Disk,
            DeviceType::Optical => DeviceClass::Optical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct UnitConfig {
    pub path_id: u8,
    pub target_id: u8,
    pub lun: u8,
    #[serde(default = "default_device_type")]
    pub device_type: DeviceType,
    #[serde(default)]
    pub removable: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default = "default_block_power")]
    pub block_power: u32,
    pub disk_size: u64,
    /// Backing image; units without one are memory-backed by the host.
    #[serde(default)]
    pub image: Option<PathBuf>,
    /// Service requests synchronously through the backing store instead of the deferred queue.
    #[serde(default)]
    pub inline: bool,
    #[serde(default = "default_readahead_bytes")]
    pub readahead_bytes: u64,
}

fn default_controller_unit() -> bool {
    true
}

fn default_slot_cache_size() -> usize {
    DEFAULT_SLOT_CACHE_SIZE
}

fn default_device_type() -> DeviceType {
    DeviceType::Disk
}

fn default_block_power() -> u32 {
    9
}

fn default_readahead_bytes() -> u64 {
    DEFAULT_READAHEAD_BYTES
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{field} must be at most {max} ASCII characters, got {value:?}")]
    InvalidIdentity {
        field: &'static str,
        max: usize,
        value: String,
    },

    #[error("unit {device}: {source}")]
    InvalidGeometry {
        device: DeviceNumber,
        source: GeometryError,
    },

    #[error("duplicate unit address {0}")]
    DuplicateUnit(DeviceNumber),

    #[error("unit address {0} is reserved for the controller unit")]
    ReservedAddress(DeviceNumber),

    #[error("optical unit {0} must be read-only")]
    WritableOptical(DeviceNumber),
}

fn validate_identity(field: &'static str, value: &str, max: usize) -> Result<(), ConfigError> {
    if value.len() > max || !value.is_ascii() {
        return Err(ConfigError::InvalidIdentity {
            field,
            max,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl AdapterConfig {
    pub fn parse_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_identity("vendor_id", &self.vendor_id, VENDOR_ID_LEN)?;
        validate_identity("product_id", &self.product_id, PRODUCT_ID_LEN)?;
        validate_identity("product_revision", &self.product_revision, PRODUCT_REVISION_LEN)?;
        if !self.serial_prefix.is_ascii() {
            return Err(ConfigError::InvalidIdentity {
                field: "serial_prefix",
                max: self.serial_prefix.len(),
                value: self.serial_prefix.clone(),
            });
        }

        let mut seen = HashSet::new();
        for unit in &self.units {
            let device = unit.device();
            unit.geometry()?;
            if self.controller_unit && device.is_controller() {
                return Err(ConfigError::ReservedAddress(device));
            }
            if unit.device_type == DeviceType::Optical && !unit.read_only {
                return Err(ConfigError::WritableOptical(device));
            }
            if !seen.insert(device) {
                return Err(ConfigError::DuplicateUnit(device));
            }
        }
        Ok(())
    }

    pub fn identity(&self) -> AdapterIdentity {
        AdapterIdentity::new(&self.vendor_id, &self.product_id, &self.product_revision)
            .with_serial_prefix(self.serial_prefix.clone())
    }

    /// Adapter with this configuration's identity and options. Units are attached separately once
    /// their backing stores are open.
    pub fn build_adapter(&self) -> Adapter {
        Adapter::new(self.identity())
            .with_controller_unit(self.controller_unit)
            .with_slot_cache_size(self.slot_cache_size)
    }
}

impl UnitConfig {
    pub fn device(&self) -> DeviceNumber {
        DeviceNumber::new(self.path_id, self.target_id, self.lun)
    }

    pub fn geometry(&self) -> Result<Geometry, ConfigError> {
        Geometry::new(self.block_power, self.disk_size).map_err(|source| {
            ConfigError::InvalidGeometry {
                device: self.device(),
                source,
            }
        })
    }

    pub fn flags(&self) -> UnitFlags {
        let mut flags = UnitFlags::empty();
        flags.set(UnitFlags::REMOVABLE, self.removable);
        flags.set(UnitFlags::READ_ONLY, self.read_only);
        flags
    }

    pub fn build_unit(&self, backend: Arc<dyn BlockBackend>) -> Result<LogicalUnit, ConfigError> {
        let mode = if self.inline {
            ServiceMode::Inline
        } else {
            ServiceMode::Deferred
        };
        Ok(LogicalUnit::new(
            self.device(),
            self.device_type.into(),
            self.flags(),
            self.geometry()?,
            backend,
        )
        .with_mode(mode)
        .with_readahead(self.readahead_bytes))
    }
}
