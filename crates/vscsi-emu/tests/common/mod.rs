#![allow(dead_code)]

use std::sync::Arc;

use vscsi_emu::defs::ScsiOp;
use vscsi_emu::{
    Adapter, AdapterIdentity, BlockBackend, Completion, DeviceClass, DeviceNumber,
    ExecutionContext, Geometry, LogicalUnit, MemBackend, Request, RequestHandle, UnitFlags,
};

pub const DISK: DeviceNumber = DeviceNumber::new(0, 1, 0);
pub const OPTICAL: DeviceNumber = DeviceNumber::new(0, 2, 0);

pub fn adapter() -> Arc<Adapter> {
    Arc::new(Adapter::new(AdapterIdentity::new("ACME", "VDISK", "1.0").with_serial_prefix("SN")))
}

pub fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Attaches a disk unit backed by `backend`. The unit is left uninitialized.
pub fn attach(
    adapter: &Adapter,
    device: DeviceNumber,
    class: DeviceClass,
    flags: UnitFlags,
    block_power: u32,
    backend: Arc<dyn BlockBackend>,
) -> Arc<LogicalUnit> {
    let cx = ExecutionContext::passive();
    let geometry = Geometry::new(block_power, backend.len()).unwrap();
    let unit = LogicalUnit::new(device, class, flags, geometry, backend);
    adapter.attach_unit(Arc::new(unit), &cx).unwrap()
}

/// 1 MiB disk of 512-byte blocks with patterned contents, initialized.
pub fn ready_disk(adapter: &Adapter) -> (Arc<LogicalUnit>, Arc<MemBackend>) {
    let backend = Arc::new(MemBackend::from_vec(patterned(1 << 20)));
    let unit = attach(
        adapter,
        DISK,
        DeviceClass::Disk,
        UnitFlags::empty(),
        9,
        backend.clone(),
    );
    unit.set_initialized();
    (unit, backend)
}

pub fn cdb10(op: ScsiOp, lba: u32) -> [u8; 16] {
    let mut cdb = [0u8; 16];
    cdb[0] = op.0;
    cdb[2..6].copy_from_slice(&lba.to_be_bytes());
    cdb
}

pub fn cdb16(op: ScsiOp, lba: u64) -> [u8; 16] {
    let mut cdb = [0u8; 16];
    cdb[0] = op.0;
    cdb[2..10].copy_from_slice(&lba.to_be_bytes());
    cdb
}

/// Dispatches from a fresh dispatch-level context.
pub fn dispatch(adapter: &Arc<Adapter>, req: Request) -> (Completion, RequestHandle) {
    let cx = ExecutionContext::dispatch();
    let handle = RequestHandle::new(req);
    let completion = adapter.dispatch(&handle, &cx);
    (completion, handle)
}

pub fn snapshot(handle: &RequestHandle) -> Request {
    let req = handle.lock().clone();
    req
}
