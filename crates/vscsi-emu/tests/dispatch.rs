mod common;

use std::sync::Arc;

use common::*;
use pretty_assertions::assert_eq;
use vscsi_emu::defs::{
    ScsiOp, ScsiStatus, Sense, SrbStatus, ASCQ_BECOMING_READY, ASC_ILLEGAL_BLOCK,
    ASC_INVALID_CDB, ASC_LUN_NOT_READY, ASC_WRITE_PROTECT, SENSE_DATA_PROTECT,
    SENSE_HARDWARE_ERROR, SENSE_ILLEGAL_REQUEST, SENSE_NOT_READY, SRB_STATUS_AUTOSENSE_VALID,
};
use vscsi_emu::{
    Completion, DeferredWorker, DeviceClass, DeviceNumber, ExecutionContext, MemBackend,
    Request, UnitFlags, UnitSelector,
};

#[test]
fn read_capacity_and_bounds_on_one_mebibyte_disk() {
    let adapter = adapter();
    ready_disk(&adapter);

    let (completion, handle) =
        dispatch(&adapter, Request::new(DISK, &[ScsiOp::READ_CAPACITY.0], 8));
    let req = snapshot(&handle);
    assert_eq!(completion, Completion::Done);
    assert_eq!(req.srb_status, SrbStatus::SUCCESS);
    assert_eq!(req.data_transfer_length, 8);
    assert_eq!(&req.data[..], &[0, 0, 0x07, 0xFF, 0, 0, 0x02, 0x00]);

    let (completion, handle) = dispatch(
        &adapter,
        Request::new(DISK, &cdb10(ScsiOp::READ, 2040), 8 * 512),
    );
    assert_eq!(completion, Completion::Queued);
    assert_eq!(handle.lock().srb_status, SrbStatus::PENDING);

    let (completion, handle) = dispatch(
        &adapter,
        Request::new(DISK, &cdb10(ScsiOp::READ, 2041), 8 * 512),
    );
    let req = snapshot(&handle);
    assert_eq!(completion, Completion::Done);
    assert_eq!(req.srb_status_byte(), SrbStatus::ERROR.0 | SRB_STATUS_AUTOSENSE_VALID);
    assert_eq!(req.scsi_status, ScsiStatus::CHECK_CONDITION);
    assert_eq!(
        req.sense_data(),
        Some(Sense::new(SENSE_HARDWARE_ERROR, ASC_ILLEGAL_BLOCK, 0))
    );
    assert_eq!(req.data_transfer_length, 0);
}

#[test]
fn inquiry_before_and_after_initialization() {
    let adapter = adapter();
    let unit = attach(
        &adapter,
        DISK,
        DeviceClass::Disk,
        UnitFlags::empty(),
        9,
        Arc::new(MemBackend::new(4096)),
    );

    let (_, handle) = dispatch(&adapter, Request::new(DISK, &[ScsiOp::INQUIRY.0], 36));
    let req = snapshot(&handle);
    assert_eq!(req.srb_status, SrbStatus::BUSY);
    assert_eq!(
        req.sense_data(),
        Some(Sense::new(SENSE_NOT_READY, ASC_LUN_NOT_READY, ASCQ_BECOMING_READY))
    );

    unit.set_initialized();
    let (_, handle) = dispatch(&adapter, Request::new(DISK, &[ScsiOp::INQUIRY.0], 36));
    let req = snapshot(&handle);
    assert_eq!(req.srb_status, SrbStatus::SUCCESS);
    assert_eq!(req.data_transfer_length, 36);
    assert_eq!(req.data[0], 0x00);
    assert_eq!(req.data[4], 31);
    assert_eq!(&req.data[8..16], b"ACME    ");
    assert_eq!(&req.data[16..32], b"VDISK           ");
    assert_eq!(&req.data[32..36], b"1.0 ");
}

#[test]
fn short_mode_sense_buffer_is_an_overrun() {
    let adapter = adapter();
    ready_disk(&adapter);

    let (_, handle) = dispatch(&adapter, Request::new(DISK, &[ScsiOp::MODE_SENSE.0], 3));
    let req = snapshot(&handle);
    assert_eq!(req.srb_status, SrbStatus::DATA_OVERRUN);
    assert!(!req.autosense_valid);
    assert_eq!(req.data_transfer_length, 0);

    let (_, handle) = dispatch(&adapter, Request::new(DISK, &[ScsiOp::MODE_SENSE.0], 4));
    let req = snapshot(&handle);
    assert_eq!(req.srb_status, SrbStatus::SUCCESS);
    assert_eq!(&req.data[..], &[4, 0, 0, 0]);

    let (_, handle) = dispatch(&adapter, Request::new(DISK, &[ScsiOp::MODE_SENSE.0], 192));
    let req = snapshot(&handle);
    assert_eq!(req.srb_status, SrbStatus::SUCCESS);
    assert_eq!(req.data_transfer_length, 192);
    assert_eq!(&req.data[..4], &[4, 0, 0, 0]);
}

#[test]
fn writes_to_read_only_units_are_data_protect() {
    let adapter = adapter();
    let unit = attach(
        &adapter,
        DISK,
        DeviceClass::Disk,
        UnitFlags::READ_ONLY,
        9,
        Arc::new(MemBackend::new(4096)),
    );
    unit.set_initialized();

    let (completion, handle) =
        dispatch(&adapter, Request::new(DISK, &cdb10(ScsiOp::WRITE, 0), 512));
    let req = snapshot(&handle);
    assert_eq!(completion, Completion::Done);
    assert_eq!(
        req.sense_data(),
        Some(Sense::new(SENSE_DATA_PROTECT, ASC_WRITE_PROTECT, 0))
    );
    assert_eq!(unit.pending(&ExecutionContext::passive()), 0);
}

#[test]
fn unknown_address_is_no_device() {
    let adapter = adapter();
    ready_disk(&adapter);

    let (_, handle) = dispatch(
        &adapter,
        Request::new(DeviceNumber::new(0, 4, 0), &[ScsiOp::TEST_UNIT_READY.0], 0),
    );
    let req = snapshot(&handle);
    assert_eq!(req.srb_status, SrbStatus::NO_DEVICE);
    assert!(!req.autosense_valid);
}

#[test]
fn unsupported_opcode_is_invalid_cdb() {
    let adapter = adapter();
    ready_disk(&adapter);

    let (_, handle) = dispatch(&adapter, Request::new(DISK, &[0x04], 0));
    let req = snapshot(&handle);
    assert_eq!(
        req.sense_data(),
        Some(Sense::new(SENSE_ILLEGAL_REQUEST, ASC_INVALID_CDB, 0))
    );
}

#[test]
fn report_luns_lists_live_units_on_the_target() {
    let adapter = adapter();
    for lun in [0, 1, 4] {
        attach(
            &adapter,
            DeviceNumber::new(0, 1, lun),
            DeviceClass::Disk,
            UnitFlags::empty(),
            9,
            Arc::new(MemBackend::new(512)),
        );
    }
    adapter
        .report_removed(
            UnitSelector::One(DeviceNumber::new(0, 1, 1)),
            &ExecutionContext::passive(),
        )
        .unwrap();
    assert!(!adapter.enumeration_done());

    // Units need not be initialized to be listed.
    let (completion, handle) = dispatch(&adapter, Request::new(DISK, &[ScsiOp::REPORT_LUNS.0], 64));
    let req = snapshot(&handle);
    assert_eq!(completion, Completion::Done);
    assert_eq!(req.srb_status, SrbStatus::SUCCESS);
    assert_eq!(req.data_transfer_length, 64);
    assert_eq!(&req.data[..4], &16u32.to_be_bytes());
    assert_eq!(req.data[9], 0);
    assert_eq!(req.data[17], 4);
    assert!(req.data[24..].iter().all(|b| *b == 0));
    assert!(adapter.enumeration_done());
}

#[test]
fn controller_unit_answers_inquiry_only() {
    let adapter = adapter();

    let (_, handle) = dispatch(
        &adapter,
        Request::new(DeviceNumber::CONTROLLER, &[ScsiOp::INQUIRY.0], 96),
    );
    let req = snapshot(&handle);
    assert_eq!(req.srb_status, SrbStatus::SUCCESS);
    assert_eq!(req.data_transfer_length, 36);
    assert_eq!(req.data[0], 0x0C);

    let (_, handle) = dispatch(
        &adapter,
        Request::new(DeviceNumber::CONTROLLER, &[ScsiOp::TEST_UNIT_READY.0], 0),
    );
    assert_eq!(handle.lock().srb_status, SrbStatus::SUCCESS);

    let (_, handle) = dispatch(
        &adapter,
        Request::new(DeviceNumber::CONTROLLER, &[ScsiOp::READ_CAPACITY.0], 8),
    );
    assert_eq!(
        handle.lock().sense_data(),
        Some(Sense::new(SENSE_ILLEGAL_REQUEST, ASC_INVALID_CDB, 0))
    );
}

#[test]
fn eject_stops_the_unit() {
    let adapter = adapter();
    let unit = attach(
        &adapter,
        OPTICAL,
        DeviceClass::Optical,
        UnitFlags::REMOVABLE,
        11,
        Arc::new(MemBackend::new(2048 * 8)),
    );
    unit.set_initialized();

    let mut cdb = [0u8; 6];
    cdb[0] = ScsiOp::START_STOP_UNIT.0;
    cdb[4] = 0x02;
    let (_, handle) = dispatch(&adapter, Request::new(OPTICAL, &cdb, 0));
    assert_eq!(handle.lock().srb_status, SrbStatus::SUCCESS);
    assert!(unit.is_stopping());

    let (_, handle) = dispatch(&adapter, Request::new(OPTICAL, &[ScsiOp::TEST_UNIT_READY.0], 0));
    assert_eq!(handle.lock().srb_status, SrbStatus::NO_DEVICE);
    assert!(adapter
        .resolve_unit(OPTICAL, &ExecutionContext::dispatch())
        .is_none());
}

#[test]
fn optical_units_are_read_only_dvd_rom() {
    let adapter = adapter();
    let unit = attach(
        &adapter,
        OPTICAL,
        DeviceClass::Optical,
        UnitFlags::REMOVABLE,
        11,
        Arc::new(MemBackend::new(2048 * 8)),
    );
    unit.set_initialized();
    assert!(unit.is_read_only());

    let (_, handle) = dispatch(&adapter, Request::new(OPTICAL, &[ScsiOp::INQUIRY.0], 36));
    let req = snapshot(&handle);
    assert_eq!(req.data[0], 0x05);
    assert_eq!(req.data[1], 0x80);

    let (_, handle) = dispatch(&adapter, Request::new(OPTICAL, &[ScsiOp::MODE_SENSE10.0], 8));
    let req = snapshot(&handle);
    assert_eq!(&req.data[..], &[0, 8, 0x0B, 0x80, 0, 0, 0, 0]);

    let (_, handle) = dispatch(&adapter, Request::new(OPTICAL, &[ScsiOp::GET_CONFIGURATION.0], 8));
    let req = snapshot(&handle);
    assert_eq!(req.srb_status, SrbStatus::SUCCESS);
    assert_eq!(&req.data[6..8], &[0x00, 0x10]);
}

#[test]
fn deferred_read_fills_cache_for_following_reads() {
    let adapter = adapter();
    let (unit, _) = ready_disk(&adapter);
    let worker = DeferredWorker::new(|_| {});
    let cx = ExecutionContext::passive();

    let (completion, first) =
        dispatch(&adapter, Request::new(DISK, &cdb10(ScsiOp::READ, 16), 4 * 512));
    assert_eq!(completion, Completion::Queued);
    assert_eq!(unit.pending(&cx), 1);
    assert_eq!(worker.run_pending(&unit), 1);

    let req = snapshot(&first);
    assert_eq!(req.srb_status, SrbStatus::SUCCESS);
    assert_eq!(&req.data[..], &patterned(1 << 20)[16 * 512..20 * 512]);
    assert_eq!(unit.cached_range(&cx), Some((16, 4 * 512 + 64 * 1024)));

    let (completion, second) =
        dispatch(&adapter, Request::new(DISK, &cdb10(ScsiOp::READ, 40), 8 * 512));
    assert_eq!(completion, Completion::Done);
    let req = snapshot(&second);
    assert_eq!(req.srb_status, SrbStatus::SUCCESS);
    assert_eq!(&req.data[..], &patterned(1 << 20)[40 * 512..48 * 512]);
    assert_eq!(unit.pending(&cx), 0);
}

#[test]
fn write_invalidates_overlapping_cache() {
    let adapter = adapter();
    let (unit, backend) = ready_disk(&adapter);
    let worker = DeferredWorker::new(|_| {});
    let cx = ExecutionContext::passive();

    dispatch(&adapter, Request::new(DISK, &cdb10(ScsiOp::READ, 0), 512));
    worker.run_pending(&unit);
    assert!(unit.cached_range(&cx).is_some());

    let mut write = Request::new(DISK, &cdb10(ScsiOp::WRITE, 2), 512);
    write.data.fill(0xEE);
    let (completion, handle) = dispatch(&adapter, write);
    assert_eq!(completion, Completion::Queued);
    assert_eq!(unit.cached_range(&cx), None);
    worker.run_pending(&unit);
    assert_eq!(handle.lock().srb_status, SrbStatus::SUCCESS);
    assert!(backend.snapshot()[1024..1536].iter().all(|b| *b == 0xEE));

    let (completion, handle) =
        dispatch(&adapter, Request::new(DISK, &cdb10(ScsiOp::READ, 2), 512));
    assert_eq!(completion, Completion::Queued);
    worker.run_pending(&unit);
    assert!(handle.lock().data.iter().all(|b| *b == 0xEE));
}

#[test]
fn stopping_unit_completes_queued_work_as_missing() {
    let adapter = adapter();
    let (unit, _) = ready_disk(&adapter);
    let completed = std::sync::Mutex::new(Vec::new());
    let worker = DeferredWorker::new(|item: vscsi_emu::WorkItem| {
        completed.lock().unwrap().push(item.unit().device());
    });

    let (_, handle) = dispatch(&adapter, Request::new(DISK, &cdb10(ScsiOp::READ, 0), 512));
    adapter
        .report_removed(UnitSelector::All, &ExecutionContext::passive())
        .unwrap();
    assert_eq!(worker.run_pending(&unit), 1);
    assert_eq!(handle.lock().srb_status, SrbStatus::NO_DEVICE);
    assert_eq!(*completed.lock().unwrap(), vec![DISK]);
}

#[test]
fn sixteen_byte_reads_and_writes_go_through_the_queue() {
    let adapter = adapter();
    let (unit, backend) = ready_disk(&adapter);
    let worker = DeferredWorker::new(|_| {});

    let mut write = Request::new(DISK, &cdb16(ScsiOp::WRITE16, 2044), 4 * 512);
    write.data.fill(0x3C);
    let (completion, handle) = dispatch(&adapter, write);
    assert_eq!(completion, Completion::Queued);
    assert_eq!(worker.run_pending(&unit), 1);
    assert_eq!(handle.lock().srb_status, SrbStatus::SUCCESS);
    assert!(backend.snapshot()[2044 * 512..].iter().all(|b| *b == 0x3C));

    let (completion, handle) =
        dispatch(&adapter, Request::new(DISK, &cdb16(ScsiOp::READ16, 2044), 4 * 512));
    assert_eq!(completion, Completion::Queued);
    worker.run_pending(&unit);
    let req = snapshot(&handle);
    assert_eq!(req.srb_status, SrbStatus::SUCCESS);
    assert_eq!(req.data_transfer_length, 4 * 512);
    assert!(req.data.iter().all(|b| *b == 0x3C));

    for lba in [2045, 1 << 40, u64::MAX] {
        let (completion, handle) =
            dispatch(&adapter, Request::new(DISK, &cdb16(ScsiOp::READ16, lba), 4 * 512));
        assert_eq!(completion, Completion::Done);
        assert_eq!(
            snapshot(&handle).sense_data(),
            Some(Sense::new(SENSE_HARDWARE_ERROR, ASC_ILLEGAL_BLOCK, 0))
        );
    }
    assert_eq!(unit.pending(&ExecutionContext::passive()), 0);
}

#[test]
fn disk_unit_serves_serial_number_page() {
    let adapter = adapter();
    ready_disk(&adapter);

    let (completion, handle) = dispatch(
        &adapter,
        Request::new(DISK, &[ScsiOp::INQUIRY.0, 0x01, 0x80, 0, 64, 0], 64),
    );
    assert_eq!(completion, Completion::Done);
    let req = snapshot(&handle);
    assert_eq!(req.srb_status, SrbStatus::SUCCESS);
    assert_eq!(req.data_transfer_length, 44);
    assert_eq!(&req.data[..4], &[0x00, 0x80, 0, 40]);
    assert_eq!(&req.data[4..12], b"SN000100");
    assert!(req.data[12..44].iter().all(|b| *b == b' '));
}

#[test]
fn read_starting_before_cached_range_is_queued() {
    let adapter = adapter();
    let (unit, _) = ready_disk(&adapter);
    let worker = DeferredWorker::new(|_| {});
    let cx = ExecutionContext::passive();

    dispatch(&adapter, Request::new(DISK, &cdb10(ScsiOp::READ, 16), 512));
    worker.run_pending(&unit);
    let (start, _) = unit.cached_range(&cx).unwrap();
    assert_eq!(start, 16);

    let (completion, handle) =
        dispatch(&adapter, Request::new(DISK, &cdb10(ScsiOp::READ, 15), 2 * 512));
    assert_eq!(completion, Completion::Queued);
    assert_eq!(unit.pending(&cx), 1);
    worker.run_pending(&unit);
    let req = snapshot(&handle);
    assert_eq!(req.srb_status, SrbStatus::SUCCESS);
    assert_eq!(&req.data[..], &patterned(1 << 20)[15 * 512..17 * 512]);
}
