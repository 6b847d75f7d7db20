use std::sync::Arc;

use crate::defs::{ScsiOp, SrbStatus, MAX_BYTE_OFFSET};
use crate::{
    check_bounds, decode_transfer, read_capacity10_data, Adapter, AdapterIdentity, Completion,
    DeferredWorker, DeviceClass, DeviceNumber, ExecutionContext, Geometry, LogicalUnit,
    MemBackend, Request, RequestHandle, ScsiError, ServiceMode, UnitFlags,
};
use proptest::prelude::*;
use proptest::test_runner::TestCaseResult;

#[derive(Debug, Clone)]
enum Op {
    Write { sector: u32, blocks: u32, fill: u8 },
    Read { sector: u32, blocks: u32 },
}

const MAX_SECTORS: u32 = 256;
const MAX_OPS: usize = 48;
const MAX_BLOCKS: u32 = 16;

fn cdb10(op: ScsiOp, lba: u32) -> [u8; 16] {
    let mut cdb = [0u8; 16];
    cdb[0] = op.0;
    cdb[2..6].copy_from_slice(&lba.to_be_bytes());
    cdb
}

fn op_strategy(sectors: u32) -> BoxedStrategy<Op> {
    let write = (0..sectors, 1..=MAX_BLOCKS, any::<u8>())
        .prop_map(|(sector, blocks, fill)| Op::Write {
            sector,
            blocks,
            fill,
        })
        .boxed();
    let read = (0..sectors, 1..=MAX_BLOCKS)
        .prop_map(|(sector, blocks)| Op::Read { sector, blocks })
        .boxed();
    prop_oneof![1 => write, 2 => read].boxed()
}

fn scenario_strategy() -> BoxedStrategy<(u32, u64, ServiceMode, Vec<Op>)> {
    let mode = prop_oneof![Just(ServiceMode::Deferred), Just(ServiceMode::Inline)];
    let readahead = prop_oneof![Just(0u64), Just(4096u64), Just(64 * 1024u64)];
    (16u32..=MAX_SECTORS, readahead, mode)
        .prop_flat_map(|(sectors, readahead, mode)| {
            (
                Just(sectors),
                Just(readahead),
                Just(mode),
                prop::collection::vec(op_strategy(sectors), 1..MAX_OPS),
            )
        })
        .boxed()
}

/// Dispatches one request and drains the unit queue if it was deferred.
fn run_request<F: Fn(crate::WorkItem)>(
    adapter: &Arc<Adapter>,
    unit: &LogicalUnit,
    worker: &DeferredWorker<F>,
    req: Request,
) -> Request {
    let cx = ExecutionContext::dispatch();
    let handle = RequestHandle::new(req);
    if adapter.dispatch(&handle, &cx) == Completion::Queued {
        worker.run_pending(unit);
    }
    let req = handle.lock().clone();
    req
}

fn run_ops(sectors: u32, readahead: u64, mode: ServiceMode, ops: &[Op]) -> TestCaseResult {
    let size = (sectors as usize) << 9;
    let cx = ExecutionContext::passive();
    let adapter = Arc::new(Adapter::new(AdapterIdentity::default()));
    let device = DeviceNumber::new(0, 1, 0);
    let unit = LogicalUnit::new(
        device,
        DeviceClass::Disk,
        UnitFlags::empty(),
        Geometry::new(9, size as u64).unwrap(),
        Arc::new(MemBackend::new(size)),
    )
    .with_mode(mode)
    .with_readahead(readahead);
    let unit = adapter.attach_unit(Arc::new(unit), &cx).unwrap();
    unit.set_initialized();
    let worker = DeferredWorker::new(|_| {});

    let mut model = vec![0u8; size];
    for op in ops {
        match *op {
            Op::Write {
                sector,
                blocks,
                fill,
            } => {
                let len = (blocks as usize) << 9;
                let mut req = Request::new(device, &cdb10(ScsiOp::WRITE, sector), len as u32);
                req.data.fill(fill);
                let req = run_request(&adapter, &unit, &worker, req);
                let start = (sector as usize) << 9;
                if start + len <= size {
                    prop_assert_eq!(req.srb_status, SrbStatus::SUCCESS);
                    model[start..start + len].fill(fill);
                } else {
                    prop_assert_eq!(req.srb_status, SrbStatus::ERROR);
                    prop_assert_eq!(req.data_transfer_length, 0);
                }
            }
            Op::Read { sector, blocks } => {
                let len = (blocks as usize) << 9;
                let req = Request::new(device, &cdb10(ScsiOp::READ, sector), len as u32);
                let req = run_request(&adapter, &unit, &worker, req);
                let start = (sector as usize) << 9;
                if start + len <= size {
                    prop_assert_eq!(req.srb_status, SrbStatus::SUCCESS);
                    prop_assert_eq!(req.data_transfer_length as usize, len);
                    prop_assert_eq!(&req.data[..], &model[start..start + len]);
                } else {
                    prop_assert_eq!(req.srb_status, SrbStatus::ERROR);
                }
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_reads_match_reference_model((sectors, readahead, mode, ops) in scenario_strategy()) {
        run_ops(sectors, readahead, mode, &ops)?;
    }

    #[test]
    fn prop_bounds_check_matches_block_count(
        block_power in 9u32..=16,
        blocks in 1u64..=4096,
        sector in any::<u32>(),
        count in 0u32..=64,
    ) {
        let geometry = Geometry::new(block_power, blocks << block_power).unwrap();
        let length = count << block_power;
        let transfer = decode_transfer(&cdb10(ScsiOp::READ, sector), length, &geometry).unwrap();
        let in_range = u64::from(sector) + u64::from(count) <= blocks;
        prop_assert_eq!(check_bounds(&transfer, &geometry).is_ok(), in_range);
    }

    #[test]
    fn prop_sector_overflow_is_an_illegal_block(block_power in 9u32..=16, sector in any::<u64>()) {
        let geometry = Geometry::new(block_power, 1 << block_power).unwrap();
        let mut cdb = [0u8; 16];
        cdb[0] = ScsiOp::READ16.0;
        cdb[2..10].copy_from_slice(&sector.to_be_bytes());

        let result = decode_transfer(&cdb, 0, &geometry);
        if sector > MAX_BYTE_OFFSET >> block_power {
            prop_assert_eq!(result, Err(ScsiError::IllegalBlock));
        } else {
            prop_assert_eq!(result.unwrap().offset, sector << block_power);
        }
    }

    #[test]
    fn prop_read_capacity10_saturates(block_power in 9u32..=16, blocks in 1u64..=(1 << 40)) {
        let geometry = Geometry::new(block_power, blocks << block_power).unwrap();
        let data = read_capacity10_data(&geometry);
        let lba = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        prop_assert_eq!(u64::from(lba), (blocks - 1).min(u64::from(u32::MAX)));
        prop_assert_eq!(
            u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            1u32 << block_power
        );
    }
}
