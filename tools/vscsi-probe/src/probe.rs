use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use serde::Serialize;
use vscsi_emu::defs::{ScsiOp, SrbStatus, LUN_LIST_ENTRY_LEN, LUN_LIST_HEADER_LEN, MAX_LUNS};
use vscsi_emu::{
    Adapter, AdapterConfig, BlockBackend, Completion, DeferredWorker, DeviceType,
    ExecutionContext, FileBackend, LogicalUnit, MemBackend, Request, RequestHandle,
    ServiceMode, UnitConfig, UnitSelector, WorkItem,
};

#[derive(Debug, Serialize)]
pub struct UnitReport {
    pub device: String,
    pub device_type: DeviceType,
    pub luns_on_target: Vec<u8>,
    pub vendor: String,
    pub product: String,
    pub revision: String,
    pub max_lba: u32,
    pub block_size: u32,
    pub reads: Vec<ReadReport>,
}

#[derive(Debug, Serialize)]
pub struct ReadReport {
    pub lba: u32,
    pub blocks: u32,
    pub completion: &'static str,
    pub srb_status: u8,
    pub bytes: u32,
    /// Sense key / ASC / ASCQ when the read failed with a check condition.
    pub sense: Option<[u8; 3]>,
}

/// Adapter with every configured unit attached and initialized, plus the workers servicing them.
pub struct Session {
    adapter: Arc<Adapter>,
    units: Vec<(UnitConfig, Arc<LogicalUnit>)>,
    workers: Vec<JoinHandle<()>>,
    completions: mpsc::Receiver<RequestHandle>,
    timeout: Duration,
}

fn open_backend(unit: &UnitConfig) -> anyhow::Result<Arc<dyn BlockBackend>> {
    let backend: Arc<dyn BlockBackend> = match &unit.image {
        Some(path) => Arc::new(
            FileBackend::open(path, unit.read_only)
                .with_context(|| format!("open image {}", path.display()))?,
        ),
        None => {
            let size = usize::try_from(unit.disk_size)
                .with_context(|| format!("disk size {} does not fit in memory", unit.disk_size))?;
            Arc::new(MemBackend::new(size))
        }
    };
    if backend.len() < unit.disk_size {
        bail!(
            "unit {}: backing store holds {} bytes, configured disk size is {}",
            unit.device(),
            backend.len(),
            unit.disk_size
        );
    }
    Ok(backend)
}

fn trimmed_ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end().to_string()
}

fn completion_name(completion: Completion) -> &'static str {
    match completion {
        Completion::Done => "done",
        Completion::Queued => "queued",
    }
}

impl Session {
    pub fn start(config: &AdapterConfig, timeout: Duration) -> anyhow::Result<Self> {
        let cx = ExecutionContext::passive();
        let adapter = Arc::new(config.build_adapter());
        let (tx, completions) = mpsc::channel();
        let mut units = Vec::with_capacity(config.units.len());
        let mut workers = Vec::new();

        for unit_config in &config.units {
            let backend = open_backend(unit_config)?;
            let unit = unit_config.build_unit(backend)?;
            let unit = adapter.attach_unit(Arc::new(unit), &cx)?;

            if unit.mode() == ServiceMode::Deferred {
                let tx = tx.clone();
                let worker = DeferredWorker::new(move |item: WorkItem| {
                    if tx.send(item.request().clone()).is_err() {
                        tracing::debug!(device = %item.unit().device(), "probe no longer waiting");
                    }
                });
                let handle = worker
                    .spawn(Arc::clone(&unit))
                    .with_context(|| format!("spawn worker for {}", unit.device()))?;
                workers.push(handle);
            }

            unit.set_initialized();
            tracing::info!(device = %unit.device(), mode = ?unit.mode(), "unit ready");
            units.push((unit_config.clone(), unit));
        }

        Ok(Self {
            adapter,
            units,
            workers,
            completions,
            timeout,
        })
    }

    /// Dispatches `req` and, if it was queued, waits for its worker to complete it.
    fn execute(&self, req: Request) -> anyhow::Result<(Completion, Request)> {
        let cx = ExecutionContext::dispatch();
        let handle = RequestHandle::new(req);
        let completion = self.adapter.dispatch(&handle, &cx);
        if completion == Completion::Queued {
            loop {
                let done = self
                    .completions
                    .recv_timeout(self.timeout)
                    .context("deferred request did not complete")?;
                if done.ptr_eq(&handle) {
                    break;
                }
            }
        }
        let req = handle.lock().clone();
        Ok((completion, req))
    }

    fn require_success(req: &Request, what: &str) -> anyhow::Result<()> {
        if req.srb_status != SrbStatus::SUCCESS {
            bail!(
                "{what} on {} failed with status {:#04x}",
                req.device,
                req.srb_status_byte()
            );
        }
        Ok(())
    }

    fn probe_unit(
        &self,
        unit_config: &UnitConfig,
        unit: &LogicalUnit,
        lba: u32,
        blocks: u32,
    ) -> anyhow::Result<UnitReport> {
        let device = unit.device();

        let list_len = LUN_LIST_HEADER_LEN + MAX_LUNS * LUN_LIST_ENTRY_LEN;
        let (_, luns) =
            self.execute(Request::new(device, &[ScsiOp::REPORT_LUNS.0], list_len as u32))?;
        Self::require_success(&luns, "REPORT LUNS")?;
        let listed = u32::from_be_bytes([luns.data[0], luns.data[1], luns.data[2], luns.data[3]]);
        let luns_on_target = (0..listed as usize / LUN_LIST_ENTRY_LEN)
            .filter_map(|i| luns.data.get(LUN_LIST_HEADER_LEN + i * LUN_LIST_ENTRY_LEN + 1))
            .copied()
            .collect();

        let (_, inquiry) = self.execute(Request::new(device, &[ScsiOp::INQUIRY.0], 36))?;
        Self::require_success(&inquiry, "INQUIRY")?;

        let (_, capacity) = self.execute(Request::new(device, &[ScsiOp::READ_CAPACITY.0], 8))?;
        Self::require_success(&capacity, "READ CAPACITY")?;
        let max_lba = u32::from_be_bytes([
            capacity.data[0],
            capacity.data[1],
            capacity.data[2],
            capacity.data[3],
        ]);
        let block_size = u32::from_be_bytes([
            capacity.data[4],
            capacity.data[5],
            capacity.data[6],
            capacity.data[7],
        ]);

        let length = blocks
            .checked_mul(block_size)
            .ok_or_else(|| anyhow!("read of {blocks} blocks overflows the transfer length"))?;
        let mut reads = Vec::with_capacity(2);
        // The second read repeats the first so deferred units can answer it from their cache.
        for _ in 0..2 {
            let mut cdb = [0u8; 10];
            cdb[0] = ScsiOp::READ.0;
            cdb[2..6].copy_from_slice(&lba.to_be_bytes());
            let (completion, req) = self.execute(Request::new(device, &cdb, length))?;
            reads.push(ReadReport {
                lba,
                blocks,
                completion: completion_name(completion),
                srb_status: req.srb_status_byte(),
                bytes: req.data_transfer_length,
                sense: req.sense_data().map(|s| [s.key, s.asc, s.ascq]),
            });
        }

        Ok(UnitReport {
            device: device.to_string(),
            device_type: unit_config.device_type,
            luns_on_target,
            vendor: trimmed_ascii(&inquiry.data[8..16]),
            product: trimmed_ascii(&inquiry.data[16..32]),
            revision: trimmed_ascii(&inquiry.data[32..36]),
            max_lba,
            block_size,
            reads,
        })
    }

    pub fn probe_all(&self, lba: u32, blocks: u32) -> anyhow::Result<Vec<UnitReport>> {
        self.units
            .iter()
            .map(|(unit_config, unit)| self.probe_unit(unit_config, unit, lba, blocks))
            .collect()
    }

    /// Reports every unit removed, waits for the workers to drain and flushes the backing stores.
    pub fn shutdown(self) -> anyhow::Result<()> {
        let cx = ExecutionContext::passive();
        if let Err(err) = self.adapter.report_removed(UnitSelector::All, &cx) {
            tracing::debug!(%err, "no units to remove");
        }
        for worker in self.workers {
            worker
                .join()
                .map_err(|_| anyhow!("deferred worker panicked"))?;
        }
        for (_, unit) in &self.units {
            unit.backend()
                .flush()
                .with_context(|| format!("flush backing store of {}", unit.device()))?;
        }
        let detached = self.adapter.detach_stopped(&cx);
        tracing::debug!(count = detached.len(), "units detached");
        Ok(())
    }
}
