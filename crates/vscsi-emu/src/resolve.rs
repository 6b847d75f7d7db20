use std::sync::Arc;

use crate::adapter::Adapter;
use crate::priority::ExecutionContext;
use crate::request::DeviceNumber;
use crate::unit::LogicalUnit;

impl Adapter {
    /// Looks up the live unit at `device`.
    ///
    /// The slot cache is consulted first. A hint for a stopping unit resolves to `None` and clears
    /// the slot; a hint whose unit carries a different address is logged and ignored. Otherwise the
    /// unit list is scanned and the first live match is installed in the slot.
    ///
    /// The unit-list lock is held for the whole lookup.
    pub fn resolve_unit(
        &self,
        device: DeviceNumber,
        cx: &ExecutionContext,
    ) -> Option<Arc<LogicalUnit>> {
        let units = self.units.lock(cx);

        if let Some(hint) = self.slots.get(device, cx) {
            if hint.device() != device {
                tracing::warn!(
                    %device,
                    hinted = %hint.device(),
                    "slot cache holds a unit for another address"
                );
            } else if hint.is_stopping() {
                tracing::debug!(%device, "unit is stopping, reporting missing");
                self.slots.invalidate(device, cx);
                return None;
            } else {
                if !hint.is_initialized() {
                    tracing::debug!(%device, "resolved unit is not initialized yet");
                }
                return Some(hint);
            }
        }

        let found = units
            .iter()
            .find(|unit| unit.device() == device && !unit.is_stopping())
            .cloned();
        match found {
            Some(unit) => {
                self.slots.set(device, Arc::clone(&unit), cx);
                tracing::trace!(%device, "unit resolved from list");
                Some(unit)
            }
            None => {
                tracing::trace!(%device, "no unit at address");
                None
            }
        }
    }
}
