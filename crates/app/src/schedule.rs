//! Schedule tracking: decides which schedule automations fire on a scan.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::NaiveDate;

use convoflow_domain::automation::CompiledAutomation;
use convoflow_domain::id::AutomationId;
use convoflow_domain::time::Timestamp;

/// Remembers the local date each schedule automation last fired on, so a
/// trigger fires at most once per day even though the scan runs several
/// times inside its tolerance window.
#[derive(Debug, Default)]
pub struct ScheduleTracker {
    last_fired: Mutex<HashMap<AutomationId, NaiveDate>>,
}

impl ScheduleTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `automation` should fire at `now`. A `true` answer records
    /// the firing.
    pub fn claim(
        &self,
        automation: &CompiledAutomation,
        now: Timestamp,
        tolerance: chrono::Duration,
    ) -> bool {
        let Some(date) = automation.trigger().schedule_due(now, tolerance) else {
            return false;
        };
        let mut last = self.last_fired.lock().unwrap_or_else(|e| e.into_inner());
        if last.get(&automation.id()) == Some(&date) {
            return false;
        }
        last.insert(automation.id(), date);
        true
    }

    /// Drop bookkeeping for every automation not in `live`.
    pub fn retain(&self, live: &HashSet<AutomationId>) {
        self.last_fired
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|id, _| live.contains(id));
    }

    #[must_use]
    pub fn tracked(&self) -> usize {
        self.last_fired.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
