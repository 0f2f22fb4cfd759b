//! Automation registry: the compiled, matchable set of active automations.
//!
//! The registry is shared read-mostly state. Every mutation swaps whole
//! entries under a write lock, so readers never see a half-updated
//! automation. Definitions that fail to compile are quarantined: they are
//! kept out of matching and their rejection reason is retained.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use convoflow_domain::automation::{Automation, CompiledAutomation, TriggerType};
use convoflow_domain::id::{AutomationId, OwnerId};
use serde::Serialize;

/// An automation held back because its definition is broken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarantinedAutomation {
    pub id: AutomationId,
    pub name: String,
    pub reason: String,
}

/// Where an automation ended up after [`AutomationRegistry::upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Active,
    Inactive,
    Quarantined(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub active: usize,
    pub quarantined: usize,
}

#[derive(Default)]
struct RegistryState {
    active: HashMap<AutomationId, Arc<CompiledAutomation>>,
    quarantined: HashMap<AutomationId, QuarantinedAutomation>,
}

#[derive(Default)]
pub struct AutomationRegistry {
    state: RwLock<RegistryState>,
}

impl AutomationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole registry with `automations`.
    pub fn load(&self, automations: Vec<Automation>) -> LoadReport {
        let mut next = RegistryState::default();
        for automation in automations {
            place(&mut next, automation);
        }
        let report = LoadReport {
            active: next.active.len(),
            quarantined: next.quarantined.len(),
        };
        *self.write() = next;
        report
    }

    /// Insert or replace one automation. Inactive automations are evicted.
    pub fn upsert(&self, automation: Automation) -> Registration {
        let mut state = self.write();
        state.active.remove(&automation.id);
        state.quarantined.remove(&automation.id);
        place(&mut state, automation)
    }

    pub fn remove(&self, id: AutomationId) {
        let mut state = self.write();
        state.active.remove(&id);
        state.quarantined.remove(&id);
    }

    /// The active, compiled automation with `id`.
    #[must_use]
    pub fn get(&self, id: AutomationId) -> Option<Arc<CompiledAutomation>> {
        self.read().active.get(&id).cloned()
    }

    /// Active automations of `owner_id` with a trigger of `trigger_type`,
    /// ordered by name then id.
    #[must_use]
    pub fn active_by_trigger(
        &self,
        owner_id: OwnerId,
        trigger_type: TriggerType,
    ) -> Vec<Arc<CompiledAutomation>> {
        self.collect(|a| a.owner_id() == owner_id && a.trigger().trigger_type() == trigger_type)
    }

    /// Every active schedule automation, across owners.
    #[must_use]
    pub fn schedules(&self) -> Vec<Arc<CompiledAutomation>> {
        self.collect(|a| a.trigger().trigger_type() == TriggerType::Schedule)
    }

    #[must_use]
    pub fn quarantined(&self) -> Vec<QuarantinedAutomation> {
        let mut list: Vec<_> = self.read().quarantined.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().active.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn collect(&self, keep: impl Fn(&CompiledAutomation) -> bool) -> Vec<Arc<CompiledAutomation>> {
        let mut list: Vec<_> = self
            .read()
            .active
            .values()
            .filter(|a| keep(a))
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            a.definition()
                .name
                .cmp(&b.definition().name)
                .then_with(|| a.id().as_uuid().cmp(&b.id().as_uuid()))
        });
        list
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn place(state: &mut RegistryState, automation: Automation) -> Registration {
    if !automation.active {
        return Registration::Inactive;
    }
    let id = automation.id;
    let name = automation.name.clone();
    match automation.compile() {
        Ok(compiled) => {
            state.active.insert(id, Arc::new(compiled));
            Registration::Active
        }
        Err(err) => {
            let reason = err.to_string();
            tracing::warn!(automation_id = %id, %reason, "automation quarantined");
            state.quarantined.insert(
                id,
                QuarantinedAutomation {
                    id,
                    name,
                    reason: reason.clone(),
                },
            );
            Registration::Quarantined(reason)
        }
    }
}
