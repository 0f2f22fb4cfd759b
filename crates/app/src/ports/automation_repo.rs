//! Automation repository port: persistence for automation definitions.

use std::future::Future;

use convoflow_domain::automation::{Automation, TriggerType};
use convoflow_domain::error::ConvoFlowError;
use convoflow_domain::id::AutomationId;

/// Repository for persisting and querying [`Automation`]s.
pub trait AutomationRepository {
    /// Create a new automation in storage.
    fn create(
        &self,
        automation: Automation,
    ) -> impl Future<Output = Result<Automation, ConvoFlowError>> + Send;

    /// Get an automation by its unique identifier.
    fn get_by_id(
        &self,
        id: AutomationId,
    ) -> impl Future<Output = Result<Option<Automation>, ConvoFlowError>> + Send;

    /// Get all automations, active or not.
    fn get_all(&self) -> impl Future<Output = Result<Vec<Automation>, ConvoFlowError>> + Send;

    /// Get the active automations whose trigger is of `trigger_type`.
    fn find_active_by_trigger_type(
        &self,
        trigger_type: TriggerType,
    ) -> impl Future<Output = Result<Vec<Automation>, ConvoFlowError>> + Send;

    /// Update an existing automation.
    fn update(
        &self,
        automation: Automation,
    ) -> impl Future<Output = Result<Automation, ConvoFlowError>> + Send;

    /// Delete an automation by its unique identifier.
    fn delete(&self, id: AutomationId) -> impl Future<Output = Result<(), ConvoFlowError>> + Send;
}
