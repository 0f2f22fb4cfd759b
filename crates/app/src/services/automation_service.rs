//! Automation service: use-cases for managing automations.
//!
//! Every mutation is written to the repository first and then mirrored into
//! the [`AutomationRegistry`], so matching always reflects the store.

use std::sync::Arc;

use convoflow_domain::automation::Automation;
use convoflow_domain::error::{ConvoFlowError, NotFoundError};
use convoflow_domain::id::AutomationId;

use crate::ports::AutomationRepository;
use crate::registry::{AutomationRegistry, LoadReport, QuarantinedAutomation, Registration};

/// Application service for automation CRUD operations.
pub struct AutomationService<R> {
    repo: R,
    registry: Arc<AutomationRegistry>,
}

impl<R: AutomationRepository> AutomationService<R> {
    /// Create a new service backed by the given repository and registry.
    pub fn new(repo: R, registry: Arc<AutomationRegistry>) -> Self {
        Self { repo, registry }
    }

    /// Create a new automation after validating domain invariants.
    ///
    /// A definition with a broken action chain is stored but quarantined.
    ///
    /// # Errors
    ///
    /// Returns [`ConvoFlowError::Validation`] if invariants fail, or a
    /// storage error propagated from the repository.
    #[tracing::instrument(skip(self, automation), fields(automation_name = %automation.name))]
    pub async fn create_automation(
        &self,
        automation: Automation,
    ) -> Result<(Automation, Registration), ConvoFlowError> {
        automation.validate()?;
        let saved = self.repo.create(automation).await?;
        let registration = self.registry.upsert(saved.clone());
        Ok((saved, registration))
    }

    /// Look up an automation by id, returning an error if not found.
    ///
    /// # Errors
    ///
    /// Returns [`ConvoFlowError::NotFound`] when no automation with `id` exists,
    /// or a storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn get_automation(&self, id: AutomationId) -> Result<Automation, ConvoFlowError> {
        self.repo.get_by_id(id).await?.ok_or_else(|| {
            NotFoundError {
                entity: "Automation",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// List all automations.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_automations(&self) -> Result<Vec<Automation>, ConvoFlowError> {
        self.repo.get_all().await
    }

    /// Update an existing automation.
    ///
    /// # Errors
    ///
    /// Returns [`ConvoFlowError::Validation`] if invariants fail, or a
    /// storage error from the repository.
    #[tracing::instrument(skip(self, automation), fields(automation_id = %automation.id))]
    pub async fn update_automation(
        &self,
        automation: Automation,
    ) -> Result<(Automation, Registration), ConvoFlowError> {
        automation.validate()?;
        let saved = self.repo.update(automation).await?;
        let registration = self.registry.upsert(saved.clone());
        Ok((saved, registration))
    }

    /// Activate or deactivate an automation.
    ///
    /// # Errors
    ///
    /// Returns [`ConvoFlowError::NotFound`] for an unknown id, or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn set_active(
        &self,
        id: AutomationId,
        active: bool,
    ) -> Result<Registration, ConvoFlowError> {
        let mut automation = self.get_automation(id).await?;
        automation.active = active;
        let saved = self.repo.update(automation).await?;
        Ok(self.registry.upsert(saved))
    }

    /// Delete an automation by id.
    ///
    /// Pending continuations of the automation are dropped when they come due.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn delete_automation(&self, id: AutomationId) -> Result<(), ConvoFlowError> {
        self.repo.delete(id).await?;
        self.registry.remove(id);
        Ok(())
    }

    /// Stored automations held out of matching because their chain is broken.
    #[must_use]
    pub fn quarantined(&self) -> Vec<QuarantinedAutomation> {
        self.registry.quarantined()
    }

    /// Rebuild the registry from the repository.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn reload(&self) -> Result<LoadReport, ConvoFlowError> {
        let all = self.repo.get_all().await?;
        Ok(self.registry.load(all))
    }
}
