//! Automation engine: the context object tying registry, executor and queue.
//!
//! The engine is built once at startup and shared behind an [`Arc`]. It
//! matches inbound trigger events against the registry, runs walks through
//! the [`ActionExecutor`], resumes walks from continuation jobs and scans
//! schedule triggers. Walks are serialized per contact unless
//! [`EngineConfig::serialize_per_contact`] is off.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::sync::{OwnedMutexGuard, watch};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use convoflow_domain::automation::{CompiledAutomation, Trigger, TriggerType};
use convoflow_domain::contact::{Channel, Contact};
use convoflow_domain::error::{ConvoFlowError, NotFoundError};
use convoflow_domain::event::{Event, EventType, TriggerEvent, TriggerEventKind};
use convoflow_domain::id::{AutomationId, ContactId, OwnerId};
use convoflow_domain::job::{ContinuationPayload, JobType};
use convoflow_domain::time::Clock;

use crate::config::{EngineConfig, QueueConfig};
use crate::executor::{ActionExecutor, WalkOutcome, WalkState};
use crate::handlers::{ContinuationHandler, SendMessageHandler};
use crate::ports::{AutomationRepository, ContactStore, EnginePorts, EventPublisher};
use crate::queue::QueueManager;
use crate::registry::{AutomationRegistry, LoadReport};
use crate::schedule::ScheduleTracker;

#[derive(Default)]
struct ContactLocks {
    locks: Mutex<HashMap<ContactId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ContactLocks {
    async fn acquire(&self, id: ContactId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(id).or_default())
        };
        lock.lock_owned().await
    }
}

pub struct AutomationEngine<P: EnginePorts> {
    ports: Arc<P>,
    registry: Arc<AutomationRegistry>,
    queue: Arc<QueueManager<P>>,
    executor: ActionExecutor<P>,
    schedules: ScheduleTracker,
    contact_locks: ContactLocks,
    config: EngineConfig,
}

impl<P: EnginePorts> AutomationEngine<P> {
    /// Build the engine and register the core job handlers.
    pub fn new(
        ports: Arc<P>,
        registry: Arc<AutomationRegistry>,
        config: EngineConfig,
        queue_config: QueueConfig,
    ) -> Arc<Self> {
        let queue = Arc::new(QueueManager::new(Arc::clone(&ports), queue_config));
        queue.register_handler(
            JobType::SendMessage,
            Arc::new(SendMessageHandler::new(Arc::clone(&ports))),
        );
        Arc::new_cyclic(|engine| {
            queue.register_handler(
                JobType::AutomationAction,
                Arc::new(ContinuationHandler::new(engine.clone())),
            );
            Self {
                executor: ActionExecutor::new(Arc::clone(&ports), Arc::clone(&queue), config.clone()),
                ports,
                registry,
                queue,
                schedules: ScheduleTracker::new(),
                contact_locks: ContactLocks::default(),
                config,
            }
        })
    }

    pub fn ports(&self) -> &Arc<P> {
        &self.ports
    }

    pub fn registry(&self) -> &Arc<AutomationRegistry> {
        &self.registry
    }

    pub fn queue(&self) -> &Arc<QueueManager<P>> {
        &self.queue
    }

    /// Load every stored automation and restore unfinished jobs.
    ///
    /// # Errors
    ///
    /// Returns the store error when automations or jobs cannot be listed.
    pub async fn start(&self) -> Result<LoadReport, ConvoFlowError> {
        let automations = self.ports.automations().get_all().await?;
        let report = self.registry.load(automations);
        let restored = self.queue.restore().await?;
        info!(
            active = report.active,
            quarantined = report.quarantined,
            restored_jobs = restored,
            "engine started"
        );
        Ok(report)
    }

    /// Run the queue loops and the schedule scanner until `shutdown` flips.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let queue = Arc::clone(&self.queue);
        tokio::join!(
            queue.run(shutdown.clone()),
            self.schedule_loop(shutdown)
        );
        info!("engine stopped");
    }

    /// Contact lookup plus [`process_incoming_event`](Self::process_incoming_event)
    /// for an inbound text message.
    ///
    /// # Errors
    ///
    /// Returns the contact store error when the contact cannot be resolved.
    #[tracing::instrument(skip(self, text))]
    pub async fn handle_message(
        &self,
        owner_id: OwnerId,
        identifier: &str,
        channel: Channel,
        text: &str,
    ) -> Result<Vec<WalkOutcome>, ConvoFlowError> {
        let contact = self
            .ports
            .contacts()
            .find_or_create(owner_id, identifier, channel)
            .await?;
        let event = TriggerEvent {
            received_at: self.ports.clock().now(),
            ..TriggerEvent::message(owner_id, channel, text)
        };
        Ok(self.process_incoming_event(&contact, &event).await)
    }

    /// Contact lookup plus [`process_incoming_event`](Self::process_incoming_event)
    /// for a button press.
    ///
    /// # Errors
    ///
    /// Returns the contact store error when the contact cannot be resolved.
    #[tracing::instrument(skip(self))]
    pub async fn handle_button_click(
        &self,
        owner_id: OwnerId,
        identifier: &str,
        channel: Channel,
        payload: &str,
    ) -> Result<Vec<WalkOutcome>, ConvoFlowError> {
        let contact = self
            .ports
            .contacts()
            .find_or_create(owner_id, identifier, channel)
            .await?;
        let event = TriggerEvent {
            received_at: self.ports.clock().now(),
            ..TriggerEvent::button_click(owner_id, channel, payload)
        };
        Ok(self.process_incoming_event(&contact, &event).await)
    }

    /// Run every active automation of the contact's owner whose trigger
    /// matches `event`.
    ///
    /// A failing walk is logged and does not stop the others. Later walks
    /// see the contact as earlier walks left it.
    #[tracing::instrument(skip_all, fields(contact_id = %contact.id, owner_id = %event.owner_id))]
    pub async fn process_incoming_event(
        &self,
        contact: &Contact,
        event: &TriggerEvent,
    ) -> Vec<WalkOutcome> {
        let candidates: &[TriggerType] = match &event.kind {
            TriggerEventKind::Message { .. } => &[TriggerType::Keyword, TriggerType::FlowStart],
            TriggerEventKind::ButtonClick { .. } => &[TriggerType::ButtonClick],
            TriggerEventKind::Webhook { .. }
            | TriggerEventKind::Schedule { .. }
            | TriggerEventKind::Manual => &[],
        };

        let mut current = contact.clone();
        let mut outcomes = Vec::new();
        for trigger_type in candidates {
            for automation in self.registry.active_by_trigger(event.owner_id, *trigger_type) {
                if !automation.trigger().matches(&current, event) {
                    continue;
                }
                match self
                    .run_walk(automation, current.clone(), Some(event.clone()))
                    .await
                {
                    Ok(outcome) => {
                        current = outcome.contact.clone();
                        outcomes.push(outcome);
                    }
                    Err(err) => debug!(error = %err, "automation walk failed"),
                }
            }
        }
        outcomes
    }

    /// Run the webhook automation `automation_id` for `contact`.
    ///
    /// # Errors
    ///
    /// Returns [`ConvoFlowError::NotFound`] when no active webhook automation
    /// has that id, or the walk's error.
    #[tracing::instrument(skip(self, contact, data), fields(contact_id = %contact.id))]
    pub async fn handle_webhook(
        &self,
        automation_id: AutomationId,
        contact: Contact,
        data: serde_json::Value,
    ) -> Result<WalkOutcome, ConvoFlowError> {
        let automation = self
            .registry
            .get(automation_id)
            .filter(|a| matches!(a.trigger(), Trigger::Webhook))
            .ok_or_else(|| not_found("Webhook automation", automation_id))?;
        let event = TriggerEvent {
            owner_id: automation.owner_id(),
            channel: contact.channel,
            kind: TriggerEventKind::Webhook {
                automation_id,
                data,
            },
            received_at: self.ports.clock().now(),
        };
        self.run_walk(automation, contact, Some(event)).await
    }

    /// Run an automation directly, bypassing trigger matching.
    ///
    /// # Errors
    ///
    /// Returns [`ConvoFlowError::NotFound`] when the automation is missing,
    /// inactive or quarantined, or the walk's error.
    #[tracing::instrument(skip(self, contact, event), fields(contact_id = %contact.id))]
    pub async fn execute_automation(
        &self,
        automation_id: AutomationId,
        contact: Contact,
        event: Option<TriggerEvent>,
    ) -> Result<WalkOutcome, ConvoFlowError> {
        let automation = self
            .registry
            .get(automation_id)
            .ok_or_else(|| not_found("Automation", automation_id))?;
        self.run_walk(automation, contact, event).await
    }

    /// Resume a walk from a continuation. Returns `None` when the automation
    /// is gone or inactive, the contact no longer exists, or the walk aborted
    /// (the failure is already recorded by the executor).
    ///
    /// # Errors
    ///
    /// Returns the contact store error raised before the walk starts.
    #[tracing::instrument(
        skip_all,
        fields(
            automation_id = %payload.automation_id,
            contact_id = %payload.contact_id,
            action_id = %payload.action_id
        )
    )]
    pub async fn resume_walk(
        &self,
        payload: ContinuationPayload,
    ) -> Result<Option<WalkOutcome>, ConvoFlowError> {
        let Some(automation) = self.registry.get(payload.automation_id) else {
            debug!("automation missing or inactive, dropping continuation");
            return Ok(None);
        };
        let _guard = self.lock_contact(payload.contact_id).await;
        let Some(contact) = self.ports.contacts().get(payload.contact_id).await? else {
            warn!("contact missing, dropping continuation");
            return Ok(None);
        };
        let resumed = self
            .executor
            .resume(automation, contact, payload.trigger_event, payload.action_id)
            .await;
        let outcome = match resumed {
            Ok(outcome) => outcome,
            // Earlier actions of the walk already ran; a retry would replay them.
            Err(ConvoFlowError::Execution(err)) => {
                warn!(error = %err, "resumed walk aborted, continuation not retried");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        self.announce_completion(&outcome).await;
        Ok(Some(outcome))
    }

    /// Fire every schedule automation that is due now. Returns the number of
    /// walks started.
    pub async fn scan_schedules(&self) -> usize {
        let now = self.ports.clock().now();
        let tolerance = chrono::Duration::from_std(self.config.schedule_tolerance)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let schedules = self.registry.schedules();
        self.schedules
            .retain(&schedules.iter().map(|a| a.id()).collect());
        let mut started = 0;
        for automation in schedules {
            if !self.schedules.claim(&automation, now, tolerance) {
                continue;
            }
            let Trigger::Schedule { audience_tags, .. } = automation.trigger() else {
                continue;
            };
            let audience = match self
                .ports
                .contacts()
                .list_by_tags(automation.owner_id(), audience_tags)
                .await
            {
                Ok(audience) => audience,
                Err(err) => {
                    error!(automation_id = %automation.id(), error = %err, "cannot load schedule audience");
                    continue;
                }
            };
            info!(automation_id = %automation.id(), audience = audience.len(), "schedule fired");
            for contact in audience {
                let event = TriggerEvent {
                    owner_id: automation.owner_id(),
                    channel: contact.channel,
                    kind: TriggerEventKind::Schedule { fired_at: now },
                    received_at: now,
                };
                started += 1;
                if let Err(err) = self
                    .run_walk(Arc::clone(&automation), contact, Some(event))
                    .await
                {
                    debug!(error = %err, "scheduled walk failed");
                }
            }
        }
        started
    }

    async fn schedule_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.schedule_scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.scan_schedules().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("schedule scanner stopping");
                        break;
                    }
                }
            }
        }
    }

    async fn run_walk(
        &self,
        automation: Arc<CompiledAutomation>,
        contact: Contact,
        event: Option<TriggerEvent>,
    ) -> Result<WalkOutcome, ConvoFlowError> {
        let _guard = self.lock_contact(contact.id).await;
        // Pick up changes made by a walk that held the lock before us.
        let contact = if self.config.serialize_per_contact {
            self.ports.contacts().get(contact.id).await?.unwrap_or(contact)
        } else {
            contact
        };
        let _ = self
            .ports
            .publisher()
            .publish(Event::new(
                EventType::AutomationTriggered,
                Some(contact.id),
                json!({
                    "automation_id": automation.id(),
                    "automation_name": automation.definition().name,
                }),
            ))
            .await;
        let outcome = self.executor.execute(automation, contact, event).await?;
        self.announce_completion(&outcome).await;
        Ok(outcome)
    }

    async fn announce_completion(&self, outcome: &WalkOutcome) {
        if outcome.state != WalkState::Done {
            return;
        }
        let _ = self
            .ports
            .publisher()
            .publish(Event::new(
                EventType::AutomationCompleted,
                Some(outcome.contact_id),
                json!({
                    "automation_id": outcome.automation_id,
                    "executed": outcome.executed,
                }),
            ))
            .await;
    }

    async fn lock_contact(&self, id: ContactId) -> Option<OwnedMutexGuard<()>> {
        if self.config.serialize_per_contact {
            Some(self.contact_locks.acquire(id).await)
        } else {
            None
        }
    }
}

fn not_found(entity: &'static str, id: AutomationId) -> ConvoFlowError {
    NotFoundError {
        entity,
        id: id.to_string(),
    }
    .into()
}
