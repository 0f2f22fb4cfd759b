//! Action executor: walks an automation's action chain for one contact.
//!
//! A walk segment starts at an action id and follows `next_action_id` links
//! until it reaches the end of the chain ([`WalkState::Done`]), a `delay`
//! that parks the rest of the chain in a continuation job
//! ([`WalkState::Suspended`]), or a broken link ([`WalkState::Halted`]).
//! A failing collaborator aborts the segment with an
//! [`ExecutionError`].
//!
//! A `condition` runs every action id of the selected branch as its own
//! mini-walk and then ends the segment; branches never rejoin the parent
//! chain.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use convoflow_domain::automation::{
    ActionId, ActionKind, AutomationAction, CompiledAutomation, ConditionConfig, DelayConfig,
    SendMessageConfig, TransferHumanConfig, WebhookConfig,
};
use convoflow_domain::contact::Contact;
use convoflow_domain::error::{ConfigurationError, ConvoFlowError, ExecutionError};
use convoflow_domain::event::{Event, EventType, TriggerEvent};
use convoflow_domain::id::{AutomationId, ContactId, JobId, OwnerId};
use convoflow_domain::job::{ContinuationPayload, QueueJob, SendMessagePayload};
use convoflow_domain::time::{Clock, Timestamp};

use crate::config::EngineConfig;
use crate::ports::{
    AnalyticsEvent, AnalyticsSink, ContactStore, EnginePorts, EventPublisher, MessageTemplate,
    TemplateRenderer, WebhookClient, WebhookRequest,
};
use crate::queue::QueueManager;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How a walk segment ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WalkState {
    Done,
    Suspended {
        resume_action_id: ActionId,
        resume_at: Timestamp,
    },
    Halted {
        #[serde(serialize_with = "serialize_display")]
        error: ConfigurationError,
    },
}

fn serialize_display<S: serde::Serializer>(
    error: &ConfigurationError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Report of one walk segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalkOutcome {
    pub automation_id: AutomationId,
    pub contact_id: ContactId,
    /// Action ids in execution order.
    pub executed: Vec<ActionId>,
    pub continuations: Vec<JobId>,
    pub messages: Vec<JobId>,
    pub state: WalkState,
    /// The contact as the last action left it.
    #[serde(skip)]
    pub contact: Contact,
}

struct Walk {
    automation: Arc<CompiledAutomation>,
    contact: Contact,
    event: Option<TriggerEvent>,
    executed: Vec<ActionId>,
    continuations: Vec<JobId>,
    messages: Vec<JobId>,
}

impl Walk {
    fn finish(self, state: WalkState) -> WalkOutcome {
        WalkOutcome {
            automation_id: self.automation.id(),
            contact_id: self.contact.id,
            executed: self.executed,
            continuations: self.continuations,
            messages: self.messages,
            state,
            contact: self.contact,
        }
    }
}

enum Step {
    Continue,
    Finish(WalkState),
}

pub struct ActionExecutor<P: EnginePorts> {
    ports: Arc<P>,
    queue: Arc<QueueManager<P>>,
    config: EngineConfig,
}

impl<P: EnginePorts> ActionExecutor<P> {
    pub fn new(ports: Arc<P>, queue: Arc<QueueManager<P>>, config: EngineConfig) -> Self {
        Self {
            ports,
            queue,
            config,
        }
    }

    /// Walk `automation` from its first action.
    ///
    /// # Errors
    ///
    /// Returns [`ConvoFlowError::Execution`] when an action's collaborator fails.
    #[tracing::instrument(
        skip_all,
        fields(automation_id = %automation.id(), contact_id = %contact.id)
    )]
    pub async fn execute(
        &self,
        automation: Arc<CompiledAutomation>,
        contact: Contact,
        event: Option<TriggerEvent>,
    ) -> Result<WalkOutcome, ConvoFlowError> {
        info!(automation_name = %automation.definition().name, "automation triggered");
        track(
            self.ports.analytics(),
            automation.owner_id(),
            AnalyticsEvent::AutomationTriggered,
            json!({
                "automation_id": automation.id(),
                "contact_id": contact.id,
                "trigger": automation.trigger().trigger_type(),
            }),
        )
        .await;
        let entry = automation.chain().entry().clone();
        self.walk_from(automation, contact, event, entry).await
    }

    /// Continue a suspended walk at `action_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ConvoFlowError::Execution`] when an action's collaborator fails.
    #[tracing::instrument(
        skip_all,
        fields(automation_id = %automation.id(), contact_id = %contact.id, action_id = %action_id)
    )]
    pub async fn resume(
        &self,
        automation: Arc<CompiledAutomation>,
        contact: Contact,
        event: Option<TriggerEvent>,
        action_id: ActionId,
    ) -> Result<WalkOutcome, ConvoFlowError> {
        debug!("resuming walk");
        self.walk_from(automation, contact, event, action_id).await
    }

    async fn walk_from(
        &self,
        automation: Arc<CompiledAutomation>,
        contact: Contact,
        event: Option<TriggerEvent>,
        start: ActionId,
    ) -> Result<WalkOutcome, ConvoFlowError> {
        let owner_id = automation.owner_id();
        let mut walk = Walk {
            automation,
            contact,
            event,
            executed: Vec::new(),
            continuations: Vec::new(),
            messages: Vec::new(),
        };
        let meta = json!({
            "automation_id": walk.automation.id(),
            "contact_id": walk.contact.id,
        });

        match self.run_chain(&mut walk, start).await {
            Ok(state) => {
                match &state {
                    WalkState::Done => {
                        debug!(executed = walk.executed.len(), "walk completed");
                        track(self.ports.analytics(), owner_id, AnalyticsEvent::AutomationCompleted, meta)
                            .await;
                    }
                    WalkState::Suspended {
                        resume_action_id,
                        resume_at,
                    } => {
                        debug!(%resume_action_id, %resume_at, "walk suspended");
                    }
                    WalkState::Halted { error } => {
                        warn!(error = %error, "walk halted on broken configuration");
                        track(
                            self.ports.analytics(),
                            owner_id,
                            AnalyticsEvent::AutomationHalted,
                            with_error(meta, error),
                        )
                        .await;
                    }
                }
                Ok(walk.finish(state))
            }
            Err(err) => {
                error!(error = %err, "walk aborted");
                track(
                    self.ports.analytics(),
                    owner_id,
                    AnalyticsEvent::AutomationFailed,
                    with_error(meta, &err),
                )
                .await;
                let _ = self
                    .ports
                    .publisher()
                    .publish(Event::new(
                        EventType::AutomationFailed,
                        Some(walk.contact.id),
                        json!({"automation_id": walk.automation.id(), "error": err.to_string()}),
                    ))
                    .await;
                Err(err)
            }
        }
    }

    fn run_chain<'a>(
        &'a self,
        walk: &'a mut Walk,
        start: ActionId,
    ) -> BoxFuture<'a, Result<WalkState, ConvoFlowError>> {
        Box::pin(async move {
            let automation = Arc::clone(&walk.automation);
            let mut visited = HashSet::new();
            let mut current = Some(start);
            while let Some(action_id) = current.take() {
                if !visited.insert(action_id.clone()) {
                    return Ok(WalkState::Halted {
                        error: ConfigurationError::Cycle(action_id),
                    });
                }
                let Some(action) = automation.chain().get(&action_id) else {
                    return Ok(WalkState::Halted {
                        error: ConfigurationError::MissingAction(action_id),
                    });
                };
                debug!(action_id = %action.id, action_type = action.kind.type_name(), "executing action");
                walk.executed.push(action.id.clone());
                match self.step(walk, action).await? {
                    Step::Continue => current = action.next_action_id.clone(),
                    Step::Finish(state) => return Ok(state),
                }
            }
            Ok(WalkState::Done)
        })
    }

    async fn step(&self, walk: &mut Walk, action: &AutomationAction) -> Result<Step, ConvoFlowError> {
        let contacts = self.ports.contacts();
        let contact_id = walk.contact.id;
        match &action.kind {
            ActionKind::SendMessage(config) => {
                self.send_message(walk, action, config).await?;
                Ok(Step::Continue)
            }
            ActionKind::AddTag(config) => {
                walk.contact = contacts
                    .add_tag(contact_id, &config.tag)
                    .await
                    .map_err(|e| failed(action, e))?;
                Ok(Step::Continue)
            }
            ActionKind::RemoveTag(config) => {
                walk.contact = contacts
                    .remove_tag(contact_id, &config.tag)
                    .await
                    .map_err(|e| failed(action, e))?;
                Ok(Step::Continue)
            }
            ActionKind::UpdateField(config) => {
                walk.contact = contacts
                    .set_field(contact_id, &config.field, config.value.clone())
                    .await
                    .map_err(|e| failed(action, e))?;
                Ok(Step::Continue)
            }
            ActionKind::Delay(config) => self.delay(walk, action, config).await,
            ActionKind::Condition(config) => self.branch(walk, action, config).await,
            ActionKind::Webhook(config) => {
                self.call_webhook(walk, action, config).await;
                Ok(Step::Continue)
            }
            ActionKind::TransferHuman(config) => {
                self.transfer_human(walk, action, config).await?;
                Ok(Step::Continue)
            }
            ActionKind::Unknown { .. } => Ok(Step::Finish(WalkState::Halted {
                error: ConfigurationError::UnknownActionType(action.id.clone()),
            })),
        }
    }

    async fn send_message(
        &self,
        walk: &mut Walk,
        action: &AutomationAction,
        config: &SendMessageConfig,
    ) -> Result<(), ConvoFlowError> {
        let template = match &config.template_id {
            Some(id) => MessageTemplate::Stored(id),
            None => MessageTemplate::Inline(&config.content),
        };
        let content = self
            .ports
            .templates()
            .render(template, &walk.contact, &config.variables)
            .await
            .map_err(|e| failed(action, e))?;

        let payload = SendMessagePayload {
            automation_id: Some(walk.automation.id()),
            contact_id: walk.contact.id,
            channel: walk.contact.channel,
            recipient: walk.contact.identifier.clone(),
            message_type: config.message_type,
            content,
            media_url: config.media_url.clone(),
        };
        let job = QueueJob::send_message(walk.contact.owner_id, &payload, self.ports.clock().now())
            .and_then(|job| job.with_max_attempts(self.queue.config().default_max_attempts))
            .map_err(|e| failed(action, e.into()))?;
        let job_id = self.queue.add_job(job).await.map_err(|e| failed(action, e))?;
        debug!(job_id = %job_id, "message queued");
        walk.messages.push(job_id);
        Ok(())
    }

    async fn delay(
        &self,
        walk: &mut Walk,
        action: &AutomationAction,
        config: &DelayConfig,
    ) -> Result<Step, ConvoFlowError> {
        let Some(next) = &action.next_action_id else {
            debug!(action_id = %action.id, "delay ends the chain");
            return Ok(Step::Finish(WalkState::Done));
        };
        let now = self.ports.clock().now();
        let Some(resume_at) = config.as_duration().and_then(|d| now.checked_add_signed(d)) else {
            return Ok(Step::Finish(WalkState::Halted {
                error: ConfigurationError::InvalidDelay(action.id.clone()),
            }));
        };

        let payload = ContinuationPayload {
            automation_id: walk.automation.id(),
            contact_id: walk.contact.id,
            action_id: next.clone(),
            trigger_event: walk.event.clone(),
        };
        let job = QueueJob::continuation(walk.contact.owner_id, &payload, now, resume_at)
            .and_then(|job| job.with_max_attempts(self.queue.config().default_max_attempts))
            .map_err(|e| failed(action, e.into()))?;
        let job_id = self.queue.add_job(job).await.map_err(|e| failed(action, e))?;
        walk.continuations.push(job_id);
        Ok(Step::Finish(WalkState::Suspended {
            resume_action_id: next.clone(),
            resume_at,
        }))
    }

    async fn branch(
        &self,
        walk: &mut Walk,
        action: &AutomationAction,
        config: &ConditionConfig,
    ) -> Result<Step, ConvoFlowError> {
        let matched = config.condition.evaluate(&walk.contact);
        debug!(action_id = %action.id, condition = %config.condition, matched, "condition evaluated");
        let branch = if matched {
            &config.true_actions
        } else {
            &config.false_actions
        };

        let mut outcome = WalkState::Done;
        for start in branch {
            match self.run_chain(walk, start.clone()).await? {
                WalkState::Done => {}
                halted @ WalkState::Halted { .. } => return Ok(Step::Finish(halted)),
                suspended @ WalkState::Suspended { .. } => {
                    if outcome == WalkState::Done {
                        outcome = suspended;
                    }
                }
            }
        }
        Ok(Step::Finish(outcome))
    }

    async fn call_webhook(&self, walk: &Walk, action: &AutomationAction, config: &WebhookConfig) {
        let body = config.body.clone().unwrap_or_else(|| {
            json!({
                "contact": walk.contact,
                "automation": {
                    "id": walk.automation.id(),
                    "name": walk.automation.definition().name,
                },
                "trigger_event": walk.event,
                "timestamp": self.ports.clock().now(),
            })
        });
        let request = WebhookRequest {
            method: config.method,
            url: config.url.clone(),
            headers: config.headers.clone(),
            body,
            timeout: self.config.webhook_timeout,
        };

        let call = self.ports.webhooks().call(request);
        match tokio::time::timeout(self.config.webhook_timeout, call).await {
            Ok(Ok(response)) if response.is_success() => {
                debug!(action_id = %action.id, status = response.status, "webhook delivered");
            }
            Ok(Ok(response)) => {
                warn!(action_id = %action.id, url = %config.url, status = response.status, "webhook rejected");
            }
            Ok(Err(err)) => {
                warn!(action_id = %action.id, url = %config.url, error = %err, "webhook failed");
            }
            Err(_) => {
                warn!(action_id = %action.id, url = %config.url, "webhook timed out");
            }
        }
    }

    async fn transfer_human(
        &self,
        walk: &mut Walk,
        action: &AutomationAction,
        config: &TransferHumanConfig,
    ) -> Result<(), ConvoFlowError> {
        walk.contact = self
            .ports
            .contacts()
            .add_tag(walk.contact.id, &self.config.handoff_tag)
            .await
            .map_err(|e| failed(action, e))?;

        let data = json!({
            "automation_id": walk.automation.id(),
            "contact_id": walk.contact.id,
            "note": config.note,
        });
        info!(action_id = %action.id, "human handoff requested");
        let _ = self
            .ports
            .publisher()
            .publish(Event::new(
                EventType::HumanHandoffRequested,
                Some(walk.contact.id),
                data.clone(),
            ))
            .await;
        track(
            self.ports.analytics(),
            walk.contact.owner_id,
            AnalyticsEvent::HumanHandoff,
            data,
        )
        .await;
        Ok(())
    }
}

fn failed(action: &AutomationAction, source: ConvoFlowError) -> ConvoFlowError {
    ExecutionError::caused_by(action.id.clone(), source).into()
}

fn with_error(mut meta: serde_json::Value, error: &impl std::fmt::Display) -> serde_json::Value {
    if let Some(map) = meta.as_object_mut() {
        map.insert("error".to_string(), json!(error.to_string()));
    }
    meta
}

/// Record an analytics event. Sink failures are logged, never propagated.
pub(crate) async fn track<A: AnalyticsSink + Sync>(
    sink: &A,
    owner_id: OwnerId,
    event: AnalyticsEvent,
    metadata: serde_json::Value,
) {
    if let Err(err) = sink.record(owner_id, event, metadata).await {
        warn!(%event, error = %err, "analytics record failed");
    }
}
