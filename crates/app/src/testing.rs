//! In-memory fakes of every port, shared by the unit tests of this crate.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::TimeZone;
use serde_json::{Map, Value};

use convoflow_domain::automation::{Automation, TriggerType};
use convoflow_domain::contact::{Channel, Contact, ContactPatch, OutboundMessage};
use convoflow_domain::error::{ConvoFlowError, NotFoundError};
use convoflow_domain::event::Event;
use convoflow_domain::id::{AutomationId, ContactId, OwnerId};
use convoflow_domain::time::{Clock, ManualClock, Timestamp};

use crate::job_store::InMemoryJobStore;
use crate::ports::{
    AnalyticsEvent, AnalyticsSink, AutomationRepository, ChannelSender, ContactStore,
    DeliveryReceipt, EnginePorts, EventPublisher, MessageTemplate, OutgoingMessage,
    TemplateRenderer, WebhookClient, WebhookRequest, WebhookResponse,
};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap()
}

pub fn start_time() -> Timestamp {
    chrono::Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
}

#[derive(Default)]
pub struct InMemoryAutomationRepo {
    store: Mutex<HashMap<AutomationId, Automation>>,
}

impl AutomationRepository for InMemoryAutomationRepo {
    fn create(
        &self,
        automation: Automation,
    ) -> impl Future<Output = Result<Automation, ConvoFlowError>> + Send {
        lock(&self.store).insert(automation.id, automation.clone());
        async { Ok(automation) }
    }

    fn get_by_id(
        &self,
        id: AutomationId,
    ) -> impl Future<Output = Result<Option<Automation>, ConvoFlowError>> + Send {
        let result = lock(&self.store).get(&id).cloned();
        async { Ok(result) }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<Automation>, ConvoFlowError>> + Send {
        let result: Vec<Automation> = lock(&self.store).values().cloned().collect();
        async { Ok(result) }
    }

    fn find_active_by_trigger_type(
        &self,
        trigger_type: TriggerType,
    ) -> impl Future<Output = Result<Vec<Automation>, ConvoFlowError>> + Send {
        let result: Vec<Automation> = lock(&self.store)
            .values()
            .filter(|a| a.active && a.trigger_type() == trigger_type)
            .cloned()
            .collect();
        async { Ok(result) }
    }

    fn update(
        &self,
        automation: Automation,
    ) -> impl Future<Output = Result<Automation, ConvoFlowError>> + Send {
        let mut store = lock(&self.store);
        let result = if store.contains_key(&automation.id) {
            store.insert(automation.id, automation.clone());
            Ok(automation)
        } else {
            Err(NotFoundError {
                entity: "Automation",
                id: automation.id.to_string(),
            }
            .into())
        };
        async { result }
    }

    fn delete(&self, id: AutomationId) -> impl Future<Output = Result<(), ConvoFlowError>> + Send {
        lock(&self.store).remove(&id);
        async { Ok(()) }
    }
}

#[derive(Default)]
pub struct InMemoryContactStore {
    contacts: Mutex<HashMap<ContactId, Contact>>,
    pub messages: Mutex<Vec<OutboundMessage>>,
    /// When set, every mutation fails with a storage error.
    pub fail_updates: Mutex<bool>,
}

impl InMemoryContactStore {
    pub fn insert(&self, contact: Contact) {
        lock(&self.contacts).insert(contact.id, contact);
    }

    pub fn contact(&self, id: ContactId) -> Contact {
        lock(&self.contacts)[&id].clone()
    }
}

impl ContactStore for InMemoryContactStore {
    fn find_or_create(
        &self,
        owner_id: OwnerId,
        identifier: &str,
        channel: Channel,
    ) -> impl Future<Output = Result<Contact, ConvoFlowError>> + Send {
        let mut contacts = lock(&self.contacts);
        let existing = contacts
            .values()
            .find(|c| c.owner_id == owner_id && c.identifier == identifier && c.channel == channel)
            .cloned();
        let result = match existing {
            Some(contact) => Ok(contact),
            None => Contact::new(owner_id, identifier, channel, start_time()).map(|contact| {
                contacts.insert(contact.id, contact.clone());
                contact
            }),
        };
        async { result }
    }

    fn get(
        &self,
        id: ContactId,
    ) -> impl Future<Output = Result<Option<Contact>, ConvoFlowError>> + Send {
        let result = lock(&self.contacts).get(&id).cloned();
        async { Ok(result) }
    }

    fn update(
        &self,
        id: ContactId,
        patch: ContactPatch,
    ) -> impl Future<Output = Result<Contact, ConvoFlowError>> + Send {
        let result = if *lock(&self.fail_updates) {
            Err(ConvoFlowError::Storage("contact store offline".into()))
        } else {
            match lock(&self.contacts).get_mut(&id) {
                Some(contact) => {
                    patch.apply(contact, start_time());
                    Ok(contact.clone())
                }
                None => Err(NotFoundError {
                    entity: "Contact",
                    id: id.to_string(),
                }
                .into()),
            }
        };
        async { result }
    }

    fn list_by_tags(
        &self,
        owner_id: OwnerId,
        tags: &[String],
    ) -> impl Future<Output = Result<Vec<Contact>, ConvoFlowError>> + Send {
        let result: Vec<Contact> = lock(&self.contacts)
            .values()
            .filter(|c| c.owner_id == owner_id && c.has_all_tags(tags))
            .cloned()
            .collect();
        async { Ok(result) }
    }

    fn record_message(
        &self,
        message: OutboundMessage,
    ) -> impl Future<Output = Result<(), ConvoFlowError>> + Send {
        lock(&self.messages).push(message);
        async { Ok(()) }
    }
}

/// Records sent messages; answers with scripted receipts, then successes.
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<OutgoingMessage>>,
    pub script: Mutex<VecDeque<DeliveryReceipt>>,
}

impl ChannelSender for RecordingChannel {
    fn send(
        &self,
        message: &OutgoingMessage,
    ) -> impl Future<Output = Result<DeliveryReceipt, ConvoFlowError>> + Send {
        let mut sent = lock(&self.sent);
        sent.push(message.clone());
        let receipt = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| DeliveryReceipt::delivered(format!("ext-{}", sent.len())));
        async { Ok(receipt) }
    }
}

/// Replaces `{{name}}` and `{{var}}` placeholders; stored templates render
/// as `template:<id>`.
#[derive(Default)]
pub struct EchoTemplates;

impl TemplateRenderer for EchoTemplates {
    fn render(
        &self,
        template: MessageTemplate<'_>,
        contact: &Contact,
        variables: &Map<String, Value>,
    ) -> impl Future<Output = Result<String, ConvoFlowError>> + Send {
        let mut text = match template {
            MessageTemplate::Stored(id) => format!("template:{id}"),
            MessageTemplate::Inline(text) => text.to_string(),
        };
        text = text.replace("{{name}}", contact.name.as_deref().unwrap_or(""));
        for (key, value) in variables {
            let value = value.as_str().map_or_else(|| value.to_string(), ToString::to_string);
            text = text.replace(&format!("{{{{{key}}}}}"), &value);
        }
        async { Ok(text) }
    }
}

#[derive(Default)]
pub struct RecordingAnalytics {
    pub records: Mutex<Vec<(OwnerId, AnalyticsEvent, Value)>>,
}

impl RecordingAnalytics {
    pub fn names(&self) -> Vec<AnalyticsEvent> {
        lock(&self.records).iter().map(|(_, e, _)| *e).collect()
    }
}

impl AnalyticsSink for RecordingAnalytics {
    fn record(
        &self,
        owner_id: OwnerId,
        event: AnalyticsEvent,
        metadata: Value,
    ) -> impl Future<Output = Result<(), ConvoFlowError>> + Send {
        lock(&self.records).push((owner_id, event, metadata));
        async { Ok(()) }
    }
}

#[derive(Default)]
pub struct RecordingWebhooks {
    pub calls: Mutex<Vec<WebhookRequest>>,
    pub fail: Mutex<bool>,
    /// When set, calls never resolve.
    pub hang: Mutex<bool>,
}

impl WebhookClient for RecordingWebhooks {
    fn call(
        &self,
        request: WebhookRequest,
    ) -> impl Future<Output = Result<WebhookResponse, ConvoFlowError>> + Send {
        lock(&self.calls).push(request);
        let result = if *lock(&self.fail) {
            Err(ConvoFlowError::Storage("connection refused".into()))
        } else {
            Ok(WebhookResponse {
                status: 200,
                body: String::new(),
            })
        };
        let hang = *lock(&self.hang);
        async move {
            if hang {
                std::future::pending::<()>().await;
            }
            result
        }
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<Event>>,
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), ConvoFlowError>> + Send {
        lock(&self.events).push(event);
        async { Ok(()) }
    }
}

pub struct FakePorts {
    pub automations: InMemoryAutomationRepo,
    pub contacts: InMemoryContactStore,
    pub channel: RecordingChannel,
    pub templates: EchoTemplates,
    pub analytics: RecordingAnalytics,
    pub webhooks: RecordingWebhooks,
    pub publisher: RecordingPublisher,
    pub jobs: InMemoryJobStore,
    pub clock: ManualClock,
}

impl FakePorts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            automations: InMemoryAutomationRepo::default(),
            contacts: InMemoryContactStore::default(),
            channel: RecordingChannel::default(),
            templates: EchoTemplates,
            analytics: RecordingAnalytics::default(),
            webhooks: RecordingWebhooks::default(),
            publisher: RecordingPublisher::default(),
            jobs: InMemoryJobStore::new(),
            clock: ManualClock::new(start_time()),
        })
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// A stored WhatsApp contact for `owner_id`.
    pub fn contact(&self, owner_id: OwnerId) -> Contact {
        let contact =
            Contact::new(owner_id, "5511999999999", Channel::Whatsapp, start_time()).unwrap();
        self.contacts.insert(contact.clone());
        contact
    }
}

impl EnginePorts for FakePorts {
    type Automations = InMemoryAutomationRepo;
    type Contacts = InMemoryContactStore;
    type Channel = RecordingChannel;
    type Templates = EchoTemplates;
    type Analytics = RecordingAnalytics;
    type Webhooks = RecordingWebhooks;
    type Publisher = RecordingPublisher;
    type Jobs = InMemoryJobStore;
    type Time = ManualClock;

    fn automations(&self) -> &Self::Automations {
        &self.automations
    }
    fn contacts(&self) -> &Self::Contacts {
        &self.contacts
    }
    fn channel(&self) -> &Self::Channel {
        &self.channel
    }
    fn templates(&self) -> &Self::Templates {
        &self.templates
    }
    fn analytics(&self) -> &Self::Analytics {
        &self.analytics
    }
    fn webhooks(&self) -> &Self::Webhooks {
        &self.webhooks
    }
    fn publisher(&self) -> &Self::Publisher {
        &self.publisher
    }
    fn jobs(&self) -> &Self::Jobs {
        &self.jobs
    }
    fn clock(&self) -> &Self::Time {
        &self.clock
    }
}
