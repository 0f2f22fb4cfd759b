//! Production port wiring.

use std::sync::Arc;

use convoflow_adapter_console::{LogChannelSender, PlaceholderRenderer};
use convoflow_adapter_storage_sqlite_sqlx::{
    Database, SqliteAnalyticsSink, SqliteAutomationRepository, SqliteContactStore, SqliteJobStore,
};
use convoflow_adapter_webhook_reqwest::ReqwestWebhookClient;
use convoflow_app::event_bus::InProcessEventBus;
use convoflow_app::ports::EnginePorts;
use convoflow_domain::time::SystemClock;

/// `SQLite` storage, console delivery, reqwest webhooks and the in-process
/// event bus.
pub struct AppPorts {
    automations: SqliteAutomationRepository,
    contacts: SqliteContactStore,
    channel: LogChannelSender,
    templates: PlaceholderRenderer,
    analytics: SqliteAnalyticsSink,
    webhooks: ReqwestWebhookClient,
    publisher: Arc<InProcessEventBus>,
    jobs: SqliteJobStore,
    clock: SystemClock,
}

impl AppPorts {
    pub fn new(
        database: &Database,
        templates: PlaceholderRenderer,
        webhooks: ReqwestWebhookClient,
        publisher: Arc<InProcessEventBus>,
    ) -> Self {
        Self {
            automations: database.automations(),
            contacts: database.contacts(),
            channel: LogChannelSender::new(),
            templates,
            analytics: database.analytics(),
            webhooks,
            publisher,
            jobs: database.jobs(),
            clock: SystemClock,
        }
    }
}

impl EnginePorts for AppPorts {
    type Automations = SqliteAutomationRepository;
    type Contacts = SqliteContactStore;
    type Channel = LogChannelSender;
    type Templates = PlaceholderRenderer;
    type Analytics = SqliteAnalyticsSink;
    type Webhooks = ReqwestWebhookClient;
    type Publisher = Arc<InProcessEventBus>;
    type Jobs = SqliteJobStore;
    type Time = SystemClock;

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
