//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.
//!
//! [`EnginePorts`] bundles one implementation of each port so the engine,
//! executor and queue take a single type parameter.

pub mod analytics;
pub mod automation_repo;
pub mod contact_store;
pub mod event_bus;
pub mod job_store;
pub mod messaging;
pub mod webhook;

pub use analytics::{AnalyticsEvent, AnalyticsSink};
pub use automation_repo::AutomationRepository;
pub use contact_store::ContactStore;
pub use event_bus::EventPublisher;
pub use job_store::JobStore;
pub use messaging::{
    ChannelSender, DeliveryReceipt, MessageTemplate, OutgoingMessage, TemplateRenderer,
};
pub use webhook::{WebhookClient, WebhookRequest, WebhookResponse};

use convoflow_domain::time::Clock;

/// The full set of collaborators the engine talks to.
pub trait EnginePorts: Send + Sync + 'static {
    type Automations: AutomationRepository + Send + Sync + 'static;
    type Contacts: ContactStore + Send + Sync + 'static;
    type Channel: ChannelSender + Send + Sync + 'static;
    type Templates: TemplateRenderer + Send + Sync + 'static;
    type Analytics: AnalyticsSink + Send + Sync + 'static;
    type Webhooks: WebhookClient + Send + Sync + 'static;
    type Publisher: EventPublisher + Send + Sync + 'static;
    type Jobs: JobStore + Send + Sync + 'static;
    type Time: Clock + 'static;

    fn automations(&self) -> &Self::Automations;
    fn contacts(&self) -> &Self::Contacts;
    fn channel(&self) -> &Self::Channel;
    fn templates(&self) -> &Self::Templates;
    fn analytics(&self) -> &Self::Analytics;
    fn webhooks(&self) -> &Self::Webhooks;
    fn publisher(&self) -> &Self::Publisher;
    fn jobs(&self) -> &Self::Jobs;
    fn clock(&self) -> &Self::Time;
}
