//! Engine wiring over real storage plus console adapters, for handler tests.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use convoflow_adapter_console::{LogChannelSender, PlaceholderRenderer};
use convoflow_adapter_storage_sqlite_sqlx::{
    Config, Database, SqliteAnalyticsSink, SqliteAutomationRepository, SqliteContactStore,
};
use convoflow_app::config::{EngineConfig, QueueConfig};
use convoflow_app::engine::AutomationEngine;
use convoflow_app::event_bus::InProcessEventBus;
use convoflow_app::job_store::InMemoryJobStore;
use convoflow_app::ports::{
    AutomationRepository, EnginePorts, WebhookClient, WebhookRequest, WebhookResponse,
};
use convoflow_app::registry::AutomationRegistry;
use convoflow_domain::automation::Automation;
use convoflow_domain::error::ConvoFlowError;
use convoflow_domain::time::SystemClock;

use crate::router;
use crate::state::AppState;

/// Answers every call with `200 OK`.
pub struct AcceptingWebhooks;

impl WebhookClient for AcceptingWebhooks {
    async fn call(&self, _request: WebhookRequest) -> Result<WebhookResponse, ConvoFlowError> {
        Ok(WebhookResponse {
            status: 200,
            body: String::new(),
        })
    }
}

pub struct TestPorts {
    automations: SqliteAutomationRepository,
    contacts: SqliteContactStore,
    channel: LogChannelSender,
    templates: PlaceholderRenderer,
    analytics: SqliteAnalyticsSink,
    webhooks: AcceptingWebhooks,
    publisher: Arc<InProcessEventBus>,
    jobs: InMemoryJobStore,
    clock: SystemClock,
}

impl EnginePorts for TestPorts {
    type Automations = SqliteAutomationRepository;
    type Contacts = SqliteContactStore;
    type Channel = LogChannelSender;
    type Templates = PlaceholderRenderer;
    type Analytics = SqliteAnalyticsSink;
    type Webhooks = AcceptingWebhooks;
    type Publisher = Arc<InProcessEventBus>;
    type Jobs = InMemoryJobStore;
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

pub struct TestApp {
    pub database: Database,
    pub event_bus: Arc<InProcessEventBus>,
    pub state: AppState<TestPorts>,
}

impl TestApp {
    /// Store `automations` and start an engine over them. The queue loops
    /// are not running, so queued jobs stay pending.
    pub async fn with(automations: Vec<Automation>) -> Self {
        let database = Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        for automation in automations {
            database.automations().create(automation).await.unwrap();
        }

        let event_bus = Arc::new(InProcessEventBus::new(16));
        let ports = Arc::new(TestPorts {
            automations: database.automations(),
            contacts: database.contacts(),
            channel: LogChannelSender::new(),
            templates: PlaceholderRenderer::default(),
            analytics: database.analytics(),
            webhooks: AcceptingWebhooks,
            publisher: Arc::clone(&event_bus),
            jobs: InMemoryJobStore::new(),
            clock: SystemClock,
        });
        let engine = AutomationEngine::new(
            ports,
            Arc::new(AutomationRegistry::new()),
            EngineConfig::default(),
            QueueConfig::default(),
        );
        engine.start().await.unwrap();

        Self {
            database,
            state: AppState::new(engine, Arc::clone(&event_bus)),
            event_bus,
        }
    }

    pub fn router(&self) -> Router {
        router::build(self.state.clone())
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}
