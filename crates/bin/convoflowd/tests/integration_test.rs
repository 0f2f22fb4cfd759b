//! End-to-end smoke tests for the full convoflowd stack.
//!
//! Each test wires the complete application (in-memory `SQLite`, real
//! adapters, real engine, real axum router) and exercises the HTTP layer via
//! `tower::ServiceExt::oneshot`: no TCP port is bound.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::sync::watch;
use tower::ServiceExt;

use convoflow_adapter_console::{LogChannelSender, PlaceholderRenderer};
use convoflow_adapter_http_axum::router;
use convoflow_adapter_http_axum::state::AppState;
use convoflow_adapter_storage_sqlite_sqlx::{
    Config, Database, SqliteAnalyticsSink, SqliteAutomationRepository, SqliteContactStore,
    SqliteJobStore,
};
use convoflow_adapter_webhook_reqwest::ReqwestWebhookClient;
use convoflow_app::config::{EngineConfig, QueueConfig};
use convoflow_app::engine::AutomationEngine;
use convoflow_app::event_bus::InProcessEventBus;
use convoflow_app::ports::{AutomationRepository, ContactStore, EnginePorts};
use convoflow_app::registry::AutomationRegistry;
use convoflow_app::services::automation_service::AutomationService;
use convoflow_domain::automation::{ActionKind, Automation, AutomationAction, Trigger};
use convoflow_domain::contact::Channel;
use convoflow_domain::event::EventType;
use convoflow_domain::id::OwnerId;
use convoflow_domain::time::SystemClock;

struct Ports {
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

impl EnginePorts for Ports {
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

struct Stack {
    database: Database,
    event_bus: Arc<InProcessEventBus>,
    engine: Arc<AutomationEngine<Ports>>,
}

impl Stack {
    fn router(&self) -> axum::Router {
        router::build(AppState::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.event_bus),
        ))
    }
}

async fn database() -> Database {
    Config {
        database_url: "sqlite::memory:".to_string(),
    }
    .build()
    .await
    .expect("in-memory database should initialise")
}

/// Wire an engine over `database` with fast queue periods and start it.
async fn stack(database: Database) -> Stack {
    let event_bus = Arc::new(InProcessEventBus::new(256));
    let ports = Arc::new(Ports {
        automations: database.automations(),
        contacts: database.contacts(),
        channel: LogChannelSender::new(),
        templates: PlaceholderRenderer::default(),
        analytics: database.analytics(),
        webhooks: ReqwestWebhookClient::new().unwrap(),
        publisher: Arc::clone(&event_bus),
        jobs: database.jobs(),
        clock: SystemClock,
    });
    let queue = QueueConfig {
        poll_interval: Duration::from_millis(20),
        sweep_interval: Duration::from_millis(20),
        ..QueueConfig::default()
    };
    let engine = AutomationEngine::new(
        ports,
        Arc::new(AutomationRegistry::new()),
        EngineConfig::default(),
        queue,
    );
    engine.start().await.unwrap();
    Stack {
        database,
        event_bus,
        engine,
    }
}

fn welcome(owner: OwnerId) -> Automation {
    Automation::builder()
        .owner(owner)
        .name("Welcome")
        .trigger(Trigger::Keyword {
            keywords: ["oi", "olá", "hello"].map(String::from).to_vec(),
        })
        .action(AutomationAction::new("1", ActionKind::text("Olá {{identifier}}!")).then("2"))
        .action(AutomationAction::new("2", ActionKind::add_tag("novo_contato")))
        .build()
        .unwrap()
}

async fn post_json(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn oi(owner: OwnerId) -> Value {
    json!({
        "owner_id": owner,
        "identifier": "5511999999999",
        "channel": "whatsapp",
        "text": "Oi, tudo bem?"
    })
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_return_ok_when_health_check_called() {
    let stack = stack(database().await).await;

    let resp = stack
        .router()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Message intake through delivery
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn should_deliver_rendered_message_when_keyword_arrives() {
    let owner = OwnerId::new();
    let stack = stack(database().await).await;
    let service = AutomationService::new(
        stack.database.automations(),
        Arc::clone(stack.engine.registry()),
    );
    service.create_automation(welcome(owner)).await.unwrap();

    let mut events = stack.event_bus.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = tokio::spawn(Arc::clone(&stack.engine).run(shutdown_rx));

    let (status, body) = post_json(stack.router(), "/api/events/messages", oi(owner)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["executed"], json!(["1", "2"]));

    let mut english = oi(owner);
    english["identifier"] = json!("5511888888888");
    english["text"] = json!("Hello!");
    let (_, body) = post_json(stack.router(), "/api/events/messages", english).await;
    assert_eq!(body[0]["executed"], json!(["1", "2"]));

    tokio::time::timeout(Duration::from_secs(5), async {
        let mut completed = 0;
        while completed < 2 {
            let event = events.recv().await.unwrap();
            if event.event_type == EventType::JobCompleted {
                completed += 1;
            }
        }
    })
    .await
    .expect("message jobs should complete");

    let contact = stack
        .database
        .contacts()
        .find_or_create(owner, "5511999999999", Channel::Whatsapp)
        .await
        .unwrap();
    assert!(contact.tags.contains("novo_contato"));
    let messages = stack.database.contacts().messages(contact.id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "Olá 5511999999999!");
    assert!(messages[0].external_id.is_some());

    shutdown_tx.send(true).unwrap();
    workers.await.unwrap();
}

#[tokio::test]
async fn should_restore_pending_job_when_engine_restarts() {
    let owner = OwnerId::new();
    let database = database().await;
    let first = stack(database.clone()).await;
    AutomationService::new(database.automations(), Arc::clone(first.engine.registry()))
        .create_automation(welcome(owner))
        .await
        .unwrap();
    post_json(first.router(), "/api/events/messages", oi(owner)).await;
    drop(first);

    let second = stack(database).await;

    let stats = second.engine.queue().stats();
    let pending: usize = stats.types.values().map(|t| t.pending).sum();
    assert_eq!(pending, 1);
}

// ---------------------------------------------------------------------------
// Webhook and manual execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_tag_contact_when_webhook_fires() {
    let owner = OwnerId::new();
    let automation = Automation::builder()
        .owner(owner)
        .name("Order paid")
        .trigger(Trigger::Webhook)
        .action(AutomationAction::new("1", ActionKind::add_tag("cliente")))
        .build()
        .unwrap();
    let id = automation.id;
    let database = database().await;
    database
        .automations()
        .create(automation)
        .await
        .unwrap();
    let stack = stack(database).await;

    let (status, _) = post_json(
        stack.router(),
        &format!("/api/webhooks/{id}"),
        json!({"identifier": "ana@example.com", "channel": "email", "data": {"order": 7}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let contact = stack
        .database
        .contacts()
        .find_or_create(owner, "ana@example.com", Channel::Email)
        .await
        .unwrap();
    assert!(contact.has_all_tags(&["cliente".to_string()]));
}

#[tokio::test]
async fn should_return_404_when_executing_unknown_automation() {
    let stack = stack(database().await).await;
    let contact = stack
        .database
        .contacts()
        .find_or_create(OwnerId::new(), "5511900000000", Channel::Sms)
        .await
        .unwrap();

    let (status, _) = post_json(
        stack.router(),
        &format!(
            "/api/automations/{}/execute",
            convoflow_domain::id::AutomationId::new()
        ),
        json!({"contact_id": contact.id}),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
