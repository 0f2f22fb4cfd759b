//! Core job handlers: outbound message dispatch and walk continuation.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use convoflow_domain::contact::OutboundMessage;
use convoflow_domain::error::{ConvoFlowError, DeliveryError};
use convoflow_domain::job::{ContinuationPayload, QueueJob, SendMessagePayload};
use convoflow_domain::time::Clock;

use crate::engine::AutomationEngine;
use crate::executor::track;
use crate::ports::{AnalyticsEvent, ChannelSender, ContactStore, EnginePorts, OutgoingMessage};
use crate::queue::JobHandler;

/// Delivers `send_message` jobs through the [`ChannelSender`] and logs them.
pub struct SendMessageHandler<P> {
    ports: Arc<P>,
}

impl<P> SendMessageHandler<P> {
    pub fn new(ports: Arc<P>) -> Self {
        Self { ports }
    }
}

#[async_trait]
impl<P: EnginePorts> JobHandler for SendMessageHandler<P> {
    async fn handle(&self, job: &QueueJob) -> Result<(), ConvoFlowError> {
        let payload: SendMessagePayload = job.decode_payload()?;
        let message = OutgoingMessage {
            channel: payload.channel,
            recipient: payload.recipient.clone(),
            message_type: payload.message_type,
            content: payload.content.clone(),
            media_url: payload.media_url.clone(),
        };
        let meta = json!({
            "job_id": job.id,
            "automation_id": payload.automation_id,
            "contact_id": payload.contact_id,
            "channel": payload.channel,
            "attempt": job.attempts + 1,
        });

        let receipt = self.ports.channel().send(&message).await?;
        if !receipt.success {
            let reason = receipt
                .error
                .unwrap_or_else(|| "channel rejected the message".to_string());
            track(
                self.ports.analytics(),
                job.owner_id,
                AnalyticsEvent::MessageFailed,
                meta,
            )
            .await;
            return Err(DeliveryError {
                channel: payload.channel,
                reason,
            }
            .into());
        }

        self.ports
            .contacts()
            .record_message(OutboundMessage {
                owner_id: job.owner_id,
                contact_id: payload.contact_id,
                automation_id: payload.automation_id,
                channel: payload.channel,
                content: payload.content,
                media_url: payload.media_url,
                external_id: receipt.external_id,
                sent_at: self.ports.clock().now(),
            })
            .await?;
        track(
            self.ports.analytics(),
            job.owner_id,
            AnalyticsEvent::MessageSent,
            meta,
        )
        .await;
        Ok(())
    }
}

/// Resumes walks parked by a `delay` action.
pub struct ContinuationHandler<P: EnginePorts> {
    engine: Weak<AutomationEngine<P>>,
}

impl<P: EnginePorts> ContinuationHandler<P> {
    pub fn new(engine: Weak<AutomationEngine<P>>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl<P: EnginePorts> JobHandler for ContinuationHandler<P> {
    async fn handle(&self, job: &QueueJob) -> Result<(), ConvoFlowError> {
        let payload: ContinuationPayload = job.decode_payload()?;
        let Some(engine) = self.engine.upgrade() else {
            debug!(job_id = %job.id, "engine gone, dropping continuation");
            return Ok(());
        };
        engine.resume_walk(payload).await.map(|_| ())
    }
}
