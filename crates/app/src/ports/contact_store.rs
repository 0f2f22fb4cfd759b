//! Contact store port: contacts, their tags and fields, and the outbound log.

use std::future::Future;

use convoflow_domain::contact::{Channel, Contact, ContactPatch, OutboundMessage};
use convoflow_domain::error::ConvoFlowError;
use convoflow_domain::id::{ContactId, OwnerId};
use serde_json::Value;

/// Storage for [`Contact`]s.
///
/// Every mutator returns the updated contact so callers can keep their
/// working copy current.
pub trait ContactStore {
    /// Look a contact up by `(owner, identifier, channel)`, creating it if absent.
    fn find_or_create(
        &self,
        owner_id: OwnerId,
        identifier: &str,
        channel: Channel,
    ) -> impl Future<Output = Result<Contact, ConvoFlowError>> + Send;

    fn get(
        &self,
        id: ContactId,
    ) -> impl Future<Output = Result<Option<Contact>, ConvoFlowError>> + Send;

    /// Apply `patch` to a contact.
    ///
    /// Returns [`ConvoFlowError::NotFound`] when the contact does not exist.
    fn update(
        &self,
        id: ContactId,
        patch: ContactPatch,
    ) -> impl Future<Output = Result<Contact, ConvoFlowError>> + Send;

    /// Contacts of `owner_id` carrying every tag in `tags`; empty `tags` lists all.
    fn list_by_tags(
        &self,
        owner_id: OwnerId,
        tags: &[String],
    ) -> impl Future<Output = Result<Vec<Contact>, ConvoFlowError>> + Send;

    /// Append a delivered message to the outbound log.
    fn record_message(
        &self,
        message: OutboundMessage,
    ) -> impl Future<Output = Result<(), ConvoFlowError>> + Send;

    fn add_tag(
        &self,
        id: ContactId,
        tag: &str,
    ) -> impl Future<Output = Result<Contact, ConvoFlowError>> + Send {
        self.update(id, ContactPatch::add_tag(tag))
    }

    fn remove_tag(
        &self,
        id: ContactId,
        tag: &str,
    ) -> impl Future<Output = Result<Contact, ConvoFlowError>> + Send {
        self.update(id, ContactPatch::remove_tag(tag))
    }

    fn set_field(
        &self,
        id: ContactId,
        key: &str,
        value: Value,
    ) -> impl Future<Output = Result<Contact, ConvoFlowError>> + Send {
        self.update(id, ContactPatch::field(key, value))
    }
}
