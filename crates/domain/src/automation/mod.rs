//! Automation: trigger → action-chain rules.
//!
//! An [`Automation`] is the stored definition. Before it can run it is
//! compiled into a [`CompiledAutomation`], which checks the definition and
//! indexes its actions by id: ids are unique, every `next_action_id` and
//! branch reference resolves, no action type is unknown and no chain loops
//! back on itself. Automations that fail to compile are quarantined by the
//! registry rather than failing halfway through a walk.

mod action;
mod condition;
mod trigger;

pub use action::{
    ActionId, ActionKind, AutomationAction, ConditionConfig, DelayConfig, DelayUnit, HttpMethod,
    MessageType, SendMessageConfig, TagConfig, TransferHumanConfig, UpdateFieldConfig,
    WebhookConfig,
};
pub use condition::{Condition, ConditionOperator};
pub use trigger::{Trigger, TriggerType, keyword_matches, parse_schedule_time};

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, ConvoFlowError, ValidationError};
use crate::id::{AutomationId, OwnerId};
use crate::time::Timestamp;

/// A rule that reacts to trigger events by walking an action chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    pub id: AutomationId,
    pub owner_id: OwnerId,
    pub name: String,
    pub active: bool,
    pub trigger: Trigger,
    /// Ordered actions; the walk starts at the first one.
    pub actions: Vec<AutomationAction>,
    pub last_triggered: Option<Timestamp>,
}

impl Automation {
    /// Create a builder for constructing an [`Automation`].
    #[must_use]
    pub fn builder() -> AutomationBuilder {
        AutomationBuilder::default()
    }

    #[must_use]
    pub fn trigger_type(&self) -> TriggerType {
        self.trigger.trigger_type()
    }

    /// Check plain-value invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConvoFlowError::Validation`] when:
    /// - `name` is empty ([`ValidationError::EmptyName`])
    /// - `actions` is empty ([`ValidationError::NoActions`])
    /// - a schedule trigger has a malformed time
    pub fn validate(&self) -> Result<(), ConvoFlowError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.actions.is_empty() {
            return Err(ValidationError::NoActions.into());
        }
        if let Trigger::Schedule { time, .. } = &self.trigger {
            parse_schedule_time(time)?;
        }
        Ok(())
    }

    /// Validate the definition and index its actions.
    ///
    /// # Errors
    ///
    /// Returns [`ConvoFlowError::Validation`] for plain-value violations and
    /// [`ConvoFlowError::Configuration`] for a broken action chain.
    pub fn compile(self) -> Result<CompiledAutomation, ConvoFlowError> {
        self.validate()?;
        let chain = ActionChain::compile(&self.actions)?;
        Ok(CompiledAutomation {
            definition: self,
            chain,
        })
    }
}

/// Id-indexed, validated view of an automation's actions.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionChain {
    entry: ActionId,
    actions: HashMap<ActionId, AutomationAction>,
}

impl ActionChain {
    /// Index `actions` and check every reference.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found.
    pub fn compile(actions: &[AutomationAction]) -> Result<Self, ConvoFlowError> {
        let entry = actions
            .first()
            .map(|a| a.id.clone())
            .ok_or(ValidationError::NoActions)?;

        let mut index = HashMap::with_capacity(actions.len());
        for action in actions {
            if index.insert(action.id.clone(), action.clone()).is_some() {
                return Err(ConfigurationError::DuplicateActionId(action.id.clone()).into());
            }
        }

        for action in actions {
            match &action.kind {
                ActionKind::Unknown { .. } => {
                    return Err(ConfigurationError::UnknownActionType(action.id.clone()).into());
                }
                ActionKind::Delay(delay) if delay.as_duration().is_none() => {
                    return Err(ConfigurationError::InvalidDelay(action.id.clone()).into());
                }
                _ => {}
            }
            for target in successors(action) {
                if !index.contains_key(target) {
                    return Err(ConfigurationError::DanglingReference {
                        from: action.id.clone(),
                        to: target.clone(),
                    }
                    .into());
                }
            }
        }

        let chain = Self {
            entry,
            actions: index,
        };
        chain.check_acyclic()?;
        Ok(chain)
    }

    /// First action of the walk.
    #[must_use]
    pub fn entry(&self) -> &ActionId {
        &self.entry
    }

    #[must_use]
    pub fn get(&self, id: &ActionId) -> Option<&AutomationAction> {
        self.actions.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn check_acyclic(&self) -> Result<(), ConfigurationError> {
        let mut done: HashSet<&ActionId> = HashSet::new();
        let mut ids: Vec<&ActionId> = self.actions.keys().collect();
        ids.sort();
        for start in ids {
            if done.contains(start) {
                continue;
            }
            // Iterative DFS; `on_path` holds the ids of the current stack.
            let mut on_path: HashSet<&ActionId> = HashSet::new();
            let mut stack: Vec<(&ActionId, Vec<&ActionId>)> = Vec::new();
            on_path.insert(start);
            stack.push((start, self.successors_of(start)));
            while let Some((node, pending)) = stack.last_mut() {
                let node = *node;
                match pending.pop() {
                    Some(next) if on_path.contains(next) => {
                        return Err(ConfigurationError::Cycle(next.clone()));
                    }
                    Some(next) if done.contains(next) => {}
                    Some(next) => {
                        on_path.insert(next);
                        stack.push((next, self.successors_of(next)));
                    }
                    None => {
                        on_path.remove(node);
                        done.insert(node);
                        stack.pop();
                    }
                }
            }
        }
        Ok(())
    }

    fn successors_of(&self, id: &ActionId) -> Vec<&ActionId> {
        self.actions
            .get(id)
            .map(|a| successors(a).collect())
            .unwrap_or_default()
    }
}

/// Ids an action can hand control to. A condition's own `next_action_id` is
/// never followed: its branches are terminal.
fn successors(action: &AutomationAction) -> Box<dyn Iterator<Item = &ActionId> + '_> {
    match &action.kind {
        ActionKind::Condition(config) => Box::new(
            config
                .true_actions
                .iter()
                .chain(config.false_actions.iter()),
        ),
        _ => Box::new(action.next_action_id.iter()),
    }
}

/// An automation whose definition passed validation, ready to walk.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledAutomation {
    definition: Automation,
    chain: ActionChain,
}

impl CompiledAutomation {
    #[must_use]
    pub fn definition(&self) -> &Automation {
        &self.definition
    }

    #[must_use]
    pub fn chain(&self) -> &ActionChain {
        &self.chain
    }

    #[must_use]
    pub fn id(&self) -> AutomationId {
        self.definition.id
    }

    #[must_use]
    pub fn owner_id(&self) -> OwnerId {
        self.definition.owner_id
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.definition.active
    }

    #[must_use]
    pub fn trigger(&self) -> &Trigger {
        &self.definition.trigger
    }

    #[must_use]
    pub fn into_definition(self) -> Automation {
        self.definition
    }
}

/// Step-by-step builder for [`Automation`].
#[derive(Debug, Default)]
pub struct AutomationBuilder {
    id: Option<AutomationId>,
    owner_id: Option<OwnerId>,
    name: Option<String>,
    active: Option<bool>,
    trigger: Option<Trigger>,
    actions: Vec<AutomationAction>,
    last_triggered: Option<Timestamp>,
}

impl AutomationBuilder {
    #[must_use]
    pub fn id(mut self, id: AutomationId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn owner(mut self, owner_id: OwnerId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    #[must_use]
    pub fn action(mut self, action: AutomationAction) -> Self {
        self.actions.push(action);
        self
    }

    #[must_use]
    pub fn last_triggered(mut self, ts: Timestamp) -> Self {
        self.last_triggered = Some(ts);
        self
    }

    /// Consume the builder, validate plain invariants, and return an [`Automation`].
    ///
    /// Chain structure is checked later by [`Automation::compile`].
    ///
    /// # Errors
    ///
    /// Returns [`ConvoFlowError::Validation`] if required fields are missing or empty.
    pub fn build(self) -> Result<Automation, ConvoFlowError> {
        let automation = Automation {
            id: self.id.unwrap_or_default(),
            owner_id: self.owner_id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            active: self.active.unwrap_or(true),
            trigger: self.trigger.unwrap_or(Trigger::Webhook),
            actions: self.actions,
            last_triggered: self.last_triggered,
        };
        automation.validate()?;
        Ok(automation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyword_trigger() -> Trigger {
        Trigger::Keyword {
            keywords: vec!["oi".to_string()],
        }
    }

    fn automation(actions: Vec<AutomationAction>) -> Automation {
        let mut builder = Automation::builder()
            .name("Welcome")
            .trigger(keyword_trigger());
        for action in actions {
            builder = builder.action(action);
        }
        builder.build().unwrap()
    }

    #[test]
    fn should_build_active_automation_when_required_fields_provided() {
        let auto = automation(vec![AutomationAction::new("1", ActionKind::text("hi"))]);
        assert!(auto.active);
        assert_eq!(auto.trigger_type(), TriggerType::Keyword);
        assert_eq!(auto.actions.len(), 1);
    }

    #[test]
    fn should_return_validation_error_when_name_is_empty() {
        let result = Automation::builder()
            .action(AutomationAction::new("1", ActionKind::text("hi")))
            .build();
        assert!(matches!(
            result,
            Err(ConvoFlowError::Validation(ValidationError::EmptyName))
        ));
    }

    #[test]
    fn should_return_validation_error_when_actions_is_empty() {
        let result = Automation::builder().name("Nothing").build();
        assert!(matches!(
            result,
            Err(ConvoFlowError::Validation(ValidationError::NoActions))
        ));
    }

    #[test]
    fn should_reject_schedule_trigger_with_bad_time() {
        let result = Automation::builder()
            .name("Morning")
            .trigger(Trigger::Schedule {
                time: "7 o'clock".to_string(),
                days: vec![],
                utc_offset_minutes: 0,
                audience_tags: vec![],
            })
            .action(AutomationAction::new("1", ActionKind::text("bom dia")))
            .build();
        assert!(matches!(
            result,
            Err(ConvoFlowError::Validation(
                ValidationError::InvalidScheduleTime(_)
            ))
        ));
    }

    #[test]
    fn should_compile_linear_chain_and_index_actions() {
        let compiled = automation(vec![
            AutomationAction::new("1", ActionKind::text("hi")).then("2"),
            AutomationAction::new("2", ActionKind::add_tag("novo_contato")),
        ])
        .compile()
        .unwrap();

        assert_eq!(compiled.chain().entry(), &ActionId::from("1"));
        assert_eq!(compiled.chain().len(), 2);
        assert!(compiled.chain().get(&ActionId::from("2")).is_some());
    }

    #[test]
    fn should_reject_duplicate_action_ids() {
        let result = automation(vec![
            AutomationAction::new("1", ActionKind::text("a")),
            AutomationAction::new("1", ActionKind::text("b")),
        ])
        .compile();
        assert!(matches!(
            result,
            Err(ConvoFlowError::Configuration(
                ConfigurationError::DuplicateActionId(_)
            ))
        ));
    }

    #[test]
    fn should_reject_dangling_next_action_id() {
        let result = automation(vec![
            AutomationAction::new("1", ActionKind::text("a")).then("7"),
        ])
        .compile();
        assert!(matches!(
            result,
            Err(ConvoFlowError::Configuration(
                ConfigurationError::DanglingReference { .. }
            ))
        ));
    }

    #[test]
    fn should_reject_dangling_branch_reference() {
        let condition = ActionKind::Condition(ConditionConfig {
            condition: Condition::new("age", ConditionOperator::GreaterThan, 18.into()),
            true_actions: vec![ActionId::from("2")],
            false_actions: vec![ActionId::from("3")],
        });
        let result = automation(vec![
            AutomationAction::new("1", condition),
            AutomationAction::new("2", ActionKind::text("adult")),
        ])
        .compile();
        assert!(matches!(
            result,
            Err(ConvoFlowError::Configuration(
                ConfigurationError::DanglingReference { .. }
            ))
        ));
    }

    #[test]
    fn should_reject_unknown_action_type() {
        let unknown = AutomationAction::new(
            "1",
            ActionKind::Unknown {
                action_type: "teleport".to_string(),
                config: serde_json::json!({}),
            },
        );
        let result = automation(vec![unknown]).compile();
        assert!(matches!(
            result,
            Err(ConvoFlowError::Configuration(
                ConfigurationError::UnknownActionType(_)
            ))
        ));
    }

    #[test]
    fn should_reject_chain_that_loops_back() {
        let result = automation(vec![
            AutomationAction::new("1", ActionKind::text("a")).then("2"),
            AutomationAction::new("2", ActionKind::add_tag("x")).then("1"),
        ])
        .compile();
        assert!(matches!(
            result,
            Err(ConvoFlowError::Configuration(ConfigurationError::Cycle(_)))
        ));
    }

    #[test]
    fn should_accept_branches_sharing_a_tail() {
        let condition = ActionKind::Condition(ConditionConfig {
            condition: Condition::new("age", ConditionOperator::GreaterThan, 18.into()),
            true_actions: vec![ActionId::from("2")],
            false_actions: vec![ActionId::from("3")],
        });
        let result = automation(vec![
            AutomationAction::new("1", condition),
            AutomationAction::new("2", ActionKind::text("adult")).then("4"),
            AutomationAction::new("3", ActionKind::text("minor")).then("4"),
            AutomationAction::new("4", ActionKind::add_tag("answered")),
        ])
        .compile();
        assert!(result.is_ok());
    }

    #[test]
    fn should_roundtrip_automation_through_serde_json() {
        let auto = automation(vec![
            AutomationAction::new("1", ActionKind::text("hi")).then("2"),
            AutomationAction::new("2", ActionKind::delay(30, DelayUnit::Minutes)),
        ]);
        let json = serde_json::to_string(&auto).unwrap();
        let parsed: Automation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, auto);
    }
}
