use std::collections::HashMap;

use serde_json::{Map, Value};

use convoflow_app::ports::{MessageTemplate, TemplateRenderer};
use convoflow_domain::contact::Contact;
use convoflow_domain::error::{ConvoFlowError, NotFoundError};

/// Renders `{{key}}` and `{{ key }}` placeholders.
///
/// Values come from, in increasing precedence: the contact's built-in
/// attributes (`name`, `phone`, `email`, `identifier`), its custom fields,
/// and the action's variables. Unknown placeholders are left as written.
#[derive(Debug, Default, Clone)]
pub struct PlaceholderRenderer {
    templates: HashMap<String, String>,
}

impl PlaceholderRenderer {
    /// A renderer resolving stored template ids against `templates`.
    #[must_use]
    pub fn new(templates: HashMap<String, String>) -> Self {
        Self { templates }
    }

    fn values(contact: &Contact, variables: &Map<String, Value>) -> HashMap<String, String> {
        let mut values = HashMap::new();
        let builtins = [
            ("name", contact.name.as_deref()),
            ("phone", contact.phone.as_deref()),
            ("email", contact.email.as_deref()),
            ("identifier", Some(contact.identifier.as_str())),
        ];
        for (key, value) in builtins {
            values.insert(key.to_string(), value.unwrap_or_default().to_string());
        }
        for (key, value) in contact.custom_fields.iter().chain(variables) {
            values.insert(key.clone(), text(value));
        }
        values
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl TemplateRenderer for PlaceholderRenderer {
    async fn render(
        &self,
        template: MessageTemplate<'_>,
        contact: &Contact,
        variables: &Map<String, Value>,
    ) -> Result<String, ConvoFlowError> {
        let source = match template {
            MessageTemplate::Inline(text) => text,
            MessageTemplate::Stored(id) => self
                .templates
                .get(id)
                .map(String::as_str)
                .ok_or_else(|| NotFoundError {
                    entity: "Template",
                    id: id.to_string(),
                })?,
        };
        let mut rendered = source.to_string();
        for (key, value) in Self::values(contact, variables) {
            rendered = rendered.replace(&format!("{{{{{key}}}}}"), &value);
            rendered = rendered.replace(&format!("{{{{ {key} }}}}"), &value);
        }
        Ok(rendered)
    }
}
