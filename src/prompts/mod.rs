//! Prompt Registry: backs `prompts/list` and `prompts/get`.
//!
//! Prompts get their own registry rather than being inlined into the
//! protocol engine, mirroring the shape of the Tool Registry: static,
//! builder-constructed at startup, read-only thereafter.

use crate::error::PromptError;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A single named, parameterized prompt template.
#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// The wire shape of a prompt descriptor in `prompts/list`.
#[derive(Debug, Clone, Serialize)]
pub struct PromptDescriptor {
    pub name: String,
    pub title: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
}

/// A rendered message in a `prompts/get` response.
#[derive(Debug, Clone, Serialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: PromptContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PromptContent {
    Text { text: String },
}

/// A named, parameterized template rendered into a message sequence on
/// request.
pub trait Prompt: Send + Sync {
    fn descriptor(&self) -> PromptDescriptor;

    /// Render this prompt's messages given the caller's arguments. Required
    /// arguments missing from `arguments` must fail `InvalidArguments`.
    fn render(&self, arguments: &Value) -> Result<Vec<PromptMessage>, PromptError>;
}

/// Static catalog of prompts, registered at process start.
pub struct PromptRegistry {
    prompts: HashMap<String, Arc<dyn Prompt>>,
    order: Vec<String>,
}

impl PromptRegistry {
    pub fn builder() -> PromptRegistryBuilder {
        PromptRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Prompt>> {
        self.prompts.get(name)
    }

    pub fn descriptors(&self) -> Vec<PromptDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.prompts.get(name))
            .map(|prompt| prompt.descriptor())
            .collect()
    }
}

#[derive(Default)]
pub struct PromptRegistryBuilder {
    prompts: HashMap<String, Arc<dyn Prompt>>,
    order: Vec<String>,
}

impl PromptRegistryBuilder {
    pub fn register(mut self, prompt: Arc<dyn Prompt>) -> Self {
        let name = prompt.descriptor().name;
        assert!(
            !self.prompts.contains_key(&name),
            "duplicate prompt registration: {name}"
        );
        self.order.push(name.clone());
        self.prompts.insert(name, prompt);
        self
    }

    pub fn build(self) -> PromptRegistry {
        PromptRegistry {
            prompts: self.prompts,
            order: self.order,
        }
    }
}

/// A prompt that asks the assistant to research a topic using the corpus,
/// citing sources by id.
pub struct ResearchTopicPrompt;

impl Prompt for ResearchTopicPrompt {
    fn descriptor(&self) -> PromptDescriptor {
        PromptDescriptor {
            name: "research_topic".to_string(),
            title: "Research a topic".to_string(),
            description:
                "Search the knowledge corpus for a topic and produce a cited summary.".to_string(),
            arguments: vec![PromptArgument {
                name: "topic".to_string(),
                description: "the topic to research".to_string(),
                required: true,
            }],
        }
    }

    fn render(&self, arguments: &Value) -> Result<Vec<PromptMessage>, PromptError> {
        let topic = arguments
            .get("topic")
            .and_then(Value::as_str)
            .ok_or_else(|| PromptError::InvalidArguments("'topic' is required".to_string()))?;

        Ok(vec![PromptMessage {
            role: "user".to_string(),
            content: PromptContent::Text {
                text: format!(
                    "Use the `search` tool to research \"{topic}\" in the knowledge corpus, \
                     then summarize the findings and cite each claim with the document id it \
                     came from."
                ),
            },
        }])
    }
}

/// A prompt that asks the assistant to compare coverage of a topic across
/// sources (e.g. does a book and a news article agree).
pub struct CompareSourcesPrompt;

impl Prompt for CompareSourcesPrompt {
    fn descriptor(&self) -> PromptDescriptor {
        PromptDescriptor {
            name: "compare_sources".to_string(),
            title: "Compare source coverage".to_string(),
            description: "Compare how different sources in the corpus cover the same topic."
                .to_string(),
            arguments: vec![PromptArgument {
                name: "topic".to_string(),
                description: "the topic to compare across sources".to_string(),
                required: true,
            }],
        }
    }

    fn render(&self, arguments: &Value) -> Result<Vec<PromptMessage>, PromptError> {
        let topic = arguments
            .get("topic")
            .and_then(Value::as_str)
            .ok_or_else(|| PromptError::InvalidArguments("'topic' is required".to_string()))?;

        Ok(vec![PromptMessage {
            role: "user".to_string(),
            content: PromptContent::Text {
                text: format!(
                    "Use `list_sources` to see which sources are available, then `search` for \
                     \"{topic}\" restricted to each source in turn. Compare how the sources \
                     describe the topic and note any disagreement."
                ),
            },
        }])
    }
}

/// The default prompt set this server registers at startup.
pub fn default_registry() -> PromptRegistry {
    PromptRegistry::builder()
        .register(Arc::new(ResearchTopicPrompt))
        .register(Arc::new(CompareSourcesPrompt))
        .build()
}
