use std::borrow::Cow;
use std::fmt::{self, Debug};
use std::path::Path;

use async_trait::async_trait;
use schemars::{JsonSchema, Schema, SchemaGenerator, json_schema};
use serde::{Deserialize, Serialize};

use crate::config::ConfigManager;
use crate::logger::Logger;
use crate::message::{Message, NodeOutput};
use crate::plaid::PlaidNode;
use crate::secret::SecretsManager;

/// A unit of work the host can run against a batch of input items.
#[async_trait]
#[typetag::serde]
pub trait NodeType: Send + Sync + Debug {
    fn type_name(&self) -> String;
    /// Return this concrete type's schema.
    fn schema(&self) -> Schema;
    async fn execute(
        &self,
        items: Vec<Message>,
        context: &NodeContext,
    ) -> Result<Vec<NodeOutput>, NodeError>;
    fn clone_box(&self) -> Box<dyn NodeType>;
}

#[derive(Serialize, Deserialize)]
pub struct Node(pub Box<dyn NodeType>);

impl Node {
    /// Load a node definition such as `{ "plaid": { ... } }` from a YAML or
    /// JSON file. YAML is a superset of JSON, so one parser covers both.
    pub fn from_file(path: &Path) -> Result<Self, NodeError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            NodeError::InvalidInput(format!("could not read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, NodeError> {
        serde_yaml_bw::from_str(text)
            .map_err(|e| NodeError::InvalidInput(format!("invalid node definition: {}", e)))
    }
}

impl std::ops::Deref for Node {
    type Target = dyn NodeType;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl std::ops::DerefMut for Node {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.0
    }
}

impl Clone for Node {
    fn clone(&self) -> Self {
        Node(self.0.clone_box())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Node").field(&self.0).finish()
    }
}

impl JsonSchema for Node {
    fn schema_name() -> Cow<'static, str> {
        "Node".into()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        // one entry per concrete node type, keyed by its typetag name
        let plaid = generator.subschema_for::<PlaidNode>();
        json_schema!({
            "type": "object",
            "properties": {
                "plaid": plaid,
            },
            "additionalProperties": false,
            "minProperties": 1,
            "maxProperties": 1,
        })
    }
}

/// What a node gets from the host while it runs.
#[derive(Clone, Debug)]
pub struct NodeContext {
    config: ConfigManager,
    secrets: SecretsManager,
    logger: Logger,
}

impl NodeContext {
    pub fn new(config: ConfigManager, secrets: SecretsManager, logger: Logger) -> Self {
        Self {
            config,
            secrets,
            logger,
        }
    }

    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    pub fn secrets(&self) -> &SecretsManager {
        &self.secrets
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum NodeError {
    InvalidInput(String),
    ItemFailed {
        item_index: usize,
        code: String,
        message: String,
    },
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            NodeError::ItemFailed {
                item_index,
                code,
                message,
            } => write!(
                f,
                "Item {} failed: Plaid API Error ({}): {}",
                item_index, code, message
            ),
        }
    }
}

impl std::error::Error for NodeError {}
