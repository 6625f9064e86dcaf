use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One input item handed to a node by the host.
#[derive(Debug, Clone, JsonSchema, Serialize, Deserialize)]
pub struct Message {
    id: String,
    payload: Value,
}

impl Message {
    pub fn new(id: &str, payload: Value) -> Self {
        Self {
            id: id.to_string(),
            payload,
        }
    }

    /// A message with a fresh id, for hosts that do not track their own.
    pub fn from_payload(payload: Value) -> Self {
        Self::new(&uuid::Uuid::new_v4().to_string(), payload)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> Value {
        self.payload.clone()
    }

    /// Per-item parameter overrides, read from `payload.parameters`.
    pub fn parameters(&self) -> Option<&Map<String, Value>> {
        self.payload.get("parameters").and_then(Value::as_object)
    }
}

/// One output record, paired with the index of the input item that produced it.
#[derive(Debug, Clone, PartialEq, JsonSchema, Serialize, Deserialize)]
pub struct NodeOutput {
    pub json: Value,
    pub paired_item: usize,
}

impl NodeOutput {
    pub fn new(json: Value, paired_item: usize) -> Self {
        Self { json, paired_item }
    }
}
