use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use schemars::{JsonSchema, Schema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::auth::{AccessTokenResolver, resolver_for};
use super::client::PlaidClient;
use super::credentials::PlaidCredentials;
use super::error::{PlaidError, error_record};
use super::mapping::map_response;
use super::operation::PlaidOperation;
use super::settings::PlaidSettings;
use crate::logger::LogLevel;
use crate::message::{Message, NodeOutput};
use crate::node::{NodeContext, NodeError, NodeType};

/// Calls one Plaid endpoint per input item.
///
/// ```yaml
/// plaid:
///   resource: transaction
///   operation: sync
///   count: 200
///   continue_on_fail: true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlaidNode {
    #[serde(flatten)]
    pub operation: PlaidOperation,
    /// Emit an error record for a failed item and keep going, instead of
    /// failing the whole batch.
    #[serde(default, alias = "continueOnFail")]
    pub continue_on_fail: bool,
}

impl PlaidNode {
    pub fn new(operation: PlaidOperation) -> Self {
        Self {
            operation,
            continue_on_fail: false,
        }
    }

    pub fn continue_on_fail(mut self, enabled: bool) -> Self {
        self.continue_on_fail = enabled;
        self
    }

    async fn run_item(
        &self,
        item: &Message,
        client: &PlaidClient,
        resolver: &dyn AccessTokenResolver,
    ) -> Result<Vec<Value>, PlaidError> {
        let operation = self.operation.with_item_parameters(item.parameters())?;
        let mut body = operation.request_body()?;

        if operation.needs_access_token() {
            let token = resolver.resolve(client).await?;
            body.insert("access_token".into(), Value::String(token));
        }

        let response = client.post(operation.endpoint(), body).await?;
        map_response(&operation, &response, &now())
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[typetag::serde(name = "plaid")]
#[async_trait]
impl NodeType for PlaidNode {
    fn type_name(&self) -> String {
        "plaid".to_string()
    }

    fn schema(&self) -> Schema {
        schema_for!(PlaidNode)
    }

    #[tracing::instrument(
        name = "plaid_node_execute",
        skip(self, items, context),
        fields(
            resource = self.operation.resource_name(),
            operation = self.operation.operation_name(),
            items = items.len()
        )
    )]
    async fn execute(
        &self,
        items: Vec<Message>,
        context: &NodeContext,
    ) -> Result<Vec<NodeOutput>, NodeError> {
        let credentials = PlaidCredentials::from_secrets(context.secrets())
            .await
            .map_err(|e| NodeError::InvalidInput(e.to_string()))?;
        let settings = PlaidSettings::from_config(context.config()).await;
        let client = PlaidClient::new(&credentials, &settings)
            .map_err(|e| NodeError::InvalidInput(e.to_string()))?;
        let resolver = resolver_for(&credentials);

        let resource = self.operation.resource_name();
        let operation = self.operation.operation_name();
        let mut outputs = Vec::new();

        for (index, item) in items.iter().enumerate() {
            match self.run_item(item, &client, resolver.as_ref()).await {
                Ok(records) => {
                    outputs.extend(records.into_iter().map(|json| NodeOutput::new(json, index)));
                }
                Err(err) if self.continue_on_fail => {
                    warn!(
                        item = index,
                        item_id = item.id(),
                        code = err.code(),
                        "Plaid item failed, continuing"
                    );
                    context.logger().log(
                        LogLevel::Warn,
                        "plaid",
                        &format!("item {index} failed: {err}"),
                    );
                    outputs.push(NodeOutput::new(
                        error_record(&err, resource, operation, &now()),
                        index,
                    ));
                }
                Err(err) => {
                    return Err(NodeError::ItemFailed {
                        item_index: index,
                        code: err.code().to_string(),
                        message: err.message().to_string(),
                    });
                }
            }
        }

        info!(records = outputs.len(), "Plaid node finished");
        Ok(outputs)
    }

    fn clone_box(&self) -> Box<dyn NodeType> {
        Box::new(self.clone())
    }
}
