use std::{fs, path::{Path, PathBuf}};

use anyhow::{Context, bail};
use clap::Args;
use serde_json::{Value, json};
use tracing::{error, info};

use super::{CliContext, LogArgs};
use greentic_plaid::logger::init_tracing;
use greentic_plaid::message::Message;
use greentic_plaid::node::{Node, NodeContext};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML node definition, e.g. `plaid: { resource: transaction, operation: sync }`
    #[arg(long)]
    pub node: PathBuf,

    /// JSON array of item payloads; one empty item when omitted
    #[arg(long)]
    pub items: Option<PathBuf>,

    #[command(flatten)]
    pub log: LogArgs,
}

pub async fn execute(args: RunArgs, context: &CliContext) -> anyhow::Result<()> {
    let (logger, guard) = init_tracing(&args.log.to_config(&context.root))?;

    let node = Node::from_file(&args.node)
        .with_context(|| format!("could not load node from {}", args.node.display()))?;
    let items = match &args.items {
        Some(path) => load_items(path)?,
        None => vec![Message::from_payload(json!({}))],
    };
    info!(node = %node.type_name(), items = items.len(), "running node");

    let node_context = NodeContext::new(
        context.config_manager.clone(),
        context.secrets_manager.clone(),
        logger,
    );
    let result = node.execute(items, &node_context).await;
    guard.shutdown();

    match result {
        Ok(outputs) => {
            println!("{}", serde_json::to_string_pretty(&outputs)?);
            Ok(())
        }
        Err(err) => {
            error!("node failed: {err}");
            bail!(err)
        }
    }
}

fn load_items(path: &Path) -> anyhow::Result<Vec<Message>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    match value {
        Value::Array(payloads) => Ok(payloads.into_iter().map(Message::from_payload).collect()),
        other => Ok(vec![Message::from_payload(other)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_array_of_payloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("items.json");
        fs::write(&path, r#"[{"parameters":{"cursor":"a"}},{"parameters":{"cursor":"b"}}]"#).unwrap();

        let items = load_items(&path).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].parameters().unwrap()["cursor"], "b");
    }

    #[test]
    fn single_object_is_one_item() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("item.json");
        fs::write(&path, r#"{"parameters":{"query":"chase"}}"#).unwrap();
        assert_eq!(load_items(&path).unwrap().len(), 1);
    }

    #[test]
    fn rejects_bad_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "not json").unwrap();
        assert!(load_items(&path).is_err());
    }
}
