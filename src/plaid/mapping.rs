//! Shape Plaid responses into flat output records.

use serde_json::{Map, Value, json};

use super::error::PlaidError;
use super::helpers::{enrich_transaction, format_transaction_amount};
use super::operation::{
    AccountOperation, InstitutionOperation, ItemOperation, LinkTokenOperation, PlaidOperation,
    TransactionOperation,
};

const LINK_TOKEN_NEXT_STEP: &str =
    "Open Plaid Link with link_token, then exchange the returned public_token with the linkToken exchangeToken operation";
const EXCHANGE_NEXT_STEP: &str =
    "Store access_token as PLAID_ACCESS_TOKEN; it does not expire and grants access to this item";

/// Map one successful response into records, each stamped with the
/// operation's `source` and `processed_at`.
pub fn map_response(
    operation: &PlaidOperation,
    response: &Value,
    processed_at: &str,
) -> Result<Vec<Value>, PlaidError> {
    use PlaidOperation::*;
    let enrich = operation.enrich();

    let mut records = match operation {
        Transaction(TransactionOperation::Sync(_)) => sync_records(response, enrich),
        Transaction(TransactionOperation::GetRange(_)) => {
            let total = response.get("total_transactions").cloned().unwrap_or(Value::Null);
            array(response, "transactions")
                .iter()
                .map(|tx| {
                    let mut record = transaction_record(tx, enrich);
                    record.insert("total_transactions".into(), total.clone());
                    record
                })
                .collect()
        }
        Account(op) => {
            let realtime = matches!(op, AccountOperation::GetBalances);
            array(response, "accounts")
                .iter()
                .map(|account| {
                    let mut record = object(account);
                    if realtime {
                        record.insert("realtime".into(), json!(true));
                    }
                    record
                })
                .collect()
        }
        Auth(_) => auth_records(response),
        Institution(InstitutionOperation::Search(params)) => array(response, "institutions")
            .iter()
            .map(|institution| {
                let mut record = object(institution);
                record.insert("search_query".into(), json!(params.query.trim()));
                record
            })
            .collect(),
        Institution(InstitutionOperation::GetById(_)) => vec![single(response, "institution")?],
        Item(ItemOperation::Get) => vec![single(response, "item")?],
        Item(ItemOperation::Remove) => {
            let mut record = Map::new();
            record.insert("removed".into(), json!(true));
            record.insert("request_id".into(), field(response, "request_id"));
            vec![record]
        }
        Identity(_) => identity_records(response),
        LinkToken(LinkTokenOperation::Create(_)) => {
            let mut record = Map::new();
            record.insert("link_token".into(), field(response, "link_token"));
            record.insert("expiration".into(), field(response, "expiration"));
            record.insert("request_id".into(), field(response, "request_id"));
            record.insert("next_step".into(), json!(LINK_TOKEN_NEXT_STEP));
            vec![record]
        }
        LinkToken(LinkTokenOperation::ExchangeToken(_)) => {
            let mut record = Map::new();
            record.insert("access_token".into(), field(response, "access_token"));
            record.insert("item_id".into(), field(response, "item_id"));
            record.insert("request_id".into(), field(response, "request_id"));
            record.insert("next_step".into(), json!(EXCHANGE_NEXT_STEP));
            vec![record]
        }
    };

    let source = operation.source();
    Ok(records
        .iter_mut()
        .map(|record| {
            record.insert("source".into(), json!(source));
            record.insert("processed_at".into(), json!(processed_at));
            Value::Object(std::mem::take(record))
        })
        .collect())
}

fn sync_records(response: &Value, enrich: bool) -> Vec<Map<String, Value>> {
    let next_cursor = field(response, "next_cursor");
    let has_more = response
        .get("has_more")
        .or_else(|| response.get("has_next"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let tag = |mut record: Map<String, Value>, status: &str| {
        record.insert("sync_status".into(), json!(status));
        record.insert("next_cursor".into(), next_cursor.clone());
        record.insert("has_more".into(), json!(has_more));
        record
    };

    let added = array(response, "added")
        .iter()
        .map(|tx| tag(transaction_record(tx, enrich), "added"));
    let modified = array(response, "modified").iter().map(|tx| tag(object(tx), "modified"));
    let removed = array(response, "removed").iter().map(|tx| {
        let mut record = Map::new();
        record.insert("transaction_id".into(), field(tx, "transaction_id"));
        tag(record, "removed")
    });

    added.chain(modified).chain(removed).collect()
}

/// Full transaction plus the absolute `amount` and its `transaction_type`.
fn transaction_record(tx: &Value, enrich: bool) -> Map<String, Value> {
    let mut record = object(tx);
    if enrich {
        enrich_transaction(&mut record);
    }
    if let Some(amount) = record.get("amount").and_then(Value::as_f64) {
        let formatted = format_transaction_amount(amount);
        record.insert("amount".into(), json!(formatted.amount));
        record.insert("transaction_type".into(), json!(formatted.transaction_type));
    }
    record
}

fn auth_records(response: &Value) -> Vec<Map<String, Value>> {
    let ach = response
        .get("numbers")
        .and_then(|n| n.get("ach"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    array(response, "accounts")
        .iter()
        .map(|account| {
            let mut record = object(account);
            let account_id = account.get("account_id");
            let numbers = ach
                .iter()
                .find(|entry| account_id.is_some() && entry.get("account_id") == account_id);
            let number = |key: &str| numbers.map(|n| field(n, key)).unwrap_or(Value::Null);
            record.insert("routing_number".into(), number("routing"));
            record.insert("account_number".into(), number("account"));
            record.insert("wire_routing_number".into(), number("wire_routing"));
            record
        })
        .collect()
}

fn identity_records(response: &Value) -> Vec<Map<String, Value>> {
    let identities = array(response, "identity");
    array(response, "accounts")
        .iter()
        .map(|account| {
            let mut record = object(account);
            let owners = account
                .get("owners")
                .filter(|o| o.is_array())
                .or_else(|| {
                    identities
                        .iter()
                        .find(|id| id.get("account_id") == account.get("account_id"))
                        .and_then(|id| id.get("owners"))
                })
                .cloned()
                .unwrap_or_else(|| json!([]));
            record.insert("owners".into(), owners);
            record
        })
        .collect()
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn object(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn field(value: &Value, key: &str) -> Value {
    value.get(key).cloned().unwrap_or(Value::Null)
}

fn single(response: &Value, key: &str) -> Result<Map<String, Value>, PlaidError> {
    response
        .get(key)
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| PlaidError::Transport(format!("response has no `{key}` object")))
}
