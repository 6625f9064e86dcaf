use mockito::{Matcher, Server, ServerGuard};
use serde_json::{Value, json};

use greentic_plaid::config::{ConfigManager, MapConfigManager};
use greentic_plaid::logger::Logger;
use greentic_plaid::message::Message;
use greentic_plaid::node::{Node, NodeContext, NodeError};
use greentic_plaid::plaid::{
    PlaidCredentials, PlaidEnvironment, PlaidSettings, resolve_environment,
};
use greentic_plaid::secret::{SecretsManager, TestSecretsManager};

const SEARCH_NODE: &str = "plaid:\n  resource: institution\n  operation: search\n  query: unused\n";

const BASE_SECRETS: [(&str, &str); 3] = [
    ("PLAID_CLIENT_ID", "client-123"),
    ("PLAID_SECRET", "secret-456"),
    ("PLAID_ACCESS_TOKEN", "access-sandbox-abc"),
];

fn context_for(server: &ServerGuard, secrets: &[(&str, &str)]) -> NodeContext {
    let config = ConfigManager(MapConfigManager::with_entries([(
        "PLAID_BASE_URL",
        server.url(),
    )]));
    let secrets = SecretsManager(TestSecretsManager::with_secrets(secrets.iter().copied()));
    NodeContext::new(config, secrets, Logger::tracing())
}

fn node(yaml: &str) -> Node {
    Node::from_yaml(yaml).expect("node definition parses")
}

fn item(parameters: Value) -> Message {
    Message::from_payload(json!({ "parameters": parameters }))
}

#[tokio::test]
async fn sync_forwards_cursor_and_tags_records() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/transactions/sync")
        .match_header("plaid-client-id", "client-123")
        .match_header("plaid-version", "2020-09-14")
        .match_body(Matcher::PartialJson(json!({
            "client_id": "client-123",
            "secret": "secret-456",
            "access_token": "access-sandbox-abc",
            "cursor": "cursor-in",
            "count": 100
        })))
        .with_status(200)
        .with_body(
            json!({
                "added": [{"transaction_id": "t1", "amount": -12.5, "name": "Coffee"}],
                "modified": [{"transaction_id": "t2", "amount": 3.0}],
                "removed": [{"transaction_id": "t3"}],
                "next_cursor": "cursor-out",
                "has_more": false,
                "request_id": "req-1"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let context = context_for(&server, &BASE_SECRETS);
    let node = node("plaid:\n  resource: transaction\n  operation: sync\n  cursor: cursor-in\n");
    let outputs = node.execute(vec![item(json!({}))], &context).await.unwrap();

    mock.assert_async().await;
    assert_eq!(outputs.len(), 3);
    let added = &outputs[0].json;
    assert_eq!(added["sync_status"], "added");
    assert_eq!(added["amount"], 12.5);
    assert_eq!(added["transaction_type"], "expense");
    assert_eq!(added["next_cursor"], "cursor-out");
    assert_eq!(added["source"], "plaid_sync");
    assert_eq!(outputs[1].json["sync_status"], "modified");
    assert_eq!(outputs[1].json["amount"], 3.0);
    assert_eq!(outputs[2].json["transaction_id"], "t3");
    assert!(outputs.iter().all(|o| o.paired_item == 0));
}

#[tokio::test]
async fn sync_without_cursor_sends_none() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/transactions/sync")
        .match_request(|request| {
            let body: Value = serde_json::from_slice(request.body().unwrap()).unwrap();
            body.get("cursor").is_none()
        })
        .with_status(200)
        .with_body(r#"{"added":[],"modified":[],"removed":[],"next_cursor":"c1","has_more":true}"#)
        .create_async()
        .await;

    let context = context_for(&server, &BASE_SECRETS);
    let node = node("plaid:\n  resource: transaction\n  operation: sync\n");
    let outputs = node.execute(vec![item(json!({}))], &context).await.unwrap();

    mock.assert_async().await;
    assert!(outputs.is_empty());
}

#[tokio::test]
async fn item_parameters_override_node_defaults() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/transactions/get")
        .match_body(Matcher::PartialJson(json!({
            "start_date": "2024-01-01",
            "end_date": "2024-01-31",
            "options": {"count": 50, "offset": 10}
        })))
        .with_status(200)
        .with_body(
            json!({
                "transactions": [{"transaction_id": "t1", "amount": 20.0}],
                "total_transactions": 1
            })
            .to_string(),
        )
        .create_async()
        .await;

    let context = context_for(&server, &BASE_SECRETS);
    let node = node(
        "plaid:\n  resource: transaction\n  operation: getRange\n  start_date: 2023-01-01\n  end_date: 2023-12-31\n",
    );
    let outputs = node
        .execute(
            vec![item(json!({
                "startDate": "2024-01-01T00:00:00Z",
                "endDate": "2024-01-31T23:59:59Z",
                "limit": 50,
                "offset": 10
            }))],
            &context,
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].json["transaction_type"], "income");
    assert_eq!(outputs[0].json["total_transactions"], 1);
}

#[tokio::test]
async fn auth_joins_account_numbers() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/auth/get")
        .with_status(200)
        .with_body(
            json!({
                "accounts": [{"account_id": "a1"}, {"account_id": "a2"}],
                "numbers": {"ach": [
                    {"account_id": "a1", "routing": "011401533", "account": "1111222233330000", "wire_routing": "021000021"}
                ]}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let context = context_for(&server, &BASE_SECRETS);
    let node = node("plaid:\n  resource: auth\n  operation: get\n");
    let outputs = node.execute(vec![item(json!({}))], &context).await.unwrap();

    assert_eq!(outputs[0].json["routing_number"], "011401533");
    assert_eq!(outputs[0].json["account_number"], "1111222233330000");
    assert_eq!(outputs[0].json["wire_routing_number"], "021000021");
    assert_eq!(outputs[1].json["routing_number"], Value::Null);
    assert_eq!(outputs[1].json["source"], "plaid_auth");
}

#[tokio::test]
async fn outputs_follow_item_order() {
    let mut server = Server::new_async().await;
    let mut mocks = Vec::new();
    for (query, id) in [("chase", "ins_3"), ("wells", "ins_5")] {
        let mock = server
            .mock("POST", "/institutions/search")
            .match_body(Matcher::PartialJson(json!({"query": query})))
            .with_status(200)
            .with_body(
                json!({"institutions": [
                    {"institution_id": format!("{id}_a")},
                    {"institution_id": format!("{id}_b")}
                ]})
                .to_string(),
            )
            .create_async()
            .await;
        mocks.push(mock);
    }

    let context = context_for(&server, &BASE_SECRETS[..2]);
    let node = node(SEARCH_NODE);
    let outputs = node
        .execute(
            vec![item(json!({"query": "chase"})), item(json!({"query": "wells"}))],
            &context,
        )
        .await
        .unwrap();

    let pairs: Vec<(usize, &str)> = outputs
        .iter()
        .map(|o| (o.paired_item, o.json["institution_id"].as_str().unwrap()))
        .collect();
    assert_eq!(
        pairs,
        vec![(0, "ins_3_a"), (0, "ins_3_b"), (1, "ins_5_a"), (1, "ins_5_b")]
    );
    assert_eq!(outputs[0].json["search_query"], "chase");
    assert_eq!(outputs[3].json["search_query"], "wells");
    for mock in mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn continue_on_fail_emits_error_record() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/accounts/get")
        .with_status(400)
        .with_body(
            json!({
                "error_type": "INVALID_INPUT",
                "error_code": "INVALID_ACCESS_TOKEN",
                "error_message": "token invalid",
                "request_id": "req-err"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let context = context_for(&server, &BASE_SECRETS);
    let node = node("plaid:\n  resource: account\n  operation: getAll\n  continue_on_fail: true\n");
    let outputs = node.execute(vec![item(json!({}))], &context).await.unwrap();

    assert_eq!(outputs.len(), 1);
    let record = &outputs[0].json;
    assert_eq!(record["error"], true);
    assert_eq!(record["error_code"], "INVALID_ACCESS_TOKEN");
    assert_eq!(record["error_message"], "token invalid");
    assert_eq!(record["resource"], "account");
    assert_eq!(record["operation"], "getAll");
    assert!(record["processed_at"].is_string());
}

#[tokio::test]
async fn strict_mode_fails_with_item_index() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/item/get")
        .with_status(400)
        .with_body(r#"{"error_code":"ITEM_LOGIN_REQUIRED","error_message":"login required"}"#)
        .create_async()
        .await;

    let context = context_for(&server, &BASE_SECRETS);
    let node = node("plaid:\n  resource: item\n  operation: get\n");
    let err = node.execute(vec![item(json!({}))], &context).await.unwrap_err();

    match &err {
        NodeError::ItemFailed { item_index, code, message } => {
            assert_eq!(*item_index, 0);
            assert_eq!(code, "ITEM_LOGIN_REQUIRED");
            assert_eq!(message, "login required");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.to_string().contains("Plaid API Error (ITEM_LOGIN_REQUIRED): login required"));
}

/// `bad` answers with a Plaid error, `good` with two institutions.
async fn bad_then_good_search(server: &mut ServerGuard, good_calls: usize) -> Vec<mockito::Mock> {
    let bad = server
        .mock("POST", "/institutions/search")
        .match_body(Matcher::PartialJson(json!({"query": "bad"})))
        .with_status(400)
        .with_body(r#"{"error_code":"INVALID_ACCESS_TOKEN","error_message":"token invalid"}"#)
        .expect(1)
        .create_async()
        .await;
    let good = server
        .mock("POST", "/institutions/search")
        .match_body(Matcher::PartialJson(json!({"query": "good"})))
        .with_status(200)
        .with_body(r#"{"institutions":[{"institution_id":"i1"},{"institution_id":"i2"}]}"#)
        .expect(good_calls)
        .create_async()
        .await;
    vec![bad, good]
}

fn bad_then_good_items() -> Vec<Message> {
    vec![item(json!({"query": "bad"})), item(json!({"query": "good"}))]
}

#[tokio::test]
async fn continue_on_fail_moves_on_to_the_next_item() {
    let mut server = Server::new_async().await;
    let mocks = bad_then_good_search(&mut server, 1).await;

    let context = context_for(&server, &BASE_SECRETS[..2]);
    let node = node(&format!("{SEARCH_NODE}  continue_on_fail: true\n"));
    let outputs = node.execute(bad_then_good_items(), &context).await.unwrap();

    let summary: Vec<(usize, &str)> = outputs
        .iter()
        .map(|o| {
            let json = &o.json;
            let label = json["error_code"].as_str().or(json["institution_id"].as_str());
            (o.paired_item, label.unwrap())
        })
        .collect();
    assert_eq!(
        summary,
        vec![(0, "INVALID_ACCESS_TOKEN"), (1, "i1"), (1, "i2")]
    );
    assert_eq!(outputs[0].json["error"], true);
    for mock in mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn strict_mode_stops_before_the_next_item() {
    let mut server = Server::new_async().await;
    let mocks = bad_then_good_search(&mut server, 0).await;

    let context = context_for(&server, &BASE_SECRETS[..2]);
    let node = node(SEARCH_NODE);
    let err = node.execute(bad_then_good_items(), &context).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "Item 0 failed: Plaid API Error (INVALID_ACCESS_TOKEN): token invalid"
    );
    for mock in mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn public_token_is_exchanged_before_the_call() {
    let mut server = Server::new_async().await;
    let exchange = server
        .mock("POST", "/item/public_token/exchange")
        .match_body(Matcher::PartialJson(json!({"public_token": "public-sandbox-xyz"})))
        .with_status(200)
        .with_body(r#"{"access_token":"access-from-exchange","item_id":"item-1","request_id":"r"}"#)
        .create_async()
        .await;
    let accounts = server
        .mock("POST", "/accounts/balance/get")
        .match_body(Matcher::PartialJson(json!({"access_token": "access-from-exchange"})))
        .with_status(200)
        .with_body(r#"{"accounts":[{"account_id":"a1","balances":{"current":10.5}}]}"#)
        .create_async()
        .await;

    let secrets = [
        ("PLAID_CLIENT_ID", "client-123"),
        ("PLAID_SECRET", "secret-456"),
        ("PLAID_PUBLIC_TOKEN", "public-sandbox-xyz"),
        ("PLAID_AUTH_METHOD", "public_token"),
    ];
    let context = context_for(&server, &secrets);
    let node = node("plaid:\n  resource: account\n  operation: getBalances\n");
    let outputs = node.execute(vec![item(json!({}))], &context).await.unwrap();

    exchange.assert_async().await;
    accounts.assert_async().await;
    assert_eq!(outputs[0].json["realtime"], true);
    assert_eq!(outputs[0].json["source"], "plaid_balances");
}

#[tokio::test]
async fn client_only_credentials_cannot_reach_item_data() {
    let server = Server::new_async().await;
    let context = context_for(&server, &BASE_SECRETS[..2]);
    let node = node("plaid:\n  resource: identity\n  operation: get\n  continue_on_fail: true\n");
    let outputs = node.execute(vec![item(json!({}))], &context).await.unwrap();

    assert_eq!(outputs[0].json["error_code"], "AUTH_RESOLUTION_ERROR");
}

#[tokio::test]
async fn missing_client_id_is_invalid_input() {
    let server = Server::new_async().await;
    let context = context_for(&server, &[("PLAID_SECRET", "secret-456")]);
    let node = node("plaid:\n  resource: item\n  operation: get\n");
    let err = node.execute(vec![item(json!({}))], &context).await.unwrap_err();

    assert!(matches!(err, NodeError::InvalidInput(ref msg) if msg.contains("PLAID_CLIENT_ID")));
}

#[test]
fn production_environment_selects_production_host() {
    let credentials = PlaidCredentials::new(PlaidEnvironment::Production, "client-123", "secret-456");
    let resolved = resolve_environment(&credentials, &PlaidSettings::default()).unwrap();
    assert_eq!(resolved.base_url, "https://production.plaid.com");

    let credentials = PlaidCredentials::new(PlaidEnvironment::Sandbox, "client-123", "secret-456");
    let resolved = resolve_environment(&credentials, &PlaidSettings::default()).unwrap();
    assert_eq!(resolved.base_url, "https://sandbox.plaid.com");
}
