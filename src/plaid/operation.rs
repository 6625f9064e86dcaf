//! The closed set of Plaid calls the node can make, with their parameters.
//!
//! Serialised flat as `{ "resource": "...", "operation": "...", <params> }`.

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::error::PlaidError;
use super::helpers::{format_date, parse_account_ids};

pub const DEFAULT_COUNT: u32 = 100;
pub const MAX_COUNT: u32 = 500;
pub const DEFAULT_COUNTRY_CODE: &str = "US";
pub const DEFAULT_PRODUCT: &str = "transactions";
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "resource", rename_all = "camelCase")]
pub enum PlaidOperation {
    Transaction(TransactionOperation),
    Account(AccountOperation),
    Auth(AuthOperation),
    Institution(InstitutionOperation),
    Item(ItemOperation),
    Identity(IdentityOperation),
    LinkToken(LinkTokenOperation),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum TransactionOperation {
    /// Incremental updates since `cursor`.
    Sync(SyncParams),
    /// Transactions between two dates.
    GetRange(GetRangeParams),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum AccountOperation {
    GetAll,
    /// Real-time balances; slower than cached account data.
    GetBalances,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum AuthOperation {
    Get,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum InstitutionOperation {
    Search(InstitutionSearchParams),
    GetById(InstitutionGetParams),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum ItemOperation {
    Get,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum IdentityOperation {
    Get,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum LinkTokenOperation {
    Create(LinkTokenCreateParams),
    ExchangeToken(ExchangeTokenParams),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SyncParams {
    /// Opaque marker returned as `next_cursor` by the previous sync. Omit or
    /// leave empty for a full initial sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Comma separated. Sync accepts at most one account.
    #[serde(default, alias = "accountIds", skip_serializing_if = "Option::is_none")]
    pub account_ids: Option<String>,
    #[serde(default, alias = "includeOriginalDescription")]
    pub include_original_description: bool,
    #[serde(default)]
    pub enrich: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GetRangeParams {
    /// `YYYY-MM-DD`; anything after a `T` is dropped.
    #[serde(default, alias = "startDate")]
    pub start_date: String,
    #[serde(default, alias = "endDate")]
    pub end_date: String,
    #[serde(default, alias = "limit", skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    /// Ask for the maximum page size instead of `count`.
    #[serde(default, alias = "returnAll")]
    pub return_all: bool,
    #[serde(default, alias = "accountIds", skip_serializing_if = "Option::is_none")]
    pub account_ids: Option<String>,
    #[serde(default, alias = "includeOriginalDescription")]
    pub include_original_description: bool,
    #[serde(default)]
    pub enrich: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InstitutionSearchParams {
    #[serde(default)]
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub products: Option<Vec<String>>,
    #[serde(default, alias = "countryCodes", skip_serializing_if = "Option::is_none")]
    pub country_codes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InstitutionGetParams {
    #[serde(default, alias = "institutionId")]
    pub institution_id: String,
    #[serde(default, alias = "countryCodes", skip_serializing_if = "Option::is_none")]
    pub country_codes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LinkTokenCreateParams {
    /// Stable id of the end user in the calling system.
    #[serde(default, alias = "userId")]
    pub user_id: String,
    #[serde(default, alias = "clientName")]
    pub client_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub products: Option<Vec<String>>,
    #[serde(default, alias = "countryCodes", skip_serializing_if = "Option::is_none")]
    pub country_codes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExchangeTokenParams {
    #[serde(default, alias = "publicToken")]
    pub public_token: String,
}

impl PlaidOperation {
    pub fn resource_name(&self) -> &'static str {
        match self {
            PlaidOperation::Transaction(_) => "transaction",
            PlaidOperation::Account(_) => "account",
            PlaidOperation::Auth(_) => "auth",
            PlaidOperation::Institution(_) => "institution",
            PlaidOperation::Item(_) => "item",
            PlaidOperation::Identity(_) => "identity",
            PlaidOperation::LinkToken(_) => "linkToken",
        }
    }

    pub fn operation_name(&self) -> &'static str {
        use PlaidOperation::*;
        match self {
            Transaction(TransactionOperation::Sync(_)) => "sync",
            Transaction(TransactionOperation::GetRange(_)) => "getRange",
            Account(AccountOperation::GetAll) => "getAll",
            Account(AccountOperation::GetBalances) => "getBalances",
            Auth(AuthOperation::Get)
            | Item(ItemOperation::Get)
            | Identity(IdentityOperation::Get) => "get",
            Institution(InstitutionOperation::Search(_)) => "search",
            Institution(InstitutionOperation::GetById(_)) => "getById",
            Item(ItemOperation::Remove) => "remove",
            LinkToken(LinkTokenOperation::Create(_)) => "create",
            LinkToken(LinkTokenOperation::ExchangeToken(_)) => "exchangeToken",
        }
    }

    pub fn endpoint(&self) -> &'static str {
        use PlaidOperation::*;
        match self {
            Transaction(TransactionOperation::Sync(_)) => "/transactions/sync",
            Transaction(TransactionOperation::GetRange(_)) => "/transactions/get",
            Account(AccountOperation::GetAll) => "/accounts/get",
            Account(AccountOperation::GetBalances) => "/accounts/balance/get",
            Auth(AuthOperation::Get) => "/auth/get",
            Institution(InstitutionOperation::Search(_)) => "/institutions/search",
            Institution(InstitutionOperation::GetById(_)) => "/institutions/get_by_id",
            Item(ItemOperation::Get) => "/item/get",
            Item(ItemOperation::Remove) => "/item/remove",
            Identity(IdentityOperation::Get) => "/identity/get",
            LinkToken(LinkTokenOperation::Create(_)) => "/link/token/create",
            LinkToken(LinkTokenOperation::ExchangeToken(_)) => "/item/public_token/exchange",
        }
    }

    /// Tag stamped on every record as `source`.
    pub fn source(&self) -> &'static str {
        use PlaidOperation::*;
        match self {
            Transaction(TransactionOperation::Sync(_)) => "plaid_sync",
            Transaction(TransactionOperation::GetRange(_)) => "plaid_get",
            Account(AccountOperation::GetAll) => "plaid_accounts",
            Account(AccountOperation::GetBalances) => "plaid_balances",
            Auth(_) => "plaid_auth",
            Institution(InstitutionOperation::Search(_)) => "plaid_institutions",
            Institution(InstitutionOperation::GetById(_)) => "plaid_institution_details",
            Item(ItemOperation::Get) => "plaid_item",
            Item(ItemOperation::Remove) => "plaid_item_remove",
            Identity(_) => "plaid_identity",
            LinkToken(LinkTokenOperation::Create(_)) => "plaid_link_token",
            LinkToken(LinkTokenOperation::ExchangeToken(_)) => "plaid_token_exchange",
        }
    }

    pub fn needs_access_token(&self) -> bool {
        !matches!(self, PlaidOperation::Institution(_) | PlaidOperation::LinkToken(_))
    }

    /// Whether transaction records get the category/recurring/score fields.
    pub fn enrich(&self) -> bool {
        match self {
            PlaidOperation::Transaction(TransactionOperation::Sync(p)) => p.enrich,
            PlaidOperation::Transaction(TransactionOperation::GetRange(p)) => p.enrich,
            _ => false,
        }
    }

    /// Overlay one item's `parameters` onto the node's configured operation.
    /// `resource` and `operation` always come from the node.
    pub fn with_item_parameters(&self, overrides: Option<&Map<String, Value>>) -> Result<Self, PlaidError> {
        let Some(overrides) = overrides.filter(|o| !o.is_empty()) else {
            return Ok(self.clone());
        };

        let mut merged = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                return Err(PlaidError::Parameter("node parameters could not be merged".into()));
            }
        };
        for (key, value) in overrides {
            if key != "resource" && key != "operation" {
                merged.insert(field_name(key), value.clone());
            }
        }

        serde_json::from_value(Value::Object(merged))
            .map_err(|e| PlaidError::Parameter(format!("invalid item parameters: {e}")))
    }

    /// Validate the parameters and build the request body, minus credentials
    /// and access token.
    pub fn request_body(&self) -> Result<Map<String, Value>, PlaidError> {
        use PlaidOperation::*;
        let mut body = Map::new();
        match self {
            Transaction(TransactionOperation::Sync(p)) => sync_body(p, &mut body)?,
            Transaction(TransactionOperation::GetRange(p)) => range_body(p, &mut body)?,
            Institution(InstitutionOperation::Search(p)) => {
                body.insert("query".into(), json!(required("query", &p.query)?));
                body.insert("products".into(), json!(list_or(&p.products, DEFAULT_PRODUCT)));
                body.insert("country_codes".into(), json!(country_codes(&p.country_codes)));
            }
            Institution(InstitutionOperation::GetById(p)) => {
                body.insert(
                    "institution_id".into(),
                    json!(required("institution_id", &p.institution_id)?),
                );
                body.insert("country_codes".into(), json!(country_codes(&p.country_codes)));
                body.insert(
                    "options".into(),
                    json!({"include_optional_metadata": true, "include_status": true}),
                );
            }
            LinkToken(LinkTokenOperation::Create(p)) => {
                let user_id = required("user_id", &p.user_id)?;
                body.insert("user".into(), json!({ "client_user_id": user_id }));
                body.insert("client_name".into(), json!(required("client_name", &p.client_name)?));
                body.insert("products".into(), json!(list_or(&p.products, DEFAULT_PRODUCT)));
                body.insert("country_codes".into(), json!(country_codes(&p.country_codes)));
                let language = p
                    .language
                    .as_deref()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .unwrap_or(DEFAULT_LANGUAGE);
                body.insert("language".into(), json!(language));
            }
            LinkToken(LinkTokenOperation::ExchangeToken(p)) => {
                body.insert("public_token".into(), json!(required("public_token", &p.public_token)?));
            }
            Account(_) | Auth(_) | Item(_) | Identity(_) => {}
        }
        Ok(body)
    }
}

fn sync_body(p: &SyncParams, body: &mut Map<String, Value>) -> Result<(), PlaidError> {
    // the cursor is opaque: forwarded byte for byte, empty means "from the start"
    if let Some(cursor) = p.cursor.as_deref().filter(|c| !c.is_empty()) {
        body.insert("cursor".into(), json!(cursor));
    }
    body.insert("count".into(), json!(page_size(p.count, false)?));

    match p.account_ids.as_deref().and_then(parse_account_ids).as_deref() {
        None => {}
        Some([single]) => {
            body.insert("account_id".into(), json!(single));
        }
        Some(_) => {
            return Err(PlaidError::Parameter(
                "transaction sync accepts a single account id".into(),
            ));
        }
    }

    if p.include_original_description {
        body.insert("options".into(), json!({"include_original_description": true}));
    }
    Ok(())
}

fn range_body(p: &GetRangeParams, body: &mut Map<String, Value>) -> Result<(), PlaidError> {
    let start = date("start_date", &p.start_date)?;
    let end = date("end_date", &p.end_date)?;
    if end < start {
        return Err(PlaidError::Parameter(format!(
            "end_date {end} is before start_date {start}"
        )));
    }
    body.insert("start_date".into(), json!(start.format("%Y-%m-%d").to_string()));
    body.insert("end_date".into(), json!(end.format("%Y-%m-%d").to_string()));

    let mut options = Map::new();
    options.insert("count".into(), json!(page_size(p.count, p.return_all)?));
    options.insert("offset".into(), json!(p.offset.unwrap_or(0)));
    if let Some(ids) = p.account_ids.as_deref().and_then(parse_account_ids) {
        options.insert("account_ids".into(), json!(ids));
    }
    if p.include_original_description {
        options.insert("include_original_description".into(), json!(true));
    }
    body.insert("options".into(), Value::Object(options));
    Ok(())
}

fn page_size(count: Option<u32>, return_all: bool) -> Result<u32, PlaidError> {
    if return_all {
        return Ok(MAX_COUNT);
    }
    match count.unwrap_or(DEFAULT_COUNT) {
        n @ 1..=MAX_COUNT => Ok(n),
        n => Err(PlaidError::Parameter(format!(
            "count must be between 1 and {MAX_COUNT}, got {n}"
        ))),
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, PlaidError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(PlaidError::Parameter(format!("{field} is required")))
    } else {
        Ok(trimmed)
    }
}

fn date(field: &str, raw: &str) -> Result<NaiveDate, PlaidError> {
    let day = format_date(required(field, raw)?);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| {
        PlaidError::Parameter(format!("{field} must be a YYYY-MM-DD date, got `{raw}`"))
    })
}

fn list_or(values: &Option<Vec<String>>, default: &str) -> Vec<String> {
    let cleaned: Vec<String> = values
        .iter()
        .flatten()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if cleaned.is_empty() {
        vec![default.to_string()]
    } else {
        cleaned
    }
}

fn country_codes(values: &Option<Vec<String>>) -> Vec<String> {
    list_or(values, DEFAULT_COUNTRY_CODE)
        .into_iter()
        .map(|c| c.to_uppercase())
        .collect()
}

/// Item parameters may arrive camelCased; merge them under the serialized
/// field name so they replace node values instead of clashing with them.
fn field_name(key: &str) -> String {
    if key == "limit" {
        return "count".to_string();
    }
    let mut name = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            name.push('_');
            name.push(c.to_ascii_lowercase());
        } else {
            name.push(c);
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(value: Value) -> PlaidOperation {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn camel_case_item_keys_replace_node_values() {
        assert_eq!(field_name("startDate"), "start_date");
        assert_eq!(field_name("includeOriginalDescription"), "include_original_description");
        assert_eq!(field_name("limit"), "count");
        assert_eq!(field_name("cursor"), "cursor");

        let node = op(json!({
            "resource": "transaction", "operation": "getRange",
            "start_date": "2023-01-01", "end_date": "2023-12-31", "count": 20
        }));
        let overrides = json!({"startDate": "2024-02-01", "limit": 5});
        let merged = node.with_item_parameters(overrides.as_object()).unwrap();
        match merged {
            PlaidOperation::Transaction(TransactionOperation::GetRange(p)) => {
                assert_eq!(p.start_date, "2024-02-01");
                assert_eq!(p.end_date, "2023-12-31");
                assert_eq!(p.count, Some(5));
            }
            other => panic!("unexpected operation {other:?}"),
        }
    }

    #[test]
    fn flat_tagged_shape() {
        let sync = op(json!({"resource": "transaction", "operation": "sync", "cursor": "abc"}));
        assert_eq!(sync.endpoint(), "/transactions/sync");
        assert_eq!(sync.operation_name(), "sync");
        assert_eq!(
            serde_json::to_value(&sync).unwrap(),
            json!({"resource": "transaction", "operation": "sync", "cursor": "abc",
                   "include_original_description": false, "enrich": false})
        );

        let balances = op(json!({"resource": "account", "operation": "getBalances"}));
        assert_eq!(balances.endpoint(), "/accounts/balance/get");
        assert_eq!(balances.source(), "plaid_balances");
        assert!(balances.needs_access_token());

        let link = op(json!({"resource": "linkToken", "operation": "exchangeToken", "publicToken": "p"}));
        assert_eq!(link.endpoint(), "/item/public_token/exchange");
        assert!(!link.needs_access_token());
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let res: Result<PlaidOperation, _> =
            serde_json::from_value(json!({"resource": "account", "operation": "delete"}));
        assert!(res.is_err());
    }

    #[test]
    fn sync_body_passes_cursor_through() {
        let cursor = "  CAESJ0JaRW9hZ2c5bldSNXJ2==  ";
        let sync = op(json!({"resource": "transaction", "operation": "sync", "cursor": cursor}));
        let body = sync.request_body().unwrap();
        assert_eq!(body["cursor"], cursor);
        assert_eq!(body["count"], 100);
        assert!(!body.contains_key("options"));

        let initial = op(json!({"resource": "transaction", "operation": "sync", "cursor": ""}));
        assert!(!initial.request_body().unwrap().contains_key("cursor"));
    }

    #[test]
    fn sync_account_filter() {
        let one = op(json!({"resource": "transaction", "operation": "sync", "account_ids": " acc-1 ,"}));
        assert_eq!(one.request_body().unwrap()["account_id"], "acc-1");

        let two = op(json!({"resource": "transaction", "operation": "sync", "account_ids": "a,b"}));
        assert_eq!(two.request_body().unwrap_err().code(), "PARAMETER_ERROR");
    }

    #[test]
    fn range_body_truncates_dates_and_fills_options() {
        let range = op(json!({
            "resource": "transaction", "operation": "getRange",
            "start_date": "2024-01-01T00:00:00Z", "end_date": "2024-01-31",
            "account_ids": "a, b ,", "include_original_description": true
        }));
        let body = range.request_body().unwrap();
        assert_eq!(body["start_date"], "2024-01-01");
        assert_eq!(body["end_date"], "2024-01-31");
        assert_eq!(
            body["options"],
            json!({"count": 100, "offset": 0, "account_ids": ["a", "b"], "include_original_description": true})
        );

        let all = op(json!({
            "resource": "transaction", "operation": "getRange",
            "startDate": "2024-01-01", "endDate": "2024-01-02", "returnAll": true, "limit": 5
        }));
        assert_eq!(all.request_body().unwrap()["options"]["count"], 500);

        let blank_ids = op(json!({
            "resource": "transaction", "operation": "getRange",
            "start_date": "2024-01-01", "end_date": "2024-01-02", "account_ids": "  "
        }));
        assert!(blank_ids.request_body().unwrap()["options"].get("account_ids").is_none());
    }

    #[test]
    fn range_validation() {
        let cases = [
            json!({"start_date": "", "end_date": "2024-01-02"}),
            json!({"start_date": "01/02/2024", "end_date": "2024-01-02"}),
            json!({"start_date": "2024-02-01", "end_date": "2024-01-02"}),
            json!({"start_date": "2024-01-01", "end_date": "2024-01-02", "count": 0}),
            json!({"start_date": "2024-01-01", "end_date": "2024-01-02", "count": 501}),
        ];
        for mut case in cases {
            case["resource"] = json!("transaction");
            case["operation"] = json!("getRange");
            let err = op(case.clone()).request_body().unwrap_err();
            assert_eq!(err.code(), "PARAMETER_ERROR", "{case}");
        }
    }

    #[test]
    fn institution_and_link_bodies() {
        let search = op(json!({"resource": "institution", "operation": "search", "query": " chase "}));
        let body = search.request_body().unwrap();
        assert_eq!(body["query"], "chase");
        assert_eq!(body["products"], json!(["transactions"]));
        assert_eq!(body["country_codes"], json!(["US"]));

        let empty = op(json!({"resource": "institution", "operation": "search", "query": "  "}));
        assert!(empty.request_body().is_err());

        let by_id = op(json!({"resource": "institution", "operation": "getById",
                              "institution_id": "ins_3", "country_codes": ["gb"]}));
        let body = by_id.request_body().unwrap();
        assert_eq!(body["country_codes"], json!(["GB"]));
        assert_eq!(body["options"]["include_status"], true);

        let create = op(json!({"resource": "linkToken", "operation": "create",
                               "user_id": "user-1", "client_name": "Acme"}));
        let body = create.request_body().unwrap();
        assert_eq!(body["user"], json!({"client_user_id": "user-1"}));
        assert_eq!(body["language"], "en");

        let missing = op(json!({"resource": "linkToken", "operation": "create", "user_id": "u"}));
        assert!(missing.request_body().is_err());
    }

    #[test]
    fn item_parameters_overlay() {
        let node_op = op(json!({"resource": "transaction", "operation": "sync", "count": 50}));
        let overrides = json!({"cursor": "next-1", "operation": "getRange", "resource": "item"});
        let merged = node_op.with_item_parameters(overrides.as_object()).unwrap();
        assert_eq!(merged.operation_name(), "sync");
        assert_eq!(merged.request_body().unwrap()["cursor"], "next-1");
        assert_eq!(merged.request_body().unwrap()["count"], 50);

        let bad = json!({"count": "many"});
        assert_eq!(
            node_op.with_item_parameters(bad.as_object()).unwrap_err().code(),
            "PARAMETER_ERROR"
        );
        assert_eq!(node_op.with_item_parameters(None).unwrap(), node_op);
    }

    #[test]
    fn single_object_lookups_share_the_get_name() {
        for resource in ["auth", "item", "identity"] {
            let lookup = op(json!({"resource": resource, "operation": "get"}));
            assert_eq!(lookup.operation_name(), "get");
            assert_eq!(lookup.resource_name(), resource);
        }
        let remove = op(json!({"resource": "item", "operation": "remove"}));
        assert_eq!(remove.operation_name(), "remove");
    }
}
