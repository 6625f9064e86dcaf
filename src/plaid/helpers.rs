//! Pure functions used while shaping Plaid responses into records.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};

/// Plaid signs outflows negative; records carry the magnitude plus a direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormattedAmount {
    pub amount: f64,
    pub transaction_type: &'static str,
}

pub fn format_transaction_amount(amount: f64) -> FormattedAmount {
    FormattedAmount {
        amount: amount.abs(),
        transaction_type: if amount < 0.0 { "expense" } else { "income" },
    }
}

/// Split a comma separated list of account ids. Blank input, or input made
/// only of separators and whitespace, yields `None`.
pub fn parse_account_ids(raw: &str) -> Option<Vec<String>> {
    let ids: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    if ids.is_empty() { None } else { Some(ids) }
}

/// Keep the calendar part of an ISO-8601 value.
pub fn format_date(raw: &str) -> &str {
    raw.split('T').next().unwrap_or(raw)
}

fn legacy_categories(transaction: &Map<String, Value>) -> Vec<&str> {
    transaction
        .get("category")
        .and_then(Value::as_array)
        .map(|cats| cats.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// Flatten the legacy category path and the personal-finance category into
/// top-level fields.
pub fn enhance_categories(transaction: &mut Map<String, Value>) {
    let categories: Vec<String> = legacy_categories(transaction)
        .into_iter()
        .map(str::to_string)
        .collect();
    let pfc = transaction
        .get("personal_finance_category")
        .and_then(Value::as_object);
    let pfc_primary = pfc
        .and_then(|p| p.get("primary"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let pfc_detailed = pfc
        .and_then(|p| p.get("detailed"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let nth = |i: usize| categories.get(i).filter(|c| !c.is_empty()).cloned();
    let full = if categories.is_empty() {
        "Other".to_string()
    } else {
        categories.join(" > ")
    };

    transaction.insert(
        "category_primary".into(),
        json!(nth(0).unwrap_or_else(|| "Other".into())),
    );
    transaction.insert("category_secondary".into(), json!(nth(1).unwrap_or_default()));
    transaction.insert("category_detailed".into(), json!(nth(2).unwrap_or_default()));
    transaction.insert("category_full".into(), json!(full));
    transaction.insert(
        "enhanced_category".into(),
        json!(pfc_primary.or_else(|| nth(0)).unwrap_or_else(|| "Other".into())),
    );
    transaction.insert(
        "enhanced_subcategory".into(),
        json!(pfc_detailed.or_else(|| nth(1)).unwrap_or_default()),
    );
}

static RECURRING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)netflix|spotify|subscription|monthly|annual|insurance|mortgage|rent|gym|membership|utilities|phone|internet|recurring",
    )
    .expect("recurring keyword pattern is valid")
});

/// Keyword heuristic over a transaction description.
pub fn detect_recurring(description: &str) -> bool {
    RECURRING.is_match(description)
}

fn category_multiplier(primary: Option<&str>) -> f64 {
    match primary {
        Some("Food and Drink") => 1.0,
        Some("Shops") => 1.2,
        Some("Recreation") => 1.3,
        Some("Transportation") => 0.8,
        Some("Healthcare") => 0.7,
        Some("Bills") => 0.5,
        Some("Transfer") => 0.3,
        _ => 1.0,
    }
}

/// 0 to 10 by magnitude (one point per 100 units), weighted by the primary
/// category and rounded to one decimal.
pub fn calculate_spending_score(amount: f64, categories: &[&str]) -> f64 {
    let base = (amount.abs() / 100.0).min(10.0);
    let score = base * category_multiplier(categories.first().copied());
    (score * 10.0).round() / 10.0
}

/// Adds category fields, `is_recurring` and `spending_score`. Expects the
/// original signed `amount` to still be present.
pub fn enrich_transaction(transaction: &mut Map<String, Value>) {
    let amount = transaction.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
    let score = calculate_spending_score(amount, &legacy_categories(transaction));
    let description = ["merchant_name", "name", "original_description"]
        .iter()
        .find_map(|key| transaction.get(*key).and_then(Value::as_str))
        .unwrap_or_default();
    let recurring = detect_recurring(description);

    enhance_categories(transaction);
    transaction.insert("is_recurring".into(), json!(recurring));
    transaction.insert("spending_score".into(), json!(score));
}

/// Show the first and last four characters of an identifier.
pub fn mask_credential(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
