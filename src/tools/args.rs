//! Argument rules for the stock-data tools.
//!
//! Models write tickers in many shapes ("000001.SZ", "600000", 1). These
//! rules canonicalize them into the `{symbol, market}` pair the tool server
//! expects and fill in per-tool defaults before validation.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Tools that take a `symbol` (and a `market`).
const STOCK_TOOLS: &[&str] = &[
    "stock_info",
    "stock_prices",
    "stock_news",
    "stock_indicators_a",
    "stock_indicators_hk",
    "stock_indicators_us",
];

const DEFAULT_MARKET: &str = "A";

/// Canonical `(symbol, market)` for a ticker and an optional market hint.
pub fn normalize_stock_symbol(symbol: &str, market: Option<&str>) -> (String, String) {
    let fallback_market = market.unwrap_or(DEFAULT_MARKET).to_string();
    let symbol = symbol.trim();

    if symbol.is_empty() {
        return (String::new(), fallback_market);
    }

    if let Some((code, exchange)) = symbol.split_once('.') {
        let market = match exchange.to_uppercase().as_str() {
            "SZ" | "SZSE" | "SH" | "SSE" => DEFAULT_MARKET.to_string(),
            _ => fallback_market,
        };
        return (code.to_string(), market);
    }

    // Shenzhen (0, 3), Shanghai (6), Beijing / NEEQ (8, 4)
    match symbol.chars().next() {
        Some('0' | '3' | '6' | '8' | '4') => (symbol.to_string(), DEFAULT_MARKET.to_string()),
        _ => (symbol.to_string(), fallback_market),
    }
}

/// Apply symbol canonicalization and per-tool defaults.
pub fn normalize_args(tool: &str, args: &Map<String, Value>) -> Map<String, Value> {
    let mut normalized = args.clone();

    if STOCK_TOOLS.contains(&tool) {
        if let Some(raw) = normalized.get("symbol") {
            let symbol = value_text(raw);
            let market = normalized.get("market").map(value_text);
            let (symbol, market) = normalize_stock_symbol(&symbol, market.as_deref());
            normalized.insert("symbol".into(), Value::String(symbol));
            normalized.insert("market".into(), Value::String(market));
        }
    }

    match tool {
        "stock_prices" => {
            normalized
                .entry("period")
                .or_insert_with(|| Value::String("1d".into()));
            normalized.entry("limit").or_insert_with(|| Value::from(10));
        }
        "stock_news" => {
            normalized.entry("limit").or_insert_with(|| Value::from(5));
        }
        "search" => {
            let is_a_share = normalized
                .get("market")
                .map(|m| value_text(m).eq_ignore_ascii_case("a"))
                .unwrap_or(true);
            if is_a_share {
                normalized.insert("market".into(), Value::String("sh".into()));
            }
        }
        _ => {}
    }

    normalized
}

/// Check that the arguments a tool needs are present.
pub fn validate_args(tool: &str, args: &Map<String, Value>) -> Result<()> {
    match tool {
        "stock_info" | "stock_prices" => {
            require_non_empty(tool, args, "symbol")?;
            if !args.contains_key("market") {
                return Err(Error::tool_args(tool, "missing required argument 'market'"));
            }
        }
        "stock_news" => require_non_empty(tool, args, "symbol")?,
        "search" => require_non_empty(tool, args, "keyword")?,
        _ => {}
    }
    Ok(())
}

/// Normalize, then validate.
pub fn prepare_args(tool: &str, args: &Map<String, Value>) -> Result<Map<String, Value>> {
    let normalized = normalize_args(tool, args);
    validate_args(tool, &normalized)?;
    Ok(normalized)
}

fn require_non_empty(tool: &str, args: &Map<String, Value>, key: &str) -> Result<()> {
    let present = match args.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    };
    if present {
        Ok(())
    } else {
        Err(Error::tool_args(tool, format!("missing required argument '{}'", key)))
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_symbol_with_exchange_suffix() {
        assert_eq!(
            normalize_stock_symbol("000001.SZ", None),
            ("000001".to_string(), "A".to_string())
        );
        assert_eq!(
            normalize_stock_symbol("600000.sse", Some("HK")),
            ("600000".to_string(), "A".to_string())
        );
        assert_eq!(
            normalize_stock_symbol("0700.HK", Some("HK")),
            ("0700".to_string(), "HK".to_string())
        );
    }

    #[test]
    fn test_symbol_by_prefix() {
        assert_eq!(normalize_stock_symbol("300750", Some("US")).1, "A");
        assert_eq!(normalize_stock_symbol("688981", None).1, "A");
        assert_eq!(normalize_stock_symbol("430047", None).1, "A");
        assert_eq!(normalize_stock_symbol("AAPL", Some("US")).1, "US");
        assert_eq!(normalize_stock_symbol("AAPL", None).1, "A");
        assert_eq!(normalize_stock_symbol("  ", Some("HK")), (String::new(), "HK".to_string()));
    }

    #[test]
    fn test_stock_prices_defaults() {
        let args = normalize_args("stock_prices", &obj(json!({"symbol": "000001.SZ"})));
        assert_eq!(
            Value::Object(args),
            json!({"symbol": "000001", "market": "A", "period": "1d", "limit": 10})
        );
    }

    #[test]
    fn test_existing_values_kept() {
        let args = normalize_args(
            "stock_prices",
            &obj(json!({"symbol": "600000", "period": "1w", "limit": 3})),
        );
        assert_eq!(args["period"], json!("1w"));
        assert_eq!(args["limit"], json!(3));
    }

    #[test]
    fn test_numeric_symbol() {
        let args = normalize_args("stock_info", &obj(json!({"symbol": 600519})));
        assert_eq!(args["symbol"], json!("600519"));
        assert_eq!(args["market"], json!("A"));
    }

    #[test]
    fn test_stock_news_limit() {
        let args = normalize_args("stock_news", &obj(json!({"symbol": "000001"})));
        assert_eq!(args["limit"], json!(5));
    }

    #[test]
    fn test_search_market() {
        let args = normalize_args("search", &obj(json!({"keyword": "平安"})));
        assert_eq!(args["market"], json!("sh"));

        let args = normalize_args("search", &obj(json!({"keyword": "平安", "market": "A"})));
        assert_eq!(args["market"], json!("sh"));

        let args = normalize_args("search", &obj(json!({"keyword": "腾讯", "market": "hk"})));
        assert_eq!(args["market"], json!("hk"));
    }

    #[test]
    fn test_validation() {
        assert!(validate_args("stock_info", &obj(json!({"symbol": "1", "market": "A"}))).is_ok());
        assert!(validate_args("stock_info", &obj(json!({"symbol": "1"}))).is_err());
        assert!(validate_args("stock_prices", &obj(json!({"symbol": "", "market": "A"}))).is_err());
        assert!(validate_args("stock_news", &obj(json!({}))).is_err());
        assert!(validate_args("search", &obj(json!({"keyword": "x"}))).is_ok());
        assert!(validate_args("search", &obj(json!({}))).is_err());
        assert!(validate_args("anything_else", &obj(json!({}))).is_ok());
    }

    #[test]
    fn test_prepare_args_error_kind() {
        let err = prepare_args("stock_news", &obj(json!({"limit": 1}))).unwrap_err();
        assert!(matches!(err, Error::ToolArgs { .. }));
    }
}
