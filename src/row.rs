use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One stock entry of an auction snapshot.
///
/// The wire format is a positional JSON array; positions are mapped to named
/// fields here so nothing downstream indexes into raw arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub code: Option<String>,
    pub name: Option<String>,
    pub last_price: Option<f64>,
    pub pct_change: Option<f64>,
    pub seal_amount: Option<f64>,
    pub auction_pct_change: Option<f64>,
    pub auction_price: Option<f64>,
    pub bid_turnover: Option<f64>,
    pub auction_turnover: Option<f64>,
    pub auction_net: Option<f64>,
    pub open_amount: Option<f64>,
    pub sector: Option<String>,
    pub main_net: Option<f64>,
    pub main_buy: Option<f64>,
    pub main_sell: Option<f64>,
    pub limit_note: Option<String>,
}

mod pos {
    pub const CODE: usize = 0;
    pub const NAME: usize = 1;
    pub const LAST_PRICE: usize = 2;
    pub const PCT_CHANGE: usize = 3;
    pub const SEAL_AMOUNT: usize = 4;
    pub const AUCTION_PCT_CHANGE: usize = 5;
    pub const AUCTION_PRICE: usize = 6;
    pub const BID_TURNOVER: usize = 7;
    pub const AUCTION_TURNOVER: usize = 8;
    pub const AUCTION_NET: usize = 9;
    pub const OPEN_AMOUNT: usize = 10;
    pub const SECTOR: usize = 11;
    pub const MAIN_NET: usize = 12;
    pub const MAIN_BUY: usize = 13;
    pub const MAIN_SELL: usize = 14;
    pub const LIMIT_NOTE: usize = 15;
}

impl Row {
    pub fn from_values(values: &[Value]) -> Row {
        let text = |idx: usize| values.get(idx).and_then(value_text);
        let number = |idx: usize| values.get(idx).and_then(value_number);
        Row {
            code: text(pos::CODE),
            name: text(pos::NAME),
            last_price: number(pos::LAST_PRICE),
            pct_change: number(pos::PCT_CHANGE),
            seal_amount: number(pos::SEAL_AMOUNT),
            auction_pct_change: number(pos::AUCTION_PCT_CHANGE),
            auction_price: number(pos::AUCTION_PRICE),
            bid_turnover: number(pos::BID_TURNOVER),
            auction_turnover: number(pos::AUCTION_TURNOVER),
            auction_net: number(pos::AUCTION_NET),
            open_amount: number(pos::OPEN_AMOUNT),
            sector: text(pos::SECTOR),
            main_net: number(pos::MAIN_NET),
            main_buy: number(pos::MAIN_BUY),
            main_sell: number(pos::MAIN_SELL),
            limit_note: text(pos::LIMIT_NOTE),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("-")
    }

    /// Special-treatment (ST) names are excluded from the realtime board.
    pub fn is_special_treatment(&self) -> bool {
        self.name
            .as_deref()
            .map(|name| name.contains("ST"))
            .unwrap_or(false)
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = Vec::<Value>::deserialize(deserializer)?;
        Ok(Row::from_values(&values))
    }
}

fn is_blank(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") || trimmed == "-"
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !is_blank(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !is_blank(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}
