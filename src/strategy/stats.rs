//! Best-effort statistics reported by a strategy.
//!
//! Every field is optional: an absent field means "unchanged since the
//! previous read", not zero.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StrategyStats {
    pub total_trades: Option<u64>,
    pub successful_trades: Option<u64>,
    pub total_profit: Option<Decimal>,
    /// Average execution time in milliseconds
    pub avg_execution_time: Option<Decimal>,
    pub active_trades: Option<u32>,
    /// Current drawdown in percent
    pub current_drawdown: Option<Decimal>,
    pub max_drawdown: Option<Decimal>,
}

impl StrategyStats {
    /// Decode a loosely shaped stats record.
    ///
    /// Accepts camelCase or snake_case keys, `executedTrades` as an alias for
    /// `totalTrades`, and numbers or numeric strings. Values that do not
    /// parse are treated as absent.
    pub fn from_json(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        Self {
            total_trades: count_field(
                obj,
                &["totalTrades", "total_trades", "executedTrades", "executed_trades"],
            ),
            successful_trades: count_field(obj, &["successfulTrades", "successful_trades"]),
            total_profit: decimal_field(obj, &["totalProfit", "total_profit"]),
            avg_execution_time: decimal_field(obj, &["avgExecutionTime", "avg_execution_time"]),
            active_trades: count_field(obj, &["activeTrades", "active_trades"])
                .and_then(|n| u32::try_from(n).ok()),
            current_drawdown: decimal_field(obj, &["currentDrawdown", "current_drawdown"]),
            max_drawdown: decimal_field(obj, &["maxDrawdown", "max_drawdown"]),
        }
    }
}

/// First key in `keys` holding a parseable decimal.
fn decimal_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<Decimal> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(Decimal::from_f64_retain)),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    })
}

/// First key in `keys` holding a non-negative count.
fn count_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| {
        let value = decimal_field(obj, std::slice::from_ref(key))?;
        if value.is_sign_negative() {
            None
        } else {
            value.trunc().to_u64()
        }
    })
}
