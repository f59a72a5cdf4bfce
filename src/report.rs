// src/report.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bounds and context of the position a report refers to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDetails {
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub current_tick: i32,
}

/// Structured report emitted on every phase transition and every error.
/// Serialized to JSON for the notification transport and the telemetry sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyReport {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub message: String,
    pub phase: String,
    /// Gas spent by the operation this report covers, native units.
    pub gas_cost: f64,
    /// Total gas spent since strategy start, native units.
    pub cumulative_gas: f64,
    /// Rewards collected since strategy start, native units.
    pub profit: f64,
    /// profit - cumulative gas - swap fees, expressed in token1 (quote)
    /// units with the native-denominated parts converted at the pool price.
    pub net_pnl: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_details: Option<PositionDetails>,
}

impl StrategyReport {
    pub fn new(event_type: &str, message: &str, phase: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            message: message.to_string(),
            phase: phase.to_string(),
            gas_cost: 0.0,
            cumulative_gas: 0.0,
            profit: 0.0,
            net_pnl: 0.0,
            error: None,
            position_id: None,
            position_details: None,
        }
    }

    pub fn with_costs(mut self, gas_cost: f64, cumulative_gas: f64, profit: f64, net_pnl: f64) -> Self {
        self.gas_cost = gas_cost;
        self.cumulative_gas = cumulative_gas;
        self.profit = profit;
        self.net_pnl = net_pnl;
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_position(mut self, id: String, details: Option<PositionDetails>) -> Self {
        self.position_id = Some(id);
        self.position_details = details;
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Point-in-time valuation of every holding the strategy controls, wallet
/// and open position combined, in token1 (quote) units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentAssetSnapshot {
    pub timestamp: DateTime<Utc>,
    pub trigger: String,
    pub phase: String,
    /// Wallet balances in UI units.
    pub wallet_amount0: f64,
    pub wallet_amount1: f64,
    /// Amounts currently deposited in the open position, zero when none.
    pub position_amount0: f64,
    pub position_amount1: f64,
    /// Spot price, token1 per token0.
    pub price: f64,
    /// Everything above valued in token1.
    pub total_value_quote: f64,
}

impl CurrentAssetSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_json_field_names() {
        let report = StrategyReport::new("out_of_range", "tick left the band", "active_monitoring")
            .with_costs(0.01, 0.05, 0.0, -0.05)
            .with_position(
                "4217".to_string(),
                Some(PositionDetails {
                    tick_lower: -600,
                    tick_upper: 600,
                    current_tick: 720,
                }),
            );
        let json = report.to_json().unwrap();
        for field in [
            "\"timestamp\"",
            "\"eventType\"",
            "\"message\"",
            "\"phase\"",
            "\"gasCost\"",
            "\"cumulativeGas\"",
            "\"profit\"",
            "\"netPnl\"",
            "\"positionId\"",
            "\"positionDetails\"",
            "\"tickLower\"",
        ] {
            assert!(json.contains(field), "missing {} in {}", field, json);
        }
        // absent optionals are omitted entirely
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_report_roundtrip() {
        let report = StrategyReport::new("halted", "circuit breaker", "halted")
            .with_error("execution reverted".to_string());
        let json = report.to_json().unwrap();
        let back: StrategyReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type, "halted");
        assert_eq!(back.error.as_deref(), Some("execution reverted"));
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = CurrentAssetSnapshot {
            timestamp: Utc::now(),
            trigger: "periodic".to_string(),
            phase: "active_monitoring".to_string(),
            wallet_amount0: 1.5,
            wallet_amount1: 300.0,
            position_amount0: 2.0,
            position_amount1: 410.5,
            price: 205.0,
            total_value_quote: 1428.0,
        };
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"totalValueQuote\":1428.0"));
        assert!(json.contains("\"trigger\":\"periodic\""));
    }
}
