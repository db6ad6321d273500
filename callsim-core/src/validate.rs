//! Strategy and candle-series validation.
//!
//! Everything here runs before the simulation loop starts. Validation is
//! idempotent: re-validating an already-valid definition is a no-op.
//! Candle problems are rejected, never repaired — silent resorting could
//! mask upstream data-quality bugs.

use crate::domain::{
    Candle, CostModel, EntryRule, ExitRule, PositionSizing, ReEntryRule, RiskLimits,
    StrategyDefinition,
};
use crate::error::SimulationError;
use crate::indicators::Indicator;
use crate::signal::Expr;

/// Tolerance used when checking that exit fractions do not exceed 1.0.
const FRACTION_SUM_TOLERANCE: f64 = 1e-9;

/// Top-level keys the definition format knows about. Anything else is
/// folded into `metadata` by `load_strategy` (forward compatibility).
const KNOWN_TOP_LEVEL_KEYS: &[&str] = &[
    "version",
    "id",
    "name",
    "description",
    "tags",
    "position_sizing",
    "entry",
    "exit",
    "re_entry",
    "risk",
    "costs",
    "metadata",
];

/// Parse a strategy definition from JSON and validate it.
///
/// Unknown top-level keys are preserved under `metadata`; unknown rule-type
/// discriminators fail (the rule set is closed).
pub fn load_strategy(json: &str) -> Result<StrategyDefinition, SimulationError> {
    let mut value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| SimulationError::schema("<document>", e.to_string()))?;

    let obj = value
        .as_object_mut()
        .ok_or_else(|| SimulationError::schema("<document>", "expected a JSON object"))?;

    let unknown: Vec<String> = obj
        .keys()
        .filter(|k| !KNOWN_TOP_LEVEL_KEYS.contains(&k.as_str()))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        let mut moved = serde_json::Map::new();
        for key in unknown {
            if let Some(v) = obj.remove(&key) {
                moved.insert(key, v);
            }
        }
        let metadata = obj
            .entry("metadata")
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        if let Some(meta_obj) = metadata.as_object_mut() {
            for (k, v) in moved {
                meta_obj.entry(k).or_insert(v);
            }
        }
    }

    let def: StrategyDefinition = serde_json::from_value(value)
        .map_err(|e| SimulationError::schema("<document>", e.to_string()))?;
    validate(&def)?;
    Ok(def)
}

/// Validate a strategy definition. Pure and idempotent.
pub fn validate(def: &StrategyDefinition) -> Result<(), SimulationError> {
    if def.name.trim().is_empty() {
        return Err(SimulationError::schema("name", "must not be empty"));
    }
    if def.version == 0 {
        return Err(SimulationError::schema("version", "must be >= 1"));
    }

    validate_entry(&def.entry)?;

    if def.exit.is_empty() {
        return Err(SimulationError::consistency("exit", "must not be empty"));
    }
    let mut stop_count = 0usize;
    let mut expiry_count = 0usize;
    let mut independent_fraction_sum = 0.0;
    for (i, rule) in def.exit.iter().enumerate() {
        validate_exit(rule, i, &mut independent_fraction_sum)?;
        match rule {
            ExitRule::StopLoss { .. } => stop_count += 1,
            ExitRule::TimeExpiry { .. } => expiry_count += 1,
            _ => {}
        }
    }
    if stop_count > 1 {
        return Err(SimulationError::consistency(
            "exit",
            "at most one stop_loss rule is allowed",
        ));
    }
    if expiry_count > 1 {
        return Err(SimulationError::consistency(
            "exit",
            "at most one time_expiry rule is allowed",
        ));
    }
    if independent_fraction_sum > 1.0 + FRACTION_SUM_TOLERANCE {
        return Err(SimulationError::consistency(
            "exit",
            format!("profit-taking fractions sum to {independent_fraction_sum}, above 1.0"),
        ));
    }

    if let Some(re_entry) = &def.re_entry {
        validate_re_entry(re_entry)?;
    }
    if let Some(risk) = &def.risk {
        validate_risk(risk)?;
    }
    if let Some(costs) = &def.costs {
        validate_costs(costs)?;
    }
    if let Some(sizing) = &def.position_sizing {
        validate_sizing(sizing)?;
    }
    Ok(())
}

fn validate_entry(entry: &EntryRule) -> Result<(), SimulationError> {
    match entry {
        EntryRule::Immediate => Ok(()),
        EntryRule::PriceDrop {
            drop_percent,
            max_wait_bars,
        } => {
            if !(-1.0..0.0).contains(drop_percent) {
                return Err(SimulationError::consistency(
                    "entry.drop_percent",
                    "must be in (-1, 0)",
                ));
            }
            if *max_wait_bars == 0 {
                return Err(SimulationError::consistency(
                    "entry.max_wait_bars",
                    "must be >= 1",
                ));
            }
            Ok(())
        }
        EntryRule::TrailingRebound {
            rebound_percent,
            max_wait_bars,
        } => {
            if *rebound_percent <= 0.0 {
                return Err(SimulationError::consistency(
                    "entry.rebound_percent",
                    "must be > 0",
                ));
            }
            if *max_wait_bars == 0 {
                return Err(SimulationError::consistency(
                    "entry.max_wait_bars",
                    "must be >= 1",
                ));
            }
            Ok(())
        }
        EntryRule::Signal {
            expression,
            max_wait_bars,
        } => {
            if *max_wait_bars == 0 {
                return Err(SimulationError::consistency(
                    "entry.max_wait_bars",
                    "must be >= 1",
                ));
            }
            validate_expr(expression, "entry.expression")
        }
    }
}

fn validate_exit(
    rule: &ExitRule,
    index: usize,
    independent_fraction_sum: &mut f64,
) -> Result<(), SimulationError> {
    let field = |name: &str| format!("exit[{index}].{name}");
    match rule {
        ExitRule::ProfitTarget {
            multiple,
            fraction_to_exit,
        } => {
            if *multiple <= 1.0 {
                return Err(SimulationError::consistency(
                    field("multiple"),
                    "must be > 1",
                ));
            }
            if !(0.0..=1.0).contains(fraction_to_exit) || *fraction_to_exit == 0.0 {
                return Err(SimulationError::consistency(
                    field("fraction_to_exit"),
                    "must be in (0, 1]",
                ));
            }
            *independent_fraction_sum += fraction_to_exit;
            Ok(())
        }
        ExitRule::StopLoss {
            loss_percent,
            trailing_activation_multiple,
            trailing_percent,
        } => {
            if !(-1.0..0.0).contains(loss_percent) {
                return Err(SimulationError::consistency(
                    field("loss_percent"),
                    "must be in (-1, 0)",
                ));
            }
            match (trailing_activation_multiple, trailing_percent) {
                (None, None) => Ok(()),
                (Some(activation), Some(trail)) => {
                    if *activation <= 1.0 {
                        return Err(SimulationError::consistency(
                            field("trailing_activation_multiple"),
                            "must be > 1",
                        ));
                    }
                    if !(0.0..1.0).contains(trail) || *trail == 0.0 {
                        return Err(SimulationError::consistency(
                            field("trailing_percent"),
                            "must be in (0, 1)",
                        ));
                    }
                    Ok(())
                }
                _ => Err(SimulationError::consistency(
                    field("trailing_activation_multiple"),
                    "trailing fields must be set together",
                )),
            }
        }
        ExitRule::TimeExpiry { hold_bars } => {
            if *hold_bars == 0 {
                return Err(SimulationError::consistency(
                    field("hold_bars"),
                    "must be >= 1",
                ));
            }
            Ok(())
        }
        ExitRule::Signal { expression } => validate_expr(expression, &field("expression")),
        ExitRule::Ladder { legs, sequential: _ } => {
            if legs.is_empty() {
                return Err(SimulationError::consistency(
                    field("legs"),
                    "must not be empty",
                ));
            }
            for (j, leg) in legs.iter().enumerate() {
                let leg_field = |name: &str| format!("exit[{index}].legs[{j}].{name}");
                if leg.multiple <= 1.0 {
                    return Err(SimulationError::consistency(
                        leg_field("multiple"),
                        "must be > 1",
                    ));
                }
                if !(0.0..=1.0).contains(&leg.fraction_of_position)
                    || leg.fraction_of_position == 0.0
                {
                    return Err(SimulationError::consistency(
                        leg_field("fraction_of_position"),
                        "must be in (0, 1]",
                    ));
                }
                if let Some(expr) = &leg.expression {
                    validate_expr(expr, &leg_field("expression"))?;
                }
                *independent_fraction_sum += leg.fraction_of_position;
            }
            Ok(())
        }
    }
}

fn validate_re_entry(rule: &ReEntryRule) -> Result<(), SimulationError> {
    let (max_re_entries, size_fraction) = match rule {
        ReEntryRule::TrailingRetrace {
            retrace_percent,
            max_re_entries,
            size_fraction,
        } => {
            if !(0.0..1.0).contains(retrace_percent) || *retrace_percent == 0.0 {
                return Err(SimulationError::consistency(
                    "re_entry.retrace_percent",
                    "must be in (0, 1)",
                ));
            }
            (*max_re_entries, *size_fraction)
        }
        ReEntryRule::Signal {
            expression,
            max_re_entries,
            size_fraction,
        } => {
            validate_expr(expression, "re_entry.expression")?;
            (*max_re_entries, *size_fraction)
        }
    };
    if max_re_entries == 0 {
        return Err(SimulationError::consistency(
            "re_entry.max_re_entries",
            "must be >= 1",
        ));
    }
    if !(0.0..=1.0).contains(&size_fraction) || size_fraction == 0.0 {
        return Err(SimulationError::consistency(
            "re_entry.size_fraction",
            "must be in (0, 1]",
        ));
    }
    Ok(())
}

fn validate_risk(risk: &RiskLimits) -> Result<(), SimulationError> {
    if let Some(v) = risk.max_loss_percent {
        if v <= 0.0 || v > 1.0 {
            return Err(SimulationError::consistency(
                "risk.max_loss_percent",
                "must be in (0, 1]",
            ));
        }
    }
    if let Some(v) = risk.min_exit_price {
        if v <= 0.0 {
            return Err(SimulationError::consistency(
                "risk.min_exit_price",
                "must be > 0",
            ));
        }
    }
    if let Some(v) = risk.max_position_size {
        if v <= 0.0 {
            return Err(SimulationError::consistency(
                "risk.max_position_size",
                "must be > 0",
            ));
        }
    }
    if let Some(v) = risk.max_leverage {
        if v <= 0.0 {
            return Err(SimulationError::consistency(
                "risk.max_leverage",
                "must be > 0",
            ));
        }
    }
    Ok(())
}

fn validate_costs(costs: &CostModel) -> Result<(), SimulationError> {
    if costs.entry_slippage_bps < 0.0 || costs.exit_slippage_bps < 0.0 {
        return Err(SimulationError::consistency(
            "costs.slippage_bps",
            "must be >= 0",
        ));
    }
    if !(0.0..1.0).contains(&costs.fee_percent) {
        return Err(SimulationError::consistency(
            "costs.fee_percent",
            "must be in [0, 1)",
        ));
    }
    if costs.fixed_fee < 0.0 {
        return Err(SimulationError::consistency(
            "costs.fixed_fee",
            "must be >= 0",
        ));
    }
    Ok(())
}

fn validate_sizing(sizing: &PositionSizing) -> Result<(), SimulationError> {
    let max_size = match sizing {
        PositionSizing::Fixed { notional, max_size } => {
            if *notional <= 0.0 {
                return Err(SimulationError::consistency(
                    "position_sizing.notional",
                    "must be > 0",
                ));
            }
            max_size
        }
        PositionSizing::PercentOfCapital {
            percent,
            capital,
            max_size,
        } => {
            if !(0.0..=1.0).contains(percent) || *percent == 0.0 {
                return Err(SimulationError::consistency(
                    "position_sizing.percent",
                    "must be in (0, 1]",
                ));
            }
            if *capital <= 0.0 {
                return Err(SimulationError::consistency(
                    "position_sizing.capital",
                    "must be > 0",
                ));
            }
            max_size
        }
        PositionSizing::RiskBased {
            capital,
            risk_fraction,
            max_size,
        } => {
            if *capital <= 0.0 {
                return Err(SimulationError::consistency(
                    "position_sizing.capital",
                    "must be > 0",
                ));
            }
            if !(0.0..=1.0).contains(risk_fraction) || *risk_fraction == 0.0 {
                return Err(SimulationError::consistency(
                    "position_sizing.risk_fraction",
                    "must be in (0, 1]",
                ));
            }
            max_size
        }
    };
    if let Some(v) = max_size {
        if *v <= 0.0 {
            return Err(SimulationError::consistency(
                "position_sizing.max_size",
                "must be > 0",
            ));
        }
    }
    Ok(())
}

fn validate_expr(expr: &Expr, field: &str) -> Result<(), SimulationError> {
    if expr.has_empty_group() {
        return Err(SimulationError::consistency(
            field,
            "expression contains an empty AND/OR group",
        ));
    }
    for cond in expr.conditions() {
        match (cond.min_bars_true, cond.lookback_bars) {
            (None, None) => {}
            (Some(min_true), Some(lookback)) => {
                if min_true == 0 || lookback == 0 {
                    return Err(SimulationError::consistency(
                        field,
                        "min_bars_true and lookback_bars must be >= 1",
                    ));
                }
                if min_true > lookback {
                    return Err(SimulationError::consistency(
                        field,
                        "min_bars_true must not exceed lookback_bars",
                    ));
                }
            }
            _ => {
                return Err(SimulationError::consistency(
                    field,
                    "min_bars_true and lookback_bars must be set together",
                ));
            }
        }
        validate_indicator(&cond.lhs, field)?;
        if let crate::signal::Operand::Indicator(ind) = &cond.rhs {
            validate_indicator(ind, field)?;
        }
    }
    Ok(())
}

fn validate_indicator(ind: &Indicator, field: &str) -> Result<(), SimulationError> {
    let bad = |msg: &str| Err(SimulationError::consistency(field, msg));
    match *ind {
        Indicator::Sma { period }
        | Indicator::Ema { period }
        | Indicator::Rsi { period }
        | Indicator::Atr { period }
        | Indicator::IchimokuConversion { period }
        | Indicator::IchimokuBase { period } => {
            if period == 0 {
                return bad("indicator period must be >= 1");
            }
        }
        Indicator::MacdLine { fast, slow } => {
            if fast == 0 || slow == 0 || fast >= slow {
                return bad("macd requires 0 < fast < slow");
            }
        }
        Indicator::MacdSignal { fast, slow, signal } => {
            if fast == 0 || slow == 0 || signal == 0 || fast >= slow {
                return bad("macd requires 0 < fast < slow and signal >= 1");
            }
        }
        Indicator::BollingerUpper { period, k } | Indicator::BollingerLower { period, k } => {
            if period == 0 {
                return bad("indicator period must be >= 1");
            }
            if !k.is_finite() || k < 0.0 {
                return bad("bollinger k must be finite and >= 0");
            }
        }
        Indicator::PriceChange { bars } | Indicator::VolumeChange { bars } => {
            if bars == 0 {
                return bad("change bars must be >= 1");
            }
        }
        Indicator::Price | Indicator::Volume => {}
    }
    Ok(())
}

/// Validate a candle series: finite, OHLC-sane, strictly increasing unique
/// timestamps. The offending index is attached to every rejection.
pub fn validate_series(candles: &[Candle]) -> Result<(), SimulationError> {
    if candles.is_empty() {
        return Err(SimulationError::input_data(0, "empty candle series"));
    }
    for (i, candle) in candles.iter().enumerate() {
        if candle.has_non_finite() {
            return Err(SimulationError::input_data(i, "non-finite OHLCV field"));
        }
        if !candle.is_sane() {
            return Err(SimulationError::input_data(
                i,
                "OHLC invariant violated (low <= open/close <= high, low >= 0)",
            ));
        }
        if i > 0 {
            let prev = candles[i - 1].ts;
            if candle.ts == prev {
                return Err(SimulationError::input_data(i, "duplicate timestamp"));
            }
            if candle.ts < prev {
                return Err(SimulationError::input_data(i, "non-monotonic timestamp"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LadderLeg;
    use crate::signal::{Op, Operand};
    use std::collections::BTreeMap;

    fn minimal_def() -> StrategyDefinition {
        StrategyDefinition {
            version: 1,
            id: None,
            name: "minimal".into(),
            description: None,
            tags: Vec::new(),
            position_sizing: None,
            entry: EntryRule::Immediate,
            exit: vec![ExitRule::ProfitTarget {
                multiple: 2.0,
                fraction_to_exit: 1.0,
            }],
            re_entry: None,
            risk: None,
            costs: None,
            metadata: BTreeMap::new(),
        }
    }

    fn candles(ts: &[i64]) -> Vec<Candle> {
        ts.iter()
            .map(|&t| Candle {
                ts: t,
                open: 1.0,
                high: 1.1,
                low: 0.9,
                close: 1.0,
                volume: 100.0,
            })
            .collect()
    }

    #[test]
    fn minimal_definition_is_valid() {
        assert!(validate(&minimal_def()).is_ok());
    }

    #[test]
    fn validation_is_idempotent() {
        let def = minimal_def();
        validate(&def).unwrap();
        validate(&def).unwrap();
    }

    #[test]
    fn empty_exit_list_rejected() {
        let mut def = minimal_def();
        def.exit.clear();
        assert!(matches!(
            validate(&def),
            Err(SimulationError::Consistency { .. })
        ));
    }

    #[test]
    fn target_multiple_at_or_below_one_rejected() {
        let mut def = minimal_def();
        def.exit = vec![ExitRule::ProfitTarget {
            multiple: 1.0,
            fraction_to_exit: 1.0,
        }];
        let err = validate(&def).unwrap_err();
        assert!(err.to_string().contains("multiple"));
    }

    #[test]
    fn fraction_sum_above_one_rejected() {
        let mut def = minimal_def();
        def.exit = vec![
            ExitRule::ProfitTarget {
                multiple: 1.5,
                fraction_to_exit: 0.6,
            },
            ExitRule::Ladder {
                legs: vec![LadderLeg {
                    fraction_of_position: 0.5,
                    multiple: 2.0,
                    expression: None,
                }],
                sequential: false,
            },
        ];
        let err = validate(&def).unwrap_err();
        assert!(err.to_string().contains("sum"));
    }

    #[test]
    fn fraction_sum_exactly_one_is_fine() {
        let mut def = minimal_def();
        def.exit = vec![
            ExitRule::ProfitTarget {
                multiple: 1.5,
                fraction_to_exit: 0.5,
            },
            ExitRule::ProfitTarget {
                multiple: 2.0,
                fraction_to_exit: 0.5,
            },
        ];
        assert!(validate(&def).is_ok());
    }

    #[test]
    fn half_specified_trailing_stop_rejected() {
        let mut def = minimal_def();
        def.exit = vec![ExitRule::StopLoss {
            loss_percent: -0.2,
            trailing_activation_multiple: Some(1.5),
            trailing_percent: None,
        }];
        assert!(validate(&def).is_err());
    }

    #[test]
    fn two_stop_rules_rejected() {
        let mut def = minimal_def();
        def.exit = vec![
            ExitRule::StopLoss {
                loss_percent: -0.2,
                trailing_activation_multiple: None,
                trailing_percent: None,
            },
            ExitRule::StopLoss {
                loss_percent: -0.4,
                trailing_activation_multiple: None,
                trailing_percent: None,
            },
        ];
        assert!(validate(&def).is_err());
    }

    #[test]
    fn positive_drop_percent_rejected() {
        let mut def = minimal_def();
        def.entry = EntryRule::PriceDrop {
            drop_percent: 0.1,
            max_wait_bars: 5,
        };
        assert!(validate(&def).is_err());
    }

    #[test]
    fn bad_window_fields_rejected() {
        let mut def = minimal_def();
        def.entry = EntryRule::Signal {
            expression: Expr::Leaf(crate::signal::Condition {
                lhs: Indicator::Price,
                op: Op::Gt,
                rhs: Operand::Value(1.0),
                min_bars_true: Some(5),
                lookback_bars: Some(3),
            }),
            max_wait_bars: 10,
        };
        let err = validate(&def).unwrap_err();
        assert!(err.to_string().contains("min_bars_true"));
    }

    #[test]
    fn empty_expression_group_rejected() {
        let mut def = minimal_def();
        def.exit.push(ExitRule::Signal {
            expression: Expr::All { children: vec![] },
        });
        assert!(validate(&def).is_err());
    }

    #[test]
    fn load_strategy_folds_unknown_keys_into_metadata() {
        let json = r#"{
            "version": 1,
            "name": "with extras",
            "entry": { "type": "immediate" },
            "exit": [ { "type": "profit_target", "multiple": 2.0, "fraction_to_exit": 1.0 } ],
            "author": "someone",
            "experiment_batch": 42
        }"#;
        let def = load_strategy(json).unwrap();
        assert_eq!(def.metadata["author"], serde_json::json!("someone"));
        assert_eq!(def.metadata["experiment_batch"], serde_json::json!(42));
    }

    #[test]
    fn load_strategy_rejects_unknown_rule_type() {
        let json = r#"{
            "version": 1,
            "name": "bad rule",
            "entry": { "type": "teleport" },
            "exit": [ { "type": "profit_target", "multiple": 2.0, "fraction_to_exit": 1.0 } ]
        }"#;
        assert!(matches!(
            load_strategy(json),
            Err(SimulationError::Schema { .. })
        ));
    }

    #[test]
    fn series_duplicate_timestamp_rejected() {
        let series = candles(&[100, 200, 200, 300]);
        let err = validate_series(&series).unwrap_err();
        match err {
            SimulationError::InputData { index, .. } => assert_eq!(index, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn series_non_monotonic_rejected_not_resorted() {
        let series = candles(&[100, 300, 200]);
        assert!(matches!(
            validate_series(&series),
            Err(SimulationError::InputData { index: 2, .. })
        ));
    }

    #[test]
    fn series_bad_ohlc_rejected() {
        let mut series = candles(&[100, 200]);
        series[1].low = 2.0; // above high
        assert!(matches!(
            validate_series(&series),
            Err(SimulationError::InputData { index: 1, .. })
        ));
    }

    #[test]
    fn empty_series_rejected() {
        assert!(validate_series(&[]).is_err());
    }
}
