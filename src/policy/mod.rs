//! Burn policy engine
//!
//! Turns an [`EvaluationResult`] and its SLO spec into a deterministic
//! gate decision. Gating modifiers (staleness, zero traffic) apply first,
//! then every burn rule in declaration order. Severity is totally ordered
//! `ALLOW < WARN < BLOCK` and BLOCK is absorbing, so a triggered BLOCK can
//! never be downgraded by a later rule or modifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::eval::EvaluationResult;
use crate::slo::{BurnRule, Slo};

/// Gate decision, ordered by severity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    #[default]
    Allow,
    Warn,
    Block,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "ALLOW",
            Decision::Warn => "WARN",
            Decision::Block => "BLOCK",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALLOW" => Ok(Decision::Allow),
            "WARN" => Ok(Decision::Warn),
            "BLOCK" => Ok(Decision::Block),
            other => Err(format!("unknown decision: {other}")),
        }
    }
}

/// Outcome of evaluating a single burn rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    pub rule_name: String,
    pub triggered: bool,
    pub action: Decision,
    pub short_burn_rate: f64,
    pub long_burn_rate: f64,
    pub threshold: f64,
    pub reason: String,
}

/// Final gate decision with the full evaluation trail
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateResult {
    pub decision: Decision,
    pub rule_results: Vec<RuleResult>,
    /// Human-readable reasons in evaluation order
    pub reasons: Vec<String>,
    pub is_stale: bool,
    pub has_no_traffic: bool,
}

/// Evaluates burn policies against evaluation results
#[derive(Debug, Default)]
pub struct Engine;

impl Engine {
    pub fn new() -> Self {
        Self
    }

    /// Apply gating modifiers and burn rules; never fails for a
    /// well-formed evaluation result.
    pub fn evaluate(&self, slo: &Slo, eval_result: &EvaluationResult) -> GateResult {
        let mut result = GateResult {
            decision: Decision::Allow,
            rule_results: Vec::with_capacity(slo.spec.burn_policy.rules.len()),
            reasons: Vec::new(),
            is_stale: eval_result.is_stale,
            has_no_traffic: eval_result.insufficient_data,
        };

        if eval_result.is_stale {
            result.decision = result.decision.max(Decision::Warn);
            result.reasons.push("data is stale".to_string());
        }

        if eval_result.insufficient_data {
            result.decision = result.decision.max(Decision::Warn);
            result
                .reasons
                .push("insufficient data (zero traffic)".to_string());
        }

        for rule in &slo.spec.burn_policy.rules {
            let rule_result = evaluate_rule(rule, eval_result);

            if rule_result.triggered {
                result.decision = result.decision.max(rule_result.action);
                result.reasons.push(rule_result.reason.clone());
            }

            result.rule_results.push(rule_result);
        }

        if result.decision == Decision::Allow && result.reasons.is_empty() {
            result
                .reasons
                .push("all burn rate checks passed".to_string());
        }

        result
    }
}

/// A rule triggers iff both its short and long window burn rates meet the
/// threshold.
fn evaluate_rule(rule: &BurnRule, eval_result: &EvaluationResult) -> RuleResult {
    // Admission guarantees a valid action string; anything else maps to
    // the non-escalating decision so evaluation can never fail.
    let action = Decision::from_str(&rule.action).unwrap_or(Decision::Allow);

    let (short_burn, long_burn) = match (
        eval_result.burn_rates.get(&rule.short_window),
        eval_result.burn_rates.get(&rule.long_window),
    ) {
        (Some(short), Some(long)) => (short, long),
        _ => {
            return RuleResult {
                rule_name: rule.name.clone(),
                triggered: false,
                action,
                short_burn_rate: 0.0,
                long_burn_rate: 0.0,
                threshold: rule.threshold,
                reason: format!("rule {}: missing window data", rule.name),
            };
        }
    };

    let triggered =
        short_burn.burn_rate >= rule.threshold && long_burn.burn_rate >= rule.threshold;

    let reason = if triggered {
        format!(
            "rule {} triggered: short={:.2}x, long={:.2}x (threshold={:.2}x)",
            rule.name, short_burn.burn_rate, long_burn.burn_rate, rule.threshold
        )
    } else {
        String::new()
    };

    RuleResult {
        rule_name: rule.name.clone(),
        triggered,
        action,
        short_burn_rate: short_burn.burn_rate,
        long_burn_rate: long_burn.burn_rate,
        threshold: rule.threshold,
        reason,
    }
}
