//! Rule-driven flagging of submitted metric values.
//!
//! Every check runs independently against the same value, so one metric can
//! raise several findings in a single pass. The only early exit is a missing
//! value, which leaves nothing else to check.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::metrics::{FlagKind, MetricValue, Severity};
use crate::rules::{Rule, RuleStore};

const PERCENT_MAX: Decimal = Decimal::ONE_HUNDRED;

/// A single validation result for one metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FlagKind,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    fn new(kind: FlagKind, severity: Severity, message: String) -> Self {
        Self {
            kind,
            severity,
            message,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Also emit `unit_mismatch` when the metric's unit differs from the rule's.
    pub strict_units: bool,
}

/// Look up the rule for `metric` in `store` and validate against it.
#[must_use]
pub fn validate_with<S: RuleStore + ?Sized>(
    store: &S,
    metric: MetricValue<'_>,
    options: ValidationOptions,
) -> Vec<Finding> {
    validate(metric, store.lookup(metric.metric_name), options)
}

/// Evaluate every applicable check against `metric`.
///
/// `rule` is `None` when no rule exists for the metric name; only the
/// unit-driven percentage check can fire in that case.
#[must_use]
pub fn validate(
    metric: MetricValue<'_>,
    rule: Option<&Rule>,
    options: ValidationOptions,
) -> Vec<Finding> {
    let name = metric.metric_name;

    let Some(value) = metric.value else {
        return vec![Finding::new(
            FlagKind::Missing,
            Severity::Warn,
            format!("{name} value is missing"),
        )];
    };

    let mut findings = Vec::new();

    if rule.is_some_and(|r| r.must_be_nonzero) && value.is_zero() {
        findings.push(Finding::new(
            FlagKind::Incoherent,
            Severity::High,
            format!("{name} must be nonzero"),
        ));
    }

    let percent_unit = metric.unit.is_some_and(|u| u.eq_ignore_ascii_case("%"));
    if (rule.is_some_and(|r| r.is_percentage) || percent_unit)
        && (value < Decimal::ZERO || value > PERCENT_MAX)
    {
        findings.push(Finding::new(
            FlagKind::Incoherent,
            Severity::High,
            format!("{name} = {value} is outside the 0-100 percentage range"),
        ));
    }

    if let Some(min) = rule.and_then(|r| r.min_value) {
        if value < min {
            findings.push(Finding::new(
                FlagKind::RangeViolation,
                Severity::Warn,
                format!("{name} = {value} is below minimum {min}"),
            ));
        }
    }

    if let Some(max) = rule.and_then(|r| r.max_value) {
        if value > max {
            findings.push(Finding::new(
                FlagKind::RangeViolation,
                Severity::Warn,
                format!("{name} = {value} is above maximum {max}"),
            ));
        }
    }

    if options.strict_units {
        if let Some(finding) = unit_mismatch(name, metric.unit, rule) {
            findings.push(finding);
        }
    }

    findings
}

fn unit_mismatch(name: &str, unit: Option<&str>, rule: Option<&Rule>) -> Option<Finding> {
    let expected = rule?.unit.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
    let submitted = unit.map(str::trim).filter(|u| !u.is_empty())?;

    if expected.eq_ignore_ascii_case(submitted) {
        return None;
    }

    Some(Finding::new(
        FlagKind::UnitMismatch,
        Severity::Info,
        format!("{name} submitted in '{submitted}' but rule expects '{expected}'"),
    ))
}

#[cfg(test)]
#[path = "validation_test.rs"]
mod tests;
