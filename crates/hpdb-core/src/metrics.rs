//! Submitted metric values and the flag vocabulary attached to them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Kind of validation finding. Stored as lowercase snake-case text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    Missing,
    Incoherent,
    RangeViolation,
    UnitMismatch,
}

impl FlagKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FlagKind::Missing => "missing",
            FlagKind::Incoherent => "incoherent",
            FlagKind::RangeViolation => "range_violation",
            FlagKind::UnitMismatch => "unit_mismatch",
        }
    }
}

impl std::fmt::Display for FlagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for FlagKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missing" => Ok(FlagKind::Missing),
            "incoherent" => Ok(FlagKind::Incoherent),
            "range_violation" => Ok(FlagKind::RangeViolation),
            "unit_mismatch" => Ok(FlagKind::UnitMismatch),
            other => Err(CoreError::InvalidFlagKind(other.to_string())),
        }
    }
}

/// Finding severity, ordered `Info < Warn < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    High,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "warn" => Ok(Severity::Warn),
            "high" => Ok(Severity::High),
            other => Err(CoreError::InvalidSeverity(other.to_string())),
        }
    }
}

/// The slice of a metric the validation engine looks at.
#[derive(Debug, Clone, Copy)]
pub struct MetricValue<'a> {
    pub metric_name: &'a str,
    pub value: Option<Decimal>,
    pub unit: Option<&'a str>,
}

/// A metric observation for one deal, before it has been stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMetric {
    pub deal_id: String,
    pub geography: String,
    pub asset_type: String,
    pub metric_name: String,
    /// Secondary key such as `"2BR"`; empty strings are treated as absent.
    #[serde(default)]
    pub unit_type: Option<String>,
    /// `None` means the value was missing from the source sheet.
    #[serde(default)]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub source_uri: Option<String>,
}

impl NewMetric {
    #[must_use]
    pub fn new(
        deal_id: impl Into<String>,
        geography: impl Into<String>,
        asset_type: impl Into<String>,
        metric_name: impl Into<String>,
    ) -> Self {
        Self {
            deal_id: deal_id.into(),
            geography: geography.into(),
            asset_type: asset_type.into(),
            metric_name: metric_name.into(),
            unit_type: None,
            value: None,
            unit: None,
            period: None,
            source_uri: None,
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: Option<Decimal>) -> Self {
        self.value = value;
        self
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    #[must_use]
    pub fn with_unit_type(mut self, unit_type: impl Into<String>) -> Self {
        self.unit_type = normalize_unit_type(Some(unit_type.into()));
        self
    }

    #[must_use]
    pub fn with_period(mut self, period: Option<String>) -> Self {
        self.period = period;
        self
    }

    #[must_use]
    pub fn with_source_uri(mut self, source_uri: Option<String>) -> Self {
        self.source_uri = source_uri;
        self
    }

    /// Unit subtype with empty strings folded to `None`.
    #[must_use]
    pub fn unit_type(&self) -> Option<&str> {
        non_empty(self.unit_type.as_deref())
    }

    #[must_use]
    pub fn as_value(&self) -> MetricValue<'_> {
        MetricValue {
            metric_name: &self.metric_name,
            value: self.value,
            unit: self.unit.as_deref(),
        }
    }
}

/// A stored metric row as the comparator sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedMetric {
    pub id: i64,
    pub deal_id: String,
    pub geography: String,
    pub asset_type: String,
    pub metric_name: String,
    pub unit_type: Option<String>,
    pub value: Option<Decimal>,
    pub unit: Option<String>,
    pub period: Option<String>,
    pub source_uri: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SubmittedMetric {
    #[must_use]
    pub fn from_new(id: i64, metric: NewMetric, created_at: DateTime<Utc>) -> Self {
        let unit_type = normalize_unit_type(metric.unit_type);
        Self {
            id,
            deal_id: metric.deal_id,
            geography: metric.geography,
            asset_type: metric.asset_type,
            metric_name: metric.metric_name,
            unit_type,
            value: metric.value,
            unit: metric.unit,
            period: metric.period,
            source_uri: metric.source_uri,
            created_at,
        }
    }

    #[must_use]
    pub fn unit_type(&self) -> Option<&str> {
        non_empty(self.unit_type.as_deref())
    }

    #[must_use]
    pub fn as_value(&self) -> MetricValue<'_> {
        MetricValue {
            metric_name: &self.metric_name,
            value: self.value,
            unit: self.unit.as_deref(),
        }
    }
}

pub(crate) fn normalize_unit_type(unit_type: Option<String>) -> Option<String> {
    unit_type.filter(|s| !s.trim().is_empty())
}

pub(crate) fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_info_warn_high() {
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::High);
        assert_eq!(
            [Severity::High, Severity::Info, Severity::Warn]
                .iter()
                .max()
                .copied(),
            Some(Severity::High)
        );
    }

    #[test]
    fn flag_kind_text_round_trips() {
        for kind in [
            FlagKind::Missing,
            FlagKind::Incoherent,
            FlagKind::RangeViolation,
            FlagKind::UnitMismatch,
        ] {
            assert_eq!(kind.as_str().parse::<FlagKind>().unwrap(), kind);
        }
        assert!("bogus".parse::<FlagKind>().is_err());
    }

    #[test]
    fn flag_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FlagKind::RangeViolation).unwrap();
        assert_eq!(json, "\"range_violation\"");
    }

    #[test]
    fn empty_unit_type_is_absent() {
        let metric = NewMetric::new("d", "Tampa, FL", "Multifamily", "avg_rent_usd_month")
            .with_unit_type("  ");
        assert!(metric.unit_type.is_none());
        assert!(metric.unit_type().is_none());

        let stored = SubmittedMetric::from_new(
            1,
            NewMetric {
                unit_type: Some(String::new()),
                ..metric
            },
            Utc::now(),
        );
        assert!(stored.unit_type.is_none());
    }
}
