//! Aggregation of filtered market benchmarks and per-metric deviation reports.
//!
//! Benchmarks are bucketed by `(geography, asset_type, metric_name,
//! unit_type)`. Each bucket holds one representative value per provider,
//! reduced with the configured [`AggregateMethod`]. Submitted metrics are then
//! joined to their bucket and scored against providers in priority order.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize, Serializer};

use crate::metrics::{non_empty, normalize_unit_type, SubmittedMetric};
use crate::CoreError;

const DEVIATION_SCALE: u32 = 2;

/// One observation from one listing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketBenchmark {
    pub provider: String,
    pub geography: String,
    pub asset_type: String,
    pub metric_name: String,
    #[serde(default)]
    pub unit_type: Option<String>,
    pub value: Decimal,
    #[serde(default)]
    pub unit: Option<String>,
    /// Only filtered rows take part in comparisons.
    #[serde(default)]
    pub filtered: bool,
    #[serde(default)]
    pub observed_on: Option<NaiveDate>,
    #[serde(default)]
    pub source_uri: Option<String>,
}

impl MarketBenchmark {
    /// Unit subtype with empty strings folded to `None`.
    #[must_use]
    pub fn unit_type(&self) -> Option<&str> {
        non_empty(self.unit_type.as_deref())
    }

    #[must_use]
    pub fn key(&self) -> BenchmarkKey {
        BenchmarkKey::new(
            &self.geography,
            &self.asset_type,
            &self.metric_name,
            self.unit_type.as_deref(),
        )
    }
}

/// Join key between submitted metrics and benchmark buckets.
///
/// Empty unit types are folded to `None` so that "no subtype" matches itself
/// regardless of how it was stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BenchmarkKey {
    pub geography: String,
    pub asset_type: String,
    pub metric_name: String,
    pub unit_type: Option<String>,
}

impl BenchmarkKey {
    #[must_use]
    pub fn new(
        geography: &str,
        asset_type: &str,
        metric_name: &str,
        unit_type: Option<&str>,
    ) -> Self {
        Self {
            geography: geography.to_string(),
            asset_type: asset_type.to_string(),
            metric_name: metric_name.to_string(),
            unit_type: normalize_unit_type(unit_type.map(ToOwned::to_owned)),
        }
    }

    #[must_use]
    pub fn for_metric(metric: &SubmittedMetric) -> Self {
        Self::new(
            &metric.geography,
            &metric.asset_type,
            &metric.metric_name,
            metric.unit_type.as_deref(),
        )
    }
}

/// How several filtered values from one provider collapse into one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateMethod {
    #[default]
    Mean,
    Median,
    /// Largest recorded value. Lossy when a provider has several rows.
    Max,
}

impl AggregateMethod {
    /// Reduce `values` to one representative value. `None` for an empty slice.
    ///
    /// Sums that would leave the `Decimal` range fall back to dividing each
    /// term first, so any set of representable values has a result.
    #[must_use]
    pub fn reduce(self, values: &[Decimal]) -> Option<Decimal> {
        if values.is_empty() {
            return None;
        }
        match self {
            AggregateMethod::Mean => {
                let count = Decimal::from(values.len());
                values
                    .iter()
                    .try_fold(Decimal::ZERO, |sum, v| sum.checked_add(*v))
                    .map(|sum| sum / count)
                    .or_else(|| {
                        values
                            .iter()
                            .try_fold(Decimal::ZERO, |mean, v| mean.checked_add(*v / count))
                    })
            }
            AggregateMethod::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_unstable();
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 1 {
                    return Some(sorted[mid]);
                }
                let (low, high) = (sorted[mid - 1], sorted[mid]);
                low.checked_add(high)
                    .map(|sum| sum / Decimal::TWO)
                    .or_else(|| (low / Decimal::TWO).checked_add(high / Decimal::TWO))
            }
            AggregateMethod::Max => values.iter().copied().max(),
        }
    }
}

impl std::fmt::Display for AggregateMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateMethod::Mean => write!(f, "mean"),
            AggregateMethod::Median => write!(f, "median"),
            AggregateMethod::Max => write!(f, "max"),
        }
    }
}

impl std::str::FromStr for AggregateMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" | "avg" | "average" => Ok(AggregateMethod::Mean),
            "median" => Ok(AggregateMethod::Median),
            "max" => Ok(AggregateMethod::Max),
            other => Err(CoreError::InvalidAggregateMethod(other.to_string())),
        }
    }
}

/// Provider ordering and aggregation settings for a comparison run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonPolicy {
    pub provider_priority: Vec<String>,
    pub aggregate: AggregateMethod,
}

impl Default for ComparisonPolicy {
    fn default() -> Self {
        Self {
            provider_priority: vec!["CREXi".to_string(), "Realtor.com".to_string()],
            aggregate: AggregateMethod::Mean,
        }
    }
}

/// Aggregated benchmark values for one key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchmarkBucket {
    /// First unit seen among the contributing benchmarks.
    pub unit: Option<String>,
    pub values: BTreeMap<String, Decimal>,
}

/// Group filtered benchmarks by key and reduce each provider to one value.
///
/// Unfiltered rows are ignored entirely.
#[must_use]
pub fn aggregate_benchmarks(
    benchmarks: &[MarketBenchmark],
    method: AggregateMethod,
) -> HashMap<BenchmarkKey, BenchmarkBucket> {
    let mut grouped: HashMap<BenchmarkKey, (Option<String>, BTreeMap<String, Vec<Decimal>>)> =
        HashMap::new();

    for benchmark in benchmarks.iter().filter(|b| b.filtered) {
        let (unit, per_provider) = grouped
            .entry(benchmark.key())
            .or_insert_with(|| (benchmark.unit.clone(), BTreeMap::new()));
        if unit.is_none() {
            unit.clone_from(&benchmark.unit);
        }
        per_provider
            .entry(benchmark.provider.clone())
            .or_default()
            .push(benchmark.value);
    }

    grouped
        .into_iter()
        .map(|(key, (unit, per_provider))| {
            let values = per_provider
                .into_iter()
                .filter_map(|(provider, values)| {
                    method.reduce(&values).map(|value| (provider, value))
                })
                .collect();
            (key, BenchmarkBucket { unit, values })
        })
        .collect()
}

/// Qualitative classification of a submitted value against the market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comment {
    NoMarketMatch,
    Above(String),
    Below(String),
    MatchesMarket,
}

impl std::fmt::Display for Comment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Comment::NoMarketMatch => write!(f, "no market match"),
            Comment::Above(provider) => write!(f, "+ above {provider}"),
            Comment::Below(provider) => write!(f, "- below {provider}"),
            Comment::MatchesMarket => write!(f, "\u{2248} matches market"),
        }
    }
}

impl Serialize for Comment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderBenchmark {
    pub provider: String,
    pub value: Option<Decimal>,
}

/// One line of a deal's comparison report. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub deal_id: String,
    pub geography: String,
    pub asset_type: String,
    pub metric_name: String,
    pub unit_type: Option<String>,
    pub value: Option<Decimal>,
    pub unit: Option<String>,
    pub market_unit: Option<String>,
    /// Priority providers first (present or not), then any other provider in
    /// the bucket by name.
    pub benchmarks: Vec<ProviderBenchmark>,
    pub deviation: Option<Decimal>,
    pub comment: Comment,
}

/// Compare a deal's submitted metrics against filtered market benchmarks.
///
/// Produces one row per distinct `(metric_name, unit_type)`. When a pair was
/// submitted more than once the most recent submission is used. Rows are
/// ordered by metric name, then unit type.
#[must_use]
pub fn compare(
    metrics: &[SubmittedMetric],
    benchmarks: &[MarketBenchmark],
    policy: &ComparisonPolicy,
) -> Vec<ComparisonRow> {
    let buckets = aggregate_benchmarks(benchmarks, policy.aggregate);

    let mut latest: BTreeMap<(&str, Option<&str>), &SubmittedMetric> = BTreeMap::new();
    for metric in metrics {
        let slot = latest
            .entry((metric.metric_name.as_str(), metric.unit_type()))
            .or_insert(metric);
        if (metric.created_at, metric.id) > (slot.created_at, slot.id) {
            *slot = metric;
        }
    }

    latest
        .into_values()
        .map(|metric| {
            let bucket = buckets.get(&BenchmarkKey::for_metric(metric));
            compare_one(metric, bucket, &policy.provider_priority)
        })
        .collect()
}

fn compare_one(
    metric: &SubmittedMetric,
    bucket: Option<&BenchmarkBucket>,
    priority: &[String],
) -> ComparisonRow {
    let empty = BTreeMap::new();
    let values = bucket.map_or(&empty, |b| &b.values);

    let mut benchmarks: Vec<ProviderBenchmark> = priority
        .iter()
        .map(|provider| ProviderBenchmark {
            provider: provider.clone(),
            value: values.get(provider).copied().map(round_for_display),
        })
        .collect();
    benchmarks.extend(
        values
            .iter()
            .filter(|(provider, _)| !priority.iter().any(|p| p == *provider))
            .map(|(provider, value)| ProviderBenchmark {
                provider: provider.clone(),
                value: Some(round_for_display(*value)),
            }),
    );

    ComparisonRow {
        deal_id: metric.deal_id.clone(),
        geography: metric.geography.clone(),
        asset_type: metric.asset_type.clone(),
        metric_name: metric.metric_name.clone(),
        unit_type: metric.unit_type().map(ToOwned::to_owned),
        value: metric.value,
        unit: metric.unit.clone(),
        market_unit: bucket.and_then(|b| b.unit.clone()),
        deviation: deviation(metric.value, values, priority),
        comment: classify(metric.value, values, priority),
        benchmarks,
    }
}

/// Provider values are reported at the deviation scale; trailing digits of a
/// non-terminating mean are dropped. Comparisons use the unrounded value.
fn round_for_display(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DEVIATION_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `value` minus the first available provider value, rounded to two places.
///
/// `None` also when the difference is outside the `Decimal` range.
#[must_use]
pub fn deviation(
    value: Option<Decimal>,
    market: &BTreeMap<String, Decimal>,
    priority: &[String],
) -> Option<Decimal> {
    let value = value?;
    let benchmark = priority.iter().find_map(|p| market.get(p))?;
    let mut diff = value
        .checked_sub(*benchmark)?
        .round_dp_with_strategy(DEVIATION_SCALE, RoundingStrategy::MidpointAwayFromZero);
    diff.rescale(DEVIATION_SCALE);
    Some(diff)
}

/// Classify `value` against providers in priority order; first match wins.
///
/// A provider whose value equals the submission defers to the next provider.
#[must_use]
pub fn classify(
    value: Option<Decimal>,
    market: &BTreeMap<String, Decimal>,
    priority: &[String],
) -> Comment {
    if priority.iter().all(|p| !market.contains_key(p)) {
        return Comment::NoMarketMatch;
    }

    let Some(value) = value else {
        return Comment::MatchesMarket;
    };

    for provider in priority {
        let Some(benchmark) = market.get(provider) else {
            continue;
        };
        if value > *benchmark {
            return Comment::Above(provider.clone());
        }
        if value < *benchmark {
            return Comment::Below(provider.clone());
        }
    }

    Comment::MatchesMarket
}

#[cfg(test)]
#[path = "comparison_test.rs"]
mod tests;
