use std::collections::{HashMap, HashSet};
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Plausibility bounds for one metric name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub metric_name: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub min_value: Option<Decimal>,
    #[serde(default)]
    pub max_value: Option<Decimal>,
    #[serde(default)]
    pub must_be_nonzero: bool,
    /// Value must fall inside `[0, 100]`.
    #[serde(default)]
    pub is_percentage: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Rule {
    #[must_use]
    pub fn new(metric_name: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            unit: None,
            min_value: None,
            max_value: None,
            must_be_nonzero: false,
            is_percentage: false,
            notes: None,
        }
    }
}

/// Read access to rules by metric name.
///
/// A missing rule is not an error: it means no rule-based bounds apply.
pub trait RuleStore {
    fn lookup(&self, metric_name: &str) -> Option<&Rule>;
}

/// In-memory rule store keyed by metric name.
#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    rules: HashMap<String, Rule>,
}

impl RuleBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `rule` only if no rule exists for its metric name.
    ///
    /// Returns `true` when the rule was inserted. An existing (possibly edited)
    /// rule is left untouched.
    pub fn seed(&mut self, rule: Rule) -> bool {
        match self.rules.entry(rule.metric_name.clone()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(rule);
                true
            }
        }
    }

    /// Replace the rule for its metric name, returning the previous one.
    pub fn upsert(&mut self, rule: Rule) -> Option<Rule> {
        self.rules.insert(rule.metric_name.clone(), rule)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }
}

impl RuleStore for RuleBook {
    fn lookup(&self, metric_name: &str) -> Option<&Rule> {
        self.rules.get(metric_name)
    }
}

impl FromIterator<Rule> for RuleBook {
    /// Seeds each rule in order; later duplicates do not overwrite earlier ones.
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        let mut book = Self::new();
        for rule in iter {
            book.seed(rule);
        }
        book
    }
}

#[derive(Debug, Deserialize)]
pub struct RulesFile {
    pub rules: Vec<Rule>,
}

/// Load and validate the rules configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_rules(path: &Path) -> Result<RulesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::RulesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_rules(&content)
}

fn parse_rules(content: &str) -> Result<RulesFile, ConfigError> {
    let rules_file: RulesFile =
        serde_yaml::from_str(content).map_err(ConfigError::RulesFileParse)?;

    validate_rules(&rules_file)?;

    Ok(rules_file)
}

fn validate_rules(rules_file: &RulesFile) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for rule in &rules_file.rules {
        if rule.metric_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "rule metric_name must be non-empty".to_string(),
            ));
        }

        if !seen.insert(rule.metric_name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate rule for metric '{}'",
                rule.metric_name
            )));
        }

        if let (Some(min), Some(max)) = (rule.min_value, rule.max_value) {
            if min > max {
                return Err(ConfigError::Validation(format!(
                    "rule '{}' has min_value {min} greater than max_value {max}",
                    rule.metric_name
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounded(name: &str, min: i64, max: i64) -> Rule {
        Rule {
            min_value: Some(Decimal::from(min)),
            max_value: Some(Decimal::from(max)),
            ..Rule::new(name)
        }
    }

    #[test]
    fn lookup_unknown_metric_is_none() {
        let book = RuleBook::new();
        assert!(book.lookup("noi_usd").is_none());
    }

    #[test]
    fn seed_twice_keeps_first_bounds() {
        let mut book = RuleBook::new();
        assert!(book.seed(bounded("price_per_sf_usd", 10, 2000)));
        assert!(!book.seed(bounded("price_per_sf_usd", 0, 1)));

        let rule = book.lookup("price_per_sf_usd").expect("rule");
        assert_eq!(rule.min_value, Some(Decimal::from(10)));
        assert_eq!(rule.max_value, Some(Decimal::from(2000)));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn seed_does_not_overwrite_edited_rule() {
        let mut book = RuleBook::new();
        book.seed(bounded("noi_usd", 0, 100));
        book.upsert(bounded("noi_usd", 5, 50));
        book.seed(bounded("noi_usd", 0, 100));

        let rule = book.lookup("noi_usd").expect("rule");
        assert_eq!(rule.min_value, Some(Decimal::from(5)));
        assert_eq!(rule.max_value, Some(Decimal::from(50)));
    }

    #[test]
    fn from_iter_keeps_first_duplicate() {
        let book: RuleBook = vec![bounded("a", 1, 2), bounded("a", 3, 4), bounded("b", 0, 9)]
            .into_iter()
            .collect();
        assert_eq!(book.len(), 2);
        assert_eq!(
            book.lookup("a").and_then(|r| r.min_value),
            Some(Decimal::ONE)
        );
    }

    #[test]
    fn parse_rules_reads_yaml() {
        let yaml = r#"
rules:
  - metric_name: cap_rate_pct
    unit: "%"
    min_value: "2"
    max_value: "15"
    is_percentage: true
  - metric_name: noi_usd
    unit: USD
    must_be_nonzero: true
"#;
        let file = parse_rules(yaml).expect("parse");
        assert_eq!(file.rules.len(), 2);
        let cap = &file.rules[0];
        assert!(cap.is_percentage);
        assert_eq!(cap.min_value, Some(Decimal::from(2)));
        let noi = &file.rules[1];
        assert!(noi.must_be_nonzero);
        assert!(noi.min_value.is_none());
        assert!(!noi.is_percentage);
    }

    #[test]
    fn parse_rules_rejects_duplicates() {
        let yaml = "rules:\n  - metric_name: noi_usd\n  - metric_name: noi_usd\n";
        let err = parse_rules(yaml).expect_err("duplicate should fail");
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn parse_rules_rejects_inverted_bounds() {
        let yaml = "rules:\n  - metric_name: x\n    min_value: \"10\"\n    max_value: \"1\"\n";
        let err = parse_rules(yaml).expect_err("inverted bounds should fail");
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn parse_rules_rejects_blank_name() {
        let yaml = "rules:\n  - metric_name: \"  \"\n";
        assert!(matches!(
            parse_rules(yaml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn load_rules_reports_missing_file() {
        let err = load_rules(Path::new("/nonexistent/rules.yaml")).expect_err("missing file");
        assert!(matches!(err, ConfigError::RulesFileIo { .. }));
    }

    #[test]
    fn shipped_rules_file_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/rules.yaml");
        let file = load_rules(&path).expect("config/rules.yaml should load");
        let book: RuleBook = file.rules.into_iter().collect();

        let cap = book.lookup("cap_rate_pct").expect("cap rate rule");
        assert!(cap.is_percentage);
        assert!(book.lookup("price_per_sf_usd").is_some_and(|r| r.must_be_nonzero));
    }
}
