//! Spending classification
//!
//! Category assignment and anomaly flagging behind [`SpendingClassifier`], so
//! the keyword rules can be swapped for another model without touching the
//! consumer.

use rust_decimal::Decimal;

/// Category when no rule matches and the event carries none
pub const FALLBACK_CATEGORY: &str = "OTHER";

pub const ANOMALY_REASON: &str = "Unusually large transaction";

/// What the classifier decided about one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: String,
    pub anomaly_reason: Option<String>,
    pub merchant_type: String,
}

impl Classification {
    pub fn is_anomalous(&self) -> bool {
        self.anomaly_reason.is_some()
    }
}

pub trait SpendingClassifier: Send + Sync {
    /// Name recorded in the analysis metadata
    fn name(&self) -> &str;

    fn classify(
        &self,
        merchant_name: &str,
        supplied_category: Option<&str>,
        amount: Decimal,
    ) -> Classification;
}

/// Category assigned when the merchant name contains any keyword
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub category: String,
    pub keywords: Vec<String>,
}

impl CategoryRule {
    pub fn new(category: &str, keywords: &[&str]) -> Self {
        Self {
            category: category.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    fn matches(&self, merchant: &str) -> bool {
        self.keywords.iter().any(|k| merchant.contains(k.as_str()))
    }
}

/// Ordered keyword rules; the first matching rule wins.
#[derive(Debug, Clone)]
pub struct RuleBasedClassifier {
    rules: Vec<CategoryRule>,
    anomaly_threshold: Decimal,
}

impl RuleBasedClassifier {
    pub fn new(rules: Vec<CategoryRule>, anomaly_threshold: Decimal) -> Self {
        Self {
            rules,
            anomaly_threshold,
        }
    }

    pub fn default_rules() -> Vec<CategoryRule> {
        vec![
            CategoryRule::new("FOOD", &["restaurant", "cafe"]),
            CategoryRule::new("TRANSPORT", &["gas", "transport"]),
            CategoryRule::new("SHOPPING", &["mart", "shop"]),
            CategoryRule::new("ENTERTAINMENT", &["movie", "game"]),
        ]
    }

    pub fn with_threshold(anomaly_threshold: Decimal) -> Self {
        Self::new(Self::default_rules(), anomaly_threshold)
    }

    fn category(&self, merchant_name: &str, supplied: Option<&str>) -> String {
        let merchant = merchant_name.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&merchant))
            .map(|rule| rule.category.clone())
            .or_else(|| supplied.map(str::to_string))
            .unwrap_or_else(|| FALLBACK_CATEGORY.to_string())
    }
}

impl Default for RuleBasedClassifier {
    fn default() -> Self {
        Self::with_threshold(Decimal::from(100_000))
    }
}

impl SpendingClassifier for RuleBasedClassifier {
    fn name(&self) -> &str {
        "rule-based"
    }

    fn classify(
        &self,
        merchant_name: &str,
        supplied_category: Option<&str>,
        amount: Decimal,
    ) -> Classification {
        Classification {
            category: self.category(merchant_name, supplied_category),
            anomaly_reason: (amount > self.anomaly_threshold).then(|| ANOMALY_REASON.to_string()),
            // No merchant directory yet
            merchant_type: "RETAIL".to_string(),
        }
    }
}
