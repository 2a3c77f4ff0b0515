//! Bucket notification configuration
//!
//! S3-compatible notification rules for cloud function targets:
//! - event type patterns such as `s3:ObjectCreated:*`
//! - object key filtering by prefix/suffix
//!
//! Configurations are kept exactly as the client sent them so they can be
//! persisted and echoed back unchanged. Before a configuration is attached to
//! a bucket it is compiled into [`TargetMatcher`]s, which is where invalid
//! filter rules are rejected.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::NotificationEvent;
use crate::error::ConfigurationError;

// ============================================================================
// Event Types
// ============================================================================

/// Pattern matching every object creation event
pub const OBJECT_CREATED_ALL: &str = "s3:ObjectCreated:*";

/// Pattern matching every object removal event
pub const OBJECT_REMOVED_ALL: &str = "s3:ObjectRemoved:*";

/// Concrete S3 event types emitted by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum S3EventType {
    #[serde(rename = "s3:ObjectCreated")]
    ObjectCreated,
    #[serde(rename = "s3:ObjectCreated:Put")]
    ObjectCreatedPut,
    #[serde(rename = "s3:ObjectCreated:Post")]
    ObjectCreatedPost,
    #[serde(rename = "s3:ObjectCreated:Copy")]
    ObjectCreatedCopy,
    #[serde(rename = "s3:ObjectCreated:CompleteMultipartUpload")]
    ObjectCreatedCompleteMultipartUpload,
    #[serde(rename = "s3:ObjectRemoved")]
    ObjectRemoved,
    #[serde(rename = "s3:ObjectRemoved:Delete")]
    ObjectRemovedDelete,
}

impl S3EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            S3EventType::ObjectCreated => "s3:ObjectCreated",
            S3EventType::ObjectCreatedPut => "s3:ObjectCreated:Put",
            S3EventType::ObjectCreatedPost => "s3:ObjectCreated:Post",
            S3EventType::ObjectCreatedCopy => "s3:ObjectCreated:Copy",
            S3EventType::ObjectCreatedCompleteMultipartUpload => {
                "s3:ObjectCreated:CompleteMultipartUpload"
            }
            S3EventType::ObjectRemoved => "s3:ObjectRemoved",
            S3EventType::ObjectRemovedDelete => "s3:ObjectRemoved:Delete",
        }
    }

    /// Name used in event records, which drop the `s3:` prefix
    pub fn record_name(&self) -> &'static str {
        let name = self.as_str();
        name.strip_prefix("s3:").unwrap_or(name)
    }

    /// Check whether a configured pattern selects this event type.
    ///
    /// The pattern's trailing `*` is stripped and the remainder compared as a
    /// `:`-separated prefix in either direction, so `s3:ObjectCreated:*`
    /// selects both `s3:ObjectCreated` and `s3:ObjectCreated:Put`.
    pub fn matches_pattern(&self, pattern: &str) -> bool {
        let base = pattern.strip_suffix('*').unwrap_or(pattern);
        let stem = base.strip_suffix(':').unwrap_or(base);
        if stem.is_empty() {
            return false;
        }

        let event = self.as_str();
        is_segment_prefix(stem, event) || is_segment_prefix(event, stem)
    }
}

impl fmt::Display for S3EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn is_segment_prefix(prefix: &str, value: &str) -> bool {
    match value.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(':'),
        None => false,
    }
}

// ============================================================================
// Filter Rules
// ============================================================================

/// Filter rule kinds understood by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterRuleKind {
    Prefix,
    Suffix,
}

impl FilterRuleKind {
    pub fn parse(name: &str) -> Result<Self, ConfigurationError> {
        if name.eq_ignore_ascii_case("prefix") {
            Ok(FilterRuleKind::Prefix)
        } else if name.eq_ignore_ascii_case("suffix") {
            Ok(FilterRuleKind::Suffix)
        } else {
            Err(ConfigurationError::UnknownFilterRule(name.to_string()))
        }
    }
}

/// Filter rule for key name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilterRule {
    /// Filter name: "prefix" or "suffix"
    pub name: String,
    /// Filter value
    pub value: String,
}

impl FilterRule {
    pub fn prefix(value: impl Into<String>) -> Self {
        Self {
            name: "prefix".to_string(),
            value: value.into(),
        }
    }

    pub fn suffix(value: impl Into<String>) -> Self {
        Self {
            name: "suffix".to_string(),
            value: value.into(),
        }
    }

    pub fn kind(&self) -> Result<FilterRuleKind, ConfigurationError> {
        FilterRuleKind::parse(&self.name)
    }

    /// Check if a key satisfies this rule
    pub fn matches(&self, key: &str) -> Result<bool, ConfigurationError> {
        Ok(match self.kind()? {
            FilterRuleKind::Prefix => key.starts_with(&self.value),
            FilterRuleKind::Suffix => key.ends_with(&self.value),
        })
    }
}

/// S3 Key filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct S3KeyFilter {
    /// Filter rules, all of which must match
    #[serde(default)]
    pub filter_rules: Vec<FilterRule>,
}

impl S3KeyFilter {
    /// Create a new prefix filter
    pub fn prefix(value: impl Into<String>) -> Self {
        Self {
            filter_rules: vec![FilterRule::prefix(value)],
        }
    }

    /// Create a new suffix filter
    pub fn suffix(value: impl Into<String>) -> Self {
        Self {
            filter_rules: vec![FilterRule::suffix(value)],
        }
    }

    /// Add prefix filter
    pub fn with_prefix(mut self, value: impl Into<String>) -> Self {
        self.filter_rules.push(FilterRule::prefix(value));
        self
    }

    /// Add suffix filter
    pub fn with_suffix(mut self, value: impl Into<String>) -> Self {
        self.filter_rules.push(FilterRule::suffix(value));
        self
    }

    /// Check if a key matches every rule
    pub fn matches(&self, key: &str) -> Result<bool, ConfigurationError> {
        for rule in &self.filter_rules {
            if !rule.matches(key)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Validate the rules once so the result can be evaluated without errors
    pub fn compile(&self) -> Result<KeyFilter, ConfigurationError> {
        let rules = self
            .filter_rules
            .iter()
            .map(|rule| Ok((rule.kind()?, rule.value.clone())))
            .collect::<Result<Vec<_>, ConfigurationError>>()?;
        Ok(KeyFilter { rules })
    }
}

/// Validated key filter
#[derive(Debug, Clone, Default)]
pub struct KeyFilter {
    rules: Vec<(FilterRuleKind, String)>,
}

impl KeyFilter {
    pub fn matches(&self, key: &str) -> bool {
        self.rules.iter().all(|(kind, value)| match kind {
            FilterRuleKind::Prefix => key.starts_with(value.as_str()),
            FilterRuleKind::Suffix => key.ends_with(value.as_str()),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Notification filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct NotificationFilter {
    /// Key filter
    #[serde(rename = "S3Key", default)]
    pub s3_key: S3KeyFilter,
}

// ============================================================================
// Notification Configurations
// ============================================================================

/// Cloud function (Lambda) notification configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CloudFunctionConfiguration {
    /// Configuration ID
    #[serde(default)]
    pub id: String,
    /// Event patterns to notify
    #[serde(default)]
    pub events: Vec<String>,
    /// Key filter
    #[serde(default)]
    pub filter: NotificationFilter,
    /// Target reference, usually a Lambda function ARN
    pub cloud_function: String,
}

impl CloudFunctionConfiguration {
    pub fn new(id: impl Into<String>, cloud_function: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            events: Vec::new(),
            filter: NotificationFilter::default(),
            cloud_function: cloud_function.into(),
        }
    }

    pub fn with_event(mut self, pattern: impl Into<String>) -> Self {
        self.events.push(pattern.into());
        self
    }

    pub fn with_filter(mut self, filter: S3KeyFilter) -> Self {
        self.filter.s3_key = filter;
        self
    }

    /// Check the event type against the configured patterns
    pub fn matches_event_type(&self, event_type: S3EventType) -> bool {
        self.events
            .iter()
            .any(|pattern| event_type.matches_pattern(pattern))
    }

    /// Check whether an event should reach this target
    pub fn matches(&self, event: &NotificationEvent) -> Result<bool, ConfigurationError> {
        if !self.matches_event_type(event.event_type) {
            return Ok(false);
        }
        self.filter.s3_key.matches(&event.key)
    }

    pub fn compile(&self) -> Result<TargetMatcher, ConfigurationError> {
        Ok(TargetMatcher {
            id: self.id.clone(),
            target: self.cloud_function.clone(),
            events: self.events.clone(),
            filter: self.filter.s3_key.compile()?,
        })
    }
}

/// A validated target ready for event evaluation
#[derive(Debug, Clone)]
pub struct TargetMatcher {
    pub id: String,
    pub target: String,
    events: Vec<String>,
    filter: KeyFilter,
}

impl TargetMatcher {
    pub fn matches(&self, event: &NotificationEvent) -> bool {
        self.events
            .iter()
            .any(|pattern| event.event_type.matches_pattern(pattern))
            && self.filter.matches(&event.key)
    }
}

/// Complete bucket notification configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct NotificationConfiguration {
    #[serde(default)]
    pub cloud_function_configurations: Vec<CloudFunctionConfiguration>,
}

impl NotificationConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cloud_function(mut self, config: CloudFunctionConfiguration) -> Self {
        self.cloud_function_configurations.push(config);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cloud_function_configurations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cloud_function_configurations.len()
    }

    /// Compile every target, failing on the first invalid filter rule
    pub fn compile(&self) -> Result<Vec<TargetMatcher>, ConfigurationError> {
        self.cloud_function_configurations
            .iter()
            .map(CloudFunctionConfiguration::compile)
            .collect()
    }

    /// Targets that should receive an event, in configuration order
    pub fn matching_targets(
        &self,
        event: &NotificationEvent,
    ) -> Result<Vec<&CloudFunctionConfiguration>, ConfigurationError> {
        let mut targets = Vec::new();
        for config in &self.cloud_function_configurations {
            if config.matches(event)? {
                targets.push(config);
            }
        }
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: S3EventType, key: &str) -> NotificationEvent {
        NotificationEvent::new("bucket", key, event_type)
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = S3KeyFilter::default();

        for key in ["test1.bin", "test1.txt", "test2.bin", ""] {
            assert!(filter.matches(key).unwrap());
            assert!(filter.compile().unwrap().matches(key));
        }
    }

    #[test]
    fn test_suffix_only() {
        let filter = S3KeyFilter::suffix("bin");

        assert!(filter.matches("test1.bin").unwrap());
        assert!(!filter.matches("test1.txt").unwrap());
        assert!(filter.matches("test2.bin").unwrap());
    }

    #[test]
    fn test_prefix_only() {
        let filter = S3KeyFilter::prefix("test1");

        assert!(filter.matches("test1.bin").unwrap());
        assert!(filter.matches("test1.txt").unwrap());
        assert!(!filter.matches("test2.bin").unwrap());
    }

    #[test]
    fn test_prefix_and_suffix() {
        let filter = S3KeyFilter::prefix("test1").with_suffix("bin");
        let compiled = filter.compile().unwrap();

        for (key, expected) in [("test1.bin", true), ("test1.txt", false), ("test2.bin", false)] {
            assert_eq!(filter.matches(key).unwrap(), expected, "{}", key);
            assert_eq!(compiled.matches(key), expected, "{}", key);
        }
    }

    #[test]
    fn test_rule_names_are_case_insensitive() {
        let rule = FilterRule {
            name: "Prefix".to_string(),
            value: "logs/".to_string(),
        };
        assert!(rule.matches("logs/app.log").unwrap());
        assert!(!rule.matches("data/app.log").unwrap());
    }

    #[test]
    fn test_unknown_rule_is_an_error() {
        let filter = S3KeyFilter {
            filter_rules: vec![FilterRule {
                name: "glob".to_string(),
                value: "*.log".to_string(),
            }],
        };

        assert_eq!(
            filter.matches("app.log"),
            Err(ConfigurationError::UnknownFilterRule("glob".to_string()))
        );
        assert!(filter.compile().is_err());
    }

    #[test]
    fn test_event_type_patterns() {
        assert!(S3EventType::ObjectCreated.matches_pattern(OBJECT_CREATED_ALL));
        assert!(S3EventType::ObjectCreatedPut.matches_pattern(OBJECT_CREATED_ALL));
        assert!(S3EventType::ObjectCreatedCompleteMultipartUpload.matches_pattern(OBJECT_CREATED_ALL));
        assert!(!S3EventType::ObjectRemoved.matches_pattern(OBJECT_CREATED_ALL));
        assert!(!S3EventType::ObjectRemovedDelete.matches_pattern(OBJECT_CREATED_ALL));

        assert!(S3EventType::ObjectCreatedPut.matches_pattern("s3:ObjectCreated:Put"));
        assert!(!S3EventType::ObjectCreatedPost.matches_pattern("s3:ObjectCreated:Put"));
        assert!(S3EventType::ObjectCreated.matches_pattern("s3:ObjectCreated:Put"));
        assert!(S3EventType::ObjectCreated.matches_pattern("s3:ObjectCreated"));
        assert!(!S3EventType::ObjectCreated.matches_pattern("*"));
    }

    #[test]
    fn test_record_name() {
        assert_eq!(S3EventType::ObjectCreatedPut.record_name(), "ObjectCreated:Put");
        assert_eq!(S3EventType::ObjectRemoved.record_name(), "ObjectRemoved");
    }

    #[test]
    fn test_target_matches_event_type_and_key() {
        let config = CloudFunctionConfiguration::new("logs", "arn:aws:lambda:us-west-2:1:function:f")
            .with_event(OBJECT_CREATED_ALL)
            .with_filter(S3KeyFilter::prefix("AWSLogs/").with_suffix(".log"));
        let compiled = config.compile().unwrap();

        let cases = [
            (event(S3EventType::ObjectCreated, "AWSLogs/a.log"), true),
            (event(S3EventType::ObjectCreatedPut, "AWSLogs/a.log"), true),
            (event(S3EventType::ObjectRemoved, "AWSLogs/a.log"), false),
            (event(S3EventType::ObjectCreated, "other/a.log"), false),
            (event(S3EventType::ObjectCreated, "AWSLogs/a.txt"), false),
        ];

        for (event, expected) in cases {
            assert_eq!(config.matches(&event).unwrap(), expected, "{:?}", event);
            assert_eq!(compiled.matches(&event), expected, "{:?}", event);
        }
    }

    #[test]
    fn test_matching_targets_keeps_order() {
        let config = NotificationConfiguration::new()
            .add_cloud_function(
                CloudFunctionConfiguration::new("created", "fn-a").with_event(OBJECT_CREATED_ALL),
            )
            .add_cloud_function(
                CloudFunctionConfiguration::new("removed", "fn-b").with_event(OBJECT_REMOVED_ALL),
            )
            .add_cloud_function(
                CloudFunctionConfiguration::new("both", "fn-c")
                    .with_event(OBJECT_REMOVED_ALL)
                    .with_event(OBJECT_CREATED_ALL),
            );

        let ids: Vec<&str> = config
            .matching_targets(&event(S3EventType::ObjectCreatedPut, "k"))
            .unwrap()
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["created", "both"]);
        assert_eq!(config.compile().unwrap().len(), 3);
    }
}
