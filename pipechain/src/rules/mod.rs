//! Inclusion rules for jobs and workflows.
//!
//! This module provides:
//! - The rule expression language (`$VAR == "x"`, `=~ /re/`, `&&`, `||`)
//! - Variable sets and `$VAR` expansion
//! - First-match rule evaluation and `only`/`except` ref filters

mod expression;
mod variables;

pub use expression::Expression;
pub use variables::Variables;

use crate::core::{PipelineSource, RefKind, When};
use crate::errors::ExpressionError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry of a `rules:` list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rule {
    /// Condition; an absent condition always matches.
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub if_clause: Option<String>,
    /// Overrides the job's `when`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<When>,
    /// Overrides the job's `allow_failure`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_failure: Option<bool>,
    /// Delay for `when: delayed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_in: Option<String>,
    /// Variables injected when the rule matches.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
}

impl Rule {
    /// Creates a rule with a condition.
    #[must_use]
    pub fn when_if(condition: impl Into<String>) -> Self {
        Self {
            if_clause: Some(condition.into()),
            ..Self::default()
        }
    }

    /// Sets the `when` override.
    #[must_use]
    pub fn with_when(mut self, when: When) -> Self {
        self.when = Some(when);
        self
    }

    /// Sets the `allow_failure` override.
    #[must_use]
    pub fn with_allow_failure(mut self, allow_failure: bool) -> Self {
        self.allow_failure = Some(allow_failure);
        self
    }

    fn matches(&self, variables: &Variables) -> Result<bool, ExpressionError> {
        match &self.if_clause {
            None => Ok(true),
            Some(condition) => Expression::parse(condition)?.evaluate(variables),
        }
    }
}

/// The result of evaluating a rules list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// A rule matched and did not say `never`.
    Included {
        /// `when` override from the matching rule.
        when: Option<When>,
        /// `allow_failure` override from the matching rule.
        allow_failure: Option<bool>,
        /// `start_in` from the matching rule.
        start_in: Option<String>,
        /// Variables from the matching rule.
        variables: BTreeMap<String, String>,
    },
    /// No rule matched, or the matching rule said `never`.
    Excluded,
}

impl RuleOutcome {
    /// Returns true if included.
    #[must_use]
    pub fn is_included(&self) -> bool {
        matches!(self, Self::Included { .. })
    }
}

/// Evaluates `rules` top to bottom; the first matching rule decides.
pub fn evaluate_rules(rules: &[Rule], variables: &Variables) -> Result<RuleOutcome, ExpressionError> {
    for rule in rules {
        if rule.matches(variables)? {
            if rule.when == Some(When::Never) {
                return Ok(RuleOutcome::Excluded);
            }
            return Ok(RuleOutcome::Included {
                when: rule.when,
                allow_failure: rule.allow_failure,
                start_in: rule.start_in.clone(),
                variables: rule.variables.clone(),
            });
        }
    }
    Ok(RuleOutcome::Excluded)
}

/// An `only:` / `except:` ref filter.
///
/// Entries are `branches`, `tags`, a pipeline source keyword (`pushes`,
/// `web`, `triggers`, `schedules`, `api`, `merge_requests`, `chat`,
/// `pipelines`), a `/regex/`, or a literal ref name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefFilter {
    /// The filter entries.
    pub refs: Vec<String>,
}

impl RefFilter {
    /// Creates a filter from entries.
    #[must_use]
    pub fn new<S: Into<String>>(refs: impl IntoIterator<Item = S>) -> Self {
        Self {
            refs: refs.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if any entry matches.
    pub fn matches(
        &self,
        ref_name: &str,
        kind: Option<RefKind>,
        source: PipelineSource,
    ) -> Result<bool, ExpressionError> {
        for entry in &self.refs {
            if entry_matches(entry, ref_name, kind, source)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn entry_matches(
    entry: &str,
    ref_name: &str,
    kind: Option<RefKind>,
    source: PipelineSource,
) -> Result<bool, ExpressionError> {
    let by_source = |expected: PipelineSource| Ok(source == expected);

    match entry {
        "branches" => Ok(kind == Some(RefKind::Branch)),
        "tags" => Ok(kind == Some(RefKind::Tag)),
        "pushes" => by_source(PipelineSource::Push),
        "web" => by_source(PipelineSource::Web),
        "triggers" => by_source(PipelineSource::Trigger),
        "schedules" => by_source(PipelineSource::Schedule),
        "api" => by_source(PipelineSource::Api),
        "merge_requests" => by_source(PipelineSource::MergeRequestEvent),
        "external_pull_requests" => by_source(PipelineSource::ExternalPullRequestEvent),
        "chat" => by_source(PipelineSource::Chat),
        "pipelines" => by_source(PipelineSource::Pipeline),
        pattern if pattern.len() > 1 && pattern.starts_with('/') && pattern.ends_with('/') => {
            let body = &pattern[1..pattern.len() - 1];
            let re = Regex::new(body).map_err(|e| ExpressionError::InvalidRegex {
                pattern: body.to_string(),
                detail: e.to_string(),
            })?;
            Ok(re.is_match(ref_name))
        }
        literal => Ok(literal == ref_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master_vars() -> Variables {
        [("CI_COMMIT_REF_NAME", "master")].into_iter().collect()
    }

    #[test]
    fn test_first_match_wins() {
        let rules = vec![
            Rule::when_if(r#"$CI_COMMIT_REF_NAME == "nonexistant-branch""#).with_when(When::Never),
            Rule::when_if("$CI_COMMIT_REF_NAME =~ /master/").with_when(When::Manual),
            Rule::default().with_when(When::Always),
        ];

        let outcome = evaluate_rules(&rules, &master_vars()).unwrap();
        assert_eq!(
            outcome,
            RuleOutcome::Included {
                when: Some(When::Manual),
                allow_failure: None,
                start_in: None,
                variables: BTreeMap::new(),
            }
        );
    }

    #[test]
    fn test_never_excludes() {
        let rules = vec![Rule::when_if("$CI_COMMIT_REF_NAME").with_when(When::Never)];
        assert_eq!(evaluate_rules(&rules, &master_vars()).unwrap(), RuleOutcome::Excluded);
    }

    #[test]
    fn test_no_match_excludes() {
        let rules = vec![Rule::when_if("$CI_COMMIT_TAG")];
        assert!(!evaluate_rules(&rules, &master_vars()).unwrap().is_included());
    }

    #[test]
    fn test_malformed_rule_is_an_error() {
        let rules = vec![Rule::when_if("$CI_COMMIT_REF_NAME ==")];
        assert!(evaluate_rules(&rules, &master_vars()).is_err());
    }

    #[test]
    fn test_rule_deserializes_if_keyword() {
        let rule: Rule = serde_json::from_str(r#"{"if": "$CI_COMMIT_TAG", "when": "manual"}"#).unwrap();
        assert_eq!(rule.if_clause.as_deref(), Some("$CI_COMMIT_TAG"));
        assert_eq!(rule.when, Some(When::Manual));
    }

    #[test]
    fn test_ref_filter() {
        let filter = RefFilter::new(["branches"]);
        assert!(filter.matches("master", Some(RefKind::Branch), PipelineSource::Push).unwrap());
        assert!(!filter.matches("v1.0", Some(RefKind::Tag), PipelineSource::Push).unwrap());

        let filter = RefFilter::new(["master", "/^feature-/"]);
        assert!(filter.matches("master", Some(RefKind::Branch), PipelineSource::Push).unwrap());
        assert!(filter.matches("feature-x", Some(RefKind::Branch), PipelineSource::Push).unwrap());
        assert!(!filter.matches("fix-x", Some(RefKind::Branch), PipelineSource::Push).unwrap());

        let filter = RefFilter::new(["schedules"]);
        assert!(filter.matches("master", Some(RefKind::Branch), PipelineSource::Schedule).unwrap());
        assert!(!filter.matches("master", Some(RefKind::Branch), PipelineSource::Web).unwrap());
    }

    #[test]
    fn test_ref_filter_invalid_regex() {
        let filter = RefFilter::new(["/[/"]);
        assert!(filter.matches("master", None, PipelineSource::Push).is_err());
    }
}
