//! Rule trigger evaluation. Pure, no side effects.

use regex::RegexBuilder;
use tracing::debug;

use crate::config::DEFAULT_MIN_CONFIDENCE;
use crate::pipeline::anonymizer::sender_domain;
use crate::pipeline::types::{Classification, RawMessage};
use crate::rules::model::{Condition, ConditionField, ConditionOperator, Rule};

/// Upper bound on compiled user regex size.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Decides whether a rule fires for a classified message.
#[derive(Debug, Clone, Copy)]
pub struct RuleMatcher {
    min_confidence: f64,
}

impl Default for RuleMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CONFIDENCE)
    }
}

impl RuleMatcher {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    /// True only when the rule is active, its category (if any) matches,
    /// every condition holds and the confidence clears the gate.
    pub fn matches(&self, rule: &Rule, message: &RawMessage, classification: &Classification) -> bool {
        if !rule.active {
            return false;
        }
        if let Some(category) = rule.trigger.category
            && category != classification.category
        {
            return false;
        }
        if !rule
            .trigger
            .conditions
            .iter()
            .all(|c| condition_holds(c, message, classification))
        {
            return false;
        }
        classification.confidence >= self.min_confidence
    }
}

/// Evaluate one condition. A malformed regex never matches.
pub fn condition_holds(condition: &Condition, message: &RawMessage, classification: &Classification) -> bool {
    let actual = field_value(condition.field, message, classification);

    if condition.operator == ConditionOperator::Regex {
        return match RegexBuilder::new(&condition.value)
            .case_insensitive(!condition.case_sensitive)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
        {
            Ok(re) => re.is_match(&actual),
            Err(e) => {
                debug!(error = %e, "Condition regex does not compile, treating as non-match");
                false
            }
        };
    }

    let (actual, expected) = if condition.case_sensitive {
        (actual, condition.value.clone())
    } else {
        (actual.to_lowercase(), condition.value.to_lowercase())
    };

    match condition.operator {
        ConditionOperator::Contains => actual.contains(&expected),
        ConditionOperator::NotContains => !actual.contains(&expected),
        ConditionOperator::Equals => actual == expected,
        ConditionOperator::StartsWith => actual.starts_with(&expected),
        ConditionOperator::EndsWith => actual.ends_with(&expected),
        ConditionOperator::Regex => false,
    }
}

fn field_value(field: ConditionField, message: &RawMessage, classification: &Classification) -> String {
    match field {
        ConditionField::Sender => message.sender.clone(),
        ConditionField::Recipient => message.recipients.join(", "),
        ConditionField::Subject => message.subject.clone(),
        ConditionField::Body => message.body.clone(),
        ConditionField::Category => classification.category.as_str().to_string(),
        ConditionField::SenderDomain => sender_domain(&message.sender),
    }
}
