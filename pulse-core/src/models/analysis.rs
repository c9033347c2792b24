use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::specialty::Specialty;

/// Why a reasoning step returned a default payload instead of a derived one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackReason {
    /// No fact matched the lookup key; the table default was used.
    LookupMiss { key: String },
    /// No routing fact matched any extracted tag.
    NoSpecialtyMatched,
    /// The evaluation itself failed and a fixed safe result was substituted.
    EngineError { message: String },
}

/// Outcome of a reasoning-layer query. Both variants carry a usable value,
/// so callers choose whether a fallback matters to them.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<T> {
    Matched(T),
    Fallback { value: T, reason: FallbackReason },
}

impl<T> Resolved<T> {
    pub fn fallback(value: T, reason: FallbackReason) -> Self {
        Resolved::Fallback { value, reason }
    }

    pub fn value(&self) -> &T {
        match self {
            Resolved::Matched(value) | Resolved::Fallback { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Resolved::Matched(value) | Resolved::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolved::Fallback { .. })
    }

    pub fn reason(&self) -> Option<&FallbackReason> {
        match self {
            Resolved::Matched(_) => None,
            Resolved::Fallback { reason, .. } => Some(reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
        match self {
            Resolved::Matched(value) => Resolved::Matched(f(value)),
            Resolved::Fallback { value, reason } => Resolved::Fallback {
                value: f(value),
                reason,
            },
        }
    }
}

/// Result of one specialist analysis. Built fresh per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub specialty: Specialty,
    pub symptom_key: String,
    pub condition: String,
    pub base_confidence: f64,
    pub risk_boost: f64,
    pub final_confidence: f64,
    pub urgency: f64,
    pub matched_rule_count: u32,
    pub risk_factors_found: Vec<String>,
    pub recommendations: Vec<String>,
}

impl AnalysisResult {
    /// Condition name with underscores replaced and each word capitalised.
    pub fn condition_title(&self) -> String {
        title_case(&self.condition)
    }

    /// Step-by-step account of how the confidence was reached.
    pub fn explain(&self) -> String {
        let mut lines = vec![
            format!("Symptom pattern: {}", self.symptom_key),
            format!(
                "Matched condition: {} (base confidence {:.2})",
                self.condition, self.base_confidence
            ),
        ];
        if self.risk_factors_found.is_empty() {
            lines.push("No amplifying risk factors".to_string());
        } else {
            lines.push(format!(
                "Risk factors {} add {:.2}",
                self.risk_factors_found.join(", "),
                self.risk_boost
            ));
        }
        lines.push(format!("Final confidence: {:.2}", self.final_confidence));
        lines.push(format!("Urgency score: {:.2}", self.urgency));
        lines.join("\n")
    }
}

/// Result of routing free text to a specialty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingResult {
    pub specialty: Specialty,
    pub confidence: f64,
    pub urgency: f64,
    pub matched_keywords: Vec<String>,
    pub combination: Option<String>,
    pub secondary_specialty: Option<Specialty>,
    pub per_specialty_scores: BTreeMap<Specialty, f64>,
    pub matched_rule_count: u32,
}

pub fn title_case(snake: &str) -> String {
    snake
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
