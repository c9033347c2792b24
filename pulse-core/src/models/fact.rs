use serde::Serialize;
use std::fmt;

/// Relation a fact asserts between its subject and object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Predicate {
    /// Composite symptom key -> condition, weight is base confidence.
    SymptomCluster,
    /// Single-pattern symptom key -> condition, weight is base confidence.
    SymptomIndicates,
    /// Risk factor -> condition (or specialty-generic target), weight is the boost.
    RiskAmplifies,
    /// Symptom key -> urgency score.
    UrgencyLevel,
    /// Condition -> recommendation text, kept in declaration order.
    Recommendation,
    /// Triage tag -> specialty, weight is routing confidence.
    RouteWeight,
    /// Triage combination key -> specialty, weight is routing confidence.
    ComboWeight,
    /// Triage tag or combination -> urgency priority.
    UrgencyPriority,
    /// Age bucket -> additive urgency boost.
    AgeUrgencyBoost,
    /// Severity modifier -> additive urgency boost.
    SeverityModifier,
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Predicate::SymptomCluster => "symptom-cluster",
            Predicate::SymptomIndicates => "symptom-indicates",
            Predicate::RiskAmplifies => "risk-amplifies",
            Predicate::UrgencyLevel => "urgency-level",
            Predicate::Recommendation => "recommendation",
            Predicate::RouteWeight => "route-weight",
            Predicate::ComboWeight => "combo-weight",
            Predicate::UrgencyPriority => "urgency-priority",
            Predicate::AgeUrgencyBoost => "age-urgency-boost",
            Predicate::SeverityModifier => "severity-modifier",
        };
        f.write_str(name)
    }
}

/// An immutable `(predicate, subject, object, weight)` tuple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fact {
    pub predicate: Predicate,
    pub subject: &'static str,
    pub object: &'static str,
    pub weight: f64,
}

impl Fact {
    pub const fn new(
        predicate: Predicate,
        subject: &'static str,
        object: &'static str,
        weight: f64,
    ) -> Self {
        Self {
            predicate,
            subject,
            object,
            weight,
        }
    }
}
