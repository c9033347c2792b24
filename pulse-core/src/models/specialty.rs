use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A medical domain with its own knowledge base and specialist agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Specialty {
    Cardiology,
    Neurology,
    Dermatology,
}

impl Specialty {
    /// Priority order; earlier entries win routing ties.
    pub const ALL: [Specialty; 3] = [
        Specialty::Cardiology,
        Specialty::Neurology,
        Specialty::Dermatology,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Specialty::Cardiology => "cardiology",
            Specialty::Neurology => "neurology",
            Specialty::Dermatology => "dermatology",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Specialty::Cardiology => "Cardiology",
            Specialty::Neurology => "Neurology",
            Specialty::Dermatology => "Dermatology",
        }
    }
}

impl fmt::Display for Specialty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown specialty: {0}")]
pub struct UnknownSpecialty(pub String);

impl FromStr for Specialty {
    type Err = UnknownSpecialty;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cardiology" => Ok(Specialty::Cardiology),
            "neurology" => Ok(Specialty::Neurology),
            "dermatology" => Ok(Specialty::Dermatology),
            other => Err(UnknownSpecialty(other.to_string())),
        }
    }
}

/// Which fact table a knowledge base holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeDomain {
    Triage,
    Cardiology,
    Neurology,
    Dermatology,
}

impl KnowledgeDomain {
    pub fn specialty(&self) -> Option<Specialty> {
        match self {
            KnowledgeDomain::Triage => None,
            KnowledgeDomain::Cardiology => Some(Specialty::Cardiology),
            KnowledgeDomain::Neurology => Some(Specialty::Neurology),
            KnowledgeDomain::Dermatology => Some(Specialty::Dermatology),
        }
    }
}

impl From<Specialty> for KnowledgeDomain {
    fn from(specialty: Specialty) -> Self {
        match specialty {
            Specialty::Cardiology => KnowledgeDomain::Cardiology,
            Specialty::Neurology => KnowledgeDomain::Neurology,
            Specialty::Dermatology => KnowledgeDomain::Dermatology,
        }
    }
}

impl fmt::Display for KnowledgeDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnowledgeDomain::Triage => f.write_str("triage"),
            KnowledgeDomain::Cardiology => f.write_str("cardiology"),
            KnowledgeDomain::Neurology => f.write_str("neurology"),
            KnowledgeDomain::Dermatology => f.write_str("dermatology"),
        }
    }
}

/// Coarse urgency bucket reported to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl UrgencyLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.90 {
            UrgencyLevel::Critical
        } else if score >= 0.75 {
            UrgencyLevel::High
        } else if score >= 0.50 {
            UrgencyLevel::Moderate
        } else {
            UrgencyLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Low => "low",
            UrgencyLevel::Moderate => "moderate",
            UrgencyLevel::High => "high",
            UrgencyLevel::Critical => "critical",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            UrgencyLevel::Low => "Low",
            UrgencyLevel::Moderate => "Moderate",
            UrgencyLevel::High => "High",
            UrgencyLevel::Critical => "Critical",
        }
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
