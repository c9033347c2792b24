//! Immutable fact tables, one per knowledge domain.
//!
//! A [`KnowledgeBase`] is built once from its static table and shared behind
//! an `Arc`. Queries are pure lookups in a `(predicate, subject)` index and
//! report misses as [`Resolved::Fallback`] carrying the domain default.

mod cardiology;
mod dermatology;
mod neurology;
mod triage;

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{
    FallbackReason, Fact, KnowledgeDomain, Predicate, Resolved, Specialty, UrgencyLevel,
};
use crate::normalizer::{SymptomNormalizer, Vocabulary};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KnowledgeError {
    #[error("{domain} knowledge base has no specialist profile")]
    NoProfile { domain: KnowledgeDomain },

    #[error("invalid weight {weight} on ({predicate} {subject} {object})")]
    InvalidWeight {
        predicate: Predicate,
        subject: String,
        object: String,
        weight: f64,
    },
}

/// Maps a patient age onto a bucketed risk factor name.
#[derive(Debug, Clone, Copy)]
pub enum AgeRule {
    AtLeast(u32, &'static str),
    Below(u32, &'static str),
}

impl AgeRule {
    fn bucket(&self, age: u32) -> Option<&'static str> {
        match *self {
            AgeRule::AtLeast(min, name) if age >= min => Some(name),
            AgeRule::Below(max, name) if age < max => Some(name),
            _ => None,
        }
    }
}

/// Specialty-specific defaults and presentation rules.
#[derive(Debug)]
pub struct SpecialtyProfile {
    pub specialty: Specialty,
    pub default_condition: &'static str,
    pub default_urgency: f64,
    pub default_recommendations: &'static [&'static str],
    /// Target that counts for every condition in this specialty (e.g. "cardiac").
    pub generic_risk_target: Option<&'static str>,
    /// Descending `(threshold, level)` pairs; below the last threshold is `Low`.
    pub risk_levels: &'static [(f64, UrgencyLevel)],
    /// Extra sentence appended to the diagnosis for these conditions.
    pub condition_notes: &'static [(&'static str, &'static str)],
}

impl SpecialtyProfile {
    pub fn risk_level(&self, urgency: f64) -> UrgencyLevel {
        self.risk_levels
            .iter()
            .find(|(threshold, _)| urgency >= *threshold)
            .map(|(_, level)| *level)
            .unwrap_or(UrgencyLevel::Low)
    }

    pub fn condition_note(&self, condition: &str) -> Option<&'static str> {
        self.condition_notes
            .iter()
            .find(|(name, _)| condition.contains(name))
            .map(|(_, note)| *note)
    }
}

pub(crate) const LIFE_THREATENING: &str =
    "This is a potentially life-threatening condition requiring immediate medical attention.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionMatch {
    pub condition: &'static str,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RiskAssessment {
    pub boost: f64,
    pub matched_factors: Vec<String>,
}

struct DomainTables {
    facts: &'static [Fact],
    vocabulary: &'static Vocabulary,
    age_rules: &'static [AgeRule],
    profile: Option<&'static SpecialtyProfile>,
}

fn tables(domain: KnowledgeDomain) -> DomainTables {
    match domain {
        KnowledgeDomain::Triage => DomainTables {
            facts: triage::FACTS,
            vocabulary: &triage::VOCABULARY,
            age_rules: triage::AGE_RULES,
            profile: None,
        },
        KnowledgeDomain::Cardiology => DomainTables {
            facts: cardiology::FACTS,
            vocabulary: &cardiology::VOCABULARY,
            age_rules: cardiology::AGE_RULES,
            profile: Some(&cardiology::PROFILE),
        },
        KnowledgeDomain::Neurology => DomainTables {
            facts: neurology::FACTS,
            vocabulary: &neurology::VOCABULARY,
            age_rules: neurology::AGE_RULES,
            profile: Some(&neurology::PROFILE),
        },
        KnowledgeDomain::Dermatology => DomainTables {
            facts: dermatology::FACTS,
            vocabulary: &dermatology::VOCABULARY,
            age_rules: dermatology::AGE_RULES,
            profile: Some(&dermatology::PROFILE),
        },
    }
}

/// Static profile of a specialty, independent of any loaded table.
pub fn profile_for(specialty: Specialty) -> &'static SpecialtyProfile {
    match specialty {
        Specialty::Cardiology => &cardiology::PROFILE,
        Specialty::Neurology => &neurology::PROFILE,
        Specialty::Dermatology => &dermatology::PROFILE,
    }
}

pub fn normalize_factor(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

fn checked(fact: &Fact) -> Result<f64, KnowledgeError> {
    if fact.weight.is_finite() && (0.0..=1.0).contains(&fact.weight) {
        Ok(fact.weight)
    } else {
        Err(KnowledgeError::InvalidWeight {
            predicate: fact.predicate,
            subject: fact.subject.to_string(),
            object: fact.object.to_string(),
            weight: fact.weight,
        })
    }
}

pub struct KnowledgeBase {
    domain: KnowledgeDomain,
    index: HashMap<Predicate, HashMap<&'static str, Vec<Fact>>>,
    fact_count: usize,
    normalizer: SymptomNormalizer,
    age_rules: &'static [AgeRule],
    profile: Option<&'static SpecialtyProfile>,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("domain", &self.domain)
            .field("fact_count", &self.fact_count)
            .finish()
    }
}

impl KnowledgeBase {
    /// Build the knowledge base for `domain` from its built-in table.
    pub fn load(domain: KnowledgeDomain) -> Self {
        let kb = Self::from_facts(domain, tables(domain).facts.iter().copied());
        tracing::info!(domain = %domain, facts = kb.fact_count, "Loaded knowledge base");
        kb
    }

    /// Build a knowledge base for `domain` from an explicit fact list. The
    /// domain's vocabulary, age rules and profile still apply.
    pub fn from_facts(domain: KnowledgeDomain, facts: impl IntoIterator<Item = Fact>) -> Self {
        let t = tables(domain);
        let mut index: HashMap<Predicate, HashMap<&'static str, Vec<Fact>>> = HashMap::new();
        let mut fact_count = 0;
        for fact in facts {
            index
                .entry(fact.predicate)
                .or_default()
                .entry(fact.subject)
                .or_default()
                .push(fact);
            fact_count += 1;
        }
        Self {
            domain,
            index,
            fact_count,
            normalizer: SymptomNormalizer::new(t.vocabulary),
            age_rules: t.age_rules,
            profile: t.profile,
        }
    }

    pub fn domain(&self) -> KnowledgeDomain {
        self.domain
    }

    pub fn fact_count(&self) -> usize {
        self.fact_count
    }

    pub fn normalizer(&self) -> &SymptomNormalizer {
        &self.normalizer
    }

    pub fn profile(&self) -> Result<&'static SpecialtyProfile, KnowledgeError> {
        self.profile.ok_or(KnowledgeError::NoProfile {
            domain: self.domain,
        })
    }

    /// Facts for `(predicate, subject)` in declaration order.
    pub fn facts(&self, predicate: Predicate, subject: &str) -> &[Fact] {
        self.index
            .get(&predicate)
            .and_then(|by_subject| by_subject.get(subject))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn age_bucket(&self, age: Option<u32>) -> Option<&'static str> {
        let age = age?;
        self.age_rules.iter().find_map(|rule| rule.bucket(age))
    }

    pub fn condition_for(&self, key: &str) -> Result<Resolved<ConditionMatch>, KnowledgeError> {
        let profile = self.profile()?;
        let fact = self
            .facts(Predicate::SymptomCluster, key)
            .first()
            .or_else(|| self.facts(Predicate::SymptomIndicates, key).first());

        match fact {
            Some(fact) => Ok(Resolved::Matched(ConditionMatch {
                condition: fact.object,
                confidence: checked(fact)?,
            })),
            None => Ok(Resolved::fallback(
                ConditionMatch {
                    condition: profile.default_condition,
                    confidence: 0.50,
                },
                FallbackReason::LookupMiss {
                    key: key.to_string(),
                },
            )),
        }
    }

    pub fn urgency_for(&self, key: &str) -> Result<Resolved<f64>, KnowledgeError> {
        let profile = self.profile()?;
        match self.facts(Predicate::UrgencyLevel, key).first() {
            Some(fact) => Ok(Resolved::Matched(checked(fact)?)),
            None => Ok(Resolved::fallback(
                profile.default_urgency,
                FallbackReason::LookupMiss {
                    key: key.to_string(),
                },
            )),
        }
    }

    /// Sum the `risk-amplifies` boosts for `condition`. Each factor is
    /// reported once, in input order, however many facts it matched.
    pub fn risk_boost(
        &self,
        condition: &str,
        risk_factors: &[String],
        age: Option<u32>,
    ) -> Result<RiskAssessment, KnowledgeError> {
        let generic = self.profile.and_then(|p| p.generic_risk_target);

        let mut candidates: Vec<(String, String)> = Vec::new();
        let age_factor = self.age_bucket(age).map(str::to_string);
        for raw in risk_factors.iter().chain(age_factor.iter()) {
            let normalized = normalize_factor(raw);
            if normalized.is_empty() || candidates.iter().any(|(_, n)| *n == normalized) {
                continue;
            }
            candidates.push((raw.trim().to_string(), normalized));
        }

        let mut assessment = RiskAssessment::default();
        for (raw, normalized) in candidates {
            let mut matched = false;
            for fact in self.facts(Predicate::RiskAmplifies, &normalized) {
                if fact.object == condition || Some(fact.object) == generic {
                    assessment.boost += checked(fact)?;
                    matched = true;
                }
            }
            if matched {
                assessment.matched_factors.push(raw);
            }
        }
        Ok(assessment)
    }

    pub fn recommendations_for(
        &self,
        condition: &str,
    ) -> Result<Resolved<Vec<String>>, KnowledgeError> {
        let profile = self.profile()?;
        let recs: Vec<String> = self
            .facts(Predicate::Recommendation, condition)
            .iter()
            .map(|f| f.object.to_string())
            .collect();
        if recs.is_empty() {
            Ok(Resolved::fallback(
                profile
                    .default_recommendations
                    .iter()
                    .map(|r| r.to_string())
                    .collect(),
                FallbackReason::LookupMiss {
                    key: condition.to_string(),
                },
            ))
        } else {
            Ok(Resolved::Matched(recs))
        }
    }

    /// Weighted facts of `predicate` for `subject`, validated.
    pub fn weighted(
        &self,
        predicate: Predicate,
        subject: &str,
    ) -> Result<Vec<(&'static str, f64)>, KnowledgeError> {
        self.facts(predicate, subject)
            .iter()
            .map(|f| checked(f).map(|w| (f.object, w)))
            .collect()
    }
}

/// Every domain's knowledge base, loaded once at start-up.
#[derive(Debug, Clone)]
pub struct KnowledgeRegistry {
    triage: Arc<KnowledgeBase>,
    cardiology: Arc<KnowledgeBase>,
    neurology: Arc<KnowledgeBase>,
    dermatology: Arc<KnowledgeBase>,
}

impl KnowledgeRegistry {
    pub fn load() -> Self {
        Self {
            triage: Arc::new(KnowledgeBase::load(KnowledgeDomain::Triage)),
            cardiology: Arc::new(KnowledgeBase::load(KnowledgeDomain::Cardiology)),
            neurology: Arc::new(KnowledgeBase::load(KnowledgeDomain::Neurology)),
            dermatology: Arc::new(KnowledgeBase::load(KnowledgeDomain::Dermatology)),
        }
    }

    pub fn triage(&self) -> Arc<KnowledgeBase> {
        Arc::clone(&self.triage)
    }

    pub fn specialty(&self, specialty: Specialty) -> Arc<KnowledgeBase> {
        match specialty {
            Specialty::Cardiology => Arc::clone(&self.cardiology),
            Specialty::Neurology => Arc::clone(&self.neurology),
            Specialty::Dermatology => Arc::clone(&self.dermatology),
        }
    }
}

// Table-building shorthands.

pub(crate) const fn cluster(key: &'static str, condition: &'static str, w: f64) -> Fact {
    Fact::new(Predicate::SymptomCluster, key, condition, w)
}

pub(crate) const fn indicates(key: &'static str, condition: &'static str, w: f64) -> Fact {
    Fact::new(Predicate::SymptomIndicates, key, condition, w)
}

pub(crate) const fn risk(factor: &'static str, target: &'static str, w: f64) -> Fact {
    Fact::new(Predicate::RiskAmplifies, factor, target, w)
}

pub(crate) const fn urgency(key: &'static str, w: f64) -> Fact {
    Fact::new(Predicate::UrgencyLevel, key, "", w)
}

pub(crate) const fn rec(condition: &'static str, text: &'static str) -> Fact {
    Fact::new(Predicate::Recommendation, condition, text, 1.0)
}
