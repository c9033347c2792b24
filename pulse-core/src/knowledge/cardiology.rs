//! Cardiology facts: symptom clusters, urgency, risk factors and
//! recommendations for heart conditions.

use super::{cluster, indicates, rec, risk, urgency, AgeRule, SpecialtyProfile, LIFE_THREATENING};
use crate::models::{Fact, Specialty, UrgencyLevel};
use crate::normalizer::{CompositeRule, DominantTag, TagTrigger, Vocabulary};

const MI: &str = "chest_pain+radiating_pain+sweating";
const TEARING: &str = "chest_pain_sudden_tearing";
const CHEST_SOB: &str = "chest_pain+shortness_of_breath";

pub(super) static FACTS: &[Fact] = &[
    cluster(MI, "myocardial_infarction", 0.85),
    cluster("palpitations+irregular_heartbeat", "arrhythmia", 0.75),
    cluster("shortness_of_breath+swelling+fatigue", "heart_failure", 0.70),
    cluster("chest_pain_sharp+positional", "pericarditis", 0.65),
    cluster(CHEST_SOB, "angina", 0.68),
    cluster("chest_pain_not_relieved", "myocardial_infarction", 0.80),
    cluster(TEARING, "aortic_dissection", 0.90),
    indicates("chest_pain+exertional", "angina", 0.70),
    risk("hypertension", "cardiac", 0.15),
    risk("diabetes", "cardiac", 0.15),
    risk("age_over_60", "cardiac", 0.12),
    risk("smoking", "myocardial_infarction", 0.10),
    risk("high_cholesterol", "cardiac", 0.10),
    risk("family_history_cardiac", "cardiac", 0.08),
    urgency(MI, 0.95),
    urgency(TEARING, 0.98),
    urgency(CHEST_SOB, 0.85),
    urgency("palpitations+dizziness+syncope", 0.80),
    urgency("chest_pain+exertional", 0.60),
    urgency("palpitations", 0.40),
    rec("myocardial_infarction", "Call 911 immediately"),
    rec("myocardial_infarction", "EKG immediately"),
    rec("myocardial_infarction", "Troponin test"),
    rec("myocardial_infarction", "Aspirin if available"),
    rec("angina", "Urgent cardiology consultation within 24-48 hours"),
    rec("angina", "Stress test recommended"),
    rec("angina", "EKG recommended"),
    rec("angina", "Avoid strenuous activity until consultation"),
    rec("arrhythmia", "24-hour Holter monitor"),
    rec("arrhythmia", "Electrophysiology consultation"),
    rec("arrhythmia", "Avoid stimulants (caffeine, nicotine)"),
    rec("heart_failure", "Echocardiogram"),
    rec("heart_failure", "BNP blood test"),
    rec("heart_failure", "Heart failure specialist referral"),
    rec("aortic_dissection", "Call 911 - DO NOT DRIVE"),
    rec("aortic_dissection", "Emergency CT angiography"),
];

pub(super) static AGE_RULES: &[AgeRule] = &[
    AgeRule::AtLeast(60, "age_over_60"),
    AgeRule::AtLeast(40, "age_over_40"),
];

pub(super) static PROFILE: SpecialtyProfile = SpecialtyProfile {
    specialty: Specialty::Cardiology,
    default_condition: "angina",
    default_urgency: 0.70,
    default_recommendations: &[
        "Seek cardiology consultation",
        "Monitor symptoms closely",
        "Avoid strenuous activity until evaluated",
    ],
    generic_risk_target: Some("cardiac"),
    risk_levels: &[
        (0.90, UrgencyLevel::Critical),
        (0.75, UrgencyLevel::High),
        (0.50, UrgencyLevel::Moderate),
    ],
    condition_notes: &[
        ("myocardial_infarction", LIFE_THREATENING),
        ("aortic_dissection", LIFE_THREATENING),
        (
            "angina",
            "Urgent cardiology consultation is recommended within 24-48 hours.",
        ),
    ],
};

const fn tag(tag: &'static str, triggers: &'static [&'static str]) -> TagTrigger {
    TagTrigger {
        tag,
        triggers,
        words: &[],
    }
}

const fn rule(key: &'static str, requires: &'static [&'static [&'static str]]) -> CompositeRule {
    CompositeRule { key, requires }
}

pub(super) static VOCABULARY: Vocabulary = Vocabulary {
    tags: &[
        tag("chest_pain", &["chest", "pain"]),
        tag("tearing", &["tearing", "ripping"]),
        tag("radiating", &["radiating", "radiates", "arm", "jaw", "shoulder"]),
        tag("sweating", &["sweat", "nausea", "clammy"]),
        tag(
            "not_relieved",
            &[
                "not relieved",
                "won't go away",
                "doesn't go away",
                "does not go away",
                "persistent",
            ],
        ),
        tag("sharp", &["sharp", "stabbing"]),
        tag(
            "positional",
            &["lying down", "lie down", "leaning forward", "position"],
        ),
        tag("shortness_of_breath", &["short", "breath", "breathing"]),
        tag("exertional", &["exercise", "exertion", "activity", "walking"]),
        tag("palpitations", &["palpitation", "racing", "irregular"]),
        tag("irregular", &["irregular", "skip"]),
        tag("dizziness", &["dizz", "faint", "syncope"]),
        tag("swelling", &["swell", "edema"]),
        tag("fatigue", &["tired", "fatigue", "weak"]),
    ],
    composites: &[
        rule(TEARING, &[&["chest_pain"], &["tearing"]]),
        rule(MI, &[&["chest_pain"], &["radiating"], &["sweating"]]),
        rule("chest_pain_not_relieved", &[&["chest_pain"], &["not_relieved"]]),
        rule(
            "chest_pain_sharp+positional",
            &[&["chest_pain"], &["sharp"], &["positional"]],
        ),
        rule(CHEST_SOB, &[&["chest_pain"], &["shortness_of_breath"]]),
        rule("chest_pain+exertional", &[&["chest_pain"], &["exertional"]]),
        rule(
            "palpitations+dizziness+syncope",
            &[&["palpitations"], &["dizziness"]],
        ),
        rule(
            "palpitations+irregular_heartbeat",
            &[&["palpitations"], &["irregular"]],
        ),
        rule(
            "shortness_of_breath+swelling+fatigue",
            &[&["shortness_of_breath"], &["swelling"], &["fatigue"]],
        ),
    ],
    dominant: &[
        DominantTag {
            tag: "palpitations",
            key: "palpitations",
        },
        DominantTag {
            tag: "chest_pain",
            key: CHEST_SOB,
        },
    ],
    modifiers: &[],
    generic_key: "generic_cardiac_symptoms",
};

#[cfg(test)]
mod tests {
    use crate::knowledge::KnowledgeBase;
    use crate::models::KnowledgeDomain;
    use crate::normalizer::KeySource;

    fn key(text: &str) -> &'static str {
        KnowledgeBase::load(KnowledgeDomain::Cardiology)
            .normalizer()
            .normalize(text)
            .key
    }

    #[test]
    fn test_exertional_chest_pain_with_breathlessness() {
        assert_eq!(
            key("I have severe chest pain when I exercise and shortness of breath"),
            "chest_pain+shortness_of_breath"
        );
    }

    #[test]
    fn test_tearing_requires_tearing_words() {
        assert_eq!(
            key("sudden tearing chest pain going to my back"),
            "chest_pain_sudden_tearing"
        );
        assert_ne!(key("severe chest pain"), "chest_pain_sudden_tearing");
    }

    #[test]
    fn test_heart_attack_pattern() {
        assert_eq!(
            key("crushing chest pain spreading to my left arm, I'm sweating"),
            "chest_pain+radiating_pain+sweating"
        );
    }

    #[test]
    fn test_palpitation_patterns() {
        assert_eq!(
            key("my heart keeps racing and I feel dizzy"),
            "palpitations+dizziness+syncope"
        );
        assert_eq!(
            key("irregular heartbeat that seems to skip"),
            "palpitations+irregular_heartbeat"
        );
    }

    #[test]
    fn test_pericarditis_pattern() {
        assert_eq!(
            key("sharp chest pain that gets worse lying down"),
            "chest_pain_sharp+positional"
        );
    }

    #[test]
    fn test_generic_key() {
        let n = KnowledgeBase::load(KnowledgeDomain::Cardiology)
            .normalizer()
            .normalize("I feel a bit off");
        assert_eq!(n.key, "generic_cardiac_symptoms");
        assert_eq!(n.source, KeySource::Generic);
    }
}
