//! Triage routing table: per-tag specialty weights, combination overrides,
//! urgency priorities and the routing vocabulary.

use super::AgeRule;
use crate::models::{Fact, Predicate};
use crate::normalizer::{CompositeRule, TagTrigger, Vocabulary};

const fn route(tag: &'static str, specialty: &'static str, w: f64) -> Fact {
    Fact::new(Predicate::RouteWeight, tag, specialty, w)
}

const fn combo(key: &'static str, specialty: &'static str, w: f64) -> Fact {
    Fact::new(Predicate::ComboWeight, key, specialty, w)
}

const fn priority(key: &'static str, w: f64) -> Fact {
    Fact::new(Predicate::UrgencyPriority, key, "", w)
}

const fn age_boost(bucket: &'static str, w: f64) -> Fact {
    Fact::new(Predicate::AgeUrgencyBoost, bucket, "", w)
}

const fn severity(modifier: &'static str, w: f64) -> Fact {
    Fact::new(Predicate::SeverityModifier, modifier, "", w)
}

pub(super) static FACTS: &[Fact] = &[
    route("chest_pain", "cardiology", 0.90),
    route("palpitations", "cardiology", 0.85),
    route("shortness_of_breath", "cardiology", 0.70),
    route("heart", "cardiology", 0.95),
    route("exertional", "cardiology", 0.88),
    route("headache", "neurology", 0.75),
    route("dizziness", "neurology", 0.70),
    route("seizure", "neurology", 0.95),
    route("numbness", "neurology", 0.80),
    route("weakness", "neurology", 0.75),
    route("vision_changes", "neurology", 0.65),
    route("rash", "dermatology", 0.90),
    route("skin_lesion", "dermatology", 0.92),
    route("itching", "dermatology", 0.75),
    combo("chest_pain+exertional", "cardiology", 0.92),
    combo("chest_pain+shortness_of_breath", "cardiology", 0.94),
    combo("dizziness+palpitations", "cardiology", 0.85),
    combo("headache+vision_changes", "neurology", 0.88),
    combo("numbness+weakness", "neurology", 0.92),
    combo("rash+itching", "dermatology", 0.93),
    priority("chest_pain", 0.90),
    priority("seizure", 0.98),
    priority("numbness+weakness", 0.95),
    priority("headache", 0.55),
    priority("rash", 0.30),
    age_boost("age_over_70", 0.15),
    age_boost("age_over_60", 0.10),
    age_boost("age_over_50", 0.05),
    age_boost("pediatric", 0.08),
    severity("sudden_onset", 0.15),
    severity("severe_pain", 0.12),
    severity("radiating_pain", 0.10),
];

pub(super) static AGE_RULES: &[AgeRule] = &[
    AgeRule::AtLeast(70, "age_over_70"),
    AgeRule::AtLeast(60, "age_over_60"),
    AgeRule::AtLeast(50, "age_over_50"),
    AgeRule::Below(18, "pediatric"),
];

const fn tag(tag: &'static str, triggers: &'static [&'static str]) -> TagTrigger {
    TagTrigger {
        tag,
        triggers,
        words: &[],
    }
}

const fn tag_words(
    tag: &'static str,
    triggers: &'static [&'static str],
    words: &'static [&'static str],
) -> TagTrigger {
    TagTrigger {
        tag,
        triggers,
        words,
    }
}

const fn pair(key: &'static str, requires: &'static [&'static [&'static str]]) -> CompositeRule {
    CompositeRule { key, requires }
}

pub(super) static VOCABULARY: Vocabulary = Vocabulary {
    tags: &[
        tag("chest_pain", &["chest", "pain", "hurt", "pressure", "tight"]),
        tag(
            "palpitations",
            &["palpitation", "racing", "flutter", "irregular", "skip"],
        ),
        tag(
            "shortness_of_breath",
            &["breath", "breathing", "short", "dyspnea"],
        ),
        tag("heart", &["heart", "cardiac"]),
        tag(
            "exertional",
            &["exercise", "exertion", "activity", "walking", "stairs", "exertional"],
        ),
        tag("headache", &["headache", "head", "migraine", "cephalalgia"]),
        tag(
            "dizziness",
            &["dizzy", "dizziness", "vertigo", "spinning", "lightheaded"],
        ),
        tag_words("seizure", &["seizure", "convulsion", "epilep"], &["fit", "fits"]),
        tag(
            "numbness",
            &["numb", "numbness", "tingling", "pins", "needles"],
        ),
        tag("weakness", &["weak", "weakness", "paralysis", "cant move"]),
        tag(
            "vision_changes",
            &["vision", "seeing", "sight", "blurry", "double"],
        ),
        tag("rash", &["rash", "spots", "hives", "eruption"]),
        tag("skin_lesion", &["skin", "lesion", "mole", "growth", "bump"]),
        tag("itching", &["itch", "itching", "itchy", "scratch"]),
    ],
    composites: &[
        pair("chest_pain+exertional", &[&["chest_pain"], &["exertional"]]),
        pair(
            "chest_pain+shortness_of_breath",
            &[&["chest_pain"], &["shortness_of_breath"]],
        ),
        pair("dizziness+palpitations", &[&["dizziness"], &["palpitations"]]),
        pair(
            "headache+vision_changes",
            &[&["headache"], &["vision_changes"]],
        ),
        pair("numbness+weakness", &[&["numbness"], &["weakness"]]),
        pair("rash+itching", &[&["rash"], &["itching"]]),
    ],
    dominant: &[],
    modifiers: &[
        tag(
            "sudden_onset",
            &["sudden", "suddenly", "acute", "came on"],
        ),
        tag(
            "severe_pain",
            &["severe", "terrible", "worst", "unbearable", "excruciating"],
        ),
        tag(
            "radiating_pain",
            &["radiating", "spreading", "shoots", "travels"],
        ),
    ],
    generic_key: "general",
};
