//! Neurology facts and vocabulary. Unmatched input defaults to migraine.

use super::{cluster, rec, risk, urgency, AgeRule, SpecialtyProfile, LIFE_THREATENING};
use crate::models::{Fact, Specialty, UrgencyLevel};
use crate::normalizer::{CompositeRule, DominantTag, TagTrigger, Vocabulary};

const STROKE: &str = "numbness+weakness+speech_difficulty";
const TIA: &str = "numbness_transient+weakness_transient";
const MENINGITIS: &str = "sudden_severe_headache+stiff_neck";
const SEIZURE: &str = "seizure+loss_of_consciousness";
const AURA: &str = "headache+vision_loss+aura";
const UNILATERAL: &str = "headache_unilateral+throbbing";
const TENSION: &str = "headache_tension+band_like";
const PARKINSON: &str = "tremor+rigidity+bradykinesia";
const NEUROPATHY: &str = "numbness+tingling+burning";
const VESTIBULAR: &str = "dizziness+vertigo+nausea";
const MS: &str = "vision_changes+weakness+numbness_episodic";

pub(super) static FACTS: &[Fact] = &[
    cluster(MENINGITIS, "meningitis", 0.85),
    cluster(AURA, "migraine_with_aura", 0.80),
    cluster(UNILATERAL, "migraine", 0.75),
    cluster(STROKE, "stroke", 0.90),
    cluster(SEIZURE, "epilepsy", 0.85),
    cluster(PARKINSON, "parkinsons_disease", 0.80),
    cluster(NEUROPATHY, "peripheral_neuropathy", 0.70),
    cluster(VESTIBULAR, "vestibular_disorder", 0.65),
    cluster(
        "weakness_progressive+muscle_wasting",
        "motor_neuron_disease",
        0.75,
    ),
    cluster("confusion+memory_loss", "dementia", 0.70),
    cluster(TENSION, "tension_headache", 0.65),
    cluster(TIA, "transient_ischemic_attack", 0.85),
    cluster(MS, "multiple_sclerosis", 0.75),
    risk("hypertension", "stroke", 0.18),
    risk("diabetes", "stroke", 0.15),
    risk("diabetes", "peripheral_neuropathy", 0.20),
    risk("age_over_60", "stroke", 0.15),
    risk("age_over_70", "dementia", 0.18),
    risk("smoking", "stroke", 0.12),
    risk("atrial_fibrillation", "stroke", 0.20),
    risk("family_history_epilepsy", "epilepsy", 0.10),
    risk("head_injury_history", "epilepsy", 0.15),
    urgency(STROKE, 0.98),
    urgency(SEIZURE, 0.95),
    urgency(MENINGITIS, 0.95),
    urgency(TIA, 0.90),
    urgency(AURA, 0.65),
    urgency(UNILATERAL, 0.55),
    urgency(TENSION, 0.35),
    urgency(NEUROPATHY, 0.45),
    urgency(VESTIBULAR, 0.50),
    rec("stroke", "Call 911 immediately - TIME IS BRAIN"),
    rec("stroke", "Brain CT/MRI immediately"),
    rec("stroke", "Neurologist consultation URGENT"),
    rec("stroke", "Do not eat or drink (possible treatment)"),
    rec("transient_ischemic_attack", "Emergency department evaluation within hours"),
    rec("transient_ischemic_attack", "Carotid ultrasound"),
    rec("transient_ischemic_attack", "Brain imaging (CT/MRI)"),
    rec("transient_ischemic_attack", "Antiplatelet therapy likely needed"),
    rec("meningitis", "Call 911 immediately"),
    rec("meningitis", "Lumbar puncture to confirm"),
    rec("meningitis", "Immediate antibiotic therapy"),
    rec("epilepsy", "Neurologist referral"),
    rec("epilepsy", "EEG (electroencephalogram)"),
    rec("epilepsy", "Brain MRI"),
    rec("epilepsy", "Avoid seizure triggers"),
    rec("migraine", "Neurologist consultation"),
    rec("migraine", "Headache diary"),
    rec("migraine", "Identify and avoid triggers"),
    rec("migraine", "Consider preventive medication"),
    rec("migraine_with_aura", "Urgent neurologist consultation"),
    rec("migraine_with_aura", "Brain imaging to rule out stroke"),
    rec("peripheral_neuropathy", "Neurologist evaluation"),
    rec("peripheral_neuropathy", "Nerve conduction studies"),
    rec("peripheral_neuropathy", "Blood tests for diabetes, vitamin B12"),
    rec("multiple_sclerosis", "Neurologist specializing in MS"),
    rec("multiple_sclerosis", "Brain and spinal MRI"),
    rec("multiple_sclerosis", "Lumbar puncture for oligoclonal bands"),
    rec("parkinsons_disease", "Movement disorder specialist"),
    rec("parkinsons_disease", "DaTscan imaging"),
    rec("tension_headache", "Over-the-counter pain relief"),
    rec("tension_headache", "Stress management techniques"),
    rec("tension_headache", "Physical therapy for neck tension"),
];

pub(super) static AGE_RULES: &[AgeRule] = &[
    AgeRule::AtLeast(70, "age_over_70"),
    AgeRule::AtLeast(60, "age_over_60"),
];

pub(super) static PROFILE: SpecialtyProfile = SpecialtyProfile {
    specialty: Specialty::Neurology,
    default_condition: "migraine",
    default_urgency: 0.65,
    default_recommendations: &[
        "Seek neurologist consultation",
        "Monitor symptoms closely",
        "Document symptom patterns and triggers",
    ],
    generic_risk_target: None,
    risk_levels: &[
        (0.90, UrgencyLevel::Critical),
        (0.75, UrgencyLevel::High),
        (0.50, UrgencyLevel::Moderate),
    ],
    condition_notes: &[
        ("stroke", LIFE_THREATENING),
        ("meningitis", LIFE_THREATENING),
        (
            "transient_ischemic_attack",
            "Emergency evaluation within hours is recommended to prevent a stroke.",
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

const fn rule(key: &'static str, requires: &'static [&'static [&'static str]]) -> CompositeRule {
    CompositeRule { key, requires }
}

const fn dominant(tag: &'static str, key: &'static str) -> DominantTag {
    DominantTag { tag, key }
}

pub(super) static VOCABULARY: Vocabulary = Vocabulary {
    tags: &[
        tag("numbness", &["numb", "tingling"]),
        tag("weakness", &["weak", "paralysis", "drooping"]),
        tag("speech", &["speech", "slurred", "talking", "confused"]),
        tag(
            "transient",
            &["transient", "temporary", "brief", "came and went"],
        ),
        tag("stiff_neck", &["stiff neck", "neck stiffness"]),
        tag("headache", &["headache", "head pain"]),
        tag("severe", &["severe"]),
        tag_words("seizure", &["seizure", "convulsion"], &["fit", "fits"]),
        tag("unconscious", &["unconscious", "passed out", "blackout"]),
        tag(
            "vision_aura",
            &[
                "vision",
                "visual",
                "aura",
                "lights",
                "blind spot",
                "zigzag",
                "flashing",
            ],
        ),
        tag(
            "unilateral",
            &["one side", "unilateral", "throbbing", "pulsating"],
        ),
        tag("tension", &["tension", "band", "tight", "pressure"]),
        tag("tremor", &["tremor", "shaking", "shake"]),
        tag("rigidity", &["rigid", "stiff", "slow movement"]),
        tag(
            "tingling_burning",
            &["tingling", "burning", "pins and needles"],
        ),
        tag("dizziness", &["dizz", "vertigo", "spinning"]),
        tag("nausea", &["nausea", "vomit", "sick"]),
        tag(
            "vision_changes",
            &["vision", "visual", "blurry", "double vision"],
        ),
        tag("episodic", &["comes and goes", "episodic", "relapsing"]),
    ],
    composites: &[
        rule(STROKE, &[&["numbness", "weakness"], &["speech"]]),
        rule(TIA, &[&["transient"], &["numbness", "weakness"]]),
        rule(MENINGITIS, &[&["stiff_neck"], &["headache", "severe"]]),
        rule(SEIZURE, &[&["seizure"], &["unconscious"]]),
        rule(AURA, &[&["headache"], &["vision_aura"]]),
        rule(UNILATERAL, &[&["headache"], &["unilateral"]]),
        rule(TENSION, &[&["headache"], &["tension"]]),
        rule(PARKINSON, &[&["tremor"], &["rigidity"]]),
        rule(NEUROPATHY, &[&["numbness"], &["tingling_burning"]]),
        rule(VESTIBULAR, &[&["dizziness"], &["nausea"]]),
        rule(
            MS,
            &[&["vision_changes"], &["weakness", "numbness"], &["episodic"]],
        ),
    ],
    dominant: &[
        dominant("headache", UNILATERAL),
        dominant("numbness", STROKE),
        dominant("weakness", STROKE),
        dominant("seizure", SEIZURE),
        dominant("dizziness", VESTIBULAR),
    ],
    modifiers: &[],
    generic_key: "generic_neurological_symptoms",
};
