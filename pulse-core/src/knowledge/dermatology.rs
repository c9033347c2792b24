//! Dermatology table.

use super::{cluster, rec, risk, urgency, AgeRule, SpecialtyProfile};
use crate::models::{Fact, Specialty, UrgencyLevel};
use crate::normalizer::{CompositeRule, DominantTag, TagTrigger, Vocabulary};

const URGENT_REVIEW: &str = "URGENT DERMATOLOGY EVALUATION RECOMMENDED.";

const MELANOMA: &str = "mole_changes+irregular_border+color_variation";
const PSORIASIS: &str = "red_scaly_patches+silvery_scales";
const ECZEMA: &str = "itchy_rash+dry_skin+red_patches";
const CELLULITIS: &str = "spreading_redness+warmth+pain+fever";
const ZOSTER: &str = "blisters+painful+clustered";
const ACNE: &str = "acne+cysts+scarring";
const URTICARIA: &str = "hives+swelling+itching";
const RINGWORM: &str = "circular_rash+red_border+central_clearing";
const BCC: &str = "raised_growth+pearly+bleeding_easily";
const ACTINIC: &str = "scaly_patch+rough_texture+sun_exposed";
const ROSACEA: &str = "facial_redness+visible_blood_vessels+pustules";
const VITILIGO: &str = "white_patches+loss_of_pigmentation";
const FUNGAL_NAIL: &str = "thick_yellow_nails+crumbling";

pub(super) static FACTS: &[Fact] = &[
    cluster(MELANOMA, "melanoma", 0.85),
    cluster(PSORIASIS, "psoriasis", 0.80),
    cluster(ECZEMA, "eczema", 0.75),
    cluster(CELLULITIS, "cellulitis", 0.85),
    cluster(ZOSTER, "herpes_zoster", 0.80),
    cluster(ACNE, "severe_acne", 0.75),
    cluster(URTICARIA, "urticaria", 0.70),
    cluster(RINGWORM, "ringworm", 0.80),
    cluster(BCC, "basal_cell_carcinoma", 0.75),
    cluster(ACTINIC, "actinic_keratosis", 0.70),
    cluster(ROSACEA, "rosacea", 0.75),
    cluster(VITILIGO, "vitiligo", 0.80),
    cluster(FUNGAL_NAIL, "fungal_nail_infection", 0.75),
    risk("sun_exposure_excessive", "melanoma", 0.20),
    risk("sun_exposure_excessive", "basal_cell_carcinoma", 0.18),
    risk("sun_exposure_excessive", "actinic_keratosis", 0.15),
    risk("fair_skin", "melanoma", 0.15),
    risk("family_history_skin_cancer", "melanoma", 0.18),
    risk("family_history_psoriasis", "psoriasis", 0.12),
    risk("family_history_eczema", "eczema", 0.10),
    risk("diabetes", "cellulitis", 0.15),
    risk("immunocompromised", "cellulitis", 0.20),
    risk("immunocompromised", "herpes_zoster", 0.15),
    risk("age_over_60", "herpes_zoster", 0.12),
    urgency(MELANOMA, 0.90),
    urgency(CELLULITIS, 0.88),
    urgency(BCC, 0.75),
    urgency(ZOSTER, 0.70),
    urgency(ACTINIC, 0.65),
    urgency(PSORIASIS, 0.50),
    urgency(ECZEMA, 0.35),
    urgency(ACNE, 0.40),
    urgency(URTICARIA, 0.45),
    rec("melanoma", "URGENT dermatologist consultation within days"),
    rec("melanoma", "Skin biopsy required"),
    rec("melanoma", "Full body skin examination"),
    rec("melanoma", "Avoid sun exposure"),
    rec("cellulitis", "Urgent medical evaluation - possible IV antibiotics"),
    rec("cellulitis", "Blood cultures may be needed"),
    rec("cellulitis", "Elevate affected area"),
    rec("cellulitis", "Monitor for spreading or systemic symptoms"),
    rec("basal_cell_carcinoma", "Dermatologist evaluation within weeks"),
    rec("basal_cell_carcinoma", "Biopsy for confirmation"),
    rec("basal_cell_carcinoma", "Surgical excision likely needed"),
    rec("actinic_keratosis", "Dermatologist evaluation"),
    rec("actinic_keratosis", "Cryotherapy or topical treatment"),
    rec("actinic_keratosis", "Sun protection essential"),
    rec("psoriasis", "Dermatologist consultation"),
    rec("psoriasis", "Topical corticosteroids"),
    rec("psoriasis", "Vitamin D analogs"),
    rec("psoriasis", "Consider phototherapy for extensive disease"),
    rec("eczema", "Moisturize frequently"),
    rec("eczema", "Avoid triggers (soaps, detergents)"),
    rec("eczema", "Topical corticosteroids for flares"),
    rec("eczema", "Dermatologist if severe or not improving"),
    rec("herpes_zoster", "Urgent medical evaluation for antiviral therapy"),
    rec("herpes_zoster", "Antivirals most effective within 72 hours"),
    rec("herpes_zoster", "Pain management"),
    rec(
        "herpes_zoster",
        "Avoid contact with pregnant women and immunocompromised",
    ),
    rec("urticaria", "Identify and avoid triggers"),
    rec("urticaria", "Antihistamines for symptom relief"),
    rec(
        "urticaria",
        "Seek emergency care if breathing difficulty or swelling",
    ),
    rec("ringworm", "Antifungal cream (clotrimazole, terbinafine)"),
    rec("ringworm", "Keep area clean and dry"),
    rec("ringworm", "Avoid sharing personal items"),
    rec("rosacea", "Dermatologist consultation"),
    rec(
        "rosacea",
        "Avoid triggers (spicy foods, alcohol, temperature extremes)",
    ),
    rec("rosacea", "Topical metronidazole or azelaic acid"),
    rec("severe_acne", "Dermatologist consultation"),
    rec("severe_acne", "Consider oral isotretinoin"),
    rec("severe_acne", "Topical retinoids"),
];

pub(super) static AGE_RULES: &[AgeRule] = &[AgeRule::AtLeast(60, "age_over_60")];

pub(super) static PROFILE: SpecialtyProfile = SpecialtyProfile {
    specialty: Specialty::Dermatology,
    default_condition: "eczema",
    default_urgency: 0.50,
    default_recommendations: &[
        "Seek dermatologist consultation",
        "Monitor skin changes closely",
        "Photograph lesions for tracking",
    ],
    generic_risk_target: None,
    risk_levels: &[(0.85, UrgencyLevel::High), (0.65, UrgencyLevel::Moderate)],
    condition_notes: &[
        ("melanoma", URGENT_REVIEW),
        ("cellulitis", URGENT_REVIEW),
        ("basal_cell_carcinoma", URGENT_REVIEW),
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
        tag("mole", &["mole", "spot", "lesion", "growth"]),
        tag("changing", &["changing", "changed", "growing", "new"]),
        tag("irregular", &["irregular", "asymmetric", "jagged"]),
        tag("multicolor", &["color", "dark", "black"]),
        tag("redness", &["red", "redness"]),
        tag("spreading", &["spreading", "expanding", "growing"]),
        tag("warmth", &["warm", "hot"]),
        tag("fever", &["fever", "chills"]),
        tag("blisters", &["blister", "vesicle", "rash"]),
        tag("painful", &["pain", "burning"]),
        tag("clustered", &["cluster", "band", "strip", "one side"]),
        tag("raised", &["raised", "bump", "nodule"]),
        tag("pearly", &["pearly", "shiny", "translucent"]),
        tag("bleeding", &["bleed", "won't heal"]),
        tag("scaly", &["scaly", "scales", "flaky"]),
        tag("silvery", &["silvery", "white", "thick"]),
        tag("patches", &["patch", "plaque"]),
        tag("itchy", &["itch", "scratchy"]),
        tag("dry", &["dry", "rough"]),
        tag("rash", &["rash"]),
        tag("rough", &["rough", "scaly", "crusty"]),
        tag("sun_exposed", &["sun", "face", "scalp", "arm", "hand"]),
        tag("circular", &["circular", "ring", "round"]),
        tag("border", &["border", "edge", "rim"]),
        tag("clearing", &["clear center", "clearing"]),
        tag("hives", &["hive", "welt", "wheal"]),
        tag("swelling", &["swell", "puffy"]),
        tag("facial", &["face", "facial", "cheek", "nose"]),
        tag("blood_vessels", &["blood vessel", "vein", "spider"]),
        tag("pustules", &["pustule", "pimple", "bump"]),
        tag("acne", &["acne", "pimple"]),
        tag("cysts", &["cyst", "nodule", "deep"]),
        tag("scarring", &["scar"]),
        tag(
            "white_patches",
            &["white patch", "lighter patch", "pale patch"],
        ),
        tag("pigment_loss", &["pigment", "lost color", "discolor"]),
        tag("nails", &["nail"]),
        tag("nail_thickening", &["yellow", "thick"]),
        tag("crumbling", &["crumbl", "brittle"]),
    ],
    composites: &[
        rule(
            MELANOMA,
            &[&["mole"], &["changing", "irregular", "multicolor"]],
        ),
        rule(
            CELLULITIS,
            &[&["redness"], &["spreading", "warmth"], &["fever"]],
        ),
        rule(ZOSTER, &[&["blisters"], &["painful"], &["clustered"]]),
        rule(BCC, &[&["raised"], &["pearly", "bleeding"]]),
        rule(
            PSORIASIS,
            &[&["scaly"], &["silvery", "patches"], &["redness"]],
        ),
        rule(ECZEMA, &[&["itchy"], &["dry"], &["redness", "rash"]]),
        rule(ACTINIC, &[&["rough"], &["sun_exposed"], &["patches"]]),
        rule(RINGWORM, &[&["circular"], &["border", "clearing"]]),
        rule(URTICARIA, &[&["hives", "swelling"], &["itchy"]]),
        rule(
            ROSACEA,
            &[&["facial"], &["redness"], &["blood_vessels", "pustules"]],
        ),
        rule(ACNE, &[&["acne"], &["cysts", "scarring"]]),
        rule(VITILIGO, &[&["white_patches"], &["pigment_loss"]]),
        rule(
            FUNGAL_NAIL,
            &[&["nails"], &["nail_thickening"], &["crumbling"]],
        ),
        rule(ECZEMA, &[&["itchy"], &["rash", "redness"]]),
    ],
    dominant: &[
        DominantTag {
            tag: "rash",
            key: PSORIASIS,
        },
        DominantTag {
            tag: "redness",
            key: PSORIASIS,
        },
        DominantTag {
            tag: "mole",
            key: MELANOMA,
        },
        DominantTag {
            tag: "acne",
            key: ACNE,
        },
    ],
    modifiers: &[],
    generic_key: "generic_dermatological_symptoms",
};
