use crate::models::{IntentMatch, Service};

const KEYWORD_POINTS: f32 = 10.0;
const PHRASE_POINTS: f32 = 20.0;
const DOMAIN_TERM_POINTS: f32 = 30.0;
const SHORT_INPUT_CHARS: usize = 10;
const SHORT_INPUT_PENALTY: f32 = 0.7;
const MULTI_MATCH_BOOST: f32 = 1.2;
const MATCH_FLOOR: f32 = 20.0;
const DISPLAY_TERMS: usize = 3;

struct ServiceProfile {
    service: Service,
    weight: f32,
    keywords: &'static [&'static str],
    phrases: &'static [&'static str],
    domain_terms: &'static [&'static str],
    suggested_action: &'static str,
}

// Declaration order breaks score ties: earlier profile wins.
const PROFILES: &[ServiceProfile] = &[
    ServiceProfile {
        service: Service::DiseaseDiagnosis,
        weight: 2.0,
        keywords: &[
            "sick", "pain", "hurt", "ache", "fever", "cough", "dizzy", "nausea", "tired", "sore",
            "ill", "unwell", "headache", "throat",
        ],
        phrases: &[
            "not feeling well",
            "feel sick",
            "i have a",
            "been feeling",
            "under the weather",
            "what is wrong with me",
            "something is wrong",
        ],
        domain_terms: &[
            "symptom", "symptoms", "diagnosis", "diagnose", "migraine", "infection", "flu", "rash",
            "vomiting", "diarrhea", "chills", "fatigue",
        ],
        suggested_action: "start_diagnosis",
    },
    ServiceProfile {
        service: Service::LabReportAnalysis,
        weight: 1.8,
        keywords: &[
            "lab", "report", "test", "result", "blood", "scan", "upload", "file", "pdf", "values",
        ],
        phrases: &[
            "lab report",
            "test results",
            "blood work",
            "analyze my",
            "uploaded a",
            "check my report",
            "explain my results",
        ],
        domain_terms: &[
            "cbc",
            "hemoglobin",
            "cholesterol",
            "glucose",
            "x-ray",
            "mri",
            "biopsy",
            "urinalysis",
            "lipid",
            "creatinine",
        ],
        suggested_action: "open_lab_reports",
    },
];

/// Score free text against every service dictionary and return the best
/// match, or None when nothing clears the floor.
pub fn classify(input: &str) -> Option<IntentMatch> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();
    let short_input = trimmed.chars().count() < SHORT_INPUT_CHARS;

    let mut best: Option<(f32, IntentMatch)> = None;

    for profile in PROFILES {
        let mut matched: Vec<&str> = Vec::new();
        let mut score = 0.0_f32;

        for term in profile.keywords {
            if lower.contains(term) {
                score += KEYWORD_POINTS * profile.weight;
                matched.push(term);
            }
        }
        for term in profile.phrases {
            if lower.contains(term) {
                score += PHRASE_POINTS * profile.weight;
                matched.push(term);
            }
        }
        for term in profile.domain_terms {
            if lower.contains(term) {
                score += DOMAIN_TERM_POINTS * profile.weight;
                matched.push(term);
            }
        }

        if matched.is_empty() {
            continue;
        }
        if short_input {
            score *= SHORT_INPUT_PENALTY;
        }
        if matched.len() > 2 {
            score *= MULTI_MATCH_BOOST;
        }
        let score = score.clamp(0.0, 100.0);
        if score <= MATCH_FLOOR {
            continue;
        }

        // Strictly-greater comparison keeps the earlier profile on ties.
        if best.as_ref().map_or(true, |(top, _)| score > *top) {
            best = Some((
                score,
                IntentMatch {
                    service: profile.service,
                    confidence: score.round() as u8,
                    matched_terms: matched
                        .iter()
                        .take(DISPLAY_TERMS)
                        .map(ToString::to_string)
                        .collect(),
                    suggested_action: profile.suggested_action.to_string(),
                },
            ));
        }
    }

    best.map(|(_, intent)| intent)
}
