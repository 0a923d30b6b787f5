use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::models::{RoutingResult, StepId, UiHint};

/// One row of the routing table: which step a system question belongs to,
/// the widget to offer, and how to coerce the user's reply into the step
/// payload. `route` and `ui_hint` are both driven from this table so the
/// two can never disagree.
struct StepRule {
    step: StepId,
    hint: UiHint,
    matches: fn(&str) -> bool,
    build: fn(&str, &str) -> Option<Value>,
}

// First match wins. The backend communicates progress as free text, so the
// "current state" is whatever the last system question reads as.
const RULES: &[StepRule] = &[
    StepRule {
        step: StepId::Greeting,
        hint: UiHint::FreeText,
        matches: |m| m.contains("feeling today"),
        build: |_, input| Some(json!({ "message": input })),
    },
    StepRule {
        step: StepId::BackgroundTraits,
        hint: UiHint::Choice,
        matches: |m| m.contains("yourself or someone else"),
        build: |_, input| Some(json!({ "subject": input })),
    },
    StepRule {
        step: StepId::Substances,
        hint: UiHint::FreeText,
        matches: |m| m.contains("substances") || m.contains("smoking") || m.contains("alcohol"),
        build: |_, input| Some(json!({ "substances": input })),
    },
    StepRule {
        step: StepId::Travel,
        hint: UiHint::YesNo,
        matches: |m| m.contains("traveled"),
        build: |_, input| {
            let answer = parse_yes_no(input)
                .map(|yes| if yes { "yes" } else { "no" }.to_string())
                .unwrap_or_else(|| input.to_lowercase());
            Some(json!({ "recent_travel": answer }))
        },
    },
    // Ordered before pain_severity/onset so that "When did your symptoms
    // start?" falls through (the "start" guard) while "What symptoms do you
    // have?" lands here.
    StepRule {
        step: StepId::Symptoms,
        hint: UiHint::SymptomEntry,
        matches: |m| m.contains("symptoms") && !m.contains("start"),
        build: |_, input| {
            let symptoms: Vec<String> = input
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(ToString::to_string)
                .collect();
            if symptoms.is_empty() {
                None
            } else {
                Some(json!({ "symptoms": symptoms }))
            }
        },
    },
    StepRule {
        step: StepId::SymptomOnset,
        hint: UiHint::FreeText,
        matches: |m| m.contains("symptoms start") || m.contains("when did"),
        build: |_, input| Some(json!({ "onset": input })),
    },
    StepRule {
        step: StepId::PainSeverity,
        hint: UiHint::Scale,
        matches: |m| m.contains("severe") || m.contains("scale"),
        build: |_, input| {
            let severity = first_integer(input).filter(|n| (1..=10).contains(n))?;
            Some(json!({
                "severity": severity,
                "severity_description": format!("{}/10 - {}", severity, severity_bucket(severity)),
            }))
        },
    },
    StepRule {
        step: StepId::Temperature,
        hint: UiHint::FreeText,
        matches: |m| m.contains("temperature") || m.contains("fever"),
        build: |_, input| {
            let bucket = temperature_bucket(input)?;
            Some(json!({ "temperature": bucket, "reported": input }))
        },
    },
    StepRule {
        step: StepId::MedicalCare,
        hint: UiHint::YesNo,
        matches: |m| m.contains("doctor") || m.contains("medication"),
        build: |_, input| Some(json!({ "medical_care": input })),
    },
    StepRule {
        step: StepId::CrossQuestion,
        hint: UiHint::YesNo,
        matches: |m| m.contains("are you experiencing"),
        build: |message, input| {
            let symptom = cross_question_subject(message)?;
            let answer = parse_yes_no(input)
                .map(|yes| if yes { "yes" } else { "no" }.to_string())
                .unwrap_or_else(|| input.to_lowercase());
            Some(json!({ "symptom": symptom, "answer": answer }))
        },
    },
];

/// Map the last system question plus the user's reply to a step payload.
/// Pure: identical inputs always yield the identical result. An unmatched
/// question (or a reply the step can't coerce) yields a non-structured
/// result, which never triggers a network call.
pub fn route(last_system_message: &str, user_input: &str) -> RoutingResult {
    let lower = last_system_message.to_lowercase();
    let input = user_input.trim();

    for rule in RULES {
        if (rule.matches)(&lower) {
            return match (rule.build)(last_system_message, input) {
                Some(data) => RoutingResult {
                    step: rule.step,
                    data,
                    should_send_structured: true,
                },
                None => RoutingResult {
                    step: rule.step,
                    data: json!({}),
                    should_send_structured: false,
                },
            };
        }
    }

    RoutingResult {
        step: StepId::FreeText,
        data: json!({}),
        should_send_structured: false,
    }
}

/// Input widget for a system question, from the same table as `route`.
pub fn ui_hint(message_text: &str) -> UiHint {
    let lower = message_text.to_lowercase();
    RULES
        .iter()
        .find(|rule| (rule.matches)(&lower))
        .map(|rule| rule.hint)
        .unwrap_or(UiHint::FreeText)
}

static CROSS_QUESTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)are you experiencing\s+(.+?)[?.!]*\s*$").expect("valid regex"));

fn cross_question_subject(message: &str) -> Option<String> {
    CROSS_QUESTION
        .captures(message)
        .and_then(|captures| captures.get(1))
        .map(|subject| subject.as_str().trim().to_string())
        .filter(|subject| !subject.is_empty())
}

fn parse_yes_no(input: &str) -> Option<bool> {
    let lower = input.trim().trim_end_matches(['.', '!']).to_lowercase();
    if lower == "y" || lower.starts_with("yes") || lower.starts_with("yeah") || lower == "yep" {
        Some(true)
    } else if lower == "n" || lower == "no" || lower.starts_with("no,") || lower.starts_with("no ")
        || lower.starts_with("nope")
    {
        Some(false)
    } else {
        None
    }
}

fn first_integer(input: &str) -> Option<u8> {
    let mut digits = String::new();
    for ch in input.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else if !digits.is_empty() {
            break;
        }
    }
    digits.parse().ok()
}

fn severity_bucket(severity: u8) -> &'static str {
    if severity <= 3 {
        "Mild"
    } else if severity <= 7 {
        "Moderate"
    } else {
        "Severe"
    }
}

fn first_number(input: &str) -> Option<f64> {
    let mut number = String::new();
    let mut seen_dot = false;
    for ch in input.chars() {
        if ch.is_ascii_digit() {
            number.push(ch);
        } else if ch == '.' && !number.is_empty() && !seen_dot {
            number.push(ch);
            seen_dot = true;
        } else if !number.is_empty() {
            break;
        }
    }
    number.trim_end_matches('.').parse().ok()
}

fn temperature_bucket(input: &str) -> Option<&'static str> {
    if let Some(reading) = first_number(input) {
        // Readings above 45 are taken as Fahrenheit.
        let celsius = if reading > 45.0 {
            (reading - 32.0) * 5.0 / 9.0
        } else {
            reading
        };
        return Some(if celsius < 37.3 {
            "normal"
        } else if celsius < 38.0 {
            "low_grade"
        } else if celsius < 39.0 {
            "moderate"
        } else {
            "high"
        });
    }

    let lower = input.to_lowercase();
    if lower.contains("normal") || lower.contains("no fever") || parse_yes_no(&lower) == Some(false)
    {
        Some("normal")
    } else if lower.contains("high") || lower.contains("hot") || lower.contains("burning") {
        Some("high")
    } else {
        None
    }
}
