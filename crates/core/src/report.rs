use serde::{Deserialize, Serialize};
use serde_json::Value;

/// New-schema condition entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub factors: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReport {
    pub possible_conditions: Vec<Condition>,
    #[serde(default)]
    pub treatment_plan: Vec<String>,
    #[serde(default)]
    pub risk_assessment: Option<RiskAssessment>,
    #[serde(default)]
    pub follow_up: Option<String>,
}

/// Legacy-schema condition entry. `confidence` arrives as a 0-1 fraction in
/// `diagnosis` and 0-100 in `secondary_diagnosis`; both are normalized to a
/// percentage before rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyCondition {
    pub disease: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub symptom_coverage: Option<f64>,
    #[serde(default)]
    pub key_symptoms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyReport {
    #[serde(default)]
    pub diagnosis: Vec<LegacyCondition>,
    #[serde(default)]
    pub secondary_diagnosis: Vec<LegacyCondition>,
    #[serde(default)]
    pub disclaimer: Option<String>,
}

/// The two incompatible diagnosis payload shapes the backend emits.
#[derive(Debug, Clone)]
pub enum DiagnosisReport {
    New(NewReport),
    Legacy(LegacyReport),
}

/// `possible_conditions` marks the new schema; `diagnosis` or
/// `secondary_diagnosis` marks the legacy one. Anything else is unknown.
pub fn classify_payload(payload: &Value) -> Option<DiagnosisReport> {
    let object = payload.as_object()?;
    if object.contains_key("possible_conditions") {
        return serde_json::from_value(payload.clone())
            .ok()
            .map(DiagnosisReport::New);
    }
    if object.contains_key("diagnosis") || object.contains_key("secondary_diagnosis") {
        return serde_json::from_value(payload.clone())
            .ok()
            .map(DiagnosisReport::Legacy);
    }
    None
}

/// True when the payload carries a non-empty condition list; this is what
/// flips a session to diagnosis-complete. New-schema `possible_conditions`
/// is authoritative.
pub fn has_conditions(payload: &Value) -> bool {
    match classify_payload(payload) {
        Some(DiagnosisReport::New(report)) => !report.possible_conditions.is_empty(),
        Some(DiagnosisReport::Legacy(report)) => !report.diagnosis.is_empty(),
        None => false,
    }
}

/// Three fixed severity classes used consistently across both schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityClass {
    Low,
    Medium,
    High,
}

impl SeverityClass {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_lowercase()) {
            Some(value) if value == "low" || value == "mild" || value == "minor" => Self::Low,
            Some(value) if value == "high" || value == "severe" || value == "critical" => {
                Self::High
            }
            _ => Self::Medium,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionCard {
    pub name: String,
    pub confidence_pct: u8,
    pub severity: SeverityClass,
    pub coverage_pct: Option<u8>,
    pub key_symptoms: Vec<String>,
    pub detail: Option<String>,
    /// One-line rendering, e.g. "Flu — 82% confidence, Medium severity".
    pub headline: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Header,
    NumberedItem,
    IndentedDetail,
    Bullet,
    Disclaimer,
    Plain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    pub kind: LineKind,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportSection {
    Conditions {
        title: String,
        cards: Vec<ConditionCard>,
    },
    Treatment {
        title: String,
        items: Vec<String>,
    },
    Risk {
        title: String,
        level: SeverityClass,
        factors: Vec<String>,
        summary: Option<String>,
    },
    FollowUp {
        title: String,
        text: String,
    },
    Disclaimer {
        text: String,
    },
    /// Unknown payload shape: shown raw with a warning, never dropped.
    RawJson {
        warning: String,
        pretty: String,
    },
    Text {
        lines: Vec<TextLine>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderableReport {
    pub sections: Vec<ReportSection>,
}

/// Normalize any diagnosis payload into renderable sections. Total: both
/// known schemas yield their sections, anything else yields the raw-JSON
/// fallback. Never panics.
pub fn normalize(payload: &Value) -> RenderableReport {
    match classify_payload(payload) {
        Some(DiagnosisReport::New(report)) => normalize_new(report),
        Some(DiagnosisReport::Legacy(report)) => normalize_legacy(report),
        None => RenderableReport {
            sections: vec![ReportSection::RawJson {
                warning: "Unrecognized diagnosis format; showing the raw response.".to_string(),
                pretty: serde_json::to_string_pretty(payload)
                    .unwrap_or_else(|_| payload.to_string()),
            }],
        },
    }
}

fn normalize_new(report: NewReport) -> RenderableReport {
    let mut sections = Vec::new();

    if !report.possible_conditions.is_empty() {
        sections.push(ReportSection::Conditions {
            title: "Possible conditions".to_string(),
            cards: report
                .possible_conditions
                .into_iter()
                .map(|condition| {
                    condition_card(
                        condition.name,
                        condition.confidence,
                        condition.severity.as_deref(),
                        None,
                        Vec::new(),
                        condition.description,
                    )
                })
                .collect(),
        });
    }
    if !report.treatment_plan.is_empty() {
        sections.push(ReportSection::Treatment {
            title: "Treatment plan".to_string(),
            items: report.treatment_plan,
        });
    }
    if let Some(risk) = report.risk_assessment {
        let has_content =
            risk.level.is_some() || !risk.factors.is_empty() || risk.summary.is_some();
        if has_content {
            sections.push(ReportSection::Risk {
                title: "Risk assessment".to_string(),
                level: SeverityClass::parse(risk.level.as_deref()),
                factors: risk.factors,
                summary: risk.summary,
            });
        }
    }
    if let Some(follow_up) = report.follow_up.filter(|text| !text.trim().is_empty()) {
        sections.push(ReportSection::FollowUp {
            title: "Follow-up".to_string(),
            text: follow_up,
        });
    }

    RenderableReport { sections }
}

fn normalize_legacy(report: LegacyReport) -> RenderableReport {
    let mut sections = Vec::new();

    if !report.diagnosis.is_empty() {
        sections.push(ReportSection::Conditions {
            title: "Possible conditions".to_string(),
            cards: report.diagnosis.into_iter().map(legacy_card).collect(),
        });
    }
    if !report.secondary_diagnosis.is_empty() {
        sections.push(ReportSection::Conditions {
            title: "Secondary considerations".to_string(),
            cards: report
                .secondary_diagnosis
                .into_iter()
                .map(legacy_card)
                .collect(),
        });
    }
    if let Some(disclaimer) = report.disclaimer.filter(|text| !text.trim().is_empty()) {
        sections.push(ReportSection::Disclaimer { text: disclaimer });
    }

    RenderableReport { sections }
}

fn legacy_card(condition: LegacyCondition) -> ConditionCard {
    condition_card(
        condition.disease,
        condition.confidence,
        condition.severity.as_deref(),
        condition.symptom_coverage,
        condition.key_symptoms,
        None,
    )
}

fn condition_card(
    name: String,
    confidence: f64,
    severity: Option<&str>,
    coverage: Option<f64>,
    key_symptoms: Vec<String>,
    detail: Option<String>,
) -> ConditionCard {
    let confidence_pct = as_percent(confidence);
    let severity = SeverityClass::parse(severity);
    let headline = format!(
        "{} — {}% confidence, {} severity",
        name,
        confidence_pct,
        severity.label()
    );

    ConditionCard {
        name,
        confidence_pct,
        severity,
        coverage_pct: coverage.map(as_percent),
        key_symptoms,
        detail,
        headline,
    }
}

// The legacy payload mixes a 0-1 fraction and a 0-100 percentage with no
// declared contract; values at or below 1.0 are treated as fractions.
fn as_percent(raw: f64) -> u8 {
    let pct = if raw <= 1.0 { raw * 100.0 } else { raw };
    pct.clamp(0.0, 100.0).round() as u8
}

/// Best-effort fallback for pre-rendered diagnosis text. Deprecated path:
/// kept only for transcripts produced before structured payloads existed.
pub fn normalize_text(raw: &str) -> RenderableReport {
    let lines = raw
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| TextLine {
            kind: classify_line(line),
            content: line.trim().to_string(),
        })
        .collect();

    RenderableReport {
        sections: vec![ReportSection::Text { lines }],
    }
}

// Ordered predicates; first match wins.
fn classify_line(line: &str) -> LineKind {
    let trimmed = line.trim();
    if trimmed.ends_with(':') {
        return LineKind::Header;
    }
    if trimmed
        .chars()
        .next()
        .is_some_and(|ch| ch.is_ascii_digit())
        && trimmed.chars().skip(1).take(2).any(|ch| ch == '.' || ch == ')')
    {
        return LineKind::NumberedItem;
    }
    if line.starts_with("   ") || line.starts_with('\t') {
        return LineKind::IndentedDetail;
    }
    if trimmed.starts_with('-') || trimmed.starts_with('*') || trimmed.starts_with('•') {
        return LineKind::Bullet;
    }
    let lower = trimmed.to_lowercase();
    if lower.contains("disclaimer") || lower.contains("not a substitute") {
        return LineKind::Disclaimer;
    }
    LineKind::Plain
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_flu_renders_one_card() {
        let payload = json!({
            "diagnosis": [{
                "disease": "Flu",
                "confidence": 82,
                "severity": "medium",
                "symptom_coverage": 70,
                "key_symptoms": ["fever", "cough"]
            }]
        });

        let report = normalize(&payload);
        assert_eq!(report.sections.len(), 1);
        match &report.sections[0] {
            ReportSection::Conditions { cards, .. } => {
                assert_eq!(cards.len(), 1);
                assert_eq!(cards[0].headline, "Flu — 82% confidence, Medium severity");
                assert_eq!(cards[0].coverage_pct, Some(70));
            }
            other => panic!("expected conditions section, got {other:?}"),
        }
    }

    #[test]
    fn legacy_fraction_and_percent_confidence_normalize_alike() {
        let payload = json!({
            "diagnosis": [{ "disease": "Flu", "confidence": 0.82 }],
            "secondary_diagnosis": [{ "disease": "Cold", "confidence": 41.0 }]
        });

        let report = normalize(&payload);
        let pct = |section: &ReportSection| match section {
            ReportSection::Conditions { cards, .. } => cards[0].confidence_pct,
            other => panic!("expected conditions, got {other:?}"),
        };
        assert_eq!(pct(&report.sections[0]), 82);
        assert_eq!(pct(&report.sections[1]), 41);
    }

    #[test]
    fn new_schema_renders_independent_sections() {
        let payload = json!({
            "possible_conditions": [
                { "name": "Influenza", "confidence": 0.9, "severity": "high" }
            ],
            "treatment_plan": ["Rest", "Hydration"],
            "risk_assessment": { "level": "low", "factors": ["age under 40"] },
            "follow_up": "See a doctor if symptoms persist beyond a week."
        });

        let report = normalize(&payload);
        assert_eq!(report.sections.len(), 4);
        match &report.sections[0] {
            ReportSection::Conditions { cards, .. } => {
                assert_eq!(
                    cards[0].headline,
                    "Influenza — 90% confidence, High severity"
                );
            }
            other => panic!("expected conditions, got {other:?}"),
        }
    }

    #[test]
    fn new_schema_empty_sections_are_omitted() {
        let payload = json!({
            "possible_conditions": [{ "name": "Cold", "confidence": 55 }],
            "treatment_plan": [],
            "follow_up": ""
        });

        let report = normalize(&payload);
        assert_eq!(report.sections.len(), 1);
    }

    #[test]
    fn unknown_shape_falls_back_to_raw_json() {
        let payload = json!({ "verdict": "inconclusive" });
        let report = normalize(&payload);
        match &report.sections[0] {
            ReportSection::RawJson { warning, pretty } => {
                assert!(warning.contains("Unrecognized"));
                assert!(pretty.contains("inconclusive"));
            }
            other => panic!("expected raw json fallback, got {other:?}"),
        }
    }

    #[test]
    fn non_object_payload_never_panics() {
        let report = normalize(&json!(["not", "an", "object"]));
        assert!(matches!(report.sections[0], ReportSection::RawJson { .. }));
    }

    #[test]
    fn has_conditions_requires_non_empty_list() {
        assert!(has_conditions(&json!({
            "possible_conditions": [{ "name": "Flu" }]
        })));
        assert!(!has_conditions(&json!({ "possible_conditions": [] })));
        assert!(!has_conditions(&json!({ "status": "pending" })));
        assert!(has_conditions(&json!({
            "diagnosis": [{ "disease": "Flu" }]
        })));
    }

    #[test]
    fn severity_maps_to_three_classes() {
        assert_eq!(SeverityClass::parse(Some("mild")), SeverityClass::Low);
        assert_eq!(SeverityClass::parse(Some("medium")), SeverityClass::Medium);
        assert_eq!(SeverityClass::parse(Some("critical")), SeverityClass::High);
        assert_eq!(SeverityClass::parse(None), SeverityClass::Medium);
    }

    #[test]
    fn text_fallback_classifies_lines_in_order() {
        let raw = "Assessment:\n1. Influenza\n    fever and chills\n- rest at home\nDisclaimer: not medical advice\njust text";
        let report = normalize_text(raw);
        let ReportSection::Text { lines } = &report.sections[0] else {
            panic!("expected text section");
        };
        let kinds: Vec<LineKind> = lines.iter().map(|line| line.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LineKind::Header,
                LineKind::NumberedItem,
                LineKind::IndentedDetail,
                LineKind::Bullet,
                LineKind::Disclaimer,
                LineKind::Plain,
            ]
        );
    }
}
