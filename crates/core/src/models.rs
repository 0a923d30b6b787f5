use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    System,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Regular,
    Diagnosis,
}

/// One transcript entry. Appended once per logical turn, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<Value>,
    pub kind: MessageKind,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::System,
            timestamp: Utc::now(),
            diagnosis: None,
            kind: MessageKind::Regular,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::User,
            timestamp: Utc::now(),
            diagnosis: None,
            kind: MessageKind::Regular,
        }
    }

    pub fn diagnosis(text: impl Into<String>, payload: Value) -> Self {
        Self {
            text: text.into(),
            sender: Sender::System,
            timestamp: Utc::now(),
            diagnosis: Some(payload),
            kind: MessageKind::Diagnosis,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    DiseaseDiagnosis,
    LabReportAnalysis,
}

impl Service {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "diagnosis" | "disease" | "disease_diagnosis" | "1" => Some(Self::DiseaseDiagnosis),
            "lab" | "labs" | "lab_report" | "lab_report_analysis" | "report" | "2" => {
                Some(Self::LabReportAnalysis)
            }
            _ => None,
        }
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Self::DiseaseDiagnosis => "disease_diagnosis",
            Self::LabReportAnalysis => "lab_report_analysis",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::DiseaseDiagnosis => "symptom diagnosis",
            Self::LabReportAnalysis => "lab report analysis",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentMatch {
    pub service: Service,
    /// 0..=100 after penalty/boost and clamping.
    pub confidence: u8,
    /// First three matched terms, in dictionary order.
    pub matched_terms: Vec<String>,
    pub suggested_action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Greeting,
    BackgroundTraits,
    Substances,
    Travel,
    Symptoms,
    SymptomOnset,
    PainSeverity,
    Temperature,
    MedicalCare,
    CrossQuestion,
    FreeText,
}

impl StepId {
    pub fn as_code(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::BackgroundTraits => "background_traits",
            Self::Substances => "substances",
            Self::Travel => "travel",
            Self::Symptoms => "symptoms",
            Self::SymptomOnset => "symptom_onset",
            Self::PainSeverity => "pain_severity",
            Self::Temperature => "temperature",
            Self::MedicalCare => "medical_care",
            Self::CrossQuestion => "cross_question",
            Self::FreeText => "free_text",
        }
    }
}

/// Input widget the front-end should offer for the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiHint {
    FreeText,
    YesNo,
    Choice,
    Scale,
    SymptomEntry,
    ServicePicker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingResult {
    pub step: StepId,
    pub data: Value,
    pub should_send_structured: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub can_use: bool,
    pub remaining_daily: Option<u32>,
    pub error: Option<String>,
    pub suggestion: Option<String>,
}

/// Session-scoped conversation state. Discarded wholesale on new-session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Option<String>,
    pub transcript: Vec<Message>,
    pub background_traits: HashMap<String, String>,
    pub current_step: StepId,
    pub diagnosis_complete: bool,
}

impl SessionState {
    pub fn new(opening_prompt: &str) -> Self {
        Self {
            session_id: None,
            transcript: vec![Message::system(opening_prompt)],
            background_traits: HashMap::new(),
            current_step: StepId::Greeting,
            diagnosis_complete: false,
        }
    }

    pub fn last_system_text(&self) -> Option<&str> {
        self.transcript
            .iter()
            .rev()
            .find(|message| message.sender == Sender::System)
            .map(|message| message.text.as_str())
    }
}
