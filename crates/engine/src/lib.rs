pub mod identity;
pub mod lab;

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use triage_backend::{BackendError, DiagnosisBackend, StepMessageRequest};
use triage_core::{
    classify, classify_payload, has_conditions, route, ui_hint, IntentMatch, Message, Service,
    SessionState, StepId, SubmitOutcome, SymptomCollector, UiHint,
};
use triage_observability::EngineMetrics;

pub use identity::{ClientIdentity, IdentityProvider};
pub use lab::{LabAnalysis, LabAnalyzer};

/// Seeded into every fresh transcript; the dialogue proper starts once the
/// backend issues a session and its own opening question.
pub const OPENING_PROMPT: &str =
    "Hi! How are you feeling today? Describe what's bothering you, or ask me to check a lab report.";

const SERVICE_PICKER_PROMPT: &str = "I can help with two things:\n  1. symptom diagnosis\n  2. lab report analysis\nWhich one do you need?";

const COMPLETE_NOTICE: &str =
    "This consultation is complete. Start a new session to ask about something else.";

const LAB_REDIRECT_NOTICE: &str =
    "Switching to lab-report analysis. Upload your report with the analyze command.";

/// Below this confidence the classifier result is treated as ambiguous and
/// the explicit service picker is shown instead.
const CONFIDENCE_FLOOR: u8 = 40;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Recovered locally; the user is re-prompted.
    #[error("{0}")]
    Validation(String),
    /// Surfaced verbatim with the server's reset hint; never auto-retried.
    #[error("{message}")]
    RateLimited {
        message: String,
        suggestion: Option<String>,
    },
    /// Session state is untouched; the same answer may be retried.
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("a request is already in flight; wait for the current reply")]
    Busy,
}

#[derive(Debug, Clone)]
struct PendingIntent {
    original_input: String,
    candidate: Option<IntentMatch>,
}

#[derive(Debug, Clone)]
enum Phase {
    NoSession,
    IntentPending(PendingIntent),
    SessionActive,
    DiagnosisComplete,
}

/// What one call to the engine produced, for the rendering collaborator.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub new_messages: Vec<Message>,
    /// Set when the user picked the lab-report service; the caller owns the
    /// switch into that flow.
    pub redirect: Option<Service>,
    pub hint: UiHint,
}

/// Owns the transcript, the active session, quota bookkeeping, and the
/// sequencing of backend calls. All awaited sequentially; at most one
/// structured call is outstanding per session.
pub struct IntakeEngine<B> {
    backend: Arc<B>,
    metrics: Arc<EngineMetrics>,
    identity: ClientIdentity,
    session: SessionState,
    symptoms: SymptomCollector,
    phase: Phase,
    in_flight: bool,
    remaining_daily: Option<u32>,
}

impl<B: DiagnosisBackend> IntakeEngine<B> {
    pub fn new(backend: Arc<B>, identity: ClientIdentity, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            backend,
            metrics,
            identity,
            session: SessionState::new(OPENING_PROMPT),
            symptoms: SymptomCollector::new(),
            phase: Phase::NoSession,
            in_flight: false,
            remaining_daily: None,
        }
    }

    pub fn transcript(&self) -> &[Message] {
        &self.session.transcript
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.session_id.as_deref()
    }

    pub fn diagnosis_complete(&self) -> bool {
        self.session.diagnosis_complete
    }

    pub fn remaining_daily(&self) -> Option<u32> {
        self.remaining_daily
    }

    pub fn symptoms(&self) -> &[String] {
        self.symptoms.symptoms()
    }

    pub fn current_hint(&self) -> UiHint {
        match &self.phase {
            Phase::NoSession | Phase::DiagnosisComplete => UiHint::FreeText,
            Phase::IntentPending(pending) => {
                if pending.candidate.is_some() {
                    UiHint::YesNo
                } else {
                    UiHint::ServicePicker
                }
            }
            Phase::SessionActive => self
                .session
                .last_system_text()
                .map(ui_hint)
                .unwrap_or(UiHint::FreeText),
        }
    }

    /// Handle one user utterance. Exactly one user message is appended per
    /// call; system replies follow as the turn resolves.
    #[instrument(skip(self, text))]
    pub async fn process_message(&mut self, text: &str) -> Result<TurnOutcome, EngineError> {
        if self.in_flight {
            return Err(EngineError::Busy);
        }
        let input = text.trim().to_string();
        if input.is_empty() {
            return Err(EngineError::Validation("Please enter a message.".to_string()));
        }

        let started = Instant::now();
        self.metrics.inc_turn();
        let mark = self.session.transcript.len();

        let redirect = match self.phase.clone() {
            Phase::NoSession => {
                self.handle_first_utterance(input);
                None
            }
            Phase::IntentPending(pending) => self.handle_service_choice(pending, input).await?,
            Phase::SessionActive => {
                self.handle_session_reply(input).await?;
                None
            }
            Phase::DiagnosisComplete => {
                self.session.transcript.push(Message::user(input));
                self.push_system(COMPLETE_NOTICE);
                None
            }
        };

        self.metrics.observe_latency(started.elapsed());
        Ok(self.outcome_since(mark, redirect))
    }

    /// Discard all session-scoped state and re-seed the opening prompt.
    pub fn start_new_session(&mut self) {
        self.session = SessionState::new(OPENING_PROMPT);
        self.symptoms.reset();
        self.phase = Phase::NoSession;
        self.in_flight = false;
        info!("session state reset");
    }

    pub fn add_symptom(&mut self, symptom: &str) -> triage_core::AddOutcome {
        self.symptoms.add(symptom)
    }

    pub fn remove_symptom(&mut self, symptom: &str) -> bool {
        self.symptoms.remove(symptom)
    }

    /// Join the collected set into one utterance and run it as a turn. The
    /// first submission under three symptoms only shows the nudge.
    pub async fn submit_symptoms(&mut self) -> Result<TurnOutcome, EngineError> {
        if self.in_flight {
            return Err(EngineError::Busy);
        }
        match self.symptoms.submit() {
            SubmitOutcome::Empty => Err(EngineError::Validation(
                "Add at least one symptom before submitting.".to_string(),
            )),
            SubmitOutcome::Nudge(text) => {
                let mark = self.session.transcript.len();
                self.push_system(text);
                Ok(self.outcome_since(mark, None))
            }
            SubmitOutcome::Submitted(utterance) => self.process_message(&utterance).await,
        }
    }

    fn handle_first_utterance(&mut self, input: String) {
        self.session.transcript.push(Message::user(&input));

        match classify(&input) {
            Some(intent) if intent.confidence >= CONFIDENCE_FLOOR => {
                debug!(
                    service = intent.service.as_code(),
                    confidence = intent.confidence,
                    "intent classified"
                );
                self.push_system(format!(
                    "It sounds like you're looking for {}. I picked up on: {}. Shall we begin? (yes/no)",
                    intent.service.display_name(),
                    intent.matched_terms.join(", ")
                ));
                self.phase = Phase::IntentPending(PendingIntent {
                    original_input: input,
                    candidate: Some(intent),
                });
            }
            _ => {
                // Ambiguous classification is not an error; resolve with the
                // explicit picker.
                self.push_system(SERVICE_PICKER_PROMPT);
                self.phase = Phase::IntentPending(PendingIntent {
                    original_input: input,
                    candidate: None,
                });
            }
        }
    }

    async fn handle_service_choice(
        &mut self,
        pending: PendingIntent,
        input: String,
    ) -> Result<Option<Service>, EngineError> {
        self.session.transcript.push(Message::user(&input));

        let confirmed = parse_yes_no(&input);
        let choice = Service::parse(&input).or_else(|| match (&pending.candidate, confirmed) {
            (Some(intent), Some(true)) => Some(intent.service),
            _ => None,
        });

        match choice {
            Some(Service::LabReportAnalysis) => {
                self.push_system(LAB_REDIRECT_NOTICE);
                self.phase = Phase::NoSession;
                Ok(Some(Service::LabReportAnalysis))
            }
            Some(Service::DiseaseDiagnosis) => {
                self.begin_session(pending.original_input).await?;
                Ok(None)
            }
            None if confirmed == Some(false) => {
                self.push_system(SERVICE_PICKER_PROMPT);
                self.phase = Phase::IntentPending(PendingIntent {
                    original_input: pending.original_input,
                    candidate: None,
                });
                Ok(None)
            }
            None => {
                self.push_system("Please answer yes or no, or pick 1 or 2.");
                self.phase = Phase::IntentPending(pending);
                Ok(None)
            }
        }
    }

    async fn begin_session(&mut self, original_input: String) -> Result<(), EngineError> {
        let backend = self.backend.clone();

        // Quota is re-checked immediately before the gated call, and an
        // exhausted quota means session-start is never issued.
        self.in_flight = true;
        let access = backend.check_access(self.identity.rate_key()).await;
        self.in_flight = false;
        let access = access?;

        if !access.can_use {
            self.metrics.inc_rate_limited();
            self.remaining_daily = access.remaining_daily;
            return Err(EngineError::RateLimited {
                message: access
                    .error
                    .unwrap_or_else(|| "Daily diagnosis limit reached.".to_string()),
                suggestion: access.suggestion,
            });
        }

        let request = self.identity.start_session_request();
        self.in_flight = true;
        let response = backend.start_session(&request).await;
        self.in_flight = false;
        let response = response?;

        debug_assert!(self.session.session_id.is_none());
        self.session.session_id = Some(response.session_id.clone());
        self.remaining_daily = response.remaining_daily.or(access.remaining_daily);
        self.session.transcript.push(Message::system(&response.message));
        self.phase = Phase::SessionActive;
        info!(session_id = %response.session_id, "session started");

        // The utterance that triggered intent inference doubles as the first
        // structured answer; it is already in the transcript.
        let routed = route(&response.message, &original_input);
        self.session.current_step = routed.step;
        if routed.should_send_structured {
            self.dispatch_step(routed).await?;
        }

        Ok(())
    }

    async fn handle_session_reply(&mut self, input: String) -> Result<(), EngineError> {
        let last_question = self
            .session
            .last_system_text()
            .unwrap_or_default()
            .to_string();
        let routed = route(&last_question, &input);
        self.session.transcript.push(Message::user(&input));
        self.session.current_step = routed.step;

        if routed.step == StepId::BackgroundTraits {
            if let Some(subject) = routed.data.get("subject").and_then(Value::as_str) {
                self.session
                    .background_traits
                    .insert("subject".to_string(), subject.to_string());
            }
        }

        if !routed.should_send_structured {
            // Missing or uncoercible answer: recover locally, no network.
            self.push_system(format!("Sorry, I didn't catch that. {last_question}"));
            return Ok(());
        }

        self.dispatch_step(routed).await
    }

    async fn dispatch_step(
        &mut self,
        routed: triage_core::RoutingResult,
    ) -> Result<(), EngineError> {
        let Some(session_id) = self.session.session_id.clone() else {
            return Err(EngineError::Validation("No active session.".to_string()));
        };

        let request = StepMessageRequest {
            session_id: session_id.clone(),
            step: routed.step.as_code().to_string(),
            data: routed.data,
            temp_user_id: self.identity.temp_user_id().map(str::to_string),
        };

        let backend = self.backend.clone();
        self.in_flight = true;
        let result = backend.send_step(&request).await;
        self.in_flight = false;
        let response = result?;

        // A reply that lands after the session was discarded must not touch
        // displayed state.
        if self.session.session_id.as_deref() != Some(session_id.as_str()) {
            warn!("dropping step response for a discarded session");
            return Ok(());
        }

        self.metrics.inc_structured_send();

        if let Some(payload) = response.diagnosis_data {
            if classify_payload(&payload).is_none() {
                self.metrics.inc_schema_fallback();
            }
            let complete = has_conditions(&payload);
            let text = response
                .message
                .unwrap_or_else(|| "Here is your assessment.".to_string());
            self.session.transcript.push(Message::diagnosis(text, payload));
            if complete {
                self.session.diagnosis_complete = true;
                self.phase = Phase::DiagnosisComplete;
                info!(session_id = %session_id, "diagnosis complete");
            }
        } else if let Some(message) = response.message {
            self.session.transcript.push(Message::system(message));
        } else {
            self.push_system("The service sent an empty reply. Please answer again.");
        }

        if let Some(temp_user_id) = self.identity.temp_user_id() {
            if let Err(error) = backend.activity_ping(temp_user_id).await {
                debug!(%error, "activity ping failed");
            }
        }

        Ok(())
    }

    fn push_system(&mut self, text: impl Into<String>) {
        self.session.transcript.push(Message::system(text));
    }

    fn outcome_since(&self, mark: usize, redirect: Option<Service>) -> TurnOutcome {
        TurnOutcome {
            new_messages: self.session.transcript[mark..].to_vec(),
            redirect,
            hint: self.current_hint(),
        }
    }
}

fn parse_yes_no(input: &str) -> Option<bool> {
    let lower = input.trim().trim_end_matches(['.', '!']).to_lowercase();
    if lower == "y" || lower.starts_with("yes") || lower.starts_with("yeah") {
        Some(true)
    } else if lower == "n" || lower == "no" || lower.starts_with("no ") || lower.starts_with("nope")
    {
        Some(false)
    } else {
        None
    }
}
