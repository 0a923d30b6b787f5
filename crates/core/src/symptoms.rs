/// Nudge shown once when the user submits with fewer than three symptoms.
pub const FEW_SYMPTOMS_DISCLAIMER: &str = "Listing at least three symptoms usually gives a much \
more useful assessment. Add more if you can, or submit again to continue as is.";

const NUDGE_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Duplicate,
    Blank,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The collected set joined into one user utterance.
    Submitted(String),
    /// Shown at most once; the next submit goes through regardless.
    Nudge(&'static str),
    Empty,
}

/// Accumulates the symptom set for the symptoms step. Insertion order is
/// kept; duplicates are compared exact and case-sensitive after trimming.
#[derive(Debug, Clone, Default)]
pub struct SymptomCollector {
    symptoms: Vec<String>,
    disclaimer_shown: bool,
}

impl SymptomCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, raw: &str) -> AddOutcome {
        let symptom = raw.trim();
        if symptom.is_empty() {
            return AddOutcome::Blank;
        }
        if self.symptoms.iter().any(|existing| existing == symptom) {
            return AddOutcome::Duplicate;
        }
        self.symptoms.push(symptom.to_string());
        AddOutcome::Added
    }

    pub fn remove(&mut self, raw: &str) -> bool {
        let symptom = raw.trim();
        let before = self.symptoms.len();
        self.symptoms.retain(|existing| existing != symptom);
        self.symptoms.len() < before
    }

    pub fn symptoms(&self) -> &[String] {
        &self.symptoms
    }

    pub fn is_empty(&self) -> bool {
        self.symptoms.is_empty()
    }

    pub fn submit(&mut self) -> SubmitOutcome {
        if self.symptoms.is_empty() {
            return SubmitOutcome::Empty;
        }
        if self.symptoms.len() < NUDGE_THRESHOLD && !self.disclaimer_shown {
            self.disclaimer_shown = true;
            return SubmitOutcome::Nudge(FEW_SYMPTOMS_DISCLAIMER);
        }
        let utterance = self.symptoms.join(", ");
        self.symptoms.clear();
        SubmitOutcome::Submitted(utterance)
    }

    pub fn reset(&mut self) {
        self.symptoms.clear();
        self.disclaimer_shown = false;
    }
}
