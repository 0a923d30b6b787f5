pub mod intent;
pub mod models;
pub mod report;
pub mod router;
pub mod symptoms;

pub use intent::classify;
pub use models::*;
pub use report::{
    classify_payload, has_conditions, normalize, normalize_text, ConditionCard, DiagnosisReport,
    RenderableReport, ReportSection, SeverityClass,
};
pub use router::{route, ui_hint};
pub use symptoms::{AddOutcome, SubmitOutcome, SymptomCollector, FEW_SYMPTOMS_DISCLAIMER};
