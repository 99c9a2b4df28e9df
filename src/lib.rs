#![forbid(unsafe_code)]

//! # rubric-harness
//!
//! Rubric normalization and AI-grading reconciliation.
//!
//! Rubrics arrive in two historical shapes (flat `criteria` lists and
//! hierarchical sections with parts) and leave in one canonical form with
//! stable, unique item ids. Grading responses from a vision model are
//! treated as untrusted text: the JSON is extracted and repaired, every hit
//! is matched back to a canonical item, and all points are taken from the
//! rubric. Manual grading scores a set of selected item ids and produces the
//! same result shape.
//!
//! Model failures never block a grade: grading fails open to full credit and
//! rubric generation falls back to a single-criterion stub.

pub mod autosave;
pub mod config;
pub mod gateway;
pub mod grader;
pub mod grading;
pub mod logging;
pub mod prompts;
pub mod rubric;
pub mod store;

pub use autosave::{AutosaveStats, SelectionAutosave};
pub use config::{ConfigError, GraderConfig};
pub use gateway::{Attribution, ChatGateway, ProviderError, ProviderGateway, UsageSink};
pub use grader::{
    generate_rubric, grade_submission, GeneratedRubric, GenerationRequest, GradingRequest,
};
pub use grading::{
    reconcile, score_selections, selections_from_feedback, try_reconcile, GradeOutcome, GradedHit,
    ReconcileError,
};
pub use rubric::{
    assess, is_valid, normalize, normalize_json, total_points, Rubric, RubricItem, RubricPart,
    RubricSection, RubricStatus,
};
pub use store::{
    record_grade, save_rubric, AssignmentRecord, RecordStore, SqliteRecordStore, StoreError,
    SubmissionRecord,
};
