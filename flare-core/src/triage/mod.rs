//! Crash corpus triage: target resolution, replay, explanation and reporting

mod engine;
mod report;
mod target;

pub use engine::{CrashTriageEngine, ReplayStrategy};
pub use report::{CrashRecord, ReplayOutcome, TriageReport, EXPLANATION_FALLBACK, NO_TARGET_TEXT};
pub use target::{list_corpus, BinaryStrategy, CorpusLayout, FuzzTarget, NamePatterns};
