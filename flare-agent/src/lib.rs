//! # Flare Agent
//!
//! The agent orchestrates the model <-> workspace loop:
//! 1. The operator sends a message (merged with the playbook)
//! 2. The model replies, possibly with fenced command blocks
//! 3. Blocks run in order inside the session workspace
//! 4. The first failure halts the batch and the model is asked for one fix
//! 5. Separately, a target's crash corpus is replayed and explained
//!
//! The model advises, the workspace executes.

mod correction;
mod orchestrator;

pub use correction::{correction_prompt, BatchFailure, CorrectionOutcome, SelfCorrectionLoop};
pub use orchestrator::{ChatTurn, Orchestrator};
