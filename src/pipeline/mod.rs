//! Message processing pipeline.
//!
//! Every inbound message for an owner flows through:
//! 1. `anonymizer::anonymize()`: PII stripped, only tokens and metadata remain
//! 2. `Classifier::classify()`: remote inference with local fallback
//! 3. `RuleMatcher::matches()`: each active rule evaluated against the message
//! 4. `ActionExecutor::execute()`: matched actions create or update records
//!
//! The orchestrator drives one owner's batch sequentially and records each
//! handled message so replays are no-ops.

pub mod anonymizer;
pub mod dictionary;
pub mod extract;
pub mod orchestrator;
pub mod stats;
pub mod types;
