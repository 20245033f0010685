//! Testing infrastructure for the pipeline.
//!
//! Provides controllable mock collaborators so the orchestration core can
//! be tested without an LLM transport or subprocesses. The mocks follow a
//! builder pattern, count their calls, and support scripted sequences
//! (fail once then pass, queued plans) to drive the retry and loop-back
//! paths deterministically.

pub mod mocks;

pub use mocks::{MockAuditor, MockExecutor, MockGenerator, MockPlanner, MockPostMortem};
