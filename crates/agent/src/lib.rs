//! The tool-orchestration agent for hybridrag.
//!
//! One [`SearchAgent`] answers one query:
//!
//! 1. **Plan**: the reasoning model sees the history and the tool catalog
//! 2. **Act**: the first requested tool call is dispatched under the caller's scope
//! 3. **Observe**: the truncated result is appended to the history
//! 4. **Judge**: a second model decides whether the history answers the query
//!
//! The loop stops on a sufficient verdict with an answer, or when the
//! iteration limit is reached.

pub mod app;
pub mod history;
pub mod judge;
pub mod loop_runner;

#[cfg(test)]
mod test_helpers;

pub use app::{AppContext, load_catalog};
pub use history::{ReasoningHistory, truncate_content};
pub use judge::{SufficiencyJudge, SufficiencyVerdict};
pub use loop_runner::{
    AgentOutcome, DEFAULT_REASONING_PROMPT, LoopState, Observation, ReasoningSettings, RunStatus,
    SearchAgent,
};
