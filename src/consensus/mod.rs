//! King algorithm for Byzantine agreement on a binary plan.
//!
//! ## Structure
//! - `types.rs` - plans, proposals and the fault bounds derived from N
//! - `state.rs` - per-participant proposal table and ack set
//! - `king.rs` - bounded king selection
//! - `decision.rs` - overwhelming-majority / king fallback rule
//! - `traitor.rs` - honest and lying broadcast behavior
//! - `engine.rs` - the participant task: readiness barrier and round loop
//! - `tests.rs` - engine scenarios driven through a participant's inbox

pub use decision::{decide, Decision, Tally};
pub use engine::{
    KingParticipant, ParticipantReport, ParticipantStatus, Phase, ProtocolSettings, RoundRecord,
};
pub use king::{choose_king, KingChoice, KingPolicy};
pub use state::{AckSet, DedupPolicy, ParticipantState, ProposalTable};
pub use traitor::Role;
pub use types::{FaultBounds, ParticipantId, Plan, Proposal, Round};

pub mod decision;
pub mod engine;
pub mod king;
pub mod state;
pub mod traitor;
pub mod types;

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
