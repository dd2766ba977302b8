//! Network configuration engine.
//!
//! [`NetworkEngine`] is the single entry point: it runs one invocation
//! through the [`EngineState`] machine
//!
//! ```text
//! pending -> building -> applying -> verifying -> confirmed -> done
//!                |           |            |
//!                v           +------------+--> rolling_back -> failed
//!              failed
//! ```
//!
//! recording every created object as it goes so failures can be rolled back
//! completely, and reports an [`ApplyResult`].

mod error;
mod lock;
mod orchestrator;
mod request;
mod result;
mod state;

pub use error::{EngineError, ErrorCode, ErrorReport};
pub use lock::{TargetKey, TargetLocks};
pub use orchestrator::NetworkEngine;
pub use request::{ApplyRequest, EngineOptions, ProbePlan};
pub use result::{
    ApplyResult, REASON_FLAT_NETWORK, REASON_LABEL_ONLY, REASON_NO_PROBE_ENDPOINTS,
    REASON_NOT_APPLIED, REASON_TEARDOWN, Verification,
};
pub use state::{EngineState, InvalidTransition, StateMachine};
