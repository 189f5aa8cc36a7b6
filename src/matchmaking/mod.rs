pub mod matchmaker;
pub mod pool;

pub use matchmaker::{JoinOutcome, Matchmaker};
pub use pool::{PairOutcome, QueueEntry, WaitingPool};
