pub mod apply_checkpoint;
pub mod close;
pub mod commit;
pub mod commit_and_undelegate;
pub mod delegate;
pub mod fulfill_randomness;
pub mod initialize;
pub mod request_randomness;
pub mod undelegate;
pub mod update;

pub use apply_checkpoint::ApplyOutcome;
