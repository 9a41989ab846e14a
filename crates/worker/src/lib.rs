//! Message processing for HR record ingestion.
//!
//! - Dispatcher (queue batches → bounded worker pool → acknowledge)
//! - Pipeline (decode → classify → transform → persist or dead-letter)
//! - Persistence (per-entity locks, timeouts, retries)
//! - Replay (dead letters back onto the queue)

pub mod config;
pub mod dead_letter;
pub mod dispatcher;
pub mod locks;
pub mod persistence;
pub mod pipeline;
pub mod replay;
pub mod scheduler;

pub use config::PipelineConfig;
pub use dead_letter::Recorder;
pub use dispatcher::{BatchReport, Dispatcher};
pub use locks::KeyLocks;
pub use persistence::{PersistFailure, Persisted, Persister};
pub use pipeline::{prepare, MessageOutcome, Pipeline, Prepared, Tracker};
pub use replay::{replay, ReplayReport};
pub use scheduler::WorkerScheduler;
