//! Queue worker for the Clipnote backend.
//!
//! Pulls transcription jobs from the queue and drives each through the
//! acquire → transcribe → attach pipeline with bounded retries. The same
//! pipeline is exported for the API's synchronous direct-processing
//! fallback.

pub mod config;
pub mod error;
pub mod executor;
pub mod processor;
pub mod transcriber;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use processor::{DirectOutcome, ProcessingContext};
pub use transcriber::{
    GeminiTranscriber, MalformedResponsePolicy, Transcriber, Transcription,
};
