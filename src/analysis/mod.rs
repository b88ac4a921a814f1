//! Streaming image analysis.
//!
//! An [`AnalysisSession`] downloads an image, sends it to the configured
//! vision model, folds the streamed answer into an [`AnalysisResult`] and
//! reports every step as an [`AnalysisStatus`]. The [`SessionRegistry`]
//! keeps at most one session alive.

mod cancel;
mod decoder;
mod error;
pub mod extract;
pub mod progress;
mod registry;
mod session;
mod status;
mod types;

pub use cancel::{CancelReason, CancelSignal};
pub use decoder::{StreamDecoder, StreamEventRecord, RECORD_MARKER, TERMINAL_SENTINEL};
pub use error::{AnalysisError, ErrorDescriptor, ErrorKind, RAW_PREVIEW_CHARS};
pub use progress::ProgressEstimator;
pub use registry::{SessionGate, SessionHandle, SessionRegistry};
pub use session::{
    AnalysisSession, ConfigSource, SessionContext, SessionDeps, SessionOptions, DEFAULT_TIMEOUT,
};
pub use status::{AnalysisStatus, SessionId, Stage, StatusSink};
pub use types::{AnalysisRequest, AnalysisResult, SearchSuggestion, StyleMaster, Tag};
