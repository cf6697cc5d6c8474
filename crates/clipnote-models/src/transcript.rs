//! Transcription results attached to collections.

use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Script components derived from a transcript by the analysis backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptComponents {
    /// Opening hook (first seconds of the clip)
    #[serde(default)]
    pub hook: String,

    /// Main talking points, in order
    #[serde(default)]
    pub main_points: Vec<String>,

    /// Closing call to action, if any
    #[serde(default)]
    pub call_to_action: String,
}

/// The completed result of one job, durably attached to a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipResult {
    /// Platform the media came from; always matches the job's platform
    pub platform: Platform,

    /// Clip title (user-supplied, or derived from platform metadata)
    pub title: String,

    /// Full transcript text
    pub transcript: String,

    /// Derived script components
    pub components: ScriptComponents,

    /// True when the transcription response was malformed and a placeholder
    /// fallback was used instead of failing the job
    #[serde(default)]
    pub degraded: bool,

    /// Original submitted URL
    pub source_url: String,

    /// Acquisition strategy that produced the media
    pub strategy: String,
}
