//! IPC message types between the companion and its collaborators

use serde::{Deserialize, Serialize};

use crate::hook::HookSummary;
use crate::physics::PhysicsParams;
use crate::types::PixelRect;

/// Requests sent from collaborators (capture backend, hotkey daemon, CLI)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum CompanionRequest {
    /// Re-run the current ROI, or start a selection if there is none
    Reprocess,

    /// Show a status notice; `duration_ms == 0` keeps it until replaced
    ShowStatus { text: String, duration_ms: u64 },

    /// Show recognized text in the result panel
    ShowResult { text: String },

    HideResult,

    /// The last `AreaSelected` has been handled
    ProcessingComplete,

    /// Hot-swap spring coefficients
    SetPhysicsParams(PhysicsParams),

    /// Query the current hook state
    GetHookState,

    /// Health check
    Ping,

    /// Request graceful shutdown
    Shutdown,
}

/// Events broadcast to every client, and direct replies
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum CompanionResponse {
    /// Capture this region (physical pixels)
    AreaSelected { rect: PixelRect },

    /// The widget hooked to or unhooked from a window
    HookChanged(HookSummary),

    /// Reply to `GetHookState`
    HookState(HookSummary),

    /// Health check response
    Pong,

    /// Acknowledgment that request was processed
    Ready,

    /// Error occurred
    Error(String),
}
