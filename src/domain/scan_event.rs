//! Library scan progress events.
//!
//! A local library scan reports its lifecycle through [`LocalScanEvent`]s,
//! published on [`LOCAL_SCAN_TOPIC`] so browser clients can render progress
//! while the scan runs.
//!
//! Every scan event travels as an ordinary `event: event` frame. Clients
//! that listened for the dedicated `LOCAL_SCAN_*` SSE event names switch on
//! the payload's `event_type` instead:
//!
//! | SSE event name         | `event_type` |
//! |------------------------|--------------|
//! | `LOCAL_SCAN_STARTED`   | `started`    |
//! | `LOCAL_SCAN_BATCH`     | `batch`      |
//! | `LOCAL_SCAN_COMPLETED` | `completed`  |
//! | `LOCAL_SCAN_FAILED`    | `failed`     |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Topic carrying every local scan event.
pub const LOCAL_SCAN_TOPIC: &str = "library.local-scan";

/// One game found on disk during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScannedGame {
    /// Display title.
    pub title: String,
    /// Platform-specific identifier.
    pub platform_game_id: String,
    /// Platform the game was found under.
    pub platform_name: String,
    /// Platform family (e.g. `"steam"`, `"emulator"`).
    pub platform_type: String,
    /// Install directory, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<String>,
    /// Whether the game is currently installed.
    pub is_installed: bool,
    /// Last time the game was played.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_played: Option<DateTime<Utc>>,
    /// Total playtime in minutes.
    #[serde(default)]
    pub playtime_minutes: u64,
}

/// Lifecycle event of a local library scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LocalScanEvent {
    /// A platform scan began.
    Started {
        /// Platform being scanned.
        platform_name: String,
        /// Number of candidate entries, if known up front.
        total_games: u64,
    },

    /// A batch of games was discovered.
    Batch {
        /// Platform being scanned.
        platform_name: String,
        /// Games found so far on this platform.
        games_found: u64,
        /// The games in this batch.
        games: Vec<ScannedGame>,
    },

    /// The scan finished, possibly with unreadable paths.
    Completed {
        /// Platform that was scanned.
        platform_name: String,
        /// Total games found.
        final_count: u64,
        /// `false` if any path could not be read.
        success: bool,
        /// Paths that could not be read.
        #[serde(default)]
        failed_paths: Vec<String>,
        /// Number of paths that could not be read.
        #[serde(default)]
        failed_paths_count: u64,
    },

    /// The scan aborted.
    Failed {
        /// Platform that was scanned.
        platform_name: String,
        /// Why the scan failed.
        message: String,
    },
}

impl LocalScanEvent {
    /// Platform the event refers to.
    #[must_use]
    pub fn platform_name(&self) -> &str {
        match self {
            Self::Started { platform_name, .. }
            | Self::Batch { platform_name, .. }
            | Self::Completed { platform_name, .. }
            | Self::Failed { platform_name, .. } => platform_name,
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Batch { .. } => "batch",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}
