//! Player configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Player configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    /// Directory of frames, played in lexical order and looped
    pub frames_dir: PathBuf,
    /// JSON script of detection cycles and input events
    pub script_path: Option<PathBuf>,
    /// Engine config file; falls back to `CINEFOCUS_*` variables
    pub engine_config_path: Option<PathBuf>,
    /// Target render rate
    pub fps: f64,
    /// Stop after this many frames
    pub max_frames: Option<u64>,
    /// Where composited snapshots are written
    pub snapshot_dir: Option<PathBuf>,
    /// Write a snapshot every N frames
    pub snapshot_every: u64,
    /// Prometheus listener address
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            frames_dir: PathBuf::from("frames"),
            script_path: None,
            engine_config_path: None,
            fps: 30.0,
            max_frames: None,
            snapshot_dir: None,
            snapshot_every: 30,
            metrics_addr: None,
        }
    }
}

impl PlayerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            frames_dir: std::env::var("CINEFOCUS_FRAMES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.frames_dir),
            script_path: std::env::var("CINEFOCUS_SCRIPT").ok().map(PathBuf::from),
            engine_config_path: std::env::var("CINEFOCUS_CONFIG").ok().map(PathBuf::from),
            fps: std::env::var("CINEFOCUS_FPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|fps: &f64| *fps > 0.0)
                .unwrap_or(defaults.fps),
            max_frames: std::env::var("CINEFOCUS_MAX_FRAMES")
                .ok()
                .and_then(|s| s.parse().ok()),
            snapshot_dir: std::env::var("CINEFOCUS_SNAPSHOT_DIR").ok().map(PathBuf::from),
            snapshot_every: std::env::var("CINEFOCUS_SNAPSHOT_EVERY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &u64| *n > 0)
                .unwrap_or(defaults.snapshot_every),
            metrics_addr: std::env::var("CINEFOCUS_METRICS_ADDR")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Whether frame `n` (1-based) should be written out.
    pub fn wants_snapshot(&self, n: u64) -> bool {
        self.snapshot_dir.is_some() && n % self.snapshot_every.max(1) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_cadence() {
        let config = PlayerConfig {
            snapshot_dir: Some(PathBuf::from("/tmp/out")),
            snapshot_every: 10,
            ..PlayerConfig::default()
        };
        assert!(!config.wants_snapshot(9));
        assert!(config.wants_snapshot(10));
        assert!(!PlayerConfig::default().wants_snapshot(30));
    }
}
