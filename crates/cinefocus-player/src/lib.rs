//! Headless player for the cinematic focus engine.
//!
//! Drives a [`cinefocus_media::RenderLoop`] from a directory of frames and a
//! JSON script of detection cycles and user input, writing composited
//! snapshots to disk.

pub mod config;
pub mod frames;
pub mod script;

pub use config::PlayerConfig;
pub use frames::ImageSequenceSource;
pub use script::{Script, ScriptAction, ScriptEvent, ScriptedDetector};
