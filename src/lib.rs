//! Script-to-speech pipeline: per-line synthesis against a polling speech
//! server with a local fallback, track assembly, and intro/outro wrapping.

pub mod args;
pub mod audio;
pub mod chatterbox;
pub mod combine;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod gtts;
pub mod intro_outro;
pub mod naming;
pub mod persona;
pub mod reddit;
pub mod render;
pub mod script;
pub mod tts;
pub mod utils;
