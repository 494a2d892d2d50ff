//! Voice-activated OBS remote control.
//!
//! Microphone audio is decoded into utterances, matched against a
//! wake-word command table and turned into OBS WebSocket requests
//! (recording, replay buffer, clip saving).

pub mod audio;
pub mod commands;
pub mod config;
pub mod pipeline;
pub mod remote;
pub mod stt;
