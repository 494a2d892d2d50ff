//! Voice command table and dispatch.
//!
//! ```text
//! Utterance ─▶ CommandTable::lookup ─▶ [CommandEntry…] ─▶ RemoteClient::execute
//!                 clip phrases first         in table order     one action at a time
//! ```

pub mod dispatch;
pub mod table;

pub use dispatch::dispatch;
pub use table::{CommandEntry, CommandTable};
