//! Debug adapter protocol server for conversational dialog engines.
//!
//! The engine reports every evaluated dialog step through [`debugger::DialogDebugAdapter::step`]
//! and wraps every turn into [`debugger::DialogDebugAdapter::begin_turn`]. A debugger client
//! attached over TCP can then set breakpoints against the declarative sources, pause and step
//! individual turns and inspect their memory while other turns keep running.

pub mod config;
pub mod dap;
pub mod debugger;
pub mod log;
