//! Line-oriented TCP chat with accounts and per-user colours.
//!
//! Users connect with any line-based client (the bundled `relay` mode or
//! `nc`), `register` or `login`, and then chat. Each module has one job:
//!
//! - [`hub`] owns the set of joined clients and fans broadcasts out to them,
//!   evicting any client whose queue cannot take a line.
//! - [`session`] runs the per-connection protocol state machine.
//! - [`registry`] stores accounts, login flags and colours behind one lock.
//! - [`writer`] drains a connection's outgoing queue onto its socket.
//! - [`command`] and [`palette`] parse user input and colour names.
//! - [`server`], [`relay`] and [`cli`] are the process-level surfaces.
//!
//! Unit tests live next to each module; `tests/` drives the server over TCP
//! and through the compiled binary.

pub mod cli;
pub mod command;
pub mod error;
pub mod hub;
pub mod palette;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod writer;
