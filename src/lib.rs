//! regwizard - multi-step account registration wizard
//!
//! The library holds the form model, validation, the step state machine and the
//! collaborators it talks to; the binary wires them into a terminal UI and a few
//! maintenance subcommands.

pub mod api;
pub mod app;
pub mod availability;
pub mod config;
pub mod draft;
pub mod form;
pub mod location;
pub mod logging;
pub mod store;
pub mod ui;
pub mod validation;
pub mod wizard;
