#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::field_reassign_with_default,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use,
    clippy::single_match_else,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

pub mod bot;
pub mod channels;
pub mod commands;
pub mod config;
pub mod dialogue;
pub mod doctor;
pub mod health;
pub mod util;

pub use config::Config;
