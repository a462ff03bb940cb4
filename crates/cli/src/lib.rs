//! Runwatch CLI Library
//!
//! This crate provides the command-line interface for runwatch. It builds a
//! run from a stored profile and command-line flags, follows the run on the
//! terminal and asks the engine's yes/no confirmations.
//!
//! # Architecture
//!
//! - [`cli_args`]: Command-line argument parsing
//! - [`run_setup`]: Merging profiles and flags into a run target and settings
//! - [`run_view`]: Following session events on the terminal
//! - [`status_view`]: Text rendering of run-status snapshots
//! - [`confirmation`]: Terminal yes/no prompts
//!
//! # Examples
//!
//! The CLI binary (`rw`) can be used in several ways:
//!
//! ```bash
//! # Run a stored profile
//! rw --profile nightly
//!
//! # Run scripts directly
//! rw --engine "python3 run_ctf.py" scripts/a.json scripts/b.json
//!
//! # Override the profile's scripts and answer every prompt with yes
//! rw -P nightly --yes scripts/smoke.json
//!
//! # Dry run (don't execute, just show what would run)
//! rw --dry-run -P nightly
//! ```

pub mod cli_args;
pub mod colors;
pub mod confirmation;
pub mod run_setup;
pub mod run_view;
pub mod status_view;
