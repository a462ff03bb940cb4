//! Runwatch Core Library
//!
//! This crate runs an external test engine against a set of test scripts and
//! follows the run: it launches the engine process, listens for the JSON
//! progress snapshots the engine sends over UDP, answers the engine's
//! interactive yes/no prompts on its stdin, and reduces all of that to one
//! cancellable run session with a single final state.
//!
//! # Key Features
//!
//! - **Run Sessions**: Start, observe and cancel one engine run
//! - **Status Telemetry**: Decode run-status snapshots from UDP datagrams
//! - **Interactive Prompts**: Detect confirmation requests in engine output
//! - **Run Profiles**: Named, YAML-based run configurations
//! - **Error Handling**: Titled error types for every failure a view shows
//!
//! # Examples
//!
//! Running two scripts and printing every status snapshot:
//!
//! ```no_run
//! use runwatch_core::config::SessionSettings;
//! use runwatch_core::run_target::RunTarget;
//! use runwatch_core::session::{RunSession, SessionEvent};
//!
//! # async fn example() -> runwatch_core::error::Result<()> {
//! let target = RunTarget::new("python3 run_ctf.py", ["scripts/a.json", "scripts/b.json"])?;
//! let (handle, mut events) = RunSession::start(target, SessionSettings::default());
//!
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::Status(status) = event {
//!         println!("{:.1}s {}", status.elapsed_time, status.status);
//!     }
//! }
//!
//! println!("Run ended: {}", handle.wait().await);
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod file_handling;
pub mod interpolation;
pub mod listener;
pub mod process;
pub mod run_target;
pub mod session;
pub mod status;
