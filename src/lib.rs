//! Onboard helps new employees practice workplace scenarios with an AI mentor.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the exercise catalog, the per-exercise session state
//!   machine, stream decoding with follow-up questions, and the mentor chat.
//! - [`api`] defines the chat completion payloads sent to the generation
//!   provider.
//! - [`cli`] parses arguments and runs the interactive terminal commands.
//! - [`utils`] holds logging setup.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
