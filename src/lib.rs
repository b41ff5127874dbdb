//! # The canfuzz Crate
//! `canfuzz` is an engine for capturing, replaying and fuzzing CAN bus traffic. Processing is split into small modules that are chained together into a pipeline, which the [`engine::Engine`] drives from a dedicated thread.
//!
//! On top of the engine the crate ships a UDS session correlator that pairs diagnostic requests with their responses, and an anomaly detector that learns the normal behaviour of a bus and confirms which frames trigger a change.
//!
//! ## Engine Example
//!
//! The following snippet loads the analyzer twice into the same pipe, once capturing frames and once injecting them.
//!
//! ```rust
//! use canfuzz::engine::{Engine, EngineConfig, Registry};
//! use canfuzz::module::Params;
//!
//! fn engine_example() -> canfuzz::Result<()> {
//!     let mut engine = Engine::new(EngineConfig::default(), Registry::default());
//!     engine.load(
//!         &[("analyze".to_string(), Params::default())],
//!         &[
//!             ("analyze".to_string(), Params::from([("action", "read")])),
//!             ("analyze".to_string(), Params::from([("action", "write"), ("pipe", "2")])),
//!         ],
//!     )?;
//!
//!     engine.start()?;
//!     let result = engine.invoke(0, "status");
//!     println!("{}", result);
//!     engine.stop();
//!     Ok(())
//! }
//! ```
//!
//! ## Anomaly Detection
//!
//! The [`analyze`] module learns a baseline from one capture, replays a second capture against it and finally injects each suspicious frame back onto the bus to find out which one causes the observed behaviour.
//!

pub mod analyze;
pub mod can;
pub mod cmdres;
pub mod engine;
mod error;
pub mod isotp;
pub mod module;
pub mod output;
pub mod uds;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub use tokio_stream::{Stream, StreamExt};
