//! # leafcheck
//!
//! Leaf disease identifier — upload a photo of a leaf, have a multimodal AI
//! model look at it, and show the diagnosis it writes back.
//!
//! The crate does not look at pixels itself. It re-encodes the image as a
//! base64 PNG, sends it to one of two backends, and turns the reply (or the
//! failure) into a result the UI can display.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use leafcheck::config::Config;
//! use leafcheck::pipeline::AnalysisClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Backend mode, URLs and the API key env var name come from the config
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!     let client = AnalysisClient::from_config(&config)?;
//!
//!     let image = image::open("leaf.jpg")?;
//!     match client.analyze(&image).await {
//!         Ok(diagnosis) => println!("{}", diagnosis.text),
//!         Err(e) => eprintln!("Failed to analyze the image: {e}"),
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Backends
//!
//! | Mode | Request | Credential |
//! |------|---------|------------|
//! | `proxy` | `POST <url>/analyze_leaf` with `{"image": "<base64>"}` | none |
//! | `direct` | `POST` to the vendor messages endpoint with an image block and a fixed prompt | `x-api-key` |
//!
//! ## Modules
//!
//! - [`ai`] — Backend trait and the proxy / direct implementations
//! - [`codec`] — PNG + base64 encoding, upload decoding
//! - [`config`] — Configuration types and loading/saving
//! - [`error`] — The [`AnalysisError`](error::AnalysisError) kinds
//! - [`pipeline`] — [`AnalysisClient`](pipeline::AnalysisClient), tying codec and backend together
//! - `server` — The upload web form (feature `web`)

pub mod ai;
pub mod codec;
pub mod config;
pub mod error;
pub mod pipeline;
#[cfg(feature = "web")]
pub mod server;
