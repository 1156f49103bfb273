//! # Fuel Client
//!
//! Talks to Fuel asset servers on top of the [`fuel_cache::LocalCache`].
//!
//! Every public operation answers with a [`fuel_core::result::FuelResult`]; failures are logged
//! where they happen and never panic.
//!
//! ## Usage
//!
//! ```no_run
//! use fuel_client::FuelClient;
//! use fuel_core::prelude::*;
//!
//! # async fn run() -> fuel_client::error::Result<()> {
//! let client = FuelClient::new(ClientConfig::default())?;
//! let (result, path) = client
//!     .download_model_url("https://fuel.gazebosim.org/1.0/OpenRobotics/models/Ambulance")
//!     .await;
//! if result.is_ok() {
//!     println!("Ambulance is at {:?}", path);
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod client;
pub mod error;
pub mod iter;
pub mod json;
pub mod rest;
pub mod url_parser;
pub mod upload;

pub use batch::DEFAULT_JOBS;
pub use client::{FuelClient, RESOURCE_VERSION_HEADER};
pub use error::FuelClientError;
pub use iter::{ModelIter, ResourceIter, WorldIter};
pub use rest::RestClient;
pub use url_parser::UrlParser;
