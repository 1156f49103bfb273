//! # Fetch Example
//!
//! Downloads a model (and its dependencies) or a world from a Fuel server,
//! then lists what the local cache holds.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --example fetch --features "client" -- \
//!     https://fuel.gazebosim.org/1.0/OpenRobotics/models/Ambulance
//! ```

use fuel::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let url = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: fetch <model or world url>"))?;

    let mut config = ClientConfig::default();
    let config_path = default_config_path();
    if config_path.exists() {
        config.load_config(&config_path)?;
    }

    let client = FuelClient::new(config)?;
    let (result, path) = client.fetch_resource(&url).await;
    println!("{result}");
    if let Some(path) = path {
        println!("Stored at {}", path.display());
    }

    println!("Cached models:");
    for model in client.cache().all_models() {
        println!("  {}", model.identification().unique_name());
    }

    Ok(())
}
