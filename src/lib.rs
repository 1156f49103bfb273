pub use fuel_core::*;

#[cfg(feature = "cache")]
pub mod cache {
    pub use fuel_cache::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use fuel_client::*;
}

pub mod prelude {
    pub use fuel_core::prelude::*;

    #[cfg(feature = "cache")]
    pub use fuel_cache::LocalCache;

    #[cfg(feature = "client")]
    pub use fuel_client::{FuelClient, ModelIter, RestClient, WorldIter};
}
