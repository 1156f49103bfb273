pub mod config;
pub mod error;
pub mod identifier;
pub mod manifest;
pub mod result;
pub mod traits;

pub mod prelude {
    pub use super::config::*;
    pub use super::error::*;
    pub use super::identifier::*;
    pub use super::manifest::*;
    pub use super::result::*;
    pub use super::traits::*;
}
