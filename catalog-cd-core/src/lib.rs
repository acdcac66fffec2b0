//! catalog-cd library exports

pub mod attestation;
pub mod catalog;
pub mod contract;
pub mod error;
pub mod externals;
pub mod github;
pub mod release;
pub mod render;
pub mod transport;

pub use error::CatalogError;

/// Build version, overridable at compile time with `CATALOG_CD_VERSION`
pub fn version() -> &'static str {
    option_env!("CATALOG_CD_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}
