// Version information module for kupo
//
// Provides version constants for the kupo crate

/// Version string for the kupo crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
