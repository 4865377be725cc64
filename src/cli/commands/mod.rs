//! CLI command implementations

pub mod config;
pub mod fingerprint;
pub mod normalize;
pub mod serve;
pub mod sweep;

pub use config::execute as config;
pub use fingerprint::execute as fingerprint;
pub use normalize::execute as normalize;
pub use serve::execute as serve;
pub use sweep::execute as sweep;
