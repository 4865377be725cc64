//! Content-addressed PLY cache
//!
//! Artifacts are keyed by the SHA-256 of the source image and live as
//! `<hex>.ply` in a flat directory.
//!
//! # Artifact States
//!
//! | State | On disk | Description |
//! |-------|---------|-------------|
//! | Absent | nothing under the canonical name | Next request generates |
//! | Generating | staging dir only | Other requests join the running generation |
//! | Ready | `<hex>.ply`, fresh mtime | Served as a cache hit |
//! | Stale | `<hex>.ply`, mtime past retention | Evicted on next lookup or sweep |

pub mod coordinator;
pub mod fingerprint;
pub mod normalize;
pub mod store;

pub use coordinator::{Coordinator, Resolution};
pub use fingerprint::{fingerprint_file, fingerprint_reader, Fingerprint, FingerprintBuilder};
pub use normalize::{normalize, normalize_file, NormalizeReport, MAX_HEADER_LINES};
pub use store::{
    artifact_file_name, is_fresh, parse_artifact_file_name, sweep_dir, Artifact, ArtifactStore,
};
