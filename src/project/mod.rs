pub mod manifest;

pub use manifest::{find_manifest, Manifest, ManifestError, MANIFEST_NAME};
