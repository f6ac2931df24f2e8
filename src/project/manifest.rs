use miette::Diagnostic;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const MANIFEST_NAME: &str = "vulnsynth.toml";

#[derive(Debug, Error, Diagnostic)]
pub enum ManifestError {
    #[error("failed to read {}: {error}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("invalid setting in {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub synth: SynthSection,
    #[serde(default)]
    pub nops: NopSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SynthSection {
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_count")]
    pub count: usize,
}

impl Default for SynthSection {
    fn default() -> Self {
        Self {
            seed: None,
            count: default_count(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NopSection {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_probability")]
    pub probability: f64,
}

impl Default for NopSection {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            probability: default_probability(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub formatter: Option<String>,
}

fn default_count() -> usize {
    1
}

fn default_enabled() -> bool {
    true
}

fn default_probability() -> f64 {
    0.25
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|error| ManifestError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, ManifestError> {
        let mut manifest: Manifest =
            toml::from_str(content).map_err(|error| ManifestError::Parse {
                path: path.to_path_buf(),
                message: error.to_string(),
            })?;
        if !(0.0..=1.0).contains(&manifest.nops.probability) {
            return Err(ManifestError::Invalid {
                path: path.to_path_buf(),
                message: format!(
                    "nops.probability must be within 0..=1, got {}",
                    manifest.nops.probability
                ),
            });
        }
        if let Some(directory) = &manifest.output.directory {
            if directory.is_relative() {
                let root = path.parent().unwrap_or_else(|| Path::new("."));
                manifest.output.directory = Some(root.join(directory));
            }
        }
        Ok(manifest)
    }
}

/// `vulnsynth.toml` next to `input`, if there is one.
pub fn find_manifest(input: &Path) -> Option<PathBuf> {
    let dir = input.parent()?;
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let candidate = dir.join(MANIFEST_NAME);
    candidate.is_file().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manifest_uses_defaults() {
        let manifest = Manifest::parse("", Path::new("vulnsynth.toml")).expect("manifest");
        assert_eq!(manifest, Manifest::default());
        assert_eq!(manifest.synth.count, 1);
        assert!(manifest.nops.enabled);
        assert_eq!(manifest.nops.probability, 0.25);
    }

    #[test]
    fn sections_are_read() {
        let manifest = Manifest::parse(
            r#"
[synth]
seed = 99
count = 4

[nops]
enabled = false

[output]
directory = "out"
formatter = "clang-format"
"#,
            Path::new("/work/vulnsynth.toml"),
        )
        .expect("manifest");
        assert_eq!(manifest.synth.seed, Some(99));
        assert_eq!(manifest.synth.count, 4);
        assert!(!manifest.nops.enabled);
        assert_eq!(manifest.output.directory, Some(PathBuf::from("/work/out")));
        assert_eq!(manifest.output.formatter.as_deref(), Some("clang-format"));
    }

    #[test]
    fn probability_out_of_range_is_rejected() {
        let err = Manifest::parse("[nops]\nprobability = 1.5\n", Path::new("vulnsynth.toml"))
            .expect_err("invalid");
        assert!(matches!(err, ManifestError::Invalid { .. }));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Manifest::parse("[synth]\nsed = 1\n", Path::new("vulnsynth.toml"))
            .expect_err("typo");
        assert!(matches!(err, ManifestError::Parse { .. }));
    }

    #[test]
    fn manifest_is_found_next_to_the_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("program.json");
        assert_eq!(find_manifest(&input), None);
        fs::write(dir.path().join(MANIFEST_NAME), "").expect("write");
        assert_eq!(find_manifest(&input), Some(dir.path().join(MANIFEST_NAME)));
    }
}
