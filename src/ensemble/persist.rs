//! Directory layout for saved ensembles
//!
//! ```text
//! <dir>/ensemble.json       manifest
//! <dir>/member_0.<ext>      one model file per member, in member order
//! <dir>/member_1.<ext>
//! ```

use super::{Ensemble, Member};
use crate::error::{Error, Result};
use crate::io::{load_model, save_model, ModelFormat, SaveConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub(crate) const MANIFEST_FILE: &str = "ensemble.json";

/// Index of a saved ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleManifest {
    pub version: String,
    pub output_size: usize,
    pub format: ModelFormat,
    /// Member file names relative to the ensemble directory
    pub members: Vec<String>,
}

impl<M: Member> Ensemble<M> {
    /// Save every member under `dir` as JSON
    pub fn save_ensemble(&self, dir: impl AsRef<Path>) -> Result<()> {
        self.save_ensemble_with(dir, &SaveConfig::default())
    }

    /// Save every member under `dir` in the configured format
    pub fn save_ensemble_with(&self, dir: impl AsRef<Path>, config: &SaveConfig) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let mut files = Vec::with_capacity(self.members.len());
        for (i, member) in self.members.iter().enumerate() {
            let file = format!("member_{i}.{}", config.format.extension());
            let mut model = member.to_model();
            model.metadata.name = format!("member_{i}");
            save_model(&model, dir.join(&file), config)?;
            files.push(file);
        }

        let manifest = EnsembleManifest {
            version: env!("CARGO_PKG_VERSION").to_string(),
            output_size: self.output_size,
            format: config.format,
            members: files,
        };
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| Error::Serialization(format!("Manifest serialization failed: {e}")))?;
        std::fs::write(dir.join(MANIFEST_FILE), json)?;

        info!(path = %dir.display(), members = self.members.len(), "saved ensemble");
        Ok(())
    }

    /// Restore an ensemble written by [`Ensemble::save_ensemble`]
    ///
    /// Members are loaded in manifest order. A member whose output size
    /// disagrees with the manifest is rejected. Registered metrics and the
    /// training configuration are not persisted.
    pub fn load_ensemble(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let raw = std::fs::read_to_string(dir.join(MANIFEST_FILE))?;
        let manifest: EnsembleManifest = serde_json::from_str(&raw)
            .map_err(|e| Error::Serialization(format!("Invalid ensemble manifest: {e}")))?;

        let mut ensemble = Self::new(manifest.output_size);
        for file in &manifest.members {
            let member = M::from_model(&load_model(dir.join(file))?)?;
            if member.output_size() != manifest.output_size {
                return Err(Error::ShapeMismatch {
                    expected: vec![manifest.output_size],
                    got: vec![member.output_size()],
                });
            }
            ensemble.add_member(member)?;
        }

        info!(path = %dir.display(), members = ensemble.len(), "loaded ensemble");
        Ok(ensemble)
    }
}
