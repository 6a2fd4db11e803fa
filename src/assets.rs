use crate::scene_graph::ModelAsset;
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub mod gltf_import;

/// Keyed, reference-counted cache of immutable model assets shared by skeletal mesh instances.
#[derive(Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<ModelAsset>>,
    model_sources: HashMap<String, String>,
    model_refs: HashMap<String, usize>,
    model_reloads: HashMap<String, u32>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `key` from `gltf_path` on first retain; later retains only bump the count.
    pub fn retain_model(&mut self, key: &str, gltf_path: Option<&str>) -> Result<()> {
        if self.models.contains_key(key) {
            *self.model_refs.entry(key.to_string()).or_insert(0) += 1;
            if let Some(path) = gltf_path {
                self.model_sources.insert(key.to_string(), path.to_string());
            }
            return Ok(());
        }
        let path_owned = if let Some(path) = gltf_path {
            path.to_string()
        } else if let Some(stored) = self.model_sources.get(key) {
            stored.clone()
        } else {
            return Err(anyhow!("Model '{key}' is not loaded and no GLTF path provided to retain it."));
        };
        let asset = gltf_import::load_model_from_gltf(&path_owned)
            .with_context(|| format!("Failed to load model '{key}' from {path_owned}"))?;
        log::info!(
            "[assets] loaded model '{key}' ({} nodes, {} skins, {} animations)",
            asset.node_count(),
            asset.skins().len(),
            asset.animations().len()
        );
        if asset.default_mesh_node().is_none() {
            log::warn!("[assets] model '{key}' has no mesh-bearing node; skeletal meshes cannot draw it");
        }
        self.models.insert(key.to_string(), Arc::new(asset));
        self.model_sources.insert(key.to_string(), path_owned);
        self.model_refs.insert(key.to_string(), 1);
        Ok(())
    }

    /// Registers an asset built in memory. Replaces any asset under the same key.
    pub fn insert_model(&mut self, key: &str, asset: ModelAsset) -> Arc<ModelAsset> {
        let asset = Arc::new(asset);
        self.models.insert(key.to_string(), Arc::clone(&asset));
        *self.model_refs.entry(key.to_string()).or_insert(0) += 1;
        asset
    }

    pub fn release_model(&mut self, key: &str) -> bool {
        if let Some(count) = self.model_refs.get_mut(key) {
            if *count > 0 {
                *count -= 1;
                if *count == 0 {
                    self.model_refs.remove(key);
                    self.models.remove(key);
                    self.model_sources.remove(key);
                    self.model_reloads.remove(key);
                }
                return true;
            }
        }
        false
    }

    /// Re-imports `key` from its recorded source. Instances holding the old `Arc` keep it, so
    /// they must be rebuilt to pick up changed nodes or animations.
    pub fn reload_model(&mut self, key: &str) -> Result<Arc<ModelAsset>> {
        let path = self
            .model_sources
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("Model '{key}' has no recorded GLTF source to reload from"))?;
        let asset = Arc::new(
            gltf_import::load_model_from_gltf(&path)
                .with_context(|| format!("Failed to reload model '{key}' from {path}"))?,
        );
        let reloads = self.model_reloads.entry(key.to_string()).or_insert(0);
        *reloads += 1;
        match self.models.insert(key.to_string(), Arc::clone(&asset)) {
            Some(previous) => log::info!(
                "[assets] reloaded model '{key}' (reload #{reloads}): nodes {} -> {}, animations {} -> {}, {} instances still on the old asset",
                previous.node_count(),
                asset.node_count(),
                previous.animations().len(),
                asset.animations().len(),
                Arc::strong_count(&previous) - 1
            ),
            None => log::info!("[assets] reloaded model '{key}' (reload #{reloads})"),
        }
        Ok(asset)
    }

    pub fn reload_count(&self, key: &str) -> u32 {
        self.model_reloads.get(key).copied().unwrap_or(0)
    }

    pub fn model(&self, key: &str) -> Option<Arc<ModelAsset>> {
        self.models.get(key).cloned()
    }

    pub fn model_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.models.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn model_source(&self, key: &str) -> Option<&str> {
        self.model_sources.get(key).map(|s| s.as_str())
    }

    pub fn ref_count(&self, key: &str) -> usize {
        self.model_refs.get(key).copied().unwrap_or(0)
    }
}
