use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::chunk::{ChunkTier, ChunkTiers};

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ChunkTierConfig {
    pub above: u64,
    pub chunk_size: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub max_file_bytes: u64,
    pub whole_buffer_limit: u64,
    pub memory_warn_ratio: f64,
    pub completion_delay_ms: u64,
    pub moov_read_limit: u64,
    pub chunk_tiers: Vec<ChunkTierConfig>,
    pub default_chunk_size: u64,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.default_chunk_size == 0 {
            bail!("default_chunk_size must be greater than zero");
        }
        for (idx, tier) in self.chunk_tiers.iter().enumerate() {
            if tier.chunk_size == 0 {
                bail!("chunk_tiers[{idx}].chunk_size must be greater than zero");
            }
        }
        if self
            .chunk_tiers
            .windows(2)
            .any(|pair| pair[0].above <= pair[1].above)
        {
            bail!("chunk_tiers must be sorted by descending `above`");
        }
        if !(self.memory_warn_ratio > 0.0 && self.memory_warn_ratio <= 1.0) {
            bail!(
                "memory_warn_ratio must be within (0, 1], got {}",
                self.memory_warn_ratio
            );
        }
        if self.whole_buffer_limit > self.max_file_bytes {
            bail!(
                "whole_buffer_limit {} exceeds max_file_bytes {}",
                self.whole_buffer_limit,
                self.max_file_bytes
            );
        }
        Ok(())
    }

    pub fn chunk_tiers(&self) -> ChunkTiers {
        ChunkTiers::new(
            self.chunk_tiers
                .iter()
                .map(|t| ChunkTier {
                    above: t.above,
                    chunk_size: t.chunk_size,
                })
                .collect(),
            self.default_chunk_size,
        )
    }
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p).with_context(|| format!("reading config {}", p.display()))?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let config: Config = serde_yaml::from_slice(&bytes).context("parsing config")?;
    config.validate()?;

    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig { config, config_hash })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)
}
