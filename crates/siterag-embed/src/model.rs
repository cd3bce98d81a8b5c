use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use siterag_core::traits::Embedder;

use crate::encode::encode_batch;
use crate::pool::sentence_embeddings;

pub const BGE_M3_DIM: usize = 1024;
const MAX_LEN: usize = 256;
/// Texts per forward pass.
const BATCH_SIZE: usize = 16;

/// BGE-M3 (XLM-RoBERTa) sentence embeddings loaded from local files.
pub struct EmbeddingModel {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl EmbeddingModel {
    pub fn new(model_dir: Option<&str>) -> Result<Self> {
        let device = pick_device();
        let model_dir = resolve_model_dir(model_dir)?;
        info!("Loading BGE-M3 from {}", model_dir.display());

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let weights = candle_core::pickle::read_all(model_dir.join("pytorch_model.bin"))?;
        let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        info!("BGE-M3 model loaded");
        Ok(Self { model, tokenizer, device })
    }

    /// One forward pass over `texts`, padded to the longest of them.
    fn embed_group(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let batch = encode_batch(&self.tokenizer, texts, MAX_LEN, &self.device)?;
        let hidden = self.model.forward(&batch.input_ids, &batch.attention_mask, &batch.token_type_ids, None, None, None)?;
        let vectors = sentence_embeddings(&hidden, &batch.attention_mask)?;
        if let Some(bad) = vectors.iter().find(|v| v.len() != BGE_M3_DIM) {
            return Err(anyhow!("unexpected embedding dimension {}", bad.len()));
        }
        debug!("Embedded {} texts in {:?}", texts.len(), start.elapsed());
        Ok(vectors)
    }
}

fn pick_device() -> Device {
    #[cfg(feature = "metal")]
    match Device::new_metal(0) {
        Ok(device) => {
            info!("BGE-M3 running on Metal");
            return device;
        }
        Err(e) => debug!("Metal unavailable ({}), using CPU", e),
    }
    info!("BGE-M3 running on CPU");
    Device::Cpu
}

impl Embedder for EmbeddingModel {
    fn dim(&self) -> usize {
        BGE_M3_DIM
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for group in texts.chunks(BATCH_SIZE) {
            out.extend(self.embed_group(group)?);
        }
        Ok(out)
    }
}

/// Configured directory first, then `APP_MODEL_DIR` / `MODEL_DIR`, then the
/// conventional `models/bge-m3` locations.
fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    let candidates = configured
        .map(siterag_core::config::expand_path)
        .into_iter()
        .chain(std::env::var("APP_MODEL_DIR").ok().map(PathBuf::from))
        .chain(std::env::var("MODEL_DIR").ok().map(PathBuf::from))
        .chain([Path::new("../models/bge-m3").to_path_buf(), Path::new("models/bge-m3").to_path_buf()]);
    for p in candidates {
        if p.exists() {
            return Ok(p);
        }
        debug!("Model directory {} does not exist", p.display());
    }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}
