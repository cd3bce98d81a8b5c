use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Tensor};
use tokenizers::Tokenizer;

/// XLM-R pad token id.
const PAD_ID: u32 = 1;

/// Token tensors for one forward pass, each `[batch, seq]`. Sequences are
/// cut at `max_len` and padded to the longest one in the batch.
pub struct EncodedBatch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

pub fn encode_batch(tokenizer: &Tokenizer, texts: &[String], max_len: usize, device: &Device) -> Result<EncodedBatch> {
    if texts.is_empty() {
        return Err(anyhow!("cannot encode an empty batch"));
    }
    let encodings = tokenizer.encode_batch(texts.to_vec(), true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let seq = encodings.iter().map(|e| e.get_ids().len().min(max_len)).max().unwrap_or(0).max(1);

    let mut ids = Vec::with_capacity(texts.len() * seq);
    let mut mask = Vec::with_capacity(texts.len() * seq);
    for enc in &encodings {
        let kept = enc.get_ids().len().min(max_len);
        ids.extend_from_slice(&enc.get_ids()[..kept]);
        ids.resize(ids.len() + seq - kept, PAD_ID);
        mask.extend_from_slice(&enc.get_attention_mask()[..kept]);
        mask.resize(mask.len() + seq - kept, 0);
    }
    let shape = (texts.len(), seq);
    Ok(EncodedBatch {
        input_ids: Tensor::from_vec(ids, shape, device)?,
        attention_mask: Tensor::from_vec(mask, shape, device)?,
        token_type_ids: Tensor::zeros(shape, DType::I64, device)?,
    })
}
