use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Tensor};

/// Sentence vectors from `[batch, seq, hidden]` states: the mean over the
/// tokens the attention mask keeps, scaled to unit length. A row with no
/// kept tokens comes out as zeros.
pub fn sentence_embeddings(hidden: &Tensor, attention_mask: &Tensor) -> Result<Vec<Vec<f32>>> {
    hidden.dims3().map_err(|_| anyhow!("hidden states must be [batch, seq, hidden], got {:?}", hidden.dims()))?;
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let kept = mask.sum(1)?.clamp(1f32, f32::MAX)?;
    let mean = summed.broadcast_div(&kept)?;
    let norm = mean.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-12f32, f32::MAX)?;
    let unit = mean.broadcast_div(&norm)?;
    Ok(unit.to_dtype(DType::F32)?.to_device(&Device::Cpu)?.to_vec2()?)
}
