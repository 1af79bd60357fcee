// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Attention masks.
//!
//! The kernel mask has shape `[batch, 1, seq_q, seq_kv]`. A zero entry allows
//! attention, any non-zero entry masks the position out. Masks are passed to
//! backends exactly as the caller built them.

use candle_core::{DType, Device, Tensor};

use crate::error::{AttnError, Result};
use crate::kernels::config::AttnMaskType;
use crate::kernels::layout::QkvDims;

/// Mask that allows every position.
///
/// # Errors
/// Propagates tensor allocation errors.
pub fn zeros_mask(dims: &QkvDims, dtype: DType, device: &Device) -> Result<Tensor> {
    Ok(Tensor::zeros(&dims.mask_shape(), dtype, device)?)
}

/// Padding mask from per-batch valid lengths.
///
/// Position `(b, 0, i, j)` is masked when `i >= q_lens[b]` or `j >= kv_lens[b]`.
///
/// # Errors
/// Returns `InvalidConfig` if the length slices do not match the batch size or
/// a length exceeds its sequence length.
pub fn padding_mask(
    q_lens: &[usize],
    kv_lens: &[usize],
    dims: &QkvDims,
    device: &Device,
) -> Result<Tensor> {
    if q_lens.len() != dims.batch || kv_lens.len() != dims.batch {
        return Err(AttnError::InvalidConfig(format!(
            "expected {} sequence lengths, got {} query and {} key/value",
            dims.batch,
            q_lens.len(),
            kv_lens.len()
        )));
    }
    if let Some(len) = q_lens.iter().find(|&&l| l > dims.seq_q) {
        return Err(AttnError::InvalidConfig(format!(
            "query length {len} exceeds sequence length {}",
            dims.seq_q
        )));
    }
    if let Some(len) = kv_lens.iter().find(|&&l| l > dims.seq_kv) {
        return Err(AttnError::InvalidConfig(format!(
            "key/value length {len} exceeds sequence length {}",
            dims.seq_kv
        )));
    }

    let mut data = Vec::with_capacity(dims.batch * dims.seq_q * dims.seq_kv);
    for (&q_len, &kv_len) in q_lens.iter().zip(kv_lens) {
        for i in 0..dims.seq_q {
            for j in 0..dims.seq_kv {
                data.push(u8::from(i >= q_len || j >= kv_len));
            }
        }
    }
    Ok(Tensor::from_vec(data, &dims.mask_shape(), device)?)
}

/// Causal mask of shape `[1, 1, seq_q, seq_kv]`.
///
/// Entry `(i, j)` is masked when `j > i`. Query and key positions are aligned
/// at index 0.
///
/// # Errors
/// Propagates tensor allocation errors.
pub fn causal_mask(seq_q: usize, seq_kv: usize, device: &Device) -> Result<Tensor> {
    let data: Vec<u8> = (0..seq_q)
        .flat_map(|i| (0..seq_kv).map(move |j| u8::from(j > i)))
        .collect();
    Ok(Tensor::from_vec(data, (1, 1, seq_q, seq_kv), device)?)
}

/// Check that a mask has shape `[batch, 1, seq_q, seq_kv]`.
///
/// # Errors
/// Returns `RankMismatch` or `ShapeMismatch`.
pub fn validate_mask(mask: &Tensor, dims: &QkvDims) -> Result<()> {
    let expected = dims.mask_shape();
    if mask.rank() != expected.len() {
        return Err(AttnError::rank("mask", expected.len(), mask.dims()));
    }
    if mask.dims() != expected {
        return Err(AttnError::shape("mask", &expected, mask.dims()));
    }
    Ok(())
}

/// Combine the caller's mask with the causal constraint implied by `mask_type`.
///
/// Returns `None` when nothing is masked, otherwise a `u8` tensor broadcastable
/// to `[batch, 1, seq_q, seq_kv]` holding 1 at excluded positions.
///
/// # Errors
/// Propagates tensor errors.
pub fn effective_mask(
    mask: &Tensor,
    mask_type: AttnMaskType,
    dims: &QkvDims,
) -> Result<Option<Tensor>> {
    let padding = if mask_type.uses_padding() {
        Some(mask.ne(&mask.zeros_like()?)?)
    } else {
        None
    };
    let causal = if mask_type.is_causal() {
        Some(causal_mask(dims.seq_q, dims.seq_kv, mask.device())?)
    } else {
        None
    };

    let combined = match (padding, causal) {
        (Some(p), Some(c)) => Some(p.broadcast_maximum(&c)?),
        (Some(m), None) | (None, Some(m)) => Some(m),
        (None, None) => None,
    };
    Ok(combined)
}
