// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Boundary to fused attention implementations.

use candle_core::Tensor;

use crate::error::{AttnError, Result};
use crate::kernels::config::{AttentionParams, AttnBiasType};
use crate::kernels::layout::AttentionInput;
use crate::kernels::mask::validate_mask;

/// Check everything a backend relies on before it runs.
///
/// # Errors
/// Returns `InvalidConfig` for out-of-range parameters or a bias that does not
/// match the bias type, and a shape error for a malformed bias or mask.
pub fn validate_call(
    input: &AttentionInput,
    bias: Option<&Tensor>,
    mask: &Tensor,
    params: &AttentionParams,
) -> Result<()> {
    params.validate()?;
    let dims = input.dims();
    validate_mask(mask, &dims)?;

    match (params.bias_type, bias) {
        (AttnBiasType::NoBias, None) => Ok(()),
        (AttnBiasType::NoBias, Some(_)) => Err(AttnError::InvalidConfig(
            "bias tensor given but bias type is NoBias".into(),
        )),
        (bias_type, None) => Err(AttnError::InvalidConfig(format!(
            "bias type {bias_type:?} requires a bias tensor"
        ))),
        (_, Some(bias)) => {
            let expected = dims.bias_shape();
            if bias.dims() == expected {
                Ok(())
            } else {
                Err(AttnError::shape("bias", &expected, bias.dims()))
            }
        }
    }
}

/// A fused scaled dot-product attention implementation.
///
/// Backends receive packed inputs that already passed shape validation and
/// return only the attention-weighted encoding `[batch, seq_q, heads, head_dim]`.
/// Attention probabilities are never exposed.
pub trait FusedAttentionKernel: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Whether this backend can run the call as configured.
    fn supports(&self, input: &AttentionInput, bias: Option<&Tensor>, params: &AttentionParams)
        -> bool;

    /// Whether the full score matrix is held in memory.
    fn materializes_scores(&self) -> bool {
        true
    }

    /// Run attention.
    ///
    /// # Arguments
    /// * `input` - Packed Q/K/V
    /// * `bias` - Additive bias `[1, heads, seq_q, seq_kv]`, required unless `NoBias`
    /// * `mask` - Mask `[batch, 1, seq_q, seq_kv]`, non-zero entries are excluded
    /// * `seed` - Dropout seed
    /// * `params` - Selectors, scale, dropout and training flag
    ///
    /// # Errors
    /// Returns an error if the backend rejects the inputs or the computation fails.
    fn forward(
        &self,
        input: &AttentionInput,
        bias: Option<&Tensor>,
        mask: &Tensor,
        seed: Option<u64>,
        params: &AttentionParams,
    ) -> Result<Tensor>;
}
