// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Vendor flash-attention backend.
//!
//! Dispatches to the `candle-flash-attn` CUDA kernels when the `flash-attn`
//! feature is enabled. The kernel consumes separate `[batch, seq, heads, head_dim]`
//! tensors, so packed inputs are sliced back into their slots first.
//!
//! Restrictions of the vendor kernel:
//! - CUDA device, `f16` or `bf16`
//! - `head_dim` a multiple of 8, at most 256
//! - no bias, no padding mask, no dropout
//! - causal masking only when `seq_q == seq_kv` (the kernel aligns the causal
//!   diagonal to the bottom-right for cross-attention)

use candle_core::{DType, Tensor};

use crate::error::{AttnError, Result};
use crate::kernels::backend::FusedAttentionKernel;
use crate::kernels::config::{AttentionParams, AttnBiasType, AttnMaskType};
use crate::kernels::layout::AttentionInput;

/// Largest head dimension the vendor kernel accepts.
pub const MAX_HEAD_DIM: usize = 256;

/// Check if the flash-attention backend is compiled in and a CUDA device exists.
#[must_use]
pub fn has_flash_support() -> bool {
    #[cfg(feature = "flash-attn")]
    {
        use candle_core::Device;
        matches!(Device::cuda_if_available(0), Ok(Device::Cuda(_)))
    }

    #[cfg(not(feature = "flash-attn"))]
    {
        false
    }
}

/// `candle-flash-attn` backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlashAttnKernel;

impl FlashAttnKernel {
    /// Create the flash-attention backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Reason the vendor kernel cannot run this call, if any.
    #[must_use]
    pub fn unsupported_reason(
        input: &AttentionInput,
        bias: Option<&Tensor>,
        params: &AttentionParams,
    ) -> Option<String> {
        let dims = input.dims();
        if !cfg!(feature = "flash-attn") {
            return Some("built without the flash-attn feature".into());
        }
        if !input.device().is_cuda() {
            return Some("inputs are not on a CUDA device".into());
        }
        if !matches!(input.dtype(), DType::F16 | DType::BF16) {
            return Some(format!("dtype {:?} is not f16/bf16", input.dtype()));
        }
        if dims.head_dim % 8 != 0 || dims.head_dim > MAX_HEAD_DIM {
            return Some(format!(
                "head_dim {} must be a multiple of 8 and at most {MAX_HEAD_DIM}",
                dims.head_dim
            ));
        }
        if params.bias_type != AttnBiasType::NoBias || bias.is_some() {
            return Some("bias is not supported".into());
        }
        match params.mask_type {
            AttnMaskType::NoMask => {}
            AttnMaskType::CausalMask if dims.is_self_attention() => {}
            other => return Some(format!("mask type {other:?} is not supported")),
        }
        if params.dropout_active() {
            return Some("dropout is not supported".into());
        }
        None
    }
}

impl FusedAttentionKernel for FlashAttnKernel {
    fn name(&self) -> &'static str {
        "flash-attn"
    }

    fn supports(
        &self,
        input: &AttentionInput,
        bias: Option<&Tensor>,
        params: &AttentionParams,
    ) -> bool {
        Self::unsupported_reason(input, bias, params).is_none()
    }

    fn materializes_scores(&self) -> bool {
        false
    }

    #[cfg(feature = "flash-attn")]
    fn forward(
        &self,
        input: &AttentionInput,
        bias: Option<&Tensor>,
        mask: &Tensor,
        _seed: Option<u64>,
        params: &AttentionParams,
    ) -> Result<Tensor> {
        crate::kernels::backend::validate_call(input, bias, mask, params)?;
        if !input.device().is_cuda() {
            return Err(AttnError::DeviceNotAvailable(format!(
                "flash-attn needs CUDA inputs, got {:?}",
                input.device().location()
            )));
        }
        if let Some(reason) = Self::unsupported_reason(input, bias, params) {
            return Err(AttnError::Unsupported(reason));
        }

        let dims = input.dims();
        #[allow(clippy::cast_possible_truncation)]
        let scale = params.scaling_factor(&dims) as f32;
        let (q, k, v) = input.split()?;

        tracing::debug!(
            "flash-attn: batch={}, seq={}/{}, heads={}, head_dim={}, causal={}",
            dims.batch,
            dims.seq_q,
            dims.seq_kv,
            dims.heads,
            dims.head_dim,
            params.mask_type.is_causal()
        );

        let output = candle_flash_attn::flash_attn(
            &q.contiguous()?,
            &k.contiguous()?,
            &v.contiguous()?,
            scale,
            params.mask_type.is_causal(),
        )?;
        Ok(output)
    }

    #[cfg(not(feature = "flash-attn"))]
    fn forward(
        &self,
        _input: &AttentionInput,
        _bias: Option<&Tensor>,
        _mask: &Tensor,
        _seed: Option<u64>,
        _params: &AttentionParams,
    ) -> Result<Tensor> {
        Err(AttnError::Unsupported(
            "built without the flash-attn feature".into(),
        ))
    }
}
