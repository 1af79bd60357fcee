//! # fused-attn-rs
//!
//! Glue between [Candle](https://github.com/huggingface/candle) tensors and fused
//! attention kernels.
//!
//! Projection layers emit Q, K and V as separate `[batch, seq, heads, head_dim]`
//! tensors. Fused kernels consume them packed along an inserted slot axis. This
//! crate provides:
//!
//! - The layout adapter: `[b, s, h, d]` x3 -> `[b, s, 3, h, d]` and back
//! - Bias, mask, scale and dropout selectors for the kernel call
//! - A backend trait with a `candle-flash-attn` implementation (feature
//!   `flash-attn`) and an unfused reference implementation for every device
//! - Memory estimates for fused and unfused execution
//!
//! Kernels return only the attention output. Attention probabilities are not
//! exposed.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use candle_core::DType;
//! use fused_attn_rs::kernels::mask::zeros_mask;
//! use fused_attn_rs::kernels::{
//!     fused_attn_qkvpacked, pack_qkv, AttentionParams, AttnMaskType, QkvDims,
//! };
//!
//! let qkv = pack_qkv(&q, &k, &v)?; // [b, s, 3, h, d]
//! let params = AttentionParams::default().with_mask_type(AttnMaskType::CausalMask);
//! let mask = zeros_mask(&QkvDims::from_qkv_packed(&qkv)?, DType::U8, &device)?;
//! let out = fused_attn_qkvpacked(&qkv, None, &mask, None, &params)?; // [b, s, h, d]
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod kernels;
pub mod memory;

pub use error::{AttnError, Result};
