//! Attention kernels and the QKV layout adapter.

pub mod attention;
pub mod backend;
pub mod config;
pub mod flash;
pub mod layout;
pub mod mask;
pub mod reference;

pub use attention::{fused_attn_kvpacked, fused_attn_qkvpacked, FusedAttention, FusedAttentionConfig};
pub use backend::FusedAttentionKernel;
pub use config::{AttentionParams, AttnBiasType, AttnMaskType, ScalePolicy};
pub use flash::FlashAttnKernel;
pub use layout::{pack_kv, pack_qkv, unpack_kv, unpack_qkv, AttentionInput, QkvDims, QkvLayout};
pub use reference::ReferenceKernel;
