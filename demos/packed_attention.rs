//! Packed attention example.
//!
//! This example shows how to:
//! - Pack separate Q, K, V tensors into the `[b, s, 3, h, d]` kernel layout
//! - Build a mask and call the fused attention entry point
//! - Inspect the output and the memory estimate
//!
//! Run with: `cargo run --example packed_attention`

use anyhow::Result;
use candle_core::{DType, Device, IndexOp, Tensor};
use fused_attn_rs::kernels::mask::zeros_mask;
use fused_attn_rs::kernels::{
    fused_attn_qkvpacked, pack_qkv, AttentionParams, AttnBiasType, AttnMaskType, QkvDims,
};
use fused_attn_rs::memory::{estimate_attention_memory, format_bytes};

fn main() -> Result<()> {
    println!("=== Packed Attention Example ===\n");

    let (batch, seq_len, heads, head_dim) = (2, 8, 4, 32);
    let device = Device::Cpu;

    // Q, K, V as produced by projection layers: [batch, seq, heads, head_dim]
    let q = Tensor::randn(0.0f32, 1.0, (batch, seq_len, heads, head_dim), &device)?;
    let k = Tensor::randn(0.0f32, 1.0, (batch, seq_len, heads, head_dim), &device)?;
    let v = Tensor::randn(0.0f32, 1.0, (batch, seq_len, heads, head_dim), &device)?;

    let qkv = pack_qkv(&q, &k, &v)?;
    println!("Packed QKV shape: {:?}", qkv.dims());

    let slot_k = qkv.i((.., .., 1))?;
    let diff = (slot_k - &k)?.abs()?.sum_all()?.to_scalar::<f32>()?;
    println!("Slot 1 vs K absolute difference: {diff}");

    let dims = QkvDims::from_qkv_packed(&qkv)?;
    let mask = zeros_mask(&dims, DType::U8, &device)?;
    println!("Mask shape: {:?}", mask.dims());

    let params = AttentionParams::default()
        .with_bias_type(AttnBiasType::NoBias)
        .with_mask_type(AttnMaskType::CausalMask)
        .with_dropout(0.1)
        .training(false);
    println!(
        "Scaling factor: {:.6} (1/sqrt(head_dim))",
        params.scaling_factor(&dims)
    );

    let output = fused_attn_qkvpacked(&qkv, None, &mask, Some(0), &params)?;
    println!("Output shape: {:?}", output.dims());

    let mean = output.mean_all()?.to_scalar::<f32>()?;
    assert!(mean.is_finite(), "Output contains NaN or Inf");
    println!("Output mean: {mean:.6}");

    let fused = estimate_attention_memory(&dims, DType::F16, false);
    let unfused = estimate_attention_memory(&dims, DType::F32, true);
    println!("\nMemory estimate:");
    println!("  fused (f16):   {}", format_bytes(fused.total()));
    println!("  unfused (f32): {}", format_bytes(unfused.total()));

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
