//! Flash-attention GPU tests.
//!
//! Compares the vendor kernel against the reference backend on the same
//! packed inputs and checks that dispatch picks the vendor kernel whenever it
//! can run the call.

use anyhow::Result;
use candle_core::{DType, Device};
use fused_attn_rs::kernels::mask::zeros_mask;
use fused_attn_rs::kernels::{
    pack_qkv, AttentionInput, AttentionParams, AttnMaskType, FlashAttnKernel, FusedAttention,
    FusedAttentionConfig, FusedAttentionKernel, QkvDims, ReferenceKernel,
};

use crate::helpers::{QkvShape, TestFixtures, ValidationUtils};
use crate::require_gpu;

/// Tolerance for f16 vs f32-accumulated reference.
const F16_TOLERANCE: f32 = 2e-2;

fn packed_input(shape: QkvShape, dtype: DType, device: &Device) -> Result<AttentionInput> {
    let (q, k, v) = TestFixtures::random_qkv(shape, shape.seq, dtype, device)?;
    Ok(AttentionInput::qkv_packed(pack_qkv(&q, &k, &v)?)?)
}

fn compare_with_reference(shape: QkvShape, mask_type: AttnMaskType) -> Result<()> {
    let device = Device::new_cuda(0)?;
    let input = packed_input(shape, DType::F16, &device)?;
    let mask = zeros_mask(&input.dims(), DType::U8, &device)?;
    let params = AttentionParams::default().with_mask_type(mask_type);

    let flash = FlashAttnKernel::new();
    assert!(flash.supports(&input, None, &params));

    let fused = flash.forward(&input, None, &mask, None, &params)?;
    let reference = ReferenceKernel::new().forward(&input, None, &mask, None, &params)?;

    assert_eq!(fused.dims(), &input.dims().output_shape());
    let metrics = ValidationUtils::accuracy(&fused, &reference)?;
    assert!(
        metrics.max_error < F16_TOLERANCE,
        "flash vs reference: {metrics:?}"
    );
    assert!(metrics.cosine_similarity > 0.999);
    Ok(())
}

#[test]
fn test_flash_matches_reference() -> Result<()> {
    require_gpu!();
    compare_with_reference(QkvShape::new(2, 128, 4, 64), AttnMaskType::NoMask)
}

#[test]
fn test_flash_matches_reference_causal() -> Result<()> {
    require_gpu!();
    compare_with_reference(QkvShape::new(1, 256, 8, 128), AttnMaskType::CausalMask)
}

#[test]
fn test_dispatch_prefers_flash() -> Result<()> {
    require_gpu!();
    let device = Device::new_cuda(0)?;
    let input = packed_input(QkvShape::new(1, 64, 2, 64), DType::BF16, &device)?;

    let attn = FusedAttention::new(FusedAttentionConfig::default())?;
    assert_eq!(attn.select_backend(&input, None).name(), "flash-attn");
    Ok(())
}

#[test]
fn test_padding_mask_falls_back_to_reference() -> Result<()> {
    require_gpu!();
    let device = Device::new_cuda(0)?;
    let input = packed_input(QkvShape::new(1, 64, 2, 64), DType::F16, &device)?;
    let params = AttentionParams::default().with_mask_type(AttnMaskType::PaddingMask);

    let attn = FusedAttention::new(FusedAttentionConfig {
        params,
        use_flash: true,
    })?;
    assert_eq!(attn.select_backend(&input, None).name(), "reference");

    let dims: QkvDims = input.dims();
    let mask = zeros_mask(&dims, DType::U8, &device)?;
    let out = attn.forward_packed(&input, None, &mask, None)?;
    assert_eq!(out.dtype(), DType::F16);
    Ok(())
}

#[test]
fn test_f32_unsupported_by_flash() -> Result<()> {
    require_gpu!();
    let device = Device::new_cuda(0)?;
    let input = packed_input(QkvShape::new(1, 16, 2, 64), DType::F32, &device)?;
    assert!(
        FlashAttnKernel::unsupported_reason(&input, None, &AttentionParams::default()).is_some()
    );
    Ok(())
}
