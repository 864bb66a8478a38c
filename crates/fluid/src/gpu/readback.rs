//! Synchronous texture -> CPU readback for capture and diagnostics.
//!
//! Not used in the hot path; the solver never reads its fields back during
//! normal operation.

use std::sync::mpsc;

use super::surface::FieldBuffer;
use super::GpuContext;
use crate::error::FluidError;

const ROW_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

pub fn bytes_per_pixel(format: wgpu::TextureFormat) -> Option<u32> {
    use wgpu::TextureFormat::*;
    match format {
        R16Float => Some(2),
        Rg16Float => Some(4),
        Rgba16Float => Some(8),
        R32Float => Some(4),
        Rgba8Unorm | Rgba8UnormSrgb | Bgra8Unorm | Bgra8UnormSrgb => Some(4),
        Rgba32Float => Some(16),
        _ => None,
    }
}

pub fn channel_count(format: wgpu::TextureFormat) -> Option<u32> {
    use wgpu::TextureFormat::*;
    match format {
        R16Float | R32Float => Some(1),
        Rg16Float => Some(2),
        Rgba16Float | Rgba32Float | Rgba8Unorm | Rgba8UnormSrgb | Bgra8Unorm
        | Bgra8UnormSrgb => Some(4),
        _ => None,
    }
}

/// Copies a texture into a staging buffer and maps it, blocking until the
/// GPU finishes. Returns tightly packed rows.
pub fn read_texture(ctx: &GpuContext, texture: &wgpu::Texture) -> Result<Vec<u8>, FluidError> {
    let width = texture.width();
    let height = texture.height();
    let bpp = bytes_per_pixel(texture.format())
        .ok_or_else(|| FluidError::Readback(format!("unsupported format {:?}", texture.format())))?;

    let unpadded_row = width * bpp;
    let padded_row = unpadded_row.div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT;

    let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback staging"),
        size: (padded_row * height) as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    ctx.queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    ctx.device.poll(wgpu::Maintain::Wait);
    match rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(FluidError::Readback(format!("map failed: {e:?}"))),
        Err(_) => return Err(FluidError::Readback("map channel disconnected".into())),
    }

    let data = slice.get_mapped_range();
    let mut out = Vec::with_capacity((unpadded_row * height) as usize);
    for row in 0..height {
        let start = (row * padded_row) as usize;
        out.extend_from_slice(&data[start..start + unpadded_row as usize]);
    }
    drop(data);
    staging.unmap();
    Ok(out)
}

/// IEEE 754 binary16 -> binary32, enough for diagnostics on 16-bit float
/// fields.
pub fn f16_to_f32(bits: u16) -> f32 {
    let sign = ((bits >> 15) & 1) as u32;
    let exp = ((bits >> 10) & 0x1f) as u32;
    let frac = (bits & 0x3ff) as u32;
    match (exp, frac) {
        (0, 0) => f32::from_bits(sign << 31),
        (0, _) => {
            let magnitude = frac as f32 * 2f32.powi(-24);
            if sign == 1 {
                -magnitude
            } else {
                magnitude
            }
        }
        (31, 0) => f32::from_bits((sign << 31) | 0x7f80_0000),
        (31, _) => f32::NAN,
        _ => f32::from_bits((sign << 31) | ((exp + 112) << 23) | (frac << 13)),
    }
}

/// Reads a float field back as f32 values, channel-interleaved in row order.
pub fn read_field_f32(ctx: &GpuContext, field: &FieldBuffer) -> Result<Vec<f32>, FluidError> {
    use wgpu::TextureFormat::*;
    let bytes = read_texture(ctx, field.texture())?;
    match field.format() {
        R16Float | Rg16Float | Rgba16Float => Ok(bytes
            .chunks_exact(2)
            .map(|c| f16_to_f32(u16::from_le_bytes([c[0], c[1]])))
            .collect()),
        R32Float | Rgba32Float => Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()),
        other => Err(FluidError::Readback(format!(
            "cannot decode {other:?} as floats"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f16_decodes_reference_values() {
        assert_eq!(f16_to_f32(0x0000), 0.0);
        assert_eq!(f16_to_f32(0x3c00), 1.0);
        assert_eq!(f16_to_f32(0xbc00), -1.0);
        assert_eq!(f16_to_f32(0x4000), 2.0);
        assert_eq!(f16_to_f32(0x3800), 0.5);
        // Largest finite half and a subnormal.
        assert_eq!(f16_to_f32(0x7bff), 65504.0);
        assert!((f16_to_f32(0x0001) - 5.9604645e-8).abs() < 1e-12);
        assert!(f16_to_f32(0x7c00).is_infinite());
        assert!(f16_to_f32(0x7e00).is_nan());
    }
}
