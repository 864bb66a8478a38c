//! Off-screen render-target pool for the simulated fields.
//!
//! Each physical quantity lives in its own texture: velocity (2ch), dye
//! (4ch), pressure (1ch, double-buffered like velocity and dye), divergence
//! and curl (1ch, single). Double buffers swap read/write roles in O(1).

use glam::Vec2;

use super::kernels::KernelPass;
use super::{CapabilityProfile, GpuContext};
use crate::config::SimulationConfig;

/// A simulation-resolution pair preserving the display aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Computes grid dimensions for `base` texels along the shorter screen axis,
/// assigning the larger dimension to whichever axis is longer.
pub fn resolve_resolution(base: u32, screen_width: u32, screen_height: u32) -> Resolution {
    let mut aspect = screen_width.max(1) as f32 / screen_height.max(1) as f32;
    if aspect < 1.0 {
        aspect = 1.0 / aspect;
    }
    let min = base.max(1);
    let max = (base.max(1) as f32 * aspect).round() as u32;
    if screen_width > screen_height {
        Resolution { width: max, height: min }
    } else {
        Resolution { width: min, height: max }
    }
}

/// One GPU-resident field: a float texture plus its render-target view.
pub struct FieldBuffer {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

impl FieldBuffer {
    pub fn create(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
            format,
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Exactly (1/width, 1/height); recomputed from the live dimensions so it
    /// can never go stale across a resize.
    pub fn texel_size(&self) -> Vec2 {
        Vec2::new(1.0 / self.width as f32, 1.0 / self.height as f32)
    }
}

/// Read/write texture pair with an O(1) role swap.
pub struct DoubleField {
    read: FieldBuffer,
    write: FieldBuffer,
}

impl DoubleField {
    pub fn create(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        Self {
            read: FieldBuffer::create(device, &format!("{label} a"), width, height, format),
            write: FieldBuffer::create(device, &format!("{label} b"), width, height, format),
        }
    }

    pub fn read(&self) -> &FieldBuffer {
        &self.read
    }

    pub fn write(&self) -> &FieldBuffer {
        &self.write
    }

    /// Exchanges read/write roles without copying texel data.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.read, &mut self.write);
    }

    pub fn width(&self) -> u32 {
        self.read.width
    }

    pub fn height(&self) -> u32 {
        self.read.height
    }

    pub fn texel_size(&self) -> Vec2 {
        self.read.texel_size()
    }
}

/// All render targets used by the solver, allocated against one capability
/// profile and resized together.
pub struct SurfacePool {
    pub velocity: DoubleField,
    pub dye: DoubleField,
    pub pressure: DoubleField,
    pub divergence: FieldBuffer,
    pub curl: FieldBuffer,
    pub bloom: FieldBuffer,
    pub bloom_chain: Vec<FieldBuffer>,
    pub sunrays: FieldBuffer,
    pub sunrays_temp: FieldBuffer,
}

impl SurfacePool {
    pub fn allocate(
        ctx: &GpuContext,
        config: &SimulationConfig,
        screen_width: u32,
        screen_height: u32,
    ) -> Self {
        let caps = &ctx.caps;
        let sim = resolve_resolution(config.sim_resolution, screen_width, screen_height);
        let dye = resolve_resolution(config.dye_resolution, screen_width, screen_height);
        let bloom = resolve_resolution(config.bloom_resolution, screen_width, screen_height);
        let sunrays = resolve_resolution(config.sunrays_resolution, screen_width, screen_height);
        let device = &ctx.device;

        Self {
            velocity: DoubleField::create(device, "velocity", sim.width, sim.height, caps.rg_format),
            dye: DoubleField::create(device, "dye", dye.width, dye.height, caps.rgba_format),
            pressure: DoubleField::create(device, "pressure", sim.width, sim.height, caps.r_format),
            divergence: FieldBuffer::create(device, "divergence", sim.width, sim.height, caps.r_format),
            curl: FieldBuffer::create(device, "curl", sim.width, sim.height, caps.r_format),
            bloom: FieldBuffer::create(device, "bloom", bloom.width, bloom.height, caps.rgba_format),
            bloom_chain: Self::create_bloom_chain(device, caps, bloom, config.bloom_iterations),
            sunrays: FieldBuffer::create(device, "sunrays", sunrays.width, sunrays.height, caps.r_format),
            sunrays_temp: FieldBuffer::create(
                device,
                "sunrays temp",
                sunrays.width,
                sunrays.height,
                caps.r_format,
            ),
        }
    }

    fn create_bloom_chain(
        device: &wgpu::Device,
        caps: &CapabilityProfile,
        base: Resolution,
        iterations: u32,
    ) -> Vec<FieldBuffer> {
        let mut chain = Vec::new();
        for i in 0..iterations {
            let width = base.width >> (i + 1);
            let height = base.height >> (i + 1);
            if width < 2 || height < 2 {
                break;
            }
            chain.push(FieldBuffer::create(
                device,
                &format!("bloom level {i}"),
                width,
                height,
                caps.rgba_format,
            ));
        }
        chain
    }

    /// Reallocates targets for a new display size. Idempotent under unchanged
    /// dimensions; velocity and dye contents survive through the copy kernel,
    /// solver scratch fields restart from zero. New textures are created
    /// before the old ones are dropped, so a failed allocation (surfaced via
    /// the uncaptured-error hook) leaves the prior buffers intact.
    pub fn resize(
        &mut self,
        ctx: &GpuContext,
        copy: &KernelPass,
        sampler: &wgpu::Sampler,
        config: &SimulationConfig,
        screen_width: u32,
        screen_height: u32,
    ) {
        let caps = &ctx.caps;
        let sim = resolve_resolution(config.sim_resolution, screen_width, screen_height);
        let dye = resolve_resolution(config.dye_resolution, screen_width, screen_height);

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("pool resize"),
            });
        let mut copied = false;

        if sim.width != self.velocity.width() || sim.height != self.velocity.height() {
            self.velocity = Self::resize_double(
                ctx,
                copy,
                sampler,
                &mut encoder,
                &self.velocity,
                "velocity",
                sim,
                caps.rg_format,
            );
            self.pressure =
                DoubleField::create(&ctx.device, "pressure", sim.width, sim.height, caps.r_format);
            self.divergence =
                FieldBuffer::create(&ctx.device, "divergence", sim.width, sim.height, caps.r_format);
            self.curl =
                FieldBuffer::create(&ctx.device, "curl", sim.width, sim.height, caps.r_format);
            copied = true;
        }

        if dye.width != self.dye.width() || dye.height != self.dye.height() {
            self.dye = Self::resize_double(
                ctx,
                copy,
                sampler,
                &mut encoder,
                &self.dye,
                "dye",
                dye,
                caps.rgba_format,
            );
            copied = true;
        }

        let bloom = resolve_resolution(config.bloom_resolution, screen_width, screen_height);
        if bloom.width != self.bloom.width() || bloom.height != self.bloom.height() {
            self.bloom = FieldBuffer::create(
                &ctx.device,
                "bloom",
                bloom.width,
                bloom.height,
                caps.rgba_format,
            );
            self.bloom_chain =
                Self::create_bloom_chain(&ctx.device, caps, bloom, config.bloom_iterations);
        }

        let sunrays = resolve_resolution(config.sunrays_resolution, screen_width, screen_height);
        if sunrays.width != self.sunrays.width() || sunrays.height != self.sunrays.height() {
            self.sunrays = FieldBuffer::create(
                &ctx.device,
                "sunrays",
                sunrays.width,
                sunrays.height,
                caps.r_format,
            );
            self.sunrays_temp = FieldBuffer::create(
                &ctx.device,
                "sunrays temp",
                sunrays.width,
                sunrays.height,
                caps.r_format,
            );
        }

        if copied {
            ctx.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn resize_double(
        ctx: &GpuContext,
        copy: &KernelPass,
        sampler: &wgpu::Sampler,
        encoder: &mut wgpu::CommandEncoder,
        old: &DoubleField,
        label: &str,
        size: Resolution,
        format: wgpu::TextureFormat,
    ) -> DoubleField {
        let new = DoubleField::create(&ctx.device, label, size.width, size.height, format);
        // Rescale the surviving contents into the new read target; the write
        // target starts from zero like any fresh texture.
        copy.encode(
            &ctx.device,
            encoder,
            &[],
            sampler,
            &[old.read().view()],
            new.read().view(),
            format,
        );
        new
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_assigns_long_axis_to_long_screen_side() {
        let landscape = resolve_resolution(128, 1920, 1080);
        assert_eq!(landscape.height, 128);
        assert!(landscape.width > landscape.height);

        let portrait = resolve_resolution(128, 1080, 1920);
        assert_eq!(portrait.width, 128);
        assert!(portrait.height > portrait.width);
    }

    #[test]
    fn resolution_preserves_aspect_within_rounding() {
        let screen = (1920u32, 1080u32);
        let r = resolve_resolution(128, screen.0, screen.1);
        let screen_aspect = screen.0 as f32 / screen.1 as f32;
        let grid_aspect = r.width as f32 / r.height as f32;
        // One texel of rounding slack on the long axis.
        assert!((grid_aspect - screen_aspect).abs() < 1.0 / 128.0);
    }

    #[test]
    fn square_screen_yields_square_grid() {
        let r = resolve_resolution(64, 800, 800);
        assert_eq!(r, Resolution { width: 64, height: 64 });
    }

    #[test]
    fn degenerate_screen_sizes_do_not_panic() {
        let r = resolve_resolution(128, 0, 0);
        assert!(r.width >= 1 && r.height >= 1);
    }
}
