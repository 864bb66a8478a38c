//! Screen-space numerical kernels.
//!
//! Every kernel is a fragment shader run over a fullscreen triangle, reading
//! one or more field textures and writing exactly one render target. Shader
//! text lives in `shaders/`; each module is validated inside an error scope
//! at startup so a broken kernel fails construction with its backend log.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::{finish_validation_scope, GpuContext};
use crate::error::FluidError;

const COMMON: &str = include_str!("shaders/common.wgsl");

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct TexelUniforms {
    pub texel_size: [f32; 2],
    pub _pad: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct AdvectionUniforms {
    /// Texel size of the velocity grid (back-trace step scale).
    pub texel_size: [f32; 2],
    /// Texel size of the advected source field (manual bilinear path).
    pub src_texel_size: [f32; 2],
    pub dt: f32,
    pub dissipation: f32,
    pub manual_filtering: u32,
    pub _pad: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct VorticityUniforms {
    pub texel_size: [f32; 2],
    pub curl: f32,
    pub dt: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct ClearUniforms {
    pub value: f32,
    pub _pad: [f32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct SplatUniforms {
    pub point: [f32; 2],
    pub radius: f32,
    pub aspect_ratio: f32,
    pub color: [f32; 3],
    pub _pad: f32,
}

pub const DISPLAY_SHADING: u32 = 1 << 0;
pub const DISPLAY_BLOOM: u32 = 1 << 1;
pub const DISPLAY_SUNRAYS: u32 = 1 << 2;
pub const DISPLAY_OPAQUE: u32 = 1 << 3;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct DisplayUniforms {
    pub texel_size: [f32; 2],
    pub flags: u32,
    pub _pad: u32,
    pub back_color: [f32; 3],
    pub _pad2: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct BloomPrefilterUniforms {
    /// (threshold - knee, knee * 2, 0.25 / knee)
    pub curve: [f32; 3],
    pub threshold: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct BloomFinalUniforms {
    pub texel_size: [f32; 2],
    pub intensity: f32,
    pub _pad: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct SunraysUniforms {
    pub weight: f32,
    pub _pad: [f32; 3],
}

/// A compiled kernel: shader module, explicit bind group layout and one
/// pipeline per output format it targets. Immutable after creation; bind
/// groups are built per invocation since field textures swap every pass.
pub struct KernelPass {
    label: &'static str,
    layout: wgpu::BindGroupLayout,
    pipelines: Vec<(wgpu::TextureFormat, wgpu::RenderPipeline)>,
    uniform_size: usize,
    texture_count: usize,
    additive: bool,
}

impl KernelPass {
    #[allow(clippy::too_many_arguments)]
    fn new(
        ctx: &GpuContext,
        label: &'static str,
        body: &str,
        uniform_size: usize,
        texture_count: usize,
        formats: &[wgpu::TextureFormat],
        additive: bool,
    ) -> Result<Self, FluidError> {
        let device = &ctx.device;
        let filterable = ctx.caps.linear_filtering;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(format!("{COMMON}\n{body}").into()),
        });

        let mut entries = Vec::new();
        let mut binding = 0;
        if uniform_size > 0 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
            binding += 1;
        }
        entries.push(wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(if filterable {
                wgpu::SamplerBindingType::Filtering
            } else {
                wgpu::SamplerBindingType::NonFiltering
            }),
            count: None,
        });
        binding += 1;
        for _ in 0..texture_count {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            binding += 1;
        }

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let blend = if additive {
            Some(wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            })
        } else {
            None
        };

        let mut pipelines = Vec::new();
        for &format in formats {
            if pipelines.iter().any(|(f, _)| *f == format) {
                continue;
            }
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
            pipelines.push((format, pipeline));
        }

        finish_validation_scope(device, label)?;

        Ok(Self {
            label,
            layout,
            pipelines,
            uniform_size,
            texture_count,
            additive,
        })
    }

    /// Encodes one kernel invocation into `encoder`. `uniforms` must match
    /// the kernel's uniform block size; `inputs` its declared texture count.
    #[allow(clippy::too_many_arguments)]
    pub fn encode(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        uniforms: &[u8],
        sampler: &wgpu::Sampler,
        inputs: &[&wgpu::TextureView],
        target: &wgpu::TextureView,
        target_format: wgpu::TextureFormat,
    ) {
        debug_assert_eq!(uniforms.len(), self.uniform_size, "{}", self.label);
        debug_assert_eq!(inputs.len(), self.texture_count, "{}", self.label);

        let Some((_, pipeline)) = self.pipelines.iter().find(|(f, _)| *f == target_format) else {
            log::error!("kernel '{}' has no pipeline for {target_format:?}", self.label);
            return;
        };

        // Each invocation gets its own small uniform buffer; a shared buffer
        // would be overwritten by later passes before this frame submits.
        let uniform_buffer = (!uniforms.is_empty()).then(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(self.label),
                contents: uniforms,
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });

        let mut entries = Vec::new();
        let mut binding = 0;
        if let Some(buffer) = &uniform_buffer {
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: buffer.as_entire_binding(),
            });
            binding += 1;
        }
        entries.push(wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::Sampler(sampler),
        });
        binding += 1;
        for view in inputs {
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
            binding += 1;
        }
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.label),
            layout: &self.layout,
            entries: &entries,
        });

        let load = if self.additive {
            wgpu::LoadOp::Load
        } else {
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(self.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

/// The fixed set of kernels, compiled once at startup and reused every frame.
pub struct KernelLibrary {
    pub sampler: wgpu::Sampler,
    pub copy: KernelPass,
    pub clear: KernelPass,
    pub advection: KernelPass,
    pub curl: KernelPass,
    pub vorticity: KernelPass,
    pub divergence: KernelPass,
    pub pressure: KernelPass,
    pub gradient_subtract: KernelPass,
    pub splat: KernelPass,
    pub bloom_prefilter: KernelPass,
    pub bloom_blur: KernelPass,
    pub bloom_blur_add: KernelPass,
    pub bloom_final: KernelPass,
    pub sunrays_mask: KernelPass,
    pub sunrays: KernelPass,
    pub blur: KernelPass,
    pub display: KernelPass,
}

impl KernelLibrary {
    pub fn new(ctx: &GpuContext, output_format: wgpu::TextureFormat) -> Result<Self, FluidError> {
        let caps = &ctx.caps;
        let filter = if caps.linear_filtering {
            wgpu::FilterMode::Linear
        } else {
            wgpu::FilterMode::Nearest
        };
        let sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("field sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        use std::mem::size_of;
        let r = caps.r_format;
        let rg = caps.rg_format;
        let rgba = caps.rgba_format;

        Ok(Self {
            copy: KernelPass::new(
                ctx,
                "copy",
                include_str!("shaders/copy.wgsl"),
                0,
                1,
                &[rgba, rg, r],
                false,
            )?,
            clear: KernelPass::new(
                ctx,
                "clear",
                include_str!("shaders/clear.wgsl"),
                size_of::<ClearUniforms>(),
                1,
                &[r],
                false,
            )?,
            advection: KernelPass::new(
                ctx,
                "advection",
                include_str!("shaders/advection.wgsl"),
                size_of::<AdvectionUniforms>(),
                2,
                &[rg, rgba],
                false,
            )?,
            curl: KernelPass::new(
                ctx,
                "curl",
                include_str!("shaders/curl.wgsl"),
                size_of::<TexelUniforms>(),
                1,
                &[r],
                false,
            )?,
            vorticity: KernelPass::new(
                ctx,
                "vorticity",
                include_str!("shaders/vorticity.wgsl"),
                size_of::<VorticityUniforms>(),
                2,
                &[rg],
                false,
            )?,
            divergence: KernelPass::new(
                ctx,
                "divergence",
                include_str!("shaders/divergence.wgsl"),
                size_of::<TexelUniforms>(),
                1,
                &[r],
                false,
            )?,
            pressure: KernelPass::new(
                ctx,
                "pressure",
                include_str!("shaders/pressure.wgsl"),
                size_of::<TexelUniforms>(),
                2,
                &[r],
                false,
            )?,
            gradient_subtract: KernelPass::new(
                ctx,
                "gradient_subtract",
                include_str!("shaders/gradient_subtract.wgsl"),
                size_of::<TexelUniforms>(),
                2,
                &[rg],
                false,
            )?,
            splat: KernelPass::new(
                ctx,
                "splat",
                include_str!("shaders/splat.wgsl"),
                size_of::<SplatUniforms>(),
                1,
                &[rg, rgba],
                false,
            )?,
            bloom_prefilter: KernelPass::new(
                ctx,
                "bloom_prefilter",
                include_str!("shaders/bloom_prefilter.wgsl"),
                size_of::<BloomPrefilterUniforms>(),
                1,
                &[rgba],
                false,
            )?,
            bloom_blur: KernelPass::new(
                ctx,
                "bloom_blur",
                include_str!("shaders/bloom_blur.wgsl"),
                size_of::<TexelUniforms>(),
                1,
                &[rgba],
                false,
            )?,
            bloom_blur_add: KernelPass::new(
                ctx,
                "bloom_blur_add",
                include_str!("shaders/bloom_blur.wgsl"),
                size_of::<TexelUniforms>(),
                1,
                &[rgba],
                true,
            )?,
            bloom_final: KernelPass::new(
                ctx,
                "bloom_final",
                include_str!("shaders/bloom_final.wgsl"),
                size_of::<BloomFinalUniforms>(),
                1,
                &[rgba],
                false,
            )?,
            sunrays_mask: KernelPass::new(
                ctx,
                "sunrays_mask",
                include_str!("shaders/sunrays_mask.wgsl"),
                0,
                1,
                &[rgba],
                false,
            )?,
            sunrays: KernelPass::new(
                ctx,
                "sunrays",
                include_str!("shaders/sunrays.wgsl"),
                size_of::<SunraysUniforms>(),
                1,
                &[r],
                false,
            )?,
            blur: KernelPass::new(
                ctx,
                "blur",
                include_str!("shaders/blur.wgsl"),
                size_of::<TexelUniforms>(),
                1,
                &[r],
                false,
            )?,
            display: KernelPass::new(
                ctx,
                "display",
                include_str!("shaders/display.wgsl"),
                size_of::<DisplayUniforms>(),
                3,
                &[output_format],
                false,
            )?,
            sampler,
        })
    }
}
