//! GPU context acquisition and capability detection.

pub mod kernels;
pub mod readback;
pub mod surface;

use std::sync::Arc;

use crate::error::FluidError;

/// Creates the wgpu instance. The caller keeps it alive while any surface
/// created from it is in use.
pub fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    })
}

/// What the adapter can do for our field textures, plus the best available
/// internal format per channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityProfile {
    /// 32-bit float textures can be sampled with linear filtering.
    pub float_filterable: bool,
    /// 16-bit float render targets are available (core on every tier we run).
    pub half_float: bool,
    /// The chosen field formats support linear filtering. When false the
    /// config must be downgraded and kernels fall back to manual bilinear.
    pub linear_filtering: bool,
    pub r_format: wgpu::TextureFormat,
    pub rg_format: wgpu::TextureFormat,
    pub rgba_format: wgpu::TextureFormat,
}

impl CapabilityProfile {
    /// Probes render-target support per format, falling back R -> RG -> RGBA.
    pub fn detect(adapter: &wgpu::Adapter) -> Result<Self, FluidError> {
        use wgpu::TextureFormat::{R16Float, Rg16Float, Rgba16Float};

        let rgba_format = pick_format(adapter, &[Rgba16Float]).ok_or_else(|| {
            FluidError::ContextUnavailable {
                reason: "no renderable 4-channel float format".into(),
            }
        })?;
        let rg_format = pick_format(adapter, &[Rg16Float, Rgba16Float]).ok_or_else(|| {
            FluidError::ContextUnavailable {
                reason: "no renderable 2-channel float format".into(),
            }
        })?;
        let r_format =
            pick_format(adapter, &[R16Float, Rg16Float, Rgba16Float]).ok_or_else(|| {
                FluidError::ContextUnavailable {
                    reason: "no renderable 1-channel float format".into(),
                }
            })?;

        let linear_filtering = [r_format, rg_format, rgba_format]
            .iter()
            .all(|f| filterable(adapter, *f));

        Ok(Self {
            float_filterable: adapter
                .features()
                .contains(wgpu::Features::FLOAT32_FILTERABLE),
            half_float: true,
            linear_filtering,
            r_format,
            rg_format,
            rgba_format,
        })
    }
}

fn renderable(adapter: &wgpu::Adapter, format: wgpu::TextureFormat) -> bool {
    adapter
        .get_texture_format_features(format)
        .allowed_usages
        .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
}

fn filterable(adapter: &wgpu::Adapter, format: wgpu::TextureFormat) -> bool {
    adapter
        .get_texture_format_features(format)
        .flags
        .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE)
}

fn pick_format(
    adapter: &wgpu::Adapter,
    candidates: &[wgpu::TextureFormat],
) -> Option<wgpu::TextureFormat> {
    candidates.iter().copied().find(|f| renderable(adapter, *f))
}

/// Device, queue and capability tier shared by the pool and kernel library.
pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub caps: CapabilityProfile,
}

impl GpuContext {
    /// Acquires an adapter (preferring the high-performance one, then the
    /// fallback) and a device. Fails with `ContextUnavailable` when neither
    /// tier yields a compatible adapter.
    pub async fn acquire(
        instance: &wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self, FluidError> {
        let mut adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await;

        if adapter.is_none() {
            log::warn!("no hardware adapter; trying fallback adapter");
            adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::LowPower,
                    compatible_surface,
                    force_fallback_adapter: true,
                })
                .await;
        }

        let adapter = adapter.ok_or_else(|| FluidError::ContextUnavailable {
            reason: "no compatible adapter".into(),
        })?;
        log::info!("using GPU: {:?}", adapter.get_info());

        let mut features = wgpu::Features::empty();
        if adapter.features().contains(wgpu::Features::FLOAT32_FILTERABLE) {
            features |= wgpu::Features::FLOAT32_FILTERABLE;
        }

        let caps = CapabilityProfile::detect(&adapter)?;
        if !caps.linear_filtering {
            log::warn!("float textures are not filterable on this adapter");
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("fluid device"),
                    required_features: features,
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| FluidError::ContextUnavailable {
                reason: format!("device request failed: {e}"),
            })?;

        // Runtime faults are logged and the offending frame skipped; an
        // uncaught panic here would kill the animation loop for good.
        device.on_uncaptured_error(Box::new(|error| {
            log::error!("GPU uncaptured error: {error}");
        }));

        Ok(Self {
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            caps,
        })
    }

    /// Surface-less context for tests and capture tools.
    pub fn acquire_headless() -> Result<Self, FluidError> {
        let instance = create_instance();
        pollster::block_on(Self::acquire(&instance, None))
    }
}

/// Resolves a validation error scope opened around kernel creation into the
/// error taxonomy, naming the kernel that failed.
pub(crate) fn finish_validation_scope(
    device: &wgpu::Device,
    kernel: &'static str,
) -> Result<(), FluidError> {
    match pollster::block_on(device.pop_error_scope()) {
        None => Ok(()),
        Some(wgpu::Error::Validation { description, .. }) => Err(FluidError::ShaderCompile {
            kernel,
            log: description,
        }),
        Some(other) => Err(FluidError::PipelineBuild {
            kernel,
            log: other.to_string(),
        }),
    }
}
