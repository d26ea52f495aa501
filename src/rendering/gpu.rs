//! wgpu presenter drawing both console screens into a host view.
//!
//! Each session gets its own surface, adapter and device. The surface is
//! created from the view's raw handles; the host keeps the view alive until
//! the session is detached.

use std::borrow::Cow;

use bytemuck::{Pod, Zeroable};
use capview_katsukity::{parse::LINE_PIXELS, Frame, Screen};
use wgpu::{Device, Queue, Surface, SurfaceConfiguration, TextureFormat};

use super::layout::{layout_transforms, Layout};
use crate::config::RenderConfig;
use crate::error::{CapviewError, CapviewResult};
use crate::sink::backend::{Presenter, SurfaceBackend};
use crate::view::ViewHandle;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct QuadUniforms {
    transform: [[f32; 4]; 4],
}

/// Creates [`GpuPresenter`]s; the wgpu instance is shared by all sessions.
pub struct GpuBackend {
    instance: wgpu::Instance,
}

impl Default for GpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend {
    pub fn new() -> Self {
        Self {
            instance: wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::PRIMARY,
                ..Default::default()
            }),
        }
    }
}

impl SurfaceBackend for GpuBackend {
    fn attach(&self, view: &ViewHandle, config: &RenderConfig) -> CapviewResult<Box<dyn Presenter>> {
        let target = wgpu::SurfaceTargetUnsafe::RawHandle {
            raw_display_handle: view.raw_display_handle(),
            raw_window_handle: view.raw_window_handle(),
        };
        // SAFETY: the host keeps the view alive until the session detaches,
        // and the surface is dropped with the presenter before that.
        let surface = unsafe { self.instance.create_surface_unsafe(target) }
            .map_err(|e| CapviewError::Surface(format!("Failed to create surface: {}", e)))?;

        let presenter = pollster::block_on(GpuPresenter::new(&self.instance, surface, config))?;
        Ok(Box::new(presenter))
    }

    fn name(&self) -> &'static str {
        "wgpu"
    }
}

struct ScreenQuad {
    screen: Screen,
    texture: wgpu::Texture,
    uniforms: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

pub struct GpuPresenter {
    surface: Surface<'static>,
    device: Device,
    queue: Queue,
    config: SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    quads: Vec<ScreenQuad>,
    layout: Layout,
    clear: wgpu::Color,
}

impl GpuPresenter {
    async fn new(
        instance: &wgpu::Instance,
        surface: Surface<'static>,
        render: &RenderConfig,
    ) -> CapviewResult<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await
            .map_err(|e| CapviewError::Gpu(format!("Failed to find wgpu adapter: {}", e)))?;

        log::info!("[GPU] Using adapter: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("capview-session"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| CapviewError::Gpu(format!("Failed to create device: {}", e)))?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(TextureFormat::is_srgb)
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| CapviewError::Surface("Surface reports no formats".to_string()))?;
        let present_mode = if render.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let [width, height] = render.initial_size;
        let config = SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("capview-screen-shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("screen.wgsl"))),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("screen-bind-group-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("screen-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("screen-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let filter = if render.pixelated {
            wgpu::FilterMode::Nearest
        } else {
            wgpu::FilterMode::Linear
        };
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("screen-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let quads = render
            .layout
            .placements()
            .into_iter()
            .map(|(screen, _)| create_quad(&device, &bind_group_layout, &sampler, screen))
            .collect();

        let presenter = Self {
            surface,
            device,
            queue,
            config,
            pipeline,
            quads,
            layout: render.layout,
            clear: render.clear(),
        };
        presenter.write_transforms();

        log::info!(
            "[GPU] Presenter ready: {}x{} {:?} {:?}",
            presenter.config.width,
            presenter.config.height,
            format,
            presenter.layout
        );
        Ok(presenter)
    }

    fn write_transforms(&self) {
        let size = (self.config.width, self.config.height);
        for (screen, transform) in layout_transforms(self.layout, size) {
            if let Some(quad) = self.quads.iter().find(|q| q.screen == screen) {
                self.queue
                    .write_buffer(&quad.uniforms, 0, bytemuck::bytes_of(&QuadUniforms { transform }));
            }
        }
    }

    fn upload(&self, frame: &Frame) {
        for quad in &self.quads {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &quad.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                frame.screen(quad.screen),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(LINE_PIXELS as u32 * 4),
                    rows_per_image: Some(quad.screen.lines() as u32),
                },
                texture_size(quad.screen),
            );
        }
    }

    fn acquire(&mut self) -> CapviewResult<Option<wgpu::SurfaceTexture>> {
        match self.surface.get_current_texture() {
            Ok(texture) => Ok(Some(texture)),
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                log::debug!("[GPU] Surface outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                self.surface
                    .get_current_texture()
                    .map(Some)
                    .map_err(|e| CapviewError::Surface(format!("Surface lost: {}", e)))
            },
            Err(wgpu::SurfaceError::Timeout) => Ok(None),
            Err(e) => Err(CapviewError::Surface(format!(
                "Failed to get surface texture: {}",
                e
            ))),
        }
    }
}

impl Presenter for GpuPresenter {
    fn present(&mut self, frame: &Frame) -> CapviewResult<()> {
        self.upload(frame);

        let Some(output) = self.acquire()? else {
            return Ok(());
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("capview-frame-encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("capview-frame-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.pipeline);
            for quad in &self.quads {
                pass.set_bind_group(0, &quad.bind_group, &[]);
                pass.draw(0..6, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if (width, height) == (self.config.width, self.config.height) {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.write_transforms();
        log::debug!("[GPU] Surface resized to {}x{}", width, height);
    }

    fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}

/// Scan-order texture size: one row per line.
fn texture_size(screen: Screen) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: LINE_PIXELS as u32,
        height: screen.lines() as u32,
        depth_or_array_layers: 1,
    }
}

fn create_quad(
    device: &Device,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    screen: Screen,
) -> ScreenQuad {
    let label = match screen {
        Screen::Top => "top-screen",
        Screen::Bottom => "bottom-screen",
    };

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: texture_size(screen),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: std::mem::size_of::<QuadUniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&texture_view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });

    ScreenQuad {
        screen,
        texture,
        uniforms,
        bind_group,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniforms_are_mat4() {
        assert_eq!(std::mem::size_of::<QuadUniforms>(), 64);
    }

    #[test]
    fn test_texture_size_is_scan_order() {
        let top = texture_size(Screen::Top);
        assert_eq!((top.width, top.height), (240, 400));
        let bottom = texture_size(Screen::Bottom);
        assert_eq!((bottom.width, bottom.height), (240, 320));
    }
}
