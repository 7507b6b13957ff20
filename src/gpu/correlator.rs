// gpu/correlator.rs — wgpu implementation of `ComputeBackend`.
//
// BUFFERS
// ────────
//   binding 0  template   storage, read    one per selection, immutable
//   binding 1  search     storage, read    grown on demand, rewritten per frame
//   binding 2  scores     storage, rw      grown on demand
//   binding 3  params     uniform          32 bytes, rewritten per frame
//   (readback)            map_read         grown on demand
//
// Images travel as packed RGB bytes. Byte lengths are padded up to a whole
// u32 word because both `write_buffer` and WGSL storage arrays work in
// 4-byte units; the padding is never read by the kernel.
//
// KERNEL BUILD
// ─────────────
// The WGSL source is read from disk at startup so it can be swapped on the
// board without a rebuild. Module creation and every entry-point lookup run
// inside a validation error scope: a compile error becomes
// `ComputeError::ProgramBuild` carrying the compiler's message, and a
// missing entry point just moves on to the next candidate.

use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use log::{debug, error, info, warn};
use wgpu::util::DeviceExt;

use crate::backend::ComputeBackend;
use crate::config::KernelConfig;
use crate::error::ComputeError;
use crate::gpu::device::GpuDevice;
use crate::image::{RgbImage, CHANNELS};
use crate::ncc::CorrelationSurface;
use crate::template::Template;

// ---------------------------------------------------------------------------
// Uniform params (must match WGSL struct Params exactly)
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct Params {
    tw: u32,
    th: u32,
    sw: u32,
    sh: u32,
    channels: u32,
    out_w: u32,
    out_h: u32,
    _pad: u32,
}

/// Bytes rounded up to a whole number of u32 words.
fn padded_len(len: usize) -> u64 {
    (len.div_ceil(4) * 4) as u64
}

// ---------------------------------------------------------------------------
// GrowBuffer
// ---------------------------------------------------------------------------

/// A device buffer that is reallocated only when a request exceeds its
/// capacity. The search window size changes near frame edges, so the
/// steady state never reallocates.
struct GrowBuffer {
    label: &'static str,
    usage: wgpu::BufferUsages,
    buffer: Option<wgpu::Buffer>,
}

impl GrowBuffer {
    fn new(label: &'static str, usage: wgpu::BufferUsages) -> Self {
        GrowBuffer { label, usage, buffer: None }
    }

    fn ensure(&mut self, device: &wgpu::Device, size: u64) -> &wgpu::Buffer {
        if self.buffer.as_ref().is_some_and(|b| b.size() < size) {
            if let Some(old) = self.buffer.take() {
                old.destroy();
            }
        }
        let (label, usage) = (self.label, self.usage);
        self.buffer.get_or_insert_with(|| {
            debug!("allocating {label} ({size} bytes)");
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            })
        })
    }
}

// ---------------------------------------------------------------------------
// GpuTemplate
// ---------------------------------------------------------------------------

/// Device copy of a template's packed pixels.
#[derive(Debug)]
pub struct GpuTemplate {
    buffer: wgpu::Buffer,
}

impl GpuTemplate {
    pub fn size(&self) -> u64 {
        self.buffer.size()
    }
}

// ---------------------------------------------------------------------------
// GpuCorrelator
// ---------------------------------------------------------------------------

/// Builds the NCC kernel once and runs it per tracking frame.
///
/// # Field drop order
/// Pipeline objects and buffers are declared before `gpu` so they are
/// released while the device is still alive.
pub struct GpuCorrelator {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
    entry_point: String,
    params_buf: wgpu::Buffer,
    search_buf: GrowBuffer,
    score_buf: GrowBuffer,
    readback_buf: GrowBuffer,
    staging: Vec<u8>,
    gpu: GpuDevice,
}

impl GpuCorrelator {
    /// Read, build and bind the kernel described by `config`.
    pub fn new(gpu: GpuDevice, config: &KernelConfig) -> Result<Self, ComputeError> {
        let source = read_kernel_source(&config.source_path)?;
        let module = build_module(&gpu, &config.source_path, &source)?;
        let bgl = create_bind_group_layout(&gpu.device);

        let pipeline_layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ncc pipeline layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let candidates = config.candidates();
        let (entry_point, pipeline) =
            resolve_entry_point(&gpu, &module, &pipeline_layout, &candidates)
                .ok_or_else(|| ComputeError::KernelNotFound { candidates: candidates.clone() })?;
        if entry_point != config.entry_point {
            warn!("entry point '{}' missing, using '{entry_point}'", config.entry_point);
        }
        info!(
            "kernel {} built, entry point '{entry_point}', workgroup {}",
            config.source_path.display(),
            gpu.workgroup_size
        );

        let params_buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ncc params"),
            size: std::mem::size_of::<Params>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(GpuCorrelator {
            pipeline,
            bgl,
            entry_point,
            params_buf,
            search_buf: GrowBuffer::new(
                "ncc search",
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            ),
            score_buf: GrowBuffer::new(
                "ncc scores",
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            ),
            readback_buf: GrowBuffer::new(
                "ncc readback",
                wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            ),
            staging: Vec::new(),
            gpu,
        })
    }

    /// The entry point that was actually bound.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Copy `img` into `staging`, zero-padded to a word boundary.
    fn stage(&mut self, img: &RgbImage) -> u64 {
        let padded = padded_len(img.as_bytes().len());
        self.staging.clear();
        self.staging.extend_from_slice(img.as_bytes());
        self.staging.resize(padded as usize, 0);
        padded
    }

    fn read_scores(&self, readback: &wgpu::Buffer, size: u64) -> Result<Vec<f32>, ComputeError> {
        let slice = readback.slice(..size);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        self.gpu.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| ComputeError::Dispatch("readback callback dropped".into()))??;

        let scores = {
            let mapped = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, f32>(&mapped).to_vec()
        };
        readback.unmap();
        Ok(scores)
    }
}

impl ComputeBackend for GpuCorrelator {
    type Buffer = GpuTemplate;

    fn upload_template(&mut self, template: &RgbImage) -> Result<GpuTemplate, ComputeError> {
        self.stage(template);
        self.gpu.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("ncc template"),
            contents: &self.staging,
            usage: wgpu::BufferUsages::STORAGE,
        });
        if let Some(err) = pollster::block_on(self.gpu.device.pop_error_scope()) {
            return Err(ComputeError::Dispatch(format!("template upload: {err}")));
        }
        debug!(
            "uploaded template {}×{} ({} bytes)",
            template.width(),
            template.height(),
            buffer.size()
        );
        Ok(GpuTemplate { buffer })
    }

    fn release_template(&mut self, template: GpuTemplate) {
        template.buffer.destroy();
    }

    fn dispatch(
        &mut self,
        template: &Template<GpuTemplate>,
        search: &RgbImage,
    ) -> Result<CorrelationSurface, ComputeError> {
        let (out_w, out_h) = CorrelationSurface::dimensions_for(
            search.width(),
            search.height(),
            template.width(),
            template.height(),
        )?;
        let n = out_w * out_h;
        let score_size = (n * std::mem::size_of::<f32>()) as u64;

        let params = Params {
            tw: template.width() as u32,
            th: template.height() as u32,
            sw: search.width() as u32,
            sh: search.height() as u32,
            channels: CHANNELS as u32,
            out_w: out_w as u32,
            out_h: out_h as u32,
            _pad: 0,
        };

        let search_size = self.stage(search);
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let search_buf = self.search_buf.ensure(device, search_size);
        self.gpu.queue.write_buffer(search_buf, 0, &self.staging);
        self.gpu.queue.write_buffer(&self.params_buf, 0, bytemuck::bytes_of(&params));
        let score_buf = self.score_buf.ensure(device, score_size);
        let readback = self.readback_buf.ensure(device, score_size);

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ncc bind group"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: template.handle().buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry { binding: 1, resource: search_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: score_buf.as_entire_binding() },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.params_buf.as_entire_binding(),
                },
            ],
        });

        let (wg_x, wg_y) = self.gpu.dispatch_size(out_w as u32, out_h as u32);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("ncc dispatch"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("direct_ncc"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(wg_x, wg_y, 1);
        }
        encoder.copy_buffer_to_buffer(score_buf, 0, readback, 0, score_size);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(ComputeError::Dispatch(err.to_string()));
        }

        let scores = match self.readback_buf.buffer.as_ref() {
            Some(rb) => self.read_scores(rb, score_size)?,
            None => return Err(ComputeError::Dispatch("readback buffer missing".into())),
        };
        Ok(CorrelationSurface::from_scores(out_w, out_h, scores)?)
    }
}

// ---------------------------------------------------------------------------
// Build helpers
// ---------------------------------------------------------------------------

fn read_kernel_source(path: &Path) -> Result<String, ComputeError> {
    std::fs::read_to_string(path).map_err(|source| ComputeError::KernelSource {
        path: path.to_path_buf(),
        source,
    })
}

fn build_module(
    gpu: &GpuDevice,
    path: &Path,
    source: &str,
) -> Result<wgpu::ShaderModule, ComputeError> {
    gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: path.file_name().and_then(|n| n.to_str()),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    match pollster::block_on(gpu.device.pop_error_scope()) {
        Some(err) => {
            let log = err.to_string();
            error!("kernel build failed for {}:\n{log}", path.display());
            Err(ComputeError::ProgramBuild { path: PathBuf::from(path), log })
        }
        None => Ok(module),
    }
}

fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let storage = |binding, read_only| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("ncc BGL"),
        entries: &[
            // 0 — template pixels
            storage(0, true),
            // 1 — search pixels
            storage(1, true),
            // 2 — score surface
            storage(2, false),
            // 3 — params uniform
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}

/// First candidate that yields a valid compute pipeline.
fn resolve_entry_point(
    gpu: &GpuDevice,
    module: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    candidates: &[String],
) -> Option<(String, wgpu::ComputePipeline)> {
    let constants = gpu.workgroup_size.as_constants();
    for name in candidates {
        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(name.as_str()),
            layout: Some(layout),
            module,
            entry_point: name,
            compilation_options: wgpu::PipelineCompilationOptions {
                constants: &constants,
                ..Default::default()
            },
            cache: None,
        });
        match pollster::block_on(gpu.device.pop_error_scope()) {
            None => return Some((name.clone(), pipeline)),
            Some(err) => debug!("entry point '{name}' rejected: {err}"),
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
