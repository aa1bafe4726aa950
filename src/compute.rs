//! Compiled compute kernels and their dispatch.
//!
//! Every filter kernel shares one argument layout:
//!
//! | binding | resource                                  |
//! |---------|-------------------------------------------|
//! | 0       | uniform block                             |
//! | 1       | sampled input texture (2D or cube)        |
//! | 2       | filtering sampler                         |
//! | 3       | write-only storage output (2D or 2D array)|
//!
//! [`ComputeKernel`] builds the bind group layout and pipeline once;
//! [`ComputeKernel::dispatch`] records a single compute pass, submits
//! it and blocks until the GPU has finished, with device errors
//! captured and returned instead of panicking.

use std::num::NonZeroU64;

use log::debug;

use crate::error::{FilterError, FilterResult};
use crate::texture::{TextureKind, TEXTURE_FORMAT};
use crate::FilterContext;

/// Threads per workgroup along x and y; must match `@workgroup_size` in
/// the WGSL kernels.
pub const WORKGROUP_SIZE: (u32, u32) = (8, 8);

/// Number of workgroups needed to cover `width x height x layers`
/// invocations, one z slice per layer.
///
/// Fails when a dimension exceeds the device's per-dimension limit.
pub fn workgroup_grid(width: u32, height: u32, layers: u32, limit: u32) -> Result<(u32, u32, u32), String> {
    let groups = (
        width.div_ceil(WORKGROUP_SIZE.0),
        height.div_ceil(WORKGROUP_SIZE.1),
        layers,
    );
    if groups.0 > limit || groups.1 > limit || groups.2 > limit {
        return Err(format!(
            "workgroup grid {groups:?} exceeds the per-dimension limit of {limit}"
        ));
    }
    Ok(groups)
}

/// A compute pipeline compiled from a named library function.
pub struct ComputeKernel {
    function: String,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl ComputeKernel {
    /// Compile `function` for a kernel reading `input` and writing `output`.
    ///
    /// `uniform_size` is the byte size of the kernel's uniform block.
    pub fn compile(
        context: &FilterContext,
        function: &str,
        input: TextureKind,
        output: TextureKind,
        uniform_size: u64,
    ) -> FilterResult<Self> {
        let module = context.shader_module(function)?;
        let min_binding_size = NonZeroU64::new(uniform_size)
            .ok_or_else(|| FilterError::compilation(function, "uniform block must not be empty"))?;
        let ((bind_group_layout, pipeline), err) = context.with_error_scope(|| {
            let bind_group_layout =
                context
                    .device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some(function),
                        entries: &[
                            wgpu::BindGroupLayoutEntry {
                                binding: 0,
                                visibility: wgpu::ShaderStages::COMPUTE,
                                ty: wgpu::BindingType::Buffer {
                                    ty: wgpu::BufferBindingType::Uniform,
                                    has_dynamic_offset: false,
                                    min_binding_size: Some(min_binding_size),
                                },
                                count: None,
                            },
                            wgpu::BindGroupLayoutEntry {
                                binding: 1,
                                visibility: wgpu::ShaderStages::COMPUTE,
                                ty: wgpu::BindingType::Texture {
                                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                    view_dimension: input.sample_dimension(),
                                    multisampled: false,
                                },
                                count: None,
                            },
                            wgpu::BindGroupLayoutEntry {
                                binding: 2,
                                visibility: wgpu::ShaderStages::COMPUTE,
                                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                                count: None,
                            },
                            wgpu::BindGroupLayoutEntry {
                                binding: 3,
                                visibility: wgpu::ShaderStages::COMPUTE,
                                ty: wgpu::BindingType::StorageTexture {
                                    access: wgpu::StorageTextureAccess::WriteOnly,
                                    format: TEXTURE_FORMAT,
                                    view_dimension: output.storage_dimension(),
                                },
                                count: None,
                            },
                        ],
                    });
            let pipeline_layout = context
                .device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(function),
                    bind_group_layouts: &[&bind_group_layout],
                    push_constant_ranges: &[],
                });
            let pipeline = context
                .device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(function),
                    layout: Some(&pipeline_layout),
                    module: &module,
                    entry_point: Some(function),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                });
            (bind_group_layout, pipeline)
        });
        if let Some(err) = err {
            return Err(FilterError::compilation(function, err));
        }
        debug!("compiled compute pipeline `{function}` ({input:?} -> {output:?})");
        Ok(Self {
            function: function.to_string(),
            bind_group_layout,
            pipeline,
        })
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    /// Record one compute pass over `grid` workgroups, submit it and wait.
    ///
    /// `configure` binds the kernel's arguments on the pass; it runs on
    /// every dispatch because bindings do not persist between passes.
    /// Returns the context-wide dispatch serial, which is only allocated
    /// once the GPU has finished the pass without errors.
    pub fn dispatch(
        &self,
        context: &FilterContext,
        grid: (u32, u32, u32),
        configure: impl FnOnce(&mut wgpu::ComputePass<'_>) -> FilterResult<()>,
    ) -> FilterResult<u64> {
        self.run(context, grid, configure)?;
        let serial = context.record_dispatch();
        debug!("dispatched `{}` over {grid:?} workgroups (#{serial})", self.function);
        Ok(serial)
    }

    /// Like [`Self::dispatch`] but not counted as a filter dispatch; used
    /// for helper passes such as readback.
    pub(crate) fn run(
        &self,
        context: &FilterContext,
        grid: (u32, u32, u32),
        configure: impl FnOnce(&mut wgpu::ComputePass<'_>) -> FilterResult<()>,
    ) -> FilterResult<()> {
        let (result, err) = context.with_error_scope(|| -> FilterResult<()> {
            let mut encoder = context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some(&self.function),
                });
            {
                let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(&self.function),
                    timestamp_writes: None,
                });
                cpass.set_pipeline(&self.pipeline);
                configure(&mut cpass)?;
                cpass.dispatch_workgroups(grid.0, grid.1, grid.2);
            }
            context
                .submit_and_wait(encoder)
                .map_err(|reason| FilterError::dispatch(&self.function, reason))
        });
        if let Some(err) = err {
            return Err(FilterError::dispatch(&self.function, err));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_covers_partial_workgroups() {
        assert_eq!(workgroup_grid(16, 16, 1, 65_535), Ok((2, 2, 1)));
        assert_eq!(workgroup_grid(17, 9, 6, 65_535), Ok((3, 2, 6)));
        assert_eq!(workgroup_grid(1, 1, 1, 65_535), Ok((1, 1, 1)));
    }

    #[test]
    fn grid_respects_dimension_limit() {
        assert!(workgroup_grid(8 * 10, 8, 1, 10).is_ok());
        assert!(workgroup_grid(8 * 10 + 1, 8, 1, 10).is_err());
    }
}
