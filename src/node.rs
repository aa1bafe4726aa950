//! The lazily evaluated compute filter node.
//!
//! A [`FilterNode`] owns a compiled kernel, a uniform block and an
//! internal output texture.  It implements both [`TextureProvider`] and
//! [`TextureConsumer`]: it pulls its single input, dispatches the
//! kernel when anything it depends on changed, and hands the cached
//! texture to its own consumers otherwise.  What a particular filter
//! computes is described by a [`FilterKernel`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use bytemuck::Pod;
use log::{debug, trace};

use crate::buffer::UniformBuffer;
use crate::compute::{workgroup_grid, ComputeKernel};
use crate::error::{FilterError, FilterResult};
use crate::provider::{Freshness, NodeId, SharedProvider, TextureConsumer, TextureProvider, UpstreamState};
use crate::texture::{Extent, Texture, TextureKind};
use crate::FilterContext;

/// The per-filter part of a [`FilterNode`]: shapes, uniforms and the
/// parameters they are derived from.
pub trait FilterKernel {
    /// Uniform block layout; must match the WGSL struct at binding 0.
    type Uniforms: Pod;

    /// Shape of the texture the kernel samples.
    const INPUT: TextureKind;
    /// Shape of the texture the kernel writes.
    const OUTPUT: TextureKind;

    /// Label used for GPU objects and log lines.
    fn label(&self) -> &'static str;

    /// Per-layer extent of the output for `input`.
    fn output_extent(&self, context: &FilterContext, input: &Texture) -> FilterResult<Extent>;

    /// Uniform contents for one dispatch.
    fn uniforms(&self, input: &Texture, output: &Texture) -> Self::Uniforms;

    /// Sampler used to read the input.
    fn sampler_descriptor(&self) -> wgpu::SamplerDescriptor<'static> {
        wgpu::SamplerDescriptor {
            label: Some("filter_input_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        }
    }
}

/// Dispatch statistics of one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Successful dispatches since construction.
    pub dispatches: u64,
    /// Context-wide serial of the most recent successful dispatch.
    pub last_dispatch: Option<u64>,
}

/// A cacheable compute filter with one input.
pub struct FilterNode<'ctx, K: FilterKernel> {
    id: NodeId,
    context: &'ctx FilterContext,
    kernel: K,
    pipeline: ComputeKernel,
    uniform_buffer: UniformBuffer<K::Uniforms>,
    sampler: wgpu::Sampler,
    internal_texture: Option<Arc<Texture>>,
    input: Option<SharedProvider<'ctx>>,
    freshness: Freshness,
    stats: NodeStats,
}

impl<K: FilterKernel> fmt::Debug for FilterNode<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterNode")
            .field("id", &self.id)
            .field("function", &self.function_name())
            .field("freshness", &self.freshness)
            .field("stats", &self.stats)
            .field("output", &self.internal_texture.as_ref().map(|t| t.extent()))
            .finish_non_exhaustive()
    }
}

impl<'ctx, K: FilterKernel> FilterNode<'ctx, K> {
    /// Compile `function` from the context's shader library and build a
    /// node around it.  No node is returned when compilation fails.
    pub fn with_kernel(context: &'ctx FilterContext, function: &str, kernel: K) -> FilterResult<Self> {
        let pipeline = ComputeKernel::compile(
            context,
            function,
            K::INPUT,
            K::OUTPUT,
            std::mem::size_of::<K::Uniforms>() as u64,
        )?;
        let uniform_buffer = UniformBuffer::new(context, kernel.label());
        let sampler = context.device.create_sampler(&kernel.sampler_descriptor());
        let id = context.allocate_node_id();
        debug!("created {} `{function}` as {id}", kernel.label());
        Ok(Self {
            id,
            context,
            kernel,
            pipeline,
            uniform_buffer,
            sampler,
            internal_texture: None,
            input: None,
            freshness: Freshness::new(),
            stats: NodeStats::default(),
        })
    }

    /// Wrap the node in a shared handle so it can be both mutated by
    /// the session and pulled by downstream consumers.
    pub fn into_shared(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }

    /// Name of the bound kernel function; fixed for the node's lifetime.
    pub fn function_name(&self) -> &str {
        self.pipeline.function()
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn context(&self) -> &'ctx FilterContext {
        self.context
    }

    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    /// The cached output, without recomputing.  May be stale when the
    /// node is dirty.
    pub fn internal_texture(&self) -> Option<&Arc<Texture>> {
        self.internal_texture.as_ref()
    }

    pub fn input(&self) -> Option<&SharedProvider<'ctx>> {
        self.input.as_ref()
    }

    /// Change kernel parameters; the node becomes dirty.
    pub(crate) fn update_kernel(&mut self, update: impl FnOnce(&mut K)) {
        update(&mut self.kernel);
        self.freshness.invalidate();
    }

    /// Bind the uniform block, the input view, the sampler and the
    /// output view on `pass`.
    ///
    /// Runs on every dispatch; a fresh bind group is created each time
    /// because the input texture may have been reallocated upstream.
    pub fn configure_argument_table(
        &self,
        pass: &mut wgpu::ComputePass<'_>,
        input: &Texture,
        output: &Texture,
    ) {
        let input_view = input.sample_view();
        let output_view = output.storage_view();
        let bind_group = self.context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.kernel.label()),
            layout: self.pipeline.bind_group_layout(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&input_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&output_view),
                },
            ],
        });
        pass.set_bind_group(0, &bind_group, &[]);
    }

    fn upstream_state(&self) -> Option<UpstreamState> {
        self.input.as_ref().map(UpstreamState::of)
    }

    /// Pull the input, returning its texture and the revision consumed.
    fn pull_input(&self) -> FilterResult<(Arc<Texture>, u64)> {
        let input = self.input.as_ref().ok_or_else(|| {
            FilterError::InvalidInput(format!("`{}` has no input connected", self.function_name()))
        })?;
        let mut upstream = input.try_borrow_mut().map_err(|_| {
            FilterError::InvalidInput(format!(
                "input of `{}` is already being pulled; the chain contains a cycle",
                self.function_name()
            ))
        })?;
        let texture = upstream.current_texture()?;
        Ok((texture, upstream.revision()))
    }

    /// Run the kernel over `input`.  On failure the previous internal
    /// texture is left untouched.
    fn dispatch(&mut self, input: &Texture) -> FilterResult<()> {
        if input.kind() != K::INPUT {
            return Err(FilterError::InvalidInput(format!(
                "`{}` expects a {:?} input, got {:?}",
                self.function_name(),
                K::INPUT,
                input.kind()
            )));
        }
        let extent = self.kernel.output_extent(self.context, input)?;
        let output = match &self.internal_texture {
            Some(texture) if texture.extent() == extent => texture.clone(),
            _ => {
                debug!(
                    "{} allocating {:?} output {}x{}",
                    self.id, K::OUTPUT, extent.width, extent.height
                );
                Arc::new(Texture::storage(self.context, self.kernel.label(), K::OUTPUT, extent)?)
            }
        };
        let grid = workgroup_grid(
            extent.width,
            extent.height,
            K::OUTPUT.layers(),
            self.context.device.limits().max_compute_workgroups_per_dimension,
        )
        .map_err(|reason| FilterError::dispatch(self.function_name(), reason))?;

        self.uniform_buffer
            .write(self.context, &self.kernel.uniforms(input, &output));
        let serial = self.pipeline.dispatch(self.context, grid, |pass| {
            self.configure_argument_table(pass, input, &output);
            Ok(())
        })?;

        self.internal_texture = Some(output);
        self.stats.dispatches += 1;
        self.stats.last_dispatch = Some(serial);
        Ok(())
    }
}

impl<'ctx, K: FilterKernel> TextureProvider for FilterNode<'ctx, K> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn output_kind(&self) -> TextureKind {
        K::OUTPUT
    }

    fn current_texture(&mut self) -> FilterResult<Arc<Texture>> {
        // The upstream is brought up to date first, so its revision alone
        // says whether this node's cached output is still valid.
        let (input, upstream_revision) = self.pull_input()?;
        let upstream = UpstreamState {
            dirty: false,
            revision: upstream_revision,
        };
        if !self.freshness.is_dirty(Some(upstream)) {
            if let Some(texture) = &self.internal_texture {
                trace!("{} serving cached output", self.id);
                return Ok(texture.clone());
            }
        }
        self.dispatch(&input)?;
        self.freshness.mark_clean(Some(upstream_revision));
        self.internal_texture
            .clone()
            .ok_or_else(|| FilterError::dispatch(self.function_name(), "no output after dispatch"))
    }

    fn is_dirty(&self) -> bool {
        self.freshness.is_dirty(self.upstream_state())
    }

    fn revision(&self) -> u64 {
        self.freshness.revision()
    }

    fn depends_on(&self, id: NodeId) -> bool {
        if self.id == id {
            return true;
        }
        match &self.input {
            // A provider that is borrowed right now is part of an active
            // pull through this node; treat it as a dependency.
            Some(input) => input.try_borrow().map_or(true, |p| p.depends_on(id)),
            None => false,
        }
    }
}

impl<'ctx, K: FilterKernel> TextureConsumer<'ctx> for FilterNode<'ctx, K> {
    fn set_input(&mut self, provider: SharedProvider<'ctx>) -> FilterResult<()> {
        self.freshness.invalidate();
        let upstream = provider.try_borrow().map_err(|_| {
            FilterError::InvalidInput(format!(
                "cannot connect a provider that is being pulled to `{}`",
                self.function_name()
            ))
        })?;
        if upstream.output_kind() != K::INPUT {
            return Err(FilterError::InvalidInput(format!(
                "`{}` expects a {:?} input, {} produces {:?}",
                self.function_name(),
                K::INPUT,
                upstream.node_id(),
                upstream.output_kind()
            )));
        }
        if upstream.depends_on(self.id) {
            return Err(FilterError::InvalidInput(format!(
                "connecting {} to {} would create a cycle",
                upstream.node_id(),
                self.id
            )));
        }
        debug!("{} now pulls from {}", self.id, upstream.node_id());
        drop(upstream);
        self.input = Some(provider);
        Ok(())
    }
}
