//! GPU context shared by every node of a filter chain.
//!
//! This module provides a thin wrapper around wgpu's instance, adapter,
//! device and queue objects together with the shader library that
//! filters compile their kernels from.  Nodes borrow the context, so
//! it must outlive every node built from it; the borrow checker
//! enforces that.  The `new_blocking` constructor hides the
//! asynchronous nature of requesting an adapter and device by using
//! the [`pollster`] crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error, info};
use pollster::FutureExt as _;
use wgpu::{Adapter, Device, Instance, Queue};

use crate::compute::ComputeKernel;
use crate::config::ContextOptions;
use crate::error::{FilterError, FilterResult};
use crate::library::ShaderLibrary;
use crate::provider::NodeId;
use crate::texture::{FaceUniforms, TextureKind};

/// A GPU context encapsulates all state needed to build and run filters.
///
/// The context holds on to the `Instance`, `Adapter`, `Device` and
/// `Queue`.  All nodes created from one context submit through its
/// single queue, so their dispatches execute in submission order.
pub struct FilterContext {
    /// The global GPU instance used to request the adapter.
    pub instance: Instance,
    /// The physical device selected for computation.
    pub adapter: Adapter,
    /// Logical device used to create resources and command encoders.
    pub device: Device,
    /// Command submission queue shared by every node.
    pub queue: Queue,
    options: ContextOptions,
    library: ShaderLibrary,
    // Compiled wgpu modules keyed by library module label.
    modules: Mutex<HashMap<String, Arc<wgpu::ShaderModule>>>,
    // Kernel copying cube faces into flat textures for readback.
    face_unfold: Mutex<Option<Arc<ComputeKernel>>>,
    next_node_id: AtomicU64,
    dispatches: AtomicU64,
}

impl FilterContext {
    /// Create a new context synchronously.
    ///
    /// Blocks the current thread while the adapter and device requests
    /// complete.  See [`Self::new_async`] for the asynchronous variant.
    pub fn new_blocking(options: ContextOptions) -> FilterResult<Self> {
        Self::new_async(options).block_on()
    }

    /// Create a new context asynchronously.
    pub async fn new_async(options: ContextOptions) -> FilterResult<Self> {
        let instance = Instance::new(&wgpu::InstanceDescriptor {
            backends: options.backends,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                force_fallback_adapter: options.force_fallback_adapter,
                compatible_surface: None,
            })
            .await
            .map_err(|e| FilterError::AdapterUnavailable(e.to_string()))?;
        // Downlevel devices may not support compute on all backends;
        // abort early if unsupported.
        let capabilities = adapter.get_downlevel_capabilities();
        if !capabilities.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
            return Err(FilterError::AdapterUnavailable(
                "selected adapter does not support compute shaders".into(),
            ));
        }
        let adapter_info = adapter.get_info();
        info!(
            "using adapter `{}` ({:?}, {:?})",
            adapter_info.name, adapter_info.backend, adapter_info.device_type
        );
        // Downlevel limits everywhere except texture sizes, which follow
        // the adapter so full-resolution panoramas fit.
        let limits = wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits());
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(&options.label),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| FilterError::DeviceRequest(e.to_string()))?;
        device.on_uncaptured_error(Box::new(|err| {
            error!("uncaptured device error: {err}");
        }));

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            options,
            library: ShaderLibrary::builtin()?,
            modules: Mutex::new(HashMap::new()),
            face_unfold: Mutex::new(None),
            next_node_id: AtomicU64::new(0),
            dispatches: AtomicU64::new(0),
        })
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    pub fn library(&self) -> &ShaderLibrary {
        &self.library
    }

    /// Add a WGSL module whose compute functions filters may bind.
    ///
    /// Requires exclusive access, so modules are registered before any
    /// node borrows the context.
    pub fn register_module(
        &mut self,
        label: impl Into<String>,
        source: impl Into<std::borrow::Cow<'static, str>>,
    ) -> FilterResult<()> {
        self.library.register(label, source)
    }

    /// Largest width or height a texture may have on this device.
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Number of filter dispatches that completed successfully on this
    /// context.  Failed dispatches, uploads and readbacks are not counted.
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches.load(Ordering::SeqCst)
    }

    /// Whether cube layers can be copied straight into a buffer.
    ///
    /// The GL backend stores six-layer square textures as cube maps and
    /// cannot copy those to buffers, so their faces are read back
    /// through [`Self::face_unfold_kernel`] instead.
    pub fn supports_cube_copies(&self) -> bool {
        self.adapter.get_info().backend != wgpu::Backend::Gl
    }

    pub(crate) fn allocate_node_id(&self) -> NodeId {
        NodeId(self.next_node_id.fetch_add(1, Ordering::Relaxed))
    }

    /// The device module containing `function`, compiled on first use.
    pub(crate) fn shader_module(&self, function: &str) -> FilterResult<Arc<wgpu::ShaderModule>> {
        let entry = self.library.find(function).ok_or_else(|| {
            FilterError::compilation(function, "no module in the shader library exports it")
        })?;
        let mut modules = self
            .modules
            .lock()
            .map_err(|_| FilterError::compilation(function, "shader module cache poisoned"))?;
        if let Some(module) = modules.get(entry.label()) {
            return Ok(module.clone());
        }
        let (module, err) = self.with_error_scope(|| {
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(entry.label()),
                source: wgpu::ShaderSource::Wgsl(entry.source().into()),
            })
        });
        if let Some(err) = err {
            return Err(FilterError::compilation(function, err));
        }
        debug!("compiled shader module `{}`", entry.label());
        let module = Arc::new(module);
        modules.insert(entry.label().to_string(), module.clone());
        Ok(module)
    }

    /// The compiled `unfold_cube_face` kernel, built on first use.
    pub(crate) fn face_unfold_kernel(&self) -> FilterResult<Arc<ComputeKernel>> {
        let mut slot = self
            .face_unfold
            .lock()
            .map_err(|_| FilterError::Readback("face unfold kernel cache poisoned".into()))?;
        if let Some(kernel) = slot.as_ref() {
            return Ok(kernel.clone());
        }
        let kernel = Arc::new(ComputeKernel::compile(
            self,
            "unfold_cube_face",
            TextureKind::Cube,
            TextureKind::Flat,
            std::mem::size_of::<FaceUniforms>() as u64,
        )?);
        *slot = Some(kernel.clone());
        Ok(kernel)
    }

    /// Submit an encoder and block until the GPU has finished it.
    pub(crate) fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) -> Result<(), String> {
        self.queue.submit([encoder.finish()]);
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| format!("device polling failed: {e}"))?;
        Ok(())
    }

    /// Allocate the serial of a dispatch that has completed, starting at 1.
    pub(crate) fn record_dispatch(&self) -> u64 {
        self.dispatches.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Run `f` with validation and out-of-memory errors captured instead
    /// of reaching the uncaptured-error handler.
    pub(crate) fn with_error_scope<T>(&self, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let validation = self.device.pop_error_scope().block_on();
        let out_of_memory = self.device.pop_error_scope().block_on();
        (value, validation.or(out_of_memory))
    }
}
