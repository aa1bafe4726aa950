//! Named WGSL modules and the compute functions they export.
//!
//! Every module is parsed and validated with [`naga`] when it is
//! registered, so a broken kernel is reported before any device work
//! happens and compute functions can be looked up by name the way a
//! filter asks for them at construction.

use std::borrow::Cow;

use log::debug;

use crate::error::{FilterError, FilterResult};

/// WGSL source of the equirect-to-cubemap kernel.
pub const EQUIRECT_TO_CUBEMAP_WGSL: &str = include_str!("shaders/equirect_to_cubemap.wgsl");
/// WGSL source of the octahedral and stereographic square kernels.
pub const SQUARE_PROJECTION_WGSL: &str = include_str!("shaders/square_projection.wgsl");
/// WGSL source of the kernel copying a cube face into a flat texture.
pub const UNFOLD_CUBE_FACE_WGSL: &str = include_str!("shaders/unfold_cube_face.wgsl");

/// A validated WGSL module.
#[derive(Debug, Clone)]
pub struct LibraryModule {
    label: String,
    source: Cow<'static, str>,
    functions: Vec<String>,
}

impl LibraryModule {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of the `@compute` entry points declared by the module.
    pub fn functions(&self) -> &[String] {
        &self.functions
    }

    pub fn exports(&self, function: &str) -> bool {
        self.functions.iter().any(|f| f == function)
    }
}

/// Collection of WGSL modules searched by function name.
#[derive(Debug, Clone, Default)]
pub struct ShaderLibrary {
    modules: Vec<LibraryModule>,
}

impl ShaderLibrary {
    /// An empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// The library holding the kernels this crate ships.
    pub fn builtin() -> FilterResult<Self> {
        let mut library = Self::new();
        library.register("equirect_to_cubemap", EQUIRECT_TO_CUBEMAP_WGSL)?;
        library.register("square_projection", SQUARE_PROJECTION_WGSL)?;
        library.register("unfold_cube_face", UNFOLD_CUBE_FACE_WGSL)?;
        Ok(library)
    }

    /// Parse, validate and add a module.
    ///
    /// Fails when the source does not validate, when the label is taken
    /// or when one of its compute functions is already exported by
    /// another module.
    pub fn register(
        &mut self,
        label: impl Into<String>,
        source: impl Into<Cow<'static, str>>,
    ) -> FilterResult<()> {
        let label = label.into();
        let source = source.into();
        // Compiled modules are cached by label.
        if self.modules.iter().any(|m| m.label == label) {
            return Err(FilterError::compilation(&label, "a module with this label is already registered"));
        }
        let functions = compute_functions(&label, &source)?;
        if let Some(clash) = functions.iter().find(|f| self.find(f).is_some()) {
            return Err(FilterError::compilation(
                clash,
                format!("already exported by another module than `{label}`"),
            ));
        }
        debug!("registered shader module `{label}` exporting {functions:?}");
        self.modules.push(LibraryModule {
            label,
            source,
            functions,
        });
        Ok(())
    }

    /// The module exporting `function`, if any.
    pub fn find(&self, function: &str) -> Option<&LibraryModule> {
        self.modules.iter().find(|m| m.exports(function))
    }

    pub fn modules(&self) -> &[LibraryModule] {
        &self.modules
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.modules
            .iter()
            .flat_map(|m| m.functions.iter().map(String::as_str))
    }
}

fn compute_functions(label: &str, source: &str) -> FilterResult<Vec<String>> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| FilterError::compilation(label, e.emit_to_string(source)))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| FilterError::compilation(label, e.emit_to_string(source)))?;
    Ok(module
        .entry_points
        .iter()
        .filter(|ep| ep.stage == naga::ShaderStage::Compute)
        .map(|ep| ep.name.clone())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_library_exports_all_kernels() {
        let library = ShaderLibrary::builtin().unwrap();
        let names: Vec<&str> = library.function_names().collect();
        assert_eq!(
            names,
            [
                "equirect_to_cubemap",
                "octahedral_square",
                "stereographic_square",
                "unfold_cube_face"
            ]
        );
        assert_eq!(
            library.find("stereographic_square").map(LibraryModule::label),
            Some("square_projection")
        );
        assert!(library.find("missing_kernel").is_none());
    }

    #[test]
    fn invalid_wgsl_is_a_compilation_error() {
        let mut library = ShaderLibrary::new();
        let err = library
            .register("broken", "@compute @workgroup_size(1) fn main( {")
            .unwrap_err();
        assert!(matches!(err, FilterError::PipelineCompilation { ref function, .. } if function == "broken"));
        assert!(library.modules().is_empty());
    }

    #[test]
    fn duplicate_functions_are_rejected() {
        let mut library = ShaderLibrary::builtin().unwrap();
        let err = library
            .register("copy", "@compute @workgroup_size(1) fn octahedral_square() {}")
            .unwrap_err();
        assert!(matches!(err, FilterError::PipelineCompilation { ref function, .. } if function == "octahedral_square"));

        let err = library
            .register("square_projection", "@compute @workgroup_size(1) fn fresh_name() {}")
            .unwrap_err();
        assert!(matches!(err, FilterError::PipelineCompilation { ref function, .. } if function == "square_projection"));
    }

    #[test]
    fn only_compute_entry_points_are_exported() {
        let mut library = ShaderLibrary::new();
        library
            .register(
                "mixed",
                "@compute @workgroup_size(1) fn invert() {}\n\
                 @vertex fn vs() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }",
            )
            .unwrap();
        assert_eq!(library.modules()[0].functions(), ["invert".to_string()]);
    }
}
