//! Options used when creating a [`crate::FilterContext`].
//!
//! Besides adapter selection, the options carry the output resolutions
//! that filters derive from the context rather than from their own
//! parameters.  Leaving a resolution unset lets each filter derive it
//! from its input.

use std::env;

use log::warn;

/// Environment variable overriding [`ContextOptions::cube_face_size`].
pub const ENV_CUBE_FACE_SIZE: &str = "FILTER_CHAIN_CUBE_FACE_SIZE";
/// Environment variable overriding [`ContextOptions::square_size`].
pub const ENV_SQUARE_SIZE: &str = "FILTER_CHAIN_SQUARE_SIZE";
/// Environment variable forcing the software fallback adapter.
pub const ENV_FALLBACK_ADAPTER: &str = "FILTER_CHAIN_FALLBACK_ADAPTER";
/// Environment variable selecting the power preference (`low` or `high`).
pub const ENV_POWER: &str = "FILTER_CHAIN_POWER";
/// Environment variable restricting the backends, e.g. `vulkan,gl`.
pub const ENV_BACKENDS: &str = "FILTER_CHAIN_BACKENDS";

#[derive(Debug, Clone, PartialEq)]
pub struct ContextOptions {
    /// Label attached to the logical device.
    pub label: String,
    /// Backends the adapter may come from.
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
    /// Ask wgpu for its software adapter instead of real hardware.
    pub force_fallback_adapter: bool,
    /// Edge length of each cubemap face.  `None` derives it from the
    /// equirectangular input (`width / 4`).
    pub cube_face_size: Option<u32>,
    /// Edge length of square projections.  `None` derives it from the
    /// cube input (`2 * face size`).
    pub square_size: Option<u32>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            label: "filter_chain_device".to_string(),
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            cube_face_size: None,
            square_size: None,
        }
    }
}

impl ContextOptions {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_backends(mut self, backends: wgpu::Backends) -> Self {
        self.backends = backends;
        self
    }

    pub fn with_power_preference(mut self, preference: wgpu::PowerPreference) -> Self {
        self.power_preference = preference;
        self
    }

    pub fn with_fallback_adapter(mut self, force: bool) -> Self {
        self.force_fallback_adapter = force;
        self
    }

    pub fn with_cube_face_size(mut self, size: u32) -> Self {
        self.cube_face_size = Some(size);
        self
    }

    pub fn with_square_size(mut self, size: u32) -> Self {
        self.square_size = Some(size);
        self
    }

    /// Defaults overridden by the `FILTER_CHAIN_*` environment variables.
    ///
    /// Malformed values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::default().apply_vars(|key| env::var(key).ok())
    }

    fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(size) = lookup(ENV_CUBE_FACE_SIZE).and_then(|v| parse_size(ENV_CUBE_FACE_SIZE, &v)) {
            self.cube_face_size = Some(size);
        }
        if let Some(size) = lookup(ENV_SQUARE_SIZE).and_then(|v| parse_size(ENV_SQUARE_SIZE, &v)) {
            self.square_size = Some(size);
        }
        if let Some(value) = lookup(ENV_FALLBACK_ADAPTER) {
            self.force_fallback_adapter = matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(value) = lookup(ENV_BACKENDS) {
            let backends = wgpu::Backends::from_comma_list(&value);
            if backends.is_empty() {
                warn!("ignoring {ENV_BACKENDS}={value:?}; no known backend named");
            } else {
                self.backends = backends;
            }
        }
        if let Some(value) = lookup(ENV_POWER) {
            match value.trim().to_ascii_lowercase().as_str() {
                "low" => self.power_preference = wgpu::PowerPreference::LowPower,
                "high" => self.power_preference = wgpu::PowerPreference::HighPerformance,
                "none" => self.power_preference = wgpu::PowerPreference::None,
                other => warn!("ignoring {ENV_POWER}={other:?}; expected low, high or none"),
            }
        }
        self
    }
}

fn parse_size(key: &str, value: &str) -> Option<u32> {
    match value.trim().parse::<u32>() {
        Ok(size) if size > 0 => Some(size),
        _ => {
            warn!("ignoring {key}={value:?}; expected a positive integer");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn apply(vars: &[(&str, &str)]) -> ContextOptions {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ContextOptions::default().apply_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_derive_resolutions_from_input() {
        let options = ContextOptions::default();
        assert_eq!(options.cube_face_size, None);
        assert_eq!(options.square_size, None);
        assert!(!options.force_fallback_adapter);
    }

    #[test]
    fn environment_overrides_sizes_and_adapter() {
        let options = apply(&[
            (ENV_CUBE_FACE_SIZE, "256"),
            (ENV_SQUARE_SIZE, " 512 "),
            (ENV_FALLBACK_ADAPTER, "true"),
            (ENV_POWER, "low"),
            (ENV_BACKENDS, "gl"),
        ]);
        assert_eq!(options.cube_face_size, Some(256));
        assert_eq!(options.square_size, Some(512));
        assert!(options.force_fallback_adapter);
        assert_eq!(options.power_preference, wgpu::PowerPreference::LowPower);
        assert_eq!(options.backends, wgpu::Backends::GL);
    }

    #[test]
    fn malformed_values_are_ignored() {
        let options = apply(&[(ENV_CUBE_FACE_SIZE, "0"), (ENV_SQUARE_SIZE, "big"), (ENV_POWER, "turbo"), (ENV_BACKENDS, "glide")]);
        assert_eq!(options, ContextOptions::default());
    }

    #[test]
    fn builder_setters_chain() {
        let options = ContextOptions::default()
            .with_label("test")
            .with_cube_face_size(64)
            .with_square_size(128)
            .with_fallback_adapter(true);
        assert_eq!(options.label, "test");
        assert_eq!(options.cube_face_size, Some(64));
        assert_eq!(options.square_size, Some(128));
        assert!(options.force_fallback_adapter);
    }
}
