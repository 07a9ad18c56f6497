use std::fmt;

use fxhash::FxHashMap;
use log::debug;

use crate::gpu::{self, DebugView};
use crate::{Error, Result};

/// Upper bound of `num_buckets + num_tiles_per_bucket`.
const MAX_HASH_GRID_TILES_LOG2: u32 = 24;

/// Upper bound of every radius option of the glossy reflections.
pub const MAX_GLOSSY_RADIUS: u32 = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionKind {
    Bool,
    Int,
    Float,
    String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    String(String),
}

impl OptionValue {
    pub fn kind(&self) -> OptionKind {
        match self {
            Self::Bool(_) => OptionKind::Bool,
            Self::Int(_) => OptionKind::Int,
            Self::Float(_) => OptionKind::Float,
            Self::String(_) => OptionKind::String,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(val) => write!(f, "{val}"),
            Self::Int(val) => write!(f, "{val}"),
            Self::Float(val) => write!(f, "{val}"),
            Self::String(val) => write!(f, "{val}"),
        }
    }
}

/// What has to happen to a running pipeline when an option changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionEffect {
    /// Picked up by the next frame.
    None,

    /// Kernels have to be rebuilt; the pipeline gets terminated and
    /// initialized from scratch.
    Recompile,

    /// Cached radiance is no longer valid and the hash grid gets cleared.
    ClearHashGrid,

    /// Buffers of the option's owner change size and get recreated.
    Reallocate,
}

/// Component an option belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OptionOwner {
    Pipeline,
    HashGridCache,
    ReservoirCache,
    GlossyReflections,
}

#[derive(Clone, Copy, Debug)]
pub struct OptionSpec {
    pub name: &'static str,
    pub kind: OptionKind,
    pub effect: OptionEffect,
    pub owner: OptionOwner,
}

impl OptionSpec {
    pub fn find(name: &str) -> Option<&'static OptionSpec> {
        SCHEMA.iter().find(|spec| spec.name == name)
    }

    pub fn default_value(&self) -> OptionValue {
        GiConfig::default().get(self.name).unwrap_or_else(|_| {
            unreachable!("option `{}` is missing its field", self.name)
        })
    }
}

/// Denoiser applied to glossy reflections.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DenoiserMode {
    /// Two single-axis passes of the split ratio estimator.
    SplitRatio = 0,

    /// Iterative à-trous wavelet filter.
    #[default]
    Atrous = 1,

    /// No denoising; the traced result is used as-is.
    Passthrough = 2,
}

trait OptionType: Sized {
    const KIND: OptionKind;

    fn to_value(&self) -> OptionValue;
    fn from_value(name: &str, value: OptionValue) -> Result<Self>;
}

fn mismatched(name: &str, expected: OptionKind, value: &OptionValue) -> Error {
    Error::MismatchedOption {
        name: name.into(),
        expected,
        got: value.kind(),
    }
}

impl OptionType for bool {
    const KIND: OptionKind = OptionKind::Bool;

    fn to_value(&self) -> OptionValue {
        OptionValue::Bool(*self)
    }

    fn from_value(name: &str, value: OptionValue) -> Result<Self> {
        match value {
            OptionValue::Bool(val) => Ok(val),
            value => Err(mismatched(name, Self::KIND, &value)),
        }
    }
}

impl OptionType for u32 {
    const KIND: OptionKind = OptionKind::Int;

    fn to_value(&self) -> OptionValue {
        OptionValue::Int(*self as i64)
    }

    fn from_value(name: &str, value: OptionValue) -> Result<Self> {
        match value {
            OptionValue::Int(val) => u32::try_from(val).map_err(|_| {
                Error::invalid(format!("`{name}` is out of range: {val}"))
            }),
            value => Err(mismatched(name, Self::KIND, &value)),
        }
    }
}

impl OptionType for f32 {
    const KIND: OptionKind = OptionKind::Float;

    fn to_value(&self) -> OptionValue {
        OptionValue::Float(*self)
    }

    fn from_value(name: &str, value: OptionValue) -> Result<Self> {
        match value {
            OptionValue::Float(val) => Ok(val),
            OptionValue::Int(val) => Ok(val as f32),
            value => Err(mismatched(name, Self::KIND, &value)),
        }
    }
}

impl OptionType for DenoiserMode {
    const KIND: OptionKind = OptionKind::Int;

    fn to_value(&self) -> OptionValue {
        OptionValue::Int(*self as i64)
    }

    fn from_value(name: &str, value: OptionValue) -> Result<Self> {
        match u32::from_value(name, value)? {
            0 => Ok(Self::SplitRatio),
            1 => Ok(Self::Atrous),
            2 => Ok(Self::Passthrough),
            mode => Err(Error::invalid(format!(
                "`{name}` must be 0, 1 or 2, got {mode}"
            ))),
        }
    }
}

impl OptionType for DebugView {
    const KIND: OptionKind = OptionKind::String;

    fn to_value(&self) -> OptionValue {
        OptionValue::String(self.name().into())
    }

    fn from_value(name: &str, value: OptionValue) -> Result<Self> {
        match value {
            OptionValue::String(view) => {
                DebugView::from_name(&view).ok_or_else(|| {
                    Error::invalid(format!("unknown debug view: `{view}`"))
                })
            }
            value => Err(mismatched(name, Self::KIND, &value)),
        }
    }
}

macro_rules! options {
    ([ $(
        $( #[doc = $doc:literal] )*
        $field:ident: $ty:ty = $default:expr => $effect:ident, $owner:ident,
    )* ]) => {
        #[derive(Clone, Debug, PartialEq)]
        pub struct GiConfig {
            $(
                $( #[doc = $doc] )*
                pub $field: $ty,
            )*
        }

        impl Default for GiConfig {
            fn default() -> Self {
                Self {
                    $( $field: $default, )*
                }
            }
        }

        /// Every option understood by [`GiConfig`].
        pub const SCHEMA: &[OptionSpec] = &[
            $(
                OptionSpec {
                    name: concat!("gi10_", stringify!($field)),
                    kind: <$ty as OptionType>::KIND,
                    effect: OptionEffect::$effect,
                    owner: OptionOwner::$owner,
                },
            )*
        ];

        impl GiConfig {
            pub fn get(&self, name: &str) -> Result<OptionValue> {
                match name {
                    $(
                        concat!("gi10_", stringify!($field)) => {
                            Ok(self.$field.to_value())
                        }
                    )*
                    _ => Err(Error::UnknownOption(name.into())),
                }
            }

            /// Sets given option without validating the resulting
            /// configuration; see [`Self::validate()`].
            pub fn set(&mut self, name: &str, value: OptionValue) -> Result<()> {
                match name {
                    $(
                        concat!("gi10_", stringify!($field)) => {
                            self.$field = <$ty as OptionType>::from_value(
                                name,
                                value,
                            )?;
                        }
                    )*
                    _ => return Err(Error::UnknownOption(name.into())),
                }

                Ok(())
            }
        }
    };
}

options!([
    use_resampling: bool = false => Recompile, Pipeline,
    use_alpha_testing: bool = true => Recompile, Pipeline,
    use_direct_lighting: bool = true => None, Pipeline,
    disable_albedo_textures: bool = false => None, Pipeline,

    /// Size of a cell, in pixels, as seen by the camera.
    hash_grid_cache_cell_size: f32 = 32.0 => ClearHashGrid, HashGridCache,
    hash_grid_cache_min_cell_size: f32 = 1e-1 => ClearHashGrid, HashGridCache,

    /// Edge of a tile, in cells of its finest mip.
    hash_grid_cache_tile_cell_ratio: u32 = 8 => Reallocate, HashGridCache,

    /// Log2 of the number of buckets.
    hash_grid_cache_num_buckets: u32 = 12 => Reallocate, HashGridCache,

    /// Log2 of the number of tiles a bucket holds.
    hash_grid_cache_num_tiles_per_bucket: u32 = 4 => Reallocate, HashGridCache,
    hash_grid_cache_max_sample_count: f32 = 16.0 => None, HashGridCache,
    hash_grid_cache_max_tile_decay: u32 = 16 => None, HashGridCache,
    hash_grid_cache_debug_mip_level: u32 = 0 => ClearHashGrid, HashGridCache,
    hash_grid_cache_debug_propagate: bool = false => ClearHashGrid, HashGridCache,

    /// When non-zero, hash grid debug views show only the cells written to
    /// within that many frames.
    hash_grid_cache_debug_max_cell_decay: u32 = 0 => None, HashGridCache,

    reservoir_cache_cell_size: f32 = 16.0 => None, ReservoirCache,

    /// Log2 of the number of cells.
    reservoir_cache_num_cells: u32 = 14 => Reallocate, ReservoirCache,

    glossy_reflections_halfres: bool = true => Reallocate, GlossyReflections,
    glossy_reflections_denoiser_mode: DenoiserMode = DenoiserMode::Atrous => Reallocate, GlossyReflections,
    glossy_reflections_atrous_pass_count: u32 = 4 => None, GlossyReflections,
    glossy_reflections_low_roughness_threshold: f32 = 0.2 => None, GlossyReflections,
    glossy_reflections_high_roughness_threshold: f32 = 0.6 => None, GlossyReflections,
    glossy_reflections_full_radius: u32 = 11 => None, GlossyReflections,
    glossy_reflections_half_radius: u32 = 5 => None, GlossyReflections,
    glossy_reflections_mark_fireflies_full_radius: u32 = 3 => None, GlossyReflections,
    glossy_reflections_mark_fireflies_half_radius: u32 = 2 => None, GlossyReflections,
    glossy_reflections_mark_fireflies_full_low_threshold: f32 = 0.5 => None, GlossyReflections,
    glossy_reflections_mark_fireflies_half_low_threshold: f32 = 0.5 => None, GlossyReflections,
    glossy_reflections_mark_fireflies_full_high_threshold: f32 = 4.0 => None, GlossyReflections,
    glossy_reflections_mark_fireflies_half_high_threshold: f32 = 4.0 => None, GlossyReflections,
    glossy_reflections_cleanup_fireflies_full_radius: u32 = 2 => None, GlossyReflections,
    glossy_reflections_cleanup_fireflies_half_radius: u32 = 1 => None, GlossyReflections,

    /// Recompiles only when switching into or out of the `HashGridCache_`
    /// views.
    debug_view: DebugView = DebugView::None => Recompile, Pipeline,
]);

impl GiConfig {
    /// Builds a configuration out of named options; options that aren't
    /// present keep their defaults.
    pub fn from_options(options: &FxHashMap<String, OptionValue>) -> Result<Self> {
        let mut this = Self::default();

        for (name, value) in options {
            this.set(name, value.clone())?;
        }

        this.validate()?;

        Ok(this)
    }

    pub fn to_options(&self) -> FxHashMap<String, OptionValue> {
        SCHEMA
            .iter()
            .filter_map(|spec| {
                Some((spec.name.to_string(), self.get(spec.name).ok()?))
            })
            .collect()
    }

    /// Returns how many words the cells of the hash grid cache take, or
    /// `None` if they couldn't be addressed with 32-bit indices.
    pub(crate) fn hash_grid_cache_words(&self) -> Option<u32> {
        let (_, _, cells_per_tile) =
            gpu::HashGridParams::layout(self.hash_grid_cache_tile_cell_ratio)?;

        let num_tiles_log2 = self
            .hash_grid_cache_num_buckets
            .checked_add(self.hash_grid_cache_num_tiles_per_bucket)?;

        1u32.checked_shl(num_tiles_log2)?
            .checked_mul(cells_per_tile)?
            .checked_mul(4)
    }

    pub fn validate(&self) -> Result<()> {
        fn check(cond: bool, reason: impl FnOnce() -> String) -> Result<()> {
            if cond {
                Ok(())
            } else {
                Err(Error::InvalidConfiguration(reason()))
            }
        }

        check(
            gpu::HashGridParams::layout(self.hash_grid_cache_tile_cell_ratio)
                .is_some(),
            || {
                format!(
                    "tile cell ratio must lie within 8..=15 so that every mip \
                     keeps at least one cell, got {}",
                    self.hash_grid_cache_tile_cell_ratio
                )
            },
        )?;

        let num_tiles_log2 = self
            .hash_grid_cache_num_buckets
            .checked_add(self.hash_grid_cache_num_tiles_per_bucket)
            .filter(|&n| n <= MAX_HASH_GRID_TILES_LOG2);

        check(num_tiles_log2.is_some(), || {
            format!(
                "hash grid cache cannot have more than 2^{} tiles",
                MAX_HASH_GRID_TILES_LOG2
            )
        })?;

        check(self.hash_grid_cache_words().is_some(), || {
            "hash grid cache has too many cells to be addressed".into()
        })?;

        check(
            self.hash_grid_cache_cell_size.is_finite()
                && self.hash_grid_cache_cell_size > 0.0,
            || "hash grid cache cell size must be positive".into(),
        )?;

        check(
            self.hash_grid_cache_min_cell_size.is_finite()
                && self.hash_grid_cache_min_cell_size > 0.0,
            || "hash grid cache min cell size must be positive".into(),
        )?;

        check(self.hash_grid_cache_max_sample_count >= 1.0, || {
            "hash grid cache max sample count must be at least 1".into()
        })?;

        check(self.hash_grid_cache_max_tile_decay >= 1, || {
            "hash grid cache max tile decay must be at least 1".into()
        })?;

        check(
            (self.hash_grid_cache_debug_mip_level as usize) < gpu::HASH_GRID_MIPS,
            || {
                format!(
                    "debug mip level must be below {}, got {}",
                    gpu::HASH_GRID_MIPS,
                    self.hash_grid_cache_debug_mip_level
                )
            },
        )?;

        check(
            self.reservoir_cache_cell_size.is_finite()
                && self.reservoir_cache_cell_size > 0.0,
            || "reservoir cache cell size must be positive".into(),
        )?;

        check((1..=24).contains(&self.reservoir_cache_num_cells), || {
            format!(
                "reservoir cache must have between 2^1 and 2^24 cells, got 2^{}",
                self.reservoir_cache_num_cells
            )
        })?;

        check(self.glossy_reflections_atrous_pass_count >= 2, || {
            format!(
                "atrous denoiser needs at least 2 passes, got {}",
                self.glossy_reflections_atrous_pass_count
            )
        })?;

        check(self.glossy_reflections_atrous_pass_count <= 16, || {
            format!(
                "atrous denoiser supports at most 16 passes, got {}",
                self.glossy_reflections_atrous_pass_count
            )
        })?;

        check(
            0.0 <= self.glossy_reflections_low_roughness_threshold
                && self.glossy_reflections_low_roughness_threshold
                    <= self.glossy_reflections_high_roughness_threshold
                && self.glossy_reflections_high_roughness_threshold <= 1.0,
            || "roughness thresholds must satisfy 0 <= low <= high <= 1".into(),
        )?;

        for (name, radius) in [
            ("denoiser full", self.glossy_reflections_full_radius),
            ("denoiser half", self.glossy_reflections_half_radius),
            (
                "mark fireflies full",
                self.glossy_reflections_mark_fireflies_full_radius,
            ),
            (
                "mark fireflies half",
                self.glossy_reflections_mark_fireflies_half_radius,
            ),
            (
                "cleanup fireflies full",
                self.glossy_reflections_cleanup_fireflies_full_radius,
            ),
            (
                "cleanup fireflies half",
                self.glossy_reflections_cleanup_fireflies_half_radius,
            ),
        ] {
            check(radius <= MAX_GLOSSY_RADIUS, || {
                format!(
                    "{name} radius must be at most {MAX_GLOSSY_RADIUS}, got {radius}"
                )
            })?;
        }

        for (name, threshold) in [
            (
                "full low",
                self.glossy_reflections_mark_fireflies_full_low_threshold,
            ),
            (
                "half low",
                self.glossy_reflections_mark_fireflies_half_low_threshold,
            ),
            (
                "full high",
                self.glossy_reflections_mark_fireflies_full_high_threshold,
            ),
            (
                "half high",
                self.glossy_reflections_mark_fireflies_half_high_threshold,
            ),
        ] {
            check(threshold >= 0.0, || {
                format!("{name} firefly threshold cannot be negative")
            })?;
        }

        Ok(())
    }

    /// Works out what applying `self` over `prev` requires.
    pub fn changes_from(&self, prev: &Self) -> ConfigChanges {
        let mut changes = ConfigChanges::default();

        for spec in SCHEMA {
            if self.get(spec.name).ok() == prev.get(spec.name).ok() {
                continue;
            }

            debug!(
                "Option `{}` changed: {} -> {}",
                spec.name,
                prev.get(spec.name).map(|v| v.to_string()).unwrap_or_default(),
                self.get(spec.name).map(|v| v.to_string()).unwrap_or_default(),
            );

            changes.options.push(spec.name);

            match spec.effect {
                OptionEffect::None => {
                    //
                }

                OptionEffect::Recompile => {
                    if spec.name == "gi10_debug_view" {
                        changes.recompile |= self.debug_view.is_hash_grid()
                            != prev.debug_view.is_hash_grid();
                    } else {
                        changes.recompile = true;
                    }
                }

                OptionEffect::ClearHashGrid => {
                    changes.clear_hash_grid = true;
                }

                OptionEffect::Reallocate => {
                    if !changes.reallocate.contains(&spec.owner) {
                        changes.reallocate.push(spec.owner);
                    }
                }
            }
        }

        changes
    }

    /// Returns the mip level hash grid resolves start at; views that show
    /// filtered values always go from the finest mip.
    pub fn effective_debug_mip_level(&self) -> u32 {
        if self.debug_view.is_filtered() {
            0
        } else {
            self.hash_grid_cache_debug_mip_level
        }
    }

    pub fn effective_debug_propagate(&self) -> bool {
        self.hash_grid_cache_debug_propagate && !self.debug_view.is_filtered()
    }
}

/// Outcome of comparing two configurations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigChanges {
    /// Names of options that differ.
    pub options: Vec<&'static str>,
    pub recompile: bool,
    pub clear_hash_grid: bool,
    pub reallocate: Vec<OptionOwner>,
}

impl ConfigChanges {
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn reallocates(&self, owner: OptionOwner) -> bool {
        self.reallocate.contains(&owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_matches_defaults() {
        let config = GiConfig::default();

        assert_eq!(Ok(()), config.validate().map_err(|err| err.to_string()));

        for spec in SCHEMA {
            let value = config.get(spec.name).unwrap();

            assert_eq!(spec.kind, value.kind(), "{}", spec.name);
        }

        assert_eq!(
            OptionValue::Int(8),
            OptionSpec::find("gi10_hash_grid_cache_tile_cell_ratio")
                .unwrap()
                .default_value()
        );

        assert_eq!(
            OptionValue::String("None".into()),
            OptionSpec::find("gi10_debug_view").unwrap().default_value()
        );

        assert!(OptionSpec::find("gi10_nope").is_none());
    }

    #[test]
    fn options_round_trip() {
        let mut config = GiConfig::default();

        config.use_resampling = true;
        config.hash_grid_cache_cell_size = 24.0;
        config.glossy_reflections_denoiser_mode = DenoiserMode::Passthrough;
        config.debug_view = DebugView::HashGridCacheOccupancy;

        let options = config.to_options();

        assert_eq!(SCHEMA.len(), options.len());
        assert_eq!(config, GiConfig::from_options(&options).unwrap());
    }

    #[test]
    fn from_options_errors() {
        fn options(
            entries: &[(&str, OptionValue)],
        ) -> FxHashMap<String, OptionValue> {
            entries
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect()
        }

        // ---
        // Case 1: unknown option

        let err = GiConfig::from_options(&options(&[(
            "gi10_nope",
            OptionValue::Bool(true),
        )]))
        .unwrap_err();

        assert!(matches!(err, Error::UnknownOption(name) if name == "gi10_nope"));

        // ---
        // Case 2: wrong kind

        let err = GiConfig::from_options(&options(&[(
            "gi10_use_resampling",
            OptionValue::Int(1),
        )]))
        .unwrap_err();

        assert!(matches!(
            err,
            Error::MismatchedOption {
                expected: OptionKind::Bool,
                got: OptionKind::Int,
                ..
            }
        ));

        // ---
        // Case 3: tile's last mip shrinking below one cell

        let err = GiConfig::from_options(&options(&[(
            "gi10_hash_grid_cache_tile_cell_ratio",
            OptionValue::Int(4),
        )]))
        .unwrap_err();

        assert!(matches!(err, Error::InvalidConfiguration(_)));

        // ---
        // Case 4: unknown debug view

        let err = GiConfig::from_options(&options(&[(
            "gi10_debug_view",
            OptionValue::String("HashGridCache_Nope".into()),
        )]))
        .unwrap_err();

        assert!(matches!(err, Error::InvalidConfiguration(_)));

        // ---
        // Case 5: denoiser mode out of range

        let err = GiConfig::from_options(&options(&[(
            "gi10_glossy_reflections_denoiser_mode",
            OptionValue::Int(3),
        )]))
        .unwrap_err();

        assert!(matches!(err, Error::InvalidConfiguration(_)));

        // ---
        // Case 6: integers are accepted as floats

        let config = GiConfig::from_options(&options(&[(
            "gi10_hash_grid_cache_cell_size",
            OptionValue::Int(16),
        )]))
        .unwrap();

        assert_eq!(16.0, config.hash_grid_cache_cell_size);
    }

    #[test]
    fn validate_bounds() {
        fn is_invalid(config: GiConfig) -> bool {
            matches!(config.validate(), Err(Error::InvalidConfiguration(_)))
        }

        // ---
        // Case 1: 2^24 tiles whose cells don't fit 32-bit indices

        let config = GiConfig {
            hash_grid_cache_tile_cell_ratio: 15,
            hash_grid_cache_num_buckets: 24,
            hash_grid_cache_num_tiles_per_bucket: 0,
            ..Default::default()
        };

        assert!(config.hash_grid_cache_words().is_none());
        assert!(is_invalid(config.clone()));
        assert!(crate::HashGridCachePass::params(&config).is_err());

        // ---
        // Case 2: exponents whose sum wraps around

        assert!(is_invalid(GiConfig {
            hash_grid_cache_num_buckets: u32::MAX,
            hash_grid_cache_num_tiles_per_bucket: 2,
            ..Default::default()
        }));

        // ---
        // Case 3: grid that fits

        let config = GiConfig {
            hash_grid_cache_tile_cell_ratio: 8,
            hash_grid_cache_num_buckets: 18,
            hash_grid_cache_num_tiles_per_bucket: 4,
            ..Default::default()
        };

        assert_eq!(Some((1 << 22) * 85 * 4), config.hash_grid_cache_words());
        assert!(config.validate().is_ok());

        // ---
        // Case 4: radii

        assert!(is_invalid(GiConfig {
            glossy_reflections_full_radius: u32::MAX,
            ..Default::default()
        }));

        assert!(is_invalid(GiConfig {
            glossy_reflections_mark_fireflies_half_radius: MAX_GLOSSY_RADIUS + 1,
            ..Default::default()
        }));

        assert!(is_invalid(GiConfig {
            glossy_reflections_cleanup_fireflies_full_radius: 1000,
            ..Default::default()
        }));

        assert!(GiConfig {
            glossy_reflections_cleanup_fireflies_full_radius: MAX_GLOSSY_RADIUS,
            ..Default::default()
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn changes() {
        let prev = GiConfig::default();

        // ---
        // Case 1: nothing changed

        assert!(prev.changes_from(&prev).is_empty());

        // ---
        // Case 2: recompile

        let curr = GiConfig {
            use_resampling: true,
            ..prev.clone()
        };

        let changes = curr.changes_from(&prev);

        assert!(changes.recompile);
        assert!(!changes.clear_hash_grid);
        assert_eq!(vec!["gi10_use_resampling"], changes.options);

        // ---
        // Case 3: hash grid clear

        let curr = GiConfig {
            hash_grid_cache_cell_size: 16.0,
            ..prev.clone()
        };

        let changes = curr.changes_from(&prev);

        assert!(!changes.recompile);
        assert!(changes.clear_hash_grid);

        // ---
        // Case 4: reallocation

        let curr = GiConfig {
            hash_grid_cache_num_buckets: 10,
            glossy_reflections_halfres: false,
            glossy_reflections_denoiser_mode: DenoiserMode::SplitRatio,
            ..prev.clone()
        };

        let changes = curr.changes_from(&prev);

        assert!(!changes.recompile);
        assert!(changes.reallocates(OptionOwner::HashGridCache));
        assert!(changes.reallocates(OptionOwner::GlossyReflections));
        assert!(!changes.reallocates(OptionOwner::ReservoirCache));
        assert_eq!(2, changes.reallocate.len());

        // ---
        // Case 5: debug views recompile only when the category toggles

        let radiance_cache = GiConfig {
            debug_view: DebugView::RadianceCache,
            ..prev.clone()
        };

        let occupancy = GiConfig {
            debug_view: DebugView::HashGridCacheOccupancy,
            ..prev.clone()
        };

        let filtered = GiConfig {
            debug_view: DebugView::HashGridCacheFilteredRadiance,
            ..prev.clone()
        };

        assert!(!radiance_cache.changes_from(&prev).recompile);
        assert!(occupancy.changes_from(&radiance_cache).recompile);
        assert!(!filtered.changes_from(&occupancy).recompile);
        assert!(prev.changes_from(&filtered).recompile);

        // ---
        // Case 6: options without any effect

        let curr = GiConfig {
            use_direct_lighting: false,
            glossy_reflections_atrous_pass_count: 6,
            ..prev.clone()
        };

        let changes = curr.changes_from(&prev);

        assert!(!changes.is_empty());
        assert!(!changes.recompile);
        assert!(!changes.clear_hash_grid);
        assert!(changes.reallocate.is_empty());
    }

    #[test]
    fn filtered_views_force_finest_mip() {
        let config = GiConfig {
            hash_grid_cache_debug_mip_level: 2,
            hash_grid_cache_debug_propagate: true,
            ..Default::default()
        };

        assert_eq!(2, config.effective_debug_mip_level());
        assert!(config.effective_debug_propagate());

        let config = GiConfig {
            debug_view: DebugView::HashGridCacheFilteredSampleCount,
            ..config
        };

        assert_eq!(0, config.effective_debug_mip_level());
        assert!(!config.effective_debug_propagate());
    }
}
