mod hash_grid_cache;

use log::debug;

pub use self::hash_grid_cache::*;
use crate::gpu::{self, SceneQuery};
use crate::{BufferIndex, Camera, Device, GiConfig, KernelSet, Result};

macro_rules! passes {
    ([ $( $name:ident => $class:ident, )* ]) => {
        $( mod $name; )*
        $( pub use self::$name::*; )*

        /// Passes whose resources follow the size of the viewport; the hash
        /// grid cache lives on its own, since it survives viewport changes.
        #[derive(Debug)]
        pub struct ScreenPasses {
            $( pub $name: $class, )*
        }

        impl ScreenPasses {
            pub fn new(
                device: &Device,
                config: &GiConfig,
                kernels: &KernelSet,
                camera: &Camera,
            ) -> Result<Self> {
                debug!("Initializing screen passes");

                Ok(Self {
                    $( $name: $class::new(device, config, kernels, camera)?, )*
                })
            }

            /// Returns the memory taken by every pass, in bytes.
            pub fn bytes(&self) -> usize {
                0 $( + self.$name.bytes() )*
            }
        }
    };
}

passes!([
    composition => CompositionPass,
    gi_denoiser => GiDenoiserPass,
    glossy_reflections => GlossyReflectionsPass,
    reservoir_cache => ReservoirCachePass,
    screen_probes => ScreenProbesPass,
]);

/// Everything a pass needs to know about the frame being rendered.
pub struct FrameContext<'a> {
    pub device: &'a Device,
    pub config: &'a GiConfig,
    pub kernels: &'a KernelSet,
    pub scene: &'a dyn SceneQuery,
    pub camera: &'a gpu::Camera,
    pub shading: &'a gpu::ShadingParams,
    pub gbuffer: gpu::GBufferMap<'a>,
    pub prev_gbuffer: gpu::GBufferMap<'a>,
    pub index: BufferIndex,
    pub frame: u32,
}

impl FrameContext<'_> {
    /// Returns a seed for given stage, derived from the frame's seed.
    pub fn seed(&self, stage: u32) -> u32 {
        self.shading.seed ^ stage.wrapping_mul(0x9e3779b9)
    }
}
