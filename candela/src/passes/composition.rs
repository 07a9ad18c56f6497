use log::debug;

use crate::gpu::{self, DebugView};
use crate::{
    Buffer, Camera, Device, FrameContext, GiConfig, KernelSet, Result,
    StorageBuffer, Texture,
};

/// Combines denoised irradiance and reflections into the final indirect
/// lighting; renders the debug view, if one is active.
#[derive(Debug)]
pub struct CompositionPass {
    gi: Texture,
    debug: Texture,
}

/// Everything the debug view can look at.
pub struct DebugSources<'a> {
    pub grid: gpu::HashGrid<'a>,
    pub bucket_occupancy: &'a StorageBuffer,
    pub irradiance: &'a Texture,
    pub probe_radiance: &'a Texture,
    pub reflections: &'a Texture,
}

impl CompositionPass {
    pub fn new(
        device: &Device,
        _: &GiConfig,
        _: &KernelSet,
        camera: &Camera,
    ) -> Result<Self> {
        let size = camera.viewport_size;

        debug!("Allocating composition; size={}x{}", size.x, size.y);

        Ok(Self {
            gi: Texture::new(device, "candela_gi", size)?,
            debug: Texture::new(device, "candela_debug", size)?,
        })
    }

    pub fn resolve(
        &self,
        ctxt: &FrameContext,
        glossy: &gpu::GlossyReflectionsParams,
        irradiance: &Texture,
        reflections: &Texture,
    ) {
        ctxt.device.dispatch_2d("gi_resolve", self.gi.size(), |pixel| {
            gpu::GiResolve {
                shading: ctxt.shading,
                glossy,
                gbuffer: ctxt.gbuffer,
                irradiance: irradiance.view(),
                reflections: reflections.view(),
                output: self.gi.view(),
            }
            .run(pixel)
        });
    }

    pub fn debug(&self, ctxt: &FrameContext, sources: DebugSources) {
        let view = ctxt.config.debug_view;

        if view == DebugView::None {
            return;
        }

        ctxt.device.dispatch_2d("debug_view", self.debug.size(), |pixel| {
            gpu::DebugViewPass {
                view,
                camera: ctxt.camera,
                grid: sources.grid,
                debug_max_cell_decay: ctxt.config.hash_grid_cache_debug_max_cell_decay,
                gbuffer: ctxt.gbuffer,
                bucket_occupancy: sources.bucket_occupancy.view(),
                irradiance: sources.irradiance.view(),
                probe_radiance: sources.probe_radiance.view(),
                reflections: sources.reflections.view(),
                output: self.debug.view(),
            }
            .run(pixel)
        });
    }

    pub fn gi(&self) -> &Texture {
        &self.gi
    }

    pub fn debug_output(&self) -> &Texture {
        &self.debug
    }

    pub fn bytes(&self) -> usize {
        self.gi.bytes() + self.debug.bytes()
    }
}
