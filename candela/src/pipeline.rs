use std::path::Path;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{
    dump, gpu, Buffer, BufferIndex, Camera, DebugSources, Device, Error,
    FrameContext, GBuffer, GiConfig, GlossyReflectionsPass, HashGridCachePass,
    HashGridStats, Metrics, OptionOwner, ReservoirCachePass, Result,
    ScreenPasses, Texture,
};

/// Variant of the kernels the pipeline was initialized with.
///
/// Kernels are plain functions here, so "compiling" them boils down to
/// picking the flags below and allocating the buffers they need; changing
/// any of them requires a full reinitialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelSet {
    pub use_resampling: bool,
    pub use_alpha_testing: bool,
    pub debug_hash_grid: bool,

    /// Increases with each (re)initialization.
    pub generation: u32,
}

impl KernelSet {
    pub fn new(config: &GiConfig, generation: u32) -> Self {
        Self {
            use_resampling: config.use_resampling,
            use_alpha_testing: config.use_alpha_testing,
            debug_hash_grid: config.debug_view.is_hash_grid(),
            generation,
        }
    }
}

/// Real-time global illumination: screen probes fed by a world-space
/// radiance cache, glossy reflections and a temporal denoiser, rendered one
/// frame at a time.
#[derive(Debug)]
pub struct GiPipeline {
    config: GiConfig,
    kernels: KernelSet,
    rng: StdRng,
    frame: u32,
    index: BufferIndex,
    presented: BufferIndex,
    hash_grid: HashGridCachePass,
    screen: Option<ScreenState>,
}

#[derive(Debug)]
struct ScreenState {
    camera: Camera,
    prev_camera: Option<Camera>,
    passes: ScreenPasses,
    prev_gbuffer: GBuffer,
}

impl ScreenState {
    fn new(
        device: &Device,
        config: &GiConfig,
        kernels: &KernelSet,
        camera: &Camera,
    ) -> Result<Self> {
        Ok(Self {
            camera: camera.clone(),
            prev_camera: None,
            passes: ScreenPasses::new(device, config, kernels, camera)?,
            prev_gbuffer: GBuffer::new(
                device,
                "candela_prev_gbuffer",
                camera.viewport_size,
            )?,
        })
    }
}

/// Snapshot of the pipeline's diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frame: u32,
    pub generation: u32,

    /// Hash grid statistics; lag a few frames behind, since they go through
    /// the readback ring.
    pub hash_grid: Option<HashGridStats>,

    /// Memory taken by all of the pipeline's buffers, in bytes.
    pub memory: usize,
}

impl GiPipeline {
    pub fn new(device: &Device, config: GiConfig) -> Result<Self> {
        Self::with_seed(device, config, rand::thread_rng().gen())
    }

    /// Creates a pipeline whose per-frame seeds are deterministic.
    pub fn with_seed(device: &Device, config: GiConfig, seed: u64) -> Result<Self> {
        config.validate()?;

        info!("Initializing GI pipeline");

        let kernels = KernelSet::new(&config, 1);
        let hash_grid = HashGridCachePass::new(device, &config, &kernels)?;

        debug!("GI pipeline initialized; kernels={kernels:?}");

        Ok(Self {
            config,
            kernels,
            rng: StdRng::seed_from_u64(seed),
            frame: 1,
            index: Default::default(),
            presented: Default::default(),
            hash_grid,
            screen: None,
        })
    }

    pub fn config(&self) -> &GiConfig {
        &self.config
    }

    pub fn kernels(&self) -> &KernelSet {
        &self.kernels
    }

    /// Returns the number of the frame that will be rendered next.
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Returns the index the last frame was rendered with.
    pub fn index(&self) -> BufferIndex {
        self.presented
    }

    /// Applies a new configuration, reinitializing, reallocating or
    /// clearing whatever it requires.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid; use [`GiConfig::validate()`]
    /// or [`GiConfig::from_options()`] beforehand.
    pub fn set_config(&mut self, device: &Device, config: GiConfig) -> Result<()> {
        if let Err(err) = config.validate() {
            panic!("Tried to apply an invalid configuration: {err}");
        }

        let changes = config.changes_from(&self.config);

        if changes.is_empty() {
            return Ok(());
        }

        self.config = config;

        if changes.recompile {
            return self.reinitialize(device);
        }

        if changes.reallocates(OptionOwner::HashGridCache) {
            debug!("Reallocating hash grid cache");

            self.hash_grid =
                HashGridCachePass::new(device, &self.config, &self.kernels)?;
        } else if changes.clear_hash_grid {
            self.hash_grid.clear(device);
        }

        if let Some(screen) = &mut self.screen {
            if changes.reallocates(OptionOwner::ReservoirCache) {
                debug!("Reallocating reservoir cache");

                screen.passes.reservoir_cache = ReservoirCachePass::new(
                    device,
                    &self.config,
                    &self.kernels,
                    &screen.camera,
                )?;
            }

            if changes.reallocates(OptionOwner::GlossyReflections) {
                debug!("Reallocating glossy reflections");

                screen.passes.glossy_reflections = GlossyReflectionsPass::new(
                    device,
                    &self.config,
                    &self.kernels,
                    &screen.camera,
                )?;
            }
        }

        Ok(())
    }

    /// Tears everything down and initializes it again, with kernels matching
    /// the current configuration.
    fn reinitialize(&mut self, device: &Device) -> Result<()> {
        info!("Terminating GI pipeline (recompiling kernels)");

        self.screen = None;
        self.kernels = KernelSet::new(&self.config, self.kernels.generation + 1);
        self.hash_grid = HashGridCachePass::new(device, &self.config, &self.kernels)?;

        info!(
            "GI pipeline reinitialized; generation={}",
            self.kernels.generation
        );

        Ok(())
    }

    /// Forgets everything the radiance cache has gathered so far.
    pub fn clear_hash_grid(&mut self, device: &Device) {
        self.hash_grid.clear(device);
    }

    /// Renders a single frame.
    ///
    /// `gbuffer` must describe what `camera` sees, i.e. it must be of the
    /// same size as the viewport.
    pub fn render(
        &mut self,
        device: &Device,
        scene: &dyn gpu::SceneQuery,
        camera: &Camera,
        gbuffer: &GBuffer,
    ) -> Result<()> {
        if gbuffer.size() != camera.viewport_size {
            return Err(Error::invalid(format!(
                "g-buffer is {}x{}, but the viewport is {}x{}",
                gbuffer.size().x,
                gbuffer.size().y,
                camera.viewport_size.x,
                camera.viewport_size.y,
            )));
        }

        let screen = match &mut self.screen {
            Some(screen) if !screen.camera.is_invalidated_by(camera) => screen,

            screen => {
                if screen.is_some() {
                    debug!("Rebuilding passes for camera: {}", camera.describe());
                } else {
                    info!("Creating camera: {}", camera.describe());
                }

                *screen = None;

                screen.insert(ScreenState::new(
                    device,
                    &self.config,
                    &self.kernels,
                    camera,
                )?)
            }
        };

        let index = self.index;
        let frame = self.frame;
        let gpu_camera = camera.serialize(screen.prev_camera.as_ref());

        let shading = gpu::ShadingParams {
            seed: self.rng.gen(),
            frame,
            use_direct_lighting: self.config.use_direct_lighting as u32,
            use_alpha_testing: self.kernels.use_alpha_testing as u32,
            disable_albedo_textures: self.config.disable_albedo_textures as u32,
        };

        self.hash_grid.prepare(&self.config, &gpu_camera, frame);

        screen
            .passes
            .reservoir_cache
            .prepare(&self.config, &gpu_camera);

        screen.passes.glossy_reflections.prepare(&self.config);

        let mut metrics = Metrics::default();

        {
            let ctxt = FrameContext {
                device,
                config: &self.config,
                kernels: &self.kernels,
                scene,
                camera: &gpu_camera,
                shading: &shading,
                gbuffer: gbuffer.map(),
                prev_gbuffer: screen.prev_gbuffer.map(),
                index,
                frame,
            };

            let passes = &screen.passes;
            let probes = &passes.screen_probes;
            let reservoirs = &passes.reservoir_cache;
            let hash_grid = &self.hash_grid;
            let grid = hash_grid.grid(index);

            metrics.measure("purge", || hash_grid.purge(device, index));

            metrics.measure("screen_probes", || {
                probes.begin_frame(device);
                reservoirs.begin_frame(device);
                probes.reproject(&ctxt);
                probes.lookup(&ctxt);
                probes.spawn(&ctxt);
                probes.sample(&ctxt);

                probes.populate(
                    &ctxt,
                    grid,
                    reservoirs.visibility_rays(),
                    reservoirs.visibility_count(),
                );
            });

            metrics.measure("reservoir_cache", || reservoirs.run(&ctxt, grid));

            metrics.measure("hash_grid", || {
                hash_grid.populate(
                    device,
                    index,
                    reservoirs.visibility_rays(),
                    reservoirs.output(),
                    reservoirs.visibility_count(),
                    reservoirs.max_ray_count(),
                );

                hash_grid.update(device, index);

                hash_grid.resolve(
                    device,
                    index,
                    probes.hits(),
                    probes.ray_radiance(),
                    probes.ray_count(),
                    probes.screen_params().max_ray_count,
                );
            });

            metrics.measure("screen_probes_resolve", || {
                probes.blend(&ctxt);
                probes.filter(&ctxt);
                probes.resolve(&ctxt);
            });

            metrics.measure("glossy_reflections", || {
                passes.glossy_reflections.run(&ctxt, grid)
            });

            metrics.measure("gi_denoiser", || {
                passes.gi_denoiser.run(&ctxt, probes.irradiance())
            });

            metrics.measure("composition", || {
                passes.composition.resolve(
                    &ctxt,
                    passes.glossy_reflections.params(),
                    passes.gi_denoiser.output(),
                    passes.glossy_reflections.output(index),
                );

                passes.composition.debug(
                    &ctxt,
                    DebugSources {
                        grid,
                        bucket_occupancy: hash_grid.bucket_occupancy(),
                        irradiance: probes.irradiance(),
                        probe_radiance: probes.filtered_radiance(),
                        reflections: passes.glossy_reflections.output(index),
                    },
                );
            });
        }

        metrics.measure("stats", || self.hash_grid.collect_stats(device, frame));

        screen.prev_gbuffer.copy_from(device, gbuffer);
        screen.prev_camera = Some(camera.clone());
        screen.camera = camera.clone();

        metrics.flush(frame);

        self.presented = index;
        self.index.flip();
        self.frame += 1;

        Ok(())
    }

    /// Returns the screen passes, if any frame has been rendered since the
    /// last (re)initialization.
    pub fn passes(&self) -> Option<&ScreenPasses> {
        self.screen.as_ref().map(|screen| &screen.passes)
    }

    pub fn hash_grid(&self) -> &HashGridCachePass {
        &self.hash_grid
    }

    /// Returns the denoised diffuse irradiance.
    pub fn irradiance(&self) -> Option<&Texture> {
        self.passes().map(|passes| passes.gi_denoiser.output())
    }

    /// Returns the denoised glossy reflections.
    pub fn reflections(&self) -> Option<&Texture> {
        self.passes()
            .map(|passes| passes.glossy_reflections.output(self.presented))
    }

    /// Returns irradiance and reflections combined with the surfaces' albedo
    /// and specular color.
    pub fn global_illumination(&self) -> Option<&Texture> {
        self.passes().map(|passes| passes.composition.gi())
    }

    pub fn debug_output(&self) -> Option<&Texture> {
        self.passes().map(|passes| passes.composition.debug_output())
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            frame: self.frame,
            generation: self.kernels.generation,
            hash_grid: self.hash_grid.stats().cloned(),
            memory: self.hash_grid.bytes()
                + self.screen.as_ref().map_or(0, |screen| {
                    screen.passes.bytes() + screen.prev_gbuffer.bytes()
                }),
        }
    }

    /// Writes the pipeline's outputs as PNGs into given directory, one file
    /// per texture, named after its label.
    pub fn dump(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();

        let textures = [
            self.irradiance(),
            self.reflections(),
            self.global_illumination(),
            self.debug_output(),
        ];

        for texture in textures.into_iter().flatten() {
            dump(texture, dir.join(format!("{}.png", texture.label())))?;
        }

        Ok(())
    }
}

impl Drop for GiPipeline {
    fn drop(&mut self) {
        info!("Terminating GI pipeline");
    }
}
