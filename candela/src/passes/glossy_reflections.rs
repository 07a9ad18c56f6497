use glam::{ivec2, UVec2};
use log::debug;

use crate::gpu::{self, AtrousPass, GlossyMoments};
use crate::{
    Buffer, BufferIndex, Camera, DenoiserMode, Device, DoubleBuffered,
    FrameContext, GiConfig, KernelSet, Result, Texture,
};

/// Traces glossy reflections, denoises them with one of the
/// [`DenoiserMode`]s and accumulates them over time.
#[derive(Debug)]
pub struct GlossyReflectionsPass {
    params: gpu::GlossyReflectionsParams,
    half_res: bool,
    specular: Texture,
    direction: Texture,
    fireflies: Texture,
    denoiser: GlossyDenoiser,
    reflection: Texture,
    history: DoubleBuffered<Texture>,
}

/// Buffers owned by the active denoiser; switching modes drops the ones the
/// new mode doesn't use.
#[derive(Debug)]
enum GlossyDenoiser {
    SplitRatio {
        reflections: [Texture; 2],
        average_squared: [Texture; 2],
    },
    Atrous {
        reflections: [Texture; 2],
        standard_dev: Texture,
    },
    Passthrough,
}

impl GlossyReflectionsPass {
    pub fn new(
        device: &Device,
        config: &GiConfig,
        _: &KernelSet,
        camera: &Camera,
    ) -> Result<Self> {
        let mode = config.glossy_reflections_denoiser_mode;

        let trace_scale = if config.glossy_reflections_halfres
            && mode != DenoiserMode::Passthrough
        {
            2
        } else {
            1
        };

        let size = camera.viewport_size;
        let trace_size = (size + trace_scale - 1) / trace_scale;

        debug!(
            "Allocating glossy reflections; mode={mode:?}, trace_size={}x{}",
            trace_size.x, trace_size.y,
        );

        let pair = |label: &str| -> Result<[Texture; 2]> {
            Ok([
                Texture::new(device, format!("{label}_a"), trace_size)?,
                Texture::new(device, format!("{label}_b"), trace_size)?,
            ])
        };

        let denoiser = match mode {
            DenoiserMode::SplitRatio => GlossyDenoiser::SplitRatio {
                reflections: pair("candela_glossy_reflections")?,
                average_squared: pair("candela_glossy_average_squared")?,
            },

            DenoiserMode::Atrous => GlossyDenoiser::Atrous {
                reflections: pair("candela_glossy_reflections")?,
                standard_dev: Texture::new(
                    device,
                    "candela_glossy_standard_dev",
                    trace_size,
                )?,
            },

            DenoiserMode::Passthrough => GlossyDenoiser::Passthrough,
        };

        let mut this = Self {
            params: gpu::GlossyReflectionsParams {
                trace_width: trace_size.x,
                trace_height: trace_size.y,
                trace_scale,
                ..Default::default()
            },
            half_res: trace_scale == 2,
            specular: Texture::new(device, "candela_glossy_specular", trace_size)?,
            direction: Texture::new(
                device,
                "candela_glossy_direction",
                trace_size,
            )?,
            fireflies: Texture::new(
                device,
                "candela_glossy_fireflies",
                trace_size,
            )?,
            denoiser,
            reflection: Texture::new(device, "candela_glossy_reflection", size)?,
            history: DoubleBuffered::<Texture>::new(
                device,
                "candela_glossy_history",
                size,
                1,
            )?,
        };

        this.prepare(config);

        Ok(this)
    }

    /// Refreshes parameters that don't require reallocating anything.
    pub fn prepare(&mut self, config: &GiConfig) {
        let params = &mut self.params;

        params.low_roughness_threshold =
            config.glossy_reflections_low_roughness_threshold;

        params.high_roughness_threshold =
            config.glossy_reflections_high_roughness_threshold;

        if self.half_res {
            params.denoiser_radius = config.glossy_reflections_half_radius as i32;

            params.mark_fireflies_radius =
                config.glossy_reflections_mark_fireflies_half_radius as i32;

            params.mark_fireflies_low_threshold =
                config.glossy_reflections_mark_fireflies_half_low_threshold;

            params.mark_fireflies_high_threshold =
                config.glossy_reflections_mark_fireflies_half_high_threshold;

            params.cleanup_fireflies_radius =
                config.glossy_reflections_cleanup_fireflies_half_radius as i32;
        } else {
            params.denoiser_radius = config.glossy_reflections_full_radius as i32;

            params.mark_fireflies_radius =
                config.glossy_reflections_mark_fireflies_full_radius as i32;

            params.mark_fireflies_low_threshold =
                config.glossy_reflections_mark_fireflies_full_low_threshold;

            params.mark_fireflies_high_threshold =
                config.glossy_reflections_mark_fireflies_full_high_threshold;

            params.cleanup_fireflies_radius =
                config.glossy_reflections_cleanup_fireflies_full_radius as i32;
        }
    }

    pub fn params(&self) -> &gpu::GlossyReflectionsParams {
        &self.params
    }

    pub fn mode(&self) -> DenoiserMode {
        match self.denoiser {
            GlossyDenoiser::SplitRatio { .. } => DenoiserMode::SplitRatio,
            GlossyDenoiser::Atrous { .. } => DenoiserMode::Atrous,
            GlossyDenoiser::Passthrough => DenoiserMode::Passthrough,
        }
    }

    pub fn trace_size(&self) -> UVec2 {
        self.params.trace_size()
    }

    pub fn run(&self, ctxt: &FrameContext, grid: gpu::HashGrid) {
        let device = ctxt.device;
        let trace_size = self.trace_size();

        device.dispatch_2d("glossy_reflections_trace", trace_size, |pos| {
            gpu::GlossyReflectionsTrace {
                camera: ctxt.camera,
                scene: ctxt.scene,
                shading: ctxt.shading,
                params: &self.params,
                grid,
                gbuffer: ctxt.gbuffer,
                specular: self.specular.view(),
                direction: self.direction.view(),
            }
            .run(pos)
        });

        let (denoised, moments) = match &self.denoiser {
            GlossyDenoiser::SplitRatio {
                reflections,
                average_squared,
            } => {
                self.cleanup_fireflies(device, &reflections[1]);

                for (src, src_average_squared, dst, dst_average_squared, axis) in [
                    (
                        &reflections[1],
                        None,
                        &reflections[0],
                        &average_squared[0],
                        ivec2(1, 0),
                    ),
                    (
                        &reflections[0],
                        Some(average_squared[0].view()),
                        &reflections[1],
                        &average_squared[1],
                        ivec2(0, 1),
                    ),
                ] {
                    device.dispatch_2d(
                        "glossy_reflections_split_ratio",
                        trace_size,
                        |pos| {
                            gpu::GlossyReflectionsSplitRatio {
                                params: &self.params,
                                gbuffer: ctxt.gbuffer,
                                src: src.view(),
                                src_average_squared,
                                dst: dst.view(),
                                dst_average_squared: dst_average_squared.view(),
                                axis,
                            }
                            .run(pos)
                        },
                    );
                }

                (
                    &reflections[1],
                    GlossyMoments::AverageSquared {
                        mean: reflections[1].view(),
                        average_squared: average_squared[1].view(),
                    },
                )
            }

            GlossyDenoiser::Atrous {
                reflections,
                standard_dev,
            } => {
                self.cleanup_fireflies(device, &reflections[1]);

                let passes = ctxt.config.glossy_reflections_atrous_pass_count;

                for pass_idx in 0..passes {
                    let src = &reflections[((pass_idx + 1) % 2) as usize];
                    let dst = &reflections[(pass_idx % 2) as usize];
                    let pass = AtrousPass::new(pass_idx, passes);

                    device.dispatch_2d(
                        "glossy_reflections_atrous",
                        trace_size,
                        |pos| {
                            gpu::GlossyReflectionsAtrous {
                                params: &self.params,
                                gbuffer: ctxt.gbuffer,
                                pass,
                                src: src.view(),
                                dst: dst.view(),
                                standard_dev: standard_dev.view(),
                            }
                            .run(pos)
                        },
                    );
                }

                (
                    &reflections[((passes - 1) % 2) as usize],
                    GlossyMoments::StandardDev(standard_dev.view()),
                )
            }

            GlossyDenoiser::Passthrough => (&self.specular, GlossyMoments::None),
        };

        device.dispatch_2d(
            "glossy_reflections_upsample",
            self.reflection.size(),
            |pixel| {
                gpu::GlossyReflectionsUpsample {
                    params: &self.params,
                    gbuffer: ctxt.gbuffer,
                    src: denoised.view(),
                    dst: self.reflection.view(),
                }
                .run(pixel)
            },
        );

        if matches!(self.denoiser, GlossyDenoiser::Passthrough) {
            return;
        }

        let index = ctxt.index;

        device.dispatch_2d(
            "glossy_reflections_temporal",
            self.reflection.size(),
            |pixel| {
                gpu::GlossyReflectionsTemporal {
                    camera: ctxt.camera,
                    params: &self.params,
                    gbuffer: ctxt.gbuffer,
                    prev_gbuffer: ctxt.prev_gbuffer,
                    moments,
                    reflection: self.reflection.view(),
                    history: self.history.curr(index).view(),
                    prev_history: self.history.prev(index).view(),
                }
                .run(pixel)
            },
        );
    }

    fn cleanup_fireflies(&self, device: &Device, output: &Texture) {
        let trace_size = self.trace_size();

        device.dispatch_2d(
            "glossy_reflections_mark_fireflies",
            trace_size,
            |pos| {
                gpu::GlossyReflectionsMarkFireflies {
                    params: &self.params,
                    specular: self.specular.view(),
                    fireflies: self.fireflies.view(),
                }
                .run(pos)
            },
        );

        device.dispatch_2d(
            "glossy_reflections_cleanup_fireflies",
            trace_size,
            |pos| {
                gpu::GlossyReflectionsCleanupFireflies {
                    params: &self.params,
                    specular: self.specular.view(),
                    fireflies: self.fireflies.view(),
                    output: output.view(),
                }
                .run(pos)
            },
        );
    }

    /// Returns the final, full-resolution reflections of the frame rendered
    /// with given index.
    pub fn output(&self, index: BufferIndex) -> &Texture {
        match self.denoiser {
            GlossyDenoiser::Passthrough => &self.reflection,
            _ => self.history.curr(index),
        }
    }

    fn textures(&self) -> Vec<&Texture> {
        let mut textures = vec![
            &self.specular,
            &self.direction,
            &self.fireflies,
            &self.reflection,
        ];

        textures.extend(self.history.both());

        match &self.denoiser {
            GlossyDenoiser::SplitRatio {
                reflections,
                average_squared,
            } => {
                textures.extend(reflections);
                textures.extend(average_squared);
            }

            GlossyDenoiser::Atrous {
                reflections,
                standard_dev,
            } => {
                textures.extend(reflections);
                textures.push(standard_dev);
            }

            GlossyDenoiser::Passthrough => (),
        }

        textures
    }

    /// Returns labels of all textures currently allocated by this pass.
    pub fn labels(&self) -> Vec<&str> {
        self.textures().into_iter().map(|t| t.label()).collect()
    }

    pub fn bytes(&self) -> usize {
        self.textures().into_iter().map(|t| t.bytes()).sum()
    }
}
