use glam::ivec2;
use log::debug;

use crate::{
    gpu, Buffer, Camera, Device, DoubleBuffered, FrameContext, GiConfig,
    KernelSet, Result, Texture,
};

const MAX_BLUR_RADIUS: u32 = 8;
const MAX_HISTORY: f32 = 32.0;

#[derive(Debug)]
pub struct GiDenoiserPass {
    params: gpu::GiDenoiserParams,
    color: DoubleBuffered<Texture>,
    blur_mask: [Texture; 2],
    scratch: Texture,
    output: Texture,
}

impl GiDenoiserPass {
    pub fn new(
        device: &Device,
        _: &GiConfig,
        _: &KernelSet,
        camera: &Camera,
    ) -> Result<Self> {
        let size = camera.viewport_size;

        debug!("Allocating GI denoiser; size={}x{}", size.x, size.y);

        Ok(Self {
            params: gpu::GiDenoiserParams {
                max_blur_radius: MAX_BLUR_RADIUS,
                max_history: MAX_HISTORY,
            },
            color: DoubleBuffered::<Texture>::new(
                device,
                "candela_gi_denoiser_color",
                size,
                1,
            )?,
            blur_mask: [
                Texture::new(device, "candela_gi_denoiser_blur_mask_a", size)?,
                Texture::new(device, "candela_gi_denoiser_blur_mask_b", size)?,
            ],
            scratch: Texture::new(device, "candela_gi_denoiser_scratch", size)?,
            output: Texture::new(device, "candela_gi_denoiser_output", size)?,
        })
    }

    pub fn run(&self, ctxt: &FrameContext, irradiance: &Texture) {
        let device = ctxt.device;
        let index = ctxt.index;
        let size = self.output.size();

        device.dispatch_2d("gi_denoiser_reproject", size, |pixel| {
            gpu::GiDenoiserReproject {
                camera: ctxt.camera,
                params: &self.params,
                gbuffer: ctxt.gbuffer,
                prev_gbuffer: ctxt.prev_gbuffer,
                irradiance: irradiance.view(),
                color: self.color.curr(index).view(),
                prev_color: self.color.prev(index).view(),
                blur_mask: self.blur_mask[0].view(),
            }
            .run(pixel)
        });

        device.dispatch_2d("gi_denoiser_filter_blur_mask", size, |pixel| {
            gpu::GiDenoiserFilterBlurMask {
                src: self.blur_mask[0].view(),
                dst: self.blur_mask[1].view(),
            }
            .run(pixel)
        });

        for (src, dst, axis) in [
            (self.color.curr(index), &self.scratch, ivec2(1, 0)),
            (&self.scratch, &self.output, ivec2(0, 1)),
        ] {
            device.dispatch_2d("gi_denoiser_filter", size, |pixel| {
                gpu::GiDenoiserFilter {
                    params: &self.params,
                    gbuffer: ctxt.gbuffer,
                    blur_mask: self.blur_mask[1].view(),
                    src: src.view(),
                    dst: dst.view(),
                    axis,
                }
                .run(pixel)
            });
        }
    }

    /// Returns the denoised irradiance.
    pub fn output(&self) -> &Texture {
        &self.output
    }

    pub fn bytes(&self) -> usize {
        self.color.both().iter().map(|t| t.bytes()).sum::<usize>()
            + self.blur_mask.iter().map(|t| t.bytes()).sum::<usize>()
            + self.scratch.bytes()
            + self.output.bytes()
    }
}
