mod common;

use std::collections::BTreeSet;

use candela::gpu::DebugView;
use candela::{
    Buffer, DenoiserMode, Device, DeviceDescriptor, Error, GBuffer, GiConfig,
    GiPipeline,
};
use glam::{vec3, UVec2, Vec4};

use self::common::*;

fn used_tiles(pipeline: &GiPipeline) -> usize {
    let grid = pipeline.hash_grid().grid(pipeline.index());

    (0..pipeline.hash_grid().num_tiles() as usize)
        .filter(|&tile| grid.hash.load(tile) != 0)
        .count()
}

fn cells(pipeline: &GiPipeline) -> Vec<Vec4> {
    let grid = pipeline.hash_grid().grid(pipeline.index());

    (0..pipeline.hash_grid().num_cells())
        .map(|idx| grid.read_cell(idx))
        .collect()
}

#[test]
fn renders_frames() {
    let device = device();
    let scene = room(vec3(5.0, 0.0, 0.0));
    let camera = camera(SIZE);
    let mut pipeline = GiPipeline::with_seed(&device, config(), 1234).unwrap();

    assert!(pipeline.irradiance().is_none());

    render(&device, &mut pipeline, &scene, &camera, 6);

    assert_eq!(7, pipeline.frame());

    for output in [
        pipeline.irradiance(),
        pipeline.reflections(),
        pipeline.global_illumination(),
        pipeline.debug_output(),
    ] {
        let output = output.unwrap();

        assert_eq!(SIZE, output.size());
        assert!(output.texels().iter().all(|texel| texel.is_finite()));
    }

    // Floor probes see the glowing wall, so some of them must have picked up
    // its (red) light
    let irradiance = pipeline.passes().unwrap().screen_probes.irradiance();

    assert!(irradiance.texels().iter().any(|texel| texel.x > 0.0));
    assert!(used_tiles(&pipeline) > 0);
    assert!(cells(&pipeline).iter().any(|cell| cell.x > 0.0));

    let stats = pipeline.stats();

    assert_eq!(7, stats.frame);
    assert_eq!(1, stats.generation);
    assert!(stats.memory > 0);
    assert!(stats.memory <= device.allocated());

    let hash_grid = stats.hash_grid.unwrap();

    assert!(hash_grid.used_tiles > 0);
    assert_eq!(256, hash_grid.free_buckets + hash_grid.used_buckets);
}

#[test]
fn cells_stay_within_max_sample_count() {
    let device = device();
    let scene = room(vec3(5.0, 0.0, 0.0));
    let camera = camera(SIZE);

    let config = GiConfig {
        hash_grid_cache_max_sample_count: 4.0,
        ..config()
    };

    let mut pipeline = GiPipeline::with_seed(&device, config, 1).unwrap();

    render(&device, &mut pipeline, &scene, &camera, 8);

    assert!(cells(&pipeline).iter().all(|cell| cell.w <= 4.0));
}

#[test]
fn clear_then_populate_leaves_no_stale_values() {
    let device = device();
    let camera = camera(SIZE);
    let mut pipeline = GiPipeline::with_seed(&device, config(), 1).unwrap();

    render(&device, &mut pipeline, &room(vec3(5.0, 0.0, 0.0)), &camera, 4);

    assert!(cells(&pipeline).iter().any(|cell| cell.x > 0.0));

    // ---

    pipeline.clear_hash_grid(&device);

    assert_eq!(0, used_tiles(&pipeline));
    assert!(cells(&pipeline).iter().all(|cell| *cell == Vec4::ZERO));

    // ---

    render(&device, &mut pipeline, &room(vec3(0.0, 5.0, 0.0)), &camera, 1);

    assert!(used_tiles(&pipeline) > 0);
    assert!(cells(&pipeline).iter().all(|cell| cell.x == 0.0));
    assert!(cells(&pipeline).iter().any(|cell| cell.y > 0.0));
}

#[test]
fn lru_stays_a_permutation() {
    let device = device();
    let scene = room(vec3(5.0, 0.0, 0.0));
    let mut pipeline = GiPipeline::with_seed(&device, config(), 1).unwrap();

    // Moving the camera around makes probes go off-screen and come back
    // from the cache
    for frame in 0..8 {
        let mut camera = camera(SIZE);

        camera.origin.x = (frame as f32 * 0.7).sin();

        render(&device, &mut pipeline, &scene, &camera, 1);

        let passes = pipeline.passes().unwrap();
        let lru = passes.screen_probes.lru(pipeline.index()).to_vec();
        let max_probe_count = passes.screen_probes.screen_params().max_probe_count;

        let slots: BTreeSet<_> = lru.iter().copied().collect();
        let expected: BTreeSet<_> = (0..max_probe_count).collect();

        assert_eq!(max_probe_count as usize, lru.len());
        assert_eq!(expected, slots, "frame {frame}");
    }
}

#[test]
fn recompile_bumps_generation_and_clears_cache() {
    let device = device();
    let scene = room(vec3(5.0, 0.0, 0.0));
    let camera = camera(SIZE);
    let mut pipeline = GiPipeline::with_seed(&device, config(), 1).unwrap();

    render(&device, &mut pipeline, &scene, &camera, 3);

    assert_eq!(1, pipeline.kernels().generation);
    assert!(used_tiles(&pipeline) > 0);

    // ---
    // Case 1: resampling

    pipeline
        .set_config(
            &device,
            GiConfig {
                use_resampling: true,
                ..config()
            },
        )
        .unwrap();

    assert_eq!(2, pipeline.kernels().generation);
    assert!(pipeline.kernels().use_resampling);
    assert!(pipeline.passes().is_none());
    assert_eq!(0, used_tiles(&pipeline));

    render(&device, &mut pipeline, &scene, &camera, 3);

    assert!(used_tiles(&pipeline) > 0);

    // ---
    // Case 2: switching between two non-hash-grid debug views

    pipeline
        .set_config(
            &device,
            GiConfig {
                use_resampling: true,
                debug_view: DebugView::RadianceCache,
                ..config()
            },
        )
        .unwrap();

    assert_eq!(2, pipeline.kernels().generation);
    assert!(pipeline.passes().is_some());

    // ---
    // Case 3: switching into a hash grid debug view

    pipeline
        .set_config(
            &device,
            GiConfig {
                use_resampling: true,
                debug_view: DebugView::HashGridCacheOccupancy,
                ..config()
            },
        )
        .unwrap();

    assert_eq!(3, pipeline.kernels().generation);
    assert!(pipeline.kernels().debug_hash_grid);

    render(&device, &mut pipeline, &scene, &camera, 2);

    assert!(pipeline
        .debug_output()
        .unwrap()
        .texels()
        .iter()
        .all(|texel| texel.is_finite()));
}

#[test]
fn renders_with_resampling() {
    let device = device();
    let scene = room(vec3(5.0, 0.0, 0.0));
    let camera = camera(SIZE);

    let config = GiConfig {
        use_resampling: true,
        ..config()
    };

    let mut pipeline = GiPipeline::with_seed(&device, config, 4321).unwrap();

    render(&device, &mut pipeline, &scene, &camera, 4);

    let irradiance = pipeline.irradiance().unwrap();

    assert!(irradiance.texels().iter().all(|texel| texel.is_finite()));
    assert!(cells(&pipeline).iter().all(|cell| cell.is_finite()));
    assert!(cells(&pipeline).iter().any(|cell| cell.x > 0.0));
}

#[test]
fn unaddressable_hash_grid() {
    let device = device();

    let config = GiConfig {
        hash_grid_cache_tile_cell_ratio: 15,
        hash_grid_cache_num_buckets: 24,
        hash_grid_cache_num_tiles_per_bucket: 0,
        ..config()
    };

    assert!(matches!(
        GiPipeline::with_seed(&device, config, 1),
        Err(Error::InvalidConfiguration(_))
    ));
}

#[test]
fn cell_size_change_clears_cache() {
    let device = device();
    let scene = room(vec3(5.0, 0.0, 0.0));
    let camera = camera(SIZE);
    let mut pipeline = GiPipeline::with_seed(&device, config(), 1).unwrap();

    render(&device, &mut pipeline, &scene, &camera, 2);

    assert!(used_tiles(&pipeline) > 0);

    pipeline
        .set_config(
            &device,
            GiConfig {
                hash_grid_cache_cell_size: 16.0,
                ..config()
            },
        )
        .unwrap();

    assert_eq!(1, pipeline.kernels().generation);
    assert!(pipeline.passes().is_some());
    assert_eq!(0, used_tiles(&pipeline));
}

#[test]
fn bucket_change_reallocates_cache() {
    let device = device();
    let scene = room(vec3(5.0, 0.0, 0.0));
    let camera = camera(SIZE);
    let mut pipeline = GiPipeline::with_seed(&device, config(), 1).unwrap();

    render(&device, &mut pipeline, &scene, &camera, 2);

    assert_eq!(1024, pipeline.hash_grid().num_tiles());

    pipeline
        .set_config(
            &device,
            GiConfig {
                hash_grid_cache_num_buckets: 6,
                ..config()
            },
        )
        .unwrap();

    assert_eq!(1, pipeline.kernels().generation);
    assert_eq!(256, pipeline.hash_grid().num_tiles());
    assert_eq!(0, used_tiles(&pipeline));

    render(&device, &mut pipeline, &scene, &camera, 2);

    assert!(used_tiles(&pipeline) > 0);
}

#[test]
fn atrous_to_passthrough() {
    let device = device();
    let scene = room(vec3(5.0, 0.0, 0.0));
    let camera = camera(SIZE);

    let mut pipeline = GiPipeline::with_seed(
        &device,
        GiConfig {
            glossy_reflections_halfres: true,
            glossy_reflections_denoiser_mode: DenoiserMode::Atrous,
            ..config()
        },
        1,
    )
    .unwrap();

    render(&device, &mut pipeline, &scene, &camera, 2);

    let glossy = &pipeline.passes().unwrap().glossy_reflections;

    assert_eq!(DenoiserMode::Atrous, glossy.mode());
    assert_eq!(UVec2::new(32, 24), glossy.trace_size());
    assert!(glossy.labels().contains(&"candela_glossy_standard_dev"));
    assert!(glossy.labels().contains(&"candela_glossy_reflections_a"));

    let atrous_bytes = glossy.bytes();
    let allocated = device.allocated();

    // ---

    pipeline
        .set_config(
            &device,
            GiConfig {
                glossy_reflections_halfres: true,
                glossy_reflections_denoiser_mode: DenoiserMode::Passthrough,
                ..config()
            },
        )
        .unwrap();

    let glossy = &pipeline.passes().unwrap().glossy_reflections;

    assert_eq!(DenoiserMode::Passthrough, glossy.mode());
    assert_eq!(SIZE, glossy.trace_size());
    assert!(!glossy.labels().contains(&"candela_glossy_standard_dev"));
    assert!(!glossy.labels().contains(&"candela_glossy_reflections_a"));
    assert!(!glossy.labels().contains(&"candela_glossy_reflections_b"));
    assert_eq!(allocated - atrous_bytes + glossy.bytes(), device.allocated());

    render(&device, &mut pipeline, &scene, &camera, 2);

    let reflections = pipeline.reflections().unwrap();

    assert_eq!(SIZE, reflections.size());
    assert!(reflections.texels().iter().all(|texel| texel.is_finite()));
}

#[test]
fn split_ratio() {
    let device = device();
    let scene = room(vec3(5.0, 0.0, 0.0));
    let camera = camera(SIZE);

    let mut pipeline = GiPipeline::with_seed(
        &device,
        GiConfig {
            glossy_reflections_denoiser_mode: DenoiserMode::SplitRatio,
            ..config()
        },
        1,
    )
    .unwrap();

    render(&device, &mut pipeline, &scene, &camera, 3);

    let glossy = &pipeline.passes().unwrap().glossy_reflections;

    assert_eq!(DenoiserMode::SplitRatio, glossy.mode());
    assert!(glossy.labels().contains(&"candela_glossy_average_squared_b"));
    assert!(!glossy.labels().contains(&"candela_glossy_standard_dev"));

    assert!(pipeline
        .reflections()
        .unwrap()
        .texels()
        .iter()
        .all(|texel| texel.is_finite()));
}

#[test]
fn viewport_change_rebuilds_passes() {
    let device = device();
    let scene = room(vec3(5.0, 0.0, 0.0));
    let mut pipeline = GiPipeline::with_seed(&device, config(), 1).unwrap();

    render(&device, &mut pipeline, &scene, &camera(SIZE), 2);

    let size = UVec2::new(32, 32);

    render(&device, &mut pipeline, &scene, &camera(size), 2);

    assert_eq!(size, pipeline.global_illumination().unwrap().size());

    assert_eq!(
        UVec2::new(4, 4),
        pipeline
            .passes()
            .unwrap()
            .screen_probes
            .screen_params()
            .probe_count()
    );

    assert_eq!(1, pipeline.kernels().generation);
    assert!(used_tiles(&pipeline) > 0);
}

#[test]
fn mismatched_gbuffer() {
    let device = device();
    let scene = room(vec3(5.0, 0.0, 0.0));
    let mut pipeline = GiPipeline::with_seed(&device, config(), 1).unwrap();
    let gbuffer = GBuffer::new(&device, "gbuffer", UVec2::new(32, 32)).unwrap();

    let result = pipeline.render(&device, &scene, &camera(SIZE), &gbuffer);

    assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
}

#[test]
#[should_panic(expected = "invalid configuration")]
fn applying_invalid_config_panics() {
    let device = device();
    let mut pipeline = GiPipeline::with_seed(&device, config(), 1).unwrap();

    _ = pipeline.set_config(
        &device,
        GiConfig {
            hash_grid_cache_tile_cell_ratio: 4,
            ..config()
        },
    );
}

#[test]
fn memory_budget() {
    let device = Device::new(DeviceDescriptor {
        memory_budget: Some(1024),
        ..Default::default()
    })
    .unwrap();

    let result = GiPipeline::new(&device, config());

    assert!(matches!(result, Err(Error::ResourceCreation { .. })));
    assert_eq!(0, device.allocated());
}

#[test]
fn deterministic_with_single_thread() {
    let device = Device::new(DeviceDescriptor {
        threads: Some(1),
        ..Default::default()
    })
    .unwrap();

    let scene = room(vec3(5.0, 0.0, 0.0));
    let camera = camera(SIZE);

    let outputs: Vec<_> = (0..2)
        .map(|_| {
            let mut pipeline =
                GiPipeline::with_seed(&device, config(), 42).unwrap();

            render(&device, &mut pipeline, &scene, &camera, 3);

            pipeline.global_illumination().unwrap().texels()
        })
        .collect();

    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn dump() {
    let device = device();
    let scene = room(vec3(5.0, 0.0, 0.0));
    let camera = camera(SIZE);
    let mut pipeline = GiPipeline::with_seed(&device, config(), 1).unwrap();
    let dir = std::env::temp_dir().join("candela-dump");

    std::fs::create_dir_all(&dir).unwrap();

    render(&device, &mut pipeline, &scene, &camera, 1);

    pipeline.dump(&dir).unwrap();

    let gi = pipeline.global_illumination().unwrap();

    assert!(dir.join(format!("{}.png", gi.label())).exists());
}
