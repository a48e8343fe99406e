// Usage: generate_terrain [resolution] [seed] [particles] [--batched <size>]
//
// Runs the full pipeline and prints what each stage did.

use std::error::Error;
use terrasekai::terrain::{ErosionMode, PipelineConfig, Stage, TerrainPipeline};

fn parse_args() -> Result<PipelineConfig, Box<dyn Error>> {
    let mut config = PipelineConfig {
        resolution: 1024,
        ..PipelineConfig::default()
    };
    config.erosion.num_particles = 50_000;

    let mut positional = 0;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--batched" {
            let size = args.next().ok_or("--batched needs a batch size")?;
            config.erosion.mode = ErosionMode::Batched {
                batch_size: size.parse()?,
            };
            continue;
        }
        match positional {
            0 => config.resolution = arg.parse()?,
            1 => config.seed = arg.parse()?,
            2 => config.erosion.num_particles = arg.parse()?,
            _ => return Err(format!("unexpected argument `{}`", arg).into()),
        }
        positional += 1;
    }
    Ok(config)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = parse_args()?;
    let (terrain, stats) = TerrainPipeline::new(config).run()?;

    let (min, max) = terrain.min_max();
    let mean = terrain.data().iter().map(|&h| h as f64).sum::<f64>() / terrain.data().len() as f64;

    println!("Terrain {}x{} (seed {}):", terrain.resolution(), terrain.resolution(), config.seed);
    println!("  Height min/max/avg: {:.3} / {:.3} / {:.3}", min, max, mean);
    println!(
        "  Zone coverage: {:.1}% (requested {:.0}%, {:+.1} points)",
        stats.zone_coverage_percent, stats.target_coverage_percent, stats.coverage_discrepancy
    );
    println!(
        "  Zone gradient: {:.5} mean, {} distinct levels",
        stats.zone_mean_gradient, stats.zone_distinct_levels
    );
    println!("  Normalization: {:?}", stats.normalization);
    println!("  Buildable after terrain: {:.1}%", stats.buildable_after_terrain);
    println!("  Buildable before erosion: {:.1}%", stats.buildable_pre_erosion);
    println!(
        "  Buildable after erosion: {:.1}% ({:+.1} points)",
        stats.buildable_post_erosion, stats.buildable_delta
    );
    println!(
        "  Target band [{:.0}%, {:.0}%]: {}",
        stats.target_band.0,
        stats.target_band.1,
        if stats.target_met { "met" } else { "missed" }
    );
    println!(
        "  Droplets: {} ({:.1} steps avg), terminations {:?}",
        stats.erosion.particles,
        stats.erosion.mean_steps(),
        stats.erosion.terminations
    );

    for stage in [Stage::Zones, Stage::WeightedTerrain, Stage::Ridges, Stage::Erosion] {
        if let Some(elapsed) = stats.timing(stage) {
            println!("  {:<16} {:?}", stage.name(), elapsed);
        }
    }
    println!("  {:<16} {:?}", "total", stats.total_elapsed);

    Ok(())
}
