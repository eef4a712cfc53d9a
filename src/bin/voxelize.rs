//! Scene voxelizer binary: converts a JSON scene description into an octree file.
//!
//! Usage: cargo run --release --bin voxelize -- <scene.json> <volume-height> <output-file> [OPTIONS]
//!
//! Options:
//!   --config <FILE>   JSON configuration (compute pool, material slot, ...)
//!   --threads <N>     Compute threads (overrides the configuration)
//!
//! Exit codes: 1 invalid syntax, 2 input not found, 3 volume height out of
//! [1, 256], 4 voxelization or I/O failure.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use svox::core::config::MAX_VOXELS_ON_Y;
use svox::core::logging;
use svox::storage::save_octree;
use svox::svo::octree_bytesize;
use svox::voxel::SceneDescription;
use svox::{OctreePipeline, SvoxConfig};

fn main() -> ExitCode {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let positional: Vec<&String> = positional_args(&args);
    if positional.len() != 3 {
        println!("Invalid command syntax: voxelize <input-file> <volume-height> <output-file> [--config <file>] [--threads <n>]");
        return ExitCode::from(1);
    }

    let input_path = PathBuf::from(positional[0]);
    if !input_path.exists() {
        println!("Input file not found");
        return ExitCode::from(2);
    }

    let volume_height = match positional[1].parse::<i64>() {
        Ok(h) if (1..=MAX_VOXELS_ON_Y as i64).contains(&h) => h as u32,
        Ok(_) => {
            println!("Volume height out of bounds: [1, {}]", MAX_VOXELS_ON_Y);
            return ExitCode::from(3);
        }
        Err(_) => {
            println!("Invalid command syntax: volume height must be an integer");
            return ExitCode::from(1);
        }
    };
    let output_path = PathBuf::from(positional[2]);

    let mut config = match parse_str_arg(&args, "--config") {
        Some(path) => match SvoxConfig::load(&PathBuf::from(path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration: {}", e);
                return ExitCode::from(4);
            }
        },
        None => SvoxConfig::default(),
    };
    if let Some(threads) = parse_usize_arg(&args, "--threads") {
        config.compute.threads = Some(threads);
    }

    match run(&config, &input_path, volume_height, &output_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Voxelization failed: {}", e);
            ExitCode::from(4)
        }
    }
}

fn run(config: &SvoxConfig, input: &PathBuf, volume_height: u32, output: &PathBuf) -> svox::Result<()> {
    let start = Instant::now();

    println!("Loading scene \"{}\"", input.display());
    let scene = SceneDescription::load(input)?;
    println!("Scene loaded: {} meshes, {} triangles", scene.meshes().len(), scene.triangle_count());

    let size = scene.transformed_size();
    println!(
        "Voxelizing scene - area size: ({:.2}, {:.2}, {:.2}), volume height: {}",
        size.x, size.y, size.z, volume_height
    );

    let pipeline = OctreePipeline::new(config)?;
    let result = pipeline.run(&scene, volume_height)?;

    let bytesize = octree_bytesize(result.resolution);
    println!(
        "Volume: ({}, {}, {}), {} voxels",
        result.volume_size.x, result.volume_size.y, result.volume_size.z, result.voxel_count
    );
    println!(
        "Octree resolution {} ({} bytes ~ {:.1} MB), {} node slots used",
        result.resolution,
        bytesize,
        bytesize as f64 / (1024.0 * 1024.0),
        result.build.nodes_used
    );
    if result.voxelize.errors > 0 {
        println!("Raster errors: {}", result.voxelize.errors);
    }

    println!("Writing to the output file \"{}\"", output.display());
    save_octree(output, &result.to_file())?;

    println!("Done in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

/// Arguments that are neither flags nor flag values
fn positional_args(args: &[String]) -> Vec<&String> {
    let mut positional = Vec::new();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg.starts_with("--") {
            iter.next();
        } else {
            positional.push(arg);
        }
    }
    positional
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
