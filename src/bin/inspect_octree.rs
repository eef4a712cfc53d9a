//! Octree file inspector: validates a file and summarizes its tree.
//!
//! Usage: cargo run --release --bin inspect_octree -- <file> [OPTIONS]
//!
//! Options:
//!   --level <N>   Count nodes down to level N instead of full-depth leaves
//!   --colors      Print the most common leaf colors

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use svox::core::logging;
use svox::storage::load_octree;
use svox::svo::node::{decode_leaf_color, is_address, is_null};
use svox::svo::{octree_side, OctreeTraverser};

fn main() -> ExitCode {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let Some(path) = args.get(1).filter(|a| !a.starts_with("--")) else {
        println!("Invalid command syntax: inspect_octree <file> [--level <n>] [--colors]");
        return ExitCode::from(1);
    };
    let path = PathBuf::from(path);
    if !path.exists() {
        println!("Input file not found");
        return ExitCode::from(2);
    }
    let stop_at_level = parse_u32_arg(&args, "--level");
    let show_colors = args.iter().any(|a| a == "--colors");

    let file = match load_octree(&path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Invalid octree file: {}", e);
            return ExitCode::from(4);
        }
    };

    let internal = file.nodes.iter().filter(|&&w| is_address(w)).count();
    let occupied = file.nodes.iter().filter(|&&w| !is_null(w)).count();

    println!("=== {} ===", path.display());
    println!("Volume:     {} x {} x {}", file.volume_size.x, file.volume_size.y, file.volume_size.z);
    println!("Resolution: {} ({}^3 voxels)", file.resolution, octree_side(file.resolution));
    println!("Node slots: {} ({} bytes)", file.nodes.len(), file.bytesize());
    println!("Occupied:   {} ({} internal)", occupied, internal);

    let mut traverser = OctreeTraverser::new(&file.nodes, 0);
    let mut reported = 0usize;
    let mut colors: HashMap<u32, usize> = HashMap::new();
    for value in traverser.iter(stop_at_level) {
        reported += 1;
        let raw = file.nodes[value.node_index()];
        if !is_address(raw) {
            *colors.entry(decode_leaf_color(raw)).or_default() += 1;
        }
    }
    match stop_at_level {
        Some(level) => println!("Nodes at level {}: {}", level, reported),
        None => println!("Leaves:     {}", reported),
    }

    if show_colors {
        let mut colors: Vec<(u32, usize)> = colors.into_iter().collect();
        colors.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        for (color, count) in colors.iter().take(10) {
            println!("  #{:08x} x {}", color, count);
        }
    }

    ExitCode::SUCCESS
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}
