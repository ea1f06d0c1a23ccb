use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use strata_anvil::anvil::{AnvilOptions, AnvilWorld};
use strata_anvil::chunk_nbt::nbt_to_column;
use strata_anvil::region::RegionFile;
use strata_anvil::registry::Registry;
use strata_engine::world::palette::PaletteKind;
use strata_engine::world::position::ChunkPos;
use strata_nbt::Root;

const USAGE: &str = "usage:
  strata regions --world DIR
  strata dump    --world DIR --chunk X Z
  strata stats   --world DIR --chunk X Z --registry FILE [--config FILE]";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let command = std::env::args().nth(1).unwrap_or_default();
    let result = match command.as_str() {
        "regions" => list_regions().await,
        "dump" => dump_chunk().await,
        "stats" => chunk_stats().await,
        _ => {
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{} failed: {:#}", command, e);
            ExitCode::FAILURE
        }
    }
}

/// Value following `--flag`.
fn flag(name: &str) -> Option<String> {
    std::env::args().skip_while(|a| a != name).nth(1)
}

fn world_dir() -> Result<PathBuf> {
    flag("--world")
        .map(PathBuf::from)
        .context("missing --world DIR")
}

fn chunk_arg() -> Result<ChunkPos> {
    let mut values = std::env::args().skip_while(|a| a != "--chunk").skip(1);
    let (Some(x), Some(z)) = (values.next(), values.next()) else {
        bail!("missing --chunk X Z");
    };
    let x = x.parse().with_context(|| format!("bad chunk x `{x}`"))?;
    let z = z.parse().with_context(|| format!("bad chunk z `{z}`"))?;
    Ok(ChunkPos::new(x, z))
}

/// Reads one chunk and closes the world whether or not it was found.
async fn load_chunk(world: &AnvilWorld, pos: ChunkPos) -> Result<Root> {
    let loaded = world.load_raw(pos).await;
    world.close().await?;
    match loaded? {
        Some(root) => Ok(root),
        None => bail!("chunk {pos} is not stored"),
    }
}

async fn list_regions() -> Result<()> {
    let world = AnvilWorld::new(world_dir()?);
    let regions = world.region_files().await?;
    if regions.is_empty() {
        tracing::info!("No region files under {}", world.region_dir().display());
        return Ok(());
    }

    let mut total = 0usize;
    for (x, z, path) in &regions {
        let region = RegionFile::open(path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        let count = region.chunk_count();
        total += count;
        println!("r.{x}.{z}.mca  {count:>4} chunks  {:>6} sectors", region.sector_count());
        region.close().await?;
    }
    tracing::info!("{} chunks across {} regions", total, regions.len());
    Ok(())
}

async fn dump_chunk() -> Result<()> {
    let world = AnvilWorld::new(world_dir()?);
    let pos = chunk_arg()?;
    let root = load_chunk(&world, pos).await?;

    let json = serde_json::to_string_pretty(&strata_nbt::simplify_compound(&root.compound))?;
    println!("{json}");
    Ok(())
}

async fn chunk_stats() -> Result<()> {
    let world = AnvilWorld::new(world_dir()?);
    let pos = chunk_arg()?;
    let registry = Registry::from_path(flag("--registry").context("missing --registry FILE")?)?;
    let options = match flag("--config") {
        Some(path) => AnvilOptions::from_path(path)?,
        None => AnvilOptions::default(),
    };

    let start = Instant::now();
    let root = load_chunk(&world, pos).await?;
    let (stored, column) = nbt_to_column(&root, &registry, &options.column)
        .with_context(|| format!("decoding chunk {pos}"))?;
    tracing::debug!("Decoded chunk {} in {:.2?}", pos, start.elapsed());

    println!("chunk {stored}");
    println!("  min y          {}", column.min_y());
    println!("  world height   {}", column.world_height());
    println!("  block entities {}", column.block_entity_count());

    let mut shapes = [0usize; 3];
    let mut non_empty = 0usize;
    for section in column.sections() {
        if !section.is_empty() {
            non_empty += 1;
        }
        let slot = match section.blocks().kind() {
            PaletteKind::Single => 0,
            PaletteKind::Indirect => 1,
            PaletteKind::Direct => 2,
        };
        shapes[slot] += 1;
    }
    println!("  sections       {} ({} non-empty)", column.num_sections(), non_empty);
    println!(
        "  palettes       {} single, {} indirect, {} direct",
        shapes[0], shapes[1], shapes[2]
    );
    Ok(())
}
