use anyhow::{Context, Result};
use galaxy_sectors::{config::Config, sector::SectorStore, types::Coordinates};
use serde::Serialize;

#[derive(Serialize)]
struct NearbySector<'a> {
    name: &'a str,
    filename: &'a str,
    system_count: u64,
    center_coords: Coordinates,
    distance: f64,
}

pub async fn list_sectors(
    config: Config,
    x: f64,
    y: f64,
    z: f64,
    radius: f64,
    format: String,
) -> Result<()> {
    let sectors_dir = config.store.sectors_path();
    let store = SectorStore::open(&sectors_dir)
        .with_context(|| format!("Failed to open sector store: {}", sectors_dir.display()))?;

    let point = Coordinates::new(x, y, z);
    let nearby: Vec<NearbySector<'_>> = store
        .index()
        .sectors_within(&point, radius)
        .into_iter()
        .map(|(name, entry, distance)| NearbySector {
            name,
            filename: &entry.filename,
            system_count: entry.system_count,
            center_coords: entry.center_coords,
            distance,
        })
        .collect();

    match format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&nearby)?);
        }
        _ => {
            println!("\n{} sectors within {} ly of {}", nearby.len(), radius, point);
            println!("{}", "=".repeat(60));
            for sector in &nearby {
                println!(
                    "{:>10.1} ly  {:<32} {:>9} systems",
                    sector.distance, sector.name, sector.system_count
                );
            }
        }
    }

    Ok(())
}
