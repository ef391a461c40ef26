//! Écriture des sorties d'un run : GeoJSON et tables JSON

pub mod geojson;
pub mod tables;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;
use vicinal::PipelineOutput;

pub use geojson::{export_connection_points, export_segments};
pub use tables::{
    MunicipalityRecord, RegionRecord, SegmentStatisticsRecord, StateRecord, StatisticsRecord,
};

pub const NETWORK_FILE: &str = "malha_vicinal.geojson";
pub const MUNICIPALITIES_FILE: &str = "municipios_indicadores.json";
pub const REGIONS_FILE: &str = "regioes_indicadores.json";
pub const STATE_FILE: &str = "resumo_estadual.json";
pub const STATISTICS_FILE: &str = "segmentos_estatisticas.json";
pub const CONNECTION_POINTS_FILE: &str = "pontos_conexao.geojson";
pub const REPORT_FILE: &str = "relatorio.json";

/// Arrondi à `decimals` décimales
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn round_opt(value: Option<f64>, decimals: i32) -> Option<f64> {
    value.map(|v| round_to(v, decimals))
}

/// Sérialise une valeur en JSON indenté
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Écrit toutes les sorties d'un run complet dans `output_dir`
///
/// Renvoie les chemins écrits, dans l'ordre d'écriture.
pub fn write_run_outputs(output: &PipelineOutput, working_epsg: u32, output_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;
    let mut written = Vec::new();

    let path = output_dir.join(NETWORK_FILE);
    let connected = output.connectivity.as_ref().map(|c| c.connected.as_slice());
    export_segments(&output.vicinal, connected, working_epsg, &path)?;
    written.push(path);

    let aggregation = &output.aggregation;
    let municipalities: Vec<MunicipalityRecord> =
        aggregation.municipalities.iter().map(MunicipalityRecord::from).collect();
    let path = output_dir.join(MUNICIPALITIES_FILE);
    write_json(&municipalities, &path)?;
    written.push(path);

    let regions: Vec<RegionRecord> = aggregation.regions.iter().map(RegionRecord::from).collect();
    let path = output_dir.join(REGIONS_FILE);
    write_json(&regions, &path)?;
    written.push(path);

    let path = output_dir.join(STATE_FILE);
    write_json(&StateRecord::new(aggregation), &path)?;
    written.push(path);

    let path = output_dir.join(STATISTICS_FILE);
    write_json(&SegmentStatisticsRecord::new(output), &path)?;
    written.push(path);

    if let Some(connectivity) = &output.connectivity {
        let path = output_dir.join(CONNECTION_POINTS_FILE);
        export_connection_points(&connectivity.points, working_epsg, &path)?;
        written.push(path);
    }

    info!(files = written.len(), dir = %output_dir.display(), "Outputs written");
    Ok(written)
}
