//! Définition et implémentation des commandes CLI
//!
//! - `run`: pipeline complet → GeoJSON + tables + rapport
//! - `subtract`: soustraction du cadastre seule
//! - `stats`: statistiques d'une couche linéaire
//! - `validate`: contrôle des totaux d'un répertoire de sortie

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::info;
use vicinal::ingest::{ingest_roads, RawFeature};
use vicinal::pipeline::{self, PipelineInputs};
use vicinal::stats::segment_statistics;
use vicinal::{LengthEngine, Origin, RoadSegment};

use crate::config::Config;
use crate::export::{self, StatisticsRecord, REPORT_FILE};
use crate::input::layer::{cadastre_features, municipalities, network_features, urban_polygons};
use crate::input::{read_layer, read_population, Converted, Layer};
use crate::report::RunReport;
use crate::validate::{validate_dir, ValidationReport};

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline and write the network, indicator tables and report
    Run(RunArgs),

    /// Subtract the official cadastre from the crowd-sourced network only
    Subtract(SubtractArgs),

    /// Compute segment statistics of a line layer
    Stats(StatsArgs),

    /// Check totals consistency of a `run` output directory
    Validate {
        /// Output directory of a previous run
        #[arg(short, long)]
        dir: PathBuf,
    },
}

/// Entrées et surcharges communes à `run` et `subtract`
#[derive(Args, Debug, Clone)]
pub struct NetworkArgs {
    /// Crowd-sourced road network (GeoJSON, optionally .bz2)
    #[arg(long)]
    pub network: PathBuf,

    /// Official road cadastre (GeoJSON, optionally .bz2)
    #[arg(long)]
    pub cadastre: PathBuf,

    /// Config preset name (fine/coarse/refine) or path to a JSON config
    #[arg(long, default_value = "fine")]
    pub config: String,

    /// Buffer distance in metres (replaces the configured passes by one pass)
    #[arg(long)]
    pub buffer_m: Option<f64>,

    /// Overlap threshold in [0, 1] (replaces the configured passes by one pass)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Number of worker threads (default: all cores)
    #[arg(long, alias = "threads")]
    pub jobs: Option<usize>,

    /// EPSG of the network layer when its file does not declare one
    #[arg(long)]
    pub network_epsg: Option<u32>,

    /// EPSG of the cadastre layer when its file does not declare one
    #[arg(long)]
    pub cadastre_epsg: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub roads: NetworkArgs,

    /// Municipality polygons with region attribute (GeoJSON)
    #[arg(long)]
    pub municipalities: PathBuf,

    /// Population table (JSON array)
    #[arg(long)]
    pub population: PathBuf,

    /// Urban footprint polygons (GeoJSON); urban exclusion is skipped without it
    #[arg(long)]
    pub urban: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    pub output: PathBuf,

    /// Skip the connectivity analysis
    #[arg(long)]
    pub no_connectivity: bool,

    /// EPSG of the municipality layer when its file does not declare one
    #[arg(long)]
    pub municipalities_epsg: Option<u32>,

    /// EPSG of the urban footprint layer when its file does not declare one
    #[arg(long)]
    pub urban_epsg: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct SubtractArgs {
    #[command(flatten)]
    pub roads: NetworkArgs,

    /// Output GeoJSON file; the report is written next to it
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    /// Line layer (GeoJSON, optionally .bz2)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output JSON file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Read the layer with the cadastre attribute mapping
    #[arg(long)]
    pub cadastre: bool,

    /// Config preset name or path (attribute mapping, working CRS)
    #[arg(long, default_value = "fine")]
    pub config: String,

    /// EPSG of the layer when its file does not declare one
    #[arg(long)]
    pub epsg: Option<u32>,
}

/// Exécute la commande run
pub fn cmd_run(args: &RunArgs) -> Result<RunReport> {
    let start = Instant::now();
    let mut report = RunReport::new("run");

    let result = run_pipeline(args, &mut report);
    report.set_duration(start.elapsed());
    if let Err(e) = &result {
        report.record_fatal(e);
    }
    report.finalize();

    if args.output.is_dir() {
        let path = args.output.join(REPORT_FILE);
        report.record_output(path.clone());
        report.save_to_file(&path)?;
    }
    result?;

    report.display();
    println!("{}", report.summary());
    Ok(report)
}

fn run_pipeline(args: &RunArgs, report: &mut RunReport) -> Result<()> {
    let mut config = load_config(&args.roads)?;
    if args.no_connectivity {
        config.connectivity.enabled = false;
    }
    let params = config.pipeline_params()?;
    let working = config.working_epsg;

    println!("=== Malha vicinal ===");
    println!("Network: {}", args.roads.network.display());
    println!("Cadastre: {}", args.roads.cadastre.display());
    println!("Municipalities: {}", args.municipalities.display());
    println!("Population: {}", args.population.display());
    match &args.urban {
        Some(path) => println!("Urban footprint: {}", path.display()),
        None => println!("Urban footprint: none (urban exclusion skipped)"),
    }
    println!("Config: {}", args.roads.config);
    for pass in &config.subtraction {
        println!("Subtraction pass: {} m / {}", pass.buffer_m, pass.overlap_threshold);
    }
    println!("Working CRS: EPSG:{}", working);
    println!("Connectivity: {}", config.connectivity.enabled);

    let network = load_network(&args.roads, &config, report)?;
    let cadastre = load_cadastre(&args.roads, &config, report)?;

    let layer = read_layer("municipalities", &args.municipalities)?;
    let engine = engine_for(
        &layer,
        args.municipalities_epsg.or(config.source_epsg.municipalities),
        working,
    )?;
    report.record_input(layer.file.clone());
    let municipalities = municipalities(layer, &config.fields.municipalities, &engine)?;

    let (population, file) = read_population(&args.population, &config.fields.population)?;
    report.record_input(file);

    let urban = match &args.urban {
        Some(path) => {
            let layer = read_layer("urban", path)?;
            let engine = engine_for(&layer, args.urban_epsg.or(config.source_epsg.urban), working)?;
            report.record_input(layer.file.clone());
            let converted = urban_polygons(layer, &engine)?;
            report.record_invalid("urban", &converted.invalid);
            Some(converted.items)
        }
        None => None,
    };

    let inputs = PipelineInputs {
        network,
        cadastre,
        municipalities,
        population,
        urban,
    };
    let pool = thread_pool(args.roads.jobs)?;
    let output = pool.install(|| pipeline::run(inputs, &params))?;

    for stage in &output.stages {
        report.record_stage(stage);
    }
    report.record_warnings(&output.warnings);

    for path in export::write_run_outputs(&output, working, &args.output)? {
        report.record_output(path);
    }

    let state = &output.aggregation.state;
    println!("\n=== State summary ===");
    println!("Municipalities: {} in {} regions", state.municipality_count, state.region_count);
    println!("Vicinal: {} segments, {:.2} km", state.vicinal_segments, state.vicinal_km);
    println!("Official: {} segments, {:.2} km", state.official_segments, state.official_km);
    println!("Combined: {:.2} km", state.combined_km);
    if state.unassigned_vicinal.count + state.unassigned_official.count > 0 {
        println!(
            "Unassigned: {} vicinal ({:.2} km), {} official ({:.2} km)",
            state.unassigned_vicinal.count,
            state.unassigned_vicinal.length_km(),
            state.unassigned_official.count,
            state.unassigned_official.length_km()
        );
    }
    if let Some(d) = state.density_area_10k {
        println!("Density: {:.4} km per 10 000 km2", d);
    }
    if let Some(d) = state.density_pop_10k {
        println!("Density: {:.4} km per 10 000 inhabitants", d);
    }

    Ok(())
}

/// Exécute la commande subtract
pub fn cmd_subtract(args: &SubtractArgs) -> Result<RunReport> {
    let start = Instant::now();
    let mut report = RunReport::new("subtract");

    let config = load_config(&args.roads)?;
    let params = config.pipeline_params()?;

    let network = load_network(&args.roads, &config, &mut report)?;
    let cadastre = load_cadastre(&args.roads, &config, &mut report)?;

    let pool = thread_pool(args.roads.jobs)?;
    let run = pool.install(|| pipeline::run_subtraction(network, &cadastre, &params));
    info!(
        mask_segments = run.mask_segments,
        retained = run.retained.len(),
        "Subtraction finished"
    );

    for stage in &run.stages {
        report.record_stage(stage);
    }
    report.record_warnings(&run.warnings);

    if let Some(dir) = args.output.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    }
    export::export_segments(&run.retained, None, config.working_epsg, &args.output)?;
    report.record_output(args.output.clone());

    let report_path = sibling(&args.output, REPORT_FILE);
    report.record_output(report_path.clone());
    report.set_duration(start.elapsed());
    report.finalize();
    report.save_to_file(&report_path)?;

    report.display();
    println!("{}", report.summary());
    Ok(report)
}

/// Exécute la commande stats
pub fn cmd_stats(args: &StatsArgs) -> Result<StatisticsRecord> {
    let config = Config::resolve(&args.config)?;
    let mut report = RunReport::new("stats");

    let layer = read_layer("layer", &args.input)?;
    let engine = engine_for(&layer, args.epsg, config.working_epsg)?;
    let (converted, origin) = if args.cadastre {
        (cadastre_features(layer, &config.fields.cadastre), Origin::OfficialCadastre)
    } else {
        (network_features(layer, &config.fields.network), Origin::CrowdSourced)
    };
    let segments = finish_roads("layer", converted, origin, &engine, &mut report)?;

    let record = StatisticsRecord::from(&segment_statistics(&segments));
    export::write_json(&record, &args.output)?;

    let l = &record.comprimento;
    println!("=== Segment statistics ===");
    println!("Segments: {}", l.n);
    println!("Total: {:.2} km", l.total_km);
    println!("Mean: {:.3} km, median: {:.3} km", l.media_km, l.mediana_km);
    println!("Skipped features: {}", report.errors.len());
    println!("Written: {}", args.output.display());
    Ok(record)
}

/// Exécute la commande validate
pub fn cmd_validate(dir: &Path) -> Result<ValidationReport> {
    let report = validate_dir(dir)?;
    report.display();
    Ok(report)
}

fn load_config(args: &NetworkArgs) -> Result<Config> {
    let mut config = Config::resolve(&args.config)?;
    config.override_subtraction(args.buffer_m, args.threshold);
    Ok(config)
}

fn thread_pool(jobs: Option<usize>) -> Result<rayon::ThreadPool> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = jobs {
        builder = builder.num_threads(n);
    }
    builder.build().context("Failed to build worker thread pool")
}

/// Moteur de mesure de la couche : EPSG surchargé, déclaré ou 4326
fn engine_for(layer: &Layer, override_epsg: Option<u32>, working_epsg: u32) -> Result<LengthEngine> {
    let epsg = layer.epsg(override_epsg);
    let engine = LengthEngine::new(epsg, working_epsg)
        .with_context(|| format!("Cannot reproject layer {} from EPSG:{}", layer.name, epsg))?;
    info!(layer = %layer.name, epsg, backend = engine.backend(), "Layer CRS resolved");
    Ok(engine)
}

fn load_network(args: &NetworkArgs, config: &Config, report: &mut RunReport) -> Result<Vec<RoadSegment>> {
    let layer = read_layer("network", &args.network)?;
    let engine = engine_for(
        &layer,
        args.network_epsg.or(config.source_epsg.network),
        config.working_epsg,
    )?;
    report.record_input(layer.file.clone());
    let converted = network_features(layer, &config.fields.network);
    finish_roads("network", converted, Origin::CrowdSourced, &engine, report)
}

fn load_cadastre(args: &NetworkArgs, config: &Config, report: &mut RunReport) -> Result<Vec<RoadSegment>> {
    let layer = read_layer("cadastre", &args.cadastre)?;
    let engine = engine_for(
        &layer,
        args.cadastre_epsg.or(config.source_epsg.cadastre),
        config.working_epsg,
    )?;
    report.record_input(layer.file.clone());
    let converted = cadastre_features(layer, &config.fields.cadastre);
    finish_roads("cadastre", converted, Origin::OfficialCadastre, &engine, report)
}

fn finish_roads(
    name: &str,
    converted: Converted<RawFeature>,
    origin: Origin,
    engine: &LengthEngine,
    report: &mut RunReport,
) -> Result<Vec<RoadSegment>> {
    report.record_invalid(name, &converted.invalid);
    let rejected = converted.invalid.len();
    let ingested = ingest_roads(name, converted.items, origin, engine)
        .with_context(|| format!("Failed to ingest layer {}", name))?;
    report.record_invalid(name, &ingested.invalid);
    report.record_warning("dropped_parts", ingested.dropped_parts);

    // Les entités rejetées au décodage comptent aussi en entrée
    let mut stage = ingested.stage(name);
    stage.input.count += rejected;
    stage.removed.count += rejected;
    report.record_stage(&stage);
    Ok(ingested.segments)
}

fn sibling(path: &Path, file_name: &str) -> PathBuf {
    path.parent()
        .map(|dir| dir.join(file_name))
        .unwrap_or_else(|| PathBuf::from(file_name))
}
