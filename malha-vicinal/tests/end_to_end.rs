//! Tests de bout en bout des commandes sur des couches GeoJSON écrites en
//! fichiers temporaires (EPSG:31983)

use std::path::{Path, PathBuf};

use malha_vicinal::cli::{cmd_run, cmd_stats, cmd_subtract, NetworkArgs, RunArgs, StatsArgs, SubtractArgs};
use malha_vicinal::export::{
    CONNECTION_POINTS_FILE, MUNICIPALITIES_FILE, NETWORK_FILE, REGIONS_FILE, REPORT_FILE,
    STATE_FILE, STATISTICS_FILE,
};
use malha_vicinal::{validate_dir, RunStatus};
use serde_json::{json, Value};

const CRS: &str = "urn:ogc:def:crs:EPSG::31983";

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("malha_vicinal_e2e_{}", name));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn collection(features: Vec<Value>) -> Value {
    json!({
        "type": "FeatureCollection",
        "crs": {"type": "name", "properties": {"name": CRS}},
        "features": features
    })
}

fn line(props: Value, coords: &[(f64, f64)]) -> Value {
    let coordinates: Vec<Value> = coords.iter().map(|(x, y)| json!([x, y])).collect();
    json!({
        "type": "Feature",
        "properties": props,
        "geometry": {"type": "LineString", "coordinates": coordinates}
    })
}

fn square(props: Value, x0: f64, y0: f64, side: f64) -> Value {
    json!({
        "type": "Feature",
        "properties": props,
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[x0, y0], [x0 + side, y0], [x0 + side, y0 + side], [x0, y0 + side], [x0, y0]]]
        }
    })
}

fn write(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_string(value).unwrap()).unwrap();
}

fn read(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

struct Fixture {
    dir: PathBuf,
    network: PathBuf,
    cadastre: PathBuf,
    municipalities: PathBuf,
    population: PathBuf,
    urban: PathBuf,
}

/// Deux municípios de 20 km × 20 km côte à côte, une rodovia estadual
/// le long de y = 7 510 000 et une municipal dans le second
fn fixture(name: &str) -> Fixture {
    let dir = temp_dir(name);

    let network = collection(vec![
        line(json!({"osm_id": "w1", "highway": "motorway"}), &[(400_000.0, 7_519_000.0), (401_000.0, 7_519_000.0)]),
        // Doublon de la rodovia estadual à 5 m
        line(json!({"osm_id": "w2", "highway": "track"}), &[(405_000.0, 7_510_005.0), (406_000.0, 7_510_005.0)]),
        line(
            json!({"osm_id": "w3", "highway": "track", "surface": "dirt", "tracktype": "grade3"}),
            &[(410_000.0, 7_501_000.0), (410_000.0, 7_503_000.0)],
        ),
        // Part à 20 m de la rodovia : hors buffer, mais connectée
        line(
            json!({"osm_id": "w4", "highway": "unclassified", "name": "Estrada do Sítio"}),
            &[(430_000.0, 7_510_020.0), (430_000.0, 7_512_000.0)],
        ),
        // Dans la mancha urbana
        line(
            json!({"osm_id": "w5", "highway": "unclassified", "name": "Estrada do Centro"}),
            &[(432_500.0, 7_516_000.0), (433_500.0, 7_516_000.0)],
        ),
        // Hors de tout município
        line(json!({"osm_id": "w6", "highway": "track"}), &[(450_000.0, 7_510_000.0), (451_000.0, 7_510_000.0)]),
        json!({"type": "Feature", "properties": {"osm_id": "w99", "highway": "track"}, "geometry": null}),
    ]);

    let cadastre = collection(vec![
        line(
            json!({"id": "c1", "Rodovia": "SP-101", "Jurisdicao": "Estadual", "TipoPista": "Simples"}),
            &[(400_000.0, 7_510_000.0), (438_000.0, 7_510_000.0)],
        ),
        line(
            json!({"id": "c2", "Rodovia": "SPM-020", "Jurisdicao": "Municipal", "TipoPista": "Leito natural"}),
            &[(425_000.0, 7_505_000.0), (435_000.0, 7_505_000.0)],
        ),
    ]);

    let municipalities = collection(vec![
        square(
            json!({"Cod_ibge": 3500001, "Municipio": "Alfa", "RA": "RA1", "Area_Km2": 400.0}),
            400_000.0,
            7_500_000.0,
            20_000.0,
        ),
        square(
            json!({"Cod_ibge": "3500002", "Municipio": "Beta", "RA": "RA2"}),
            420_000.0,
            7_500_000.0,
            20_000.0,
        ),
    ]);

    let population = json!([
        {"cod_ibge": "3500001", "populacao": 10000, "ano_referencia": 2025},
        {"cod_ibge": "9999999", "populacao": 500, "ano_referencia": 2025}
    ]);

    let urban = collection(vec![square(json!({"id": "u1"}), 432_000.0, 7_515_000.0, 2_000.0)]);

    let fixture = Fixture {
        network: dir.join("network.geojson"),
        cadastre: dir.join("cadastre.geojson"),
        municipalities: dir.join("municipios.geojson"),
        population: dir.join("populacao.json"),
        urban: dir.join("mancha.geojson"),
        dir,
    };
    write(&fixture.network, &network);
    write(&fixture.cadastre, &cadastre);
    write(&fixture.municipalities, &municipalities);
    write(&fixture.population, &population);
    write(&fixture.urban, &urban);
    fixture
}

fn roads(f: &Fixture) -> NetworkArgs {
    NetworkArgs {
        network: f.network.clone(),
        cadastre: f.cadastre.clone(),
        config: "fine".to_string(),
        buffer_m: None,
        threshold: None,
        jobs: Some(2),
        network_epsg: None,
        cadastre_epsg: None,
    }
}

fn run_args(f: &Fixture, output: &Path) -> RunArgs {
    RunArgs {
        roads: roads(f),
        municipalities: f.municipalities.clone(),
        population: f.population.clone(),
        urban: Some(f.urban.clone()),
        output: output.to_path_buf(),
        no_connectivity: false,
        municipalities_epsg: None,
        urban_epsg: None,
    }
}

fn ids(collection: &Value) -> Vec<String> {
    let mut ids: Vec<String> = collection["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["properties"]["id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    ids
}

#[test]
fn test_run_writes_consistent_outputs() {
    let f = fixture("run");
    let output = f.dir.join("saida");

    let report = cmd_run(&run_args(&f, &output)).unwrap();

    // w99 sans géométrie : ignorée et signalée
    assert_eq!(report.status, RunStatus::PartialSuccess);
    assert!(report.errors.iter().any(|e| e.feature_id.as_deref() == Some("w99")));
    assert_eq!(report.inputs.len(), 5);
    assert!(report.inputs.iter().all(|i| i.blake3.len() == 64));

    let names: Vec<&str> = report.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(&names[..3], ["ingestion network", "ingestion cadastre", "classification"]);
    assert!(names.contains(&"urban exclusion"));

    // w99 sans géométrie : 7 entités lues, 6 segments produits
    let ingestion = &report.stages[0];
    assert_eq!(ingestion.input_segments, 7);
    assert_eq!(ingestion.output_segments, 6);
    assert_eq!(ingestion.removed_segments, 1);
    assert_eq!(report.stages[1].input_segments, report.stages[1].output_segments);

    assert_eq!(report.stages[2].input_segments, 6);
    assert_eq!(report.stages[2].output_segments, 5);
    assert_eq!(report.warnings.get("imputed_populations"), Some(&1));
    assert_eq!(report.warnings.get("unmatched_population"), Some(&1));

    for file in [
        NETWORK_FILE,
        MUNICIPALITIES_FILE,
        REGIONS_FILE,
        STATE_FILE,
        STATISTICS_FILE,
        CONNECTION_POINTS_FILE,
        REPORT_FILE,
    ] {
        assert!(output.join(file).exists(), "{} missing", file);
    }

    let network = read(&output.join(NETWORK_FILE));
    assert_eq!(ids(&network), vec!["w3", "w4", "w6"]);
    assert!(serde_json::to_string(&network["crs"]).unwrap().contains("EPSG::4326"));
    let w4 = network["features"]
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["properties"]["id"] == "w4")
        .unwrap();
    assert_eq!(w4["properties"]["connected"], true);
    assert_eq!(w4["properties"]["length_m"], 1980.0);
    let w3 = network["features"]
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["properties"]["id"] == "w3")
        .unwrap();
    assert_eq!(w3["properties"]["tracktype"], "grade3");
    assert_eq!(w3["properties"]["surface"], "dirt");

    let municipalities = read(&output.join(MUNICIPALITIES_FILE));
    let alfa = &municipalities[0];
    assert_eq!(alfa["cod_ibge"], "3500001");
    assert_eq!(alfa["extensao_vicinal_km"], 2.0);
    assert_eq!(alfa["extensao_oficial_km"], 38.0);
    assert_eq!(alfa["area_calculada"], false);
    assert_eq!(alfa["densidade_area_10k"], 1000.0);
    assert_eq!(alfa["classe_disp_area"], "Muito Acima");

    let beta = &municipalities[1];
    assert_eq!(beta["populacao_imputada"], true);
    assert_eq!(beta["populacao"], 10000);
    assert_eq!(beta["area_calculada"], true);
    assert!((beta["area_km2"].as_f64().unwrap() - 400.0).abs() < 0.01);
    assert_eq!(beta["extensao_total_km"], 11.98);
    assert_eq!(beta["classe_disp_area"], "Muito Abaixo");

    let state = read(&output.join(STATE_FILE));
    assert_eq!(state["extensao_vicinal_km"], 3.98);
    assert_eq!(state["extensao_oficial_km"], 48.0);
    assert_eq!(state["nao_atribuidos"]["segmentos_vicinais"], 1);
    assert_eq!(state["nao_atribuidos"]["extensao_vicinal_km"], 1.0);
    assert_eq!(state["ano_referencia"], 2025);

    let stats = read(&output.join(STATISTICS_FILE));
    assert_eq!(stats["malha_vicinal"]["comprimento"]["n"], 3);
    assert_eq!(stats["conectividade"]["conectados"], 1);
    assert_eq!(stats["conectividade"]["isolados"], 2);

    let points = read(&output.join(CONNECTION_POINTS_FILE));
    assert_eq!(points["features"].as_array().unwrap().len(), 1);

    let validation = validate_dir(&output).unwrap();
    assert!(
        validation.passed(),
        "{:?}",
        validation.failures().collect::<Vec<_>>()
    );

    std::fs::remove_dir_all(&f.dir).ok();
}

#[test]
fn test_validate_detects_tampered_total() {
    let f = fixture("tampered");
    let output = f.dir.join("saida");
    cmd_run(&run_args(&f, &output)).unwrap();

    let state_path = output.join(STATE_FILE);
    let mut state = read(&state_path);
    state["extensao_vicinal_km"] = json!(4.5);
    write(&state_path, &state);

    let validation = validate_dir(&output).unwrap();
    assert!(!validation.passed());
    assert!(validation
        .failures()
        .any(|c| c.name == "municipalities vicinal_km = state"));

    std::fs::remove_dir_all(&f.dir).ok();
}

#[test]
fn test_run_without_urban_or_connectivity() {
    let f = fixture("no_urban");
    let output = f.dir.join("saida");
    let mut args = run_args(&f, &output);
    args.urban = None;
    args.no_connectivity = true;

    let report = cmd_run(&args).unwrap();

    assert!(!report.stages.iter().any(|s| s.name == "urban exclusion"));
    assert!(!output.join(CONNECTION_POINTS_FILE).exists());
    let network = read(&output.join(NETWORK_FILE));
    assert_eq!(ids(&network), vec!["w3", "w4", "w5", "w6"]);
    assert!(validate_dir(&output).unwrap().passed());

    std::fs::remove_dir_all(&f.dir).ok();
}

#[test]
fn test_run_rejects_metres_declared_as_degrees() {
    let f = fixture("units");
    let output = f.dir.join("saida");
    let mut args = run_args(&f, &output);
    args.roads.network_epsg = Some(4326);

    let err = cmd_run(&args).unwrap_err();
    assert!(format!("{:#}", err).to_lowercase().contains("units"));

    std::fs::remove_dir_all(&f.dir).ok();
}

#[test]
fn test_subtract_only() {
    let f = fixture("subtract");
    let output = f.dir.join("sub").join("malha.geojson");

    let report = cmd_subtract(&SubtractArgs {
        roads: roads(&f),
        output: output.clone(),
    })
    .unwrap();

    // Pas de classification : l'autoroute reste, seul le doublon part
    let network = read(&output);
    assert_eq!(ids(&network), vec!["w1", "w3", "w4", "w5", "w6"]);
    let names: Vec<&str> = report.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names.len(), 3);
    assert_eq!(&names[..2], ["ingestion network", "ingestion cadastre"]);
    assert_eq!(report.stages[2].removed_segments, 1);
    assert!(output.with_file_name(REPORT_FILE).exists());

    std::fs::remove_dir_all(&f.dir).ok();
}

#[test]
fn test_coarse_buffer_override() {
    let f = fixture("coarse");
    let output = f.dir.join("malha.geojson");
    let mut args = roads(&f);
    args.buffer_m = Some(60.0);

    cmd_subtract(&SubtractArgs { roads: args, output: output.clone() }).unwrap();

    // À 60 m, la part w4 a 40 m sur 1 980 m dans le buffer : conservée
    let network = read(&output);
    assert!(ids(&network).contains(&"w4".to_string()));

    std::fs::remove_dir_all(&f.dir).ok();
}

#[test]
fn test_stats_command() {
    let f = fixture("stats");
    let output = f.dir.join("stats.json");

    let record = cmd_stats(&StatsArgs {
        input: f.network.clone(),
        output: output.clone(),
        cadastre: false,
        config: "fine".to_string(),
        epsg: None,
    })
    .unwrap();

    assert_eq!(record.comprimento.n, 6);
    assert_eq!(record.por_classe["track"].segmentos, 3);
    assert_eq!(record.por_revestimento["unpaved"].segmentos, 1);

    let written = read(&output);
    assert_eq!(written["comprimento"]["n"], 6);

    std::fs::remove_dir_all(&f.dir).ok();
}
