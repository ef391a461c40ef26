//! Contrôle de cohérence des totaux d'un répertoire de sortie
//!
//! Les tables sont arrondies à 2 décimales : chaque terme sommé apporte
//! jusqu'à 0,005 km d'écart. Ces erreurs sont indépendantes et se compensent ;
//! la marge retenue est la plus petite entre la borne stricte `n × 0,005` et
//! quatre écarts-types de leur somme (`0,005 × 4√(n/3)`).

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use geojson::GeoJson;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::export::{
    MunicipalityRecord, RegionRecord, StateRecord, MUNICIPALITIES_FILE, NETWORK_FILE, REGIONS_FILE,
    STATE_FILE,
};

/// Tolérance de base (km)
pub const TOLERANCE_KM: f64 = 0.01;
/// Demi-unité du dernier chiffre des km arrondis
const ROUNDING_KM: f64 = 0.005;
/// Demi-unité de `length_m` arrondi à 2 décimales, en km
const FEATURE_ROUNDING_KM: f64 = 0.005 / 1000.0;

/// Résultat d'un contrôle
#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub name: String,
    pub expected: f64,
    pub actual: f64,
    pub tolerance: f64,
    pub passed: bool,
}

/// Ensemble des contrôles d'un répertoire
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub checks: Vec<Check>,
}

impl ValidationReport {
    fn check(&mut self, name: impl Into<String>, expected: f64, actual: f64, tolerance: f64) {
        let name = name.into();
        let passed = (expected - actual).abs() <= tolerance;
        if !passed {
            warn!(check = %name, expected, actual, tolerance, "Totals mismatch");
        }
        self.checks.push(Check { name, expected, actual, tolerance, passed });
    }

    fn check_count(&mut self, name: impl Into<String>, expected: usize, actual: usize) {
        self.check(name, expected as f64, actual as f64, 0.0);
    }

    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// Affiche les contrôles sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("TOTALS VALIDATION");
        println!("{}", "=".repeat(60));
        for c in &self.checks {
            println!(
                "  [{}] {:<45} expected {:>14.4} actual {:>14.4} (tol {:.4})",
                if c.passed { "OK" } else { "FAIL" },
                c.name,
                c.expected,
                c.actual,
                c.tolerance
            );
        }
        let failed = self.failures().count();
        println!("\n{} checks, {} failed", self.checks.len(), failed);
        println!("{}", "=".repeat(60));
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn tolerance(terms: usize) -> f64 {
    let n = terms as f64;
    TOLERANCE_KM + ROUNDING_KM * n.min(4.0 * (n / 3.0).sqrt())
}

/// Somme des `length_m` de la couche exportée : (segments, km)
fn network_total(path: &Path) -> Result<(usize, f64)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let geojson: GeoJson = content
        .parse()
        .with_context(|| format!("Failed to parse GeoJSON: {}", path.display()))?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        anyhow::bail!("Expected a FeatureCollection in {}", path.display());
    };

    let mut total_m = 0.0;
    for feature in &collection.features {
        let length = feature
            .property("length_m")
            .and_then(|v| v.as_f64())
            .with_context(|| format!("Feature without length_m in {}", path.display()))?;
        total_m += length;
    }
    Ok((collection.features.len(), total_m / 1000.0))
}

/// Valide les totaux d'un répertoire produit par `run`
pub fn validate_dir(dir: &Path) -> Result<ValidationReport> {
    let municipalities: Vec<MunicipalityRecord> = read_json(&dir.join(MUNICIPALITIES_FILE))?;
    let regions: Vec<RegionRecord> = read_json(&dir.join(REGIONS_FILE))?;
    let state: StateRecord = read_json(&dir.join(STATE_FILE))?;

    let mut report = ValidationReport::default();

    // Municípios -> état
    let tol = tolerance(municipalities.len() + 1);
    let sum = |f: fn(&MunicipalityRecord) -> f64| municipalities.iter().map(f).sum::<f64>();
    report.check(
        "municipalities vicinal_km = state",
        state.extensao_vicinal_km,
        sum(|m| m.indicadores.extensao_vicinal_km),
        tol,
    );
    report.check(
        "municipalities official_km = state",
        state.extensao_oficial_km,
        sum(|m| m.indicadores.extensao_oficial_km),
        tol,
    );
    report.check(
        "municipalities combined_km = state",
        state.extensao_total_km,
        sum(|m| m.indicadores.extensao_total_km),
        tol,
    );
    report.check_count(
        "municipalities vicinal segments = state",
        state.segmentos_vicinais,
        municipalities.iter().map(|m| m.indicadores.segmentos_vicinais).sum(),
    );
    report.check_count("municipality count = state", state.num_municipios, municipalities.len());

    // Régions -> état
    let tol = tolerance(regions.len() + 1);
    let sum = |f: fn(&RegionRecord) -> f64| regions.iter().map(f).sum::<f64>();
    report.check(
        "regions vicinal_km = state",
        state.extensao_vicinal_km,
        sum(|r| r.indicadores.extensao_vicinal_km),
        tol,
    );
    report.check(
        "regions official_km = state",
        state.extensao_oficial_km,
        sum(|r| r.indicadores.extensao_oficial_km),
        tol,
    );
    report.check(
        "regions combined_km = state",
        state.extensao_total_km,
        sum(|r| r.indicadores.extensao_total_km),
        tol,
    );
    report.check_count("region count = state", state.num_regioes, regions.len());

    // Municípios -> région
    let mut by_region: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
    for m in &municipalities {
        let entry = by_region.entry(m.regiao.as_str()).or_default();
        entry.0 += 1;
        entry.1 += m.indicadores.extensao_total_km;
    }
    for region in &regions {
        let (count, km) = by_region.get(region.regiao.as_str()).copied().unwrap_or_default();
        report.check_count(
            format!("region {} municipality count", region.regiao),
            region.num_municipios,
            count,
        );
        report.check(
            format!("region {} combined_km", region.regiao),
            region.indicadores.extensao_total_km,
            km,
            tolerance(count + 1),
        );
    }

    // Couche exportée -> état (segments attribués + non attribués)
    let (features, network_km) = network_total(&dir.join(NETWORK_FILE))?;
    let unassigned = &state.nao_atribuidos;
    report.check(
        "network length = state vicinal + unassigned",
        state.extensao_vicinal_km + unassigned.extensao_vicinal_km,
        network_km,
        tolerance(2) + FEATURE_ROUNDING_KM * features as f64,
    );
    report.check_count(
        "network segments = state vicinal + unassigned",
        state.segmentos_vicinais + unassigned.segmentos_vicinais,
        features,
    );

    let failed = report.failures().count();
    info!(checks = report.checks.len(), failed, dir = %dir.display(), "Validation finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerance_grows_with_terms() {
        assert!((tolerance(0) - 0.01).abs() < 1e-12);
        assert!((tolerance(3) - 0.025).abs() < 1e-12);
        assert!(tolerance(10) < 0.06);
        assert!(tolerance(10) > tolerance(5));
    }

    #[test]
    fn test_tolerance_stays_tight_for_a_state() {
        // 645 municípios : quelques centaines de mètres, pas 3 km
        let tol = tolerance(646);
        assert!(tol < 0.31, "tol={}", tol);
        assert!(tol > 0.25, "tol={}", tol);

        let mut report = ValidationReport::default();
        report.check("state", 12_000.0, 12_003.2, tol);
        assert!(!report.passed());
    }

    #[test]
    fn test_check_records_failure() {
        let mut report = ValidationReport::default();
        report.check("a", 10.0, 10.004, 0.01);
        report.check("b", 10.0, 10.5, 0.01);
        report.check_count("c", 3, 3);

        assert!(!report.passed());
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.failures().next().unwrap().name, "b");
    }

    #[test]
    fn test_missing_directory_fails() {
        assert!(validate_dir(Path::new("/nonexistent/output")).is_err());
    }
}
