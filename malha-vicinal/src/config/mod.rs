//! Configuration du run
//!
//! Un preset embarqué (`fine`, `coarse`, `refine`) ou un fichier JSON, puis
//! surchargé par les options de la ligne de commande.

use serde::{Deserialize, Serialize};
use std::path::Path;

use anyhow::{Context, Result};
use vicinal::{
    ConnectivityParams, CutPoints, Jurisdiction, PipelineParams, SubtractionParams, UrbanParams,
};

/// Configuration principale
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Passes de soustraction, dans l'ordre
    #[serde(default = "default_subtraction")]
    pub subtraction: Vec<PassConfig>,

    /// Juridictions du cadastre servant de masque
    #[serde(default = "default_mask_jurisdictions")]
    pub mask_jurisdictions: Vec<String>,

    #[serde(default)]
    pub urban: UrbanConfig,

    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    #[serde(default)]
    pub disparity: DisparityConfig,

    /// Fréquence des logs de progression (segments)
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,

    #[serde(default)]
    pub fields: FieldsConfig,

    /// CRS métrique de travail
    #[serde(default = "default_working_epsg")]
    pub working_epsg: u32,

    /// EPSG forcés par couche (sinon lus dans le fichier, 4326 par défaut)
    #[serde(default)]
    pub source_epsg: SourceEpsg,
}

/// Une passe de soustraction
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PassConfig {
    pub buffer_m: f64,
    pub overlap_threshold: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UrbanConfig {
    #[serde(default = "default_true")]
    pub clip_to_network_bbox: bool,
}

impl Default for UrbanConfig {
    fn default() -> Self {
        Self {
            clip_to_network_bbox: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectivityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_tolerance_m")]
    pub tolerance_m: f64,
    #[serde(default = "default_cluster_m")]
    pub cluster_m: f64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tolerance_m: default_tolerance_m(),
            cluster_m: default_cluster_m(),
        }
    }
}

/// Bornes des classes de disparité (%)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisparityConfig {
    #[serde(default = "default_inner_cut")]
    pub inner_cut: f64,
    #[serde(default = "default_outer_cut")]
    pub outer_cut: f64,
}

impl Default for DisparityConfig {
    fn default() -> Self {
        Self {
            inner_cut: default_inner_cut(),
            outer_cut: default_outer_cut(),
        }
    }
}

/// Noms des attributs par couche
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FieldsConfig {
    #[serde(default)]
    pub network: NetworkFields,
    #[serde(default)]
    pub cadastre: CadastreFields,
    #[serde(default)]
    pub municipalities: MunicipalityFields,
    #[serde(default)]
    pub population: PopulationFields,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkFields {
    pub id: String,
    pub name: String,
    pub highway: String,
    pub reference: String,
    pub surface: String,
}

impl Default for NetworkFields {
    fn default() -> Self {
        Self {
            id: "osm_id".to_string(),
            name: "name".to_string(),
            highway: "highway".to_string(),
            reference: "ref".to_string(),
            surface: "surface".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CadastreFields {
    pub id: String,
    pub name: Option<String>,
    pub reference: String,
    pub jurisdiction: String,
    pub lane_type: String,
}

impl Default for CadastreFields {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            name: None,
            reference: "Rodovia".to_string(),
            jurisdiction: "Jurisdicao".to_string(),
            lane_type: "TipoPista".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MunicipalityFields {
    pub id: String,
    pub name: String,
    pub region: String,
    pub area: String,
}

impl Default for MunicipalityFields {
    fn default() -> Self {
        Self {
            id: "Cod_ibge".to_string(),
            name: "Municipio".to_string(),
            region: "RA".to_string(),
            area: "Area_Km2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PopulationFields {
    pub id: String,
    pub population: String,
    pub year: String,
}

impl Default for PopulationFields {
    fn default() -> Self {
        Self {
            id: "cod_ibge".to_string(),
            population: "populacao".to_string(),
            year: "ano_referencia".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourceEpsg {
    pub network: Option<u32>,
    pub cadastre: Option<u32>,
    pub municipalities: Option<u32>,
    pub urban: Option<u32>,
}

fn default_subtraction() -> Vec<PassConfig> {
    vec![PassConfig {
        buffer_m: 15.0,
        overlap_threshold: 0.5,
    }]
}

fn default_mask_jurisdictions() -> Vec<String> {
    vec!["State".to_string(), "Federal".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_tolerance_m() -> f64 {
    50.0
}

fn default_cluster_m() -> f64 {
    10.0
}

fn default_inner_cut() -> f64 {
    20.0
}

fn default_outer_cut() -> f64 {
    50.0
}

fn default_progress_every() -> usize {
    100_000
}

fn default_working_epsg() -> u32 {
    vicinal::projection::WORKING_EPSG
}

impl Config {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON: {}", path.display()))
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "fine" => Self::load_embedded(include_str!("presets/fine.json")),
            "coarse" => Self::load_embedded(include_str!("presets/coarse.json")),
            "refine" => Self::load_embedded(include_str!("presets/refine.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: fine, coarse, refine", preset),
        }
    }

    /// Preset si le nom est connu, sinon chemin vers un fichier JSON
    pub fn resolve(spec: &str) -> Result<Self> {
        match spec {
            "fine" | "coarse" | "refine" => Self::from_preset(spec),
            path => Self::load(Path::new(path)),
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse embedded config")
    }

    /// Remplace toutes les passes par une passe unique surchargée
    pub fn override_subtraction(&mut self, buffer_m: Option<f64>, threshold: Option<f64>) {
        if buffer_m.is_none() && threshold.is_none() {
            return;
        }
        let base = self.subtraction.first().copied().unwrap_or(PassConfig {
            buffer_m: 15.0,
            overlap_threshold: 0.5,
        });
        self.subtraction = vec![PassConfig {
            buffer_m: buffer_m.unwrap_or(base.buffer_m),
            overlap_threshold: threshold.unwrap_or(base.overlap_threshold),
        }];
    }

    /// Paramètres de la bibliothèque
    pub fn pipeline_params(&self) -> Result<PipelineParams> {
        if self.subtraction.is_empty() {
            anyhow::bail!("Config must define at least one subtraction pass");
        }
        let mut subtraction = Vec::with_capacity(self.subtraction.len());
        for pass in &self.subtraction {
            if !(pass.buffer_m.is_finite() && pass.buffer_m >= 0.0) {
                anyhow::bail!("Invalid buffer distance: {}", pass.buffer_m);
            }
            if !(0.0..=1.0).contains(&pass.overlap_threshold) {
                anyhow::bail!(
                    "Overlap threshold must be within [0, 1], got {}",
                    pass.overlap_threshold
                );
            }
            subtraction.push(SubtractionParams {
                buffer_m: pass.buffer_m,
                overlap_threshold: pass.overlap_threshold,
                progress_every: self.progress_every,
            });
        }

        let cut_points = CutPoints::new(self.disparity.inner_cut, self.disparity.outer_cut)?;

        let connectivity = &self.connectivity;
        if connectivity.enabled {
            for (name, value) in [
                ("tolerance_m", connectivity.tolerance_m),
                ("cluster_m", connectivity.cluster_m),
            ] {
                if !(value.is_finite() && value > 0.0) {
                    anyhow::bail!("Connectivity {} must be positive, got {}", name, value);
                }
            }
        }

        Ok(PipelineParams {
            subtraction,
            mask_jurisdictions: self
                .mask_jurisdictions
                .iter()
                .map(|j| Jurisdiction::parse(j))
                .collect(),
            urban: UrbanParams {
                clip_to_network_bbox: self.urban.clip_to_network_bbox,
                progress_every: self.progress_every,
            },
            connectivity: connectivity.enabled.then_some(ConnectivityParams {
                tolerance_m: connectivity.tolerance_m,
                cluster_m: connectivity.cluster_m,
            }),
            cut_points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let fine = Config::from_preset("fine").unwrap();
        assert_eq!(fine.subtraction, default_subtraction());
        assert_eq!(fine.working_epsg, 31983);

        let coarse = Config::from_preset("coarse").unwrap();
        assert_eq!(coarse.subtraction[0].buffer_m, 60.0);

        let refine = Config::from_preset("refine").unwrap();
        assert_eq!(refine.subtraction[0].overlap_threshold, 0.7);

        assert!(Config::from_preset("unknown").is_err());
    }

    #[test]
    fn test_defaults_from_minimal_json() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.fields.municipalities.id, "Cod_ibge");
        assert_eq!(config.fields.cadastre.jurisdiction, "Jurisdicao");
        assert!(config.connectivity.enabled);
        assert_eq!(config.disparity.inner_cut, 20.0);

        let params = config.pipeline_params().unwrap();
        assert_eq!(params, PipelineParams::default());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::from_preset("fine").unwrap();
        config.override_subtraction(Some(100.0), None);
        assert_eq!(
            config.subtraction,
            vec![PassConfig {
                buffer_m: 100.0,
                overlap_threshold: 0.5
            }]
        );

        config.override_subtraction(None, Some(1.5));
        assert!(config.pipeline_params().is_err());
    }

    #[test]
    fn test_alternate_cut_points() {
        let config: Config =
            serde_json::from_str(r#"{"disparity": {"inner_cut": 15}}"#).unwrap();
        let params = config.pipeline_params().unwrap();
        assert_eq!(params.cut_points.inner, 15.0);
        assert_eq!(params.cut_points.outer, 50.0);
    }

    #[test]
    fn test_invalid_connectivity_distances() {
        for json in [
            r#"{"connectivity": {"tolerance_m": 0}}"#,
            r#"{"connectivity": {"tolerance_m": -5}}"#,
            r#"{"connectivity": {"cluster_m": -1}}"#,
        ] {
            let config: Config = serde_json::from_str(json).unwrap();
            assert!(config.pipeline_params().is_err(), "{}", json);
        }

        let mut config: Config = serde_json::from_str(r#"{"connectivity": {"cluster_m": -1}}"#).unwrap();
        config.connectivity.enabled = false;
        assert!(config.pipeline_params().unwrap().connectivity.is_none());

        config.connectivity.enabled = true;
        config.connectivity.tolerance_m = f64::NAN;
        assert!(config.pipeline_params().is_err());
    }
}
