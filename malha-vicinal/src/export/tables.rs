//! Tables d'indicateurs (colonnes en portugais, comme les tables d'origine)
//!
//! Les valeurs restent en pleine précision dans le pipeline ; l'arrondi
//! n'a lieu qu'ici.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vicinal::stats::{SegmentStatistics, Share};
use vicinal::{
    AggregationOutput, ConnectivityReport, DisparityClass, Indicators, MunicipalityRow,
    PipelineOutput, RegionRow,
};

use super::{round_opt, round_to};

const KM: i32 = 2;
const DENSITY_10K: i32 = 4;
const DENSITY_ABS: i32 = 6;
const PCT: i32 = 2;

/// Colonnes communes aux municípios et aux régions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorColumns {
    pub area_km2: f64,
    pub populacao: u64,
    pub extensao_vicinal_km: f64,
    pub extensao_oficial_km: f64,
    pub extensao_total_km: f64,
    pub segmentos_vicinais: usize,
    pub segmentos_oficiais: usize,
    pub densidade_area_10k: Option<f64>,
    pub densidade_area_abs: Option<f64>,
    pub densidade_pop_10k: Option<f64>,
    pub densidade_pop_abs: Option<f64>,
    pub densidade_vicinal_area_10k: Option<f64>,
    pub densidade_vicinal_pop_10k: Option<f64>,
    pub desvio_area_pct: Option<f64>,
    pub desvio_pop_pct: Option<f64>,
    pub classe_disp_area: Option<String>,
    pub classe_disp_pop: Option<String>,
}

impl From<&Indicators> for IndicatorColumns {
    fn from(ind: &Indicators) -> Self {
        Self {
            area_km2: round_to(ind.area_km2, KM),
            populacao: ind.population.max(0.0).round() as u64,
            extensao_vicinal_km: round_to(ind.vicinal_km, KM),
            extensao_oficial_km: round_to(ind.official_km, KM),
            extensao_total_km: round_to(ind.combined_km, KM),
            segmentos_vicinais: ind.vicinal_segments,
            segmentos_oficiais: ind.official_segments,
            densidade_area_10k: round_opt(ind.density_area_10k, DENSITY_10K),
            densidade_area_abs: round_opt(ind.density_area_abs, DENSITY_ABS),
            densidade_pop_10k: round_opt(ind.density_pop_10k, DENSITY_10K),
            densidade_pop_abs: round_opt(ind.density_pop_abs, DENSITY_ABS),
            densidade_vicinal_area_10k: round_opt(ind.vicinal_density_area_10k, DENSITY_10K),
            densidade_vicinal_pop_10k: round_opt(ind.vicinal_density_pop_10k, DENSITY_10K),
            desvio_area_pct: round_opt(ind.deviation_area, PCT),
            desvio_pop_pct: round_opt(ind.deviation_pop, PCT),
            classe_disp_area: ind.class_area.map(|c| c.label().to_string()),
            classe_disp_pop: ind.class_pop.map(|c| c.label().to_string()),
        }
    }
}

/// Ligne de `municipios_indicadores.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalityRecord {
    pub cod_ibge: String,
    pub municipio: String,
    pub regiao: String,
    #[serde(flatten)]
    pub indicadores: IndicatorColumns,
    /// Surface calculée depuis le polygone faute d'attribut
    pub area_calculada: bool,
    pub populacao_imputada: bool,
}

impl From<&MunicipalityRow> for MunicipalityRecord {
    fn from(row: &MunicipalityRow) -> Self {
        Self {
            cod_ibge: row.id.as_str().to_string(),
            municipio: row.name.clone(),
            regiao: row.region_id.as_str().to_string(),
            indicadores: IndicatorColumns::from(&row.indicators),
            area_calculada: row.area_from_geometry,
            populacao_imputada: row.population_imputed,
        }
    }
}

/// Ligne de `regioes_indicadores.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRecord {
    pub regiao: String,
    pub num_municipios: usize,
    pub extensao_media_mun_km: f64,
    #[serde(flatten)]
    pub indicadores: IndicatorColumns,
}

impl From<&RegionRow> for RegionRecord {
    fn from(row: &RegionRow) -> Self {
        Self {
            regiao: row.id.as_str().to_string(),
            num_municipios: row.municipality_count,
            extensao_media_mun_km: round_to(row.mean_combined_km_per_municipality, KM),
            indicadores: IndicatorColumns::from(&row.indicators),
        }
    }
}

/// Segments hors de tout município
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnassignedRecord {
    pub segmentos_vicinais: usize,
    pub extensao_vicinal_km: f64,
    pub segmentos_oficiais: usize,
    pub extensao_oficial_km: f64,
}

/// Effectifs par classe de disparité, libellés dans l'ordre des classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDistribution {
    pub municipios_area: BTreeMap<String, usize>,
    pub municipios_pop: BTreeMap<String, usize>,
    pub regioes_area: BTreeMap<String, usize>,
    pub regioes_pop: BTreeMap<String, usize>,
}

fn distribution(classes: impl Iterator<Item = Option<DisparityClass>>) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<DisparityClass, usize> =
        DisparityClass::ALL.iter().map(|c| (*c, 0)).collect();
    for class in classes.flatten() {
        *counts.entry(class).or_default() += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, (class, n))| (format!("{}_{}", i + 1, class.label()), n))
        .collect()
}

/// Contenu de `resumo_estadual.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub num_municipios: usize,
    pub num_regioes: usize,
    pub area_km2: f64,
    pub populacao: u64,
    pub extensao_vicinal_km: f64,
    pub extensao_oficial_km: f64,
    pub extensao_total_km: f64,
    pub segmentos_vicinais: usize,
    pub segmentos_oficiais: usize,
    pub nao_atribuidos: UnassignedRecord,
    pub densidade_area_10k: Option<f64>,
    pub densidade_pop_10k: Option<f64>,
    pub participacao_vicinal_pct: Option<f64>,
    pub participacao_oficial_pct: Option<f64>,
    pub razao_vicinal_oficial: Option<f64>,
    pub media_municipal_densidade_area_10k: Option<f64>,
    pub media_municipal_densidade_pop_10k: Option<f64>,
    pub media_regional_densidade_area_10k: Option<f64>,
    pub media_regional_densidade_pop_10k: Option<f64>,
    pub populacoes_imputadas: usize,
    pub ano_referencia: Option<u16>,
    pub distribuicao_classes: ClassDistribution,
}

impl StateRecord {
    pub fn new(aggregation: &AggregationOutput) -> Self {
        let state = &aggregation.state;
        let munis = &aggregation.municipalities;
        let regions = &aggregation.regions;
        Self {
            num_municipios: state.municipality_count,
            num_regioes: state.region_count,
            area_km2: round_to(state.area_km2, KM),
            populacao: state.population.max(0.0).round() as u64,
            extensao_vicinal_km: round_to(state.vicinal_km, KM),
            extensao_oficial_km: round_to(state.official_km, KM),
            extensao_total_km: round_to(state.combined_km, KM),
            segmentos_vicinais: state.vicinal_segments,
            segmentos_oficiais: state.official_segments,
            nao_atribuidos: UnassignedRecord {
                segmentos_vicinais: state.unassigned_vicinal.count,
                extensao_vicinal_km: round_to(state.unassigned_vicinal.length_km(), KM),
                segmentos_oficiais: state.unassigned_official.count,
                extensao_oficial_km: round_to(state.unassigned_official.length_km(), KM),
            },
            densidade_area_10k: round_opt(state.density_area_10k, DENSITY_10K),
            densidade_pop_10k: round_opt(state.density_pop_10k, DENSITY_10K),
            participacao_vicinal_pct: round_opt(state.vicinal_share_pct, PCT),
            participacao_oficial_pct: round_opt(state.official_share_pct, PCT),
            razao_vicinal_oficial: round_opt(state.vicinal_official_ratio, DENSITY_10K),
            media_municipal_densidade_area_10k: round_opt(state.municipal_mean_density_area_10k, DENSITY_10K),
            media_municipal_densidade_pop_10k: round_opt(state.municipal_mean_density_pop_10k, DENSITY_10K),
            media_regional_densidade_area_10k: round_opt(state.regional_mean_density_area_10k, DENSITY_10K),
            media_regional_densidade_pop_10k: round_opt(state.regional_mean_density_pop_10k, DENSITY_10K),
            populacoes_imputadas: state.imputed_populations,
            ano_referencia: state.population_year,
            distribuicao_classes: ClassDistribution {
                municipios_area: distribution(munis.iter().map(|m| m.indicators.class_area)),
                municipios_pop: distribution(munis.iter().map(|m| m.indicators.class_pop)),
                regioes_area: distribution(regions.iter().map(|r| r.indicators.class_area)),
                regioes_pop: distribution(regions.iter().map(|r| r.indicators.class_pop)),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareRecord {
    pub segmentos: usize,
    pub extensao_km: f64,
    pub pct_segmentos: f64,
    pub pct_extensao: f64,
}

impl From<&Share> for ShareRecord {
    fn from(share: &Share) -> Self {
        Self {
            segmentos: share.count,
            extensao_km: round_to(share.length_km, KM),
            pct_segmentos: round_to(share.count_pct, PCT),
            pct_extensao: round_to(share.length_pct, PCT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LengthRecord {
    pub n: usize,
    pub total_km: f64,
    pub media_km: f64,
    pub mediana_km: f64,
    pub desvio_padrao_km: Option<f64>,
    pub min_km: f64,
    pub max_km: f64,
    pub q25_km: f64,
    pub q75_km: f64,
    pub amplitude_km: f64,
}

/// Statistiques d'une couche de segments
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsRecord {
    pub comprimento: LengthRecord,
    pub faixas: BTreeMap<String, ShareRecord>,
    /// Segments de 40 km et plus, hors des classes de longueur
    pub acima_faixas: usize,
    pub por_classe: BTreeMap<String, ShareRecord>,
    pub por_revestimento: BTreeMap<String, ShareRecord>,
}

impl From<&SegmentStatistics> for StatisticsRecord {
    fn from(stats: &SegmentStatistics) -> Self {
        let l = &stats.lengths;
        Self {
            comprimento: LengthRecord {
                n: l.count,
                total_km: round_to(l.total_km, KM),
                media_km: round_to(l.mean_km, 3),
                mediana_km: round_to(l.median_km, 3),
                desvio_padrao_km: round_opt(l.std_km, 3),
                min_km: round_to(l.min_km, 3),
                max_km: round_to(l.max_km, 3),
                q25_km: round_to(l.q25_km, 3),
                q75_km: round_to(l.q75_km, 3),
                amplitude_km: round_to(l.amplitude_km, 3),
            },
            faixas: stats
                .bands
                .iter()
                .map(|b| (b.label(), ShareRecord::from(&b.share)))
                .collect(),
            acima_faixas: stats.beyond_bands,
            por_classe: stats
                .by_class
                .iter()
                .map(|(class, share)| (class.clone(), ShareRecord::from(share)))
                .collect(),
            por_revestimento: stats
                .by_surface
                .iter()
                .map(|(surface, share)| (surface.as_str().to_string(), ShareRecord::from(share)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassConnectivity {
    pub conectados: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectivityRecord {
    pub conectados: usize,
    pub extensao_conectada_km: f64,
    pub isolados: usize,
    pub extensao_isolada_km: f64,
    pub pct_conectados: Option<f64>,
    pub por_classe: BTreeMap<String, ClassConnectivity>,
    /// Extrémités connectées avant regroupement
    pub pontos_brutos: usize,
    pub pontos_conexao: usize,
}

impl From<&ConnectivityReport> for ConnectivityRecord {
    fn from(report: &ConnectivityReport) -> Self {
        let total = report.connected_tally.count + report.isolated_tally.count;
        Self {
            conectados: report.connected_tally.count,
            extensao_conectada_km: round_to(report.connected_tally.length_km(), KM),
            isolados: report.isolated_tally.count,
            extensao_isolada_km: round_to(report.isolated_tally.length_km(), KM),
            pct_conectados: (total > 0)
                .then(|| round_to(100.0 * report.connected_tally.count as f64 / total as f64, PCT)),
            por_classe: report
                .by_class
                .iter()
                .map(|(class, (connected, total))| {
                    (class.clone(), ClassConnectivity { conectados: *connected, total: *total })
                })
                .collect(),
            pontos_brutos: report.raw_points,
            pontos_conexao: report.points.len(),
        }
    }
}

/// Contenu de `segmentos_estatisticas.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentStatisticsRecord {
    pub malha_vicinal: StatisticsRecord,
    pub cadastro_oficial: StatisticsRecord,
    pub conectividade: Option<ConnectivityRecord>,
}

impl SegmentStatisticsRecord {
    pub fn new(output: &PipelineOutput) -> Self {
        Self {
            malha_vicinal: StatisticsRecord::from(&output.statistics),
            cadastro_oficial: StatisticsRecord::from(&output.cadastre_statistics),
            conectividade: output.connectivity.as_ref().map(ConnectivityRecord::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indicators() -> Indicators {
        Indicators {
            area_km2: 1521.1149,
            population: 11_895_578.4,
            vicinal_km: 10.004,
            official_km: 20.0,
            combined_km: 30.004,
            vicinal_segments: 3,
            official_segments: 1,
            density_area_10k: Some(197.25432),
            density_area_abs: Some(0.019725432),
            density_pop_10k: None,
            density_pop_abs: None,
            vicinal_density_area_10k: Some(65.7),
            vicinal_density_pop_10k: None,
            deviation_area: Some(-23.456),
            deviation_pop: None,
            class_area: Some(DisparityClass::Below),
            class_pop: None,
        }
    }

    #[test]
    fn test_indicator_rounding() {
        let columns = IndicatorColumns::from(&indicators());
        assert_eq!(columns.area_km2, 1521.11);
        assert_eq!(columns.populacao, 11_895_578);
        assert_eq!(columns.extensao_vicinal_km, 10.0);
        assert_eq!(columns.densidade_area_10k, Some(197.2543));
        assert_eq!(columns.densidade_area_abs, Some(0.019725));
        assert_eq!(columns.desvio_area_pct, Some(-23.46));
        assert_eq!(columns.classe_disp_area.as_deref(), Some("Abaixo"));
    }

    #[test]
    fn test_undefined_serializes_as_null() {
        let columns = IndicatorColumns::from(&indicators());
        let value = serde_json::to_value(&columns).unwrap();
        assert!(value["densidade_pop_10k"].is_null());
        assert!(value["classe_disp_pop"].is_null());
    }

    #[test]
    fn test_flattened_record_round_trip() {
        let record = RegionRecord {
            regiao: "RA1".to_string(),
            num_municipios: 2,
            extensao_media_mun_km: 15.0,
            indicadores: IndicatorColumns::from(&indicators()),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""extensao_total_km":30.0"#));
        let back: RegionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_distribution_keeps_every_class() {
        let counts = distribution(
            [Some(DisparityClass::Average), None, Some(DisparityClass::Average)].into_iter(),
        );
        assert_eq!(counts.len(), 5);
        assert_eq!(counts["3_Média"], 2);
        assert_eq!(counts["1_Muito Abaixo"], 0);
    }
}
