//! Agrégation par município et par região administrativa
//!
//! Chaque segment (vicinal ou officiel) est attribué au município qui contient
//! son point milieu. Un segment qui traverse une limite municipale est donc
//! compté en entier d'un seul côté ; aucun découpage fractionnaire n'est fait.
//!
//! Les densités régionales et estaduais sont recalculées à partir des sommes
//! (longueur, surface, population), jamais moyennées depuis les municípios.

use std::collections::{BTreeMap, HashMap, HashSet};

use geo::{Area, BoundingRect, Intersects, MultiPolygon, Point};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use tracing::{debug, info, warn};

use crate::disparity::{assess, mean_of, CutPoints, DisparityClass};
use crate::length::midpoint;
use crate::types::{Municipality, PopulationRecord, RoadSegment, Tally, UnitId};
use crate::VicinalError;

/// Facteur de normalisation des densités
pub const PER_10K: f64 = 10_000.0;

struct IndexedMunicipality {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedMunicipality {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Index spatial des polygones municipaux pour l'attribution par point milieu
pub struct MunicipalityLocator<'a> {
    municipalities: &'a [Municipality],
    tree: RTree<IndexedMunicipality>,
}

impl<'a> MunicipalityLocator<'a> {
    pub fn new(municipalities: &'a [Municipality]) -> Self {
        let items = municipalities
            .iter()
            .enumerate()
            .filter_map(|(index, m)| {
                let rect = m.polygon.bounding_rect()?;
                Some(IndexedMunicipality {
                    index,
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();

        Self {
            municipalities,
            tree: RTree::bulk_load(items),
        }
    }

    /// Município contenant le point (limite incluse)
    ///
    /// Sur une limite partagée, l'identifiant le plus petit l'emporte.
    pub fn locate(&self, point: Point<f64>) -> Option<usize> {
        let envelope = AABB::from_point([point.x(), point.y()]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|item| item.index)
            .filter(|&i| self.municipalities[i].polygon.intersects(&point))
            .min_by(|&a, &b| self.municipalities[a].id.cmp(&self.municipalities[b].id))
    }

    /// Município du point milieu d'un segment
    pub fn locate_segment(&self, segment: &RoadSegment) -> Option<usize> {
        midpoint(&segment.geometry).and_then(|p| self.locate(p))
    }
}

/// Indicateurs communs aux municípios et aux regiões
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Indicators {
    pub area_km2: f64,
    pub population: f64,
    pub vicinal_km: f64,
    pub official_km: f64,
    pub combined_km: f64,
    pub vicinal_segments: usize,
    pub official_segments: usize,
    /// km / km² × 10 000
    pub density_area_10k: Option<f64>,
    /// km / km²
    pub density_area_abs: Option<f64>,
    /// km / habitant × 10 000
    pub density_pop_10k: Option<f64>,
    /// km / habitant
    pub density_pop_abs: Option<f64>,
    pub vicinal_density_area_10k: Option<f64>,
    pub vicinal_density_pop_10k: Option<f64>,
    pub deviation_area: Option<f64>,
    pub deviation_pop: Option<f64>,
    pub class_area: Option<DisparityClass>,
    pub class_pop: Option<DisparityClass>,
}

impl Indicators {
    fn from_sums(
        area_km2: f64,
        population: f64,
        vicinal: Tally,
        official: Tally,
    ) -> Self {
        let vicinal_km = vicinal.length_km();
        let official_km = official.length_km();
        let combined_km = vicinal_km + official_km;

        Self {
            area_km2,
            population,
            vicinal_km,
            official_km,
            combined_km,
            vicinal_segments: vicinal.count,
            official_segments: official.count,
            density_area_10k: ratio(combined_km, area_km2).map(|d| d * PER_10K),
            density_area_abs: ratio(combined_km, area_km2),
            density_pop_10k: ratio(combined_km, population).map(|d| d * PER_10K),
            density_pop_abs: ratio(combined_km, population),
            vicinal_density_area_10k: ratio(vicinal_km, area_km2).map(|d| d * PER_10K),
            vicinal_density_pop_10k: ratio(vicinal_km, population).map(|d| d * PER_10K),
            ..Default::default()
        }
    }

    fn apply_disparity(&mut self, mean_area: Option<f64>, mean_pop: Option<f64>, cuts: &CutPoints) {
        (self.deviation_area, self.class_area) = assess(self.density_area_10k, mean_area, cuts);
        (self.deviation_pop, self.class_pop) = assess(self.density_pop_10k, mean_pop, cuts);
    }
}

/// Densité indéfinie quand le dénominateur est nul
fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    (denominator > 0.0 && denominator.is_finite()).then(|| numerator / denominator)
}

/// Ligne de la table municipale
#[derive(Debug, Clone, PartialEq)]
pub struct MunicipalityRow {
    pub id: UnitId,
    pub name: String,
    pub region_id: UnitId,
    /// Surface calculée depuis le polygone (attribut absent ou nul)
    pub area_from_geometry: bool,
    /// Population imputée depuis la moyenne
    pub population_imputed: bool,
    pub indicators: Indicators,
}

/// Ligne de la table régionale
#[derive(Debug, Clone, PartialEq)]
pub struct RegionRow {
    pub id: UnitId,
    pub municipality_count: usize,
    pub mean_combined_km_per_municipality: f64,
    pub indicators: Indicators,
}

/// Synthèse estadual
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSummary {
    pub municipality_count: usize,
    pub region_count: usize,
    pub area_km2: f64,
    pub population: f64,
    pub vicinal_km: f64,
    pub official_km: f64,
    pub combined_km: f64,
    pub vicinal_segments: usize,
    pub official_segments: usize,
    pub unassigned_vicinal: Tally,
    pub unassigned_official: Tally,
    pub density_area_10k: Option<f64>,
    pub density_pop_10k: Option<f64>,
    /// Part vicinale de la malha combinée (%)
    pub vicinal_share_pct: Option<f64>,
    pub official_share_pct: Option<f64>,
    /// Rapport vicinal / officiel
    pub vicinal_official_ratio: Option<f64>,
    /// Moyennes utilisées pour les écarts municipaux
    pub municipal_mean_density_area_10k: Option<f64>,
    pub municipal_mean_density_pop_10k: Option<f64>,
    /// Moyennes utilisées pour les écarts régionaux
    pub regional_mean_density_area_10k: Option<f64>,
    pub regional_mean_density_pop_10k: Option<f64>,
    pub imputed_populations: usize,
    /// Année de référence la plus récente de la table de population
    pub population_year: Option<u16>,
}

/// Résultat complet de l'agrégation
#[derive(Debug, Clone)]
pub struct AggregationOutput {
    pub municipalities: Vec<MunicipalityRow>,
    pub regions: Vec<RegionRow>,
    pub state: StateSummary,
    /// Municípios à population imputée
    pub imputed: Vec<UnitId>,
    /// Enregistrements de population sans município correspondant
    pub unmatched_population: Vec<UnitId>,
    /// Identifiants des segments dont le milieu ne tombe dans aucun município
    pub unassigned_ids: Vec<String>,
}

/// Agrège les malhas vicinal et officielle
///
/// # Errors
///
/// - `InvalidInput` : identifiant municipal dupliqué ou vide, région manquante,
///   population dupliquée ou négative
/// - `MissingReferenceData` : aucune population exploitable pour imputer
pub fn aggregate(
    vicinal: &[RoadSegment],
    official: &[RoadSegment],
    municipalities: &[Municipality],
    populations: &[PopulationRecord],
    cuts: &CutPoints,
) -> Result<AggregationOutput, VicinalError> {
    validate_municipalities(municipalities)?;

    let population_by_id = index_population(populations)?;
    let (population, imputed) = resolve_population(municipalities, &population_by_id)?;

    let unmatched_population: Vec<UnitId> = {
        let known: HashSet<&UnitId> = municipalities.iter().map(|m| &m.id).collect();
        let mut ids: Vec<UnitId> = population_by_id
            .keys()
            .filter(|id| !known.contains(id))
            .cloned()
            .collect();
        ids.sort();
        ids
    };
    for id in &unmatched_population {
        warn!(cod_ibge = %id, "Population record matches no municipality");
    }

    let locator = MunicipalityLocator::new(municipalities);
    let (vicinal_sums, unassigned_vicinal, mut unassigned_ids) =
        attribute(vicinal, &locator, municipalities.len());
    let (official_sums, unassigned_official, unassigned_official_ids) =
        attribute(official, &locator, municipalities.len());
    unassigned_ids.extend(unassigned_official_ids);

    if unassigned_vicinal.count + unassigned_official.count > 0 {
        warn!(
            vicinal = unassigned_vicinal.count,
            official = unassigned_official.count,
            "Segments whose midpoint falls in no municipality"
        );
    }

    // Tables municipales
    let mut rows: Vec<MunicipalityRow> = municipalities
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let (area_km2, area_from_geometry) = municipality_area(m);
            MunicipalityRow {
                id: m.id.clone(),
                name: m.name.clone(),
                region_id: m.region_id.clone(),
                area_from_geometry,
                population_imputed: imputed.contains(&m.id),
                indicators: Indicators::from_sums(
                    area_km2,
                    population[i],
                    vicinal_sums[i],
                    official_sums[i],
                ),
            }
        })
        .collect();
    rows.sort_by(|a, b| a.id.cmp(&b.id));

    let mean_area = mean_of(rows.iter().map(|r| r.indicators.density_area_10k));
    let mean_pop = mean_of(rows.iter().map(|r| r.indicators.density_pop_10k));
    for row in &mut rows {
        row.indicators.apply_disparity(mean_area, mean_pop, cuts);
    }

    // Regiões : sommes puis recalcul
    let mut regions = aggregate_regions(&rows, municipalities, &vicinal_sums, &official_sums);
    let regional_mean_area = mean_of(regions.iter().map(|r| r.indicators.density_area_10k));
    let regional_mean_pop = mean_of(regions.iter().map(|r| r.indicators.density_pop_10k));
    for region in &mut regions {
        region
            .indicators
            .apply_disparity(regional_mean_area, regional_mean_pop, cuts);
    }

    let mut state = state_summary(&rows, regions.len(), unassigned_vicinal, unassigned_official);
    state.municipal_mean_density_area_10k = mean_area;
    state.municipal_mean_density_pop_10k = mean_pop;
    state.regional_mean_density_area_10k = regional_mean_area;
    state.regional_mean_density_pop_10k = regional_mean_pop;
    state.imputed_populations = imputed.len();
    state.population_year = populations.iter().filter_map(|r| r.year).max();

    info!(
        municipalities = rows.len(),
        regions = regions.len(),
        vicinal_km = %format!("{:.2}", state.vicinal_km),
        official_km = %format!("{:.2}", state.official_km),
        imputed = imputed.len(),
        "Aggregation done"
    );

    let mut imputed: Vec<UnitId> = imputed.into_iter().collect();
    imputed.sort();

    Ok(AggregationOutput {
        municipalities: rows,
        regions,
        state,
        imputed,
        unmatched_population,
        unassigned_ids,
    })
}

fn validate_municipalities(municipalities: &[Municipality]) -> Result<(), VicinalError> {
    let mut seen = HashSet::new();
    for m in municipalities {
        if m.id.is_empty() {
            return Err(VicinalError::invalid_input(
                "municipalities",
                format!("municipality '{}' has an empty identifier", m.name),
            ));
        }
        if !seen.insert(&m.id) {
            return Err(VicinalError::invalid_input(
                "municipalities",
                format!("duplicate identifier {}", m.id),
            ));
        }
        if m.region_id.is_empty() {
            return Err(VicinalError::invalid_input(
                "municipalities",
                format!("municipality {} has no region", m.id),
            ));
        }
        if m.area_km2.is_some_and(|a| a < 0.0) {
            return Err(VicinalError::invalid_input(
                "municipalities",
                format!("municipality {} has a negative area", m.id),
            ));
        }
    }
    Ok(())
}

fn index_population(records: &[PopulationRecord]) -> Result<HashMap<UnitId, f64>, VicinalError> {
    let mut by_id = HashMap::with_capacity(records.len());
    for record in records {
        if !(record.population.is_finite() && record.population >= 0.0) {
            return Err(VicinalError::invalid_input(
                "population",
                format!("invalid population {} for {}", record.population, record.id),
            ));
        }
        if by_id.insert(record.id.clone(), record.population).is_some() {
            return Err(VicinalError::invalid_input(
                "population",
                format!("duplicate identifier {}", record.id),
            ));
        }
    }
    Ok(by_id)
}

/// Population par município (ordre de `municipalities`) et ensemble des imputés
fn resolve_population(
    municipalities: &[Municipality],
    by_id: &HashMap<UnitId, f64>,
) -> Result<(Vec<f64>, HashSet<UnitId>), VicinalError> {
    let matched: Vec<Option<f64>> = municipalities
        .iter()
        .map(|m| by_id.get(&m.id).copied())
        .collect();

    let mut imputed = HashSet::new();
    if matched.iter().all(Option::is_some) {
        return Ok((matched.into_iter().flatten().collect(), imputed));
    }

    let Some(mean) = mean_of(matched.iter().copied()) else {
        return Err(VicinalError::missing_reference(
            "population",
            "no municipality has a population record, nothing to impute from",
        ));
    };

    let resolved = municipalities
        .iter()
        .zip(matched)
        .map(|(m, value)| match value {
            Some(v) => v,
            None => {
                warn!(
                    cod_ibge = %m.id,
                    municipio = %m.name,
                    imputed = %format!("{:.0}", mean),
                    "{}",
                    VicinalError::missing_reference(m.id.as_str(), "no population record, imputed from mean")
                );
                imputed.insert(m.id.clone());
                mean
            }
        })
        .collect();

    Ok((resolved, imputed))
}

/// Surface en km² : attribut positif, sinon surface du polygone projeté
fn municipality_area(m: &Municipality) -> (f64, bool) {
    match m.area_km2 {
        Some(a) if a > 0.0 => (a, false),
        _ => (m.polygon.unsigned_area() / 1_000_000.0, true),
    }
}

/// Sommes par município, plus la part non attribuée
fn attribute(
    segments: &[RoadSegment],
    locator: &MunicipalityLocator,
    n: usize,
) -> (Vec<Tally>, Tally, Vec<String>) {
    let owners: Vec<Option<usize>> = segments
        .par_iter()
        .map(|s| locator.locate_segment(s))
        .collect();

    let mut sums = vec![Tally::default(); n];
    let mut unassigned = Tally::default();
    let mut unassigned_ids = Vec::new();
    for (segment, owner) in segments.iter().zip(owners) {
        match owner {
            Some(i) => sums[i].add(segment.length_m),
            None => {
                debug!(feature_id = %segment.id, "Segment midpoint outside every municipality");
                unassigned.add(segment.length_m);
                unassigned_ids.push(segment.id.clone());
            }
        }
    }
    (sums, unassigned, unassigned_ids)
}

fn aggregate_regions(
    rows: &[MunicipalityRow],
    municipalities: &[Municipality],
    vicinal_sums: &[Tally],
    official_sums: &[Tally],
) -> Vec<RegionRow> {
    #[derive(Default)]
    struct Acc {
        count: usize,
        area_km2: f64,
        population: f64,
        vicinal: Tally,
        official: Tally,
    }

    // Les sommes de longueur repartent des tallies bruts (mètres) pour éviter
    // tout arrondi intermédiaire
    let position: HashMap<&UnitId, usize> = municipalities
        .iter()
        .enumerate()
        .map(|(i, m)| (&m.id, i))
        .collect();

    let mut by_region: BTreeMap<UnitId, Acc> = BTreeMap::new();
    for row in rows {
        let acc = by_region.entry(row.region_id.clone()).or_default();
        acc.count += 1;
        acc.area_km2 += row.indicators.area_km2;
        acc.population += row.indicators.population;
        if let Some(&i) = position.get(&row.id) {
            acc.vicinal = acc.vicinal.merge(vicinal_sums[i]);
            acc.official = acc.official.merge(official_sums[i]);
        }
    }

    by_region
        .into_iter()
        .map(|(id, acc)| {
            let indicators =
                Indicators::from_sums(acc.area_km2, acc.population, acc.vicinal, acc.official);
            RegionRow {
                id,
                municipality_count: acc.count,
                mean_combined_km_per_municipality: indicators.combined_km / acc.count as f64,
                indicators,
            }
        })
        .collect()
}

fn state_summary(
    rows: &[MunicipalityRow],
    region_count: usize,
    unassigned_vicinal: Tally,
    unassigned_official: Tally,
) -> StateSummary {
    let mut s = StateSummary {
        municipality_count: rows.len(),
        region_count,
        unassigned_vicinal,
        unassigned_official,
        ..Default::default()
    };
    for row in rows {
        let ind = &row.indicators;
        s.area_km2 += ind.area_km2;
        s.population += ind.population;
        s.vicinal_km += ind.vicinal_km;
        s.official_km += ind.official_km;
        s.vicinal_segments += ind.vicinal_segments;
        s.official_segments += ind.official_segments;
    }
    s.combined_km = s.vicinal_km + s.official_km;
    s.density_area_10k = ratio(s.combined_km, s.area_km2).map(|d| d * PER_10K);
    s.density_pop_10k = ratio(s.combined_km, s.population).map(|d| d * PER_10K);
    s.vicinal_share_pct = ratio(s.vicinal_km, s.combined_km).map(|r| r * 100.0);
    s.official_share_pct = ratio(s.official_km, s.combined_km).map(|r| r * 100.0);
    s.vicinal_official_ratio = ratio(s.vicinal_km, s.official_km);
    s
}
