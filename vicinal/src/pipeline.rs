//! Orchestration de la chaîne complète
//!
//! classification → soustraction (une ou plusieurs passes) → exclusion urbaine
//! → agrégation → connectivité → statistiques.
//!
//! Chaque étape produit un [`StageSummary`] : rien ne disparaît sans être compté.

use geo::Polygon;
use tracing::{info, warn};

use crate::aggregate::{aggregate, AggregationOutput};
use crate::classify::{classify_network, ClassificationStats};
use crate::connectivity::{analyze, ConnectivityParams, ConnectivityReport, NetworkIndex};
use crate::disparity::CutPoints;
use crate::stats::{segment_statistics, SegmentStatistics};
use crate::subtract::{select_mask, subtract, MaskIndex, SubtractionParams};
use crate::types::{Jurisdiction, Municipality, PopulationRecord, RoadSegment, Tally};
use crate::urban::{exclude_urban, network_extent, UrbanFootprint, UrbanParams};
use crate::VicinalError;

/// Paramètres du run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineParams {
    /// Passes de soustraction, appliquées dans l'ordre
    pub subtraction: Vec<SubtractionParams>,
    /// Juridictions du cadastre utilisées comme masque
    pub mask_jurisdictions: Vec<Jurisdiction>,
    pub urban: UrbanParams,
    /// `None` désactive l'analyse de connectivité
    pub connectivity: Option<ConnectivityParams>,
    pub cut_points: CutPoints,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            subtraction: vec![SubtractionParams::default()],
            mask_jurisdictions: vec![Jurisdiction::State, Jurisdiction::Federal],
            urban: UrbanParams::default(),
            connectivity: Some(ConnectivityParams::default()),
            cut_points: CutPoints::default(),
        }
    }
}

/// Données d'entrée, déjà mesurées dans le CRS de travail
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    /// Réseau collaboratif brut
    pub network: Vec<RoadSegment>,
    /// Cadastre officiel complet
    pub cadastre: Vec<RoadSegment>,
    pub municipalities: Vec<Municipality>,
    pub population: Vec<PopulationRecord>,
    /// Mancha urbana ; `None` saute l'étape
    pub urban: Option<Vec<Polygon<f64>>>,
}

/// Comptes d'entrée/sortie d'une étape
#[derive(Debug, Clone, PartialEq)]
pub struct StageSummary {
    pub name: String,
    pub input: Tally,
    pub output: Tally,
    pub removed: Tally,
    pub warnings: usize,
}

impl StageSummary {
    /// `input == output + removed` (à la tolérance près, en km)
    pub fn is_conserved(&self, tolerance_km: f64) -> bool {
        self.input.count == self.output.count + self.removed.count
            && (self.input.length_km() - self.output.length_km() - self.removed.length_km()).abs()
                <= tolerance_km
    }
}

/// Compteurs d'avertissements du run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarningCounts {
    pub zero_length: usize,
    pub overlap_failures: usize,
    pub containment_failures: usize,
    pub imputed_populations: usize,
    pub unmatched_population: usize,
    pub unassigned_segments: usize,
}

impl WarningCounts {
    pub fn total(&self) -> usize {
        self.zero_length
            + self.overlap_failures
            + self.containment_failures
            + self.imputed_populations
            + self.unmatched_population
            + self.unassigned_segments
    }
}

/// Résultat de la soustraction seule
#[derive(Debug, Clone, Default)]
pub struct SubtractionRun {
    pub retained: Vec<RoadSegment>,
    pub stages: Vec<StageSummary>,
    pub warnings: WarningCounts,
    /// Segments du cadastre retenus comme masque
    pub mask_segments: usize,
}

/// Résultat complet
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Malha vicinal finale
    pub vicinal: Vec<RoadSegment>,
    pub stages: Vec<StageSummary>,
    pub classification: ClassificationStats,
    pub aggregation: AggregationOutput,
    /// Statut de connexion aligné sur `vicinal`
    pub connectivity: Option<ConnectivityReport>,
    pub statistics: SegmentStatistics,
    pub cadastre_statistics: SegmentStatistics,
    pub warnings: WarningCounts,
}

/// Applique les passes de soustraction contre le masque du cadastre
pub fn run_subtraction(
    candidates: Vec<RoadSegment>,
    cadastre: &[RoadSegment],
    params: &PipelineParams,
) -> SubtractionRun {
    let mask = MaskIndex::build(select_mask(cadastre, &params.mask_jurisdictions));
    if mask.segments() == 0 {
        warn!(
            jurisdictions = ?params.mask_jurisdictions,
            "No cadastre segment matches the mask jurisdictions"
        );
    }

    let mut run = SubtractionRun {
        mask_segments: mask.segments(),
        ..Default::default()
    };

    let mut current = candidates;
    for (i, pass) in params.subtraction.iter().enumerate() {
        let outcome = subtract(current, &mask, pass);
        let warnings = outcome.zero_length.len() + outcome.failures.len();
        run.warnings.zero_length += outcome.zero_length.len();
        run.warnings.overlap_failures += outcome.failures.len();
        run.stages.push(StageSummary {
            name: format!(
                "subtraction[{}] {} m / {}",
                i + 1,
                pass.buffer_m,
                pass.overlap_threshold
            ),
            input: outcome.input,
            output: outcome.retained_tally,
            removed: outcome.removed_tally,
            warnings,
        });
        current = outcome.retained;
    }

    run.retained = current;
    run
}

/// Exécute la chaîne complète
///
/// # Errors
///
/// Erreurs fatales de l'agrégation (`InvalidInput`, `MissingReferenceData`
/// sans population de référence).
pub fn run(inputs: PipelineInputs, params: &PipelineParams) -> Result<PipelineOutput, VicinalError> {
    let PipelineInputs {
        network,
        cadastre,
        municipalities,
        population,
        urban,
    } = inputs;

    let mut stages = Vec::new();

    // 1. Classification administrative
    let (candidates, classification) = classify_network(network);
    stages.push(StageSummary {
        name: "classification".to_string(),
        input: classification.input,
        output: classification.retained,
        removed: classification.excluded_total(),
        warnings: 0,
    });

    // 2. Soustraction du réseau officiel
    let sub = run_subtraction(candidates, &cadastre, params);
    stages.extend(sub.stages);
    let mut warnings = sub.warnings;
    let mut vicinal = sub.retained;

    // 3. Mancha urbana
    if let Some(polygons) = urban {
        let clip = if params.urban.clip_to_network_bbox {
            network_extent(&vicinal)
        } else {
            None
        };
        let footprint = UrbanFootprint::dissolve(polygons, clip);
        let outcome = exclude_urban(vicinal, &footprint, &params.urban);
        warnings.containment_failures += outcome.failures.len();
        stages.push(StageSummary {
            name: "urban exclusion".to_string(),
            input: outcome.input,
            output: outcome.retained_tally,
            removed: outcome.removed_tally,
            warnings: outcome.failures.len(),
        });
        vicinal = outcome.retained;
    } else {
        info!("No urban footprint provided, urban exclusion skipped");
    }

    // 4. Agrégation
    let aggregation = aggregate(
        &vicinal,
        &cadastre,
        &municipalities,
        &population,
        &params.cut_points,
    )?;
    warnings.imputed_populations = aggregation.imputed.len();
    warnings.unmatched_population = aggregation.unmatched_population.len();
    warnings.unassigned_segments = aggregation.unassigned_ids.len();

    let unassigned = aggregation
        .state
        .unassigned_vicinal
        .merge(aggregation.state.unassigned_official);
    let assigned = Tally::of(&vicinal).merge(Tally::of(&cadastre));
    stages.push(StageSummary {
        name: "aggregation".to_string(),
        input: assigned,
        output: Tally {
            count: assigned.count - unassigned.count,
            length_m: assigned.length_m - unassigned.length_m,
        },
        removed: unassigned,
        warnings: warnings.imputed_populations + warnings.unmatched_population,
    });

    // 5. Connectivité au réseau officiel
    let connectivity = params.connectivity.as_ref().map(|p| {
        let index = NetworkIndex::build(select_mask(&cadastre, &params.mask_jurisdictions));
        analyze(&vicinal, &index, p)
    });

    // 6. Statistiques
    let statistics = segment_statistics(&vicinal);
    let cadastre_statistics = segment_statistics(&cadastre);

    info!(
        vicinal_segments = vicinal.len(),
        vicinal_km = %format!("{:.2}", Tally::of(&vicinal).length_km()),
        warnings = warnings.total(),
        "Pipeline done"
    );

    Ok(PipelineOutput {
        vicinal,
        stages,
        classification,
        aggregation,
        connectivity,
        statistics,
        cadastre_statistics,
        warnings,
    })
}
