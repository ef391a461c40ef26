//! # vicinal
//!
//! Estimation de la malha viária municipale (vicinale) d'un État brésilien par
//! conflation d'un réseau collaboratif (OpenStreetMap) avec le cadastre
//! routier officiel.
//!
//! ## Chaîne de traitement
//!
//! 1. Mesure des longueurs dans un CRS métrique (`length`)
//! 2. Classification administrative par tags (`classify`)
//! 3. Soustraction spatiale du réseau officiel par tampon et seuil (`subtract`)
//! 4. Exclusion des segments contenus dans la mancha urbana (`urban`)
//! 5. Agrégation par município et região avec densités (`aggregate`)
//! 6. Classes de disparité par rapport à la moyenne (`disparity`)
//!
//! Les analyses complémentaires (`connectivity`, `stats`) s'appliquent au
//! résultat final.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vicinal::pipeline::{run, PipelineInputs, PipelineParams};
//!
//! let output = run(inputs, &PipelineParams::default())?;
//! println!("Vicinal: {:.2} km", output.aggregation.state.vicinal_km);
//! ```

pub mod aggregate;
pub mod classify;
pub mod connectivity;
pub mod disparity;
pub mod error;
pub mod geometry;
pub mod ingest;
pub mod length;
pub mod pipeline;
pub mod projection;
pub mod stats;
pub mod subtract;
pub mod types;
pub mod urban;

pub use aggregate::{aggregate, AggregationOutput, Indicators, MunicipalityRow, RegionRow, StateSummary};
pub use classify::{classify, Decision, ExclusionReason};
pub use connectivity::{ConnectivityParams, ConnectivityReport, NetworkIndex};
pub use disparity::{CutPoints, DisparityClass};
pub use error::VicinalError;
pub use length::LengthEngine;
pub use pipeline::{PipelineInputs, PipelineOutput, PipelineParams, StageSummary};
pub use subtract::{MaskIndex, SubtractionParams};
pub use types::{
    HighwayClass, Jurisdiction, Municipality, Origin, PopulationRecord, RoadSegment, RoadTags,
    Tally, UnitId,
};
pub use urban::{UrbanFootprint, UrbanParams};
