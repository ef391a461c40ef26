//! # malha-vicinal
//!
//! Extraction de la malha vicinal d'un état à partir d'un réseau routier
//! collaboratif et du cadastre officiel, puis indicateurs municipaux et
//! régionaux de densité.
//!
//! ## Usage CLI
//!
//! ```bash
//! # Pipeline complet
//! malha-vicinal run --network osm.geojson --cadastre der.geojson \
//!     --municipalities municipios.geojson --population pop.json \
//!     --urban mancha.geojson --output ./saida/
//!
//! # Soustraction seule, passe grossière
//! malha-vicinal subtract --network osm.geojson --cadastre der.geojson \
//!     --output ./saida/malha.geojson --config coarse
//!
//! # Contrôle des totaux
//! malha-vicinal validate --dir ./saida/
//! ```

pub mod cli;
pub mod config;
pub mod export;
pub mod input;
pub mod report;
pub mod validate;

pub use config::Config;
pub use report::{RunReport, RunStatus};
pub use validate::{validate_dir, ValidationReport};
