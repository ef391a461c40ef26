//! Rapport de run avec dégradation contrôlée
//!
//! Ce module collecte les comptes par étape, les avertissements et les
//! erreurs non fatales d'un run, puis les affiche ou les sauvegarde.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use vicinal::pipeline::{StageSummary, WarningCounts};
use vicinal::VicinalError;

use crate::input::InputFile;

/// Statut global du run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// Run complet sans erreur
    Success,
    /// Run complet avec des entités ignorées
    PartialSuccess,
    /// Run interrompu
    Failed,
}

/// Niveau de sévérité des erreurs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorLevel {
    /// Erreur fatale: run abandonné
    Fatal,
    /// Erreur: entité ignorée
    Error,
}

/// Erreur de run avec contexte
#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    pub level: ErrorLevel,
    /// Couche source (optionnelle)
    pub layer: Option<String>,
    /// Identifiant de l'entité (optionnel)
    pub feature_id: Option<String>,
    pub message: String,
}

/// Comptes d'une étape, en km
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub name: String,
    pub input_segments: usize,
    pub input_km: f64,
    pub output_segments: usize,
    pub output_km: f64,
    pub removed_segments: usize,
    pub removed_km: f64,
    pub warnings: usize,
}

impl From<&StageSummary> for StageReport {
    fn from(stage: &StageSummary) -> Self {
        Self {
            name: stage.name.clone(),
            input_segments: stage.input.count,
            input_km: stage.input.length_km(),
            output_segments: stage.output.count,
            output_km: stage.output.length_km(),
            removed_segments: stage.removed.count,
            removed_km: stage.removed.length_km(),
            warnings: stage.warnings,
        }
    }
}

/// Rapport complet d'un run (`relatorio.json`)
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Sous-commande exécutée
    pub command: String,
    pub status: RunStatus,
    pub duration_secs: f64,
    /// Fichiers lus, avec leur empreinte BLAKE3
    pub inputs: Vec<InputFile>,
    pub stages: Vec<StageReport>,
    /// Compteurs d'avertissements par nature
    pub warnings: BTreeMap<String, usize>,
    pub errors: Vec<RunError>,
    pub outputs: Vec<PathBuf>,
}

impl RunReport {
    /// Crée un rapport vide pour une sous-commande
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            status: RunStatus::Success,
            duration_secs: 0.0,
            inputs: Vec::new(),
            stages: Vec::new(),
            warnings: BTreeMap::new(),
            errors: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn record_input(&mut self, file: InputFile) {
        self.inputs.push(file);
    }

    pub fn record_stage(&mut self, stage: &StageSummary) {
        self.stages.push(StageReport::from(stage));
    }

    /// Ajoute un compteur d'avertissements (cumulé par nom)
    pub fn record_warning(&mut self, kind: &str, count: usize) {
        if count > 0 {
            *self.warnings.entry(kind.to_string()).or_default() += count;
        }
    }

    /// Reprend les compteurs de la bibliothèque
    pub fn record_warnings(&mut self, counts: &WarningCounts) {
        self.record_warning("zero_length", counts.zero_length);
        self.record_warning("overlap_failures", counts.overlap_failures);
        self.record_warning("containment_failures", counts.containment_failures);
        self.record_warning("imputed_populations", counts.imputed_populations);
        self.record_warning("unmatched_population", counts.unmatched_population);
        self.record_warning("unassigned_segments", counts.unassigned_segments);
    }

    /// Enregistre les entités ignorées d'une couche
    pub fn record_invalid(&mut self, layer: &str, errors: &[VicinalError]) {
        for error in errors {
            let feature_id = match error {
                VicinalError::InvalidGeometry { feature_id, .. } => Some(feature_id.clone()),
                VicinalError::MissingReferenceData { key, .. } => Some(key.clone()),
                _ => None,
            };
            self.errors.push(RunError {
                level: if error.is_fatal() { ErrorLevel::Fatal } else { ErrorLevel::Error },
                layer: Some(layer.to_string()),
                feature_id,
                message: error.to_string(),
            });
        }
    }

    /// Enregistre l'erreur qui a interrompu le run
    pub fn record_fatal(&mut self, error: &anyhow::Error) {
        self.errors.push(RunError {
            level: ErrorLevel::Fatal,
            layer: None,
            feature_id: None,
            message: format!("{:#}", error),
        });
    }

    pub fn record_output(&mut self, path: PathBuf) {
        self.outputs.push(path);
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final basé sur les erreurs
    pub fn finalize(&mut self) {
        let has_fatal = self.errors.iter().any(|e| e.level == ErrorLevel::Fatal);
        self.status = if has_fatal {
            RunStatus::Failed
        } else if !self.errors.is_empty() {
            RunStatus::PartialSuccess
        } else {
            RunStatus::Success
        };
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("RUN REPORT - {}", self.command);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        if !self.inputs.is_empty() {
            println!("\n--- INPUTS ---");
            for input in &self.inputs {
                println!(
                    "  {:<15} {} ({} bytes, {}, blake3 {})",
                    input.layer,
                    input.path.display(),
                    input.bytes,
                    input.encoding,
                    &input.blake3[..16.min(input.blake3.len())]
                );
            }
        }

        if !self.stages.is_empty() {
            println!("\n--- STAGES ---");
            for stage in &self.stages {
                println!(
                    "  {:<32} {:>9} -> {:>9} segments, {:>12.2} -> {:>12.2} km (removed {} / {:.2} km)",
                    stage.name,
                    stage.input_segments,
                    stage.output_segments,
                    stage.input_km,
                    stage.output_km,
                    stage.removed_segments,
                    stage.removed_km
                );
            }
        }

        if !self.warnings.is_empty() {
            println!("\n--- WARNINGS ---");
            for (kind, count) in &self.warnings {
                println!("  {}: {}", kind, count);
            }
        }

        if !self.errors.is_empty() {
            println!("\n--- ERRORS ({}) ---", self.errors.len());
            for e in self.errors.iter().take(20) {
                let location = match (&e.layer, &e.feature_id) {
                    (Some(l), Some(id)) => format!("[{}:{}]", l, id),
                    (Some(l), None) => format!("[{}]", l),
                    (None, Some(id)) => format!("[{}]", id),
                    _ => String::new(),
                };
                println!("  {:?} {} {}", e.level, location, e.message);
            }
            if self.errors.len() > 20 {
                println!("  ... and {} more", self.errors.len() - 20);
            }
        }

        if !self.outputs.is_empty() {
            println!("\n--- OUTPUTS ---");
            for path in &self.outputs {
                println!("  {}", path.display());
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        let warnings: usize = self.warnings.values().sum();
        match self.stages.last() {
            Some(last) => format!(
                "{}: {:?}, {} segments / {:.2} km after '{}', {} warnings, {} errors",
                self.command,
                self.status,
                last.output_segments,
                last.output_km,
                last.name,
                warnings,
                self.errors.len()
            ),
            None => format!(
                "{}: {:?}, {} warnings, {} errors",
                self.command,
                self.status,
                warnings,
                self.errors.len()
            ),
        }
    }
}
