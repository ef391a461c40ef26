//! Types d'erreurs pour le crate vicinal

use thiserror::Error;

/// Erreurs pouvant survenir dans le pipeline
///
/// Les erreurs par entité (`InvalidGeometry`, `MissingReferenceData`) sont
/// récupérées localement et comptabilisées ; les autres sont fatales pour le run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VicinalError {
    /// Géométrie vide, nulle, dégénérée ou non linéaire
    #[error("Invalid geometry for {feature_id}: {reason}")]
    InvalidGeometry { feature_id: String, reason: String },

    /// Clé de jointure sans correspondance dans la table de référence
    #[error("Missing reference data for {key}: {reason}")]
    MissingReferenceData { key: String, reason: String },

    /// Disparité non calculable (moyenne nulle, valeur indéfinie)
    #[error("Undefined disparity: {reason}")]
    UndefinedDisparity { reason: String },

    /// Couche dans un système de coordonnées inattendu
    #[error("Inconsistent units in layer {layer}: {reason}")]
    InconsistentUnits { layer: String, reason: String },

    /// EPSG non supporté par la reprojection légère (et PROJ indisponible)
    #[error("Unsupported CRS: EPSG:{epsg}")]
    UnsupportedCrs { epsg: u32 },

    /// Échec de reprojection
    #[error("Projection error: {reason}")]
    Projection { reason: String },

    /// Donnée d'entrée invalide pour toute une couche
    #[error("Invalid input in layer {layer}: {reason}")]
    InvalidInput { layer: String, reason: String },
}

impl VicinalError {
    /// Crée une erreur de géométrie invalide
    pub fn invalid_geometry(feature_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            feature_id: feature_id.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur de donnée de référence manquante
    pub fn missing_reference(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MissingReferenceData {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur d'unités incohérentes
    pub fn inconsistent_units(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InconsistentUnits {
            layer: layer.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur d'entrée invalide
    pub fn invalid_input(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            layer: layer.into(),
            reason: reason.into(),
        }
    }

    /// Indique si l'erreur doit interrompre le run
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::InvalidGeometry { .. }
                | Self::MissingReferenceData { .. }
                | Self::UndefinedDisparity { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(!VicinalError::invalid_geometry("w1", "empty").is_fatal());
        assert!(!VicinalError::missing_reference("3550308", "no population").is_fatal());
        assert!(VicinalError::inconsistent_units("network", "degrees").is_fatal());
        assert!(VicinalError::UnsupportedCrs { epsg: 5880 }.is_fatal());
    }

    #[test]
    fn test_display() {
        let err = VicinalError::invalid_geometry("way/42", "fewer than two coordinates");
        assert_eq!(
            err.to_string(),
            "Invalid geometry for way/42: fewer than two coordinates"
        );
    }
}
