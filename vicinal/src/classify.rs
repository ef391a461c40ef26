//! Classification administrative des segments OSM
//!
//! Règles appliquées dans l'ordre, la première qui exclut l'emporte :
//! 1. classe `highway` fédérale/estadual ou intra-urbaine
//! 2. référence de rodovia fédérale (`BR-nnn`) ou estadual (`SP-nnn`),
//!    sauf codes municipaux `SPA-`, `SPI-`, `SPM-`
//! 3. nom commençant par un type de voie urbaine (Rua, Avenida…)
//!
//! Un segment sans attributs est conservé.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use tracing::info;

use crate::types::{HighwayClass, RoadSegment, RoadTags, Tally};

static FEDERAL_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bBR-\d+").expect("valid regex"));

static STATE_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bSP-\d+").expect("valid regex"));

/// Codes vicinaux municipaux : Acesso, Interna, Municipal
static MUNICIPAL_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bSP[AIM]-").expect("valid regex"));

static URBAN_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(rua|avenida|av\.|travessa|alameda|praça|viela|largo|beco|passagem|ladeira|passeio)\s",
    )
    .expect("valid regex")
});

/// Motif d'exclusion, pour les comptes d'audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExclusionReason {
    /// Classe `highway` jamais vicinale
    RoadClass,
    /// Référence `BR-nnn`
    FederalReference,
    /// Référence `SP-nnn`
    StateReference,
    /// Nom de voie urbaine
    UrbanName,
}

impl ExclusionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoadClass => "road_class",
            Self::FederalReference => "federal_reference",
            Self::StateReference => "state_reference",
            Self::UrbanName => "urban_name",
        }
    }
}

/// Décision pour un segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retain,
    Exclude(ExclusionReason),
}

impl Decision {
    pub fn is_retained(&self) -> bool {
        matches!(self, Self::Retain)
    }
}

/// Classes exclues d'office
pub fn is_excluded_class(class: &HighwayClass) -> bool {
    matches!(
        class,
        HighwayClass::Motorway
            | HighwayClass::MotorwayLink
            | HighwayClass::Trunk
            | HighwayClass::TrunkLink
            | HighwayClass::Residential
            | HighwayClass::LivingStreet
            | HighwayClass::Service
    )
}

/// Référence de rodovia fédérale ou estadual
pub fn reference_exclusion(reference: &str) -> Option<ExclusionReason> {
    let upper = reference.to_uppercase();

    if FEDERAL_REF_RE.is_match(&upper) {
        return Some(ExclusionReason::FederalReference);
    }

    // SP-nnn exclu, sauf si la référence porte aussi un code municipal
    if STATE_REF_RE.is_match(&upper) && !MUNICIPAL_REF_RE.is_match(&upper) {
        return Some(ExclusionReason::StateReference);
    }

    None
}

/// Nom de voie urbaine (préfixe en tête du nom brut, insensible à la casse)
pub fn is_urban_name(name: &str) -> bool {
    URBAN_NAME_RE.is_match(name)
}

/// Classe un segment selon ses attributs
pub fn classify(tags: &RoadTags) -> Decision {
    if tags.highway.as_ref().is_some_and(is_excluded_class) {
        return Decision::Exclude(ExclusionReason::RoadClass);
    }

    if let Some(reason) = tags.reference.as_deref().and_then(reference_exclusion) {
        return Decision::Exclude(reason);
    }

    if tags.name.as_deref().is_some_and(is_urban_name) {
        return Decision::Exclude(ExclusionReason::UrbanName);
    }

    Decision::Retain
}

/// Comptes de la classification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationStats {
    pub input: Tally,
    pub retained: Tally,
    pub excluded: BTreeMap<ExclusionReason, Tally>,
}

impl ClassificationStats {
    pub fn excluded_total(&self) -> Tally {
        self.excluded
            .values()
            .fold(Tally::default(), |acc, t| acc.merge(*t))
    }
}

/// Classe tout un réseau et renvoie les candidats vicinaux
pub fn classify_network(segments: Vec<RoadSegment>) -> (Vec<RoadSegment>, ClassificationStats) {
    let mut stats = ClassificationStats {
        input: Tally::of(&segments),
        ..Default::default()
    };

    let decisions: Vec<Decision> = segments.par_iter().map(|s| classify(&s.tags)).collect();

    let mut retained = Vec::with_capacity(segments.len());
    for (segment, decision) in segments.into_iter().zip(decisions) {
        match decision {
            Decision::Retain => {
                stats.retained.add(segment.length_m);
                retained.push(segment);
            }
            Decision::Exclude(reason) => {
                stats.excluded.entry(reason).or_default().add(segment.length_m);
            }
        }
    }

    info!(
        input = stats.input.count,
        retained = stats.retained.count,
        excluded = stats.excluded_total().count,
        "Administrative classification done"
    );

    (retained, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(highway: Option<&str>, reference: Option<&str>, name: Option<&str>) -> RoadTags {
        RoadTags {
            highway: highway.map(HighwayClass::parse),
            reference: reference.map(str::to_string),
            name: name.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_motorway_always_excluded() {
        for (reference, name) in [
            (None, None),
            (Some("SPA-123"), Some("Estrada Municipal")),
            (Some("BR-116"), Some("Rua X")),
        ] {
            assert_eq!(
                classify(&tags(Some("motorway"), reference, name)),
                Decision::Exclude(ExclusionReason::RoadClass)
            );
        }
    }

    #[test]
    fn test_excluded_classes() {
        for class in [
            "motorway_link",
            "trunk",
            "trunk_link",
            "residential",
            "living_street",
            "service",
        ] {
            assert!(!classify(&tags(Some(class), None, None)).is_retained(), "{}", class);
        }
        for class in ["primary", "secondary", "tertiary", "unclassified", "track"] {
            assert!(classify(&tags(Some(class), None, None)).is_retained(), "{}", class);
        }
    }

    #[test]
    fn test_reference_patterns() {
        assert_eq!(
            classify(&tags(Some("primary"), Some("BR-374"), None)),
            Decision::Exclude(ExclusionReason::FederalReference)
        );
        assert_eq!(
            classify(&tags(Some("secondary"), Some("sp-055"), None)),
            Decision::Exclude(ExclusionReason::StateReference)
        );
        // Codes municipaux
        for reference in ["SPA-123", "SPI-040/300", "SPM-1", "SPA-123;SP-055"] {
            assert!(
                classify(&tags(Some("tertiary"), Some(reference), None)).is_retained(),
                "{}",
                reference
            );
        }
        // Sans chiffres après le tiret, pas une rodovia
        assert!(classify(&tags(None, Some("SP-"), None)).is_retained());
    }

    #[test]
    fn test_urban_names() {
        for name in [
            "Rua das Flores",
            "AVENIDA Brasil",
            "Av. Paulista",
            "praça da Sé",
            "PRAÇA XV",
            "Travessa 3",
            "Ladeira Porto Geral",
        ] {
            assert_eq!(
                classify(&tags(Some("unclassified"), None, Some(name))),
                Decision::Exclude(ExclusionReason::UrbanName),
                "{}",
                name
            );
        }
        // Préfixe ancré sur le nom tel quel, espaces de tête compris
        for name in ["Estrada do Rio Acima", "Ruas", "Caminho da Rua", "Avenidas", "  Travessa 3"] {
            assert!(classify(&tags(None, None, Some(name))).is_retained(), "{}", name);
        }
    }

    #[test]
    fn test_first_rule_wins() {
        // Référence fédérale et nom urbain : la référence est testée avant le nom
        assert_eq!(
            classify(&tags(Some("primary"), Some("BR-116"), Some("Rua A"))),
            Decision::Exclude(ExclusionReason::FederalReference)
        );
    }

    #[test]
    fn test_missing_tags_retained() {
        assert_eq!(classify(&RoadTags::default()), Decision::Retain);
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            tags(Some("track"), Some("SPA-10"), Some("Estrada Velha")),
            tags(Some("residential"), None, None),
            tags(None, Some("SP-300"), None),
        ];
        for t in &samples {
            assert_eq!(classify(t), classify(t));
        }
    }
}
