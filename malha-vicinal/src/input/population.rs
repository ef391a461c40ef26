//! Table de population : tableau JSON `[{cod_ibge, populacao, ano_referencia}, ...]`

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use tracing::info;
use vicinal::{PopulationRecord, UnitId};

use super::decode::{read_text, InputFile};
use crate::config::PopulationFields;

/// Entier avec séparateurs de milliers : `1.185.977`
static THOUSANDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(\.\d{3})+$").expect("valid regex"));

/// Charge la table de population
///
/// Accepte un tableau d'objets, ou un objet dont un membre est ce tableau.
pub fn read_population(path: &Path, fields: &PopulationFields) -> Result<(Vec<PopulationRecord>, InputFile)> {
    let decoded = read_text("population", path)?;
    let value: Value = serde_json::from_str(&decoded.text)
        .with_context(|| format!("Failed to parse population JSON: {}", path.display()))?;

    let rows = match &value {
        Value::Array(rows) => rows,
        Value::Object(map) => map
            .values()
            .find_map(Value::as_array)
            .with_context(|| format!("No record array in {}", path.display()))?,
        _ => anyhow::bail!("Expected a JSON array in {}", path.display()),
    };

    let records = parse_records(rows, fields)
        .with_context(|| format!("Invalid population table: {}", path.display()))?;
    info!(records = records.len(), "Population table loaded");

    Ok((records, decoded.file))
}

fn parse_records(rows: &[Value], fields: &PopulationFields) -> Result<Vec<PopulationRecord>> {
    let mut records = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let id = match row.get(&fields.id) {
            Some(Value::String(s)) => UnitId::normalize(s),
            Some(Value::Number(n)) => UnitId::normalize(&n.to_string()),
            _ => anyhow::bail!("Row {} has no '{}' identifier", i, fields.id),
        };
        let population = match row.get(&fields.population) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => parse_population(s),
            _ => None,
        }
        .filter(|p| p.is_finite() && *p >= 0.0)
        .with_context(|| format!("Row {} ({}) has no valid '{}'", i, id, fields.population))?;
        let year = match row.get(&fields.year) {
            Some(Value::Number(n)) => n.as_u64().and_then(|y| u16::try_from(y).ok()),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };

        records.push(PopulationRecord { id, population, year });
    }
    Ok(records)
}

/// Lit une population textuelle ; le point n'est un séparateur de milliers
/// que si toute la chaîne est groupée par trois chiffres
fn parse_population(s: &str) -> Option<f64> {
    let s = s.trim();
    if THOUSANDS_RE.is_match(s) {
        s.replace('.', "").parse().ok()
    } else {
        s.parse().ok()
    }
}
