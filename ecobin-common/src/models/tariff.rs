// File: ecobin-common/src/models/tariff.rs

use std::collections::{BTreeMap, HashMap};

use crate::Error;
use crate::models::MaterialKind;

/// Fixed mapping material -> points. Built once at startup and shared
/// read-only; changing an existing entry would misexplain past audit rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tariff {
    points: BTreeMap<MaterialKind, i32>,
}

impl Default for Tariff {
    fn default() -> Self {
        let mut points = BTreeMap::new();
        points.insert(MaterialKind::Bottle, 100);
        points.insert(MaterialKind::Paper, 50);
        Self { points }
    }
}

impl Tariff {
    pub fn new(entries: impl IntoIterator<Item = (MaterialKind, i32)>) -> Result<Self, Error> {
        let mut points = BTreeMap::new();
        for (material, value) in entries {
            if value <= 0 {
                return Err(Error::Config(format!(
                    "tariff for '{}' must be positive, got {}",
                    material, value
                )));
            }
            points.insert(material, value);
        }
        if points.is_empty() {
            return Err(Error::Config("tariff must list at least one material".into()));
        }
        Ok(Self { points })
    }

    /// Parses `{"bottle": 100, "paper": 50}`.
    pub fn from_json_str(raw: &str) -> Result<Self, Error> {
        let parsed: HashMap<String, i32> = serde_json::from_str(raw)?;
        let mut entries = Vec::with_capacity(parsed.len());
        for (name, value) in parsed {
            let material = name.parse::<MaterialKind>().map_err(|_| {
                Error::Config(format!("tariff names unknown material '{}'", name))
            })?;
            entries.push((material, value));
        }
        Self::new(entries)
    }

    pub fn points_for(&self, material: MaterialKind) -> Result<i32, Error> {
        self.points
            .get(&material)
            .copied()
            .ok_or_else(|| Error::InvalidMaterial(material.to_string()))
    }

    pub fn materials(&self) -> impl Iterator<Item = MaterialKind> + '_ {
        self.points.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tariff_matches_bin_rates() {
        let t = Tariff::default();
        assert_eq!(t.points_for(MaterialKind::Bottle).unwrap(), 100);
        assert_eq!(t.points_for(MaterialKind::Paper).unwrap(), 50);
    }

    #[test]
    fn json_tariff_may_omit_materials() {
        let t = Tariff::from_json_str(r#"{"Bottle": 120}"#).unwrap();
        assert_eq!(t.points_for(MaterialKind::Bottle).unwrap(), 120);
        assert!(matches!(
            t.points_for(MaterialKind::Paper),
            Err(Error::InvalidMaterial(_))
        ));
    }

    #[test]
    fn rejects_non_positive_and_unknown_entries() {
        assert!(Tariff::from_json_str(r#"{"bottle": 0}"#).is_err());
        assert!(Tariff::from_json_str(r#"{"glass": 10}"#).is_err());
        assert!(Tariff::from_json_str("{}").is_err());
    }
}
