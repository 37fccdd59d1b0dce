//! Indicator name normalizer.
//!
//! Handles:
//! - Canonical keys (`hco3_act`, `be_ecf`, ...)
//! - Analyser labels as printed on reports (`HCO3-`, `BE(B)`, `Ca++7.4`)
//! - Legacy keys from the earlier schema revision (`hco3`, `base_excess`, `lactate`)
//! - Near-miss spellings reported by a recognition model (fuzzy, opt-in)

use std::collections::HashMap;

use strsim::jaro_winkler;

use super::field::PanelField;

/// Minimum Jaro-Winkler similarity for a fuzzy match to be accepted.
const FUZZY_THRESHOLD: f64 = 0.90;

/// Maps free-form indicator names to [`PanelField`].
pub struct FieldNormalizer {
    /// Alias map: lowercase name → indicator
    aliases: HashMap<String, PanelField>,
}

impl Default for FieldNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldNormalizer {
    /// Create a normalizer with the default alias table.
    pub fn new() -> Self {
        Self {
            aliases: Self::default_aliases(),
        }
    }

    /// Exact (case-insensitive) lookup. Used for caller-supplied panels,
    /// where an unrecognised key is ignored rather than guessed.
    pub fn resolve(&self, name: &str) -> Option<PanelField> {
        self.aliases.get(&name.trim().to_lowercase()).copied()
    }

    /// Exact lookup, falling back to the closest alias above the fuzzy threshold.
    pub fn resolve_fuzzy(&self, name: &str) -> Option<PanelField> {
        if let Some(field) = self.resolve(name) {
            return Some(field);
        }

        let query = name.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }

        self.aliases
            .iter()
            .map(|(alias, field)| (jaro_winkler(&query, alias), *field))
            .filter(|(score, _)| *score >= FUZZY_THRESHOLD)
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(_, field)| field)
    }

    /// Add a custom alias mapping.
    pub fn add_alias(&mut self, alias: &str, field: PanelField) {
        self.aliases.insert(alias.trim().to_lowercase(), field);
    }

    /// Default alias mappings.
    fn default_aliases() -> HashMap<String, PanelField> {
        let mut map = HashMap::new();

        // Canonical keys and printed labels
        for field in PanelField::ALL {
            map.insert(field.key().to_string(), field);
            map.insert(field.label().to_lowercase(), field);
        }

        // Analyser label variants
        map.insert("na".into(), PanelField::Na);
        map.insert("k".into(), PanelField::K);
        map.insert("ca++7.4".into(), PanelField::Ca74);
        map.insert("ca(7.4)".into(), PanelField::Ca74);
        map.insert("hco3act".into(), PanelField::Hco3Act);
        map.insert("hco3s".into(), PanelField::Hco3Std);
        map.insert("hco3std".into(), PanelField::Hco3Std);
        map.insert("sbc".into(), PanelField::Hco3Std);
        map.insert("tco2".into(), PanelField::Ctco2);
        map.insert("beecf".into(), PanelField::BeEcf);
        map.insert("be_(ecf)".into(), PanelField::BeEcf);
        map.insert("be(b)".into(), PanelField::BeB);
        map.insert("beb".into(), PanelField::BeB);
        map.insert("so2".into(), PanelField::So2c);
        map.insert("thb".into(), PanelField::Thbc);
        map.insert("ctHb".to_lowercase(), PanelField::Thbc);

        // Legacy schema keys
        map.insert("hco3".into(), PanelField::Hco3Act);
        map.insert("base_excess".into(), PanelField::BeEcf);
        map.insert("lactate".into(), PanelField::Lac);
        map.insert("sao2".into(), PanelField::So2c);
        map.insert("glucose".into(), PanelField::Glu);
        map.insert("hb".into(), PanelField::Thbc);
        map.insert("hemoglobin".into(), PanelField::Thbc);
        map.insert("temperature".into(), PanelField::Temp);

        // Plain-language names
        map.insert("sodium".into(), PanelField::Na);
        map.insert("potassium".into(), PanelField::K);
        map.insert("calcium".into(), PanelField::Ca);
        map.insert("hematocrit".into(), PanelField::Hct);

        map
    }
}
