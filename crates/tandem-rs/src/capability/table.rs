//! Curated capabilities of known model families.
//!
//! Families are keyed by date-free name fragments. Lookup tries an exact
//! (case-insensitive) match first, then a substring match in either
//! direction where the longest matching family wins. User-supplied entries
//! are consulted before the built-ins.

use super::{CapabilitySource, ModelCapabilities, ModelCategory};
use serde::Deserialize;

/// A model name shorter than this never matches a family by being a
/// substring of it ("code" must not resolve to "deepseek-coder").
const MIN_REVERSE_MATCH_LEN: usize = 4;

/// One row of the knowledge table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FamilyEntry {
    /// Lower-case family fragment, e.g. `"qwen2.5-coder"`.
    pub family: String,
    pub max_context: usize,
    pub max_generation: usize,
    pub category: ModelCategory,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl FamilyEntry {
    pub fn new(
        family: impl Into<String>,
        max_context: usize,
        max_generation: usize,
        category: ModelCategory,
    ) -> Self {
        Self {
            family: family.into().to_lowercase(),
            max_context,
            max_generation,
            category,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Capabilities described by this entry.
    pub fn capabilities(&self) -> ModelCapabilities {
        let caps = ModelCapabilities::with_limits(self.max_context, self.max_generation, self.category)
            .with_source(CapabilitySource::Table);
        match self.temperature {
            Some(t) => caps.with_temperature(t),
            None => caps,
        }
    }
}

/// (family, context, generation, category, temperature)
const BUILTIN_FAMILIES: &[(&str, usize, usize, ModelCategory, f32)] = &[
    ("deepseek-coder", 16_384, 4096, ModelCategory::Code, 0.2),
    ("codellama", 8192, 2048, ModelCategory::Code, 0.2),
    ("qwen2.5-coder", 32_768, 4096, ModelCategory::Code, 0.2),
    ("qwen3-vl-2b-instruct", 4096, 2000, ModelCategory::General, 0.3),
    ("starcoder2", 16_384, 4096, ModelCategory::Code, 0.2),
    ("mistral", 8192, 2048, ModelCategory::General, 0.3),
    ("mixtral", 32_768, 4096, ModelCategory::General, 0.3),
];

/// Ordered lookup table of model families.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeTable {
    custom: Vec<FamilyEntry>,
    builtin: Vec<FamilyEntry>,
}

impl Default for KnowledgeTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KnowledgeTable {
    /// The built-in families only.
    pub fn builtin() -> Self {
        let builtin = BUILTIN_FAMILIES
            .iter()
            .map(|&(family, ctx, generation, category, temp)| {
                FamilyEntry::new(family, ctx, generation, category).with_temperature(temp)
            })
            .collect();
        Self {
            custom: Vec::new(),
            builtin,
        }
    }

    /// An empty table; every lookup misses.
    pub fn empty() -> Self {
        Self {
            custom: Vec::new(),
            builtin: Vec::new(),
        }
    }

    /// Add user entries. They take priority over built-in families.
    pub fn with_entries(mut self, entries: impl IntoIterator<Item = FamilyEntry>) -> Self {
        self.custom.extend(entries.into_iter().map(|mut e| {
            e.family = e.family.to_lowercase();
            e
        }));
        self
    }

    pub fn len(&self) -> usize {
        self.custom.len() + self.builtin.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find the entry for a model name.
    pub fn lookup(&self, model_name: &str) -> Option<&FamilyEntry> {
        let name = model_name.trim().to_lowercase();
        if name.is_empty() {
            return None;
        }
        lookup_in(&self.custom, &name).or_else(|| lookup_in(&self.builtin, &name))
    }
}

fn lookup_in<'a>(entries: &'a [FamilyEntry], name: &str) -> Option<&'a FamilyEntry> {
    if let Some(exact) = entries.iter().find(|e| e.family == name) {
        return Some(exact);
    }

    let reverse_ok = name.chars().count() >= MIN_REVERSE_MATCH_LEN;
    let mut best: Option<&FamilyEntry> = None;
    for entry in entries {
        let hit = name.contains(entry.family.as_str())
            || (reverse_ok && entry.family.contains(name));
        if hit && best.is_none_or(|b| entry.family.len() > b.family.len()) {
            best = Some(entry);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_case_insensitive() {
        let table = KnowledgeTable::builtin();
        let entry = table.lookup("CodeLlama").unwrap();
        assert_eq!(entry.family, "codellama");
        assert_eq!(entry.max_context, 8192);
    }

    #[test]
    fn tagged_names_match_by_substring() {
        let table = KnowledgeTable::builtin();
        assert_eq!(table.lookup("deepseek-coder:6.7b").unwrap().max_context, 16_384);
        assert_eq!(table.lookup("qwen/qwen3-vl-2b-instruct").unwrap().max_generation, 2000);
    }

    #[test]
    fn longest_family_wins() {
        let table = KnowledgeTable::builtin()
            .with_entries([FamilyEntry::new("qwen", 8192, 2048, ModelCategory::General)]);
        // Custom entries are consulted first, so "qwen" beats the built-in.
        assert_eq!(table.lookup("qwen2.5-coder:7b").unwrap().family, "qwen");

        let table = KnowledgeTable::empty().with_entries([
            FamilyEntry::new("qwen", 8192, 2048, ModelCategory::General),
            FamilyEntry::new("qwen2.5-coder", 32_768, 4096, ModelCategory::Code),
        ]);
        assert_eq!(table.lookup("qwen2.5-coder:7b").unwrap().family, "qwen2.5-coder");
    }

    #[test]
    fn reverse_match_needs_a_real_name() {
        let table = KnowledgeTable::builtin();
        assert!(table.lookup("code").is_none());
        assert_eq!(table.lookup("starcoder").unwrap().family, "starcoder2");
    }

    #[test]
    fn unknown_and_empty_names_miss() {
        let table = KnowledgeTable::builtin();
        assert!(table.lookup("llama3.1:8b").is_none());
        assert!(table.lookup("   ").is_none());
        assert!(KnowledgeTable::empty().is_empty());
    }

    #[test]
    fn entry_capabilities_carry_temperature() {
        let caps = FamilyEntry::new("custom", 12_000, 3000, ModelCategory::Chat)
            .with_temperature(0.7)
            .capabilities();
        assert_eq!(caps.max_context_tokens(), 12_000);
        assert_eq!(caps.max_generation_tokens(), 3000);
        assert!((caps.default_temperature() - 0.7).abs() < f32::EPSILON);
        assert_eq!(caps.source(), CapabilitySource::Table);
    }

    #[test]
    fn entries_deserialize_from_config() {
        let entry: FamilyEntry = serde_json::from_str(
            r#"{"family": "Phi4", "max_context": 16384, "max_generation": 4096, "category": "general"}"#,
        )
        .unwrap();
        let table = KnowledgeTable::empty().with_entries([entry]);
        assert_eq!(table.lookup("phi4:14b").unwrap().max_context, 16_384);
    }
}
