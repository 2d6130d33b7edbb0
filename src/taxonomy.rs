//! Versioned label taxonomy and per-label disposal metadata.
//!
//! Labels and their bin/advice texts are loaded together from one TOML file and
//! validated before the server starts, so a taxonomy that does not line up with
//! the model is rejected instead of silently mislabeling.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::policy::{Outcome, UNKNOWN_LABEL};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub bin: String,
    pub advice: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localized_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TaxonomyFile {
    version: String,
    default_label: String,
    classes: Vec<String>,
    #[serde(default)]
    categories: HashMap<String, CategoryInfo>,
    fallback: CategoryInfo,
    unknown: CategoryInfo,
}

#[derive(Debug, Clone)]
pub struct Taxonomy {
    version: String,
    default_label: String,
    classes: Vec<String>,
    categories: HashMap<String, CategoryInfo>,
    fallback: CategoryInfo,
    unknown: CategoryInfo,
}

impl Taxonomy {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read taxonomy file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid taxonomy file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let file: TaxonomyFile = toml::from_str(raw)?;
        let taxonomy = Taxonomy {
            version: file.version,
            default_label: file.default_label,
            classes: file.classes,
            categories: file.categories,
            fallback: file.fallback,
            unknown: file.unknown,
        };
        taxonomy.validate()?;
        Ok(taxonomy)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.classes.is_empty(), "taxonomy has no classes");

        let mut seen = HashSet::new();
        for label in &self.classes {
            anyhow::ensure!(!label.trim().is_empty(), "taxonomy contains an empty label");
            anyhow::ensure!(label != UNKNOWN_LABEL, "{:?} is reserved for low-confidence results", UNKNOWN_LABEL);
            anyhow::ensure!(seen.insert(label.as_str()), "duplicate label {:?}", label);
        }
        anyhow::ensure!(
            seen.contains(self.default_label.as_str()),
            "default_label {:?} is not a class",
            self.default_label
        );

        for (label, info) in &self.categories {
            anyhow::ensure!(seen.contains(label.as_str()), "category {:?} is not a class", label);
            check_info(label, info)?;
        }
        check_info("fallback", &self.fallback)?;
        check_info("unknown", &self.unknown)?;
        Ok(())
    }

    /// Rejects a model whose output width differs from the label count.
    pub fn check_output_len(&self, output_len: usize) -> anyhow::Result<()> {
        anyhow::ensure!(
            output_len == self.classes.len(),
            "model produces {} scores but taxonomy {:?} has {} classes",
            output_len,
            self.version,
            self.classes.len()
        );
        Ok(())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    pub fn default_label(&self) -> &str {
        &self.default_label
    }

    /// Disposal metadata for an outcome. Never fails: unmapped labels get the
    /// fallback entry, Unknown gets its own.
    pub fn category_for(&self, outcome: &Outcome) -> &CategoryInfo {
        match outcome {
            Outcome::Unknown => &self.unknown,
            Outcome::Confident { label } => self.categories.get(label).unwrap_or(&self.fallback),
        }
    }
}

fn check_info(name: &str, info: &CategoryInfo) -> anyhow::Result<()> {
    anyhow::ensure!(!info.bin.trim().is_empty(), "{}: bin must not be empty", name);
    anyhow::ensure!(!info.advice.trim().is_empty(), "{}: advice must not be empty", name);
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const ABC: &str = r#"
        version = "abc-1"
        default_label = "c"
        classes = ["a", "b", "c"]

        [categories.a]
        bin = "blue"
        advice = "flatten it"
        localized_name = "ay"

        [categories.b]
        bin = "green"
        advice = "rinse it"

        [fallback]
        bin = "general"
        advice = "-"

        [unknown]
        bin = "none"
        advice = "try another photo"
    "#;

    pub(crate) fn abc_taxonomy() -> Taxonomy {
        Taxonomy::from_toml(ABC).unwrap()
    }

    #[test]
    fn test_mapper_is_total() {
        let tax = abc_taxonomy();
        let mut outcomes: Vec<Outcome> =
            tax.classes().iter().map(|l| Outcome::Confident { label: l.clone() }).collect();
        outcomes.push(Outcome::Unknown);

        for outcome in &outcomes {
            let info = tax.category_for(outcome);
            assert!(!info.bin.is_empty());
            assert!(!info.advice.is_empty());
        }
        // "c" has no entry of its own
        let c = tax.category_for(&Outcome::Confident { label: "c".to_string() });
        assert_eq!(c.bin, "general");
        assert_eq!(tax.category_for(&Outcome::Unknown).advice, "try another photo");
        let a = tax.category_for(&Outcome::Confident { label: "a".to_string() });
        assert_eq!(a.localized_name.as_deref(), Some("ay"));
    }

    #[test]
    fn test_unlisted_label_gets_fallback() {
        let tax = abc_taxonomy();
        let info = tax.category_for(&Outcome::Confident { label: "zzz".to_string() });
        assert_eq!(info.bin, "general");
    }

    #[test]
    fn test_rejects_duplicate_label() {
        let bad = ABC.replace(r#"["a", "b", "c"]"#, r#"["a", "b", "b"]"#);
        let err = Taxonomy::from_toml(&bad).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_category_outside_classes() {
        let bad = ABC.replace("[categories.b]", "[categories.q]");
        assert!(Taxonomy::from_toml(&bad).is_err());
    }

    #[test]
    fn test_rejects_unknown_default_label() {
        let bad = ABC.replace(r#"default_label = "c""#, r#"default_label = "x""#);
        assert!(Taxonomy::from_toml(&bad).is_err());
    }

    #[test]
    fn test_rejects_blank_advice() {
        let bad = ABC.replace(r#"advice = "rinse it""#, r#"advice = "  ""#);
        assert!(Taxonomy::from_toml(&bad).is_err());
    }

    #[test]
    fn test_rejects_reserved_label() {
        let bad = ABC.replace(r#"["a", "b", "c"]"#, r#"["a", "b", "c", "Unknown"]"#);
        assert!(Taxonomy::from_toml(&bad).is_err());
    }

    #[test]
    fn test_output_len_check() {
        let tax = abc_taxonomy();
        assert!(tax.check_output_len(3).is_ok());
        assert!(tax.check_output_len(6).is_err());
    }

    #[test]
    fn test_shipped_taxonomy_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("taxonomy.toml");
        let tax = Taxonomy::load(&path).unwrap();
        assert_eq!(tax.len(), 6);
        assert_eq!(tax.label(0), Some("cardboard"));
        assert_eq!(tax.default_label(), "trash");
    }
}
