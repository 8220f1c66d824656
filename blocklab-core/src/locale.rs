//! Locale variant selection and curation tiers
//!
//! Selection falls back from an exact match to a language-family match,
//! then to the content's declared default, then to any variant (human
//! authored first). It only comes up empty when the map has no variants.

use blocklab_types::{ContentNode, LocaleCode, VariantMap};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// How a variant was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocaleMatch {
    Exact,
    Language,
    Default,
    Any,
}

impl LocaleMatch {
    /// Whether a fallback (anything but an exact match) was used
    pub fn is_fallback(self) -> bool {
        self != LocaleMatch::Exact
    }
}

/// The chosen variant
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub node: Arc<ContentNode>,
    pub locale: LocaleCode,
    pub matched: LocaleMatch,
}

/// Pick the best variant of `variants` for `requested`
pub fn select_variant(variants: &VariantMap, requested: &LocaleCode) -> Option<Selection> {
    let pick = |locale: &LocaleCode, node: &Arc<ContentNode>, matched| Selection {
        node: node.clone(),
        locale: locale.clone(),
        matched,
    };

    if let Some(node) = variants.get(requested) {
        return Some(pick(requested, node, LocaleMatch::Exact));
    }

    // Same language: a bare tag ("en") beats regional ones ("en-gb")
    let mut family: Vec<_> = variants
        .iter()
        .filter(|(locale, _)| locale.same_language(requested))
        .collect();
    family.sort_by_key(|(locale, node)| (!locale.is_bare(), node.generated));
    if let Some((locale, node)) = family.first() {
        return Some(pick(*locale, *node, LocaleMatch::Language));
    }

    if let Some(default) = &variants.default_locale {
        if let Some(node) = variants.get(default) {
            return Some(pick(default, node, LocaleMatch::Default));
        }
    }

    variants
        .iter()
        .min_by_key(|(_, node)| node.generated)
        .map(|(locale, node)| pick(locale, node, LocaleMatch::Any))
}

/// Curation tier of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Curation {
    /// Every variant is human-authored
    Curated,
    /// At least one variant is machine-generated
    BestEffort,
}

/// Classify one node across its variants
pub fn classify(variants: &VariantMap) -> Curation {
    if variants.iter().any(|(_, node)| node.generated) {
        Curation::BestEffort
    } else {
        Curation::Curated
    }
}

/// Available languages grouped for user-facing selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageTiers {
    pub curated: Vec<LocaleCode>,
    pub best_effort: Vec<LocaleCode>,
}

impl LanguageTiers {
    /// Curated languages first, then best-effort ones
    pub fn ordered(&self) -> impl Iterator<Item = (&LocaleCode, Curation)> {
        self.curated
            .iter()
            .map(|l| (l, Curation::Curated))
            .chain(self.best_effort.iter().map(|l| (l, Curation::BestEffort)))
    }

    pub fn tier_of(&self, locale: &LocaleCode) -> Option<Curation> {
        self.ordered().find(|(l, _)| *l == locale).map(|(_, tier)| tier)
    }
}

/// Group every locale seen in `scan` by curation tier
///
/// A locale is curated when every scanned node's variant in that locale is
/// human-authored, and best-effort as soon as one of them is generated.
pub fn language_tiers<'a>(scan: impl IntoIterator<Item = &'a VariantMap>) -> LanguageTiers {
    let mut generated_by_locale: BTreeMap<LocaleCode, bool> = BTreeMap::new();
    for variants in scan {
        for (locale, node) in variants.iter() {
            *generated_by_locale.entry(locale.clone()).or_default() |= node.generated;
        }
    }

    let (best_effort, curated): (BTreeSet<_>, BTreeSet<_>) = generated_by_locale
        .into_iter()
        .partition(|(_, generated)| *generated);

    LanguageTiers {
        curated: curated.into_iter().map(|(l, _)| l).collect(),
        best_effort: best_effort.into_iter().map(|(l, _)| l).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn node(locale: &str, generated: bool) -> ContentNode {
        let node = ContentNode::new("n", "Markdown").with_kid(blocklab_types::Kid::text(locale));
        if generated {
            node.generated()
        } else {
            node
        }
    }

    fn variants(entries: &[(&str, bool)]) -> VariantMap {
        let mut map = VariantMap::new();
        for (locale, generated) in entries {
            map.insert(LocaleCode::new(locale), node(locale, *generated));
        }
        map
    }

    #[test]
    fn test_exact_match() {
        let map = variants(&[("en", false), ("es", false)]);
        let sel = select_variant(&map, &"es".into()).unwrap();
        assert_eq!(sel.locale.as_str(), "es");
        assert_eq!(sel.matched, LocaleMatch::Exact);
        assert!(!sel.matched.is_fallback());
    }

    #[test]
    fn test_language_family_prefers_bare_tag() {
        let map = variants(&[("en-gb", false), ("en", false), ("fr", false)]);
        let sel = select_variant(&map, &"en-US".into()).unwrap();
        assert_eq!(sel.locale.as_str(), "en");
        assert_eq!(sel.matched, LocaleMatch::Language);

        let map = variants(&[("pt-br", false)]);
        let sel = select_variant(&map, &"pt".into()).unwrap();
        assert_eq!(sel.locale.as_str(), "pt-br");
    }

    #[test]
    fn test_declared_default_then_any() {
        let map = variants(&[("de", true), ("fr", false)]).with_default("de".into());
        let sel = select_variant(&map, &"ja".into()).unwrap();
        assert_eq!(sel.locale.as_str(), "de");
        assert_eq!(sel.matched, LocaleMatch::Default);

        let map = variants(&[("de", true), ("fr", false)]);
        let sel = select_variant(&map, &"ja".into()).unwrap();
        assert_eq!(sel.locale.as_str(), "fr");
        assert_eq!(sel.matched, LocaleMatch::Any);
    }

    #[test]
    fn test_empty_map_is_absent() {
        assert!(select_variant(&VariantMap::new(), &"en".into()).is_none());
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&variants(&[("en", false), ("es", false)])), Curation::Curated);
        assert_eq!(classify(&variants(&[("en", false), ("es", true)])), Curation::BestEffort);
    }

    #[test]
    fn test_language_tiers() {
        let a = variants(&[("en", false), ("es", false), ("fr", true)]);
        let b = variants(&[("en", false), ("es", true)]);

        let tiers = language_tiers([&a, &b]);
        assert_eq!(tiers.curated, vec![LocaleCode::new("en")]);
        assert_eq!(tiers.best_effort, vec![LocaleCode::new("es"), LocaleCode::new("fr")]);
        assert_eq!(tiers.tier_of(&"fr".into()), Some(Curation::BestEffort));
        assert_eq!(tiers.ordered().next().map(|(l, _)| l.as_str()), Some("en"));
    }

    proptest! {
        #[test]
        fn prop_nonempty_maps_always_select(
            locales in proptest::collection::btree_set("[a-z]{2}(-[a-z]{2})?", 1..6),
            requested in "[a-z]{2}(-[a-z]{2})?",
        ) {
            let mut map = VariantMap::new();
            for locale in &locales {
                map.insert(LocaleCode::new(locale), node(locale, false));
            }
            let selection = select_variant(&map, &LocaleCode::new(&requested));
            prop_assert!(selection.is_some());
            let selection = selection.unwrap();
            prop_assert!(map.get(&selection.locale).is_some());
            if locales.contains(&requested) {
                prop_assert_eq!(selection.matched, LocaleMatch::Exact);
            }
        }
    }
}
