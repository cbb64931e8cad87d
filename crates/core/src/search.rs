//! Hard filter over catalog candidates: AND of OR-groups.

use std::collections::BTreeSet;

use crate::domain::menu::{MenuItem, MenuItemId};
use crate::prefs::PreferenceSet;

/// Keep available items that pass the price cap, match at least one facet
/// term when any are given, and carry no excluded allergen tag. Output is
/// de-duplicated by item id; ordering is left to the ranker.
pub fn filter_candidates(items: &[MenuItem], prefs: &PreferenceSet) -> Vec<MenuItem> {
    let facet_terms = prefs.facet_terms();
    let mut seen: BTreeSet<MenuItemId> = BTreeSet::new();
    let mut candidates = Vec::new();

    for item in items {
        if !item.is_available {
            continue;
        }
        if let Some(cap) = prefs.price_cap_minor {
            if item.price_minor() > cap {
                continue;
            }
        }
        if !facet_terms.is_empty() && !facet_terms.iter().any(|term| item.has_tag(term)) {
            continue;
        }
        if prefs.allergens_to_exclude.iter().any(|allergen| item.has_tag(allergen)) {
            continue;
        }
        if seen.insert(item.id) {
            candidates.push(item.clone());
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::menu::{MenuItem, MenuItemId};
    use crate::prefs::{Facet, PreferenceSet};

    use super::filter_candidates;

    fn item(id: i64, price_minor: i64, tags: &[&str], available: bool) -> MenuItem {
        MenuItem {
            id: MenuItemId(id),
            name: format!("item-{id}"),
            description: String::new(),
            price: Decimal::new(price_minor, 2),
            is_available: available,
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            popularity: 0,
        }
    }

    #[test]
    fn unavailable_items_never_match() {
        let items = vec![item(1, 800, &["vegan"], false)];
        assert!(filter_candidates(&items, &PreferenceSet::default()).is_empty());
    }

    #[test]
    fn price_cap_filters_when_set() {
        let items = vec![item(1, 800, &[], true), item(2, 1500, &[], true)];
        let mut prefs = PreferenceSet::default();
        prefs.price_cap_minor = Some(1000);

        let kept = filter_candidates(&items, &prefs);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, MenuItemId(1));
    }

    #[test]
    fn facet_union_matches_any_term_case_insensitively() {
        let items = vec![
            item(1, 800, &["Thai", "noodles"], true),
            item(2, 800, &["burger"], true),
            item(3, 800, &["Spicy"], true),
        ];
        let mut prefs = PreferenceSet::default();
        prefs.insert(Facet::Cuisine, "thai");
        prefs.insert(Facet::Feature, "spicy");

        let kept = filter_candidates(&items, &prefs);
        let ids: Vec<i64> = kept.iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn allergen_exclusion_applies_after_facet_match() {
        let items =
            vec![item(1, 800, &["thai", "peanut"], true), item(2, 800, &["thai"], true)];
        let mut prefs = PreferenceSet::default();
        prefs.insert(Facet::Cuisine, "thai");
        prefs.insert(Facet::Allergen, "peanut");

        let kept = filter_candidates(&items, &prefs);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, MenuItemId(2));
    }

    #[test]
    fn duplicate_ids_are_dropped() {
        let items = vec![item(1, 800, &[], true), item(1, 800, &[], true)];
        assert_eq!(filter_candidates(&items, &PreferenceSet::default()).len(), 1);
    }

    #[test]
    fn matching_vegan_spicy_under_cap_keeps_a_and_drops_b() {
        let a = item(1, 800, &["vegan", "spicy"], true);
        let b = item(2, 1500, &["vegan"], true);
        let mut prefs = PreferenceSet::default();
        prefs.insert(Facet::Diet, "vegan");
        prefs.insert(Facet::Feature, "spicy");
        prefs.price_cap_minor = Some(1000);

        let kept = filter_candidates(&[a.clone(), b], &prefs);
        assert_eq!(kept, vec![a]);
    }
}
