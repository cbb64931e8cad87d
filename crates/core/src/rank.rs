//! Suggestion ranking with graceful three-tier degradation.

use std::collections::BTreeSet;

use crate::domain::menu::{MenuItem, MenuItemId};
use crate::prefs::PreferenceSet;

pub const DEFAULT_SUGGESTION_LIMIT: usize = 8;

/// Order and fallback-select candidates into a bounded suggestion list.
///
/// `available` is the full available catalog (fallback pool); `history_tags`
/// are the requester's most-frequent interaction tags, empty when there is
/// no history. Ordering is deterministic: popularity descending, item id
/// ascending on ties.
pub fn rank(
    candidates: Vec<MenuItem>,
    prefs: &PreferenceSet,
    available: &[MenuItem],
    history_tags: &[String],
    limit: usize,
) -> Vec<MenuItem> {
    if candidates.is_empty() {
        if prefs.has_facet_terms() {
            // Content fallback ignores the price cap on purpose: better a
            // close suggestion than none.
            return content_based(&prefs.facet_terms(), available, limit);
        }
        return blended(available, history_tags, limit);
    }

    // Non-empty candidates from an entirely empty preference set can only
    // come from an unfiltered query; prefer the blend over echoing the
    // catalog back.
    if prefs.is_empty() {
        return blended(available, history_tags, limit);
    }

    let mut ranked = candidates;
    sort_by_popularity(&mut ranked);
    ranked.truncate(limit);
    ranked
}

/// Items tagged with any of the given terms, padded with globally popular
/// items when too few match. Padding never duplicates an existing pick.
pub fn content_based(tags: &[String], available: &[MenuItem], limit: usize) -> Vec<MenuItem> {
    if tags.is_empty() {
        return popularity_top(available, limit);
    }

    let mut picks: Vec<MenuItem> = available
        .iter()
        .filter(|item| item.is_available && tags.iter().any(|tag| item.has_tag(tag)))
        .cloned()
        .collect();
    sort_by_popularity(&mut picks);
    picks.truncate(limit);

    if picks.len() < limit {
        let chosen: BTreeSet<MenuItemId> = picks.iter().map(|item| item.id).collect();
        for item in popularity_top(available, limit.saturating_mul(2)) {
            if picks.len() >= limit {
                break;
            }
            if !chosen.contains(&item.id) {
                picks.push(item);
            }
        }
    }

    picks
}

/// Taste-aware blend: content match on the requester's history tags when any
/// exist, global popularity otherwise.
pub fn blended(available: &[MenuItem], history_tags: &[String], limit: usize) -> Vec<MenuItem> {
    if history_tags.is_empty() {
        return popularity_top(available, limit);
    }
    content_based(history_tags, available, limit)
}

fn popularity_top(available: &[MenuItem], limit: usize) -> Vec<MenuItem> {
    let mut items: Vec<MenuItem> = available.iter().filter(|item| item.is_available).cloned().collect();
    sort_by_popularity(&mut items);
    items.truncate(limit);
    items
}

fn sort_by_popularity(items: &mut [MenuItem]) {
    items.sort_by(|a, b| b.popularity.cmp(&a.popularity).then(a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::menu::{MenuItem, MenuItemId};
    use crate::prefs::{Facet, PreferenceSet};

    use super::{blended, content_based, rank, DEFAULT_SUGGESTION_LIMIT};

    fn item(id: i64, popularity: u32, tags: &[&str]) -> MenuItem {
        MenuItem {
            id: MenuItemId(id),
            name: format!("item-{id}"),
            description: String::new(),
            price: Decimal::new(900, 2),
            is_available: true,
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            popularity,
        }
    }

    fn catalog() -> Vec<MenuItem> {
        vec![
            item(1, 50, &["spicy", "thai"]),
            item(2, 90, &["burger"]),
            item(3, 70, &["spicy", "noodles"]),
            item(4, 90, &["salad", "vegan"]),
            item(5, 10, &["dessert"]),
        ]
    }

    #[test]
    fn empty_candidates_with_facets_fall_back_to_content_match_plus_padding() {
        let mut prefs = PreferenceSet::default();
        prefs.insert(Facet::Feature, "spicy");
        prefs.price_cap_minor = Some(100); // ignored by the fallback tier

        let picks = rank(Vec::new(), &prefs, &catalog(), &[], DEFAULT_SUGGESTION_LIMIT);

        assert!(picks.len() <= DEFAULT_SUGGESTION_LIMIT);
        // Spicy matches first (3 beats 1 on popularity), then popular padding.
        let ids: Vec<i64> = picks.iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec![3, 1, 2, 4, 5]);
        let unique: std::collections::BTreeSet<i64> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len(), "padding must not duplicate");
    }

    #[test]
    fn empty_candidates_without_facets_use_history_blend() {
        let prefs = PreferenceSet::default();
        let picks = rank(Vec::new(), &prefs, &catalog(), &["dessert".to_string()], 3);
        assert_eq!(picks[0].id, MenuItemId(5));
    }

    #[test]
    fn empty_candidates_without_facets_or_history_use_popularity() {
        let picks = rank(Vec::new(), &PreferenceSet::default(), &catalog(), &[], 3);
        let ids: Vec<i64> = picks.iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec![2, 4, 3]);
    }

    // The runtime never produces non-empty candidates alongside an entirely
    // empty preference set (an unfiltered query returns the whole catalog),
    // so this branch is only reachable directly. Kept for fidelity.
    #[test]
    fn empty_preferences_with_candidates_prefers_blended() {
        let picks =
            rank(catalog(), &PreferenceSet::default(), &catalog(), &["dessert".to_string()], 2);
        assert_eq!(picks[0].id, MenuItemId(5));
    }

    #[test]
    fn matched_candidates_rank_by_popularity() {
        let mut prefs = PreferenceSet::default();
        prefs.insert(Facet::Feature, "spicy");

        let candidates = vec![item(1, 50, &["spicy"]), item(3, 70, &["spicy"])];
        let picks = rank(candidates, &prefs, &catalog(), &[], DEFAULT_SUGGESTION_LIMIT);
        let ids: Vec<i64> = picks.iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn equal_popularity_ties_break_by_ascending_id_every_time() {
        for _ in 0..3 {
            let picks = blended(&catalog(), &[], 2);
            let ids: Vec<i64> = picks.iter().map(|i| i.id.0).collect();
            assert_eq!(ids, vec![2, 4]);
        }
    }

    #[test]
    fn content_based_without_tags_degrades_to_popularity() {
        let picks = content_based(&[], &catalog(), 2);
        let ids: Vec<i64> = picks.iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec![2, 4]);
    }
}
