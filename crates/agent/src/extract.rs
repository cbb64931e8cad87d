//! Deterministic text extraction: intents, preference facets, and item
//! targets from one raw message.
//!
//! This is the mandatory path. The optional planner enrichment (`planner`)
//! can only add to its output, never replace it.

use std::collections::BTreeSet;

use tably_core::domain::menu::MenuItemId;
use tably_core::prefs::{Intent, ItemRef, PreferenceSet, Vocabulary};

const ADD_VERBS: &[&str] = &["order", "add", "buy", "get", "take", "purchase", "place"];
const REMOVE_VERBS: &[&str] = &["remove", "delete", "drop"];
const PRICE_CUES: &[&str] = &["under", "below", "<", "<=", "≤"];
const CHECKOUT_CUES: &[&str] = &["checkout", "check out"];
const SHOW_CART_CUES: &[&str] = &["show cart", "show my cart", "view cart", "view my cart"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extraction {
    pub intents: BTreeSet<Intent>,
    pub prefs: PreferenceSet,
    pub add_targets: Vec<ItemRef>,
    pub remove_targets: Vec<ItemRef>,
}

impl Extraction {
    /// Highest-priority detected intent.
    pub fn primary_intent(&self) -> Intent {
        self.intents
            .iter()
            .copied()
            .max_by_key(|intent| intent.priority())
            .unwrap_or(Intent::Discover)
    }

    /// Merge another add target in, summing quantities for an id already
    /// present and keeping first-seen order.
    pub fn push_add_target(&mut self, item_id: MenuItemId, quantity: u32) {
        push_target(&mut self.add_targets, item_id, quantity);
    }
}

#[derive(Clone, Debug)]
pub struct LexicalExtractor {
    vocabulary: Vocabulary,
}

impl Default for LexicalExtractor {
    fn default() -> Self {
        Self::new(Vocabulary::builtin())
    }
}

impl LexicalExtractor {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary }
    }

    /// Pure function of the input text and the static vocabulary.
    pub fn extract(&self, text: &str) -> Extraction {
        let normalized = text.to_lowercase();
        let tokens = tokenize(&normalized);

        let mut extraction = Extraction::default();
        self.extract_facets(&normalized, &mut extraction.prefs);

        // Price phrases first: their numbers must never be read as item ids.
        let mut consumed = vec![false; tokens.len()];
        consume_price_phrases(&tokens, &mut consumed, &mut extraction.prefs);
        extract_targets(&tokens, &mut consumed, &mut extraction);

        if CHECKOUT_CUES.iter().any(|cue| normalized.contains(cue)) {
            extraction.intents.insert(Intent::Checkout);
        }
        if SHOW_CART_CUES.iter().any(|cue| normalized.contains(cue)) {
            extraction.intents.insert(Intent::ShowCart);
        }
        // The intent requires an actual target; a bare order-verb with no id
        // ("I'd like to order something") stays discovery.
        if !extraction.add_targets.is_empty() {
            extraction.intents.insert(Intent::AddToCart);
        }
        if !extraction.remove_targets.is_empty() {
            extraction.intents.insert(Intent::RemoveFromCart);
        }
        if extraction.intents.is_empty() {
            extraction.intents.insert(Intent::Discover);
        }

        extraction
    }

    /// Substring containment over the whole message. No negation handling:
    /// "not spicy" still activates "spicy".
    fn extract_facets(&self, normalized: &str, prefs: &mut PreferenceSet) {
        for entry in self.vocabulary.entries() {
            if normalized.contains(&entry.term) {
                prefs.insert(entry.facet, &entry.canonical);
            }
        }
    }
}

fn tokenize(normalized: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(normalized.len());
    for character in normalized.chars() {
        if character.is_ascii_alphanumeric()
            || matches!(character, '$' | '#' | '.' | '<' | '=' | '≤')
        {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

/// Marks every "under/below/≤ $N" span consumed; the first span sets the cap.
fn consume_price_phrases(tokens: &[String], consumed: &mut [bool], prefs: &mut PreferenceSet) {
    let mut index = 0;
    while index < tokens.len() {
        let cue_len = price_cue_len(tokens, index);
        if cue_len == 0 {
            index += 1;
            continue;
        }
        let amount_index = index + cue_len;
        let Some(amount) = tokens.get(amount_index).and_then(|token| parse_money_minor(token))
        else {
            index += 1;
            continue;
        };
        for flag in consumed.iter_mut().take(amount_index + 1).skip(index) {
            *flag = true;
        }
        if prefs.price_cap_minor.is_none() {
            prefs.price_cap_minor = Some(amount);
        }
        index = amount_index + 1;
    }
}

fn price_cue_len(tokens: &[String], index: usize) -> usize {
    if PRICE_CUES.contains(&tokens[index].as_str()) {
        return 1;
    }
    if tokens[index] == "less" && tokens.get(index + 1).is_some_and(|next| next == "than") {
        return 2;
    }
    0
}

/// "$12", "12", or "12.50" as minor units. Anything else is not money.
fn parse_money_minor(token: &str) -> Option<i64> {
    let trimmed = token.strip_prefix('$').unwrap_or(token);
    if trimmed.is_empty() {
        return None;
    }
    let (dollars_raw, cents_raw) = match trimmed.split_once('.') {
        Some((dollars, cents)) => (dollars, cents),
        None => (trimmed, ""),
    };
    if dollars_raw.is_empty()
        || !dollars_raw.bytes().all(|byte| byte.is_ascii_digit())
        || cents_raw.len() > 2
        || !cents_raw.bytes().all(|byte| byte.is_ascii_digit())
    {
        return None;
    }
    let dollars: i64 = dollars_raw.parse().ok()?;
    let cents: i64 = if cents_raw.is_empty() {
        0
    } else {
        let parsed: i64 = cents_raw.parse().ok()?;
        if cents_raw.len() == 1 {
            parsed * 10
        } else {
            parsed
        }
    };
    Some(dollars * 100 + cents)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TargetSide {
    Add,
    Remove,
}

/// Every bare or `#`-prefixed integer after a verb cue becomes a target for
/// that verb, with an optional trailing quantity marker (`x2`, `x 2`,
/// `qty 3`, `qty3`).
fn extract_targets(tokens: &[String], consumed: &mut [bool], extraction: &mut Extraction) {
    let mut side: Option<TargetSide> = None;
    let mut index = 0;
    while index < tokens.len() {
        if consumed[index] {
            index += 1;
            continue;
        }
        let token = tokens[index].as_str();
        if ADD_VERBS.contains(&token) {
            side = Some(TargetSide::Add);
            index += 1;
            continue;
        }
        if REMOVE_VERBS.contains(&token) {
            side = Some(TargetSide::Remove);
            index += 1;
            continue;
        }

        let (Some(active_side), Some(item_id)) = (side, parse_item_id(token)) else {
            index += 1;
            continue;
        };

        let (quantity, marker_len) = parse_quantity_marker(tokens, consumed, index + 1);
        let targets = match active_side {
            TargetSide::Add => &mut extraction.add_targets,
            TargetSide::Remove => &mut extraction.remove_targets,
        };
        push_target(targets, item_id, quantity);
        index += 1 + marker_len;
    }
}

fn parse_item_id(token: &str) -> Option<MenuItemId> {
    let digits = token.strip_prefix('#').unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(MenuItemId)
}

/// Returns (quantity, tokens consumed by the marker). Default quantity is 1.
fn parse_quantity_marker(tokens: &[String], consumed: &[bool], index: usize) -> (u32, usize) {
    let Some(token) = tokens.get(index).filter(|_| !consumed[index]) else {
        return (1, 0);
    };

    if let Some(digits) = token.strip_prefix('x').or_else(|| token.strip_prefix("qty")) {
        if !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit()) {
            if let Ok(quantity) = digits.parse::<u32>() {
                return (quantity.max(1), 1);
            }
        }
    }

    if token == "x" || token == "qty" {
        if let Some(next) = tokens.get(index + 1).filter(|_| !consumed[index + 1]) {
            if let Ok(quantity) = next.parse::<u32>() {
                return (quantity.max(1), 2);
            }
        }
    }

    (1, 0)
}

fn push_target(targets: &mut Vec<ItemRef>, item_id: MenuItemId, quantity: u32) {
    if let Some(existing) = targets.iter_mut().find(|target| target.item_id == item_id) {
        existing.quantity = existing.quantity.saturating_add(quantity);
        return;
    }
    targets.push(ItemRef { item_id, quantity });
}

#[cfg(test)]
mod tests {
    use tably_core::domain::menu::MenuItemId;
    use tably_core::prefs::{Intent, ItemRef};

    use super::LexicalExtractor;

    fn targets(pairs: &[(i64, u32)]) -> Vec<ItemRef> {
        pairs
            .iter()
            .map(|(id, quantity)| ItemRef { item_id: MenuItemId(*id), quantity: *quantity })
            .collect()
    }

    #[test]
    fn bare_ids_after_order_verb_become_unit_targets() {
        let extraction = LexicalExtractor::default().extract("order 23 and 45");
        assert_eq!(extraction.add_targets, targets(&[(23, 1), (45, 1)]));
        assert!(extraction.intents.contains(&Intent::AddToCart));
    }

    #[test]
    fn qty_marker_sets_the_quantity() {
        let extraction = LexicalExtractor::default().extract("add 31 qty 3");
        assert_eq!(extraction.add_targets, targets(&[(31, 3)]));
    }

    #[test]
    fn price_phrase_numbers_are_never_item_ids() {
        let extraction = LexicalExtractor::default().extract("order under $12 ramen");
        assert!(extraction.add_targets.is_empty());
        assert_eq!(extraction.prefs.price_cap_minor, Some(1200));
        assert!(extraction.prefs.cuisines.contains("ramen"));
        assert!(!extraction.intents.contains(&Intent::AddToCart));
        assert!(extraction.intents.contains(&Intent::Discover));
    }

    #[test]
    fn hash_prefix_and_attached_quantity_marker_parse() {
        let extraction = LexicalExtractor::default().extract("buy #12, 19 x2");
        assert_eq!(extraction.add_targets, targets(&[(12, 1), (19, 2)]));
    }

    #[test]
    fn duplicate_ids_sum_quantities_in_first_seen_order() {
        let extraction = LexicalExtractor::default().extract("order 7, 9 and 7 x2");
        assert_eq!(extraction.add_targets, targets(&[(7, 3), (9, 1)]));
    }

    #[test]
    fn remove_verb_collects_remove_targets() {
        let extraction = LexicalExtractor::default().extract("remove 4 please");
        assert_eq!(extraction.remove_targets, targets(&[(4, 1)]));
        assert!(extraction.intents.contains(&Intent::RemoveFromCart));
        assert!(extraction.add_targets.is_empty());
    }

    #[test]
    fn facets_match_anywhere_without_ordering() {
        let extraction = LexicalExtractor::default().extract("something spicy and vegan, no peanuts");
        assert!(extraction.prefs.features.contains("spicy"));
        assert!(extraction.prefs.diets.contains("vegan"));
        assert!(extraction.prefs.allergens_to_exclude.contains("peanut"));
    }

    #[test]
    fn first_price_phrase_wins() {
        let extraction = LexicalExtractor::default().extract("under $10 or below $20");
        assert_eq!(extraction.prefs.price_cap_minor, Some(1000));
    }

    #[test]
    fn fractional_price_caps_keep_cents() {
        let extraction = LexicalExtractor::default().extract("less than $12.50");
        assert_eq!(extraction.prefs.price_cap_minor, Some(1250));
    }

    #[test]
    fn checkout_and_show_cart_cues_fire() {
        let extractor = LexicalExtractor::default();
        assert!(extractor.extract("checkout please").intents.contains(&Intent::Checkout));
        assert!(extractor.extract("show my cart").intents.contains(&Intent::ShowCart));
        assert_eq!(extractor.extract("checkout").primary_intent(), Intent::Checkout);
    }

    #[test]
    fn order_verb_without_target_is_discovery_not_an_error() {
        let extraction = LexicalExtractor::default().extract("i'd like to order something");
        assert!(extraction.add_targets.is_empty());
        assert_eq!(extraction.primary_intent(), Intent::Discover);
    }

    #[test]
    fn extraction_is_deterministic() {
        let extractor = LexicalExtractor::default();
        let message = "order 23 and 45 spicy vegan under $12";
        assert_eq!(extractor.extract(message), extractor.extract(message));
    }
}
