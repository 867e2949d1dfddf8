//! Result ordering. Clients depend on the emitted order, so the sort must be
//! total and deterministic: score descending, ties by case-insensitive text
//! ascending.

use elephant_core::Item;

/// Sort merged items and apply the global result cap. No deduplication;
/// identifiers are only unique per provider.
pub fn rank(mut items: Vec<Item>, cap: usize) -> Vec<Item> {
    items.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.text.to_lowercase().cmp(&b.text.to_lowercase()))
    });
    items.truncate(cap);
    items
}
