use std::collections::HashSet;
use std::hash::Hash;

/// Anything with a stable identity inside a displayed list
pub trait Identified {
    type Key: Eq + Hash + Clone;

    fn identity(&self) -> Self::Key;
}

/// Existing entries keep their order; new ones are appended in arrival
/// order unless their identity is already present.
pub fn merge_unique<T: Identified + Clone>(existing: &[T], incoming: Vec<T>) -> Vec<T> {
    let mut merged = existing.to_vec();
    append_unique(&mut merged, incoming);
    merged
}

/// In-place variant of [`merge_unique`]; returns how many entries were added
pub fn append_unique<T: Identified>(list: &mut Vec<T>, incoming: impl IntoIterator<Item = T>) -> usize {
    let mut seen: HashSet<T::Key> = list.iter().map(Identified::identity).collect();
    let before = list.len();
    for item in incoming {
        if seen.insert(item.identity()) {
            list.push(item);
        }
    }
    list.len() - before
}
