//! Stable per-recipe color assignment.
//!
//! A recipe keeps its color for as long as it stays on the line. When a
//! recipe is unassigned its palette index returns to the free pool and is
//! the first candidate handed to the next new recipe, so the chart legend
//! never reshuffles under the operator's eyes.

use std::collections::HashMap;

/// Cycling palette for per-recipe series.
pub const PALETTE: [&str; 10] = [
    "#4e79a7", "#f28e2b", "#59a14f", "#e15759", "#76b7b2", "#edc948", "#b07aa1", "#ff9da7",
    "#9c755f", "#bab0ac",
];

/// Reserved for the cross-recipe "Total" series, outside the cycling palette.
pub const TOTAL_COLOR: &str = "#222222";

#[derive(Debug, Clone, PartialEq)]
pub struct ColorMap {
    pub entities: HashMap<String, String>,
    /// Present only when at least one recipe is active.
    pub total: Option<String>,
}

/// Owned by the engine session; survives across fetch cycles so colors do
/// not flicker as recipes enter and leave the active set.
#[derive(Debug, Default)]
pub struct ColorAllocator {
    assigned: HashMap<String, usize>,
}

impl ColorAllocator {
    pub fn new() -> Self {
        Self { assigned: HashMap::new() }
    }

    /// Reconcile persisted assignments with the current active set and
    /// return the resulting color map. `active` order decides which new
    /// recipe gets the lowest freed index first.
    pub fn assign(&mut self, active: &[String]) -> ColorMap {
        self.assigned.retain(|recipe, _| active.iter().any(|a| a == recipe));

        for recipe in active {
            if self.assigned.contains_key(recipe) {
                continue;
            }
            let idx = self.lowest_free_index();
            self.assigned.insert(recipe.clone(), idx);
        }

        let entities = self
            .assigned
            .iter()
            .map(|(recipe, idx)| (recipe.clone(), PALETTE[idx % PALETTE.len()].to_string()))
            .collect();

        ColorMap {
            entities,
            total: if active.is_empty() { None } else { Some(TOTAL_COLOR.to_string()) },
        }
    }

    fn lowest_free_index(&self) -> usize {
        let mut idx = 0;
        while self.assigned.values().any(|&used| used == idx) {
            idx += 1;
        }
        idx
    }

    pub fn index_of(&self, recipe: &str) -> Option<usize> {
        self.assigned.get(recipe).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_stable_across_growth() {
        let mut alloc = ColorAllocator::new();
        let first = alloc.assign(&names(&["A", "B"]));
        let second = alloc.assign(&names(&["A", "B", "C"]));
        assert_eq!(first.entities["A"], second.entities["A"]);
        assert_eq!(first.entities["B"], second.entities["B"]);
        assert_eq!(alloc.index_of("C"), Some(2));
    }

    #[test]
    fn test_freed_index_reused_first() {
        let mut alloc = ColorAllocator::new();
        alloc.assign(&names(&["A", "B"]));
        alloc.assign(&names(&["A", "B", "C"]));
        // A leaves, freeing index 0
        alloc.assign(&names(&["B", "C"]));
        assert_eq!(alloc.index_of("A"), None);
        // D takes the freed index 0, not 3
        alloc.assign(&names(&["B", "C", "D"]));
        assert_eq!(alloc.index_of("D"), Some(0));
        assert_eq!(alloc.index_of("B"), Some(1));
        assert_eq!(alloc.index_of("C"), Some(2));
    }

    #[test]
    fn test_total_color_only_when_active() {
        let mut alloc = ColorAllocator::new();
        assert_eq!(alloc.assign(&[]).total, None);
        assert_eq!(alloc.assign(&names(&["A"])).total, Some(TOTAL_COLOR.to_string()));
    }

    #[test]
    fn test_no_shared_index_within_palette() {
        let mut alloc = ColorAllocator::new();
        let active: Vec<String> = (0..PALETTE.len()).map(|i| format!("R{}", i)).collect();
        let map = alloc.assign(&active);
        let mut colors: Vec<&String> = map.entities.values().collect();
        colors.sort();
        colors.dedup();
        assert_eq!(colors.len(), PALETTE.len());
    }

    #[test]
    fn test_overflow_wraps_palette() {
        let mut alloc = ColorAllocator::new();
        let active: Vec<String> = (0..PALETTE.len() + 1).map(|i| format!("R{}", i)).collect();
        let map = alloc.assign(&active);
        // index 10 wraps to palette slot 0
        assert_eq!(map.entities[&format!("R{}", PALETTE.len())], PALETTE[0]);
    }
}
