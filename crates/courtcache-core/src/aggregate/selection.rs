use std::collections::HashSet;

use super::group::PredictionGroup;

/// Set of selected display keys.
///
/// Prediction groups are selected by base date, model performance rows by
/// their raw cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    keys: HashSet<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self, key: &str) {
        if !self.keys.remove(key) {
            self.keys.insert(key.to_string());
        }
    }

    /// Select everything displayed, unless everything already is, in which
    /// case clear. Compares sizes only.
    pub fn toggle_all<'a>(&mut self, displayed: impl IntoIterator<Item = &'a str>) {
        let displayed: Vec<&str> = displayed.into_iter().collect();
        if self.keys.len() == displayed.len() {
            self.keys.clear();
        } else {
            self.keys = displayed.into_iter().map(str::to_string).collect();
        }
    }

    pub fn is_all_selected(&self, displayed_count: usize) -> bool {
        displayed_count > 0 && self.keys.len() == displayed_count
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

/// Every raw store key behind the selected groups.
pub fn selected_original_keys(groups: &[PredictionGroup], selection: &Selection) -> Vec<String> {
    groups
        .iter()
        .filter(|g| selection.contains(&g.base_date))
        .flat_map(|g| g.original_keys.iter().cloned())
        .collect()
}
