use std::collections::BTreeSet;

use shared::domain::IncidenceId;

/// Selected incidence ids, always a subset of the rows currently loaded.
#[derive(Debug, Clone, Default)]
pub struct SelectionController {
    visible: Vec<IncidenceId>,
    selected: BTreeSet<IncidenceId>,
}

impl SelectionController {
    /// Replaces the loaded rows and drops selected ids that are no longer shown.
    pub fn set_visible(&mut self, visible: Vec<IncidenceId>) {
        self.selected.retain(|id| visible.contains(id));
        self.visible = visible;
    }

    /// Selects every loaded id. Counts from the server never enter into it.
    pub fn select_all(&mut self, visible: &[IncidenceId]) {
        self.selected = visible
            .iter()
            .filter(|id| self.visible.contains(*id))
            .copied()
            .collect();
    }

    /// Returns whether `id` is selected afterwards. Ids that are not loaded are ignored.
    pub fn toggle_one(&mut self, id: IncidenceId) -> bool {
        if !self.visible.contains(&id) {
            return false;
        }
        if !self.selected.remove(&id) {
            self.selected.insert(id);
        }
        self.selected.contains(&id)
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn is_all_selected(&self) -> bool {
        !self.visible.is_empty() && self.visible.iter().all(|id| self.selected.contains(id))
    }

    pub fn selected_ids(&self) -> Vec<IncidenceId> {
        self.selected.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn visible(&self) -> &[IncidenceId] {
        &self.visible
    }
}
