use crate::store::{sort_by_recency, NoteSummary};

/// The ordered note list shown in the sidebar plus the selected note.
#[derive(Debug, Clone, Default)]
pub struct NoteList {
    items: Vec<NoteSummary>,
    selected: Option<String>,
}

impl NoteList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a fresh listing. The selection survives if the note still exists,
    /// otherwise the most recent note is selected.
    pub fn replace(&mut self, mut summaries: Vec<NoteSummary>) {
        sort_by_recency(&mut summaries);
        self.items = summaries;

        let still_present = self
            .selected
            .as_deref()
            .map(|id| self.contains(id))
            .unwrap_or(false);
        if !still_present {
            self.selected = self.items.first().map(|s| s.id.clone());
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.selected = None;
    }

    /// A created or freshly written note is now the most recent one.
    pub fn upsert_to_front(&mut self, summary: NoteSummary) {
        self.items.retain(|s| s.id != summary.id);
        self.items.insert(0, summary);
    }

    /// Fold in refreshed summaries (e.g. notes changed on disk by another
    /// process) and restore recency order.
    pub fn merge(&mut self, summaries: Vec<NoteSummary>) {
        for summary in summaries {
            match self.items.iter_mut().find(|s| s.id == summary.id) {
                Some(existing) => *existing = summary,
                None => self.items.push(summary),
            }
        }
        sort_by_recency(&mut self.items);
        if self.selected.is_none() {
            self.selected = self.items.first().map(|s| s.id.clone());
        }
    }

    /// Drop a note. If it was selected the new head (or nothing) is selected.
    /// Returns whether an entry was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|s| s.id != id);
        let removed = self.items.len() != before;

        if self.selected.as_deref() == Some(id) {
            self.selected = self.items.first().map(|s| s.id.clone());
        }
        removed
    }

    /// Select a listed note. Unknown ids leave the selection untouched.
    pub fn select(&mut self, id: &str) -> bool {
        if self.contains(id) {
            self.selected = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_summary(&self) -> Option<&NoteSummary> {
        self.selected.as_deref().and_then(|id| self.get(id))
    }

    pub fn get(&self, id: &str) -> Option<&NoteSummary> {
        self.items.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn items(&self) -> &[NoteSummary] {
        &self.items
    }

    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|s| s.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
