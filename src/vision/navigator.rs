use super::record::{normalize_id, same_id};

/// Browser-style focus history: pushing from the middle drops the forward
/// branch, and traversal never records new entries.
#[derive(Clone, Debug, Default)]
pub struct Navigator {
    entries: Vec<String>,
    index: Option<usize>,
}

impl Navigator {
    /// Records `id` as the newest entry. The forward branch is always dropped;
    /// re-focusing the entry that is then the tail is not a new step. Returns
    /// whether history changed.
    pub fn push(&mut self, id: &str) -> bool {
        let keep = self.index.map_or(0, |index| index + 1);
        let truncated = keep < self.entries.len();
        self.entries.truncate(keep);
        if self.entries.last().is_some_and(|tail| same_id(tail, id)) {
            return truncated;
        }

        self.entries.push(normalize_id(id));
        self.index = Some(self.entries.len() - 1);
        true
    }

    pub fn back(&mut self) -> Option<&str> {
        let index = self.index.filter(|index| *index > 0)?;
        self.index = Some(index - 1);
        self.current()
    }

    pub fn forward(&mut self) -> Option<&str> {
        let index = self.index.filter(|index| index + 1 < self.entries.len())?;
        self.index = Some(index + 1);
        self.current()
    }

    pub fn current(&self) -> Option<&str> {
        self.entries.get(self.index?).map(String::as_str)
    }

    pub fn can_go_back(&self) -> bool {
        self.index.is_some_and(|index| index > 0)
    }

    pub fn can_go_forward(&self) -> bool {
        self.index
            .is_some_and(|index| index + 1 < self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index = None;
    }
}
