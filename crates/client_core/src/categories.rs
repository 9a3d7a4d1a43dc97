use shared::protocol::CategoryPayload;

use crate::error::WorkflowError;

/// One entry of the editable category list.
///
/// Identity is purely positional: after any insertion or deletion every
/// index is renumbered contiguously from zero, so an index captured before
/// a structural mutation must be re-resolved afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryEntry {
    title: String,
    description: String,
    editing: bool,
}

impl CategoryEntry {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    fn is_blank(&self) -> bool {
        self.title.is_empty() && self.description.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The entry had never been saved and was removed from the list.
    Removed,
    /// The entry returned to display mode with its last-saved values.
    Reverted,
}

/// Ordered, mutable collection of `{title, description}` records with
/// add/edit/save/cancel/delete semantics. Multiple entries may be mid-edit
/// at the same time; each entry's mode is independent.
#[derive(Debug, Clone, Default)]
pub struct CategoryListEditor {
    entries: Vec<CategoryEntry>,
}

impl CategoryListEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the collection wholesale; every entry starts in display mode.
    pub fn load(&mut self, categories: Vec<CategoryPayload>) {
        self.entries = categories
            .into_iter()
            .map(|cat| CategoryEntry {
                title: cat.title,
                description: cat.description,
                editing: false,
            })
            .collect();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CategoryEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[CategoryEntry] {
        &self.entries
    }

    /// Current saved values, in order, for transmission to the backend.
    pub fn payloads(&self) -> Vec<CategoryPayload> {
        self.entries
            .iter()
            .map(|entry| CategoryPayload {
                title: entry.title.clone(),
                description: entry.description.clone(),
            })
            .collect()
    }

    pub fn begin_edit(&mut self, index: usize) -> Result<(), WorkflowError> {
        self.entry_mut(index)?.editing = true;
        Ok(())
    }

    /// Validates and applies new values to the entry at `index`, returning
    /// it to display mode. Both fields are trimmed; an empty field or a
    /// case-insensitive title collision with any *other* entry rejects the
    /// save and leaves the collection unchanged.
    pub fn save(
        &mut self,
        index: usize,
        title: &str,
        description: &str,
    ) -> Result<(), WorkflowError> {
        self.entry_mut(index)?;

        let title = title.trim();
        let description = description.trim();
        if title.is_empty() {
            return Err(WorkflowError::validation("category title must not be empty"));
        }
        if description.is_empty() {
            return Err(WorkflowError::validation(
                "category description must not be empty",
            ));
        }

        let lowered = title.to_lowercase();
        let collision = self
            .entries
            .iter()
            .enumerate()
            .any(|(i, entry)| i != index && entry.title.to_lowercase() == lowered);
        if collision {
            return Err(WorkflowError::validation(format!(
                "a category titled '{title}' already exists"
            )));
        }

        let entry = &mut self.entries[index];
        entry.title = title.to_string();
        entry.description = description.to_string();
        entry.editing = false;
        Ok(())
    }

    /// Abandons an edit. A never-saved blank entry is removed outright
    /// (shifting all subsequent indices down by one); anything else simply
    /// returns to display mode with its last-saved values intact.
    pub fn cancel(&mut self, index: usize) -> Result<CancelOutcome, WorkflowError> {
        let entry = self.entry_mut(index)?;
        if entry.is_blank() {
            self.entries.remove(index);
            Ok(CancelOutcome::Removed)
        } else {
            entry.editing = false;
            Ok(CancelOutcome::Reverted)
        }
    }

    /// Appends a blank entry in edit mode and returns its index.
    pub fn add(&mut self) -> usize {
        self.entries.push(CategoryEntry {
            title: String::new(),
            description: String::new(),
            editing: true,
        });
        self.entries.len() - 1
    }

    /// Removes the entry at `index`. At least one category must always
    /// exist, so deleting the sole remaining entry is refused. Callers are
    /// expected to have obtained explicit user confirmation first.
    pub fn delete(&mut self, index: usize) -> Result<(), WorkflowError> {
        self.entry_mut(index)?;
        if self.entries.len() == 1 {
            return Err(WorkflowError::invariant(
                "at least one category must remain; the last category cannot be deleted",
            ));
        }
        self.entries.remove(index);
        Ok(())
    }

    fn entry_mut(&mut self, index: usize) -> Result<&mut CategoryEntry, WorkflowError> {
        let len = self.entries.len();
        self.entries.get_mut(index).ok_or_else(|| {
            WorkflowError::invariant(format!(
                "category index {index} out of range (list has {len} entries)"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(title: &str, description: &str) -> CategoryPayload {
        CategoryPayload {
            title: title.to_string(),
            description: description.to_string(),
        }
    }

    fn editor_with(titles: &[&str]) -> CategoryListEditor {
        let mut editor = CategoryListEditor::new();
        editor.load(
            titles
                .iter()
                .map(|t| payload(t, &format!("{t} description")))
                .collect(),
        );
        editor
    }

    #[test]
    fn load_replaces_wholesale_in_display_mode() {
        let mut editor = editor_with(&["Billing", "Support"]);
        editor.begin_edit(0).unwrap();
        editor.load(vec![payload("Access", "access issues")]);
        assert_eq!(editor.len(), 1);
        assert_eq!(editor.get(0).unwrap().title(), "Access");
        assert!(!editor.get(0).unwrap().is_editing());
    }

    #[test]
    fn save_trims_whitespace() {
        let mut editor = editor_with(&["Billing"]);
        editor.begin_edit(0).unwrap();
        editor.save(0, "  Payments ", " fees and refunds  ").unwrap();
        let entry = editor.get(0).unwrap();
        assert_eq!(entry.title(), "Payments");
        assert_eq!(entry.description(), "fees and refunds");
        assert!(!entry.is_editing());
    }

    #[test]
    fn save_rejects_empty_fields_and_leaves_collection_unchanged() {
        let mut editor = editor_with(&["Billing"]);
        let before = editor.payloads();

        assert!(matches!(
            editor.save(0, "   ", "desc"),
            Err(WorkflowError::Validation(_))
        ));
        assert!(matches!(
            editor.save(0, "Title", "\t"),
            Err(WorkflowError::Validation(_))
        ));
        assert_eq!(editor.payloads(), before);
    }

    #[test]
    fn save_rejects_case_insensitive_duplicate_title_at_other_index() {
        let mut editor = editor_with(&["Billing", "Support"]);
        let err = editor.save(1, "  bIlLiNg ", "still support").unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(editor.get(1).unwrap().title(), "Support");
    }

    #[test]
    fn save_allows_same_title_at_same_index() {
        let mut editor = editor_with(&["Billing", "Support"]);
        editor.save(0, "BILLING", "charged twice").unwrap();
        assert_eq!(editor.get(0).unwrap().title(), "BILLING");
    }

    #[test]
    fn add_then_cancel_restores_prior_collection() {
        let mut editor = editor_with(&["Billing", "Support"]);
        let before = editor.payloads();

        let index = editor.add();
        assert_eq!(index, 2);
        assert!(editor.get(index).unwrap().is_editing());

        assert_eq!(editor.cancel(index).unwrap(), CancelOutcome::Removed);
        assert_eq!(editor.len(), 2);
        assert_eq!(editor.payloads(), before);
    }

    #[test]
    fn cancel_on_saved_entry_reverts_to_display_mode() {
        let mut editor = editor_with(&["Billing"]);
        editor.begin_edit(0).unwrap();
        assert_eq!(editor.cancel(0).unwrap(), CancelOutcome::Reverted);
        let entry = editor.get(0).unwrap();
        assert_eq!(entry.title(), "Billing");
        assert!(!entry.is_editing());
    }

    #[test]
    fn delete_refuses_last_remaining_category() {
        let mut editor = editor_with(&["Billing"]);
        let err = editor.delete(0).unwrap_err();
        assert!(matches!(err, WorkflowError::InvariantViolation(_)));
        assert_eq!(editor.len(), 1);
    }

    #[test]
    fn delete_renumbers_contiguously() {
        let mut editor = editor_with(&["A", "B", "C", "D"]);
        editor.delete(1).unwrap();
        assert_eq!(editor.len(), 3);
        let titles: Vec<&str> = editor.entries().iter().map(|e| e.title()).collect();
        assert_eq!(titles, ["A", "C", "D"]);
        // Indices 0..len are all resolvable, with no gaps.
        for i in 0..editor.len() {
            assert!(editor.get(i).is_some());
        }
        assert!(editor.get(3).is_none());
    }

    #[test]
    fn operations_on_stale_indices_are_refused() {
        let mut editor = editor_with(&["A", "B"]);
        editor.delete(0).unwrap();
        // Index 1 referred to "B" before the delete; it no longer resolves.
        assert!(matches!(
            editor.begin_edit(1),
            Err(WorkflowError::InvariantViolation(_))
        ));
    }

    #[test]
    fn multiple_entries_may_be_mid_edit() {
        let mut editor = editor_with(&["A", "B"]);
        editor.begin_edit(0).unwrap();
        editor.begin_edit(1).unwrap();
        assert!(editor.get(0).unwrap().is_editing());
        assert!(editor.get(1).unwrap().is_editing());
    }
}
