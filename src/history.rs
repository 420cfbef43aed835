use crate::analysis::AnalysisResult;
use crate::error::OrchestratorError;

/// Every result produced in the session, newest batch first. Grows only;
/// nothing is ever removed.
#[derive(Debug, Clone, Default)]
pub struct ResultHistory {
    items: Vec<AnalysisResult>,
    selected_index: usize,
    latest_batch_len: usize,
}

impl ResultHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[AnalysisResult] {
        &self.items
    }

    /// The block added by the most recent non-empty batch, in input order.
    pub fn latest_batch(&self) -> &[AnalysisResult] {
        &self.items[..self.latest_batch_len]
    }

    /// `None` while the history is empty.
    pub fn selected_index(&self) -> Option<usize> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.selected_index)
        }
    }

    pub fn selected(&self) -> Option<&AnalysisResult> {
        self.items.get(self.selected_index)
    }

    /// Prepends the batch as one block, keeping its internal order, and
    /// selects the newest entry. An empty batch changes nothing.
    pub fn append_batch(&mut self, results: Vec<AnalysisResult>) {
        if results.is_empty() {
            return;
        }
        self.latest_batch_len = results.len();
        self.items.splice(0..0, results);
        self.selected_index = 0;
    }

    pub fn select(&mut self, index: usize) -> Result<&AnalysisResult, OrchestratorError> {
        if index >= self.items.len() {
            return Err(OrchestratorError::SelectionOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        self.selected_index = index;
        Ok(&self.items[index])
    }
}
