/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub presented: usize,
    pub graded: usize,
    pub failed: usize,
    pub remaining: usize,
    pub is_complete: bool,
}
