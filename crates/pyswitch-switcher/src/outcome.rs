/// Result of a phase that did not fail fatally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PhaseOutcome {
    #[default]
    Completed,
    Warned(Vec<String>),
}

impl PhaseOutcome {
    pub fn from_warnings(warnings: Vec<String>) -> Self {
        if warnings.is_empty() {
            Self::Completed
        } else {
            Self::Warned(warnings)
        }
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            Self::Completed => &[],
            Self::Warned(warnings) => warnings,
        }
    }
}
