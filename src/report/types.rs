/// Emphasis for a report line; drives terminal color only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tone {
    #[default]
    Normal,
    Good,
    Warn,
    Bad,
}

/// A single line within a section.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Main text, e.g. "#123 Router loses query parameters"
    pub text: String,
    /// Secondary text shown after the main text (if applicable)
    pub detail: Option<String>,
    pub tone: Tone,
}

impl Item {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            detail: None,
            tone: Tone::Normal,
        }
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn tone(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub heading: String,
    pub items: Vec<Item>,
}

impl Section {
    pub fn new(heading: impl Into<String>, items: Vec<Item>) -> Self {
        Self {
            heading: heading.into(),
            items,
        }
    }
}

/// Rendered view over the record store, printable to terminal or markdown.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub title: String,
    /// Key/value lines shown under the title
    pub summary: Vec<(String, String)>,
    pub sections: Vec<Section>,
}

/// Which store view `report` renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportKind {
    Progress,
    Labels,
    Unlabeled,
    GoodFirst,
    Triage,
}
