use serde::Serialize;

/// One self-contained unit of rendered output. The chat layer wraps blocks
/// into message payloads and splits at the message level when a report
/// exceeds the surface's size limits; the engine never concatenates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum ReportBlock {
    /// A short label or metadata line.
    Label(String),
    /// A preformatted fixed-width table, already fenced for the surface.
    Table(String),
}

impl ReportBlock {
    pub fn text(&self) -> &str {
        match self {
            ReportBlock::Label(text) | ReportBlock::Table(text) => text,
        }
    }
}
