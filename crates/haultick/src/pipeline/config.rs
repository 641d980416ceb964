use std::path::PathBuf;

use crate::template::CatalogFile;

/// Fields whose confidences make up the aggregate page confidence. A page
/// that cannot read these reliably is not trustworthy overall.
pub const REQUIRED_FIELDS: [&str; 4] = ["ticket_number", "ticket_date", "job", "material"];

pub struct PipelineConfig {
    pub catalog: CatalogFile,
    /// Directory holding vendor logo templates, when logo matching is on.
    pub logo_dir: Option<PathBuf>,
    /// Aggregate confidence below this flags the whole page.
    pub min_page_confidence: f32,
}

impl PipelineConfig {
    pub fn new(catalog: CatalogFile) -> Self {
        Self {
            catalog,
            logo_dir: None,
            min_page_confidence: 0.60,
        }
    }

    pub fn with_logo_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.logo_dir = Some(dir.into());
        self
    }
}
