/// Shared data structures for the catalog
///
/// These structs represent the rows that flow between
/// the database layer and the command-line front end.

/// Represents a single row of the `images` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Full path to the image file, exactly as stored
    pub filepath: String,
    /// Line-finder output for this image (None until something records it)
    pub result: Option<String>,
}

/// Outcome of rebuilding the catalog from a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitReport {
    /// Number of image rows written in the committed batch
    pub image_count: usize,
}

impl InitReport {
    /// True when the folder held no supported images
    pub fn is_empty(&self) -> bool {
        self.image_count == 0
    }
}
