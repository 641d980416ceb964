pub mod fields;
pub mod logo;
pub mod normalize;
pub mod vendor;

pub use fields::{Extraction, FieldExtractor};
pub use normalize::SynonymTable;
pub use vendor::{DetectionKind, VendorDetector, VendorMatch};
