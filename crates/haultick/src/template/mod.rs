pub mod loader;
pub mod schema;

pub use loader::{load_catalog, load_catalog_from_str};
pub use schema::{
    CatalogFile, ExtractMethod, FallbackMethod, FieldRule, LogoRef, Roi, VendorTemplate,
};
