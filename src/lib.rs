//! Resolution of direct, browser-loadable URLs for bulk-data attributes of DICOMweb instance
//! metadata.
//!
//! A [`BulkDataUrlResolver`] turns an attribute like `PixelData` or `EncapsulatedDocument` into a
//! URL that can be handed to a video or PDF element: an explicit override, a `DirectRetrieveURL`,
//! an object URL for inline or retrieved binary content, or a WADO-RS URL built from the
//! `BulkDataURI`.
pub mod blob;
pub mod config;
pub mod metadata;
pub mod resolver;
pub mod retrieve;
pub mod types;

pub use blob::{Blob, BlobStore, ObjectUrlAllocator};
pub use config::{AppConfig, ResolverConfig, Singlepart};
pub use metadata::{AttributeValue, BulkDataValue, Instance};
pub use resolver::{BulkDataUrlResolver, DirectUrl, RequestParams, ResolveError};
pub use retrieve::{BulkDataRetriever, RetrieveError, RetrieveFn, RetrieveOptions};
