//! Package Extractor: unpacks the binary payload matching this host from each
//! package archive under the plugin root.

mod extractor;
mod target;

pub use extractor::{
    ExtractedPackage, ExtractionReport, PACKAGE_EXTENSION, PAYLOAD_ROOT, PackageExtractor,
    read_payload_groups,
};
pub use target::{HostRuntime, PayloadGroup, RUNTIME_IDENTIFIER, RuntimeTarget, RuntimeVersion};
