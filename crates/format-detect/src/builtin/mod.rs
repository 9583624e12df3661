//! Detectors shipped with the engine. XML and zip sniffing are the two roots most formats hang
//! off; magic bytes and JSON cover the rest of the built-in catalogue.

pub mod json;
pub mod magic;
pub mod xml;
pub mod zip;

pub use self::json::{JsonContentDetector, JsonRootDetector};
pub use self::magic::{MagicByte, MagicBytePattern, MagicDetector};
pub use self::xml::{XmlDialectDetector, XmlHead, XmlRoot, XmlRootDetector};
pub use self::zip::{zip_root_detector, ZipEntriesDetector, ZipListing};
