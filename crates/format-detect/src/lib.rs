//!
//! # Format Detection
//!
//! Spacedrive's format detection engine figures out what kind of content a file holds by looking
//! at its bytes, since extensions and content-type headers can't be trusted.
//!
//! Formats are registered as a forest: roots sniff a container (XML, zip, JSON, ...) and children
//! specialize it (GML, GPX, KMZ, ...). A child is only ever asked once its parent matched the same
//! bytes, and the resolver always returns the most specific match. Some niceties:
//! - Plugins register their formats independently, in any order, children before parents included;
//! - Siblings are ordered by priority, ties going to whoever registered first;
//! - Detectors are async and may ask the source for more bytes, the XML root element and the zip
//!   entry listing are parsed once per resolution and shared by every detector that needs them;
//! - Running out of bytes or time yields [`DetectionResult::Indeterminate`], never a guess;
//! - Faulty or panicking detectors only take themselves out of the running.
//!
//! ## Basic example
//!
//! ```
//! use sd_format_detect::{formats, DetectionResult, Registry, Resolver};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut registry = Registry::new();
//!     formats::register_builtin(&mut registry).unwrap();
//!
//!     let resolver = Resolver::new(registry);
//!
//!     let result = resolver
//!         .resolve_bytes(&b"<?xml version=\"1.0\"?><gpx version=\"1.1\"></gpx>"[..], None)
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(result, DetectionResult::Identity(formats::GPX.into()));
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod builtin;
pub mod formats;

mod config;
mod context;
mod definitions;
mod detector;
mod error;
mod identity;
mod registry;
mod resolver;
mod source;

pub use config::{ConfigFile, DetectorConfig};
pub use context::{SniffContext, Window};
pub use definitions::{
	parse_definitions, register_definitions, DetectorDefinition, FormatDefinition,
	MagicDefinition,
};
pub use detector::{from_fn, Detection, Detector, FnDetector};
pub use error::{
	ConfigError, DefinitionError, DetectorError, FileIOError, MagicPatternError,
	RegistrationError, ResolveError, SourceError,
};
pub use identity::FormatIdentity;
pub use registry::{FormatNode, Priority, Registry};
pub use resolver::{DetectionResult, Resolution, Resolver};
pub use source::{ByteSource, FileMetadata, FileSource, MemorySource, TimeoutSource};
