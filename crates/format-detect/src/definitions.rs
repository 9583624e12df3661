//! Declarative format definitions, so formats can be added from a config file instead of code.
//!
//! ```toml
//! [[format]]
//! id = "application/xml; subtype=CSW"
//! parent = "application/xml"
//! priority = 5
//! detector = { kind = "xml-dialect", tag = "^Capabilities$", namespace = "(?i)opengis\\.net/cat/csw" }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
	builtin::{
		zip_root_detector, JsonContentDetector, JsonRootDetector, MagicBytePattern, MagicDetector,
		XmlDialectDetector, XmlRootDetector, ZipEntriesDetector,
	},
	detector::Detector,
	error::{DefinitionError, RegistrationError},
	identity::FormatIdentity,
	registry::{FormatNode, Priority, Registry},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDefinition {
	pub id: String,

	#[serde(default)]
	pub parent: Option<String>,

	/// Kept as a float so malformed values can be reported instead of failing the whole file
	#[serde(default)]
	pub priority: f64,

	pub detector: DetectorDefinition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DetectorDefinition {
	XmlRoot,
	XmlDialect {
		tag: String,
		#[serde(default)]
		namespace: Option<String>,
	},
	ZipRoot,
	ZipEntries {
		entries: Vec<String>,
	},
	Magic {
		patterns: Vec<MagicDefinition>,
	},
	JsonRoot,
	JsonContent {
		pattern: String,
	},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicDefinition {
	/// Hex bytes, `??` for wildcards and `lo-hi` for ranges
	pub bytes: String,

	#[serde(default)]
	pub offset: usize,
}

#[derive(Debug, Default, Deserialize)]
struct DefinitionFile {
	#[serde(default, rename = "format")]
	formats: Vec<FormatDefinition>,
}

impl FormatDefinition {
	pub fn into_node(self) -> Result<FormatNode, DefinitionError> {
		let identity = FormatIdentity::from(self.id.as_str());
		let priority = Priority::try_from(self.priority).map_err(|value| {
			RegistrationError::InvalidPriority {
				identity: identity.clone(),
				value: value.to_string(),
			}
		})?;

		let regex_err = |source| DefinitionError::Regex {
			identity: self.id.clone(),
			source,
		};

		let detector: Arc<dyn Detector> = match self.detector {
			DetectorDefinition::XmlRoot => Arc::new(XmlRootDetector),
			DetectorDefinition::XmlDialect { tag, namespace } => Arc::new(
				XmlDialectDetector::new(&tag, namespace.as_deref()).map_err(regex_err)?,
			),
			DetectorDefinition::ZipRoot => Arc::new(zip_root_detector()),
			DetectorDefinition::ZipEntries { entries } => {
				if entries.is_empty() {
					return Err(DefinitionError::NoEntries(self.id.clone()));
				}
				Arc::new(
					ZipEntriesDetector::new(entries.iter().map(String::as_str))
						.map_err(regex_err)?,
				)
			}
			DetectorDefinition::Magic { patterns } => Arc::new(MagicDetector::new(
				patterns
					.iter()
					.map(|pattern| {
						MagicBytePattern::from_hex_string(&pattern.bytes, pattern.offset)
					})
					.collect::<Result<_, _>>()
					.map_err(|source| DefinitionError::Magic {
						identity: self.id.clone(),
						source,
					})?,
			)),
			DetectorDefinition::JsonRoot => Arc::new(JsonRootDetector),
			DetectorDefinition::JsonContent { pattern } => {
				Arc::new(JsonContentDetector::new(&pattern).map_err(regex_err)?)
			}
		};

		let node = FormatNode::from_arc(identity, detector).with_priority(priority);

		Ok(match self.parent {
			Some(parent) => node.with_parent(parent),
			None => node,
		})
	}
}

/// Parses the `[[format]]` tables of a TOML document.
pub fn parse_definitions(raw: &str) -> Result<Vec<FormatDefinition>, DefinitionError> {
	toml::from_str::<DefinitionFile>(raw)
		.map(|file| file.formats)
		.map_err(Into::into)
}

/// Registers every definition in order, stopping at the first failure. Returns how many were
/// registered.
pub fn register_definitions(
	registry: &mut Registry,
	definitions: impl IntoIterator<Item = FormatDefinition>,
) -> Result<usize, DefinitionError> {
	let mut count = 0;

	for definition in definitions {
		debug!(id = %definition.id, "Registering format from definition");
		registry.register(definition.into_node()?)?;
		count += 1;
	}

	Ok(count)
}
