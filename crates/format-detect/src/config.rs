//! Detection configuration

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{
	definitions::FormatDefinition,
	error::{ConfigError, FileIOError},
};

/// Tuning knobs for a [`Resolver`](crate::Resolver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
	/// Bytes fetched up front with `peek`
	pub sniff_window: usize,

	/// Upper bound on how many bytes detectors may pull in total
	pub max_read: usize,

	/// Minimum size of each follow-up read
	pub read_chunk: usize,

	/// Overall deadline for a single resolution, in milliseconds
	pub timeout_ms: Option<u64>,

	/// Evaluate sibling detectors concurrently instead of one after the other
	pub concurrent_siblings: bool,
}

impl Default for DetectorConfig {
	fn default() -> Self {
		Self {
			sniff_window: 16 * 1024,
			max_read: 8 * 1024 * 1024,
			read_chunk: 64 * 1024,
			timeout_ms: None,
			concurrent_siblings: true,
		}
	}
}

impl DetectorConfig {
	#[must_use]
	pub fn timeout(&self) -> Option<Duration> {
		self.timeout_ms.map(Duration::from_millis)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.sniff_window == 0 {
			return Err(ConfigError::Invalid("sniff_window must be greater than zero"));
		}

		if self.read_chunk == 0 {
			return Err(ConfigError::Invalid("read_chunk must be greater than zero"));
		}

		if self.max_read < self.sniff_window {
			return Err(ConfigError::Invalid(
				"max_read must be at least as large as sniff_window",
			));
		}

		Ok(())
	}

	/// Clamps whatever [`DetectorConfig::validate`] would reject into something usable, so a
	/// hand built config can't stall detection.
	#[must_use]
	pub fn sanitized(mut self) -> Self {
		if let Err(e) = self.validate() {
			warn!(%e, "Adjusting detection config");
		}

		self.sniff_window = self.sniff_window.max(1);
		self.read_chunk = self.read_chunk.max(1);
		self.max_read = self.max_read.max(self.sniff_window);

		self
	}
}

/// On disk configuration: detection settings plus extra `[[format]]` definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
	#[serde(default)]
	pub detection: DetectorConfig,

	#[serde(default, rename = "format")]
	pub formats: Vec<FormatDefinition>,
}

impl ConfigFile {
	pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		info!("Loading detection config from {}", path.display());

		let raw = fs::read_to_string(path).map_err(|e| FileIOError::from_std_io_err(path, e))?;

		Self::from_toml_str(&raw)
	}

	pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
		let config = toml::from_str::<Self>(raw)?;
		config.detection.validate()?;

		Ok(config)
	}
}
