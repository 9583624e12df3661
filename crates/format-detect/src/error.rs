use std::{fmt, io, path::Path, time::Duration};

use thiserror::Error;

use super::identity::FormatIdentity;

/// Problems with a format node, reported either when it is registered or, for parent related
/// issues, the first time the registry's children index is built.
#[derive(Debug, Error)]
pub enum RegistrationError {
	#[error("format <id='{0}'> is already registered")]
	DuplicateIdentity(FormatIdentity),
	#[error("format <id='{identity}'> has an invalid priority: {value}")]
	InvalidPriority {
		identity: FormatIdentity,
		value: String,
	},
	#[error("format identities must not be empty")]
	InvalidIdentity,
	#[error("format <id='{identity}'> declares parent <id='{parent}'> which was never registered")]
	DanglingParent {
		identity: FormatIdentity,
		parent: FormatIdentity,
	},
	#[error("format <id='{identity}'> can't be reached from any root, its ancestry forms a cycle")]
	ParentCycle { identity: FormatIdentity },
}

/// File I/O error that includes the path that caused the error
#[derive(Error, Debug)]
pub struct FileIOError {
	pub path: Box<Path>,
	#[source]
	pub source: io::Error,
	pub maybe_context: Option<&'static str>,
}

impl fmt::Display for FileIOError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"file I/O error{}: {}; path: '{}'",
			self.maybe_context
				.map(|ctx| format!(" ({ctx})"))
				.unwrap_or_default(),
			self.source,
			self.path.display()
		)
	}
}

impl FileIOError {
	pub fn from_std_io_err(path: impl AsRef<Path>, source: io::Error) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: None,
		}
	}

	pub fn from_std_io_err_with_msg(
		path: impl AsRef<Path>,
		source: io::Error,
		msg: &'static str,
	) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: Some(msg),
		}
	}
}

/// Failures while pulling bytes out of a [`ByteSource`](crate::ByteSource).
#[derive(Debug, Error)]
pub enum SourceError {
	#[error("byte fetch was cancelled")]
	Cancelled,
	#[error("byte fetch timed out after {0:?}")]
	TimedOut(Duration),
	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error("byte source failed: {0}")]
	Other(String),
}

impl SourceError {
	/// Cancellations and timeouts mean the bytes were never seen, which must not be confused
	/// with a genuine non-match.
	#[must_use]
	pub const fn is_interruption(&self) -> bool {
		matches!(self, Self::Cancelled | Self::TimedOut(_))
	}
}

/// Error returned by a [`Detector`](crate::Detector). The resolver never propagates it: faults
/// count as a non-match for the offending node.
#[derive(Debug, Error)]
pub enum DetectorError {
	#[error(transparent)]
	Source(#[from] SourceError),
	#[error("detector fault: {0}")]
	Fault(String),
}

#[derive(Debug, Error)]
pub enum ResolveError {
	#[error("no formats are registered, register formats before resolving")]
	EmptyRegistry,
}

#[derive(Debug, Error)]
pub enum MagicPatternError {
	#[error("invalid range in magic pattern: '{0}'")]
	InvalidRange(String),
	#[error("invalid hex in magic pattern: '{0}'")]
	InvalidHex(String),
	#[error("magic patterns must have at least one byte")]
	Empty,
}

#[derive(Debug, Error)]
pub enum DefinitionError {
	#[error("invalid regex for format <id='{identity}'>: {source}")]
	Regex {
		identity: String,
		#[source]
		source: regex::Error,
	},
	#[error("invalid magic pattern for format <id='{identity}'>: {source}")]
	Magic {
		identity: String,
		#[source]
		source: MagicPatternError,
	},
	#[error("format <id='{0}'> has an empty entry list")]
	NoEntries(String),
	#[error(transparent)]
	Registration(#[from] RegistrationError),
	#[error("failed to parse format definitions: {0}")]
	Toml(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error("failed to parse config file: {0}")]
	Toml(#[from] toml::de::Error),
	#[error("invalid detection config: {0}")]
	Invalid(&'static str),
}
