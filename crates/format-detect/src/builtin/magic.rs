//! Magic byte pattern matching

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
	context::SniffContext,
	detector::{Detection, Detector},
	error::{DetectorError, MagicPatternError},
};

/// A pattern of magic bytes expected at a fixed offset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicBytePattern {
	/// The byte pattern
	pub bytes: Vec<MagicByte>,

	/// Offset from start of file
	pub offset: usize,
}

/// A single byte in a magic pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MagicByte {
	/// Exact byte value
	Exact(u8),

	/// Any byte (wildcard)
	Any,

	/// Range of values
	Range { min: u8, max: u8 },
}

impl MagicBytePattern {
	/// Create a pattern from hex string (e.g., "50 4B ?? 03-04")
	pub fn from_hex_string(s: &str, offset: usize) -> Result<Self, MagicPatternError> {
		let bytes = s
			.split_whitespace()
			.map(|part| {
				if part == "??" || part == "?" {
					Ok(MagicByte::Any)
				} else if let Some((min, max)) = part.split_once('-') {
					let parse = |hex| {
						u8::from_str_radix(hex, 16)
							.map_err(|_| MagicPatternError::InvalidRange(part.to_string()))
					};
					let (min, max) = (parse(min)?, parse(max)?);
					if min > max {
						return Err(MagicPatternError::InvalidRange(part.to_string()));
					}
					Ok(MagicByte::Range { min, max })
				} else {
					u8::from_str_radix(part, 16)
						.map(MagicByte::Exact)
						.map_err(|_| MagicPatternError::InvalidHex(part.to_string()))
				}
			})
			.collect::<Result<Vec<_>, _>>()?;

		if bytes.is_empty() {
			return Err(MagicPatternError::Empty);
		}

		Ok(Self { bytes, offset })
	}

	/// Pattern of exact bytes at offset 0
	#[must_use]
	pub fn exact(bytes: &[u8]) -> Self {
		Self {
			bytes: bytes.iter().copied().map(MagicByte::Exact).collect(),
			offset: 0,
		}
	}

	/// Check if this pattern matches the given buffer
	#[must_use]
	pub fn matches(&self, buf: &[u8]) -> bool {
		buf.get(self.offset..self.required_size())
			.is_some_and(|slice| {
				slice
					.iter()
					.zip(&self.bytes)
					.all(|(&byte, pattern)| pattern.matches(byte))
			})
	}

	/// Get the minimum buffer size needed to check this pattern
	#[must_use]
	pub fn required_size(&self) -> usize {
		self.offset + self.bytes.len()
	}
}

impl MagicByte {
	/// Check if this pattern matches a byte
	#[must_use]
	pub const fn matches(&self, byte: u8) -> bool {
		match self {
			Self::Exact(b) => *b == byte,
			Self::Any => true,
			Self::Range { min, max } => byte >= *min && byte <= *max,
		}
	}
}

impl fmt::Display for MagicByte {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Exact(b) => write!(f, "{b:02X}"),
			Self::Any => write!(f, "??"),
			Self::Range { min, max } => write!(f, "{min:02X}-{max:02X}"),
		}
	}
}

impl fmt::Display for MagicBytePattern {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "offset={}: ", self.offset)?;
		for (i, byte) in self.bytes.iter().enumerate() {
			if i > 0 {
				write!(f, " ")?;
			}
			write!(f, "{byte}")?;
		}
		Ok(())
	}
}

/// Matches when any of its patterns matches.
#[derive(Debug, Clone)]
pub struct MagicDetector {
	patterns: Vec<MagicBytePattern>,
}

impl MagicDetector {
	#[must_use]
	pub const fn new(patterns: Vec<MagicBytePattern>) -> Self {
		Self { patterns }
	}

	#[must_use]
	pub fn patterns(&self) -> &[MagicBytePattern] {
		&self.patterns
	}
}

#[async_trait]
impl Detector for MagicDetector {
	async fn detect(&self, ctx: &SniffContext) -> Result<Detection, DetectorError> {
		let required = self
			.patterns
			.iter()
			.map(MagicBytePattern::required_size)
			.max()
			.unwrap_or_default();

		let mut window = ctx.window().await;
		if window.len() < required {
			window = ctx.ensure(required).await?;
		}

		if self.patterns.iter().any(|pattern| pattern.matches(&window)) {
			return Ok(Detection::Match);
		}

		// A pattern we couldn't check only stays open if the source may still have those bytes
		let unchecked = self
			.patterns
			.iter()
			.any(|pattern| pattern.required_size() > window.len());

		Ok(if unchecked && !window.is_complete() && window.len() < ctx.max_read() {
			Detection::Indeterminate
		} else {
			Detection::NoMatch
		})
	}
}
