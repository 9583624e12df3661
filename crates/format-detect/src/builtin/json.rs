use async_trait::async_trait;
use regex::bytes::Regex;
use serde::de::IgnoredAny;

use crate::{
	context::SniffContext,
	detector::{Detection, Detector},
	error::DetectorError,
};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Matches JSON objects and arrays, including documents cut short by the sniff window as long as
/// what we have is a valid prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRootDetector;

#[async_trait]
impl Detector for JsonRootDetector {
	async fn detect(&self, ctx: &SniffContext) -> Result<Detection, DetectorError> {
		let mut window = ctx.window().await;

		// Leading whitespace may run past the initial window
		loop {
			match first_significant(&window) {
				Some(b'{' | b'[') => break,
				Some(_) => return Ok(Detection::NoMatch),
				None if window.is_complete() => return Ok(Detection::NoMatch),
				None if window.len() >= ctx.max_read() => return Ok(Detection::Indeterminate),
				None => window = ctx.grow().await?,
			}
		}

		let bytes = window.strip_prefix(UTF8_BOM).unwrap_or(&window[..]);
		Ok(match serde_json::from_slice::<IgnoredAny>(bytes) {
			Ok(_) => Detection::Match,
			Err(e) if e.is_eof() => (!window.is_complete()).into(),
			Err(_) => Detection::NoMatch,
		})
	}
}

fn first_significant(bytes: &[u8]) -> Option<u8> {
	let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
	bytes.iter().copied().find(|byte| !byte.is_ascii_whitespace())
}

/// Child of the JSON root matching a regex over the raw window, e.g. GeoJSON's `"type"` member.
#[derive(Debug, Clone)]
pub struct JsonContentDetector {
	pattern: Regex,
}

impl JsonContentDetector {
	pub fn new(pattern: &str) -> Result<Self, regex::Error> {
		Ok(Self {
			pattern: Regex::new(pattern)?,
		})
	}
}

#[async_trait]
impl Detector for JsonContentDetector {
	async fn detect(&self, ctx: &SniffContext) -> Result<Detection, DetectorError> {
		Ok(self.pattern.is_match(&ctx.window().await).into())
	}
}
