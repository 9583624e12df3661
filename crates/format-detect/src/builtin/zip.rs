//! Zip sniffing: signature based root detector and entry listing for its children.
//!
//! Complete archives are listed from their central directory with [`ZipArchive`]. When the
//! archive didn't fit in `max_read` we fall back to walking the local file headers we do have.

use std::io::Cursor;

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use tracing::{debug, trace};
use zip::ZipArchive;

use super::magic::{MagicBytePattern, MagicDetector};
use crate::{
	context::SniffContext,
	detector::{Detection, Detector},
	error::{DetectorError, SourceError},
};

pub const LOCAL_FILE_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
pub const CENTRAL_DIRECTORY_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x01, 0x02];
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];

const LOCAL_FILE_HEADER_LEN: usize = 30;
const DATA_DESCRIPTOR_FLAG: u16 = 1 << 3;

/// Member names of an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZipListing {
	pub entries: Vec<String>,
	/// The listing may be missing entries, either because the archive didn't fit in `max_read`
	/// or because the central directory couldn't be used
	pub partial: bool,
}

/// Matches archives starting with a local file header, or empty archives (just the end of
/// central directory record).
#[must_use]
pub fn zip_root_detector() -> MagicDetector {
	MagicDetector::new(vec![
		MagicBytePattern::exact(&LOCAL_FILE_HEADER_SIGNATURE),
		MagicBytePattern::exact(&END_OF_CENTRAL_DIRECTORY_SIGNATURE),
	])
}

pub(crate) async fn list_entries(ctx: &SniffContext) -> Result<ZipListing, SourceError> {
	let window = ctx.read_to_end().await?;

	if window.is_complete() {
		match read_central_directory(window.bytes().clone()) {
			Ok(entries) => {
				trace!(count = entries.len(), "Listed zip entries from central directory");
				return Ok(ZipListing {
					entries,
					partial: false,
				});
			}
			Err(e) => debug!(?e, "No usable central directory, walking local file headers"),
		}
	}

	let (entries, exhausted) = walk_local_headers(&window);

	Ok(ZipListing {
		entries,
		partial: !(exhausted && window.is_complete()),
	})
}

/// Lists entries from the central directory of a complete archive.
pub(crate) fn read_central_directory(data: Bytes) -> zip::result::ZipResult<Vec<String>> {
	let archive = ZipArchive::new(Cursor::new(data))?;

	Ok(archive.file_names().map(ToOwned::to_owned).collect())
}

fn read_u16(data: &[u8], at: usize) -> Option<u16> {
	data.get(at..at + 2)
		.map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
	data.get(at..at + 4)
		.map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Walks local file headers from the start. Also reports whether the walk reached the end of the
/// local headers, as opposed to stopping on something it couldn't skip.
pub(crate) fn walk_local_headers(data: &[u8]) -> (Vec<String>, bool) {
	let mut entries = Vec::new();
	let mut at = 0;

	loop {
		let Some(header) = data.get(at..at + LOCAL_FILE_HEADER_LEN) else {
			return (entries, false);
		};

		if !header.starts_with(&LOCAL_FILE_HEADER_SIGNATURE) {
			// Central directory (or end record) right after the last member
			let done = header.starts_with(&CENTRAL_DIRECTORY_SIGNATURE)
				|| header.starts_with(&END_OF_CENTRAL_DIRECTORY_SIGNATURE);
			return (entries, done);
		}

		let (Some(flags), Some(compressed), Some(name_len), Some(extra_len)) = (
			read_u16(header, 6),
			read_u32(header, 18),
			read_u16(header, 26),
			read_u16(header, 28),
		) else {
			return (entries, false);
		};

		let name_start = at + LOCAL_FILE_HEADER_LEN;
		let Some(name) = data.get(name_start..name_start + usize::from(name_len)) else {
			return (entries, false);
		};
		entries.push(String::from_utf8_lossy(name).into_owned());

		// Sizes are only known after the data when a descriptor follows, nothing to skip by
		if flags & DATA_DESCRIPTOR_FLAG != 0 || compressed == u32::MAX {
			return (entries, false);
		}

		let Ok(compressed) = usize::try_from(compressed) else {
			return (entries, false);
		};
		at = name_start + usize::from(name_len) + usize::from(extra_len) + compressed;
	}
}

/// Child of the zip root: every regex must match at least one entry name.
#[derive(Debug, Clone)]
pub struct ZipEntriesDetector {
	required: Vec<Regex>,
}

impl ZipEntriesDetector {
	pub fn new<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<Self, regex::Error> {
		Ok(Self {
			required: patterns
				.into_iter()
				.map(Regex::new)
				.collect::<Result<_, _>>()?,
		})
	}

	#[must_use]
	pub fn matches(&self, entries: &[String]) -> bool {
		self.required
			.iter()
			.all(|re| entries.iter().any(|entry| re.is_match(entry)))
	}
}

#[async_trait]
impl Detector for ZipEntriesDetector {
	async fn detect(&self, ctx: &SniffContext) -> Result<Detection, DetectorError> {
		let listing = ctx.zip_listing().await?;

		Ok(if self.matches(&listing.entries) {
			Detection::Match
		} else if listing.partial {
			Detection::Indeterminate
		} else {
			Detection::NoMatch
		})
	}
}
