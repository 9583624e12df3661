use std::ops::Deref;

use bytes::{Bytes, BytesMut};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, trace};

use super::{
	builtin::{xml, zip},
	config::DetectorConfig,
	error::SourceError,
	source::{ByteSource, FileMetadata},
};

/// The bytes gathered so far, and whether they are everything the source had.
#[derive(Debug, Clone, Default)]
pub struct Window {
	bytes: Bytes,
	complete: bool,
}

impl Window {
	#[must_use]
	pub const fn bytes(&self) -> &Bytes {
		&self.bytes
	}

	/// `true` once the source reported it has nothing left.
	#[must_use]
	pub const fn is_complete(&self) -> bool {
		self.complete
	}
}

impl Deref for Window {
	type Target = [u8];

	fn deref(&self) -> &Self::Target {
		&self.bytes
	}
}

struct Reader {
	source: Box<dyn ByteSource>,
	/// Everything fetched so far, `window` is a frozen copy of it
	buf: BytesMut,
	window: Window,
}

impl Reader {
	fn commit(&mut self) {
		if self.buf.len() != self.window.bytes.len() {
			self.window.bytes = Bytes::copy_from_slice(&self.buf);
		}
	}
}

/// State shared by every detector during one resolution.
///
/// The window only ever grows, and expensive scans (the XML root element, the zip entry
/// listing) are computed once and reused by all the nodes that need them.
pub struct SniffContext {
	reader: Mutex<Reader>,
	metadata: Option<FileMetadata>,
	max_read: usize,
	read_chunk: usize,
	xml_root: OnceCell<xml::XmlHead>,
	zip_listing: OnceCell<zip::ZipListing>,
}

impl SniffContext {
	pub(crate) async fn open(
		mut source: Box<dyn ByteSource>,
		config: &DetectorConfig,
	) -> Result<Self, SourceError> {
		let bytes = source.peek(config.sniff_window).await?;
		let metadata = source.metadata().cloned();
		trace!(len = bytes.len(), "Peeked initial window");

		Ok(Self {
			reader: Mutex::new(Reader {
				source,
				buf: BytesMut::from(&bytes[..]),
				window: Window {
					bytes,
					complete: false,
				},
			}),
			metadata,
			max_read: config.max_read,
			read_chunk: config.read_chunk.max(1),
			xml_root: OnceCell::new(),
			zip_listing: OnceCell::new(),
		})
	}

	#[must_use]
	pub const fn metadata(&self) -> Option<&FileMetadata> {
		self.metadata.as_ref()
	}

	#[must_use]
	pub const fn max_read(&self) -> usize {
		self.max_read
	}

	#[must_use]
	pub const fn read_chunk(&self) -> usize {
		self.read_chunk
	}

	/// Current window, without fetching anything.
	pub async fn window(&self) -> Window {
		self.reader.lock().await.window.clone()
	}

	/// Grows the window until it holds at least `len` bytes, the source runs dry, or
	/// `max_read` is hit, whichever comes first.
	///
	/// Bytes that arrived before a failed fetch are kept, so a later call picks up where the
	/// source left off.
	pub async fn ensure(&self, len: usize) -> Result<Window, SourceError> {
		let mut reader = self.reader.lock().await;

		let current = reader.buf.len();
		if current >= len.min(self.max_read) || reader.window.complete {
			return Ok(reader.window.clone());
		}

		// At least double, so growing in small steps doesn't copy the window over and over
		let target = len.max(current.saturating_mul(2)).min(self.max_read);

		while reader.buf.len() < target {
			let wanted = (target - reader.buf.len()).max(self.read_chunk);
			let wanted = wanted.min(self.max_read - reader.buf.len());

			match reader.source.read_more(wanted).await {
				Ok(chunk) if chunk.is_empty() => {
					reader.window.complete = true;
					break;
				}
				Ok(chunk) => reader.buf.extend_from_slice(&chunk),
				Err(e) => {
					reader.commit();
					return Err(e);
				}
			}
		}

		reader.commit();
		debug!(
			len = reader.window.bytes.len(),
			complete = reader.window.complete,
			"Grew sniff window"
		);

		Ok(reader.window.clone())
	}

	/// Asks for at least one more `read_chunk` past the current window.
	pub async fn grow(&self) -> Result<Window, SourceError> {
		let len = self.reader.lock().await.buf.len();
		self.ensure(len.saturating_add(self.read_chunk)).await
	}

	/// Everything the source holds, up to `max_read`.
	pub async fn read_to_end(&self) -> Result<Window, SourceError> {
		self.ensure(self.max_read).await
	}

	pub(crate) async fn xml_root(&self) -> Result<&xml::XmlHead, SourceError> {
		self.xml_root.get_or_try_init(|| xml::read_root(self)).await
	}

	pub(crate) async fn zip_listing(&self) -> Result<&zip::ZipListing, SourceError> {
		self.zip_listing.get_or_try_init(|| zip::list_entries(self)).await
	}
}
