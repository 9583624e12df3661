use std::{
	io::SeekFrom,
	path::{Path, PathBuf},
	time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::{
	fs::File,
	io::{AsyncReadExt, AsyncSeekExt},
	time::timeout,
};

use super::error::{FileIOError, SourceError};

/// Optional hints about where the bytes came from. Detectors may use them to break ties but
/// never as the only reason for a match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
	pub name: Option<String>,
	/// Lowercase, without the leading dot
	pub extension: Option<String>,
}

impl FileMetadata {
	pub fn from_name(name: impl Into<String>) -> Self {
		let name = name.into();
		let extension = Path::new(&name)
			.extension()
			.map(|ext| ext.to_string_lossy().to_lowercase());

		Self {
			name: Some(name),
			extension,
		}
	}

	pub fn from_path(path: impl AsRef<Path>) -> Self {
		path.as_ref()
			.file_name()
			.map_or_else(Self::default, |name| {
				Self::from_name(name.to_string_lossy().into_owned())
			})
	}
}

/// Supplier of the bytes being classified.
///
/// `peek` hands out a prefix starting at offset 0, `read_more` continues right after everything
/// delivered so far. An empty chunk from `read_more` means there is nothing left.
#[async_trait]
pub trait ByteSource: Send {
	async fn peek(&mut self, max_bytes: usize) -> Result<Bytes, SourceError>;

	async fn read_more(&mut self, _additional: usize) -> Result<Bytes, SourceError> {
		Ok(Bytes::new())
	}

	fn metadata(&self) -> Option<&FileMetadata> {
		None
	}
}

/// In memory bytes, for callers that already fetched everything.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
	data: Bytes,
	delivered: usize,
	metadata: Option<FileMetadata>,
}

impl MemorySource {
	pub fn new(data: impl Into<Bytes>) -> Self {
		Self {
			data: data.into(),
			delivered: 0,
			metadata: None,
		}
	}

	#[must_use]
	pub fn with_metadata(mut self, metadata: FileMetadata) -> Self {
		self.metadata = Some(metadata);
		self
	}
}

#[async_trait]
impl ByteSource for MemorySource {
	async fn peek(&mut self, max_bytes: usize) -> Result<Bytes, SourceError> {
		let end = max_bytes.min(self.data.len());
		self.delivered = self.delivered.max(end);
		Ok(self.data.slice(..end))
	}

	async fn read_more(&mut self, additional: usize) -> Result<Bytes, SourceError> {
		let start = self.delivered;
		let end = start.saturating_add(additional).min(self.data.len());
		self.delivered = end;
		Ok(self.data.slice(start..end))
	}

	fn metadata(&self) -> Option<&FileMetadata> {
		self.metadata.as_ref()
	}
}

/// Reads lazily from a file on disk, only as far as the detectors ask.
#[derive(Debug)]
pub struct FileSource {
	path: PathBuf,
	file: File,
	delivered: u64,
	metadata: FileMetadata,
}

impl FileSource {
	pub async fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
		let path = path.as_ref();
		let file = File::open(path)
			.await
			.map_err(|e| FileIOError::from_std_io_err(path, e))?;

		Ok(Self {
			path: path.to_path_buf(),
			file,
			delivered: 0,
			metadata: FileMetadata::from_path(path),
		})
	}

	async fn read_at(&mut self, offset: u64, len: usize) -> Result<Bytes, SourceError> {
		self.file
			.seek(SeekFrom::Start(offset))
			.await
			.map_err(|e| FileIOError::from_std_io_err_with_msg(&self.path, e, "seeking"))?;

		let mut buf = Vec::with_capacity(len);
		(&mut self.file)
			.take(len as u64)
			.read_to_end(&mut buf)
			.await
			.map_err(|e| FileIOError::from_std_io_err_with_msg(&self.path, e, "reading"))?;

		Ok(Bytes::from(buf))
	}
}

#[async_trait]
impl ByteSource for FileSource {
	async fn peek(&mut self, max_bytes: usize) -> Result<Bytes, SourceError> {
		let bytes = self.read_at(0, max_bytes).await?;
		self.delivered = self.delivered.max(bytes.len() as u64);
		Ok(bytes)
	}

	async fn read_more(&mut self, additional: usize) -> Result<Bytes, SourceError> {
		let bytes = self.read_at(self.delivered, additional).await?;
		self.delivered += bytes.len() as u64;
		Ok(bytes)
	}

	fn metadata(&self) -> Option<&FileMetadata> {
		Some(&self.metadata)
	}
}

/// Wraps any source so every individual fetch gives up after `limit`.
#[derive(Debug)]
pub struct TimeoutSource<S> {
	inner: S,
	limit: Duration,
}

impl<S: ByteSource> TimeoutSource<S> {
	pub const fn new(inner: S, limit: Duration) -> Self {
		Self { inner, limit }
	}
}

#[async_trait]
impl<S: ByteSource> ByteSource for TimeoutSource<S> {
	async fn peek(&mut self, max_bytes: usize) -> Result<Bytes, SourceError> {
		timeout(self.limit, self.inner.peek(max_bytes))
			.await
			.map_err(|_| SourceError::TimedOut(self.limit))?
	}

	async fn read_more(&mut self, additional: usize) -> Result<Bytes, SourceError> {
		timeout(self.limit, self.inner.read_more(additional))
			.await
			.map_err(|_| SourceError::TimedOut(self.limit))?
	}

	fn metadata(&self) -> Option<&FileMetadata> {
		self.inner.metadata()
	}
}
