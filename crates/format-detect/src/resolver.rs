use std::{fmt, panic::AssertUnwindSafe, sync::Arc};

use bytes::Bytes;
use futures::FutureExt;
use futures_concurrency::future::Join;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, error, instrument, trace, warn};

use super::{
	config::DetectorConfig,
	context::SniffContext,
	detector::Detection,
	error::{DetectorError, ResolveError},
	identity::FormatIdentity,
	registry::{FormatNode, Registry},
	source::{ByteSource, FileMetadata, MemorySource},
};

/// What a resolution concluded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "status", content = "identity", rename_all = "snake_case")]
pub enum DetectionResult {
	/// The most specific format that matched
	Identity(FormatIdentity),
	/// Ran out of bytes or time before a decision could be made.
	///
	/// Detectors that need the whole file, like the zip entry listing, can't decide on anything
	/// larger than `max_read`: a zip archive past the cap whose children are all undecided ends up
	/// here rather than as a plain zip. Retrying with a larger
	/// [`max_read`](crate::DetectorConfig::max_read) may settle it.
	Indeterminate,
	/// Bytes were examined and no root format matched
	Unknown,
}

impl DetectionResult {
	#[must_use]
	pub const fn identity(&self) -> Option<&FormatIdentity> {
		match self {
			Self::Identity(identity) => Some(identity),
			Self::Indeterminate | Self::Unknown => None,
		}
	}
}

impl fmt::Display for DetectionResult {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Identity(identity) => identity.fmt(f),
			Self::Indeterminate => f.write_str("indeterminate"),
			Self::Unknown => f.write_str("unknown"),
		}
	}
}

/// A [`DetectionResult`] together with every node matched on the way down, root first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
	pub result: DetectionResult,
	pub path: Vec<FormatIdentity>,
}

impl Resolution {
	const fn indeterminate(path: Vec<FormatIdentity>) -> Self {
		Self {
			result: DetectionResult::Indeterminate,
			path,
		}
	}
}

enum Selection<'node> {
	Matched(&'node FormatNode),
	Indeterminate(&'node FormatNode),
	Nothing,
}

/// Walks the registry forest top-down to find the most specific format for some bytes.
#[derive(Debug, Clone)]
pub struct Resolver {
	registry: Arc<Registry>,
	config: DetectorConfig,
}

impl Resolver {
	pub fn new(registry: impl Into<Arc<Registry>>) -> Self {
		Self {
			registry: registry.into(),
			config: DetectorConfig::default(),
		}
	}

	/// Values that can't work, like a zero `read_chunk`, are clamped.
	#[must_use]
	pub fn with_config(mut self, config: DetectorConfig) -> Self {
		self.config = config.sanitized();
		self
	}

	#[must_use]
	pub fn registry(&self) -> &Registry {
		&self.registry
	}

	#[must_use]
	pub const fn config(&self) -> &DetectorConfig {
		&self.config
	}

	pub async fn resolve(
		&self,
		source: impl ByteSource + 'static,
	) -> Result<DetectionResult, ResolveError> {
		self.resolve_path(source)
			.await
			.map(|resolution| resolution.result)
	}

	pub async fn resolve_bytes(
		&self,
		bytes: impl Into<Bytes>,
		metadata: Option<FileMetadata>,
	) -> Result<DetectionResult, ResolveError> {
		let mut source = MemorySource::new(bytes);
		if let Some(metadata) = metadata {
			source = source.with_metadata(metadata);
		}

		self.resolve(source).await
	}

	/// Like [`Resolver::resolve`], but also reports the matched path.
	///
	/// Only an empty registry is an error; every data related problem ends up as
	/// [`DetectionResult::Indeterminate`] or [`DetectionResult::Unknown`].
	#[instrument(skip_all, fields(name = ?source.metadata().and_then(|m| m.name.as_deref())))]
	pub async fn resolve_path(
		&self,
		source: impl ByteSource + 'static,
	) -> Result<Resolution, ResolveError> {
		if self.registry.is_empty() {
			return Err(ResolveError::EmptyRegistry);
		}

		let resolution = match self.config.timeout() {
			Some(limit) => timeout(limit, self.descend(Box::new(source)))
				.await
				.unwrap_or_else(|_| {
					warn!(?limit, "Format detection timed out");
					Resolution::indeterminate(vec![])
				}),
			None => self.descend(Box::new(source)).await,
		};

		debug!(result = %resolution.result, "Resolved format");

		Ok(resolution)
	}

	async fn descend(&self, source: Box<dyn ByteSource>) -> Resolution {
		let ctx = match SniffContext::open(source, &self.config).await {
			Ok(ctx) => ctx,
			Err(e) => {
				warn!(?e, "Failed to read initial window, can't decide on a format");
				return Resolution::indeterminate(vec![]);
			}
		};

		if ctx.window().await.is_empty() {
			return Resolution {
				result: DetectionResult::Unknown,
				path: vec![],
			};
		}

		let mut path = Vec::new();
		let mut parent: Option<&FormatNode> = None;

		loop {
			let candidates = self
				.registry
				.children_of(parent.map(|node| node.identity().as_str()))
				.collect::<Vec<_>>();

			if candidates.is_empty() {
				break;
			}

			match self.select(&ctx, &candidates).await {
				Selection::Matched(node) => {
					debug!(identity = %node.identity(), "Descending into matched format");
					path.push(node.identity().clone());
					parent = Some(node);
				}
				Selection::Indeterminate(node) => {
					debug!(identity = %node.identity(), "Undecided detector takes precedence");
					return Resolution::indeterminate(path);
				}
				Selection::Nothing => break,
			}
		}

		Resolution {
			result: path
				.last()
				.cloned()
				.map_or(DetectionResult::Unknown, DetectionResult::Identity),
			path,
		}
	}

	/// Picks the first sibling, in precedence order, that didn't answer `NoMatch`.
	async fn select<'node>(
		&self,
		ctx: &SniffContext,
		candidates: &[&'node FormatNode],
	) -> Selection<'node> {
		let pick = |node: &'node FormatNode, outcome| match outcome {
			Detection::Match => Some(Selection::Matched(node)),
			Detection::Indeterminate => Some(Selection::Indeterminate(node)),
			Detection::NoMatch => None,
		};

		if self.config.concurrent_siblings && candidates.len() > 1 {
			let outcomes = candidates
				.iter()
				.map(|&node| evaluate(node, ctx))
				.collect::<Vec<_>>()
				.join()
				.await;

			return candidates
				.iter()
				.zip(outcomes)
				.find_map(|(&node, outcome)| pick(node, outcome))
				.unwrap_or(Selection::Nothing);
		}

		for &node in candidates {
			if let Some(selection) = pick(node, evaluate(node, ctx).await) {
				return selection;
			}
		}

		Selection::Nothing
	}
}

/// Runs one detector, containing its failures.
async fn evaluate(node: &FormatNode, ctx: &SniffContext) -> Detection {
	let identity = node.identity();

	match AssertUnwindSafe(node.detector().detect(ctx))
		.catch_unwind()
		.await
	{
		Ok(Ok(outcome)) => {
			trace!(%identity, ?outcome, "Detector finished");
			outcome
		}
		Ok(Err(DetectorError::Source(e))) if e.is_interruption() => {
			debug!(%identity, ?e, "Byte source interrupted while detecting");
			Detection::Indeterminate
		}
		Ok(Err(e)) => {
			warn!(%identity, "Detector failed, treating as no match: {e:#}");
			Detection::NoMatch
		}
		Err(_) => {
			error!(%identity, "Detector panicked, treating as no match");
			Detection::NoMatch
		}
	}
}
