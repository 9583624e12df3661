use std::fmt;

use async_trait::async_trait;

use super::{
	context::{SniffContext, Window},
	error::DetectorError,
	source::FileMetadata,
};

/// Outcome of a single detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Detection {
	Match,
	NoMatch,
	/// Not enough bytes (or time) to decide
	Indeterminate,
}

impl From<bool> for Detection {
	fn from(matched: bool) -> Self {
		if matched {
			Self::Match
		} else {
			Self::NoMatch
		}
	}
}

/// The capability every registered format provides.
///
/// A detector attached to a child node is only ever invoked after its parent matched the same
/// bytes, so it must not check the parent's condition again.
///
/// We're currently using the [`async_trait`](https://docs.rs/async-trait) crate to allow dyn async
/// traits, as detectors live behind `Arc<dyn Detector>` in the registry.
#[async_trait]
pub trait Detector: Send + Sync + 'static {
	async fn detect(&self, ctx: &SniffContext) -> Result<Detection, DetectorError>;
}

/// Adapter turning a plain predicate over the initial window into a [`Detector`].
pub struct FnDetector<F> {
	predicate: F,
}

impl<F> fmt::Debug for FnDetector<F> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<FnDetector>")
	}
}

#[async_trait]
impl<F> Detector for FnDetector<F>
where
	F: Fn(&Window, Option<&FileMetadata>) -> Detection + Send + Sync + 'static,
{
	async fn detect(&self, ctx: &SniffContext) -> Result<Detection, DetectorError> {
		let window = ctx.window().await;
		Ok((self.predicate)(&window, ctx.metadata()))
	}
}

/// Wraps a synchronous predicate, e.g. `from_fn(|window, _| window.starts_with(b"<").into())`.
pub const fn from_fn<F>(predicate: F) -> FnDetector<F>
where
	F: Fn(&Window, Option<&FileMetadata>) -> Detection + Send + Sync + 'static,
{
	FnDetector { predicate }
}
