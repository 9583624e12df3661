use std::{
	cmp::Reverse,
	collections::{HashMap, HashSet},
	fmt,
	sync::{Arc, OnceLock},
};

use tracing::{debug, warn};

use super::{detector::Detector, error::RegistrationError, identity::FormatIdentity};

/// Evaluation order among siblings, higher goes first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl From<i32> for Priority {
	fn from(value: i32) -> Self {
		Self(value)
	}
}

impl TryFrom<f64> for Priority {
	type Error = f64;

	/// Declarative definitions carry numbers that may not be usable as a priority, like `nan`,
	/// infinities, fractions or anything outside the `i32` range.
	#[allow(clippy::cast_possible_truncation)]
	fn try_from(value: f64) -> Result<Self, Self::Error> {
		if value.is_finite()
			&& value.fract() == 0.0
			&& value >= f64::from(i32::MIN)
			&& value <= f64::from(i32::MAX)
		{
			Ok(Self(value as i32))
		} else {
			Err(value)
		}
	}
}

impl fmt::Display for Priority {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// A registered format: identity, detector, priority and optional parent.
#[derive(Clone)]
pub struct FormatNode {
	identity: FormatIdentity,
	detector: Arc<dyn Detector>,
	priority: Priority,
	parent: Option<FormatIdentity>,
}

impl fmt::Debug for FormatNode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FormatNode")
			.field("identity", &self.identity)
			.field("priority", &self.priority)
			.field("parent", &self.parent)
			.finish_non_exhaustive()
	}
}

impl FormatNode {
	/// A root node with priority 0.
	pub fn new(identity: impl Into<FormatIdentity>, detector: impl Detector) -> Self {
		Self::from_arc(identity, Arc::new(detector))
	}

	pub fn from_arc(identity: impl Into<FormatIdentity>, detector: Arc<dyn Detector>) -> Self {
		Self {
			identity: identity.into(),
			detector,
			priority: Priority::default(),
			parent: None,
		}
	}

	#[must_use]
	pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
		self.priority = priority.into();
		self
	}

	#[must_use]
	pub fn with_parent(mut self, parent: impl Into<FormatIdentity>) -> Self {
		self.parent = Some(parent.into());
		self
	}

	#[must_use]
	pub const fn identity(&self) -> &FormatIdentity {
		&self.identity
	}

	#[must_use]
	pub fn detector(&self) -> &dyn Detector {
		&*self.detector
	}

	#[must_use]
	pub const fn priority(&self) -> Priority {
		self.priority
	}

	#[must_use]
	pub const fn parent(&self) -> Option<&FormatIdentity> {
		self.parent.as_ref()
	}
}

#[derive(Debug, Default)]
struct Index {
	roots: Vec<usize>,
	children: HashMap<FormatIdentity, Vec<usize>>,
	diagnostics: Vec<RegistrationError>,
}

/// Table of every known format, organized as a forest by parent identity.
///
/// Formats are registered during bootstrap through `&mut self`; afterwards the registry is handed
/// to a [`Resolver`](crate::Resolver) behind an `Arc` and never changes again. The children index
/// is built lazily on first use, which is also when parent problems get reported, so plugins can
/// register children before their parents.
#[derive(Debug, Default)]
pub struct Registry {
	nodes: Vec<FormatNode>,
	by_identity: HashMap<FormatIdentity, usize>,
	index: OnceLock<Index>,
}

impl Registry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, node: FormatNode) -> Result<(), RegistrationError> {
		if node.identity.as_str().trim().is_empty() {
			return Err(RegistrationError::InvalidIdentity);
		}

		if self.by_identity.contains_key(&node.identity) {
			return Err(RegistrationError::DuplicateIdentity(node.identity));
		}

		debug!(
			identity = %node.identity,
			parent = ?node.parent.as_ref().map(FormatIdentity::as_str),
			priority = %node.priority,
			"Registering format"
		);

		self.by_identity
			.insert(node.identity.clone(), self.nodes.len());
		self.nodes.push(node);
		self.index.take();

		Ok(())
	}

	/// Shorthand for [`Registry::register`] with a freshly built [`FormatNode`].
	pub fn register_with(
		&mut self,
		identity: impl Into<FormatIdentity>,
		detector: impl Detector,
		priority: i32,
		parent: Option<&str>,
	) -> Result<(), RegistrationError> {
		let mut node = FormatNode::new(identity, detector).with_priority(priority);
		node.parent = parent.map(FormatIdentity::from);

		self.register(node)
	}

	#[must_use]
	pub fn get(&self, identity: &str) -> Option<&FormatNode> {
		self.by_identity.get(identity).map(|&idx| &self.nodes[idx])
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Nodes in registration order.
	pub fn iter(&self) -> impl Iterator<Item = &FormatNode> + '_ {
		self.nodes.iter()
	}

	/// Siblings under `parent` (or the roots for `None`), highest priority first, ties in
	/// registration order. Nodes with a missing parent or cyclic ancestry are never listed.
	pub fn children_of(&self, parent: Option<&str>) -> impl Iterator<Item = &FormatNode> + '_ {
		let index = self.index();
		let slots = match parent {
			None => index.roots.as_slice(),
			Some(parent) => index
				.children
				.get(parent)
				.map_or(&[][..], Vec::as_slice),
		};

		slots.iter().map(|&idx| &self.nodes[idx])
	}

	/// Parent problems found while building the index.
	#[must_use]
	pub fn diagnostics(&self) -> &[RegistrationError] {
		&self.index().diagnostics
	}

	fn index(&self) -> &Index {
		self.index.get_or_init(|| self.build_index())
	}

	fn build_index(&self) -> Index {
		let mut index = Index::default();
		let mut reachable = HashSet::with_capacity(self.nodes.len());

		for (idx, node) in self.nodes.iter().enumerate() {
			match &node.parent {
				None => {
					index.roots.push(idx);
					reachable.insert(idx);
				}
				Some(parent) => index
					.children
					.entry(parent.clone())
					.or_default()
					.push(idx),
			}
		}

		// Walk down from the roots, whatever is left over hangs off a missing parent or a cycle
		let mut pending = index.roots.clone();
		while let Some(idx) = pending.pop() {
			if let Some(children) = index.children.get(&self.nodes[idx].identity) {
				for &child in children {
					if reachable.insert(child) {
						pending.push(child);
					}
				}
			}
		}

		for (idx, node) in self.nodes.iter().enumerate() {
			if reachable.contains(&idx) {
				continue;
			}

			if let Some(diagnostic) = self.diagnose_unreachable(node) {
				warn!("{diagnostic}");
				index.diagnostics.push(diagnostic);
			}
		}

		index.children.retain(|_, children| {
			children.retain(|child| reachable.contains(child));
			!children.is_empty()
		});

		for slots in std::iter::once(&mut index.roots).chain(index.children.values_mut()) {
			slots.sort_by_key(|&idx| Reverse(self.nodes[idx].priority));
		}

		index
	}

	/// Follows the parent chain of an unreachable node. Only the node whose own parent is missing
	/// gets a `DanglingParent`, its descendants are silent; every node on a cycle gets reported.
	fn diagnose_unreachable(&self, node: &FormatNode) -> Option<RegistrationError> {
		let mut seen = HashSet::new();
		let mut current = node;
		seen.insert(current.identity.clone());

		while let Some(parent) = &current.parent {
			let Some(next) = self.get(parent.as_str()) else {
				return (current.identity == node.identity).then(|| {
					RegistrationError::DanglingParent {
						identity: node.identity.clone(),
						parent: parent.clone(),
					}
				});
			};

			if !seen.insert(next.identity.clone()) {
				return Some(RegistrationError::ParentCycle {
					identity: node.identity.clone(),
				});
			}

			current = next;
		}

		None
	}
}
