//! XML sniffing: the root detector and the tag/namespace dialect detector for its children.

use async_trait::async_trait;
use quick_xml::{
	errors::{Error as XmlError, SyntaxError},
	events::Event,
	name::ResolveResult,
	NsReader,
};
use regex::Regex;
use tracing::trace;

use crate::{
	context::SniffContext,
	detector::{Detection, Detector},
	error::{DetectorError, SourceError},
};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Facts about the first element of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlRoot {
	pub local_name: String,
	pub prefix: Option<String>,
	/// Resolved namespace URI, if the element's prefix (or the default namespace) is bound
	pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlHead {
	Element(XmlRoot),
	NotXml,
	/// Gave up at `max_read` before seeing a complete start tag
	Undecided,
}

#[derive(Debug)]
enum Scan {
	Found(XmlRoot),
	Invalid,
	Truncated,
}

/// Looks for the root element, growing the window while the markup before it is cut short.
pub(crate) async fn read_root(ctx: &SniffContext) -> Result<XmlHead, SourceError> {
	let mut window = ctx.window().await;

	loop {
		match scan(&window) {
			Scan::Found(root) => {
				trace!(?root, "Found XML root element");
				return Ok(XmlHead::Element(root));
			}
			Scan::Invalid => return Ok(XmlHead::NotXml),
			Scan::Truncated if window.is_complete() => return Ok(XmlHead::NotXml),
			Scan::Truncated if window.len() >= ctx.max_read() => return Ok(XmlHead::Undecided),
			Scan::Truncated => window = ctx.grow().await?,
		}
	}
}

fn scan(bytes: &[u8]) -> Scan {
	let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

	match bytes.iter().find(|byte| !byte.is_ascii_whitespace()) {
		None => return Scan::Truncated,
		Some(b'<') => {}
		Some(_) => return Scan::Invalid,
	}

	let mut reader = NsReader::from_reader(bytes);
	let mut buf = Vec::new();

	loop {
		match reader.read_resolved_event_into(&mut buf) {
			Ok((ns, Event::Start(element) | Event::Empty(element))) => {
				let namespace = match ns {
					ResolveResult::Bound(namespace) => {
						Some(String::from_utf8_lossy(namespace.as_ref()).into_owned())
					}
					ResolveResult::Unbound | ResolveResult::Unknown(_) => None,
				};
				let name = element.name();

				return Scan::Found(XmlRoot {
					local_name: String::from_utf8_lossy(name.local_name().as_ref()).into_owned(),
					prefix: name
						.prefix()
						.map(|prefix| String::from_utf8_lossy(prefix.as_ref()).into_owned()),
					namespace,
				});
			}
			Ok((_, Event::Text(text))) if !text.iter().all(u8::is_ascii_whitespace) => {
				return Scan::Invalid;
			}
			Ok((_, Event::End(_) | Event::CData(_))) => return Scan::Invalid,
			Ok((_, Event::Eof)) => return Scan::Truncated,
			// Declaration, comments, processing instructions, doctype and whitespace
			Ok(_) => {}
			Err(XmlError::Syntax(SyntaxError::InvalidBangMarkup)) => return Scan::Invalid,
			Err(XmlError::Syntax(_)) => return Scan::Truncated,
			Err(_) => return Scan::Invalid,
		}

		buf.clear();
	}
}

/// Matches anything that opens with a well-formed start tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlRootDetector;

#[async_trait]
impl Detector for XmlRootDetector {
	async fn detect(&self, ctx: &SniffContext) -> Result<Detection, DetectorError> {
		Ok(match ctx.xml_root().await? {
			XmlHead::Element(_) => Detection::Match,
			XmlHead::NotXml => Detection::NoMatch,
			XmlHead::Undecided => Detection::Indeterminate,
		})
	}
}

/// Child of the XML root: checks the root element's local name and, optionally, its namespace.
#[derive(Debug, Clone)]
pub struct XmlDialectDetector {
	tag: Regex,
	namespace: Option<Regex>,
}

impl XmlDialectDetector {
	pub fn new(tag: &str, namespace: Option<&str>) -> Result<Self, regex::Error> {
		Ok(Self {
			tag: Regex::new(tag)?,
			namespace: namespace.map(Regex::new).transpose()?,
		})
	}

	#[must_use]
	pub fn matches(&self, root: &XmlRoot) -> bool {
		self.tag.is_match(&root.local_name)
			&& self.namespace.as_ref().map_or(true, |namespace| {
				root.namespace
					.as_deref()
					.is_some_and(|uri| namespace.is_match(uri))
			})
	}
}

#[async_trait]
impl Detector for XmlDialectDetector {
	async fn detect(&self, ctx: &SniffContext) -> Result<Detection, DetectorError> {
		Ok(match ctx.xml_root().await? {
			XmlHead::Element(root) => self.matches(root).into(),
			XmlHead::NotXml | XmlHead::Undecided => Detection::NoMatch,
		})
	}
}
