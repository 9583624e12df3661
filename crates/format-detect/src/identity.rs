use std::{borrow::Borrow, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// Globally unique key of a registered format, also the value reported back to callers.
///
/// XML dialects follow the `"<base-mime-type>; subtype=<NAME>"` convention, so consumers that
/// don't care about the dialect can look at [`FormatIdentity::base_type`] alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FormatIdentity(Arc<str>);

impl FormatIdentity {
	pub fn new(id: impl AsRef<str>) -> Self {
		Self(Arc::from(id.as_ref()))
	}

	/// Builds `"<base>; subtype=<name>"`.
	pub fn dialect(base: impl AsRef<str>, name: impl AsRef<str>) -> Self {
		Self::new(format!("{}; subtype={}", base.as_ref(), name.as_ref()))
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// The MIME type without any parameters.
	#[must_use]
	pub fn base_type(&self) -> &str {
		self.0
			.split_once(';')
			.map_or(&*self.0, |(base, _)| base)
			.trim()
	}

	/// The value of the `subtype` parameter, if any.
	#[must_use]
	pub fn subtype(&self) -> Option<&str> {
		self.0.split(';').skip(1).find_map(|param| {
			let (key, value) = param.split_once('=')?;
			key.trim()
				.eq_ignore_ascii_case("subtype")
				.then(|| value.trim().trim_matches('"'))
		})
	}
}

impl fmt::Display for FormatIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl Borrow<str> for FormatIdentity {
	fn borrow(&self) -> &str {
		&self.0
	}
}

impl AsRef<str> for FormatIdentity {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl From<&str> for FormatIdentity {
	fn from(id: &str) -> Self {
		Self(Arc::from(id))
	}
}

impl From<String> for FormatIdentity {
	fn from(id: String) -> Self {
		Self(Arc::from(id))
	}
}

impl From<&String> for FormatIdentity {
	fn from(id: &String) -> Self {
		Self::new(id)
	}
}

impl From<FormatIdentity> for String {
	fn from(id: FormatIdentity) -> Self {
		id.0.to_string()
	}
}

impl PartialEq<str> for FormatIdentity {
	fn eq(&self, other: &str) -> bool {
		&*self.0 == other
	}
}

impl PartialEq<&str> for FormatIdentity {
	fn eq(&self, other: &&str) -> bool {
		&*self.0 == *other
	}
}
