//! Built-in format catalogue.
//!
//! Every format here is a thin call site over one of the [`builtin`](crate::builtin) detectors:
//! the roots sniff the container (XML, zip, JSON, shapefile magic) and the children only look at
//! the facts the root already extracted.

use tracing::debug;

use super::{
	builtin::{
		zip_root_detector, JsonContentDetector, JsonRootDetector, MagicBytePattern, MagicDetector,
		XmlDialectDetector, XmlRootDetector, ZipEntriesDetector,
	},
	detector::Detector,
	error::DefinitionError,
	registry::{FormatNode, Registry},
};

pub const XML: &str = "application/xml";
pub const ZIP: &str = "application/zip";
pub const JSON: &str = "application/json";
pub const SHAPEFILE: &str = "application/x-shapefile";

pub const GML: &str = "application/xml; subtype=GML";
pub const GPX: &str = "application/xml; subtype=GPX";
pub const KML: &str = "application/xml; subtype=KML";
pub const STATE: &str = "application/xml; subtype=STATE";
pub const FILTER: &str = "application/xml; subtype=FILTER";
pub const WMTS: &str = "application/xml; subtype=WMTS";
pub const WMS: &str = "application/xml; subtype=WMS";
pub const WFS: &str = "application/xml; subtype=WFS";
pub const OWS: &str = "application/xml; subtype=OWS";

pub const KMZ: &str = "application/zip; subtype=KMZ";
pub const ZIPPED_SHAPEFILE: &str = "application/zip; subtype=SHP";
pub const ZIPPED_STATE: &str = "application/zip; subtype=STATE";

pub const GEOJSON: &str = "application/json; subtype=GEOJSON";

/// Main file code of an ESRI shapefile, big endian
const SHAPEFILE_MAGIC: &str = "00 00 27 0A";

const GEOJSON_TYPES: &str = r#""type"\s*:\s*"(FeatureCollection|Feature|Point|MultiPoint|LineString|MultiLineString|Polygon|MultiPolygon|GeometryCollection)""#;

/// `(identity, tag, namespace, priority)` for every XML dialect.
const XML_DIALECTS: &[(&str, &str, Option<&str>, i32)] = &[
	(GML, "^(FeatureCollection|gml|wfs)$", Some(r"(?i)opengis\.net/(gml|wfs)"), 0),
	(GPX, "^gpx$", None, 0),
	(KML, "^kml$", None, 0),
	(STATE, "^state$", None, 0),
	(FILTER, "^Filter$", Some(r"(?i)opengis\.net/(ogc|fes)"), 0),
	// Both answer to `Capabilities`, WMTS narrows it down by namespace
	(WMTS, "^Capabilities$", Some(r"(?i)opengis\.net/wmts"), 10),
	(OWS, "^Capabilities$", None, 0),
	(WMS, "^(WMS_Capabilities|WMT_MS_Capabilities)$", None, 0),
	(WFS, "^WFS_Capabilities$", None, 0),
];

/// `(identity, required entry patterns)` for every zip flavour.
const ZIP_FLAVOURS: &[(&str, &[&str])] = &[
	(KMZ, &[r"(?i)\.kml$"]),
	(ZIPPED_SHAPEFILE, &[r"(?i)\.shp$", r"(?i)\.dbf$"]),
	(ZIPPED_STATE, &[r"(?i)(^|/)state\.xml$"]),
];

/// Registers the whole catalogue. Identities are the constants in this module.
pub fn register_builtin(registry: &mut Registry) -> Result<(), DefinitionError> {
	let regex_err = |identity: &str| {
		let identity = identity.to_owned();
		move |source| DefinitionError::Regex { identity, source }
	};

	register_root(registry, XML, XmlRootDetector)?;
	register_root(registry, ZIP, zip_root_detector())?;
	register_root(registry, JSON, JsonRootDetector)?;
	register_root(
		registry,
		SHAPEFILE,
		MagicDetector::new(vec![MagicBytePattern::from_hex_string(SHAPEFILE_MAGIC, 0)
			.map_err(|source| DefinitionError::Magic {
				identity: SHAPEFILE.to_owned(),
				source,
			})?]),
	)?;

	for &(identity, tag, namespace, priority) in XML_DIALECTS {
		let detector = XmlDialectDetector::new(tag, namespace).map_err(regex_err(identity))?;
		registry.register(
			FormatNode::new(identity, detector)
				.with_parent(XML)
				.with_priority(priority),
		)?;
	}

	for &(identity, entries) in ZIP_FLAVOURS {
		let detector =
			ZipEntriesDetector::new(entries.iter().copied()).map_err(regex_err(identity))?;
		registry.register(FormatNode::new(identity, detector).with_parent(ZIP))?;
	}

	let geojson = JsonContentDetector::new(GEOJSON_TYPES).map_err(regex_err(GEOJSON))?;
	registry.register(FormatNode::new(GEOJSON, geojson).with_parent(JSON))?;

	debug!(count = registry.len(), "Registered built-in formats");

	Ok(())
}

fn register_root(
	registry: &mut Registry,
	identity: &str,
	detector: impl Detector,
) -> Result<(), DefinitionError> {
	registry
		.register(FormatNode::new(identity, detector))
		.map_err(Into::into)
}
