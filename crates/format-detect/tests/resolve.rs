use std::time::Duration;

use pretty_assertions::assert_eq;
use rand::seq::SliceRandom;
use sd_format_detect::{
	builtin::{XmlDialectDetector, XmlRootDetector},
	formats, from_fn, Detection, DetectionResult, DetectorConfig, FormatIdentity, FormatNode,
	MemorySource, Registry, RegistrationError, ResolveError, Resolver,
};
use tracing::info;
use tracing_test::traced_test;

mod common;

use common::{
	CancellingSource, DelayedDetector, FaultingDetector, PanickingDetector, StalledSource,
};

const XML: &str = "application/xml";
const GML: &str = "application/xml; subtype=GML";
const STATE: &str = "application/xml; subtype=STATE";

fn identity(id: &str) -> DetectionResult {
	DetectionResult::Identity(FormatIdentity::from(id))
}

fn always(outcome: Detection) -> impl sd_format_detect::Detector {
	from_fn(move |_, _| outcome)
}

fn xml_registry() -> Registry {
	let mut registry = Registry::new();
	registry.register_with(XML, XmlRootDetector, 0, None).unwrap();
	registry
		.register_with(
			GML,
			XmlDialectDetector::new("^(gml|wfs)$", Some("(?i)gml")).unwrap(),
			0,
			Some(XML),
		)
		.unwrap();
	registry
		.register_with(
			STATE,
			XmlDialectDetector::new("^state$", None).unwrap(),
			0,
			Some(XML),
		)
		.unwrap();

	registry
}

#[tokio::test]
#[traced_test]
async fn empty_buffer_is_unknown() {
	let mut builtin = Registry::new();
	formats::register_builtin(&mut builtin).unwrap();

	let mut greedy = Registry::new();
	greedy
		.register_with("application/octet-stream", always(Detection::Match), 0, None)
		.unwrap();

	for registry in [builtin, greedy, xml_registry()] {
		let resolver = Resolver::new(registry);
		assert_eq!(
			resolver.resolve_bytes(Vec::<u8>::new(), None).await.unwrap(),
			DetectionResult::Unknown
		);
	}
}

#[tokio::test]
#[traced_test]
async fn resolves_xml_dialects() {
	let resolver = Resolver::new(xml_registry());

	let cases = [
		(
			&b"<wfs xmlns=\"http://www.opengis.net/gml\"><member/></wfs>"[..],
			GML,
		),
		(&b"<?xml version=\"1.0\"?>\n<state><layers/></state>"[..], STATE),
		(&b"<foo/>"[..], XML),
	];

	for (bytes, expected) in cases {
		assert_eq!(
			resolver.resolve_bytes(bytes, None).await.unwrap(),
			identity(expected)
		);
	}

	assert_eq!(
		resolver
			.resolve_bytes(&b"no markup here"[..], None)
			.await
			.unwrap(),
		DetectionResult::Unknown
	);
}

#[tokio::test]
#[traced_test]
async fn resolves_gpx() {
	let mut registry = Registry::new();
	registry.register_with(XML, XmlRootDetector, 0, None).unwrap();
	registry
		.register_with(
			"application/xml; subtype=GPX",
			XmlDialectDetector::new("^gpx$", None).unwrap(),
			0,
			Some(XML),
		)
		.unwrap();

	let resolution = Resolver::new(registry)
		.resolve_path(MemorySource::new(
			&b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<gpx version=\"1.1\" creator=\"test\">\n<trk/></gpx>"[..],
		))
		.await
		.unwrap();

	assert_eq!(resolution.result, identity("application/xml; subtype=GPX"));
	assert_eq!(
		resolution.path,
		[
			FormatIdentity::from(XML),
			FormatIdentity::from("application/xml; subtype=GPX")
		]
	);
}

#[tokio::test]
#[traced_test]
async fn children_need_their_parent_to_match() {
	let mut registry = xml_registry();
	registry
		.register_with("never", always(Detection::NoMatch), 10, None)
		.unwrap();
	registry
		.register_with("eager-child", always(Detection::Match), 0, Some("never"))
		.unwrap();

	let resolver = Resolver::new(registry);

	assert_eq!(
		resolver.resolve_bytes(&b"<foo/>"[..], None).await.unwrap(),
		identity(XML)
	);
	assert_eq!(
		resolver.resolve_bytes(&b"plain text"[..], None).await.unwrap(),
		DetectionResult::Unknown
	);
}

#[tokio::test]
#[traced_test]
async fn priority_wins_regardless_of_registration_order_and_timing() {
	let mut rng = rand::thread_rng();

	for round in 0..20 {
		let mut children = vec![("low", 1), ("high", 5), ("mid", 3), ("lowest", -2)];
		children.shuffle(&mut rng);
		info!(round, ?children, "Registering shuffled siblings");

		let mut registry = Registry::new();
		registry
			.register_with("root", always(Detection::Match), 0, None)
			.unwrap();

		for (id, priority) in children {
			registry
				.register(
					FormatNode::new(
						id,
						DelayedDetector::new(Detection::Match, Duration::from_millis(5)),
					)
					.with_parent("root")
					.with_priority(priority),
				)
				.unwrap();
		}

		let resolver = Resolver::new(registry);
		assert_eq!(
			resolver.resolve_bytes(&b"whatever"[..], None).await.unwrap(),
			identity("high")
		);

		let sequential = resolver.clone().with_config(DetectorConfig {
			concurrent_siblings: false,
			..DetectorConfig::default()
		});
		assert_eq!(
			sequential.resolve_bytes(&b"whatever"[..], None).await.unwrap(),
			identity("high")
		);
	}
}

#[tokio::test]
#[traced_test]
async fn equal_priorities_go_to_the_first_registered() {
	let mut registry = Registry::new();
	registry
		.register_with("root", always(Detection::Match), 0, None)
		.unwrap();
	registry
		.register(
			FormatNode::new(
				"first",
				DelayedDetector::new(Detection::Match, Duration::from_millis(10)),
			)
			.with_parent("root"),
		)
		.unwrap();
	registry
		.register_with("second", always(Detection::Match), 0, Some("root"))
		.unwrap();

	assert_eq!(
		Resolver::new(registry)
			.resolve_bytes(&b"whatever"[..], None)
			.await
			.unwrap(),
		identity("first")
	);
}

#[tokio::test]
#[traced_test]
async fn resolution_is_idempotent() {
	let resolver = Resolver::new(xml_registry());
	let bytes = &b"<gml:FeatureCollection xmlns:gml=\"http://www.opengis.net/gml\"/>"[..];

	let first = resolver.resolve_bytes(bytes, None).await.unwrap();
	for _ in 0..5 {
		assert_eq!(resolver.resolve_bytes(bytes, None).await.unwrap(), first);
	}
}

#[tokio::test]
#[traced_test]
async fn dangling_parent_is_reported_and_never_selected() {
	let mut registry = xml_registry();
	registry
		.register_with("orphan", always(Detection::Match), 100, Some("missing"))
		.unwrap();

	let resolver = Resolver::new(registry);

	assert_eq!(
		resolver.resolve_bytes(&b"<foo/>"[..], None).await.unwrap(),
		identity(XML)
	);

	let diagnostics = resolver.registry().diagnostics();
	assert_eq!(diagnostics.len(), 1);
	assert!(matches!(
		&diagnostics[0],
		RegistrationError::DanglingParent { identity, parent }
			if identity == "orphan" && parent == "missing"
	));
	assert!(logs_contain("was never registered"));
}

#[tokio::test]
#[traced_test]
async fn faulty_detectors_count_as_no_match() {
	let mut registry = xml_registry();
	registry
		.register(
			FormatNode::new("application/xml; subtype=BOOM", PanickingDetector)
				.with_parent(XML)
				.with_priority(10),
		)
		.unwrap();
	registry
		.register(
			FormatNode::new("application/xml; subtype=BROKEN", FaultingDetector)
				.with_parent(XML)
				.with_priority(5),
		)
		.unwrap();

	let resolver = Resolver::new(registry);

	assert_eq!(
		resolver.resolve_bytes(&b"<state/>"[..], None).await.unwrap(),
		identity(STATE)
	);
	assert!(logs_contain("Detector panicked"));
	assert!(logs_contain("corrupted lookup table"));
}

#[tokio::test]
#[traced_test]
async fn undecided_sibling_with_precedence_is_indeterminate() {
	let mut registry = Registry::new();
	registry
		.register_with("undecided", always(Detection::Indeterminate), 10, None)
		.unwrap();
	registry
		.register_with("matching", always(Detection::Match), 0, None)
		.unwrap();
	registry
		.register_with("trailing", always(Detection::Indeterminate), -10, None)
		.unwrap();

	let resolution = Resolver::new(registry)
		.resolve_path(MemorySource::new(&b"bytes"[..]))
		.await
		.unwrap();
	assert_eq!(resolution.result, DetectionResult::Indeterminate);
	assert!(resolution.path.is_empty());

	// A match ahead of the undecided node settles it
	let mut registry = Registry::new();
	registry
		.register_with("matching", always(Detection::Match), 10, None)
		.unwrap();
	registry
		.register_with("undecided", always(Detection::Indeterminate), 0, None)
		.unwrap();

	assert_eq!(
		Resolver::new(registry)
			.resolve_bytes(&b"bytes"[..], None)
			.await
			.unwrap(),
		identity("matching")
	);
}

#[tokio::test]
#[traced_test]
async fn undecided_child_keeps_the_matched_path() {
	let mut registry = xml_registry();
	registry
		.register_with(
			"application/xml; subtype=SLOW",
			always(Detection::Indeterminate),
			1,
			Some(XML),
		)
		.unwrap();

	let resolution = Resolver::new(registry)
		.resolve_path(MemorySource::new(&b"<state/>"[..]))
		.await
		.unwrap();

	assert_eq!(resolution.result, DetectionResult::Indeterminate);
	assert_eq!(resolution.path, [FormatIdentity::from(XML)]);
}

#[tokio::test]
#[traced_test]
async fn cancelled_source_is_indeterminate() {
	let resolver = Resolver::new(xml_registry()).with_config(DetectorConfig {
		sniff_window: 16,
		..DetectorConfig::default()
	});

	let result = resolver
		.resolve(CancellingSource {
			prefix: (&b"<?xml version=\"1.0\"?><!-- long comment --><state/>"[..]).into(),
		})
		.await
		.unwrap();

	assert_eq!(result, DetectionResult::Indeterminate);
}

#[tokio::test]
#[traced_test]
async fn overall_timeout_is_indeterminate() {
	let resolver = Resolver::new(xml_registry()).with_config(DetectorConfig {
		timeout_ms: Some(50),
		..DetectorConfig::default()
	});

	assert_eq!(
		resolver.resolve(StalledSource).await.unwrap(),
		DetectionResult::Indeterminate
	);
	assert!(logs_contain("Format detection timed out"));
}

#[tokio::test]
#[traced_test]
async fn small_windows_grow_on_demand() {
	let resolver = Resolver::new(xml_registry()).with_config(DetectorConfig {
		sniff_window: 8,
		read_chunk: 8,
		..DetectorConfig::default()
	});

	let mut document = b"<?xml version=\"1.0\"?>\n<!--".to_vec();
	document.extend(std::iter::repeat(b'x').take(200));
	document.extend_from_slice(b"-->\n<state version=\"2\"/>");

	assert_eq!(
		resolver.resolve_bytes(document, None).await.unwrap(),
		identity(STATE)
	);
}

#[tokio::test]
#[traced_test]
async fn zero_read_chunk_still_finishes() {
	let resolver = Resolver::new(xml_registry()).with_config(DetectorConfig {
		sniff_window: 4,
		read_chunk: 0,
		..DetectorConfig::default()
	});
	assert_eq!(resolver.config().read_chunk, 1);

	let result = tokio::time::timeout(
		Duration::from_secs(3),
		resolver.resolve_bytes(&b"<?xml version=\"1.0\"?><a/>"[..], None),
	)
	.await
	.expect("resolution never finished")
	.unwrap();

	assert_eq!(result, identity(XML));
	assert!(logs_contain("Adjusting detection config"));
}

#[tokio::test]
#[traced_test]
async fn empty_registry_is_an_error() {
	let resolver = Resolver::new(Registry::new());

	assert!(matches!(
		resolver.resolve_bytes(&b"<foo/>"[..], None).await,
		Err(ResolveError::EmptyRegistry)
	));
}
