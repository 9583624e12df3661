use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use sd_format_detect::{
	formats, register_definitions, ConfigFile, DetectionResult, FileSource, FormatIdentity,
	Registry, Resolution, Resolver,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
	Human,
	Json,
}

#[derive(Parser, Debug)]
#[command(name = "sd-sniff", about = "Detect file formats from their contents")]
struct Cli {
	/// TOML file with detection settings and extra `[[format]]` definitions
	#[arg(long)]
	config: Option<PathBuf>,

	/// Skip the built-in format catalogue, only use formats from the config file
	#[arg(long, default_value_t = false)]
	no_builtin: bool,

	/// Output format
	#[arg(long, value_enum, default_value = "human")]
	format: OutputFormat,

	/// Files to inspect
	#[arg(required = true)]
	paths: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Report {
	path: PathBuf,
	#[serde(flatten)]
	result: DetectionResult,
	matched: Vec<FormatIdentity>,
	#[serde(skip_serializing_if = "Option::is_none")]
	error: Option<String>,
}

impl Report {
	fn print_human(&self) {
		if let Some(error) = &self.error {
			println!("{}: error: {error}", self.path.display());
			return;
		}

		if self.matched.len() > 1 {
			let matched = self
				.matched
				.iter()
				.map(FormatIdentity::as_str)
				.collect::<Vec<_>>()
				.join(" > ");
			println!("{}: {} ({matched})", self.path.display(), self.result);
		} else {
			println!("{}: {}", self.path.display(), self.result);
		}
	}
}

fn init_tracing() -> Result<()> {
	tracing_subscriber::registry()
		.with(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::new("sd_format_detect=info,sd_sniff=info")),
		)
		.with(
			fmt::layer()
				.with_target(true)
				.with_writer(std::io::stderr),
		)
		.try_init()
		.context("failed to initialize tracing")
}

fn build_resolver(cli: &Cli) -> Result<Resolver> {
	let config = cli
		.config
		.as_ref()
		.map(ConfigFile::load_from)
		.transpose()?
		.unwrap_or_default();

	let mut registry = Registry::new();
	if !cli.no_builtin {
		formats::register_builtin(&mut registry).context("failed to register built-in formats")?;
	}

	let added = register_definitions(&mut registry, config.formats)?;
	if added > 0 {
		info!(added, "Registered formats from config");
	}

	// Builds the index up front, so parent problems are logged before any file is read
	let problems = registry.diagnostics().len();
	if problems > 0 {
		info!(problems, "Some formats can never be reached");
	}

	Ok(Resolver::new(registry).with_config(config.detection))
}

async fn sniff(resolver: &Resolver, path: PathBuf) -> Result<Report> {
	let source = match FileSource::open(&path).await {
		Ok(source) => source,
		Err(e) => {
			return Ok(Report {
				path,
				result: DetectionResult::Unknown,
				matched: vec![],
				error: Some(e.to_string()),
			})
		}
	};

	let Resolution { result, path: matched } = resolver.resolve_path(source).await?;

	Ok(Report {
		path,
		result,
		matched,
		error: None,
	})
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	init_tracing()?;

	let resolver = build_resolver(&cli)?;

	let mut reports = Vec::with_capacity(cli.paths.len());
	for path in cli.paths {
		reports.push(sniff(&resolver, path).await?);
	}

	match cli.format {
		OutputFormat::Human => reports.iter().for_each(Report::print_human),
		OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
	}

	Ok(())
}
