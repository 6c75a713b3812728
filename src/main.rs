use anyhow::Context;
use clap::Parser;
use dicom_bulkdata_url::config::AppConfig;
use dicom_bulkdata_url::metadata::naturalize::load_instances;
use dicom_bulkdata_url::resolver::{BulkDataUrlResolver, RequestParams};
use dicom_bulkdata_url::types::{Keyword, PIXEL_DATA};
use dicom_bulkdata_url::Singlepart;
use mime::Mime;
use std::path::PathBuf;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Print direct URLs for a bulk-data attribute of every instance in a WADO-RS metadata document
#[derive(Debug, Parser)]
#[command(
	version,
	after_help = "Inline binary content is printed as a blob: object URL. Object URLs refer to memory \
	              of this process and cannot be loaded after it exits."
)]
struct App {
	/// Metadata document, either DICOM JSON or naturalized JSON
	metadata: PathBuf,
	/// Keyword of the attribute to resolve
	#[arg(long, default_value = PIXEL_DATA)]
	tag: Keyword,
	/// Path appended to the instance resource if the attribute has no BulkDataURI
	#[arg(long = "default-path", default_value = "/pixeldata")]
	default_path: String,
	/// Media type to request
	#[arg(long = "default-type", default_value = "video/mp4")]
	default_type: Mime,
	/// Part type checked against the singlepart setting
	#[arg(long = "fetch-part", default_value = "video")]
	fetch_part: String,
	/// Return this URL as-is
	#[arg(long)]
	url: Option<String>,
	/// Override the configured DICOMweb base URL
	#[arg(long = "wado-root")]
	wado_root: Option<String>,
	/// Override the configured singlepart setting (true, false or a comma separated list)
	#[arg(long)]
	singlepart: Option<Singlepart>,
}

fn init_logger(level: tracing::Level) {
	tracing_subscriber::registry()
		.with(
			tracing_subscriber::fmt::layer()
				.compact()
				.with_ansi(true)
				.with_file(false)
				.with_line_number(false)
				.with_target(false)
				.with_writer(std::io::stderr),
		)
		.with(
			EnvFilter::builder()
				.with_default_directive(LevelFilter::from_level(level).into())
				.from_env_lossy(),
		)
		.init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	let app = App::parse();
	let config = AppConfig::new()?;
	init_logger(config.telemetry.level());

	let succeeded = tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()?
		.block_on(async move {
			match run(app, config).await {
				Ok(()) => true,
				Err(error) => {
					error!("Failed to resolve bulk data URLs: {error:#}");
					false
				}
			}
		});

	if !succeeded {
		std::process::exit(1);
	}
	Ok(())
}

async fn run(app: App, mut config: AppConfig) -> anyhow::Result<()> {
	if let Some(wado_root) = app.wado_root {
		config.dicomweb.wado_root = wado_root;
	}
	if let Some(singlepart) = app.singlepart {
		config.dicomweb.singlepart = singlepart;
	}
	config.dicomweb.validate()?;

	let document = tokio::fs::read(&app.metadata)
		.await
		.with_context(|| format!("Failed to read {}", app.metadata.display()))?;
	let document = serde_json::from_slice(&document)
		.with_context(|| format!("{} is not valid JSON", app.metadata.display()))?;
	let instances = load_instances(document)?;
	info!(
		instances = instances.len(),
		wado_root = config.dicomweb.wado_root,
		singlepart = %config.dicomweb.singlepart,
		"Loaded instance metadata"
	);

	let resolver = BulkDataUrlResolver::new(config.dicomweb).with_default_fallbacks();
	let mut params = RequestParams::default()
		.with_tag(app.tag)
		.with_default_path(app.default_path)
		.with_default_type(app.default_type)
		.with_fetch_part(app.fetch_part);
	params.url = app.url;

	for instance in &instances {
		match resolver.resolve_url(instance, &params).await? {
			Some(url) => {
				if url.starts_with("blob:") {
					warn!(
						sop_instance_uid = instance.sop_instance_uid,
						url,
						"Object URL is only valid while this process is running"
					);
				}
				println!("{}\t{url}", instance.sop_instance_uid);
			}
			None => warn!(
				sop_instance_uid = instance.sop_instance_uid,
				tag = params.tag,
				"No URL available"
			),
		}
	}

	Ok(())
}
