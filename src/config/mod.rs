use serde::{Deserialize, Deserializer};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use tracing::Level;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
	pub telemetry: TelemetryConfig,
	pub dicomweb: ResolverConfig,
}

#[derive(Debug, Error)]
pub enum AppConfigError {
	#[error(transparent)]
	Config(#[from] config::ConfigError),
	#[error("wado_root `{wado_root}` is not a valid URL: {source}")]
	InvalidWadoRoot {
		wado_root: String,
		source: url::ParseError,
	},
}

impl AppConfig {
	/// Loads the configuration from the embedded defaults, an optional `config.toml` in the working
	/// directory and `BULKDATA_URL_*` environment variables, in that order of precedence.
	///
	/// # Errors
	/// Returns an [`AppConfigError`] if a source cannot be read or the `wado_root` is not a URL.
	pub fn new() -> Result<Self, AppConfigError> {
		use config::Config;
		let s = Config::builder()
			.add_source(config::File::from_str(
				include_str!("defaults.toml"),
				config::FileFormat::Toml,
			))
			.add_source(config::File::with_name("config.toml").required(false))
			.add_source(
				config::Environment::with_prefix("BULKDATA_URL")
					.prefix_separator("_")
					.separator("__"),
			)
			.build()?;

		let mut config: Self = s.try_deserialize()?;
		config.dicomweb.validate()?;
		Ok(config)
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
	// Configurable logging level. Also configurable via env vars RUST_LOG and BULKDATA_URL_TELEMETRY__LEVEL
	pub level: String,
}

impl TelemetryConfig {
	pub fn level(&self) -> Level {
		self.level.parse().unwrap_or(Level::INFO)
	}
}

/// Settings shared by every resolution of a viewer session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResolverConfig {
	/// Base URL of the DICOMweb server, e.g. `http://localhost:8080/dicomweb`.
	pub wado_root: String,
	#[serde(default)]
	pub singlepart: Singlepart,
}

impl ResolverConfig {
	pub fn new(wado_root: impl Into<String>, singlepart: Singlepart) -> Self {
		Self {
			wado_root: wado_root.into().trim_end_matches('/').to_owned(),
			singlepart,
		}
	}

	/// Checks that the `wado_root` is an absolute URL and strips its trailing slash.
	///
	/// # Errors
	/// Returns [`AppConfigError::InvalidWadoRoot`] if the `wado_root` cannot be parsed.
	pub fn validate(&mut self) -> Result<(), AppConfigError> {
		url::Url::parse(&self.wado_root).map_err(|source| AppConfigError::InvalidWadoRoot {
			wado_root: self.wado_root.clone(),
			source,
		})?;
		self.wado_root = self.wado_root.trim_end_matches('/').to_owned();
		Ok(())
	}
}

/// Controls which part types may be addressed through a single-part direct URL instead of being
/// fetched as binary and exposed as an object URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Singlepart {
	#[default]
	Disabled,
	All,
	Parts(Vec<String>),
}

impl Singlepart {
	pub fn allows(&self, fetch_part: &str) -> bool {
		match self {
			Self::Disabled => false,
			Self::All => true,
			Self::Parts(parts) => parts.iter().any(|part| part == fetch_part),
		}
	}

	/// Parses a comma separated list of part types. An empty string disables single-part retrieval.
	pub fn from_list(list: &str) -> Self {
		let parts: Vec<String> = list
			.split(',')
			.map(str::trim)
			.filter(|part| !part.is_empty())
			.map(str::to_owned)
			.collect();

		if parts.is_empty() {
			Self::Disabled
		} else {
			Self::Parts(parts)
		}
	}
}

impl From<bool> for Singlepart {
	fn from(enabled: bool) -> Self {
		if enabled {
			Self::All
		} else {
			Self::Disabled
		}
	}
}

impl Display for Singlepart {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Disabled => write!(f, "false"),
			Self::All => write!(f, "true"),
			Self::Parts(parts) => write!(f, "{}", parts.join(",")),
		}
	}
}

/// Accepts `true`, `false` or a comma separated list of part types.
impl FromStr for Singlepart {
	type Err = Infallible;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(match s.trim() {
			"true" => Self::All,
			"false" => Self::Disabled,
			list => Self::from_list(list),
		})
	}
}

impl<'de> Deserialize<'de> for Singlepart {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		#[derive(Deserialize)]
		#[serde(untagged)]
		enum Raw {
			Flag(bool),
			List(String),
			Parts(Vec<String>),
		}

		Ok(match Raw::deserialize(deserializer)? {
			Raw::Flag(enabled) => Self::from(enabled),
			// Environment variables arrive as strings
			Raw::List(list) => match list.parse() {
				Ok(singlepart) => singlepart,
				Err(infallible) => match infallible {},
			},
			Raw::Parts(parts) => Self::Parts(parts),
		})
	}
}
