use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub service: Service,
	pub storage: Storage,
	#[serde(default)]
	pub tracing: Tracing,
	#[serde(default)]
	pub calibration: Calibration,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	/// Root directory for trace artifacts and summaries, laid out as
	/// `<archive_root>/projects/<project>/_traces/`.
	pub archive_root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Postgres {
	pub dsn: String,
	#[serde(default = "default_pool_max_conns")]
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Tracing {
	#[serde(default = "default_enabled")]
	pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Calibration {
	/// Per-category scores strictly below this count as gaps.
	#[serde(default = "default_low_score_threshold")]
	pub low_score_threshold: f64,
	/// Trailing window for repeated-gap detection.
	#[serde(default = "default_recent_window_days")]
	pub recent_window_days: i32,
	/// Minimum recurrences inside the window before a flag fires.
	#[serde(default = "default_recent_failure_min")]
	pub recent_failure_min: i64,
	/// Minimum gap between a tag's average quality and the overall average.
	#[serde(default = "default_disparity_threshold")]
	pub disparity_threshold: f64,
	/// Upper end of the quality score scale, used only for rendering.
	#[serde(default = "default_quality_scale_max")]
	pub quality_scale_max: f64,
}

impl Default for Service {
	fn default() -> Self {
		Self { log_level: default_log_level() }
	}
}

impl Default for Tracing {
	fn default() -> Self {
		Self { enabled: default_enabled() }
	}
}

impl Default for Calibration {
	fn default() -> Self {
		Self {
			low_score_threshold: default_low_score_threshold(),
			recent_window_days: default_recent_window_days(),
			recent_failure_min: default_recent_failure_min(),
			disparity_threshold: default_disparity_threshold(),
			quality_scale_max: default_quality_scale_max(),
		}
	}
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_pool_max_conns() -> u32 {
	5
}

fn default_enabled() -> bool {
	true
}

fn default_low_score_threshold() -> f64 {
	2.0
}

fn default_recent_window_days() -> i32 {
	7
}

fn default_recent_failure_min() -> i64 {
	3
}

fn default_disparity_threshold() -> f64 {
	0.5
}

fn default_quality_scale_max() -> f64 {
	3.0
}
