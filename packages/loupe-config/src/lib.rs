mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Calibration, Config, Postgres, Service, Storage, Tracing};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.archive_root.as_os_str().is_empty() {
		return Err(Error::Validation {
			message: "storage.archive_root must be non-empty.".to_string(),
		});
	}
	if cfg.calibration.recent_window_days <= 0 {
		return Err(Error::Validation {
			message: "calibration.recent_window_days must be greater than zero.".to_string(),
		});
	}
	if cfg.calibration.recent_failure_min <= 0 {
		return Err(Error::Validation {
			message: "calibration.recent_failure_min must be greater than zero.".to_string(),
		});
	}
	if !cfg.calibration.low_score_threshold.is_finite() {
		return Err(Error::Validation {
			message: "calibration.low_score_threshold must be a finite number.".to_string(),
		});
	}
	if !cfg.calibration.disparity_threshold.is_finite()
		|| cfg.calibration.disparity_threshold < 0.0
	{
		return Err(Error::Validation {
			message: "calibration.disparity_threshold must be a finite number of zero or greater."
				.to_string(),
		});
	}
	if !cfg.calibration.quality_scale_max.is_finite() || cfg.calibration.quality_scale_max <= 0.0 {
		return Err(Error::Validation {
			message: "calibration.quality_scale_max must be a finite number greater than zero."
				.to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.service.log_level.trim().is_empty() {
		cfg.service.log_level = "info".to_string();
	}
}
