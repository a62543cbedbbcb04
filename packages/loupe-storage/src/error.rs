#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error(transparent)]
	Json(#[from] serde_json::Error),
	#[error("Failed to write {path:?}.")]
	Io { path: std::path::PathBuf, source: std::io::Error },
	#[error("Not found: {0}")]
	NotFound(String),
}
