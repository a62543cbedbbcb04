#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid trace schema for {component:?}: {}.", errors.join(", "))]
	InvalidSchema { component: String, errors: Vec<String> },
}
