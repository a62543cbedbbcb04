pub mod context;
pub mod handle;
pub mod id;
pub mod model;
pub mod quality;
pub mod registry;

mod error;

pub use error::Error;
pub use handle::TraceHandle;
pub use model::{
	Decision, DecisionData, GENERATOR, RunMetadata, SCHEMA_VERSION, Stage, Trace, TraceStatus,
};
pub use quality::QualityReading;
pub use registry::{ComponentRegistry, ComponentSchema, TraceComponent};

pub type Result<T, E = Error> = std::result::Result<T, E>;
