pub mod binder;
pub mod cache;
pub mod coercion;
pub mod config;
pub mod conversion;
pub mod error;
pub mod mapper;
pub mod plan;
pub mod registry;
pub mod resolver;

pub use cache::TypeMetadataCache;
pub use config::MapperConfig;
pub use conversion::ConversionService;
pub use error::{BindError, ConfigError, ResolveError};
pub use mapper::RowMapper;
pub use plan::ConstructionPlan;
pub use resolver::{ConstructionPlanResolver, ResolveOptions};
