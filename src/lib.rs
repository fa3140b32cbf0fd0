pub mod config;
pub mod contract;
pub mod logging;
pub mod permissions;
pub mod types;

pub use config::RunnerConfig;
pub use contract::builtin::{default_plan, register_contract_types};
pub use contract::{ContractRunner, RequestSpec, RunReport, TestOutcome, TestSpec};
pub use logging::{LogLevel, Logger};
pub use permissions::{generate_permission_schema, register_permission_schema};
pub use types::{optional, Constraint, TypeDef, TypeRegistry};
