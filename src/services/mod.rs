pub mod logger;
pub mod prompt;
pub mod registry;
pub mod remediation;
pub mod resolver;
pub mod trust;
pub mod validation;
