//! # warden-di
//!
//! Dependency injection container with lifetime-aware resolution, plus a
//! plugin host that extends authentication flows.
//!
//! ## Features
//!
//! - **Lifetimes**: Singleton, Scoped and Transient services
//! - **Typed tokens**: [`Token<T>`] pins the resolved type, including trait objects
//! - **Circular dependency detection**: errors carry the full cycle path
//! - **Validation**: missing dependencies, declared cycles and lifetime mismatches
//! - **Plugins**: dependency-ordered attach, isolated hook dispatch, best-effort cleanup
//!
//! ## Quick Start
//!
//! ```rust
//! use warden_di::{Container, ServiceDescriptor};
//! use std::sync::Arc;
//!
//! struct Database {
//!     connection_string: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let container = Container::new();
//! container.add_singleton("Database", Database {
//!     connection_string: "postgres://localhost".to_string(),
//! });
//! container.register(
//!     ServiceDescriptor::transient("UserService", |ctx| {
//!         Ok(Arc::new(UserService { db: ctx.get("Database")? }))
//!     })
//!     .depends_on("Database"),
//! );
//!
//! let users = container.get::<UserService>("UserService").unwrap();
//! assert_eq!(users.db.connection_string, "postgres://localhost");
//! assert!(container.validate_dependencies("UserService").is_empty());
//! ```
//!
//! ## Service Lifetimes
//!
//! - **Singleton**: Created once and shared across the entire container
//! - **Scoped**: Created once per [`Scope`]; without a scope, once per call
//! - **Transient**: Created fresh on every resolution
//!
//! ## Trait Objects
//!
//! ```rust
//! use warden_di::{Container, Token};
//! use std::sync::Arc;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, message: &str) -> String;
//! }
//!
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, message: &str) -> String {
//!         format!("[LOG] {}", message)
//!     }
//! }
//!
//! const LOGGER: Token<dyn Logger> = Token::new("Logger");
//!
//! let container = Container::new();
//! container.register_instance_by_token(LOGGER, Arc::new(ConsoleLogger) as Arc<dyn Logger>);
//! assert_eq!(container.get_by_token(LOGGER).unwrap().log("hi"), "[LOG] hi");
//! ```
//!
//! ## Authentication Plugins
//!
//! Register an [`AuthService`] under [`AUTH_SERVICE`], then compose a
//! [`FeatureAuthService`] with [`AuthModuleFactory::create_with_plugins`].
//! See `demos/auth_flow.rs` for a complete flow.

pub mod auth;
pub mod cancellation;
pub mod config;
pub mod container;
pub mod descriptors;
pub mod error;
pub mod key;
pub mod lifetime;
pub mod observer;
pub mod plugin;
pub mod registry;
pub mod validation;

mod internal;

pub use auth::{
    AuthError, AuthFailure, AuthModule, AuthModuleFactory, AuthOperation, AuthService, AuthSession,
    Credentials, FeatureAuthService, User, AUTH_SERVICE, FEATURE_AUTH_SERVICE, PLUGIN_MANAGER,
};
pub use cancellation::{CancellationError, CancellationToken};
pub use config::{
    AnalyticsConfig, AuthModuleConfig, ConfigError, ConfigSource, ConfigValue,
    EnvironmentConfigSource, JsonConfigSource, LogLevel, PluginManagerConfig, SecurityConfig,
};
pub use container::{Container, ResolverContext, Scope};
pub use descriptors::{Instance, ServiceDescriptor};
pub use error::{DependencyValidationError, DiError, DiResult, PluginError, PluginResult};
pub use key::{ServiceId, ServiceKey, Token};
pub use lifetime::Lifetime;
pub use observer::{ContainerObserver, CountingObserver, TracingObserver};
pub use plugin::{
    AnalyticsPlugin, AttachReport, AuthPlugin, CleanupReport, Hook, HookPayload, HookResults,
    InitReport, PluginManager, PluginMetadata, PluginState, SecurityPlugin,
};
pub use registry::{DependencyGraph, ServiceRegistry};
pub use validation::{ValidationError, ValidationReport, ValidationWarning};
