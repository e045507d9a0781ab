//! # gridsql
//!
//! A SQL and ORM-style adapter for the Feishu Bitable ("Base") REST API.
//!
//! ## Architecture
//!
//! Every statement, whether SQL text or an ORM-built query, is normalised into
//! a command AST, translated into REST calls, and pushed through a
//! resilient request pipeline:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Front Ends                            │
//! │  • SQL parser (SELECT/INSERT/UPDATE/DELETE/SHOW/...)        │
//! │  • Record bridge (adapter-backed ORM CRUD)                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                     (command AST / query tree)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Translation                           │
//! │  • Descriptor lookups (TTL cached per client)               │
//! │  • WHERE → remote filter DSL, ORDER BY → sort spec          │
//! │  • Bidirectional field value conversion by type code        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                        (API requests)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Request Pipeline                        │
//! │  • Token bucket admission                                   │
//! │  • Auto-refreshing tenant/user access token                 │
//! │  • Circuit breaker → connection pool → HTTP                 │
//! │  • Exponential-backoff retry over classified errors         │
//! │  • Paginator across opaque page tokens                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gridsql::{Client, Config, Query};
//!
//! #[tokio::main]
//! async fn main() -> gridsql::Result<()> {
//!     let config = Config {
//!         app_id: "cli_xxxxxxxx".into(),
//!         app_secret: "your-app-secret-here".into(),
//!         app_token: "bascnXXXXXXXX".into(),
//!         ..Config::default()
//!     };
//!     let client = Client::connect(config).await?;
//!
//!     // SQL front end
//!     let result = client
//!         .statements()
//!         .execute_sql("SELECT name, age FROM users WHERE age > 18 LIMIT 10")
//!         .await?;
//!     println!("{} rows", result.rows.len());
//!
//!     // ORM-style front end
//!     let adults = client
//!         .bridge()
//!         .find("users", &Query::new().field_gt("age", 18))
//!         .await?;
//!     println!("{} adults", adults.len());
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`client`]: the root handle owning the whole pipeline
//! - [`sql`]: command AST and the regex-driven parser
//! - [`bridge`]: ORM record bridge behind the [`bridge::RecordAdapter`] seam
//! - [`exec`]: statement executor (aggregates, SHOW/DESCRIBE, bulk raw ops)
//! - [`filter`] / [`query`]: predicate translation into the remote filter DSL
//! - [`model`]: field type registry and value conversion
//! - [`resilience`]: token bucket, circuit breaker, retry
//! - [`transport`]: connection pool, token manager, request executor
//! - [`paginator`]: full result sets across opaque page tokens
//! - [`migrator`]: host schema reconciliation
//!
//! There are no transactions (the remote API cannot roll back), no JOINs
//! or subqueries, and no offline record caching.

pub mod bridge;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod exec;
pub mod filter;
pub mod metrics;
pub mod migrator;
pub mod model;
pub mod paginator;
pub mod protocol;
pub mod query;
pub mod resilience;
pub mod security;
pub mod sql;
pub mod transport;

pub use bridge::{apply_record, Bridge, FieldRole, RecordAdapter, Transaction};
pub use client::{Client, ClientStats};
pub use config::{AuthMode, Config};
pub use error::{Error, ErrorKind, Result};
pub use exec::{StatementExecutor, StatementResult, Warning};
pub use migrator::{HostType, Migrator, SchemaField, TableSchema};
pub use model::{Field, FieldType, FieldValue, Record, Table};
pub use paginator::Paginator;
pub use protocol::{FilterCondition, FilterOperator, FilterRequest};
pub use query::Query;
pub use sql::{parser::parse, Statement, StatementKind};
