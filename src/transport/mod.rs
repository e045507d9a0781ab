// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP transport: connection pool, token manager and the request
//! executor that composes the resilience stack.

pub mod auth;
pub mod executor;
pub mod pool;

pub use executor::{ApiExecutor, ApiRequest, ApiResponse, HttpExecutor};
