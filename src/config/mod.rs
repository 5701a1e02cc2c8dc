// ABOUTME: Configuration module for the TableChat server
// ABOUTME: Re-exports the environment-driven config types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

pub mod environment;

pub use environment::{
    CacheConfig, CacheTtlConfig, LlmConfig, RateLimit, RedisConnectionConfig, ServerConfig,
};
