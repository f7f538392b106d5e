// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types for the cases a caller has to branch on.
//!
//! Drawing operations never use these: they report failure with `bool` or
//! `Option` and the compositor decides what to skip.

use lucarne_core::kernel::KernelParseError;

use crate::backend::BackendVersion;

/// A backend could not be created.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The target surface cannot be used by this backend.
    #[error("unsupported target: {0}")]
    UnsupportedTarget(String),

    /// Device or context creation failed.
    #[error("backend initialization failed: {0}")]
    InitFailed(String),
}

/// Backend lookup or construction through the registry failed.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No backend is registered under this name.
    #[error("unknown backend `{0}`")]
    UnknownBackend(String),

    /// A backend with this name is already registered.
    #[error("backend `{0}` is already registered")]
    DuplicateBackend(String),

    /// The backend implements an interface version the compositor cannot use.
    #[error("backend `{name}` implements interface {version}, compositor requires {required}")]
    IncompatibleBackend {
        /// Backend name.
        name: String,
        /// Interface version the backend implements.
        version: BackendVersion,
        /// Interface version required.
        required: BackendVersion,
    },

    /// The backend's constructor failed.
    #[error("failed to initialize backend `{name}`")]
    Init {
        /// Backend name.
        name: String,
        /// Underlying failure.
        #[source]
        source: BackendError,
    },
}

/// The compositor cannot continue.
#[derive(Debug, thiserror::Error)]
pub enum CompositorError {
    /// The screen-sized back buffer cannot be allocated.
    #[error("back buffer unavailable")]
    BackBufferUnavailable,

    /// Re-creating the backend after a device reset failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The options the compositor was started with are invalid.
    #[error(transparent)]
    Options(#[from] OptionsError),
}

/// Compositor options could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    /// The JSON document is malformed or has the wrong shape.
    #[error("invalid options document: {0}")]
    Json(#[from] serde_json::Error),

    /// The configured blur kernel does not parse.
    #[error("invalid blur kernel: {0}")]
    Kernel(#[from] KernelParseError),

    /// A numeric option is outside its allowed range.
    #[error("option `{field}` is out of range: {value}")]
    OutOfRange {
        /// Option name.
        field: &'static str,
        /// Offending value.
        value: f64,
    },
}
