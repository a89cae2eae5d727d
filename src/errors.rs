//! Root-level error wiring: usage errors (bad CLI arguments, unreadable
//! config) versus runtime errors (everything `intelparser_core::IntelparserError`
//! already models), mapped to the three exit codes in §6/§7.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}

impl From<intelparser_core::IntelparserError> for AppError {
    fn from(err: intelparser_core::IntelparserError) -> Self {
        AppError::Runtime(err.into())
    }
}

impl AppError {
    /// 0 never reaches here (that's the `Ok` path); 1 for bad usage, 2 for
    /// everything else, per §6 "Exit codes: 0 success, 1 usage error, 2
    /// runtime error."
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Usage(_) => 1,
            AppError::Runtime(_) => 2,
        }
    }
}
