use camino::Utf8PathBuf;
use protomig_proto::SkippedLine;
use thiserror::Error;

use crate::{SolverError, TranslateError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error type of a failed statement, whatever ran it.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not connect to postgres: {0}")]
    Connection(#[source] tokio_postgres::Error),

    #[error("{source_name}: {} malformed line(s), first at {}", .skipped.len(), first_skipped(.skipped))]
    Parse {
        source_name: String,
        skipped: Vec<SkippedLine>,
    },

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error("migration plan is invalid: {0}")]
    Plan(#[from] SolverError),

    #[error("schema introspection failed: {0}")]
    Introspection(#[source] tokio_postgres::Error),

    #[error("transaction failed: {0}")]
    Transaction(#[source] tokio_postgres::Error),

    #[error("statement failed: {statement}: {source}")]
    Execution {
        statement: String,
        #[source]
        source: BoxError,
    },

    #[error("{path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn first_skipped(skipped: &[SkippedLine]) -> String {
    skipped
        .first()
        .map(ToString::to_string)
        .unwrap_or_else(|| "<none>".to_string())
}
