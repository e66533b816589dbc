//! Error handling for seqweave-core

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the aligners, the MUM finder and the assembler
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Bad symbols, or an empty sequence handed to an aligner
    #[error("Invalid sequence {id}: {message}")]
    InvalidSequence { id: String, message: String },

    /// An empty collection, or an empty MUM reference or query
    #[error("Empty input: {what}")]
    EmptyInput { what: String },

    #[error("Malformed similarity matrix at line {line}: {message}")]
    Format { line: usize, message: String },

    #[error("No score for symbol pair ({first}, {second}) in matrix {matrix}")]
    Lookup {
        matrix: String,
        first: char,
        second: char,
    },

    #[error("Insufficient input: {required} sequences required, {found} supplied")]
    InsufficientInput { required: usize, found: usize },

    #[error("No anchors found for query {query}")]
    NoAnchorsFound { query: String },

    #[error("{stage} did not converge after {passes} passes")]
    NonConvergence { stage: String, passes: usize },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    pub fn invalid_sequence<I: Into<String>, S: Into<String>>(id: I, message: S) -> Self {
        Self::InvalidSequence {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn empty_input<S: Into<String>>(what: S) -> Self {
        Self::EmptyInput { what: what.into() }
    }

    pub fn format<S: Into<String>>(line: usize, message: S) -> Self {
        Self::Format {
            line,
            message: message.into(),
        }
    }

    pub fn non_convergence<S: Into<String>>(stage: S, passes: usize) -> Self {
        Self::NonConvergence {
            stage: stage.into(),
            passes,
        }
    }

    /// True for errors caused by the caller's input rather than by the computation
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. }
                | Self::InvalidSequence { .. }
                | Self::EmptyInput { .. }
                | Self::Format { .. }
                | Self::InsufficientInput { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
