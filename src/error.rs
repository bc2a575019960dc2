use std::{io, sync::mpsc::SendError};

use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use walkdir::Error as WalkDirError;

#[cfg(feature = "service")]
use notify::{Error as NotifyError, ErrorKind as NotifyErrorKind};

use crate::event::FsMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum LDrawError {
    #[error("Circular reference: {}", chain.join(" -> "))]
    CircularReference { chain: Vec<String> },
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("Duplicate target name '{0}' within one document")]
    DuplicateTarget(String),
    #[error("Document is frozen and can no longer be modified")]
    Frozen,
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Operation cancelled by progress callback")]
    OperationCancelled,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Syntax error in {path} at line {line_number}: {message}. Line: '{line}'")]
    Syntax {
        path: String,
        line: String,
        line_number: usize,
        message: String,
    },
}

impl LDrawError {
    pub fn syntax(
        path: impl Into<String>,
        line: impl Into<String>,
        line_number: usize,
        message: impl Into<String>,
    ) -> Self {
        LDrawError::Syntax {
            path: path.into(),
            line: line.into(),
            line_number,
            message: message.into(),
        }
    }
}

impl From<toml::de::Error> for LDrawError {
    fn from(src: toml::de::Error) -> LDrawError {
        LDrawError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for LDrawError {
    fn from(src: toml::ser::Error) -> LDrawError {
        LDrawError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for LDrawError {
    fn from(src: JsonError) -> LDrawError {
        LDrawError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for LDrawError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => LDrawError::NotFound(format!("{x}")),
            _ => LDrawError::Io(format!("IOError: {}: {x}", x.kind())),
        }
    }
}

impl From<WalkDirError> for LDrawError {
    fn from(x: WalkDirError) -> Self {
        match x.path() {
            Some(path) => LDrawError::Io(format!("walkdir failed at {path:?}: {x}")),
            None => LDrawError::Io(format!("walkdir failed: {x}")),
        }
    }
}

impl From<SendError<Vec<FsMessage>>> for LDrawError {
    fn from(x: SendError<Vec<FsMessage>>) -> Self {
        LDrawError::Io(format!(
            "Channel send error, could not transmit {} filesystem messages",
            x.0.len()
        ))
    }
}

#[cfg(feature = "service")]
impl From<NotifyError> for LDrawError {
    fn from(notify_error: NotifyError) -> Self {
        match notify_error.kind {
            NotifyErrorKind::Generic(msg) => LDrawError::Custom(format!(
                "notify-debouncer: {}, paths: {:?}",
                msg, notify_error.paths
            )),
            NotifyErrorKind::Io(io_error) => LDrawError::Io(format!(
                "notify-debouncer: io error {}, paths: {:?}",
                io_error.kind(),
                notify_error.paths
            )),
            NotifyErrorKind::PathNotFound => LDrawError::NotFound(format!(
                "notify-debouncer: path(s) not found: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::WatchNotFound => LDrawError::NotFound(format!(
                "notify-debouncer: watch not found, paths: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::InvalidConfig(_) => {
                LDrawError::Custom("notify-debouncer invalid config".to_string())
            }
            NotifyErrorKind::MaxFilesWatch => {
                LDrawError::Custom("notify-debouncer max file watch limit reached".to_string())
            }
        }
    }
}
