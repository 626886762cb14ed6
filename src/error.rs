use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::task::TaskState;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed DOCX package: {0}")]
    MalformedPackage(String),

    #[error("style inheritance cycle through '{style_id}'")]
    StyleCycle { style_id: String },

    #[error("image '{0}' is not part of the media set")]
    MissingMedia(String),

    #[error("unknown task '{0}'")]
    UnknownTask(String),

    #[error("task '{id}' is {state}, expected uploaded")]
    InvalidState { id: String, state: TaskState },

    #[error("task '{id}' is {state}, not ready for download")]
    NotReady { id: String, state: TaskState },

    #[error("conversion did not finish within {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("not a DOCX file: {0}")]
    InvalidFormat(String),

    #[error("invalid conversion options: {0}")]
    InvalidOptions(String),

    #[error("template: {0}")]
    Template(String),

    #[error("conversion worker stopped before reporting a result")]
    WorkerLost,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("zip: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("options: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<roxmltree::Error> for Error {
    fn from(e: roxmltree::Error) -> Self {
        Error::MalformedPackage(format!("XML parse error: {e}"))
    }
}

/// The failure category a task records once it lands in `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedPackage,
    StyleCycle,
    MissingMedia,
    UnknownTask,
    InvalidState,
    NotReady,
    Timeout,
    InvalidFormat,
    InvalidOptions,
    InvalidTemplate,
    Internal,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedPackage(_) => ErrorKind::MalformedPackage,
            Error::StyleCycle { .. } => ErrorKind::StyleCycle,
            Error::MissingMedia(_) => ErrorKind::MissingMedia,
            Error::UnknownTask(_) => ErrorKind::UnknownTask,
            Error::InvalidState { .. } => ErrorKind::InvalidState,
            Error::NotReady { .. } => ErrorKind::NotReady,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::InvalidFormat(_) => ErrorKind::InvalidFormat,
            Error::InvalidOptions(_) => ErrorKind::InvalidOptions,
            Error::Template(_) => ErrorKind::InvalidTemplate,
            Error::WorkerLost => ErrorKind::Internal,
            Error::Io(_) | Error::Zip(_) | Error::Json(_) => ErrorKind::Io,
        }
    }
}
