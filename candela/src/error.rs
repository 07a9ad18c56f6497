use thiserror::Error;

use crate::OptionKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("couldn't create `{label}`: {reason}")]
    ResourceCreation { label: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown option: `{0}`")]
    UnknownOption(String),

    #[error("option `{name}` expects {expected:?}, got {got:?}")]
    MismatchedOption {
        name: String,
        expected: OptionKind,
        got: OptionKind,
    },

    #[error("couldn't dump `{label}`")]
    Dump {
        label: String,

        #[source]
        source: image::ImageError,
    },
}

impl Error {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }
}
