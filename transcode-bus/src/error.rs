use thiserror::Error;

/// Errors surfaced synchronously to whoever drives an element.
///
/// Routing failures are not reported here: the stream is logged and dropped
/// (see [`crate::router::RouteError`]).
#[derive(Error, Debug)]
pub enum Error {
    /// No factory registered under this name.
    #[error("no element factory named '{0}'")]
    MissingElement(String),

    #[error("element factory '{0}' is already registered")]
    DuplicateFactory(String),

    #[error("element '{name}' is not a {expected}")]
    WrongElementType { name: String, expected: &'static str },

    /// A sub-element failed to come up while building a bin.
    #[error("failed to construct '{name}': {source}")]
    Construction {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("cannot change the profile of '{element}' while it is {state}")]
    ProfileLocked { element: String, state: String },

    #[error("'{0}' has no encoding profile")]
    NoProfile(String),

    #[error("invalid encoding profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },

    #[error("'{0}' has been torn down")]
    TornDown(String),
}

impl Error {
    pub fn construction(name: impl Into<String>, source: Error) -> Self {
        Self::Construction {
            name: name.into(),
            source: Box::new(source),
        }
    }

    pub fn invalid_profile(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProfile {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
