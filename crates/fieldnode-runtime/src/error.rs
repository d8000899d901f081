use std::borrow::Cow;

use fieldnode::parameters::ParameterError;

/// All possible error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An object could not be constructed: malformed or missing parameters,
    /// an unknown type name, a hardware resource already taken, or a device
    /// which did not answer its probe.
    Construction,
    /// A capability call failed while the object was running.
    Runtime,
    /// A command could not be processed.
    Protocol,
    /// The device cannot recover on its own and must restart.
    Fatal,
    /// Persistent storage could not be read or written.
    Storage,
    /// The network could not be reached.
    Network,
    /// A hardware interface reported a failure.
    Hardware,
}

impl ErrorKind {
    const fn description(self) -> &'static str {
        match self {
            Self::Construction => "Construction",
            Self::Runtime => "Runtime",
            Self::Protocol => "Protocol",
            Self::Fatal => "Fatal",
            Self::Storage => "Storage",
            Self::Network => "Network",
            Self::Hardware => "Hardware",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.description().fmt(f)
    }
}

/// A runtime error.
///
/// The description is the human-readable text reported to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    description: Cow<'static, str>,
}

impl Error {
    /// Creates an [`Error`] from an [`ErrorKind`] and a description.
    #[must_use]
    #[inline]
    pub fn new(kind: ErrorKind, description: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    /// Creates a [`ErrorKind::Construction`] error.
    #[must_use]
    #[inline]
    pub fn construction(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Construction, description)
    }

    /// Creates a [`ErrorKind::Runtime`] error.
    #[must_use]
    #[inline]
    pub fn runtime(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Runtime, description)
    }

    /// Creates a [`ErrorKind::Protocol`] error.
    #[must_use]
    #[inline]
    pub fn protocol(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Protocol, description)
    }

    /// Creates a [`ErrorKind::Hardware`] error.
    #[must_use]
    #[inline]
    pub fn hardware(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Hardware, description)
    }

    /// Returns the [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Renders the error attributed to the component which raised it,
    /// as `<who>: <description>`.
    #[must_use]
    pub fn attributed(&self, who: &str) -> String {
        format!("{who}: {}", self.description)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.description.fmt(f)
    }
}

impl std::error::Error for Error {}

impl From<ParameterError> for Error {
    fn from(e: ParameterError) -> Self {
        Self::construction(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::protocol(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Storage, e.to_string())
    }
}

/// A specialized [`Result`] type for [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
