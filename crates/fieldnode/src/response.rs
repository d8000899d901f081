use alloc::borrow::Cow;
use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;

/// Outcome of a single command item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The item was processed correctly.
    Success,
    /// The item could not be processed.
    Fail,
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Success => "success",
            Self::Fail => "fail",
        }
        .fmt(f)
    }
}

/// The result of a single command item.
///
/// The `uuid` is echoed verbatim from the command item, even when it is
/// malformed, so that a server can always attribute the result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct ResultEntry {
    /// The identifier of the entity the item refers to.
    pub uuid: String,
    /// Outcome.
    pub status: Status,
    /// Details about a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ResultEntry {
    /// Generates a successful [`ResultEntry`].
    #[must_use]
    #[inline]
    pub fn success(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            status: Status::Success,
            detail: None,
        }
    }

    /// Generates a failed [`ResultEntry`] along with its details.
    #[must_use]
    #[inline]
    pub fn fail(uuid: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            status: Status::Fail,
            detail: Some(detail.into()),
        }
    }

    /// Returns whether the item was processed correctly.
    #[must_use]
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// Per-action result arrays of either the peripheral or the task category.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct ActionResults {
    /// Results of `add` items.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<ResultEntry>,
    /// Results of `remove` items.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<ResultEntry>,
    /// Results of `start` items.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub start: Vec<ResultEntry>,
    /// Results of `stop` items.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<ResultEntry>,
}

impl ActionResults {
    /// Creates empty [`ActionResults`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            add: Vec::new(),
            remove: Vec::new(),
            start: Vec::new(),
            stop: Vec::new(),
        }
    }

    /// Returns whether there are no results at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.start.is_empty() && self.stop.is_empty()
    }
}

/// A message collecting the results of a command envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct ResultMessage {
    /// The request identifier of the originating envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Peripheral results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peripheral: Option<ActionResults>,
    /// Task results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<ActionResults>,
}

impl ResultMessage {
    /// Creates an empty [`ResultMessage`] for the given request.
    #[must_use]
    pub const fn new(request_id: Option<String>) -> Self {
        Self {
            request_id,
            peripheral: None,
            task: None,
        }
    }

    /// Attaches peripheral results, skipping empty ones.
    #[must_use]
    #[inline]
    pub fn peripheral(mut self, results: ActionResults) -> Self {
        if !results.is_empty() {
            self.peripheral = Some(results);
        }
        self
    }

    /// Attaches task results, skipping empty ones.
    #[must_use]
    #[inline]
    pub fn task(mut self, results: ActionResults) -> Self {
        if !results.is_empty() {
            self.task = Some(results);
        }
        self
    }

    /// Returns whether no results are attached.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.peripheral.is_none() && self.task.is_none()
    }
}

/// A message reporting an envelope which could not be processed at all,
/// for example because it was malformed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct ErrorMessage<'a> {
    /// The component which rejected the envelope.
    pub context: Cow<'a, str>,
    /// Error description.
    pub message: Cow<'a, str>,
    /// The request identifier, when it could be recovered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Cow<'a, str>>,
}

impl<'a> ErrorMessage<'a> {
    /// Generates an [`ErrorMessage`].
    #[must_use]
    #[inline]
    pub fn new(context: impl Into<Cow<'a, str>>, message: impl Into<Cow<'a, str>>) -> Self {
        Self {
            context: context.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// Attaches a request identifier.
    #[must_use]
    #[inline]
    pub fn request_id(mut self, request_id: impl Into<Cow<'a, str>>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}
