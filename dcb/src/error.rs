use thiserror::Error;

/// Rejections produced while validating input before any I/O takes place.
///
/// A batch is validated as a whole: the first invalid member fails the
/// entire append.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The event type is empty.
    #[error("event type cannot be empty")]
    EmptyEventType,
    /// The event type exceeds the maximum length.
    #[error("event type `{event_type}` exceeds {max} bytes")]
    EventTypeTooLong { event_type: String, max: usize },
    /// The event carries no tags.
    #[error("event of type `{event_type}` carries no tags")]
    NoTags { event_type: String },
    /// The tag key is empty or contains reserved characters.
    #[error("invalid tag key `{0}`")]
    InvalidTagKey(String),
    /// The tag value is empty, too long, or contains control characters.
    #[error("invalid value for tag key `{key}`: {reason}")]
    InvalidTagValue { key: String, reason: String },
    /// The wire form of a tag is not `key:value`.
    #[error("malformed tag `{0}`, expected `key:value`")]
    MalformedTag(String),
    /// The same tag appears twice on one event.
    #[error("duplicate tag `{0}`")]
    DuplicateTag(String),
    /// The batch contains no events.
    #[error("event batch is empty")]
    EmptyBatch,
    /// The batch exceeds the configured maximum size.
    #[error("batch of {len} events exceeds the maximum of {max}")]
    BatchTooLarge { len: usize, max: usize },
    /// The event payload exceeds the configured maximum size.
    #[error("payload of {size} bytes exceeds the maximum of {max}")]
    PayloadTooLarge { size: usize, max: usize },
    /// Two projectors in the same set share an id.
    #[error("duplicate projector id `{0}`")]
    DuplicateProjectorId(String),
}
