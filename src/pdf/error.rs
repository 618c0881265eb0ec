//! Error types for document access, rendering and the wire boundary

use std::sync::Arc;

use super::request::RequestId;

/// Failure to open a document.
///
/// Codes 1-6 follow the native library's last-error numbering so a fault
/// can be carried across the bridge as a plain integer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpenError {
    #[error("unknown native error: {0}")]
    Unknown(String),

    #[error("file not found or could not be opened: {0}")]
    File(String),

    #[error("file is not a document or is corrupted: {0}")]
    Format(String),

    #[error("password required or incorrect password")]
    Password,

    #[error("unsupported security scheme")]
    UnsupportedSecurityScheme,

    #[error("page not found or content error: {0}")]
    Content(String),

    #[error("document was already closed")]
    AlreadyClosed,

    #[error("document failed to open earlier: {0}")]
    Failed(Box<OpenError>),
}

impl OpenError {
    pub const CODE_UNKNOWN: i32 = 1;
    pub const CODE_FILE: i32 = 2;
    pub const CODE_FORMAT: i32 = 3;
    pub const CODE_PASSWORD: i32 = 4;
    pub const CODE_SECURITY: i32 = 5;
    pub const CODE_CONTENT: i32 = 6;

    /// Numeric code used on the wire.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Unknown(_) | Self::AlreadyClosed => Self::CODE_UNKNOWN,
            Self::File(_) => Self::CODE_FILE,
            Self::Format(_) => Self::CODE_FORMAT,
            Self::Password => Self::CODE_PASSWORD,
            Self::UnsupportedSecurityScheme => Self::CODE_SECURITY,
            Self::Content(_) => Self::CODE_CONTENT,
            Self::Failed(inner) => inner.code(),
        }
    }

    /// Rebuilds an open error from a wire code, `None` for non-open codes.
    #[must_use]
    pub fn from_code(code: i32, message: &str) -> Option<Self> {
        let message = message.to_string();
        match code {
            Self::CODE_UNKNOWN => Some(Self::Unknown(message)),
            Self::CODE_FILE => Some(Self::File(message)),
            Self::CODE_FORMAT => Some(Self::Format(message)),
            Self::CODE_PASSWORD => Some(Self::Password),
            Self::CODE_SECURITY => Some(Self::UnsupportedSecurityScheme),
            Self::CODE_CONTENT => Some(Self::Content(message)),
            _ => None,
        }
    }
}

/// Failure while rendering or querying an open document.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("invalid slice dimensions for page {page}: {width}x{height}")]
    InvalidSlice { page: i32, width: i32, height: i32 },

    #[error("total dimensions are zero")]
    EmptyTarget,

    #[error("invalid target memory address")]
    InvalidAddress,

    #[error("target buffer {width}x{height} (stride {stride}) cannot hold {needed_width}x{needed_height}")]
    TargetTooSmall {
        width: i32,
        height: i32,
        stride: i32,
        needed_width: i32,
        needed_height: i32,
    },

    #[error("document is not open")]
    NotOpen,

    #[error("failed to load page {page}: {detail}")]
    Page { page: usize, detail: String },

    #[error("{message}")]
    Native { message: String, trace: String },

    #[error("wire protocol: {0}")]
    Wire(#[from] WireError),

    #[error("buffer pool: {0}")]
    Buffer(#[from] BufferError),
}

impl RenderError {
    pub fn native(message: impl Into<String>) -> Self {
        Self::Native {
            message: message.into(),
            trace: String::new(),
        }
    }
}

/// Malformed bytes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unexpected end of input: needed {needed} bytes at offset {offset}")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("negative list length {0}")]
    NegativeLength(i32),

    #[error("invalid tag {tag} for {what}")]
    InvalidTag { what: &'static str, tag: u8 },

    #[error("string is not valid UTF-8")]
    Utf8,

    #[error("{0} trailing bytes after message")]
    Trailing(usize),
}

/// Buffer pool failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("failed to allocate {bytes} bytes: {detail}")]
    Allocation { bytes: usize, detail: String },

    #[error("invalid buffer dimensions {width}x{height}")]
    InvalidDimensions { width: i32, height: i32 },

    #[error("unknown buffer {0}")]
    Unknown(u64),

    #[error("buffer {0} was disposed")]
    Disposed(u64),
}

/// Error surfaced to the presentation layer through the display state.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ViewError {
    #[error("could not open document: {0}")]
    Open(#[from] OpenError),

    #[error("render {id:?} failed: {source}")]
    Render {
        id: RequestId,
        #[source]
        source: RenderError,
    },

    #[error("rendered {painted} of {requested} pages")]
    Partial { painted: usize, requested: usize },
}

impl ViewError {
    /// Open failures are terminal for a document instance.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Open(_))
    }
}

pub type SharedViewError = Arc<ViewError>;
