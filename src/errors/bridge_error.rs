use serde::Serialize;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeErrorKind {
    InvalidParams,
    NoIdentifier,
    NoHost,
    NotFound,
    ConnectFailed,
    IdentityMismatch,
    ChannelError,
    LocalNotFound,
    RemoteDirError,
    UploadError,
    MoveError,
    Cancelled,
    Internal,
}

impl BridgeErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            BridgeErrorKind::InvalidParams => "INVALID_PARAMS",
            BridgeErrorKind::NoIdentifier => "NO_IDENTIFIER",
            BridgeErrorKind::NoHost => "NO_HOST",
            BridgeErrorKind::NotFound => "NOT_FOUND",
            BridgeErrorKind::ConnectFailed => "CONNECT_FAILED",
            BridgeErrorKind::IdentityMismatch => "IDENTITY_MISMATCH",
            BridgeErrorKind::ChannelError => "CHANNEL_ERROR",
            BridgeErrorKind::LocalNotFound => "LOCAL_NOT_FOUND",
            BridgeErrorKind::RemoteDirError => "REMOTE_DIR_ERROR",
            BridgeErrorKind::UploadError => "UPLOAD_ERROR",
            BridgeErrorKind::MoveError => "MOVE_ERROR",
            BridgeErrorKind::Cancelled => "CANCELLED",
            BridgeErrorKind::Internal => "INTERNAL",
        }
    }

    /// Process exit status reported for a failure of this kind.
    pub fn exit_code(self) -> i32 {
        match self {
            BridgeErrorKind::Internal => 1,
            BridgeErrorKind::InvalidParams => 2,
            BridgeErrorKind::NoIdentifier => 3,
            BridgeErrorKind::NoHost => 4,
            BridgeErrorKind::NotFound => 5,
            BridgeErrorKind::ConnectFailed => 10,
            BridgeErrorKind::IdentityMismatch => 11,
            BridgeErrorKind::ChannelError => 12,
            BridgeErrorKind::LocalNotFound => 20,
            BridgeErrorKind::RemoteDirError => 21,
            BridgeErrorKind::UploadError => 22,
            BridgeErrorKind::MoveError => 23,
            BridgeErrorKind::Cancelled => 130,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BridgeError {
    pub kind: BridgeErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl BridgeError {
    pub fn new(kind: BridgeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Same message and hint, reclassified under another kind.
    /// Moves the error into `kind`. An interrupt stays an interrupt.
    pub fn reclassify(mut self, kind: BridgeErrorKind) -> Self {
        if self.kind != BridgeErrorKind::Cancelled {
            self.kind = kind;
        }
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorKind::InvalidParams, message)
    }

    pub fn no_identifier(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorKind::NoIdentifier, message)
    }

    pub fn no_host(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorKind::NoHost, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorKind::NotFound, message)
    }

    pub fn connect_failed(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorKind::ConnectFailed, message)
    }

    pub fn identity_mismatch(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorKind::IdentityMismatch, message)
    }

    pub fn channel(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorKind::ChannelError, message)
    }

    pub fn local_not_found(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorKind::LocalNotFound, message)
    }

    pub fn remote_dir(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorKind::RemoteDirError, message)
    }

    pub fn upload(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorKind::UploadError, message)
    }

    pub fn move_failed(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorKind::MoveError, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorKind::Cancelled, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorKind::Internal, message)
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for BridgeError {}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::internal(err.to_string())
    }
}
