use crate::dap::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("config parsing error: {0}")]
    Config(#[from] toml::de::Error),

    // --------------------------------- protocol errors -------------------------------------------
    #[error("unexpected `{0}` message from client")]
    UnexpectedMessage(String),
    #[error("invalid arguments for `{command}`: {source}")]
    InvalidArguments {
        command: String,
        source: serde_json::Error,
    },

    // --------------------------------- debugger entity not found----------------------------------
    #[error("thread {0} not found")]
    ThreadNotFound(u64),
    #[error("frame {0} not found")]
    FrameNotFound(u64),
    #[error("arena {0} not found")]
    ArenaNotFound(u64),
    #[error("value {0} not found")]
    ValueNotFound(u64),
    #[error("reference {0} is not a valid compound code")]
    InvalidReference(u64),
    #[error("compound code ({0}, {1}) does not fit into a protocol reference")]
    CodeOverflow(u64, u64),

    // --------------------------------- data model errors -----------------------------------------
    #[error("`{name}` not found in {type_name}")]
    NameNotFound { type_name: String, name: String },
    #[error("{0} is read-only")]
    ReadOnly(String),
    #[error("scalar value `{0}` has no children")]
    ScalarValue(String),
    #[error("evaluate: {0}")]
    Evaluate(String),
    #[error("evaluate: frame id required")]
    FrameRequired,
}

impl Error {
    /// Return a hint to the dispatch loop - answer with a failure response or drop the connection.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::IO(_) => true,
            Error::Transport(_) => true,

            Error::Json(_) => false,
            Error::Config(_) => false,
            Error::UnexpectedMessage(_) => false,
            Error::InvalidArguments { .. } => false,
            Error::ThreadNotFound(_) => false,
            Error::FrameNotFound(_) => false,
            Error::ArenaNotFound(_) => false,
            Error::ValueNotFound(_) => false,
            Error::InvalidReference(_) => false,
            Error::CodeOverflow(_, _) => false,
            Error::NameNotFound { .. } => false,
            Error::ReadOnly(_) => false,
            Error::ScalarValue(_) => false,
            Error::Evaluate(_) => false,
            Error::FrameRequired => false,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
