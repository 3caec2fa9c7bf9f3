use thiserror::Error;

/// Errors raised by the in-process runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("context has been shut down")]
    ContextShutDown,

    #[error("invalid node name '{name}': {reason}")]
    InvalidNodeName { name: String, reason: &'static str },

    #[error("invalid topic name '{name}': {reason}")]
    InvalidTopicName { name: String, reason: &'static str },

    #[error("queue depth must be at least 1")]
    InvalidQueueDepth,

    #[error("timer period must be non-zero")]
    InvalidTimerPeriod,

    #[error("topic '{topic}' carries {existing}, cannot use it for {requested}")]
    TopicTypeMismatch {
        topic: String,
        existing: &'static str,
        requested: &'static str,
    },

    #[error("callback group belongs to node '{owner}', not to node '{node}'")]
    ForeignCallbackGroup { owner: String, node: String },

    #[error("failed to spawn thread '{name}'")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("executor worker thread panicked")]
    WorkerPanicked,

    #[error("failed to read message input")]
    Input(#[source] std::io::Error),

    #[error("failed to install signal handler")]
    SignalHandler(#[source] std::io::Error),
}

pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;
