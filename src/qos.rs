use crate::error::{Result, RuntimeError};

/// How many unconsumed messages a subscription retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoSHistory {
    /// Keep the newest `depth` messages, dropping the oldest.
    KeepLast { depth: usize },
    /// Keep everything until it is taken.
    KeepAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QoSProfile {
    pub history: QoSHistory,
}

pub const QOS_PROFILE_DEFAULT: QoSProfile = QoSProfile {
    history: QoSHistory::KeepLast { depth: 10 },
};

impl Default for QoSProfile {
    fn default() -> Self {
        QOS_PROFILE_DEFAULT
    }
}

impl QoSProfile {
    pub fn keep_last(self, depth: usize) -> Self {
        Self {
            history: QoSHistory::KeepLast { depth },
        }
    }

    pub fn keep_all(self) -> Self {
        Self {
            history: QoSHistory::KeepAll,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match self.history {
            QoSHistory::KeepLast { depth: 0 } => Err(RuntimeError::InvalidQueueDepth),
            _ => Ok(()),
        }
    }

    /// Queue bound, `None` when unbounded.
    pub(crate) fn capacity(&self) -> Option<usize> {
        match self.history {
            QoSHistory::KeepLast { depth } => Some(depth),
            QoSHistory::KeepAll => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_zero_is_rejected() {
        assert!(matches!(
            QoSProfile::default().keep_last(0).validate(),
            Err(RuntimeError::InvalidQueueDepth)
        ));
        assert!(QoSProfile::default().keep_last(1).validate().is_ok());
        assert!(QoSProfile::default().keep_all().validate().is_ok());
    }

    #[test]
    fn capacity() {
        assert_eq!(QoSProfile::default().capacity(), Some(10));
        assert_eq!(QoSProfile::default().keep_last(1).capacity(), Some(1));
        assert_eq!(QoSProfile::default().keep_all().capacity(), None);
    }
}
