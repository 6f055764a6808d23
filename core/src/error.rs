use crate::entity::EntityId;
use thiserror::Error;

/// Conditions a comparison session reports to its front-end.
#[derive(Debug, Error)]
pub enum Error {
    /// Fewer than two entities match the active filter.
    #[error("only {found} matching item(s) found; at least 2 are needed to compare")]
    PoolTooSmall { found: usize },

    /// Reading from the entity repository failed. The front-end may retry.
    #[error("failed to load items: {0:#}")]
    Repository(#[source] anyhow::Error),

    /// A response arrived after the mode or filter it was requested for was replaced.
    #[error("response belongs to a superseded request")]
    StaleResponse,

    /// A pick or skip arrived while the previous one was still being processed.
    #[error("another choice is still being processed")]
    Reentrant,

    #[error("{0} is not part of the current pair")]
    NotInPair(EntityId),

    #[error("no pair is being shown")]
    NoPair,

    #[error("the run is over; acknowledge it to continue")]
    AwaitingAcknowledgement,

    #[error("skipping is disabled while a run is in progress")]
    SkipDuringRun,
}

impl Error {
    /// Whether the error should be dropped without telling the user.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::StaleResponse | Self::Reentrant)
    }

    /// Whether asking for a new pair may succeed without the user changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Repository(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
