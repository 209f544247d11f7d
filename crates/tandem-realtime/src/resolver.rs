use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use tandem_types::{CanonicalPair, Match};

use crate::backend::Backend;
use crate::error::ResolveError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeOutcome {
    /// The other user has not liked back yet.
    Pending,
    /// Both directions exist; the canonical match row.
    Matched(Match),
}

impl LikeOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched(_))
    }
}

/// Turns directional likes into symmetric match rows.
#[derive(Clone)]
pub struct MatchResolver {
    backend: Arc<dyn Backend>,
}

impl MatchResolver {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Records `from -> to` and creates the match if `to -> from` already
    /// exists.
    ///
    /// Both users liking each other at the same time converge on the same
    /// canonical `(lo, hi)` key, so at most one match row is created even when
    /// both calls reach the upsert.
    pub async fn like(&self, from: Uuid, to: Uuid) -> Result<LikeOutcome, ResolveError> {
        if from == to {
            return Err(ResolveError::SelfInteraction);
        }

        let inserted = self.backend.insert_like(from, to).await?;
        if !inserted {
            debug!("{} already liked {}", from, to);
        }

        if !self.backend.like_exists(to, from).await? {
            return Ok(LikeOutcome::Pending);
        }

        let matched = self.backend.upsert_match(CanonicalPair::new(from, to)).await?;
        info!("Match {} between {} and {}", matched.id, matched.user1_id, matched.user2_id);
        Ok(LikeOutcome::Matched(matched))
    }

    /// Excludes `target` from `user`'s future candidates. Idempotent.
    pub async fn pass(&self, user: Uuid, target: Uuid) -> Result<(), ResolveError> {
        if user == target {
            return Err(ResolveError::SelfInteraction);
        }
        self.backend.insert_pass(user, target).await?;
        Ok(())
    }

    /// Blocks `target`: excluded from discovery both ways and unable to
    /// exchange messages with `user`.
    pub async fn block(&self, user: Uuid, target: Uuid) -> Result<(), ResolveError> {
        if user == target {
            return Err(ResolveError::SelfInteraction);
        }
        self.backend.insert_block(user, target).await?;
        info!("{} blocked {}", user, target);
        Ok(())
    }

    /// Ids the discovery query must leave out for `user`.
    pub async fn discovery_exclusions(&self, user: Uuid) -> Result<Vec<Uuid>, ResolveError> {
        Ok(self.backend.discovery_exclusions(user).await?)
    }
}
