use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{error, info, warn};
use uuid::Uuid;

use tandem_types::models::CallAction;
use tandem_types::{CallInvite, CallStatus, CallType};

use crate::backend::Backend;
use crate::config::RealtimeConfig;
use crate::error::CallError;
use crate::rtc::{CallSession, rtc_uid};

/// Random characters after the match id; also the shortest channel name
/// `CallInvites` will generate.
pub const CHANNEL_SUFFIX_LEN: usize = 8;

/// `<match id hex>_<random suffix>`, shortening the match id part so the
/// result never exceeds `max_len`.
pub fn channel_name(match_id: Uuid, max_len: usize) -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(CHANNEL_SUFFIX_LEN.min(max_len))
        .map(char::from)
        .collect();

    let room = max_len.saturating_sub(CHANNEL_SUFFIX_LEN + 1);
    if room == 0 {
        return suffix;
    }
    let prefix = match_id.simple().to_string();
    format!("{}_{}", &prefix[..prefix.len().min(room)], suffix)
}

/// Call invite lifecycle: `ringing -> active | missed`, then `ended` when a
/// participant hangs up.
///
/// Each transition is one unconditional row write, so two clients racing on
/// the same invite resolve by last write wins.
#[derive(Clone)]
pub struct CallInvites {
    backend: Arc<dyn Backend>,
    max_channel_len: usize,
}

impl CallInvites {
    pub fn new(backend: Arc<dyn Backend>, config: &RealtimeConfig) -> Self {
        if config.max_channel_name_len < CHANNEL_SUFFIX_LEN {
            warn!(
                "Channel name limit {} is below {}, using {}",
                config.max_channel_name_len, CHANNEL_SUFFIX_LEN, CHANNEL_SUFFIX_LEN
            );
        }
        Self {
            backend,
            max_channel_len: config.max_channel_name_len.max(CHANNEL_SUFFIX_LEN),
        }
    }

    /// Inserts a ringing invite. Inserting the row is what triggers the push
    /// to the callee.
    pub async fn create_invite(
        &self,
        match_id: Uuid,
        caller: Uuid,
        callee: Uuid,
        call_type: CallType,
    ) -> Result<CallInvite, CallError> {
        if caller == callee {
            return Err(CallError::SelfCall);
        }
        let draft = CallInvite {
            id: Uuid::new_v4(),
            match_id,
            caller_id: caller,
            callee_id: callee,
            channel_name: channel_name(match_id, self.max_channel_len),
            call_type,
            status: CallStatus::Ringing,
            created_at: Utc::now(),
        };
        let invite = self.backend.insert_invite(&draft).await?;
        info!("{} is calling {} ({}) on {}", caller, callee, call_type.as_str(), invite.channel_name);
        Ok(invite)
    }

    /// Caller side: create the invite, then join its channel.
    ///
    /// The two steps are independent writes. If the join fails the invite is
    /// marked `ended` so the callee stops ringing for a call that cannot
    /// connect; if that write also fails the callee's ring timeout covers it.
    pub async fn start_call(
        &self,
        session: &mut CallSession,
        match_id: Uuid,
        caller: Uuid,
        callee: Uuid,
        call_type: CallType,
    ) -> Result<CallInvite, CallError> {
        let invite = self.create_invite(match_id, caller, callee, call_type).await?;
        if let Err(e) = session.join(&invite.channel_name, rtc_uid(caller), call_type.is_video()) {
            error!("Caller join for invite {} failed: {}", invite.id, e);
            session.leave();
            if let Err(write_err) = self.backend.update_invite_status(invite.id, CallStatus::Ended).await {
                warn!("Could not end orphaned invite {}: {}", invite.id, write_err);
            }
            return Err(e.into());
        }
        Ok(invite)
    }

    /// Screen-scoped discovery. Read failures report no invite.
    pub async fn ringing_for_match(&self, match_id: Uuid, callee: Uuid) -> Option<CallInvite> {
        match self.backend.ringing_invite_for_match(match_id, callee).await {
            Ok(invite) => invite,
            Err(e) => {
                warn!("Ringing invite lookup for match {} failed: {}", match_id, e);
                None
            }
        }
    }

    /// Re-reads an invite's current row.
    pub async fn refresh(&self, invite_id: Uuid) -> Result<Option<CallInvite>, CallError> {
        Ok(self.backend.invite(invite_id).await?)
    }

    /// Callee joins the invite's channel, then marks it active.
    pub async fn answer(
        &self,
        invite: &CallInvite,
        me: Uuid,
        session: &mut CallSession,
    ) -> Result<CallInvite, CallError> {
        if me != invite.callee_id {
            return Err(CallError::NotParticipant(me));
        }
        let next = transition(invite, CallAction::Answer)?;

        session.join(&invite.channel_name, rtc_uid(me), invite.call_type.is_video())?;

        if let Err(e) = self.backend.update_invite_status(invite.id, next).await {
            error!("Marking invite {} active failed: {}", invite.id, e);
            session.leave();
            return Err(e.into());
        }
        info!("{} answered invite {}", me, invite.id);
        Ok(CallInvite {
            status: next,
            ..invite.clone()
        })
    }

    /// Callee declines; recorded as `missed`. No RTC work happens.
    pub async fn decline(&self, invite: &CallInvite, me: Uuid) -> Result<CallInvite, CallError> {
        if me != invite.callee_id {
            return Err(CallError::NotParticipant(me));
        }
        let next = transition(invite, CallAction::Decline)?;
        self.backend.update_invite_status(invite.id, next).await?;
        info!("{} declined invite {}", me, invite.id);
        Ok(CallInvite {
            status: next,
            ..invite.clone()
        })
    }

    /// Ring timeout elapsed with no answer.
    pub async fn expire(&self, invite: &CallInvite) -> Result<CallInvite, CallError> {
        let next = transition(invite, CallAction::Expire)?;
        self.backend.update_invite_status(invite.id, next).await?;
        info!("Invite {} expired unanswered", invite.id);
        Ok(CallInvite {
            status: next,
            ..invite.clone()
        })
    }

    /// Either participant leaves. The engine is torn down first; the `ended`
    /// write is best effort.
    pub async fn hang_up(
        &self,
        invite: &CallInvite,
        me: Uuid,
        session: &mut CallSession,
    ) -> Result<CallInvite, CallError> {
        if me != invite.caller_id && me != invite.callee_id {
            return Err(CallError::NotParticipant(me));
        }
        session.leave();
        let next = transition(invite, CallAction::HangUp)?;
        if let Err(e) = self.backend.update_invite_status(invite.id, next).await {
            warn!("Recording end of invite {} failed: {}", invite.id, e);
        }
        Ok(CallInvite {
            status: next,
            ..invite.clone()
        })
    }
}

fn transition(invite: &CallInvite, action: CallAction) -> Result<CallStatus, CallError> {
    invite
        .status
        .apply(action)
        .ok_or(CallError::InvalidTransition {
            from: invite.status,
            action,
        })
}
