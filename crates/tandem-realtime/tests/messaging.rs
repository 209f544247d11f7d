mod common;

use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;

use common::{Harness, fast_config, recording_alerts, wait_for};
use tandem_realtime::{
    AlertCoordinator, ChatRoom, Conversation, MessageSync, NullAlertSink, ReadLabel,
    RealtimeConfig, SendError, TypingTracker,
};
use tandem_types::events::ChatEvent;
use tandem_types::CanonicalPair;

fn quiet_alerts() -> AlertCoordinator {
    AlertCoordinator::new(std::sync::Arc::new(NullAlertSink))
}

#[tokio::test]
async fn first_message_creates_the_match_and_order_is_kept() {
    let h = Harness::new();
    let (a, b) = (h.user("Ada"), h.user("Ben"));
    let sync = MessageSync::new(h.backend.clone());

    let first = sync.send_message(a, b, "  hi  ", None).await.unwrap();
    assert_eq!(first.content, "hi");
    let pair = CanonicalPair::new(a, b);
    let matched = h.db.find_match(pair).unwrap().unwrap();
    assert_eq!(first.match_id.to_string(), matched.id);

    for text in ["one", "two", "three"] {
        sync.send_message(b, a, text, None).await.unwrap();
    }
    let contents: Vec<_> = sync
        .get_messages(first.match_id)
        .await
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, ["hi", "one", "two", "three"]);
}

#[tokio::test]
async fn empty_and_self_messages_write_nothing() {
    let h = Harness::new();
    let (a, b) = (h.user("Ada"), h.user("Ben"));
    let sync = MessageSync::new(h.backend.clone());

    assert!(matches!(sync.send_message(a, b, " \n ", None).await, Err(SendError::Empty)));
    assert!(matches!(sync.send_message(a, a, "me", None).await, Err(SendError::SelfInteraction)));
    assert!(h.db.matches_for_user(a).unwrap().is_empty());
}

#[tokio::test]
async fn mark_read_stamps_only_peer_messages() {
    let h = Harness::new();
    let (a, b) = (h.user("Ada"), h.user("Ben"));
    let sync = MessageSync::new(h.backend.clone());

    let mine = sync.send_message(a, b, "hey", None).await.unwrap();
    sync.send_message(b, a, "hi!", None).await.unwrap();
    sync.send_message(b, a, "what's up", None).await.unwrap();

    let updated = sync.mark_messages_as_read(a, mine.match_id).await.unwrap();
    assert_eq!(updated, 2);
    for m in sync.get_messages(mine.match_id).await {
        assert_eq!(m.read_at.is_some(), m.sender_id == b, "{}", m.content);
    }
    // Already read rows are left alone.
    assert_eq!(sync.mark_messages_as_read(a, mine.match_id).await.unwrap(), 0);
}

#[tokio::test]
async fn typing_expires_after_three_seconds() {
    let h = Harness::new();
    let (a, b) = (h.user("Ada"), h.user("Ben"));
    let matched = MessageSync::new(h.backend.clone()).resolve_match(a, b).await.unwrap();
    let tracker = TypingTracker::new(h.backend.clone(), chrono::Duration::seconds(3));

    let typed_at = Utc::now();
    h.backend.upsert_typing(matched.id, b, typed_at).await.unwrap();

    let at = |ms| typed_at + chrono::Duration::milliseconds(ms);
    assert!(tracker.is_other_typing_at(matched.id, b, at(2_900)).await);
    assert!(!tracker.is_other_typing_at(matched.id, b, at(3_100)).await);
    // The indicator is keyed per participant.
    assert!(!tracker.is_other_typing_at(matched.id, a, at(100)).await);

    tracker.clear_typing(matched.id, b).await.unwrap();
    assert!(!tracker.is_other_typing_at(matched.id, b, at(100)).await);
}

#[tokio::test]
async fn failed_send_rolls_back_the_optimistic_entry() {
    let h = Harness::new();
    let (a, b) = (h.user("Ada"), h.user("Ben"));
    let sync = MessageSync::new(h.backend.clone());
    h.db.with_conn_mut(|conn| {
        conn.execute_batch("DROP TABLE messages")?;
        Ok(())
    })
    .unwrap();

    let conversation = Mutex::new(Conversation::new(a, b, None));
    let result = sync.send_optimistic(&conversation, "are you there?").await;

    assert!(matches!(result, Err(SendError::Backend(_))));
    let conversation = conversation.into_inner().unwrap();
    assert!(conversation.pending().is_empty());
    assert!(conversation.messages().is_empty());
    assert_eq!(conversation.read_label(), ReadLabel::None);
    // Reads degrade instead of failing.
    let matched = h.db.find_match(CanonicalPair::new(a, b)).unwrap().unwrap();
    assert!(sync.get_messages(matched.id.parse().unwrap()).await.is_empty());
}

#[tokio::test]
async fn left_on_read_until_the_peer_replies() {
    let h = Harness::new();
    let (a, b) = (h.user("Ada"), h.user("Ben"));
    let config = fast_config();

    let (ada, _ada_events) = ChatRoom::open(h.backend.clone(), &config, quiet_alerts(), a, b, None);
    let sent = ada.send("hi").await.unwrap();
    assert_eq!(ada.match_id(), Some(sent.match_id));
    assert_eq!(ada.read_label(), ReadLabel::Sent);

    // Ben opening the conversation reads it.
    let (ben, _ben_events) =
        ChatRoom::open(h.backend.clone(), &config, quiet_alerts(), b, a, Some(sent.match_id));
    ben.refresh().await;
    ada.refresh().await;
    assert_eq!(ada.read_label(), ReadLabel::LeftOnRead);

    ben.send("hey, sorry!").await.unwrap();
    ada.refresh().await;
    assert_eq!(ada.read_label(), ReadLabel::Read);

    ada.close().await;
    ben.close().await;
}

#[tokio::test]
async fn failed_mark_read_is_retried_on_the_next_tick() {
    let h = Harness::new();
    let (a, b) = (h.user("Ada"), h.user("Ben"));
    let sent = MessageSync::new(h.backend.clone())
        .send_message(a, b, "hello?", None)
        .await
        .unwrap();
    h.db.with_conn(|conn| {
        conn.execute_batch(
            "CREATE TRIGGER reject_reads BEFORE UPDATE OF read_at ON messages
             BEGIN SELECT RAISE(ABORT, 'reads rejected'); END;",
        )?;
        Ok(())
    })
    .unwrap();

    // Ticks only run on `refresh` after the first one.
    let config = RealtimeConfig {
        message_poll_interval: Duration::from_secs(3600),
        ..fast_config()
    };
    let (alerts, _recorder) = recording_alerts();
    let (ben, _events) =
        ChatRoom::open(h.backend.clone(), &config, alerts.clone(), b, a, Some(sent.match_id));

    ben.refresh().await;
    assert!(h.db.get_messages(sent.match_id).unwrap()[0].read_at.is_none());
    assert_eq!(alerts.unread_total(), 1);

    h.db.with_conn(|conn| {
        conn.execute_batch("DROP TRIGGER reject_reads")?;
        Ok(())
    })
    .unwrap();

    // Nothing new arrived, but the unread row is marked anyway.
    ben.refresh().await;
    assert!(h.db.get_messages(sent.match_id).unwrap()[0].read_at.is_some());
    assert_eq!(alerts.unread_total(), 0);

    ben.close().await;
}

#[tokio::test]
async fn open_room_streams_messages_and_typing() {
    let h = Harness::new();
    let (a, b) = (h.user("Ada"), h.user("Ben"));
    let config = fast_config();
    let (alerts, _recorder) = recording_alerts();

    let (ada, mut events) = ChatRoom::open(h.backend.clone(), &config, alerts.clone(), a, b, None);
    let first = ada.send("hello").await.unwrap();

    let (ben, _ben_events) =
        ChatRoom::open(h.backend.clone(), &config, quiet_alerts(), b, a, Some(first.match_id));

    ben.on_input_changed("h").await;
    let typing = wait_for(&mut events, |e| matches!(e, ChatEvent::TypingChanged { .. })).await;
    assert_eq!(typing, ChatEvent::TypingChanged { user_id: b, typing: true });

    let reply = ben.send("hey").await.unwrap();

    // Sending clears Ben's indicator; the two can land in either order.
    let (mut saw_reply, mut saw_stop) = (false, false);
    while !(saw_reply && saw_stop) {
        match wait_for(&mut events, |_| true).await {
            ChatEvent::MessagesAppended { messages } => {
                assert!(messages.iter().filter(|m| m.id == reply.id).count() <= 1);
                saw_reply |= messages.iter().any(|m| m.id == reply.id);
            }
            ChatEvent::TypingChanged { user_id, typing } => {
                assert_eq!(user_id, b);
                assert!(!typing);
                saw_stop = true;
            }
            _ => {}
        }
    }

    // The reply was read while the room was open.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stored = MessageSync::new(h.backend.clone()).get_messages(first.match_id).await;
    assert!(stored.iter().find(|m| m.id == reply.id).unwrap().read_at.is_some());
    assert_eq!(alerts.unread_total(), 0);
    let snapshot = ada.snapshot();
    assert_eq!(snapshot.messages().len(), 2);
    assert!(snapshot.pending().is_empty());

    ada.close().await;
    ben.close().await;
}

#[tokio::test]
async fn idle_input_and_close_clear_the_indicator() {
    let h = Harness::new();
    let (a, b) = (h.user("Ada"), h.user("Ben"));
    let config = fast_config();
    let matched = MessageSync::new(h.backend.clone()).resolve_match(a, b).await.unwrap();

    let (ada, _events) =
        ChatRoom::open(h.backend.clone(), &config, quiet_alerts(), a, b, Some(matched.id));

    ada.on_input_changed("typing...").await;
    assert!(h.db.get_typing(matched.id, a).unwrap().is_some());
    tokio::time::sleep(config.typing_idle * 3).await;
    assert!(h.db.get_typing(matched.id, a).unwrap().is_none());

    ada.on_input_changed("again").await;
    assert!(h.db.get_typing(matched.id, a).unwrap().is_some());
    ada.close().await;
    assert!(h.db.get_typing(matched.id, a).unwrap().is_none());
}
