mod common;

use common::Harness;
use tandem_realtime::{LikeOutcome, MatchResolver, MessageSync, ResolveError, SendError};
use tandem_types::CanonicalPair;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_likes_create_exactly_one_match() {
    for _ in 0..10 {
        let h = Harness::new();
        let (a, b) = (h.user("Ada"), h.user("Ben"));
        let resolver = MatchResolver::new(h.backend.clone());

        let (r1, r2) = tokio::join!(
            {
                let resolver = resolver.clone();
                tokio::spawn(async move { resolver.like(a, b).await })
            },
            {
                let resolver = resolver.clone();
                tokio::spawn(async move { resolver.like(b, a).await })
            },
        );
        let outcomes = [r1.unwrap().unwrap(), r2.unwrap().unwrap()];
        let matched: Vec<_> = outcomes
            .iter()
            .filter_map(|o| match o {
                LikeOutcome::Matched(m) => Some(m.clone()),
                LikeOutcome::Pending => None,
            })
            .collect();

        assert!(!matched.is_empty(), "the second like to land must see the first");
        assert!(matched.iter().all(|m| m.id == matched[0].id));
        assert_eq!(h.db.matches_for_user(a).unwrap().len(), 1);

        let row = h.db.find_match(CanonicalPair::new(a, b)).unwrap().unwrap();
        assert!(row.user1_id < row.user2_id);
    }
}

#[tokio::test]
async fn repeated_like_is_idempotent() {
    let h = Harness::new();
    let (a, b) = (h.user("Ada"), h.user("Ben"));
    let resolver = MatchResolver::new(h.backend.clone());

    assert_eq!(resolver.like(a, b).await.unwrap(), LikeOutcome::Pending);
    assert_eq!(resolver.like(a, b).await.unwrap(), LikeOutcome::Pending);
    assert!(h.db.like_exists(a, b).unwrap());
    assert!(h.db.matches_for_user(a).unwrap().is_empty());

    let first = resolver.like(b, a).await.unwrap();
    let again = resolver.like(b, a).await.unwrap();
    assert!(first.is_match());
    assert_eq!(first, again);
}

#[tokio::test]
async fn self_interactions_are_rejected() {
    let h = Harness::new();
    let a = h.user("Ada");
    let resolver = MatchResolver::new(h.backend.clone());

    assert!(matches!(resolver.like(a, a).await, Err(ResolveError::SelfInteraction)));
    assert!(matches!(resolver.block(a, a).await, Err(ResolveError::SelfInteraction)));
    assert!(!h.db.like_exists(a, a).unwrap());
}

#[tokio::test]
async fn blocking_excludes_both_ways_and_stops_messages() {
    let h = Harness::new();
    let (a, b, c) = (h.user("Ada"), h.user("Ben"), h.user("Cy"));
    let resolver = MatchResolver::new(h.backend.clone());

    resolver.like(a, c).await.unwrap();
    resolver.pass(a, b).await.unwrap();
    resolver.block(b, a).await.unwrap();

    let mut excluded = resolver.discovery_exclusions(a).await.unwrap();
    excluded.sort();
    let mut expected = vec![b, c];
    expected.sort();
    assert_eq!(excluded, expected);
    assert_eq!(resolver.discovery_exclusions(b).await.unwrap(), vec![a]);

    let sync = MessageSync::new(h.backend.clone());
    assert!(matches!(
        sync.send_message(a, b, "hello?", None).await,
        Err(SendError::Blocked)
    ));
    assert!(h.db.find_match(CanonicalPair::new(a, b)).unwrap().is_none());
}
