//! End-to-end tests for the discovery engine: root discovery, sweeping,
//! batched insertions, lookup dedup, fan-out, and mode changes.

use chatlens::{Augmenter, DisplayMode, MemoryPrefs, MessageKind, NodeSpec};

use crate::helpers::*;

#[tokio::test]
async fn test_sweep_patches_buffered_messages() {
    let (dom, items) = chat_page();
    let alice = dom.insert(Some(items), text_message("Alice", "UC-a")).unwrap();
    let bob = dom.insert(Some(items), text_message("Bob", "UC-b")).unwrap();

    let resolver = StubResolver::with_labels(&[("UC-a", Some("@alice")), ("UC-b", Some("@bob"))]);
    let engine = Augmenter::start(dom.clone(), resolver.clone(), &MemoryPrefs::new()).unwrap();
    engine.flush().await.unwrap();

    assert_eq!(rendered_name(&dom, alice), "Alice (@alice)");
    assert_eq!(rendered_name(&dom, bob), "Bob (@bob)");
    assert_eq!(resolver.calls_for("UC-a"), 1);
    assert_eq!(resolver.calls_for("UC-b"), 1);
}

#[tokio::test]
async fn test_root_discovered_after_attach() {
    let dom = chatlens::ChatDom::new();
    let resolver = StubResolver::with_labels(&[("UC-a", Some("@alice"))]);
    let engine = Augmenter::start(dom.clone(), resolver.clone(), &MemoryPrefs::new()).unwrap();

    // Page renders unrelated chrome first; the engine keeps searching.
    dom.insert(None, NodeSpec::new("ytd-masthead")).unwrap();
    engine.flush().await.unwrap();
    assert!(resolver.calls().is_empty());

    // The chat app arrives with a message already buffered inside it.
    let root = dom
        .insert(
            None,
            NodeSpec::new("yt-live-chat-app").with_child(text_message("Alice", "UC-a")),
        )
        .unwrap();
    engine.flush().await.unwrap();

    let msg = dom
        .find_descendant(root, MessageKind::Text.tag())
        .unwrap()
        .unwrap();
    assert_eq!(rendered_name(&dom, msg), "Alice (@alice)");
    assert_eq!(resolver.calls_for("UC-a"), 1);
}

#[tokio::test]
async fn test_bare_renderer_root_is_discovered() {
    let dom = chatlens::ChatDom::new();
    let resolver = StubResolver::with_labels(&[("UC-a", Some("@alice"))]);
    let engine = Augmenter::start(dom.clone(), resolver.clone(), &MemoryPrefs::new()).unwrap();

    // Popout and studio surfaces render the bare chat renderer with no app
    // shell around it; the fallback selector must still find the root.
    let root = dom
        .insert(
            None,
            NodeSpec::new("yt-live-chat-renderer").with_child(text_message("Alice", "UC-a")),
        )
        .unwrap();
    engine.flush().await.unwrap();

    let msg = dom
        .find_descendant(root, MessageKind::Text.tag())
        .unwrap()
        .unwrap();
    assert_eq!(rendered_name(&dom, msg), "Alice (@alice)");
    assert_eq!(resolver.calls_for("UC-a"), 1);
}

#[tokio::test]
async fn test_app_root_wins_over_bare_renderer() {
    let dom = chatlens::ChatDom::new();

    // Both candidate roots exist as siblings; the renderer even renders
    // first. The app shell still takes precedence and scopes the watch.
    let renderer = dom
        .insert(
            None,
            NodeSpec::new("yt-live-chat-renderer").with_child(text_message("Bob", "UC-b")),
        )
        .unwrap();
    let app = dom
        .insert(
            None,
            NodeSpec::new("yt-live-chat-app").with_child(text_message("Alice", "UC-a")),
        )
        .unwrap();

    let resolver = StubResolver::with_labels(&[("UC-a", Some("@alice")), ("UC-b", Some("@bob"))]);
    let engine = Augmenter::start(dom.clone(), resolver.clone(), &MemoryPrefs::new()).unwrap();
    engine.flush().await.unwrap();

    let inside = dom
        .find_descendant(app, MessageKind::Text.tag())
        .unwrap()
        .unwrap();
    assert_eq!(rendered_name(&dom, inside), "Alice (@alice)");

    // The renderer subtree sits outside the chosen root and is left alone.
    let outside = dom
        .find_descendant(renderer, MessageKind::Text.tag())
        .unwrap()
        .unwrap();
    assert!(!is_patched(&dom, outside));
    assert_eq!(rendered_name(&dom, outside), "Bob");
    assert_eq!(resolver.calls(), vec!["UC-a".to_string()]);
}

#[tokio::test]
async fn test_batched_insertion_dedups_and_fans_out() {
    let (dom, items) = chat_page();
    let resolver =
        StubResolver::with_labels(&[("UC-x", Some("@x")), ("UC-y", Some("@y"))]);
    let engine = Augmenter::start(dom.clone(), resolver.clone(), &MemoryPrefs::new()).unwrap();

    // Seed the cache for Y, then clear the seed message off screen.
    let seed = dom.insert(Some(items), text_message("Yvonne", "UC-y")).unwrap();
    engine.flush().await.unwrap();
    assert_eq!(resolver.calls_for("UC-y"), 1);
    dom.remove(seed).unwrap();

    // Hold X's lookup in flight so the pending window is observable.
    let gate = resolver.hold_lookups();

    // One mutation record carrying five nodes: three share the uncached
    // identity X, two share the cached identity Y.
    let batch = dom
        .insert_batch(
            Some(items),
            vec![
                text_message("Xavier", "UC-x"),
                text_message("Yvonne", "UC-y"),
                text_message("Xavier", "UC-x"),
                text_message("Yvonne", "UC-y"),
                text_message("Xavier", "UC-x"),
            ],
        )
        .unwrap();

    // The Y nodes format immediately from cache while X is still in flight.
    wait_until("cached identity to be patched from cache", || {
        rendered_name(&dom, batch[1]) == "Yvonne (@y)"
            && rendered_name(&dom, batch[3]) == "Yvonne (@y)"
    })
    .await;
    assert!(!is_patched(&dom, batch[0]));
    assert_eq!(resolver.calls_for("UC-x"), 1);
    assert_eq!(resolver.calls_for("UC-y"), 1);

    // Release the lookup; every X node updates without further fetches.
    gate.add_permits(1);
    engine.flush().await.unwrap();
    for &node in &[batch[0], batch[2], batch[4]] {
        assert_eq!(rendered_name(&dom, node), "Xavier (@x)");
    }
    assert_eq!(resolver.calls_for("UC-x"), 1);
    assert_eq!(resolver.calls_for("UC-y"), 1);
}

#[tokio::test]
async fn test_pending_window_defers_instead_of_refetching() {
    let (dom, items) = chat_page();
    let resolver = StubResolver::with_labels(&[("UC-x", Some("@x"))]);
    let engine = Augmenter::start(dom.clone(), resolver.clone(), &MemoryPrefs::new()).unwrap();
    let gate = resolver.hold_lookups();

    let first = dom.insert(Some(items), text_message("Xavier", "UC-x")).unwrap();
    wait_until("first lookup to be issued", || resolver.calls_for("UC-x") == 1).await;

    // A second message from the same author lands while the fetch is in
    // flight; it must defer, not refetch.
    let second = dom.insert(Some(items), text_message("Xavier", "UC-x")).unwrap();

    gate.add_permits(1);
    engine.flush().await.unwrap();

    assert_eq!(rendered_name(&dom, first), "Xavier (@x)");
    assert_eq!(rendered_name(&dom, second), "Xavier (@x)");
    assert_eq!(resolver.calls_for("UC-x"), 1);
}

#[tokio::test]
async fn test_fan_out_covers_every_message_kind() {
    let (dom, items) = chat_page();
    let resolver = StubResolver::with_labels(&[("UC-x", Some("@x"))]);
    let engine = Augmenter::start(dom.clone(), resolver.clone(), &MemoryPrefs::new()).unwrap();

    let nodes = dom
        .insert_batch(
            Some(items),
            MessageKind::ALL
                .iter()
                .map(|kind| message(*kind, "Xavier", "UC-x"))
                .collect(),
        )
        .unwrap();
    engine.flush().await.unwrap();

    for &node in &nodes {
        assert_eq!(rendered_name(&dom, node), "Xavier (@x)");
    }
    assert_eq!(resolver.calls_for("UC-x"), 1);
}

#[tokio::test]
async fn test_mode_change_reformats_without_lookups() {
    let (dom, items) = chat_page();
    let resolver = StubResolver::with_labels(&[("UC-x", Some("@x"))]);
    let engine = Augmenter::start(dom.clone(), resolver.clone(), &MemoryPrefs::new()).unwrap();

    // One of each kind for a resolved identity, plus one author the resolver
    // knows nothing about.
    let nodes = dom
        .insert_batch(
            Some(items),
            MessageKind::ALL
                .iter()
                .map(|kind| message(*kind, "Xavier", "UC-x"))
                .collect(),
        )
        .unwrap();
    let unlabeled = dom.insert(Some(items), text_message("Zoe", "UC-z")).unwrap();
    engine.flush().await.unwrap();

    let calls_before = resolver.calls().len();

    engine.set_display_mode(DisplayMode::Handle).await.unwrap();
    engine.flush().await.unwrap();
    for &node in &nodes {
        assert_eq!(rendered_name(&dom, node), "@x");
    }
    // Never patched (no label found), so the re-format pass leaves it alone.
    assert!(!is_patched(&dom, unlabeled));
    assert_eq!(rendered_name(&dom, unlabeled), "Zoe");

    engine.set_display_mode(DisplayMode::Name).await.unwrap();
    engine.flush().await.unwrap();
    for &node in &nodes {
        assert_eq!(rendered_name(&dom, node), "Xavier");
    }

    // The whole re-format ran from cached chip attributes.
    assert_eq!(resolver.calls().len(), calls_before);
}

#[tokio::test]
async fn test_initial_mode_comes_from_preferences() {
    let (dom, items) = chat_page();
    let resolver = StubResolver::with_labels(&[("UC-x", Some("@x"))]);
    let prefs = MemoryPrefs::with_mode(DisplayMode::Handle);
    let engine = Augmenter::start(dom.clone(), resolver, &prefs).unwrap();

    let msg = dom.insert(Some(items), text_message("Xavier", "UC-x")).unwrap();
    engine.flush().await.unwrap();

    assert_eq!(rendered_name(&dom, msg), "@x");
}

#[tokio::test]
async fn test_malformed_nodes_do_not_poison_the_batch() {
    let (dom, items) = chat_page();
    let resolver = StubResolver::with_labels(&[("UC-a", Some("@alice"))]);
    let engine = Augmenter::start(dom.clone(), resolver.clone(), &MemoryPrefs::new()).unwrap();

    // A message whose data record lacks the channel identity, a chipless
    // system message, and a well-formed sibling, all in one record.
    let no_identity = NodeSpec::new(MessageKind::Text.tag())
        .with_data(serde_json::json!({ "authorName": { "simpleText": "Ghost" } }))
        .with_child(
            NodeSpec::new(chatlens::constants::AUTHOR_CHIP_TAG).with_child(
                NodeSpec::new(chatlens::constants::AUTHOR_NAME_TAG).with_text("Ghost"),
            ),
        );
    let chipless = NodeSpec::new(MessageKind::Text.tag());
    let batch = dom
        .insert_batch(
            Some(items),
            vec![no_identity, chipless, text_message("Alice", "UC-a")],
        )
        .unwrap();
    engine.flush().await.unwrap();

    assert!(!is_patched(&dom, batch[0]));
    assert_eq!(rendered_name(&dom, batch[0]), "Ghost");
    assert_eq!(rendered_name(&dom, batch[2]), "Alice (@alice)");
    assert_eq!(resolver.calls(), vec!["UC-a".to_string()]);
}

#[tokio::test]
async fn test_failed_lookup_falls_back_and_is_not_retried() {
    let (dom, items) = chat_page();
    // The resolver has no answer for this identity.
    let resolver = StubResolver::new();
    let engine = Augmenter::start(dom.clone(), resolver.clone(), &MemoryPrefs::new()).unwrap();

    let first = dom.insert(Some(items), text_message("Zoe", "UC-z")).unwrap();
    engine.flush().await.unwrap();
    assert_eq!(rendered_name(&dom, first), "Zoe");
    assert!(!is_patched(&dom, first));

    // Failures are cached; a later message from the same author does not
    // trigger a second attempt this lifetime.
    let second = dom.insert(Some(items), text_message("Zoe", "UC-z")).unwrap();
    engine.flush().await.unwrap();
    assert_eq!(rendered_name(&dom, second), "Zoe");
    assert_eq!(resolver.calls_for("UC-z"), 1);
}

#[tokio::test]
async fn test_insertions_outside_the_root_are_ignored() {
    let (dom, _items) = chat_page();
    let resolver = StubResolver::with_labels(&[("UC-a", Some("@alice"))]);
    let engine = Augmenter::start(dom.clone(), resolver.clone(), &MemoryPrefs::new()).unwrap();

    // A message-shaped node rendered outside the chat subtree (e.g. a VOD
    // replay preview elsewhere on the page) is not ours to touch.
    let outside = dom.insert(None, text_message("Alice", "UC-a")).unwrap();
    engine.flush().await.unwrap();

    assert!(!is_patched(&dom, outside));
    assert!(resolver.calls().is_empty());
}

#[tokio::test]
async fn test_reprocessing_is_guarded_by_the_patch_marker() {
    let (dom, items) = chat_page();
    let resolver = StubResolver::with_labels(&[("UC-a", Some("@alice"))]);
    let engine = Augmenter::start(dom.clone(), resolver.clone(), &MemoryPrefs::new()).unwrap();

    let msg = dom.insert(Some(items), text_message("Alice", "UC-a")).unwrap();
    engine.flush().await.unwrap();
    assert_eq!(rendered_name(&dom, msg), "Alice (@alice)");

    // A re-render style insertion of a nearby node makes the engine walk the
    // subtree again; the patched chip must not be double-processed into
    // "Alice (@alice) (@alice)".
    dom.insert(Some(items), NodeSpec::new("separator")).unwrap();
    engine.flush().await.unwrap();
    assert_eq!(rendered_name(&dom, msg), "Alice (@alice)");
    assert_eq!(resolver.calls_for("UC-a"), 1);
}

#[tokio::test]
async fn test_shutdown_stops_accepting_commands() {
    let (dom, _items) = chat_page();
    let engine = Augmenter::start(dom, StubResolver::new(), &MemoryPrefs::new()).unwrap();

    engine.shutdown().await.unwrap();

    // The background task drains commands queued ahead of the shutdown, so
    // poll until the channel is actually closed.
    let err = loop {
        match engine.flush().await {
            Ok(()) => tokio::time::sleep(std::time::Duration::from_millis(5)).await,
            Err(e) => break e,
        }
    };
    assert!(matches!(
        err,
        chatlens::Error::Engine(chatlens::engine::EngineError::EngineStopped)
    ));
}
