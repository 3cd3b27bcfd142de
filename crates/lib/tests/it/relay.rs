//! The engine wired to the relayed lookup path: requests go out through a
//! transport toward the privileged process, responses come back by request-id
//! correlation.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chatlens::{
    Augmenter, MemoryPrefs, Result,
    resolver::{RelayRequest, RelayResolver, RelayResponse, RelayTransport},
};

use crate::helpers::*;

/// Transport that records outbound requests for the test to answer.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<RelayRequest>>,
}

#[async_trait]
impl RelayTransport for RecordingTransport {
    async fn send_request(&self, request: RelayRequest) -> Result<()> {
        self.sent.lock().unwrap().push(request);
        Ok(())
    }
}

#[tokio::test]
async fn test_relayed_lookup_end_to_end() {
    let (dom, items) = chat_page();
    let transport = Arc::new(RecordingTransport::default());
    let resolver = Arc::new(RelayResolver::new(transport.clone()));
    let engine = Augmenter::start(dom.clone(), resolver.clone(), &MemoryPrefs::new()).unwrap();

    let msg = dom.insert(Some(items), text_message("Alice", "UC-a")).unwrap();

    wait_until("relay request to go out", || {
        !transport.sent.lock().unwrap().is_empty()
    })
    .await;
    let request = transport.sent.lock().unwrap()[0].clone();
    assert_eq!(request.channel_id.as_str(), "UC-a");

    // The privileged process answers; the host mirrors the message back in.
    resolver.deliver(RelayResponse {
        channel_id: request.channel_id.clone(),
        request_id: request.request_id,
        title: Some("Alice Channel".to_string()),
    });
    engine.flush().await.unwrap();

    assert_eq!(rendered_name(&dom, msg), "Alice (Alice Channel)");
}

#[tokio::test]
async fn test_relay_timeout_leaves_name_unmodified() {
    let (dom, items) = chat_page();
    let transport = Arc::new(RecordingTransport::default());
    let resolver = Arc::new(RelayResolver::with_timeout(
        transport.clone(),
        Duration::from_millis(50),
    ));
    let engine = Augmenter::start(dom.clone(), resolver, &MemoryPrefs::new()).unwrap();

    // Nobody ever answers this request.
    let first = dom.insert(Some(items), text_message("Alice", "UC-a")).unwrap();
    engine.flush().await.unwrap();
    assert_eq!(rendered_name(&dom, first), "Alice");
    assert!(!is_patched(&dom, first));

    // The timeout was cached as a failed resolution; no second request.
    let second = dom.insert(Some(items), text_message("Alice", "UC-a")).unwrap();
    engine.flush().await.unwrap();
    assert_eq!(rendered_name(&dom, second), "Alice");
    assert_eq!(transport.sent.lock().unwrap().len(), 1);
}
