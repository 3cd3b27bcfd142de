//! Background engine implementation.
//!
//! A single task owns the watch state machine, the resolver cache, and the
//! current display mode, and drains both inbound streams with `select!`. The
//! loop never awaits a lookup: per-node resolution is fire-and-forget, with
//! completions re-entering through the command channel. That keeps the watch
//! observing new insertions while earlier resolutions are still in flight.

use std::sync::Arc;

use tokio::{select, sync::mpsc};
use tracing::{Instrument, debug, info, info_span};

use super::EngineCommand;
use crate::{
    Result,
    constants::CHAT_ROOT_SELECTORS,
    display::{DisplayMode, apply_label, reformat_all},
    dom::{ChatDom, DomEvent, MessageKind, NodeId, chip_is_patched, find_author_chip, parse_author_info},
    resolver::{CacheLookup, ChannelId, LabelResolver, ResolverCache, resolve_with_timeout},
};

/// Watch state machine: page-wide root search, then a watch scoped to the
/// discovered root. A single underlying event stream means an insertion can
/// never be seen by both states.
#[derive(Debug, Clone, Copy)]
enum WatchState {
    /// No chat root located yet; every insertion triggers a root-search
    /// attempt.
    Searching,
    /// Root known; insertions are classified and routed, everything outside
    /// the root subtree is ignored.
    Watching { root: NodeId },
}

/// Background engine that owns all augmentation state.
pub(super) struct BackgroundEngine {
    dom: ChatDom,
    resolver: Arc<dyn LabelResolver>,
    cache: ResolverCache,
    mode: DisplayMode,
    state: WatchState,

    /// Lookups spawned but not yet reported back.
    inflight: usize,
    /// Flush acknowledgements parked until the engine is quiescent.
    pending_flushes: Vec<tokio::sync::oneshot::Sender<()>>,

    // Communication
    command_rx: mpsc::Receiver<EngineCommand>,
    command_tx: mpsc::Sender<EngineCommand>,
    dom_events: mpsc::UnboundedReceiver<DomEvent>,
}

impl BackgroundEngine {
    /// Start the background engine and return a command sender.
    pub(super) fn start(
        dom: ChatDom,
        dom_events: mpsc::UnboundedReceiver<DomEvent>,
        resolver: Arc<dyn LabelResolver>,
        mode: DisplayMode,
    ) -> mpsc::Sender<EngineCommand> {
        let (tx, rx) = mpsc::channel(100);

        let engine = Self {
            dom,
            resolver,
            cache: ResolverCache::new(),
            mode,
            state: WatchState::Searching,
            inflight: 0,
            pending_flushes: Vec::new(),
            command_rx: rx,
            command_tx: tx.clone(),
            dom_events,
        };

        tokio::spawn(engine.run());
        tx
    }

    /// Main event loop.
    async fn run(mut self) {
        async move {
            info!(mode = %self.mode, "starting chat augmentation engine");

            // The root may already be present when the engine attaches.
            self.try_discover_root();

            loop {
                select! {
                    Some(command) = self.command_rx.recv() => {
                        if matches!(command, EngineCommand::Shutdown) {
                            info!("engine shutting down");
                            break;
                        }
                        self.handle_command(command);
                    }

                    Some(event) = self.dom_events.recv() => {
                        self.handle_dom_event(event);
                    }

                    // Both channels closed.
                    else => {
                        info!("watch streams closed, engine shutting down");
                        break;
                    }
                }

                self.try_ack_flushes();
            }
        }
        .instrument(info_span!("chat_augmenter"))
        .await
    }

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::ModeChanged(mode) => {
                info!(%mode, "display mode changed");
                self.mode = mode;
                if let WatchState::Watching { root } = self.state {
                    match reformat_all(&self.dom, root, mode) {
                        Ok(updated) => debug!(updated, "re-formatted patched messages"),
                        Err(e) => tracing::error!("re-format pass failed: {e}"),
                    }
                }
            }

            EngineCommand::LabelResolved { channel_id, label } => {
                self.inflight = self.inflight.saturating_sub(1);
                debug!(%channel_id, found = label.is_some(), "label lookup completed");
                self.cache.fill(&channel_id, label.clone());
                if let (Some(label), WatchState::Watching { root }) = (label, self.state) {
                    self.fan_out(root, &channel_id, &label);
                }
            }

            EngineCommand::Flush { response } => {
                self.pending_flushes.push(response);
            }

            // Consumed by the select loop.
            EngineCommand::Shutdown => {}
        }
    }

    /// Acknowledge parked flushes once the engine is quiescent: buffered
    /// insertions drained (they may start new lookups) and nothing in flight.
    fn try_ack_flushes(&mut self) {
        if self.pending_flushes.is_empty() {
            return;
        }
        while let Ok(event) = self.dom_events.try_recv() {
            self.handle_dom_event(event);
        }
        if self.inflight == 0 {
            for ack in self.pending_flushes.drain(..) {
                let _ = ack.send(());
            }
        }
    }

    fn handle_dom_event(&mut self, event: DomEvent) {
        let DomEvent::Inserted { nodes } = event;
        match self.state {
            WatchState::Searching => {
                // Cheap page-wide phase: only re-attempt root discovery.
                // Pre-root messages are covered by the sweep on discovery.
                self.try_discover_root();
            }
            WatchState::Watching { root } => {
                for node in nodes {
                    if !self.dom.is_within(node, root) {
                        continue;
                    }
                    // The inserted node itself may be a message, and a single
                    // record may carry a whole batch of nested ones.
                    if self
                        .dom
                        .tag(node)
                        .is_ok_and(|tag| MessageKind::from_tag(&tag).is_some())
                    {
                        self.process_node(node);
                    }
                    for kind in MessageKind::ALL {
                        let found = match self.dom.find_descendants(node, kind.tag()) {
                            Ok(found) => found,
                            // Evicted while we were routing the batch.
                            Err(_) => continue,
                        };
                        for descendant in found {
                            self.process_node(descendant);
                        }
                    }
                }
            }
        }
    }

    /// Try the ordered candidate selectors; on the first match, scope the
    /// watch to the root and sweep messages already buffered under it.
    fn try_discover_root(&mut self) -> bool {
        if matches!(self.state, WatchState::Watching { .. }) {
            return true;
        }
        for selector in CHAT_ROOT_SELECTORS {
            if let Some(root) = self.dom.find_first(selector) {
                info!(selector, "chat root located, scoping watch");
                self.state = WatchState::Watching { root };
                self.sweep(root);
                return true;
            }
        }
        false
    }

    /// One synchronous pass over every qualifying node currently under the
    /// root.
    fn sweep(&mut self, root: NodeId) {
        let mut seen = 0;
        for kind in MessageKind::ALL {
            let found = match self.dom.find_descendants(root, kind.tag()) {
                Ok(found) => found,
                Err(_) => continue,
            };
            for node in found {
                self.process_node(node);
                seen += 1;
            }
        }
        debug!(seen, "initial sweep complete");
    }

    /// Per-node pipeline entry point. Any failure reading the node converts
    /// to a skip; one bad render must not stop processing of subsequent
    /// messages.
    fn process_node(&mut self, node: NodeId) {
        if let Err(e) = self.process_node_inner(node) {
            debug!(?node, "skipping message node: {e}");
        }
    }

    fn process_node_inner(&mut self, node: NodeId) -> Result<()> {
        // System and announcement messages have no chip.
        let Some(chip) = find_author_chip(&self.dom, node)? else {
            return Ok(());
        };
        if chip_is_patched(&self.dom, chip)? {
            return Ok(());
        }
        let Some(author) = parse_author_info(&self.dom, node)? else {
            // Malformed and unsupported message shapes are expected to occur.
            debug!(?node, "message node without usable author data");
            return Ok(());
        };

        match self.cache.begin(&author.channel_id) {
            CacheLookup::Hit(Some(label)) => {
                apply_label(&self.dom, chip, &author.name, Some(&label), self.mode)?;
            }
            // Known label-less identity: leave the unmodified name showing.
            CacheLookup::Hit(None) => {}
            // In-flight: the eventual fan-out covers this node.
            CacheLookup::Pending => {}
            CacheLookup::Miss => self.spawn_lookup(author.channel_id),
        }
        Ok(())
    }

    /// Issue the single lookup for a just-seen identity. The cache slot was
    /// already marked pending in the same turn, so concurrent discoveries
    /// defer instead of duplicating the fetch.
    fn spawn_lookup(&mut self, channel_id: ChannelId) {
        self.inflight += 1;
        debug!(%channel_id, "issuing label lookup");

        let resolver = Arc::clone(&self.resolver);
        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            let label = resolve_with_timeout(resolver.as_ref(), &channel_id).await;
            // Engine gone means the page is tearing down; nothing to deliver.
            let _ = command_tx
                .send(EngineCommand::LabelResolved { channel_id, label })
                .await;
        });
    }

    /// Apply a freshly resolved label to every currently-rendered message
    /// sharing the identity, not just the node that triggered the lookup.
    fn fan_out(&mut self, root: NodeId, channel_id: &ChannelId, label: &str) {
        let mut updated = 0;
        for kind in MessageKind::ALL {
            let found = match self.dom.find_descendants(root, kind.tag()) {
                Ok(found) => found,
                Err(_) => continue,
            };
            for node in found {
                match self.fan_out_node(node, channel_id, label) {
                    Ok(true) => updated += 1,
                    Ok(false) => {}
                    Err(e) => debug!(?node, "skipping node during fan-out: {e}"),
                }
            }
        }
        debug!(%channel_id, updated, "applied resolved label to rendered messages");
    }

    fn fan_out_node(&self, node: NodeId, channel_id: &ChannelId, label: &str) -> Result<bool> {
        // Each node keeps its own rendered name; re-read it rather than
        // assuming the triggering node's.
        let Some(author) = parse_author_info(&self.dom, node)? else {
            return Ok(false);
        };
        if author.channel_id != *channel_id {
            return Ok(false);
        }
        let Some(chip) = find_author_chip(&self.dom, node)? else {
            return Ok(false);
        };
        apply_label(&self.dom, chip, &author.name, Some(label), self.mode)
    }
}
