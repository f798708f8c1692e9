use crate::*;

use pagevirt::dom::{Document, NodeId, UNLOADED_ATTR};
use pagevirt::sim::SimHost;
use pagevirt::{EngineOptions, Error, Role, RoleRule, RuleSet, TrackingModeKind};

const ROLE_ATTR: &str = "data-message-author-role";

fn rules() -> RuleSet {
    RuleSet::new(["div[data-message-author-role]"])
        .with_role_rule(RoleRule::Attribute(ROLE_ATTR.into()))
}

fn options() -> EngineOptions {
    EngineOptions::new().with_margins(1.0, 0.0)
}

/// `count` blocks of 100px under `<main>`. With a 950px viewport blocks 0..10 are in range at
/// scroll 0.
fn page(count: usize) -> (Document, Vec<NodeId>) {
    let mut doc = Document::new();
    let root = doc.root();
    let main = doc.append_element(root, "main", &[]);
    let blocks = (0..count)
        .map(|i| {
            let role = if i % 2 == 0 { "user" } else { "assistant" };
            let block = doc.append_element(main, "div", &[(ROLE_ATTR, role)]);
            let pre = doc.append_element(block, "pre", &[("class", "language-rust")]);
            doc.append_text(pre, &format!("fn m{i}() {{}}"), 100);
            block
        })
        .collect();
    (doc, blocks)
}

fn host_for(doc: Document) -> SimHost {
    let mut host = SimHost::new(doc);
    host.resize_viewport(950);
    host
}

fn attached(store: MemoryFlagStore) -> (SimHost, Vec<NodeId>, Controller<NodeId, MemoryFlagStore>) {
    let (doc, blocks) = page(50);
    let mut host = host_for(doc);
    let mut c = Controller::new(options(), rules(), store);
    c.attach(&mut host, 0).unwrap();
    host.pump(c.engine_mut(), 0).unwrap();
    (host, blocks, c)
}

#[test]
fn persisted_toggle_overrides_options() {
    let store = MemoryFlagStore::new().with_value(ENABLED_KEY, "false");
    let (doc, _) = page(50);
    let mut host = host_for(doc);
    let mut c = Controller::new(options(), rules(), store);
    assert!(!c.is_enabled());
    assert_eq!(c.attach(&mut host, 0).unwrap(), TrackingModeKind::Inactive);
    host.pump(c.engine_mut(), 0).unwrap();
    assert_eq!(c.snapshot().unloaded, 0);
}

#[test]
fn toggle_persists_a_json_boolean() {
    let (mut host, _, mut c) = attached(MemoryFlagStore::new());
    assert_eq!(c.snapshot().unloaded, 40);

    assert!(!c.toggle(&mut host, 10).unwrap());
    assert_eq!(c.store().raw(ENABLED_KEY), Some("false"));
    assert_eq!(c.snapshot().unloaded, 0);
    assert_eq!(c.snapshot().mode, TrackingModeKind::Inactive);

    assert!(c.toggle(&mut host, 20).unwrap());
    assert_eq!(c.store().raw(ENABLED_KEY), Some("true"));
    host.pump(c.engine_mut(), 20).unwrap();
    assert_eq!(c.snapshot().unloaded, 40);
}

#[test]
fn store_failures_are_not_fatal() {
    let mut store = MemoryFlagStore::new().with_value(ENABLED_KEY, "false");
    store.set_failing(true);
    assert_eq!(load_enabled(&store), None);

    let (mut host, _, mut c) = attached(store);
    assert!(c.is_enabled());
    assert!(!c.toggle(&mut host, 10).unwrap());
    assert!(!c.is_enabled());
    assert_eq!(c.snapshot().unloaded, 0);

    let junk = MemoryFlagStore::new().with_value(ENABLED_KEY, "\"yes\"");
    assert_eq!(load_enabled(&junk), None);
    let mut fine = MemoryFlagStore::new();
    assert!(save_enabled(&mut fine, false));
    assert_eq!(load_enabled(&fine), Some(false));
}

#[test]
fn extract_all_reads_everything_and_restores_the_prior_mode() {
    let (doc, blocks) = page(50);
    let expected: Vec<String> = blocks.iter().map(|b| doc.inner_html(*b)).collect();
    let mut host = host_for(doc);
    let mut c = Controller::new(options(), rules(), MemoryFlagStore::new());
    c.attach(&mut host, 0).unwrap();
    host.pump(c.engine_mut(), 0).unwrap();
    assert_eq!(c.snapshot().unloaded, 40);

    let mut frames = YieldingFrames::new();
    let read = smol::block_on(c.extract_all(&mut host, &mut frames, 100)).unwrap();

    assert_eq!(frames.frames(), 2);
    assert_eq!(read.len(), 50);
    for (i, block) in read.iter().enumerate() {
        assert_eq!(block.html, expected[i]);
        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
        assert_eq!(block.role, role);
    }

    assert!(c.is_enabled());
    assert_eq!(c.store().raw(ENABLED_KEY), None);
    host.pump(c.engine_mut(), 100).unwrap();
    assert_eq!(c.snapshot().unloaded, 40);
    assert_eq!(c.snapshot().mode, TrackingModeKind::EventDriven);
}

fn unloaded_indices(c: &Controller<NodeId, MemoryFlagStore>, blocks: &[NodeId]) -> Vec<usize> {
    (0..blocks.len())
        .filter(|&i| c.engine().is_unloaded(&blocks[i]))
        .collect()
}

#[test]
fn extract_all_reads_blocks_whose_children_went_missing() {
    // Blocks 0..4 fit a 350px viewport. Block 7 was re-rendered by the host with the unloaded
    // flag copied over, so the engine never held its children.
    let (mut doc, blocks) = page(8);
    doc.set_attribute(blocks[7], UNLOADED_ATTR, "true");
    let expected: Vec<String> = blocks.iter().map(|b| doc.inner_html(*b)).collect();
    let mut host = SimHost::new(doc);
    host.resize_viewport(350);
    let mut c = Controller::new(options(), rules(), MemoryFlagStore::new());
    c.attach(&mut host, 0).unwrap();
    host.pump(c.engine_mut(), 0).unwrap();
    assert_eq!(unloaded_indices(&c, &blocks), vec![4, 5, 6, 7]);
    assert_eq!(c.snapshot().detached, 3);

    let mut frames = YieldingFrames::new();
    let read = smol::block_on(c.extract_all(&mut host, &mut frames, 100)).unwrap();
    assert_eq!(frames.frames(), 2);
    assert_eq!(read.len(), 8);
    for (block, want) in read.iter().zip(&expected) {
        assert_eq!(&block.html, want);
    }
    assert_eq!(host.doc().attribute(blocks[7], UNLOADED_ATTR), None);

    host.pump(c.engine_mut(), 100).unwrap();
    assert_eq!(unloaded_indices(&c, &blocks), vec![4, 5, 6, 7]);
    assert_eq!(c.snapshot().detached, 4);
    assert!(c.engine().check_state_sync(&host).is_synchronized());
}

#[test]
fn extract_all_keeps_virtualization_off_when_it_was_off() {
    let (mut host, _, mut c) = attached(MemoryFlagStore::new());
    c.set_enabled(&mut host, false, 10).unwrap();

    let mut frames = YieldingFrames::new();
    let read = smol::block_on(c.extract_all(&mut host, &mut frames, 20)).unwrap();
    assert_eq!(read.len(), 50);
    assert!(!c.is_enabled());
    host.pump(c.engine_mut(), 20).unwrap();
    assert_eq!(c.snapshot().unloaded, 0);
    assert_eq!(c.store().raw(ENABLED_KEY), Some("false"));
}

#[test]
fn extract_all_failure_still_restores_the_prior_mode() {
    let (doc, _) = page(50);
    let mut host = host_for(doc);
    let mut c = Controller::new(options(), RuleSet::new(["div["]), MemoryFlagStore::new());
    assert!(matches!(c.attach(&mut host, 0), Err(Error::Discovery { .. })));

    let mut frames = YieldingFrames::new();
    let read = smol::block_on(c.extract_all(&mut host, &mut frames, 10));
    assert!(matches!(read, Err(Error::Discovery { .. })));
    assert_eq!(frames.frames(), 2);
    assert!(c.is_enabled());
}

#[test]
fn export_swallows_sink_failures() {
    let (mut host, _, mut c) = attached(MemoryFlagStore::new());
    let mut frames = YieldingFrames::new();

    let mut broken = MemorySink::rejecting();
    let delivered = smol::block_on(c.export(&mut host, &mut frames, &mut broken, 10)).unwrap();
    assert!(!delivered);
    assert!(c.is_enabled());

    let mut sink = MemorySink::new();
    let delivered = smol::block_on(c.export(&mut host, &mut frames, &mut sink, 20)).unwrap();
    assert!(delivered);
    assert_eq!(sink.deliveries().len(), 1);
    assert_eq!(sink.deliveries()[0].len(), 50);

    host.pump(c.engine_mut(), 20).unwrap();
    assert_eq!(c.snapshot().unloaded, 40);
}

#[test]
fn page_lifecycle_suspends_and_resumes_polling() {
    let (doc, _) = page(50);
    let mut host = SimHost::without_visibility_notifier(doc);
    host.resize_viewport(950);
    let mut c = Controller::new(options(), rules(), MemoryFlagStore::new());
    assert_eq!(c.attach(&mut host, 0).unwrap(), TrackingModeKind::Polling);
    assert_eq!(c.snapshot().unloaded, 40);

    c.on_page_hidden(&mut host);
    assert_eq!(c.snapshot().unloaded, 0);
    assert_eq!(c.on_page_visible(&mut host, 1_000).unwrap(), TrackingModeKind::Polling);
    assert_eq!(c.snapshot().unloaded, 40);
}

#[test]
fn shutdown_leaves_nothing_hidden() {
    let (mut host, blocks, mut c) = attached(MemoryFlagStore::new());
    c.shutdown(&mut host);
    assert!(blocks.iter().all(|b| !c.engine().is_unloaded(b)));
    assert_eq!(c.snapshot().tracked, 0);
    assert_eq!(host.observed_count(), 0);
    assert!(!host.is_subscribed());
}
