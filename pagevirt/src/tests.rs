use crate::dom::{Document, NodeId, PLACEHOLDER_TEXT, Selector, UNLOADED_ATTR};
use crate::sim::SimHost;
use crate::*;

use std::cell::RefCell;
use std::rc::Rc;

const ROLE_ATTR: &str = "data-message-author-role";

#[derive(Clone, Copy, Debug)]
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0
    }

    fn gen_range_u32(&mut self, start: u32, end_exclusive: u32) -> u32 {
        debug_assert!(start < end_exclusive);
        start + (self.next_u64() % (end_exclusive - start) as u64) as u32
    }
}

fn rules() -> RuleSet {
    RuleSet::new(["div[data-message-author-role]"])
        .with_role_rule(RoleRule::Attribute(ROLE_ATTR.into()))
}

fn no_margin() -> EngineOptions {
    EngineOptions::new().with_margins(0.0, 0.0)
}

/// `<main>` holding `count` blocks of `height` px each, roles alternating user/assistant.
fn page(count: usize, height: u32) -> (Document, Vec<NodeId>) {
    let mut doc = Document::new();
    let root = doc.root();
    let main = doc.append_element(root, "main", &[]);
    let mut blocks = Vec::with_capacity(count);
    for i in 0..count {
        blocks.push(append_block(&mut doc, main, i, height));
    }
    (doc, blocks)
}

fn append_block(doc: &mut Document, parent: NodeId, i: usize, height: u32) -> NodeId {
    let role = if i % 2 == 0 { "user" } else { "assistant" };
    let block = doc.append_element(parent, "div", &[(ROLE_ATTR, role)]);
    let p = doc.append_element(block, "p", &[("class", "body")]);
    doc.append_text(p, &format!("message {i} <b>&</b>"), height);
    block
}

fn main_of(doc: &Document) -> NodeId {
    doc.select_first(doc.root(), "main").unwrap().unwrap()
}

fn unloaded_indices(engine: &Engine<NodeId>, blocks: &[NodeId]) -> Vec<usize> {
    blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| engine.is_unloaded(b))
        .map(|(i, _)| i)
        .collect()
}

/// 50 blocks of 100px, a 950px viewport, a full-viewport margin above and none below.
/// At scroll 0 exactly blocks 0..10 are in range.
fn scenario_host() -> (SimHost, Vec<NodeId>) {
    let (doc, blocks) = page(50, 100);
    let mut host = SimHost::new(doc);
    host.resize_viewport(950);
    (host, blocks)
}

fn scenario_engine() -> Engine<NodeId> {
    Engine::new(EngineOptions::new().with_margins(1.0, 0.0), rules())
}

fn attached_scenario() -> (SimHost, Vec<NodeId>, Engine<NodeId>) {
    let (mut host, blocks) = scenario_host();
    let mut engine = scenario_engine();
    assert_eq!(engine.attach(&mut host, 0).unwrap(), TrackingModeKind::EventDriven);
    host.pump(&mut engine, 0).unwrap();
    (host, blocks, engine)
}

#[test]
fn extent_intersection_is_inclusive_at_both_edges() {
    let band = Band {
        start: 100,
        end: 200,
    };
    assert!(Extent { top: 0, height: 100 }.intersects(band));
    assert!(Extent { top: 200, height: 50 }.intersects(band));
    assert!(!Extent { top: 0, height: 99 }.intersects(band));
    assert!(!Extent { top: 201, height: 10 }.intersects(band));

    let vp = Viewport {
        scroll_top: 50,
        height: 100,
    };
    let band = vp.band(Margin { top: 80, bottom: 20 });
    assert_eq!(band, Band { start: 0, end: 170 });
}

#[test]
fn selector_subset_matches_like_css() {
    let (doc, blocks) = page(2, 10);
    let main = main_of(&doc);

    let child = Selector::parse("main > div[data-message-author-role='assistant']").unwrap();
    assert!(!child.matches(&doc, blocks[0]));
    assert!(child.matches(&doc, blocks[1]));

    let p = doc.children(blocks[0])[0];
    assert!(Selector::parse("main p.body").unwrap().matches(&doc, p));
    assert!(!Selector::parse("main > p").unwrap().matches(&doc, p));
    assert!(Selector::parse("span, p").unwrap().matches(&doc, p));
    assert!(Selector::parse("*[data-message-author-role^=us]").unwrap().matches(&doc, blocks[0]));
    assert!(Selector::parse("[data-message-author-role$=ant]").unwrap().matches(&doc, blocks[1]));
    assert!(Selector::parse("[class~=body]").unwrap().matches(&doc, p));
    assert!(Selector::parse("MAIN").unwrap().matches(&doc, main));

    for bad in ["", "div[", "div >", "::before", "a,,b", "[x~y]", "div['x]"] {
        assert!(
            matches!(Selector::parse(bad), Err(Error::InvalidRule { .. })),
            "{bad:?} should not parse"
        );
    }
}

#[test]
fn unload_then_restore_is_byte_identical() {
    let (doc, blocks) = page(3, 100);
    let mut host = SimHost::new(doc);
    let mut engine = Engine::new(no_margin(), rules());
    let b = blocks[1];

    let outer_before = host.doc().outer_html(b);
    let inner_before = host.doc().inner_html(b);
    let children_before = host.doc().children(b).to_vec();

    assert!(engine.unload(&mut host, &b));
    assert!(engine.is_unloaded(&b));
    assert!(host.doc().inner_html(b).contains(PLACEHOLDER_TEXT));
    assert_eq!(host.doc().attribute(b, UNLOADED_ATTR), Some("true"));
    assert_eq!(host.doc().height(b), 100);
    assert_eq!(host.doc().top(blocks[2]), 200);

    assert!(engine.restore(&mut host, &b));
    assert_eq!(engine.state(&b), Some(BlockState::Materialized));
    assert_eq!(host.doc().outer_html(b), outer_before);
    assert_eq!(host.doc().inner_html(b), inner_before);
    assert_eq!(host.doc().children(b), children_before.as_slice());
}

fn build_nested(doc: &mut Document, parent: NodeId, rng: &mut Lcg, depth: u32) {
    let fan_out = rng.gen_range_u32(1, 4);
    for i in 0..fan_out {
        if depth == 0 || rng.gen_range_u32(0, 3) == 0 {
            let h = rng.gen_range_u32(0, 40);
            doc.append_text(parent, &format!("t{depth}.{i} \"q\" <x>"), h);
        } else {
            let tag = ["pre", "code", "span", "ul", "li"][rng.gen_range_u32(0, 5) as usize];
            let class = format!("hl-{}", rng.gen_range_u32(0, 9));
            let el = doc.append_element(parent, tag, &[("class", class.as_str())]);
            build_nested(doc, el, rng, depth - 1);
        }
    }
    if rng.gen_range_u32(0, 4) == 0 {
        doc.append_element(parent, "br", &[]);
    }
}

#[test]
fn restore_of_unload_round_trips_arbitrary_nesting() {
    let mut rng = Lcg::new(7);
    let mut doc = Document::new();
    let root = doc.root();
    let main = doc.append_element(root, "main", &[]);
    let mut blocks = Vec::new();
    for i in 0..24 {
        let role = if i % 3 == 0 { "user" } else { "assistant" };
        let block = doc.append_element(main, "div", &[(ROLE_ATTR, role)]);
        let depth = rng.gen_range_u32(0, 5);
        build_nested(&mut doc, block, &mut rng, depth);
        blocks.push(block);
    }

    let mut host = SimHost::new(doc);
    let mut engine = Engine::new(no_margin(), rules());
    for b in &blocks {
        let before = host.doc().inner_html(*b);
        engine.unload(&mut host, b);
        assert_eq!(engine.extract_html(&mut host, b), before);
        assert!(engine.is_unloaded(b), "extraction must not restore");
        engine.restore(&mut host, b);
        assert_eq!(host.doc().inner_html(*b), before);
    }
    assert_eq!(engine.snapshot().unloaded, 0);
}

#[test]
fn transitions_are_idempotent() {
    let (doc, blocks) = page(2, 100);
    let mut host = SimHost::new(doc);
    let mut engine = Engine::new(no_margin(), rules());
    let b = blocks[0];
    let before = host.doc().inner_html(b);

    assert!(!engine.restore(&mut host, &b), "untracked");
    assert!(engine.unload(&mut host, &b));
    let unloaded_once = host.doc().inner_html(b);
    assert!(!engine.unload(&mut host, &b));
    assert_eq!(host.doc().inner_html(b), unloaded_once);
    assert_eq!(host.doc().children(b).len(), 1);
    assert_eq!(host.watch_count(), 1);
    assert_eq!(engine.snapshot().unloaded, 1);

    assert!(engine.restore(&mut host, &b));
    assert!(!engine.restore(&mut host, &b));
    assert_eq!(host.doc().inner_html(b), before);
    assert_eq!(host.watch_count(), 0);
    assert_eq!(engine.snapshot().unloaded, 0);
}

#[test]
fn placeholder_keeps_measured_height_and_tracks_size_changes() {
    let (mut doc, blocks) = page(2, 130);
    let main = main_of(&doc);
    let empty = doc.append_element(main, "div", &[(ROLE_ATTR, "user")]);
    let mut host = SimHost::new(doc);
    let mut engine = Engine::new(no_margin(), rules());
    let b = blocks[0];

    engine.unload(&mut host, &b);
    assert_eq!(engine.placeholder_height(&b), Some(130));
    assert_eq!(host.doc().height(b), 130);
    assert!(host.is_watched(b));

    host.notify_size(&mut engine, b, 180);
    assert_eq!(engine.placeholder_height(&b), Some(180));
    assert_eq!(host.doc().height(b), 180);
    assert_eq!(host.doc().top(blocks[1]), 180);

    host.notify_size(&mut engine, b, 0);
    assert_eq!(engine.placeholder_height(&b), Some(DEFAULT_MIN_PLACEHOLDER_HEIGHT));

    engine.restore(&mut host, &b);
    assert_eq!(engine.placeholder_height(&b), None);
    assert!(!host.is_watched(b));
    assert_eq!(host.doc().height(b), 130);

    engine.unload(&mut host, &empty);
    assert_eq!(engine.placeholder_height(&empty), Some(DEFAULT_MIN_PLACEHOLDER_HEIGHT));
}

#[test]
fn discovery_keeps_only_top_level_blocks() {
    let mut doc = Document::new();
    let root = doc.root();
    let main = doc.append_element(root, "main", &[]);
    let mut outer = Vec::new();
    for i in 0..4 {
        let block = doc.append_element(main, "div", &[("class", "turn"), (ROLE_ATTR, "user")]);
        let inner = doc.append_element(block, "div", &[("class", "markdown")]);
        doc.append_text(inner, &format!("m{i}"), 20);
        outer.push(block);
    }
    let host = SimHost::new(doc);

    let rules = RuleSet::new([
        "div.turn[data-message-author-role]",
        "div.markdown",
        "main div",
        "div.turn",
    ]);
    let engine: Engine<NodeId> = Engine::new(no_margin(), rules);
    let found = engine.find_blocks(&host).unwrap();
    assert_eq!(found, outer);
}

#[test]
fn discovery_skips_malformed_rules_and_fails_only_when_all_fail() {
    let (doc, blocks) = page(3, 10);
    let host = SimHost::new(doc);

    let engine: Engine<NodeId> = Engine::new(
        no_margin(),
        RuleSet::new(["div[", "div[data-message-author-role]"]),
    );
    assert_eq!(engine.find_blocks(&host).unwrap(), blocks);

    let engine: Engine<NodeId> = Engine::new(no_margin(), RuleSet::new(["div[", "::"]));
    match engine.find_blocks(&host) {
        Err(Error::Discovery { failures }) => {
            assert_eq!(failures.len(), 2);
            assert_eq!(failures[0].rule, "div[");
        }
        other => panic!("expected discovery failure, got {other:?}"),
    }
}

#[test]
fn discovery_root_falls_back_to_document() {
    let mut doc = Document::new();
    let root = doc.root();
    let region = doc.append_element(root, "div", &[("role", "main")]);
    let inside = append_block(&mut doc, region, 0, 10);
    let outside = append_block(&mut doc, root, 1, 10);
    let host = SimHost::new(doc);

    let engine: Engine<NodeId> = Engine::new(no_margin(), rules());
    let found = engine.find_blocks(&host).unwrap();
    assert_eq!(found, vec![inside]);
    assert!(!found.contains(&outside));

    let mut doc = Document::new();
    let root = doc.root();
    let lone = append_block(&mut doc, root, 0, 10);
    let host = SimHost::new(doc);
    assert_eq!(engine.find_blocks(&host).unwrap(), vec![lone]);
}

#[test]
fn recall_cache_evicts_least_recently_used() {
    let mut cache = RecallCache::new(3);
    cache.set(1, "a");
    cache.set(2, "b");
    cache.set(3, "c");
    cache.set(4, "d");
    assert!(!cache.has(&1));
    assert_eq!(cache.len(), 3);

    // `get` protects 2 from the next eviction.
    assert_eq!(cache.get(&2), Some(&"b"));
    cache.set(5, "e");
    assert!(cache.has(&2));
    assert!(!cache.has(&3));
    assert!(cache.has(&4) && cache.has(&5));

    // `set` on an existing key refreshes it too.
    cache.set(4, "d2");
    cache.set(6, "f");
    assert!(!cache.has(&2));
    assert_eq!(cache.get(&4), Some(&"d2"));

    // `peek` and `has` leave recency alone: 5 is still the oldest.
    assert_eq!(cache.peek(&5), Some(&"e"));
    cache.set(7, "g");
    assert!(!cache.has(&5));

    assert_eq!(cache.delete(&4), Some("d2"));
    assert_eq!(cache.delete(&4), None);
    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.capacity(), 3);
}

#[test]
fn recall_cache_release_hook_sees_evictions_only() {
    let evicted = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&evicted);
    let mut cache = RecallCache::new(1).with_release_hook(move |k: u32, v: String| {
        sink.borrow_mut().push((k, v));
    });
    cache.set(1, "one".to_string());
    cache.set(2, "two".to_string());
    cache.delete(&2);
    cache.set(3, "three".to_string());
    cache.set(3, "three again".to_string());
    assert_eq!(*evicted.borrow(), vec![(1, "one".to_string())]);
    assert_eq!(cache.peek(&3).map(String::as_str), Some("three again"));
}

#[test]
fn scenario_event_driven_unloads_off_screen_blocks() {
    let (mut host, blocks, mut engine) = attached_scenario();

    assert_eq!(engine.mode(), TrackingModeKind::EventDriven);
    assert_eq!(host.observed_count(), 50);
    assert_eq!(unloaded_indices(&engine, &blocks), (10..50).collect::<Vec<_>>());
    let snap = engine.snapshot();
    assert_eq!(snap.tracked, 50);
    assert_eq!(snap.unloaded, 40);
    assert_eq!(snap.watchers, 40);
    assert_eq!(snap.detached, 40);

    // Reveal blocks 10..15; the top margin keeps 0..10 in range.
    host.scroll_to(500);
    host.pump(&mut engine, 10).unwrap();
    assert_eq!(unloaded_indices(&engine, &blocks), (15..50).collect::<Vec<_>>());
    assert_eq!(engine.snapshot().unloaded, 35);

    host.scroll_to(2000);
    host.pump(&mut engine, 20).unwrap();
    for i in 10..15 {
        assert!(!engine.is_unloaded(&blocks[i]), "block {i} is still in range");
    }

    host.scroll_to(4000);
    host.pump(&mut engine, 30).unwrap();
    for i in 10..15 {
        assert!(engine.is_unloaded(&blocks[i]), "block {i} left the range");
    }
    assert!(engine.check_state_sync(&host).is_synchronized());
}

fn geometric_decisions(host: &SimHost, engine: &Engine<NodeId>, blocks: &[NodeId]) -> Vec<bool> {
    let band = host
        .viewport()
        .band(engine.options().margin_px(host.viewport().height));
    blocks.iter().map(|b| !host.extent(b).intersects(band)).collect()
}

#[test]
fn scenario_polling_fallback_matches_geometry_and_event_driven() {
    let (_, _, event_engine) = attached_scenario();
    let (doc, blocks) = page(50, 100);
    let mut host = SimHost::without_visibility_notifier(doc);
    host.resize_viewport(950);
    let mut engine = scenario_engine();

    assert_eq!(engine.attach(&mut host, 0).unwrap(), TrackingModeKind::Polling);
    assert_eq!(host.observed_count(), 0);
    let decided: Vec<bool> = blocks.iter().map(|b| engine.is_unloaded(b)).collect();
    assert_eq!(decided, geometric_decisions(&host, &engine, &blocks));
    assert_eq!(engine.snapshot().unloaded, event_engine.snapshot().unloaded);

    host.scroll_to(500);
    engine.on_scroll(&mut host);
    assert_eq!(unloaded_indices(&engine, &blocks), (15..50).collect::<Vec<_>>());

    // Without a scroll notification the interval picks the change up.
    host.scroll_to(2000);
    engine.on_tick(&mut host, 799);
    assert!(!engine.is_unloaded(&blocks[0]));
    engine.on_tick(&mut host, 800);
    let decided: Vec<bool> = blocks.iter().map(|b| engine.is_unloaded(b)).collect();
    assert_eq!(decided, geometric_decisions(&host, &engine, &blocks));
    assert!(engine.is_unloaded(&blocks[0]));

    // Polling stays the mechanism for the rest of the session.
    assert_eq!(engine.refresh(&mut host, 900).unwrap(), TrackingModeKind::Polling);
}

#[test]
fn scenario_extraction_returns_real_content_and_keeps_state() {
    // 8 blocks, blocks 0..4 in range. Block 7 was re-rendered by the host with the unloaded
    // flag copied over, so the engine never held its children.
    let (mut doc, blocks) = page(8, 100);
    doc.set_attribute(blocks[7], UNLOADED_ATTR, "true");
    let expected: Vec<String> = blocks.iter().map(|b| doc.inner_html(*b)).collect();
    let mut host = SimHost::new(doc);
    host.resize_viewport(350);
    let mut engine = Engine::new(no_margin(), rules());

    engine.attach(&mut host, 0).unwrap();
    host.pump(&mut engine, 0).unwrap();
    assert_eq!(unloaded_indices(&engine, &blocks), vec![4, 5, 6, 7]);
    assert_eq!(engine.snapshot().detached, 3);
    let placeholder_html = host.doc().inner_html(blocks[4]);

    for (b, want) in blocks.iter().zip(&expected) {
        assert_eq!(&engine.extract_html(&mut host, b), want);
    }

    assert_eq!(unloaded_indices(&engine, &blocks), vec![4, 5, 6, 7]);
    assert_eq!(host.doc().inner_html(blocks[4]), placeholder_html);
    assert!(blocks.iter().all(|b| !host.doc().is_hidden(*b)));
    assert_eq!(engine.snapshot().detached, 4);
    assert!(engine.check_state_sync(&host).is_synchronized());

    host.pump(&mut engine, 5).unwrap();
    assert_eq!(unloaded_indices(&engine, &blocks), vec![4, 5, 6, 7]);
}

#[test]
fn removed_blocks_leave_no_records_behind() {
    let (doc, blocks) = page(5, 100);
    let kids_of_4 = doc.children(blocks[4]).to_vec();
    let mut host = SimHost::new(doc);
    host.resize_viewport(250);
    let mut engine = Engine::new(no_margin(), rules());
    engine.attach(&mut host, 0).unwrap();
    host.pump(&mut engine, 0).unwrap();
    assert_eq!(unloaded_indices(&engine, &blocks), vec![3, 4]);

    let id1 = engine.block_id(&blocks[1]).unwrap();
    let id4 = engine.block_id(&blocks[4]).unwrap();
    engine.extract_html(&mut host, &blocks[1]);
    assert!(engine.recall_cache().has(&id1));
    assert!(engine.recall_cache().has(&id4));

    host.doc_mut().detach(blocks[1]);
    host.doc_mut().detach(blocks[4]);
    host.pump(&mut engine, 16).unwrap();

    assert_eq!(engine.block_id(&blocks[1]), None);
    assert_eq!(engine.block_id(&blocks[4]), None);
    assert!(!engine.recall_cache().has(&id1));
    assert!(!engine.recall_cache().has(&id4));
    assert!(!host.is_observed(blocks[1]) && !host.is_observed(blocks[4]));
    assert!(!host.is_watched(blocks[4]));
    // The detached content went back into the removed node, so re-inserting it shows content.
    assert_eq!(host.doc().children(blocks[4]), kids_of_4.as_slice());
    assert_eq!(host.doc().attribute(blocks[4], UNLOADED_ATTR), None);

    let snap = engine.snapshot();
    assert_eq!(snap.tracked, 3);
    assert_eq!(snap.unloaded, unloaded_indices(&engine, &blocks).len());
    assert_eq!(snap.watchers, host.watch_count());
    assert_eq!(host.observed_count(), 3);
    assert!(engine.check_state_sync(&host).is_synchronized());
}

#[test]
fn wrapping_an_unloaded_block_in_a_new_container_keeps_its_content() {
    let hosts: [fn(Document) -> SimHost; 2] = [SimHost::new, SimHost::without_visibility_notifier];
    for make_host in hosts {
        let (doc, blocks) = page(8, 100);
        let before = doc.inner_html(blocks[6]);
        let mut host = make_host(doc);
        host.resize_viewport(350);
        let turns = RuleSet::new(["section.turn", "div[data-message-author-role]"])
            .with_role_rule(RoleRule::Attribute(ROLE_ATTR.into()));
        let mut engine = Engine::new(no_margin(), turns);
        engine.attach(&mut host, 0).unwrap();
        host.pump(&mut engine, 0).unwrap();
        assert_eq!(unloaded_indices(&engine, &blocks), vec![4, 5, 6, 7]);

        let section = host.doc_mut().create_element("section");
        host.doc_mut().set_attribute(section, "class", "turn");
        host.doc_mut().replace_child(blocks[6], section);
        host.doc_mut().append_child(section, blocks[6]);
        host.pump(&mut engine, 16).unwrap();

        assert_eq!(engine.block_id(&blocks[6]), None);
        assert!(engine.is_unloaded(&section));
        assert_eq!(host.doc().attribute(blocks[6], UNLOADED_ATTR), None);

        let main = main_of(host.doc());
        append_block(host.doc_mut(), main, 8, 100);
        host.pump(&mut engine, 32).unwrap();
        assert!(engine.is_unloaded(&section));

        engine.set_enabled(&mut host, false, 48).unwrap();
        assert_eq!(host.doc().inner_html(blocks[6]), before);
        assert_eq!(host.doc().attribute(blocks[6], UNLOADED_ATTR), None);
        assert!(!host.doc().inner_html(main).contains(PLACEHOLDER_TEXT));
        assert!(engine.check_state_sync(&host).is_synchronized());
    }
}

#[test]
fn tree_changes_are_filtered_and_coalesced() {
    let (mut host, blocks, mut engine) = attached_scenario();
    let main = main_of(host.doc());
    host.take_tree_changes();

    let noise = host.doc_mut().append_element(main, "span", &[]);
    let batch = host.take_tree_changes();
    assert!(!engine.on_tree_changes(&mut host, &batch));
    assert!(!engine.has_pending_flush());

    // Edits inside a tracked block never qualify by themselves.
    engine.restore(&mut host, &blocks[20]);
    let batch = host.take_tree_changes();
    assert!(!engine.on_tree_changes(&mut host, &batch));
    engine.unload(&mut host, &blocks[20]);
    host.take_tree_changes();

    let a = append_block(host.doc_mut(), main, 50, 100);
    let first = host.take_tree_changes();
    let b = append_block(host.doc_mut(), main, 51, 100);
    let second = host.take_tree_changes();
    assert!(engine.on_tree_changes(&mut host, &first));
    assert!(engine.on_tree_changes(&mut host, &second));
    assert!(engine.has_pending_flush());

    assert!(engine.on_frame(&mut host, 16).unwrap());
    assert!(!engine.on_frame(&mut host, 17).unwrap());
    host.pump(&mut engine, 18).unwrap();

    assert!(engine.is_unloaded(&a) && engine.is_unloaded(&b));
    assert_eq!(engine.snapshot().tracked, 52);
    assert_eq!(engine.block_id(&noise), None);
}

#[test]
fn empty_page_polls_until_blocks_appear() {
    let mut doc = Document::new();
    let root = doc.root();
    let main = doc.append_element(root, "main", &[]);
    let mut host = SimHost::new(doc);
    host.resize_viewport(300);
    let mut engine = Engine::new(no_margin(), rules());

    assert_eq!(engine.attach(&mut host, 0).unwrap(), TrackingModeKind::Polling);
    let blocks: Vec<_> = (0..6).map(|i| append_block(host.doc_mut(), main, i, 100)).collect();
    host.pump(&mut engine, 16).unwrap();

    assert_eq!(engine.mode(), TrackingModeKind::EventDriven);
    assert_eq!(unloaded_indices(&engine, &blocks), vec![4, 5]);

    // The stopped polling timer no longer drives transitions.
    host.scroll_to(300);
    engine.on_tick(&mut host, 5_000);
    assert_eq!(unloaded_indices(&engine, &blocks), vec![4, 5]);
}

#[test]
fn disabling_restores_everything_and_stops_tracking() {
    let (mut host, blocks, mut engine) = attached_scenario();
    assert_eq!(engine.set_enabled(&mut host, false, 50).unwrap(), TrackingModeKind::Inactive);
    assert!(unloaded_indices(&engine, &blocks).is_empty());
    assert_eq!(host.observed_count(), 0);
    assert_eq!(host.watch_count(), 0);
    assert!(!engine.snapshot().enabled);

    // Late events while disabled only ever restore.
    let late = [VisibilityEvent {
        node: blocks[40],
        visible: false,
    }];
    engine.on_visibility(&mut host, &late, 60);
    assert!(!engine.is_unloaded(&blocks[40]));

    assert_eq!(engine.set_enabled(&mut host, true, 70).unwrap(), TrackingModeKind::EventDriven);
    host.pump(&mut engine, 70).unwrap();
    assert_eq!(engine.snapshot().unloaded, 40);
}

#[test]
fn background_page_suspends_polling_after_restoring() {
    let (doc, blocks) = page(50, 100);
    let mut host = SimHost::without_visibility_notifier(doc);
    host.resize_viewport(950);
    let mut engine = scenario_engine();
    engine.attach(&mut host, 0).unwrap();
    assert_eq!(engine.snapshot().unloaded, 40);

    engine.on_page_hidden(&mut host);
    assert_eq!(engine.snapshot().unloaded, 0);
    engine.on_tick(&mut host, 10_000);
    engine.on_scroll(&mut host);
    assert_eq!(engine.snapshot().unloaded, 0);

    assert_eq!(engine.on_page_visible(&mut host, 10_100).unwrap(), TrackingModeKind::Polling);
    assert_eq!(unloaded_indices(&engine, &blocks), (10..50).collect::<Vec<_>>());
}

#[test]
fn background_page_keeps_event_driven_registrations() {
    let (mut host, _blocks, mut engine) = attached_scenario();
    engine.on_page_hidden(&mut host);
    assert_eq!(engine.snapshot().unloaded, 40);
    assert_eq!(host.observed_count(), 50);

    assert_eq!(engine.on_page_visible(&mut host, 100).unwrap(), TrackingModeKind::EventDriven);
    host.pump(&mut engine, 100).unwrap();
    assert_eq!(engine.snapshot().unloaded, 40);
    assert_eq!(host.observed_count(), 50);
}

#[test]
fn delayed_restores_fire_on_tick_and_cancel_on_exit() {
    let (mut host, blocks, mut engine) = attached_scenario();
    engine.set_restore_delay_ms(100);

    host.scroll_to(500);
    host.pump(&mut engine, 1_000).unwrap();
    assert!(engine.is_unloaded(&blocks[12]));
    engine.on_tick(&mut host, 1_099);
    assert!(engine.is_unloaded(&blocks[12]));
    engine.on_tick(&mut host, 1_100);
    assert_eq!(unloaded_indices(&engine, &blocks), (15..50).collect::<Vec<_>>());

    host.scroll_to(1_000);
    host.pump(&mut engine, 2_000).unwrap();
    host.scroll_to(500);
    host.pump(&mut engine, 2_010).unwrap();
    engine.on_tick(&mut host, 5_000);
    assert!(engine.is_unloaded(&blocks[19]));
}

#[test]
fn roles_are_classified_with_an_explicit_unknown() {
    let (mut doc, blocks) = page(2, 10);
    let main = main_of(&doc);
    let anonymous = doc.append_element(main, "div", &[("class", "msg")]);
    let host = SimHost::new(doc);

    let engine: Engine<NodeId> = Engine::new(no_margin(), rules());
    assert_eq!(engine.classify(&host, &blocks[0]), Role::User);
    assert_eq!(engine.classify(&host, &blocks[1]), Role::Assistant);
    assert_eq!(engine.classify(&host, &anonymous), Role::Unknown);

    let marker = RuleSet::new(["div.msg"]).with_role_rule(RoleRule::ClassMarker {
        marker: "msg".into(),
        role: Role::User,
    });
    let engine: Engine<NodeId> = Engine::new(no_margin(), marker);
    assert_eq!(engine.classify(&host, &anonymous), Role::User);
    assert_eq!(engine.classify(&host, &blocks[1]), Role::Unknown);

    let none: Engine<NodeId> = Engine::new(no_margin(), RuleSet::new(["div"]));
    assert_eq!(none.classify(&host, &blocks[0]), Role::Unknown);
    assert_eq!(Role::parse(" Assistant "), Role::Assistant);
    assert_eq!(Role::parse("system"), Role::Unknown);
}

#[test]
fn invalid_options_are_reset_to_defaults() {
    let bad = EngineOptions::new()
        .with_margins(-1.0, f32::NAN)
        .with_min_placeholder_height(0)
        .with_poll_interval_ms(0)
        .with_recall_capacity(0);
    assert!(matches!(bad.validate(), Err(Error::Configuration(_))));

    let engine: Engine<NodeId> = Engine::new(bad, rules());
    let opts = engine.options();
    assert_eq!(opts.margin_top, DEFAULT_MARGIN);
    assert_eq!(opts.margin_bottom, DEFAULT_MARGIN);
    assert_eq!(opts.min_placeholder_height, DEFAULT_MIN_PLACEHOLDER_HEIGHT);
    assert_eq!(opts.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    assert_eq!(engine.snapshot().cache_capacity, DEFAULT_RECALL_CAPACITY);
    assert!(opts.validate().is_ok());

    let kept = EngineOptions::new().with_margins(0.25, 1.5).sanitized();
    assert_eq!(kept.margin_px(800), Margin { top: 200, bottom: 1200 });
}

#[test]
fn disabled_engine_stays_inactive_until_enabled() {
    let (mut host, blocks) = scenario_host();
    let mut engine = Engine::new(EngineOptions::new().with_enabled(false), rules());
    assert_eq!(engine.attach(&mut host, 0).unwrap(), TrackingModeKind::Inactive);
    host.pump(&mut engine, 0).unwrap();
    assert!(unloaded_indices(&engine, &blocks).is_empty());
    assert!(host.is_subscribed());
}

#[test]
fn interval_timer_stop_is_idempotent() {
    let mut timer = IntervalTimer::new(0);
    assert_eq!(timer.interval_ms(), 1);
    let mut timer = IntervalTimer::new(800);
    assert!(!timer.fire(10_000));
    timer.start(100);
    timer.start(500);
    assert_eq!(timer.next_due_ms(), Some(900));
    assert!(!timer.fire(899));
    assert!(timer.fire(900));
    assert_eq!(timer.next_due_ms(), Some(1_700));
    timer.stop();
    timer.stop();
    assert!(!timer.is_running());
    assert!(!timer.fire(1_700));
}

#[test]
fn state_sync_detects_counter_drift() {
    let (mut host, blocks, engine) = attached_scenario();
    let sync = engine.check_state_sync(&host);
    assert_eq!(sync, StateSync { counter: 40, flagged_in_tree: 40 });

    host.doc_mut().remove_attribute(blocks[30], UNLOADED_ATTR);
    let sync = engine.check_state_sync(&host);
    assert!(!sync.is_synchronized());
    assert_eq!(sync.flagged_in_tree, 39);
}

#[test]
fn shutdown_restores_and_releases_everything() {
    let (mut host, blocks, mut engine) = attached_scenario();
    engine.shutdown(&mut host);

    assert!(blocks.iter().all(|b| host.doc().attribute(*b, UNLOADED_ATTR).is_none()));
    assert!(!host.is_subscribed());
    assert_eq!(host.observed_count(), 0);
    assert_eq!(host.watch_count(), 0);
    let snap = engine.snapshot();
    assert_eq!(snap.tracked, 0);
    assert_eq!(snap.unloaded, 0);
    assert_eq!(snap.cache_len, 0);
    assert_eq!(snap.mode, TrackingModeKind::Inactive);
}
