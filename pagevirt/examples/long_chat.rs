use pagevirt::dom::Document;
use pagevirt::sim::SimHost;
use pagevirt::{Engine, EngineOptions, RoleRule, RuleSet};

fn main() {
    // Example: a 500-message page in a 900px viewport. Only blocks near the viewport stay
    // materialized; everything else is a placeholder of the same height.
    //
    // A real host would:
    // - forward its visibility/size/tree notifications to the engine's `on_*` methods
    // - call `on_frame` once per rendering frame and `on_tick` from a timer
    let mut doc = Document::new();
    let root = doc.root();
    let main = doc.append_element(root, "main", &[]);
    let mut blocks = Vec::new();
    for i in 0..500 {
        let role = if i % 2 == 0 { "user" } else { "assistant" };
        let block = doc.append_element(main, "div", &[("data-message-author-role", role)]);
        let body = doc.append_element(block, "div", &[("class", "markdown")]);
        doc.append_text(body, &format!("message {i}"), 80 + (i % 7) * 20);
        blocks.push(block);
    }

    let mut host = SimHost::new(doc);
    host.resize_viewport(900);

    let rules = RuleSet::new(["div[data-message-author-role]"])
        .with_role_rule(RoleRule::Attribute("data-message-author-role".into()));
    let mut engine = Engine::new(EngineOptions::new(), rules);

    let mode = engine.attach(&mut host, 0).expect("discovery");
    host.pump(&mut engine, 0).expect("pump");
    println!("mode={mode:?} {:?}", engine.snapshot());

    let mut now_ms = 0u64;
    for scroll_top in (0..40_000u64).step_by(8_000) {
        now_ms += 16;
        host.scroll_to(scroll_top);
        host.pump(&mut engine, now_ms).expect("pump");
        let snap = engine.snapshot();
        println!(
            "scroll={scroll_top} tracked={} unloaded={} cache={}/{}",
            snap.tracked, snap.unloaded, snap.cache_len, snap.cache_capacity
        );
    }

    let last = blocks[blocks.len() - 1];
    println!("last block: {}", engine.extract_html(&mut host, &last));
    engine.shutdown(&mut host);
    println!("after shutdown: {:?}", engine.snapshot());
}
