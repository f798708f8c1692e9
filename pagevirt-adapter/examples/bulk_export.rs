use pagevirt::dom::Document;
use pagevirt::sim::SimHost;
use pagevirt::{EngineOptions, RoleRule, RuleSet};
use pagevirt_adapter::{Controller, MemoryFlagStore, MemorySink, YieldingFrames};

fn main() {
    // Example: copy a whole conversation while most of it is unloaded.
    //
    // `export` turns virtualization off, waits two frames, reads every block, turns it back
    // on, and hands the blocks to a sink. A failing sink never changes engine state.
    let mut doc = Document::new();
    let root = doc.root();
    let main = doc.append_element(root, "main", &[]);
    for i in 0..200 {
        let role = if i % 2 == 0 { "user" } else { "assistant" };
        let block = doc.append_element(main, "div", &[("data-message-author-role", role)]);
        doc.append_text(block, &format!("message {i}"), 120);
    }
    let mut host = SimHost::new(doc);
    host.resize_viewport(800);

    let rules = RuleSet::new(["div[data-message-author-role]"])
        .with_role_rule(RoleRule::Attribute("data-message-author-role".into()));
    let mut c = Controller::new(EngineOptions::new(), rules, MemoryFlagStore::new());
    c.attach(&mut host, 0).expect("discovery");
    host.pump(c.engine_mut(), 0).expect("pump");
    println!("before export: {:?}", c.snapshot());

    let mut frames = YieldingFrames::new();
    let mut sink = MemorySink::new();
    let delivered =
        smol::block_on(c.export(&mut host, &mut frames, &mut sink, 16)).expect("export");
    host.pump(c.engine_mut(), 32).expect("pump");

    let blocks = &sink.deliveries()[0];
    println!(
        "delivered={delivered} blocks={} first={:?} after export: {:?}",
        blocks.len(),
        blocks[0],
        c.snapshot()
    );
}
