use crate::engine::Engine;
use crate::{BlockId, Host, NodeHandle};

impl<N: NodeHandle> Engine<N> {
    /// Returns the materialized HTML of `node` whatever its state. Never yields the placeholder
    /// and never fails; the worst case is the node's current content.
    pub fn extract_html<H: Host<Node = N>>(&mut self, host: &mut H, node: &N) -> String {
        let Some(id) = self.store.id_of(node) else {
            return host.inner_html(node);
        };
        let detached = match self.store.get(id).and_then(|r| r.unloaded()) {
            None => None,
            Some(unloaded) => Some(unloaded.children.as_ref().map(|c| host.fragment_html(c))),
        };

        match detached {
            None => {
                let html = host.inner_html(node);
                self.recall.set(id, html.clone());
                html
            }
            Some(Some(html)) => html,
            Some(None) => {
                let _err = crate::Error::ExtractionInconsistency(id);
                vdebug!(error = %_err, "extract_html: round trip");
                let recalled = self.recall.get(&id).cloned();
                match self.read_through_restore(host, id, node) {
                    Some(html) if !html.is_empty() => html,
                    _ => recalled.unwrap_or_else(|| host.inner_html(node)),
                }
            }
        }
    }

    /// Hidden restore → read → unload. The block ends in the state it started in, and its
    /// visibility is put back whatever happens.
    fn read_through_restore<H: Host<Node = N>>(
        &mut self,
        host: &mut H,
        id: BlockId,
        node: &N,
    ) -> Option<String> {
        let was_hidden = host.set_hidden(node, true);
        let html = if self.restore_id(host, id) {
            let html = host.inner_html(node);
            self.unload_id(host, id);
            Some(html)
        } else {
            None
        };
        host.set_hidden(node, was_hidden);
        html
    }
}
