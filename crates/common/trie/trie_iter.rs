use ethereum_types::H256;

use crate::error::TrieError;
use crate::node::nibbles_to_bytes;
use crate::{PathRLP, Trie, ValueRLP};

/// Depth-first iterator over the (path, value) pairs of a [`Trie`], in
/// ascending path order. A backend failure or inconsistent node ends the
/// iteration; the terminating failure is reported by
/// [`take_error`](TrieIterator::take_error).
pub struct TrieIterator<'a> {
    trie: &'a Trie,
    // nodes left to visit, paired with their nibble path from the root
    stack: Vec<(H256, Vec<u8>)>,
    error: Option<TrieError>,
}

impl<'a> TrieIterator<'a> {
    pub(crate) fn new(trie: &'a Trie, root: Option<H256>) -> Self {
        let stack = match root {
            Some(root) => vec![(root, Vec::new())],
            None => Vec::new(),
        };
        Self {
            trie,
            stack,
            error: None,
        }
    }

    /// The failure that cut the iteration short, if any.
    pub fn take_error(&mut self) -> Option<TrieError> {
        self.error.take()
    }
}

impl Iterator for TrieIterator<'_> {
    type Item = (PathRLP, ValueRLP);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (node_hash, path) = self.stack.pop()?;
            let node = match self.trie.get_node(node_hash) {
                Ok(node) => node,
                Err(source) => {
                    self.error = Some(source);
                    self.stack.clear();
                    return None;
                }
            };
            // lower nibbles must pop first
            for nibble in (0..16u8).rev() {
                if let Some(child) = node.child(nibble) {
                    let mut child_path = path.clone();
                    child_path.push(nibble);
                    self.stack.push((child, child_path));
                }
            }
            // paths built from byte keys always have an even nibble count
            if let Some(value) = node.value {
                if path.len() % 2 == 0 {
                    return Some((nibbles_to_bytes(&path), value));
                }
            }
        }
    }
}
