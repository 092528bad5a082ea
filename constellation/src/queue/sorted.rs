//! # Rank-Sorted Tag Lists
//!
//! Arena-backed doubly linked lists, one per tag, each kept in ascending
//! rank order. A value may be linked into several lists at once (an `Or`
//! context mirrors its activity under every member tag). Each entry owns the
//! handles of all its list nodes, so removing it through any one list
//! unlinks every mirror directly instead of searching for it.
//!
//! Nodes and entries live in slot vectors with free lists; handles are plain
//! indices and stay valid until the entry is removed.

use std::collections::HashMap;

use constellation_api::StealStrategy;

pub type NodeHandle = usize;
type EntryHandle = usize;

#[derive(Debug)]
struct ListNode {
    entry: EntryHandle,
    list: usize,
    rank: i64,
    prev: Option<NodeHandle>,
    next: Option<NodeHandle>,
}

#[derive(Debug, Default)]
struct RankList {
    head: Option<NodeHandle>,
    tail: Option<NodeHandle>,
    len: usize,
}

#[derive(Debug)]
struct Entry<T> {
    value: T,
    mirrors: Vec<NodeHandle>,
}

#[derive(Debug)]
pub struct RankedLists<T> {
    lists: Vec<RankList>,
    index: HashMap<String, usize>,
    nodes: Vec<Option<ListNode>>,
    free_nodes: Vec<NodeHandle>,
    entries: Vec<Option<Entry<T>>>,
    free_entries: Vec<EntryHandle>,
    len: usize,
}

impl<T> Default for RankedLists<T> {
    fn default() -> Self {
        Self {
            lists: Vec::new(),
            index: HashMap::new(),
            nodes: Vec::new(),
            free_nodes: Vec::new(),
            entries: Vec::new(),
            free_entries: Vec::new(),
            len: 0,
        }
    }
}

impl<T> RankedLists<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct values, not list nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of nodes in the list for `tag`.
    pub fn list_len(&self, tag: &str) -> usize {
        self.index.get(tag).map(|&list| self.lists[list].len).unwrap_or(0)
    }

    /// Link `value` into the list of every `(tag, rank)` key.
    pub fn insert<I, S>(&mut self, keys: I, value: T)
    where
        I: IntoIterator<Item = (S, i64)>,
        S: AsRef<str>,
    {
        let entry = self.alloc_entry(Entry {
            value,
            mirrors: Vec::new(),
        });
        for (tag, rank) in keys {
            let list = self.list_for(tag.as_ref());
            let node = self.alloc_node(ListNode {
                entry,
                list,
                rank,
                prev: None,
                next: None,
            });
            self.link_sorted(list, node, rank);
            if let Some(slot) = self.entries[entry].as_mut() {
                slot.mirrors.push(node);
            }
        }
        self.len += 1;
    }

    /// The node a steal with `strategy` would take from the list for `tag`.
    pub fn candidate(&self, tag: &str, strategy: &StealStrategy) -> Option<(NodeHandle, i64)> {
        let list = &self.lists[*self.index.get(tag)?];
        let found = match *strategy {
            StealStrategy::Smallest => list.head,
            StealStrategy::Biggest | StealStrategy::Any => list.tail,
            StealStrategy::Value(v) => self.scan_from_head(list, |rank| rank >= v).filter(|&n| self.rank(n) == v),
            StealStrategy::Range(lo, hi) => self.scan_from_head(list, |rank| rank >= lo).filter(|&n| self.rank(n) <= hi),
        };
        found.map(|node| (node, self.rank(node)))
    }

    /// Remove the value owning `node`, unlinking it from every list.
    pub fn remove(&mut self, node: NodeHandle) -> Option<T> {
        let entry = self.nodes.get(node)?.as_ref()?.entry;
        let removed = self.entries.get_mut(entry)?.take()?;
        self.free_entries.push(entry);
        for mirror in removed.mirrors {
            self.unlink(mirror);
        }
        self.len -= 1;
        Some(removed.value)
    }

    /// Values in ascending rank order for `tag`.
    pub fn iter_tag<'a>(&'a self, tag: &str) -> impl Iterator<Item = (i64, &'a T)> + 'a {
        let mut cursor = self.index.get(tag).and_then(|&list| self.lists[list].head);
        std::iter::from_fn(move || {
            let node = self.nodes[cursor?].as_ref()?;
            cursor = node.next;
            let entry = self.entries[node.entry].as_ref()?;
            Some((node.rank, &entry.value))
        })
    }

    fn rank(&self, node: NodeHandle) -> i64 {
        self.nodes[node].as_ref().map(|n| n.rank).unwrap_or_default()
    }

    fn scan_from_head<F>(&self, list: &RankList, stop: F) -> Option<NodeHandle>
    where
        F: Fn(i64) -> bool,
    {
        let mut cursor = list.head;
        while let Some(handle) = cursor {
            let node = self.nodes[handle].as_ref()?;
            if stop(node.rank) {
                return Some(handle);
            }
            cursor = node.next;
        }
        None
    }

    fn list_for(&mut self, tag: &str) -> usize {
        if let Some(&list) = self.index.get(tag) {
            return list;
        }
        self.lists.push(RankList::default());
        let list = self.lists.len() - 1;
        self.index.insert(tag.to_string(), list);
        list
    }

    fn alloc_entry(&mut self, entry: Entry<T>) -> EntryHandle {
        match self.free_entries.pop() {
            Some(handle) => {
                self.entries[handle] = Some(entry);
                handle
            }
            None => {
                self.entries.push(Some(entry));
                self.entries.len() - 1
            }
        }
    }

    fn alloc_node(&mut self, node: ListNode) -> NodeHandle {
        match self.free_nodes.pop() {
            Some(handle) => {
                self.nodes[handle] = Some(node);
                handle
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    /// Insert after the last node whose rank is not greater than `rank`,
    /// walking from the tail so equal ranks keep insertion order.
    fn link_sorted(&mut self, list: usize, node: NodeHandle, rank: i64) {
        let mut after = self.lists[list].tail;
        while let Some(handle) = after {
            match self.nodes[handle].as_ref() {
                Some(n) if n.rank > rank => after = n.prev,
                _ => break,
            }
        }

        let next = match after {
            Some(handle) => self.nodes[handle].as_ref().and_then(|n| n.next),
            None => self.lists[list].head,
        };
        if let Some(n) = self.nodes[node].as_mut() {
            n.prev = after;
            n.next = next;
        }
        match after {
            Some(handle) => {
                if let Some(n) = self.nodes[handle].as_mut() {
                    n.next = Some(node);
                }
            }
            None => self.lists[list].head = Some(node),
        }
        match next {
            Some(handle) => {
                if let Some(n) = self.nodes[handle].as_mut() {
                    n.prev = Some(node);
                }
            }
            None => self.lists[list].tail = Some(node),
        }
        self.lists[list].len += 1;
    }

    fn unlink(&mut self, handle: NodeHandle) {
        let Some(node) = self.nodes[handle].take() else {
            return;
        };
        self.free_nodes.push(handle);
        match node.prev {
            Some(prev) => {
                if let Some(p) = self.nodes[prev].as_mut() {
                    p.next = node.next;
                }
            }
            None => self.lists[node.list].head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(n) = self.nodes[next].as_mut() {
                    n.prev = node.prev;
                }
            }
            None => self.lists[node.list].tail = node.prev,
        }
        self.lists[node.list].len -= 1;
    }
}
