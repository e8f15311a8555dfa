//! Ready queue of process control blocks
//!
//! A doubly linked list whose nodes live in an `Arena`, so unlinking by
//! handle is O(1) and a removed node's handle can never alias a new one.

use crate::arena::{Arena, Handle};
use crate::policy::Insertion;
use crate::process::Pcb;

pub type NodeId = Handle<Node>;

pub struct Node {
    pcb: Pcb,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

#[derive(Default)]
pub struct ReadyQueue {
    nodes: Arena<Node>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn head(&self) -> Option<&Pcb> {
        self.head.and_then(|id| self.nodes.get(id)).map(|node| &node.pcb)
    }

    pub fn push(&mut self, pcb: Pcb, insertion: Insertion) -> NodeId {
        match insertion {
            Insertion::Tail => {
                let after = self.tail;
                self.link_after(after, pcb)
            }
            Insertion::Head => self.link_after(None, pcb),
            Insertion::Priority => {
                // The last PCB whose score does not exceed the new one keeps
                // equal scores in arrival order
                let mut cursor = self.tail;
                while let Some(id) = cursor {
                    let node = match self.nodes.get(id) {
                        Some(node) => node,
                        None => break,
                    };
                    if node.pcb.score <= pcb.score {
                        break;
                    }
                    cursor = node.prev;
                }
                self.link_after(cursor, pcb)
            }
        }
    }

    /// Insert a new node after `after`, or at the head when `after` is None
    fn link_after(&mut self, after: Option<NodeId>, pcb: Pcb) -> NodeId {
        let next = match after {
            Some(prev) => self.nodes.get(prev).and_then(|node| node.next),
            None => self.head,
        };
        let id = self.nodes.insert(Node {
            pcb,
            prev: after,
            next,
        });
        match after.and_then(|prev| self.nodes.get_mut(prev)) {
            Some(prev) => prev.next = Some(id),
            None => self.head = Some(id),
        }
        match next.and_then(|next| self.nodes.get_mut(next)) {
            Some(next) => next.prev = Some(id),
            None => self.tail = Some(id),
        }
        id
    }

    /// Detach and return the head
    pub fn pop_head(&mut self) -> Option<Pcb> {
        let head = self.head?;
        self.remove(head)
    }

    /// Unlink an arbitrary queued PCB
    pub fn remove(&mut self, id: NodeId) -> Option<Pcb> {
        let node = self.nodes.remove(id)?;
        match node.prev.and_then(|prev| self.nodes.get_mut(prev)) {
            Some(prev) => prev.next = node.next,
            None => self.head = node.next,
        }
        match node.next.and_then(|next| self.nodes.get_mut(next)) {
            Some(next) => next.prev = node.prev,
            None => self.tail = node.prev,
        }
        Some(node.pcb)
    }

    /// Lower every queued score by one, floored at zero
    pub fn age_all(&mut self) {
        for node in self.nodes.values_mut() {
            node.pcb.age();
        }
    }

    /// Queued PCBs from head to tail
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            queue: self,
            cursor: self.head,
        }
    }

    /// Verify the head/tail and prev/next links agree
    pub fn check_links(&self) -> Result<(), String> {
        let mut prev: Option<NodeId> = None;
        let mut cursor = self.head;
        let mut seen = 0;
        while let Some(id) = cursor {
            let node = self
                .nodes
                .get(id)
                .ok_or_else(|| format!("link to stale node {:?}", id))?;
            if node.prev != prev {
                return Err(format!("node {:?} has prev {:?}, expected {:?}", id, node.prev, prev));
            }
            seen += 1;
            if seen > self.nodes.len() {
                return Err("cycle in ready queue".to_string());
            }
            prev = Some(id);
            cursor = node.next;
        }
        if self.tail != prev {
            return Err(format!("tail is {:?}, last node is {:?}", self.tail, prev));
        }
        if seen != self.nodes.len() {
            return Err(format!("{} nodes reachable, {} allocated", seen, self.nodes.len()));
        }
        Ok(())
    }
}

pub struct Iter<'a> {
    queue: &'a ReadyQueue,
    cursor: Option<NodeId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Pcb;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.queue.nodes.get(self.cursor?)?;
        self.cursor = node.next;
        Some(&node.pcb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ScriptSource;
    use crate::process::Pid;
    use crate::registry::{ScriptId, ScriptMeta};
    use proptest::prelude::*;

    fn script() -> ScriptId {
        let mut scripts = Arena::new();
        scripts.insert(ScriptMeta::new(ScriptSource::inline("q", Vec::new()), 0, 3))
    }

    fn pcb(pid: u64, score: usize) -> Pcb {
        let mut pcb = Pcb::new(Pid(pid), script(), score);
        pcb.score = score;
        pcb
    }

    fn pids(queue: &ReadyQueue) -> Vec<u64> {
        queue.iter().map(|p| p.pid.0).collect()
    }

    #[test]
    fn test_empty_queue() {
        let mut queue = ReadyQueue::new();
        assert!(queue.is_empty());
        assert!(queue.head().is_none());
        assert!(queue.pop_head().is_none());
        assert!(queue.check_links().is_ok());
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = ReadyQueue::new();
        for pid in 1..=3 {
            queue.push(pcb(pid, 10), Insertion::Tail);
        }
        assert_eq!(pids(&queue), vec![1, 2, 3]);
        assert_eq!(queue.pop_head().map(|p| p.pid), Some(Pid(1)));
        assert_eq!(pids(&queue), vec![2, 3]);
        assert!(queue.check_links().is_ok());
    }

    #[test]
    fn test_head_insert() {
        let mut queue = ReadyQueue::new();
        queue.push(pcb(1, 1), Insertion::Tail);
        queue.push(pcb(2, 100), Insertion::Head);
        assert_eq!(pids(&queue), vec![2, 1]);
    }

    // =========================================================================
    // Priority insertion
    // =========================================================================

    #[test]
    fn test_priority_insert_orders_by_score() {
        let mut queue = ReadyQueue::new();
        queue.push(pcb(1, 5), Insertion::Priority);
        queue.push(pcb(2, 2), Insertion::Priority);
        queue.push(pcb(3, 9), Insertion::Priority);
        queue.push(pcb(4, 4), Insertion::Priority);
        assert_eq!(pids(&queue), vec![2, 4, 1, 3]);
        assert!(queue.check_links().is_ok());
    }

    #[test]
    fn test_priority_insert_equal_scores_keep_arrival_order() {
        let mut queue = ReadyQueue::new();
        queue.push(pcb(1, 3), Insertion::Priority);
        queue.push(pcb(2, 3), Insertion::Priority);
        queue.push(pcb(3, 1), Insertion::Priority);
        queue.push(pcb(4, 3), Insertion::Priority);
        assert_eq!(pids(&queue), vec![3, 1, 2, 4]);
    }

    #[test]
    fn test_remove_middle_and_ends() {
        let mut queue = ReadyQueue::new();
        let a = queue.push(pcb(1, 1), Insertion::Tail);
        let b = queue.push(pcb(2, 1), Insertion::Tail);
        let c = queue.push(pcb(3, 1), Insertion::Tail);

        assert_eq!(queue.remove(b).map(|p| p.pid), Some(Pid(2)));
        assert_eq!(pids(&queue), vec![1, 3]);
        assert!(queue.remove(b).is_none());

        queue.remove(c);
        queue.remove(a);
        assert!(queue.is_empty());
        assert!(queue.check_links().is_ok());
    }

    #[test]
    fn test_age_all_floors_at_zero() {
        let mut queue = ReadyQueue::new();
        queue.push(pcb(1, 0), Insertion::Tail);
        queue.push(pcb(2, 2), Insertion::Tail);
        queue.age_all();
        let scores: Vec<usize> = queue.iter().map(|p| p.score).collect();
        assert_eq!(scores, vec![0, 1]);
    }

    proptest! {
        #[test]
        fn test_priority_insert_is_stable_sort(scores in proptest::collection::vec(0usize..8, 0..40)) {
            let mut queue = ReadyQueue::new();
            for (pid, &score) in scores.iter().enumerate() {
                queue.push(pcb(pid as u64, score), Insertion::Priority);
            }
            prop_assert!(queue.check_links().is_ok());

            let mut expected: Vec<(usize, u64)> = scores
                .iter()
                .enumerate()
                .map(|(pid, &score)| (score, pid as u64))
                .collect();
            expected.sort_by_key(|&(score, _)| score);
            let actual: Vec<(usize, u64)> = queue.iter().map(|p| (p.score, p.pid.0)).collect();
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn test_mixed_operations_keep_links_consistent(ops in proptest::collection::vec(0u8..5, 0..60)) {
            let mut queue = ReadyQueue::new();
            let mut live = 0usize;
            let mut ids = Vec::new();
            for (i, op) in ops.into_iter().enumerate() {
                match op {
                    0 => { ids.push(queue.push(pcb(i as u64, i % 7), Insertion::Tail)); live += 1; }
                    1 => { ids.push(queue.push(pcb(i as u64, i % 5), Insertion::Priority)); live += 1; }
                    2 => { ids.push(queue.push(pcb(i as u64, i), Insertion::Head)); live += 1; }
                    3 => { if queue.pop_head().is_some() { live -= 1; } }
                    // Newest handle; it may already have been popped
                    _ => { if ids.pop().and_then(|id| queue.remove(id)).is_some() { live -= 1; } }
                }
                prop_assert!(queue.check_links().is_ok());
                prop_assert_eq!(queue.len(), live);
            }
        }
    }
}
