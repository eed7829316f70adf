/// Stable handle of a heap element. Handles index the heap's slot table, so they should be
/// small dense integers (arena indices).
pub trait Handle: Copy + Eq {
    fn index(self) -> usize;
}

impl Handle for usize {
    fn index(self) -> usize {
        self
    }
}

/// Binary min-heap over handles, ordered by a score the caller evaluates on demand.
///
/// Scores are never cached: every operation takes the score function, so an element whose
/// score changed can be moved with [`IndexedHeap::reposition`]. Elements are identified by
/// handle, never by score, and a slot table maps each handle to its position.
#[derive(Debug, Clone)]
pub struct IndexedHeap<K: Handle> {
    content: Vec<K>,
    slots: Vec<Option<usize>>,
}

impl<K: Handle> Default for IndexedHeap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Handle> IndexedHeap<K> {
    pub fn new() -> Self {
        IndexedHeap {
            content: Vec::new(),
            slots: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        IndexedHeap {
            content: Vec::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn contains(&self, item: K) -> bool {
        self.slot(item).is_some()
    }

    /// The minimum element, without removing it.
    pub fn peek(&self) -> Option<K> {
        self.content.first().copied()
    }

    /// Insert `item`. Pushing an element that is already queued only repositions it.
    pub fn push<F: Fn(K) -> f64>(&mut self, item: K, score: F) {
        if self.contains(item) {
            self.reposition(item, score);
            return;
        }
        let index = item.index();
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        self.content.push(item);
        self.slots[index] = Some(self.content.len() - 1);
        self.bubble_up(self.content.len() - 1, &score);
    }

    /// Remove and return the minimum element.
    pub fn pop<F: Fn(K) -> f64>(&mut self, score: F) -> Option<K> {
        let end = self.content.pop()?;
        self.slots[end.index()] = None;
        if self.content.is_empty() {
            return Some(end);
        }
        let result = std::mem::replace(&mut self.content[0], end);
        self.slots[result.index()] = None;
        self.slots[end.index()] = Some(0);
        self.sink_down(0, &score);
        Some(result)
    }

    /// Restore heap order around `item` after its score changed. Absent items are ignored.
    pub fn reposition<F: Fn(K) -> f64>(&mut self, item: K, score: F) {
        if let Some(position) = self.slot(item) {
            let moved = self.bubble_up(position, &score);
            if moved == position {
                self.sink_down(position, &score);
            }
        }
    }

    /// Remove `item` wherever it sits. Returns `false` if it was not queued.
    pub fn remove<F: Fn(K) -> f64>(&mut self, item: K, score: F) -> bool {
        let Some(position) = self.slot(item) else {
            return false;
        };
        let removed_score = score(item);
        self.slots[item.index()] = None;
        let Some(end) = self.content.pop() else {
            return false;
        };
        if position != self.content.len() {
            self.content[position] = end;
            self.slots[end.index()] = Some(position);
            if score(end) < removed_score {
                self.bubble_up(position, &score);
            } else {
                self.sink_down(position, &score);
            }
        }
        true
    }

    fn slot(&self, item: K) -> Option<usize> {
        self.slots.get(item.index()).copied().flatten()
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.content.swap(a, b);
        self.slots[self.content[a].index()] = Some(a);
        self.slots[self.content[b].index()] = Some(b);
    }

    fn bubble_up<F: Fn(K) -> f64>(&mut self, mut n: usize, score: &F) -> usize {
        let element_score = score(self.content[n]);
        while n > 0 {
            let parent = ((n + 1) >> 1) - 1;
            if element_score >= score(self.content[parent]) {
                break;
            }
            self.swap(n, parent);
            n = parent;
        }
        n
    }

    fn sink_down<F: Fn(K) -> f64>(&mut self, mut n: usize, score: &F) {
        let length = self.content.len();
        let element_score = score(self.content[n]);
        loop {
            let child2 = (n + 1) << 1;
            let child1 = child2 - 1;
            let mut swap = None;
            let mut best = element_score;

            if child1 < length {
                let child1_score = score(self.content[child1]);
                if child1_score < best {
                    swap = Some(child1);
                    best = child1_score;
                }
            }
            if child2 < length && score(self.content[child2]) < best {
                swap = Some(child2);
            }

            match swap {
                Some(child) => {
                    self.swap(n, child);
                    n = child;
                }
                None => break,
            }
        }
    }
}
