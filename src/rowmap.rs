//! Row acceptance map for incrementally scanned filters.
//!
//! A RowMap is an append-only list of upstream row indices. It is stored as a
//! sequence of fixed-capacity blocks, so growing the map never moves entries
//! that were already handed out:
//! - O(1) random access (block index is `pos / BLOCK_SIZE`)
//! - O(1) append, no reallocation of existing blocks
//! - Sealing marks the map final; later appends are rejected

/// Append-only, block-structured index list.
#[derive(Debug, Clone)]
pub struct RowMap {
    blocks: Vec<Vec<usize>>,
    size: usize,
    sealed: bool,
}

impl RowMap {
    /// Entries per block
    const BLOCK_SIZE: usize = 1024;

    pub fn new() -> Self {
        RowMap {
            blocks: Vec::new(),
            size: 0,
            sealed: false,
        }
    }

    /// A map whose first `count` entries map rows onto themselves
    pub fn with_identity_prefix(count: usize) -> Self {
        let mut map = RowMap::new();
        for i in 0..count {
            map.push(i);
        }
        map
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Get the upstream index stored at `pos`
    pub fn get(&self, pos: usize) -> Option<usize> {
        if pos >= self.size {
            return None;
        }
        let block = pos / Self::BLOCK_SIZE;
        let offset = pos % Self::BLOCK_SIZE;
        self.blocks.get(block).and_then(|b| b.get(offset)).copied()
    }

    /// Last appended entry
    pub fn last(&self) -> Option<usize> {
        self.size.checked_sub(1).and_then(|pos| self.get(pos))
    }

    /// Append an index. Returns false if the map is sealed.
    pub fn push(&mut self, index: usize) -> bool {
        if self.sealed {
            return false;
        }

        let needs_block = match self.blocks.last() {
            Some(block) => block.len() == Self::BLOCK_SIZE,
            None => true,
        };
        if needs_block {
            self.blocks.push(Vec::with_capacity(Self::BLOCK_SIZE));
        }

        if let Some(block) = self.blocks.last_mut() {
            block.push(index);
            self.size += 1;
        }
        true
    }

    /// Drop every entry past the first `header_rows` and reopen the map.
    /// The remaining entries are reset to map header rows onto themselves.
    pub fn truncate_to_headers(&mut self, header_rows: usize) {
        self.blocks.clear();
        self.size = 0;
        self.sealed = false;
        for i in 0..header_rows {
            self.push(i);
        }
    }

    /// Mark the map as final
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Iterate over all entries in append order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks.iter().flat_map(|b| b.iter().copied())
    }
}

impl Default for RowMap {
    fn default() -> Self {
        Self::new()
    }
}
