use crate::registry::ScriptId;

/// Bookkeeping for one physical frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMeta {
    /// Script whose page currently occupies the frame
    pub owner: Option<ScriptId>,
    /// Page number of `owner` held by the frame (meaningless when empty)
    pub page: usize,
    /// 0 = most recently used, frame_count - 1 = least recently used
    pub lru_rank: usize,
}

/// Physical instruction memory: `frame_count * page_size` line slots
pub struct FrameStore {
    slots: Vec<Option<String>>,
    frames: Vec<FrameMeta>,
    page_size: usize,
}

impl FrameStore {
    /// Create an empty frame store. Frame 0 starts as the least recently used
    /// so the first pages land in frames 0, 1, 2, ...
    pub fn new(frame_count: usize, page_size: usize) -> Self {
        let frames = (0..frame_count)
            .map(|idx| FrameMeta {
                owner: None,
                page: 0,
                lru_rank: frame_count - idx - 1,
            })
            .collect();
        FrameStore {
            slots: vec![None; frame_count * page_size],
            frames,
            page_size,
        }
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Read the line stored at a physical slot
    #[inline]
    pub fn read(&self, address: usize) -> Option<&str> {
        self.slots.get(address).and_then(|slot| slot.as_deref())
    }

    /// Overwrite a physical slot
    #[inline]
    pub fn write(&mut self, address: usize, line: Option<String>) {
        if let Some(slot) = self.slots.get_mut(address) {
            *slot = line;
        }
    }

    /// Calculate the starting slot of a frame
    #[inline]
    pub fn frame_to_address(&self, frame: usize) -> usize {
        frame * self.page_size
    }

    pub fn frame(&self, frame: usize) -> &FrameMeta {
        &self.frames[frame]
    }

    pub fn frames(&self) -> &[FrameMeta] {
        &self.frames
    }

    /// Frame whose rank is `frame_count - 1`
    pub fn lru_frame(&self) -> usize {
        self.frames
            .iter()
            .enumerate()
            .max_by_key(|(_, meta)| meta.lru_rank)
            .map(|(idx, _)| idx)
            .unwrap_or(0)
    }

    /// Make `frame` the most recently used. Frames ranked ahead of it age by
    /// one; frames behind it keep their rank.
    pub fn touch(&mut self, frame: usize) {
        let old_rank = self.frames[frame].lru_rank;
        for meta in &mut self.frames {
            if meta.lru_rank < old_rank {
                meta.lru_rank += 1;
            } else if meta.lru_rank == old_rank {
                meta.lru_rank = 0;
            }
        }
    }

    /// Empty a frame and hand back the lines it held
    pub fn clear_frame(&mut self, frame: usize) -> Vec<String> {
        let start = self.frame_to_address(frame);
        let lines = self.slots[start..start + self.page_size]
            .iter_mut()
            .filter_map(Option::take)
            .collect();
        let meta = &mut self.frames[frame];
        meta.owner = None;
        meta.page = 0;
        lines
    }

    /// Fill a frame with up to `page_size` lines of `owner`'s `page`
    pub fn install(&mut self, frame: usize, owner: ScriptId, page: usize, lines: Vec<String>) {
        let start = self.frame_to_address(frame);
        let mut lines = lines.into_iter();
        for offset in 0..self.page_size {
            self.slots[start + offset] = lines.next();
        }
        let meta = &mut self.frames[frame];
        meta.owner = Some(owner);
        meta.page = page;
    }

    /// Frames currently holding pages of `script`
    pub fn frames_owned_by(&self, script: ScriptId) -> Vec<usize> {
        self.frames
            .iter()
            .enumerate()
            .filter(|(_, meta)| meta.owner == Some(script))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// True when the LRU ranks are a permutation of `0..frame_count`
    pub fn ranks_are_permutation(&self) -> bool {
        let mut seen = vec![false; self.frames.len()];
        for meta in &self.frames {
            match seen.get_mut(meta.lru_rank) {
                Some(flag) if !*flag => *flag = true,
                _ => return false,
            }
        }
        true
    }
}
