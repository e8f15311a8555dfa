use std::fmt;

/// Represents the decomposed components of a virtual instruction address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualAddress {
    pub va: usize,
    pub page: usize,
    pub offset: usize,
}

impl VirtualAddress {
    /// Decompose a line number into page number and offset within the page
    pub fn from_raw(va: usize, page_size: usize) -> Self {
        VirtualAddress {
            va,
            page: va / page_size,
            offset: va % page_size,
        }
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA({}) = (page={}, offset={})", self.va, self.page, self.offset)
    }
}

/// Per-script mapping from page number to resident frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTable {
    entries: Vec<Option<usize>>,
}

impl PageTable {
    /// Create a table with every page marked not resident
    pub fn new(page_count: usize) -> Self {
        PageTable {
            entries: vec![None; page_count],
        }
    }

    /// Number of pages needed to hold `lines` lines
    pub fn pages_for(lines: usize, page_size: usize) -> usize {
        lines.div_ceil(page_size)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Frame holding `page`, if resident
    #[inline]
    pub fn frame_of(&self, page: usize) -> Option<usize> {
        self.entries.get(page).copied().flatten()
    }

    pub fn map(&mut self, page: usize, frame: usize) {
        if let Some(entry) = self.entries.get_mut(page) {
            *entry = Some(frame);
        }
    }

    pub fn unmap(&mut self, page: usize) {
        if let Some(entry) = self.entries.get_mut(page) {
            *entry = None;
        }
    }

    /// (page, frame) pairs currently resident
    pub fn resident(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(page, frame)| frame.map(|f| (page, f)))
    }
}

/// Result of an address translation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationResult {
    /// Physical slot in the frame store
    Resident(usize),
    /// The page is not in memory; the caller must service a page fault
    NotResident,
}

impl TranslationResult {
    pub fn slot(&self) -> Option<usize> {
        match self {
            TranslationResult::Resident(slot) => Some(*slot),
            TranslationResult::NotResident => None,
        }
    }
}

/// Translate a virtual address through a page table
///
/// Pure lookup: no LRU bookkeeping happens here. The physical slot is
/// `frame * page_size + offset`.
pub fn translate(va: &VirtualAddress, page_table: &PageTable, page_size: usize) -> TranslationResult {
    match page_table.frame_of(va.page) {
        Some(frame) => TranslationResult::Resident(frame * page_size + va.offset),
        None => TranslationResult::NotResident,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_va_decomposition() {
        let va = VirtualAddress::from_raw(7, 3);
        assert_eq!(va.page, 2);
        assert_eq!(va.offset, 1);

        let va = VirtualAddress::from_raw(0, 3);
        assert_eq!((va.page, va.offset), (0, 0));

        let va = VirtualAddress::from_raw(5, 3);
        assert_eq!((va.page, va.offset), (1, 2));
    }

    #[test]
    fn test_va_reconstruction() {
        for raw in 0..40 {
            let va = VirtualAddress::from_raw(raw, 3);
            assert_eq!(va.page * 3 + va.offset, raw, "Failed for VA={}", raw);
        }
    }

    #[test]
    fn test_display() {
        let display = format!("{}", VirtualAddress::from_raw(4, 3));
        assert!(display.contains("page=1"));
        assert!(display.contains("offset=1"));
    }

    #[test]
    fn test_pages_for() {
        assert_eq!(PageTable::pages_for(0, 3), 0);
        assert_eq!(PageTable::pages_for(3, 3), 1);
        assert_eq!(PageTable::pages_for(7, 3), 3);
    }

    // =========================================================================
    // Translation through a page table
    // =========================================================================

    #[test]
    fn test_translate_resident_page() {
        let mut pt = PageTable::new(3);
        pt.map(1, 4);

        // line 4 is page 1 offset 1 -> frame 4 slot 13
        let va = VirtualAddress::from_raw(4, 3);
        assert_eq!(translate(&va, &pt, 3), TranslationResult::Resident(13));
    }

    #[test]
    fn test_translate_missing_page_is_not_resident() {
        let pt = PageTable::new(3);
        let va = VirtualAddress::from_raw(2, 3);
        assert_eq!(translate(&va, &pt, 3), TranslationResult::NotResident);
        assert_eq!(translate(&va, &pt, 3).slot(), None);
    }

    #[test]
    fn test_translate_beyond_table_is_not_resident() {
        let mut pt = PageTable::new(1);
        pt.map(0, 0);
        let va = VirtualAddress::from_raw(3, 3);
        assert_eq!(translate(&va, &pt, 3), TranslationResult::NotResident);
    }

    #[test]
    fn test_unmap_invalidates() {
        let mut pt = PageTable::new(2);
        pt.map(0, 1);
        pt.map(1, 0);
        pt.unmap(0);
        assert_eq!(pt.frame_of(0), None);
        assert_eq!(pt.resident().collect::<Vec<_>>(), vec![(1, 0)]);
    }
}
