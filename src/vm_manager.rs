//! Demand-paged instruction memory
//!
//! `VmManager` owns the frame store and the script registry together so that
//! evicting a page, installing the new one and updating both page tables is a
//! single step under whatever lock guards the manager.

use std::fmt;
use std::path::Path;

use log::{debug, trace};

use crate::config::{KernelConfig, ScriptSharing};
use crate::error::{KernelError, Result};
use crate::io::ScriptSource;
use crate::memory::FrameStore;
use crate::registry::{ScriptId, ScriptMeta, ScriptRegistry};
use crate::translation::{TranslationResult, VirtualAddress, translate};

/// Page evicted to make room for another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Victim {
    pub script: String,
    pub page: usize,
    pub frame: usize,
    pub lines: Vec<String>,
}

/// What happened while servicing `assign`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultReport {
    /// Setup load into an empty frame; nothing to report
    Loaded { frame: usize },
    /// Page fault served by an empty frame
    Fault { frame: usize },
    /// A resident page had to go
    Evicted(Victim),
}

impl FaultReport {
    pub fn frame(&self) -> usize {
        match self {
            FaultReport::Loaded { frame } | FaultReport::Fault { frame } => *frame,
            FaultReport::Evicted(victim) => victim.frame,
        }
    }

    /// Text the shell prints for this event, if any
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            FaultReport::Loaded { .. } => None,
            _ => Some(self.to_string()),
        }
    }
}

impl fmt::Display for FaultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultReport::Loaded { .. } => Ok(()),
            FaultReport::Fault { .. } => writeln!(f, "Page fault!"),
            FaultReport::Evicted(victim) => {
                writeln!(f, "Page fault! Victim page contents:")?;
                writeln!(f)?;
                for line in &victim.lines {
                    writeln!(f, "{}", line)?;
                }
                writeln!(f)?;
                writeln!(f, "End of victim page contents.")
            }
        }
    }
}

pub struct VmManager {
    store: FrameStore,
    scripts: ScriptRegistry,
    sharing: ScriptSharing,
}

impl VmManager {
    pub fn new(config: &KernelConfig) -> Self {
        VmManager {
            store: FrameStore::new(config.frame_count(), config.page_size),
            scripts: ScriptRegistry::new(),
            sharing: config.sharing,
        }
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.store.page_size()
    }

    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    pub fn scripts(&self) -> &ScriptRegistry {
        &self.scripts
    }

    pub fn script(&self, id: ScriptId) -> Option<&ScriptMeta> {
        self.scripts.get(id)
    }

    /// Translate a virtual line number of `script` to a physical slot
    pub fn translate(&self, va: usize, script: ScriptId) -> TranslationResult {
        let va = VirtualAddress::from_raw(va, self.page_size());
        match self.scripts.get(script) {
            Some(meta) => translate(&va, &meta.page_table, self.page_size()),
            None => TranslationResult::NotResident,
        }
    }

    /// Fetch the instruction at `va`, marking its frame most recently used.
    /// `None` means the page is not resident and a fault must be serviced.
    pub fn fetch(&mut self, va: usize, script: ScriptId) -> Option<String> {
        let slot = self.translate(va, script).slot()?;
        let line = self.store.read(slot).map(str::to_string);
        self.store.touch(slot / self.page_size());
        line
    }

    /// Replace the instruction behind a resident address
    pub fn update(&mut self, va: usize, script: ScriptId, line: Option<String>) -> bool {
        match self.translate(va, script).slot() {
            Some(slot) => {
                self.store.write(slot, line);
                true
            }
            None => false,
        }
    }

    /// Register a new script without loading any of its pages
    pub fn register(&mut self, source: ScriptSource, total_lines: usize) -> ScriptId {
        let meta = ScriptMeta::new(source, total_lines, self.page_size());
        self.scripts.register(meta)
    }

    /// A script loaded from `path` that still has a page resident
    pub fn find_existing(&self, path: &Path) -> Option<ScriptId> {
        if self.sharing == ScriptSharing::Private {
            return None;
        }
        self.scripts
            .find_by_path(path)
            .find(|&id| self.scripts.get(id).is_some_and(|meta| meta.frame_refs > 0))
    }

    /// Record one more PCB running `script`
    pub fn acquire(&mut self, script: ScriptId) {
        if let Some(meta) = self.scripts.get_mut(script) {
            meta.pcb_refs += 1;
        }
    }

    /// Record that a PCB running `script` terminated. Returns true when the
    /// script's metadata was freed.
    pub fn release(&mut self, script: ScriptId) -> bool {
        let remaining = match self.scripts.get_mut(script) {
            Some(meta) => {
                meta.pcb_refs = meta.pcb_refs.saturating_sub(1);
                meta.pcb_refs
            }
            None => return false,
        };
        if remaining == 0 && self.sharing == ScriptSharing::Private {
            for frame in self.store.frames_owned_by(script) {
                self.release_frame(frame);
            }
        }
        self.scripts.free_if_unreferenced(script)
    }

    /// Service a fault on `page` of `script` by re-reading the page from its
    /// source into the least recently used frame
    pub fn assign(&mut self, page: usize, script: ScriptId, is_setup: bool) -> Result<FaultReport> {
        let meta = self
            .scripts
            .get(script)
            .ok_or(KernelError::StaleScript(script))?;
        let lines = meta.source.read_page(page, self.page_size())?;
        self.assign_lines(page, script, is_setup, lines)
    }

    /// `assign` with the page contents already in hand
    pub fn assign_lines(
        &mut self,
        page: usize,
        script: ScriptId,
        is_setup: bool,
        lines: Vec<String>,
    ) -> Result<FaultReport> {
        if self.scripts.get(script).is_none() {
            return Err(KernelError::StaleScript(script));
        }
        let frame = self.store.lru_frame();
        self.store.touch(frame);

        let report = match self.store.frame(frame).owner {
            Some(_) => FaultReport::Evicted(self.evict(frame)),
            None if is_setup => FaultReport::Loaded { frame },
            None => FaultReport::Fault { frame },
        };

        self.store.install(frame, script, page, lines);
        if let Some(meta) = self.scripts.get_mut(script) {
            meta.page_table.map(page, frame);
            meta.frame_refs += 1;
        }
        trace!("page {} of {:?} -> frame {}", page, script, frame);
        Ok(report)
    }

    fn evict(&mut self, frame: usize) -> Victim {
        let page = self.store.frame(frame).page;
        let owner = self.store.frame(frame).owner;
        let script = owner
            .and_then(|id| self.scripts.get(id))
            .map(|meta| meta.source.to_string())
            .unwrap_or_default();
        let lines = self.release_frame(frame);
        debug!("evicted page {} of {} from frame {}", page, script, frame);
        if let Some(owner) = owner {
            self.scripts.free_if_unreferenced(owner);
        }
        Victim {
            script,
            page,
            frame,
            lines,
        }
    }

    /// Empty `frame`, invalidating its owner's page-table entry
    fn release_frame(&mut self, frame: usize) -> Vec<String> {
        let meta = self.store.frame(frame);
        if let Some(owner) = meta.owner {
            let page = meta.page;
            if let Some(script) = self.scripts.get_mut(owner) {
                script.page_table.unmap(page);
                script.frame_refs = script.frame_refs.saturating_sub(1);
            }
        }
        self.store.clear_frame(frame)
    }

    /// Check the structural invariants tying frames, page tables and
    /// reference counts together
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        if !self.store.ranks_are_permutation() {
            return Err("LRU ranks are not a permutation".to_string());
        }
        for (frame, meta) in self.store.frames().iter().enumerate() {
            if let Some(owner) = meta.owner {
                let script = self
                    .scripts
                    .get(owner)
                    .ok_or_else(|| format!("frame {} owned by freed script", frame))?;
                if script.page_table.frame_of(meta.page) != Some(frame) {
                    return Err(format!(
                        "frame {} holds page {} but the page table disagrees",
                        frame, meta.page
                    ));
                }
            }
        }
        for (id, script) in self.scripts.iter() {
            let owned = self.store.frames_owned_by(id).len();
            if owned != script.frame_refs {
                return Err(format!(
                    "{} owns {} frames but counts {}",
                    script.source, owned, script.frame_refs
                ));
            }
            for (page, frame) in script.page_table.resident() {
                let meta = self.store.frame(frame);
                if meta.owner != Some(id) || meta.page != page {
                    return Err(format!(
                        "{} maps page {} to frame {} which holds something else",
                        script.source, page, frame
                    ));
                }
            }
            if script.is_unreferenced() {
                return Err(format!("{} is unreferenced but still registered", script.source));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    fn vm(frames: usize) -> VmManager {
        VmManager::new(&KernelConfig::default().with_frame_store_size(frames * 3))
    }

    fn inline_script(vm: &mut VmManager, name: &str, n: usize) -> ScriptId {
        let id = vm.register(ScriptSource::inline(name, lines(name, n)), n);
        vm.acquire(id);
        id
    }

    #[test]
    fn test_setup_load_then_fetch() {
        let mut vm = vm(2);
        let s = inline_script(&mut vm, "a", 5);

        assert_eq!(vm.assign(0, s, true).unwrap(), FaultReport::Loaded { frame: 0 });
        assert_eq!(vm.assign(1, s, true).unwrap(), FaultReport::Loaded { frame: 1 });

        assert_eq!(vm.fetch(0, s).as_deref(), Some("a1"));
        assert_eq!(vm.fetch(4, s).as_deref(), Some("a5"));
        // Slot past the end of the short last page
        assert_eq!(vm.fetch(5, s), None);
        assert!(vm.check_invariants().is_ok());
    }

    #[test]
    fn test_fault_into_empty_frame_is_reported() {
        let mut vm = vm(2);
        let s = inline_script(&mut vm, "a", 9);
        assert_eq!(vm.fetch(3, s), None);
        let report = vm.assign(1, s, false).unwrap();
        assert_eq!(report, FaultReport::Fault { frame: 0 });
        assert_eq!(report.diagnostic().as_deref(), Some("Page fault!\n"));
    }

    #[test]
    fn test_eviction_picks_least_recently_used() {
        let mut vm = vm(2);
        let s = inline_script(&mut vm, "a", 7);
        vm.assign(0, s, true).unwrap();
        vm.assign(1, s, true).unwrap();

        // Touch page 0 so page 1 becomes the LRU
        vm.fetch(0, s);
        let report = vm.assign(2, s, false).unwrap();
        match report {
            FaultReport::Evicted(victim) => {
                assert_eq!(victim.page, 1);
                assert_eq!(victim.frame, 1);
                assert_eq!(victim.lines, lines("a", 6)[3..].to_vec());
            }
            other => panic!("expected eviction, got {:?}", other),
        }
        assert_eq!(vm.translate(3, s), TranslationResult::NotResident);
        assert_eq!(vm.fetch(6, s).as_deref(), Some("a7"));
        assert!(vm.check_invariants().is_ok());
    }

    #[test]
    fn test_victim_dump_format() {
        let report = FaultReport::Evicted(Victim {
            script: "p".to_string(),
            page: 0,
            frame: 0,
            lines: vec!["echo a".to_string(), "echo b".to_string()],
        });
        assert_eq!(
            report.diagnostic().unwrap(),
            "Page fault! Victim page contents:\n\necho a\necho b\n\nEnd of victim page contents.\n"
        );
    }

    #[test]
    fn test_eviction_frees_finished_script() {
        let mut vm = vm(1);
        let a = inline_script(&mut vm, "a", 2);
        vm.assign(0, a, true).unwrap();
        assert!(!vm.release(a));
        // Still cached: a frame references it
        assert!(vm.script(a).is_some());

        let b = inline_script(&mut vm, "b", 2);
        vm.assign(0, b, true).unwrap();
        assert!(vm.script(a).is_none());
        assert!(vm.check_invariants().is_ok());
    }

    #[test]
    fn test_assign_to_freed_script_is_an_error() {
        let mut vm = vm(1);
        let a = inline_script(&mut vm, "a", 2);
        vm.assign(0, a, true).unwrap();
        vm.release(a);
        let b = inline_script(&mut vm, "b", 2);
        vm.assign(0, b, true).unwrap();
        assert!(vm.script(a).is_none());

        assert!(matches!(vm.assign(0, a, false), Err(KernelError::StaleScript(id)) if id == a));
        assert!(vm.assign_lines(1, a, false, lines("a", 2)).is_err());
        // Nothing was installed for the stale handle
        assert_eq!(vm.store().frames_owned_by(b), vec![0]);
        assert!(vm.check_invariants().is_ok());
    }

    #[test]
    fn test_evicting_own_page_keeps_counted_script() {
        let mut vm = vm(1);
        let s = inline_script(&mut vm, "a", 4);
        vm.assign(0, s, true).unwrap();
        let report = vm.assign(1, s, true).unwrap();
        assert!(matches!(report, FaultReport::Evicted(ref victim) if victim.page == 0));
        assert!(vm.script(s).is_some());
        assert_eq!(vm.fetch(3, s).as_deref(), Some("a4"));
        assert!(vm.check_invariants().is_ok());
    }

    #[test]
    fn test_private_release_clears_frames() {
        let config = KernelConfig::default()
            .with_frame_store_size(6)
            .with_sharing(ScriptSharing::Private);
        let mut vm = VmManager::new(&config);
        let s = inline_script(&mut vm, "a", 4);
        vm.assign(0, s, true).unwrap();
        vm.assign(1, s, true).unwrap();

        assert!(vm.release(s));
        assert!(vm.store().frames().iter().all(|f| f.owner.is_none()));
        assert!(vm.scripts().is_empty());
        assert!(vm.check_invariants().is_ok());
    }

    #[test]
    fn test_find_existing_requires_resident_page() {
        let mut vm = vm(2);
        let path = Path::new("prog");
        let s = vm.register(ScriptSource::file(path), 3);
        vm.acquire(s);
        assert_eq!(vm.find_existing(path), None);

        vm.assign_lines(0, s, true, lines("p", 3)).unwrap();
        assert_eq!(vm.find_existing(path), Some(s));
    }

    #[test]
    fn test_update_resident_instruction() {
        let mut vm = vm(1);
        let s = inline_script(&mut vm, "a", 3);
        vm.assign(0, s, true).unwrap();
        assert!(vm.update(1, s, Some("echo patched".to_string())));
        assert_eq!(vm.fetch(1, s).as_deref(), Some("echo patched"));
        assert!(!vm.update(4, s, None));
    }

    #[test]
    fn test_page_maps_to_single_frame() {
        let mut vm = vm(3);
        let a = inline_script(&mut vm, "a", 9);
        let b = inline_script(&mut vm, "b", 9);
        for (page, script) in [(0, a), (0, b), (1, a), (2, b), (1, b), (2, a)] {
            vm.assign(page, script, false).unwrap();
            assert!(vm.check_invariants().is_ok());
        }
        let resident: Vec<_> = vm.script(a).unwrap().page_table.resident().collect();
        let mut frames: Vec<usize> = resident.iter().map(|&(_, f)| f).collect();
        frames.dedup();
        assert_eq!(frames.len(), resident.len());
    }
}
