//! Script metadata and the registry that owns it

use std::path::Path;

use log::debug;

use crate::arena::{Arena, Handle};
use crate::io::ScriptSource;
use crate::translation::PageTable;

pub type ScriptId = Handle<ScriptMeta>;

/// Everything the memory manager knows about one loaded script
#[derive(Debug, Clone)]
pub struct ScriptMeta {
    pub source: ScriptSource,
    pub total_lines: usize,
    pub page_table: PageTable,
    /// PCBs currently running this script
    pub pcb_refs: usize,
    /// Frames currently holding one of its pages
    pub frame_refs: usize,
}

impl ScriptMeta {
    pub fn new(source: ScriptSource, total_lines: usize, page_size: usize) -> Self {
        ScriptMeta {
            source,
            total_lines,
            page_table: PageTable::new(PageTable::pages_for(total_lines, page_size)),
            pcb_refs: 0,
            frame_refs: 0,
        }
    }

    #[inline]
    pub fn is_unreferenced(&self) -> bool {
        self.pcb_refs == 0 && self.frame_refs == 0
    }
}

#[derive(Default)]
pub struct ScriptRegistry {
    scripts: Arena<ScriptMeta>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, meta: ScriptMeta) -> ScriptId {
        let name = meta.source.to_string();
        let id = self.scripts.insert(meta);
        debug!("registered script {} as {:?}", name, id);
        id
    }

    #[inline]
    pub fn get(&self, id: ScriptId) -> Option<&ScriptMeta> {
        self.scripts.get(id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: ScriptId) -> Option<&mut ScriptMeta> {
        self.scripts.get_mut(id)
    }

    /// Drop a script's metadata if nothing references it any more
    pub fn free_if_unreferenced(&mut self, id: ScriptId) -> bool {
        match self.scripts.get(id) {
            Some(meta) if meta.is_unreferenced() => {
                if let Some(meta) = self.scripts.remove(id) {
                    debug!("freed script {} ({:?})", meta.source, id);
                }
                true
            }
            _ => false,
        }
    }

    /// Scripts loaded from `path`
    pub fn find_by_path<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = ScriptId> + 'a {
        self.scripts
            .iter()
            .filter(move |(_, meta)| meta.source.path() == Some(path))
            .map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScriptId, &ScriptMeta)> {
        self.scripts.iter()
    }
}
