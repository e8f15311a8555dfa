use crate::constants::*;
use crate::error::ConfigError;

/// Whether processes running the same script file share resident pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptSharing {
    /// Reuse a resident script's page table and keep its pages cached after
    /// the last process exits, until they are evicted
    #[default]
    Shared,
    /// Every load gets its own page table; frames are released as soon as
    /// the last process of the script terminates
    Private,
}

/// Runtime sizing of the frame store, variable store and worker pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    pub frame_store_size: usize,
    pub page_size: usize,
    pub pages_loaded: usize,
    pub workers: usize,
    pub var_store_size: usize,
    pub sharing: ScriptSharing,
}

impl KernelConfig {
    pub fn with_frame_store_size(mut self, frame_store_size: usize) -> Self {
        self.frame_store_size = frame_store_size;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_pages_loaded(mut self, pages_loaded: usize) -> Self {
        self.pages_loaded = pages_loaded;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_var_store_size(mut self, var_store_size: usize) -> Self {
        self.var_store_size = var_store_size;
        self
    }

    pub fn with_sharing(mut self, sharing: ScriptSharing) -> Self {
        self.sharing = sharing;
        self
    }

    /// Number of frames in the frame store
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frame_store_size / self.page_size.max(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.frame_store_size < self.page_size {
            return Err(ConfigError::FrameStoreTooSmall {
                frame_store_size: self.frame_store_size,
                page_size: self.page_size,
            });
        }
        if self.frame_store_size % self.page_size != 0 {
            return Err(ConfigError::FrameStoreNotAligned {
                frame_store_size: self.frame_store_size,
                page_size: self.page_size,
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.var_store_size == 0 {
            return Err(ConfigError::ZeroVariableStore);
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            frame_store_size: FRAME_STORE_SIZE,
            page_size: PAGE_SIZE,
            pages_loaded: PAGES_LOADED_NUMBER,
            workers: WORKERS_NUMBER,
            var_store_size: VAR_STORE_SIZE,
            sharing: ScriptSharing::Shared,
        }
    }
}
