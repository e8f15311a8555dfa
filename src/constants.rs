// number of instruction lines held by one page/frame
pub const PAGE_SIZE: usize = 3;

// total instruction-line slots in the frame store; must be a multiple of PAGE_SIZE
pub const FRAME_STORE_SIZE: usize = 18;
pub const FRAME_NUMBER: usize = FRAME_STORE_SIZE / PAGE_SIZE;

pub const VAR_STORE_SIZE: usize = 10;

// pages pre-faulted when a script is first loaded
pub const PAGES_LOADED_NUMBER: usize = 2;

pub const WORKERS_NUMBER: usize = 2;

pub const RR_QUANTUM: usize = 2;
pub const RR30_QUANTUM: usize = 30;

pub const MAX_USER_INPUT: usize = 1000;
pub const MAX_ARGS_SIZE: usize = 7;
pub const MAX_VALUE_SIZE: usize = 5;
pub const MAX_COMMANDS_PER_LINE: usize = 10;

pub const BACKGROUND_SCRIPT_NAME: &str = "<shell>";
