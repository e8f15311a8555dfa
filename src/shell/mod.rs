//! Line interpreter driving the kernel
//!
//! The shell is the kernel's `LineHandler`: every instruction a process
//! executes comes back here, so scripts can `exec` other scripts.

pub mod parser;
pub mod variables;

use std::fs::{self, OpenOptions};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, warn};
use parking_lot::Mutex;
use thiserror::Error;

use crate::constants::MAX_VALUE_SIZE;
use crate::console::Console;
use crate::error::KernelError;
use crate::policy::Policy;
use crate::scheduler::{Flow, Kernel, LineHandler};

use parser::{Command, is_alphanumeric, listing_order};
use variables::VariableStore;

/// User-visible command failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShellError {
    #[error("Unknown Command")]
    UnknownCommand,

    #[error("Bad command: Too many tokens")]
    TooManyTokens,

    #[error("Bad command: Too many commands")]
    TooManyCommands,

    #[error("Bad command: Input too long")]
    InputTooLong,

    #[error("Bad command: File not found")]
    FileNotFound,

    #[error("Bad command: my_mkdir")]
    Mkdir,

    #[error("Bad command: my_cd")]
    Cd,

    #[error("Bad command: my_ls")]
    Ls,

    #[error("Bad command: my_touch")]
    Touch,

    #[error("Bad command: {0} is not alphanumeric")]
    NonAlphanumeric(String),

    #[error("Bad command: Variable store is full")]
    VariableStoreFull,

    #[error("Memory loading for script error: exec")]
    MemoryLoad,
}

impl From<KernelError> for ShellError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::ScriptNotFound { .. } => ShellError::FileNotFound,
            KernelError::DuplicateScript(_) | KernelError::EmptyBatch => ShellError::UnknownCommand,
            KernelError::ScriptRead { .. }
            | KernelError::StaleScript(_)
            | KernelError::WorkerSpawn(_)
            | KernelError::Config(_) => {
                warn!("exec failed: {}", err);
                ShellError::MemoryLoad
            }
        }
    }
}

const HELP: &str = "\
COMMAND\t\t\tDESCRIPTION
help\t\t\tDisplays all the commands
quit\t\t\tExits / terminates the shell with \"Bye!\"
set VAR STRING\t\tAssigns a value to shell memory
print VAR\t\tDisplays the STRING assigned to VAR
echo STRING\t\tDisplays STRING, or the value of $VAR
run SCRIPT\t\tExecutes the file SCRIPT
exec P1 [P2 P3] POLICY [#] [MT]\tRuns scripts under FCFS, SJF, RR, RR30 or AGING
my_ls\t\t\tLists the current directory
my_touch NAME\t\tCreates an empty file
my_mkdir NAME\t\tCreates a directory
my_cd DIR\t\tChanges the current directory";

pub struct Shell {
    me: Weak<Shell>,
    kernel: Arc<Kernel>,
    variables: VariableStore,
    input: Mutex<Box<dyn BufRead + Send>>,
    cwd: Mutex<PathBuf>,
    /// Set once `exec ... #` has queued the rest of the input; later `exec`s
    /// only load their scripts
    exec_only_loading: AtomicBool,
}

impl Shell {
    pub fn new(kernel: Arc<Kernel>, input: Box<dyn BufRead + Send>) -> Arc<Self> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_dir(kernel, input, cwd)
    }

    /// A shell whose relative paths resolve against `cwd`
    pub fn with_dir(kernel: Arc<Kernel>, input: Box<dyn BufRead + Send>, cwd: PathBuf) -> Arc<Self> {
        let var_store_size = kernel.config().var_store_size;
        Arc::new_cyclic(|me| Shell {
            me: me.clone(),
            kernel,
            variables: VariableStore::new(var_store_size),
            input: Mutex::new(input),
            cwd: Mutex::new(cwd),
            exec_only_loading: AtomicBool::new(false),
        })
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    pub fn console(&self) -> &Console {
        self.kernel.console()
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn current_dir(&self) -> PathBuf {
        self.cwd.lock().clone()
    }

    /// Read and interpret input until it runs out or a command quits
    pub fn run_loop(&self, interactive: bool) -> Flow {
        loop {
            if interactive {
                self.console().print("$ ");
            }
            let Some(line) = self.next_line() else {
                return Flow::Continue;
            };
            if self.interpret(&line) == Flow::Quit {
                return Flow::Quit;
            }
        }
    }

    fn next_line(&self) -> Option<String> {
        let mut line = String::new();
        match self.input.lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                let trimmed = line.trim_end_matches(['\n', '\r']).len();
                line.truncate(trimmed);
                Some(line)
            }
            Err(err) => {
                warn!("failed to read input: {}", err);
                None
            }
        }
    }

    /// Everything left on the input, one entry per line
    fn drain_input(&self) -> Vec<String> {
        std::iter::from_fn(|| self.next_line()).collect()
    }

    /// Interpret one line of `;`-separated commands
    pub fn interpret(&self, line: &str) -> Flow {
        if line.trim().is_empty() {
            return Flow::Continue;
        }
        let commands = match parser::split_commands(line) {
            Ok(commands) => commands,
            Err(err) => {
                self.console().println(&err.to_string());
                return Flow::Continue;
            }
        };
        for command in commands {
            let tokens = parser::tokenize(command);
            let result = parser::parse(&tokens).and_then(|command| self.execute(command));
            match result {
                Ok(Flow::Quit) => return Flow::Quit,
                Ok(Flow::Continue) => {}
                Err(err) => self.console().println(&err.to_string()),
            }
        }
        Flow::Continue
    }

    fn execute(&self, command: Command) -> Result<Flow, ShellError> {
        match command {
            Command::Help => self.console().println(HELP),
            Command::Quit => {
                self.console().println("Bye!");
                return Ok(Flow::Quit);
            }
            Command::Set { var, values } => self.set(&var, values)?,
            Command::Print { var } => {
                let value = self
                    .variables
                    .get(&var)
                    .unwrap_or_else(|| "Variable does not exist".to_string());
                self.console().println(&value);
            }
            Command::Echo { text } => self.echo(&text)?,
            Command::Run { script } => return self.run(&script),
            Command::Exec {
                scripts,
                policy,
                background,
                concurrent,
            } => return self.exec(&scripts, policy, background, concurrent),
            Command::Ls => self.ls()?,
            Command::Touch { name } => self.touch(&name)?,
            Command::Mkdir { name } => self.mkdir(&name)?,
            Command::Cd { dir } => self.cd(&dir)?,
        }
        Ok(Flow::Continue)
    }

    fn handler(&self) -> Option<Arc<dyn LineHandler>> {
        self.me.upgrade().map(|shell| shell as Arc<dyn LineHandler>)
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.cwd.lock().join(name)
    }

    // =========================================================================
    // Variables
    // =========================================================================

    fn set(&self, var: &str, values: Vec<String>) -> Result<(), ShellError> {
        if values.len() > MAX_VALUE_SIZE {
            return Err(ShellError::TooManyTokens);
        }
        if let Some(bad) = std::iter::once(var)
            .chain(values.iter().map(String::as_str))
            .find(|word| !is_alphanumeric(word))
        {
            return Err(ShellError::NonAlphanumeric(bad.to_string()));
        }
        self.variables.set(var, values)
    }

    fn echo(&self, text: &str) -> Result<(), ShellError> {
        match text.strip_prefix('$') {
            Some(var) => {
                if !is_alphanumeric(var) {
                    return Err(ShellError::NonAlphanumeric(var.to_string()));
                }
                let value = self.variables.get(var).unwrap_or_default();
                self.console().println(&value);
            }
            None => self.console().println(text),
        }
        Ok(())
    }

    // =========================================================================
    // Scripts
    // =========================================================================

    fn run(&self, script: &str) -> Result<Flow, ShellError> {
        self.kernel.load_script(self.resolve(script), Policy::Fcfs)?;
        let Some(handler) = self.handler() else {
            return Ok(Flow::Continue);
        };
        Ok(self.kernel.run(Policy::Fcfs, None, false, handler)?)
    }

    fn exec(
        &self,
        scripts: &[String],
        policy: Policy,
        background: bool,
        concurrent: bool,
    ) -> Result<Flow, ShellError> {
        let paths: Vec<PathBuf> = scripts.iter().map(|s| self.resolve(s)).collect();
        self.kernel.load_batch(&paths, policy)?;

        let pending = if background {
            self.exec_only_loading.store(true, Ordering::SeqCst);
            let lines = self.drain_input();
            debug!("queued {} lines of shell input behind exec", lines.len());
            Some(lines)
        } else {
            None
        };

        if self.exec_only_loading.load(Ordering::SeqCst) && !background {
            return Ok(Flow::Continue);
        }
        let Some(handler) = self.handler() else {
            return Ok(Flow::Continue);
        };
        Ok(self.kernel.run(policy, pending, concurrent, handler)?)
    }

    // =========================================================================
    // Filesystem
    // =========================================================================

    fn ls(&self) -> Result<(), ShellError> {
        let dir = self.current_dir();
        let mut names: Vec<String> = fs::read_dir(&dir)
            .map_err(|_| ShellError::Ls)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort_by(|a, b| listing_order(a, b));
        for name in names {
            self.console().println(&name);
        }
        Ok(())
    }

    fn touch(&self, name: &str) -> Result<(), ShellError> {
        if !is_alphanumeric(name) {
            return Err(ShellError::NonAlphanumeric(name.to_string()));
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.resolve(name))
            .map_err(|_| ShellError::Touch)?;
        Ok(())
    }

    fn mkdir(&self, name: &str) -> Result<(), ShellError> {
        let dir = match name.strip_prefix('$') {
            Some(var) => {
                if !is_alphanumeric(var) {
                    return Err(ShellError::NonAlphanumeric(var.to_string()));
                }
                match self.variables.get(var) {
                    Some(value) if !value.is_empty() && !value.contains(' ') => value,
                    _ => return Err(ShellError::Mkdir),
                }
            }
            None => {
                if !is_alphanumeric(name) {
                    return Err(ShellError::NonAlphanumeric(name.to_string()));
                }
                name.to_string()
            }
        };
        match fs::create_dir(self.resolve(&dir)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(_) => Err(ShellError::Mkdir),
        }
    }

    fn cd(&self, dir: &str) -> Result<(), ShellError> {
        if !is_alphanumeric(dir) {
            return Err(ShellError::NonAlphanumeric(dir.to_string()));
        }
        let target = self.resolve(dir);
        if !target.is_dir() {
            return Err(ShellError::Cd);
        }
        *self.cwd.lock() = target;
        Ok(())
    }
}

impl LineHandler for Shell {
    fn execute_line(&self, line: &str) -> Flow {
        self.interpret(line)
    }
}
