//! Whole shell sessions fed from a batch of input lines

use std::fs;
use std::io::{BufRead, Cursor};
use std::sync::Arc;

use vm_shell::{Console, Flow, Kernel, KernelConfig, Shell};

struct Session {
    dir: tempfile::TempDir,
}

impl Session {
    fn new() -> Self {
        Session {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn script(&self, name: &str, body: &str) -> &Self {
        fs::write(self.dir.path().join(name), body).unwrap();
        self
    }

    fn run(&self, config: KernelConfig, input: &str) -> (Flow, String) {
        let kernel = Arc::new(Kernel::new(config, Console::capture()).unwrap());
        let input: Box<dyn BufRead + Send> = Box::new(Cursor::new(input.to_string()));
        let shell = Shell::with_dir(Arc::clone(&kernel), input, self.dir.path().to_path_buf());
        let flow = shell.run_loop(false);
        kernel.join_all_threads();
        kernel.check_invariants().unwrap();
        (flow, kernel.console().contents())
    }
}

#[test]
fn test_batch_without_quit_ends_at_eof() {
    let session = Session::new();
    session.script("p", "echo hello\nset x 1\nprint x\n");
    let (flow, out) = session.run(KernelConfig::default(), "run p\necho bye\n");
    assert_eq!(flow, Flow::Continue);
    assert_eq!(out, "hello\n1\nbye\n");
}

#[test]
fn test_page_fault_output_in_session() {
    let session = Session::new();
    session.script("p", "echo 1\necho 2\necho 3\necho 4\necho 5\necho 6\necho 7\n");
    let config = KernelConfig::default().with_frame_store_size(6);
    let (_, out) = session.run(config, "exec p FCFS\n");
    assert_eq!(
        out,
        "1\n2\n3\n4\n5\n6\n\
         Page fault! Victim page contents:\n\necho 1\necho 2\necho 3\n\nEnd of victim page contents.\n\
         7\n"
    );
}

#[test]
fn test_plain_fault_without_victim() {
    let session = Session::new();
    session.script("p", "echo 1\necho 2\necho 3\necho 4\necho 5\necho 6\necho 7\n");
    let config = KernelConfig::default().with_frame_store_size(9);
    let (_, out) = session.run(config, "exec p FCFS\n");
    assert_eq!(out, "1\n2\n3\n4\n5\n6\nPage fault!\n7\n");
}

#[test]
fn test_sjf_via_exec() {
    let session = Session::new();
    session
        .script("long", "echo L1\necho L2\necho L3\n")
        .script("short", "echo S1\n");
    let (_, out) = session.run(KernelConfig::default(), "exec long short SJF\n");
    assert_eq!(out, "S1\nL1\nL2\nL3\n");
}

#[test]
fn test_round_robin_via_exec() {
    let session = Session::new();
    session
        .script("a", "echo a1\necho a2\necho a3\n")
        .script("b", "echo b1\necho b2\necho b3\n");
    let (_, out) = session.run(KernelConfig::default(), "exec a b RR\n");
    assert_eq!(out, "a1\na2\nb1\nb2\na3\nb3\n");
}

#[test]
fn test_failed_exec_runs_nothing() {
    let session = Session::new();
    session.script("a", "echo a\n");
    let (_, out) = session.run(KernelConfig::default(), "exec a missing FCFS\necho next\n");
    assert_eq!(out, "Bad command: File not found\nnext\n");
}

#[test]
fn test_background_exec_only_loads_later_scripts() {
    let session = Session::new();
    session
        .script("p1", "echo p1\n")
        .script("p2", "echo p2\n");
    let input = "exec p1 FCFS #\necho from shell\nexec p2 FCFS\n";
    let (flow, out) = session.run(KernelConfig::default(), input);
    assert_eq!(flow, Flow::Continue);
    assert_eq!(out, "from shell\np1\np2\n");
}

#[test]
fn test_quit_from_worker_ends_session() {
    let session = Session::new();
    session
        .script("a", "echo a1\nquit\n")
        .script("b", "echo b1\n");
    let (flow, out) = session.run(KernelConfig::default(), "exec a b RR MT\necho after\n");
    assert_eq!(flow, Flow::Quit);
    assert!(out.contains("a1\n"));
    assert!(out.contains("Bye!\n"));
    assert!(!out.contains("after"));
}

#[test]
fn test_concurrent_exec_runs_every_script() {
    let session = Session::new();
    session
        .script("a", "echo a1\necho a2\necho a3\n")
        .script("b", "echo b1\necho b2\n")
        .script("c", "echo c1\n");
    let (_, out) = session.run(KernelConfig::default(), "exec a b c RR MT\n");
    let mut lines: Vec<&str> = out.lines().collect();
    lines.sort();
    assert_eq!(lines, vec!["a1", "a2", "a3", "b1", "b2", "c1"]);
}

#[test]
fn test_script_can_exec_another() {
    let session = Session::new();
    session
        .script("outer", "echo outer start\nexec inner FCFS\necho outer end\n")
        .script("inner", "echo inner\n");
    let (_, out) = session.run(KernelConfig::default(), "run outer\n");
    assert_eq!(out, "outer start\ninner\nouter end\n");
}
