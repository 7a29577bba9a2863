//! Running compiled command lines against real child processes.
//!
//! Tests that fork or change the working directory hold [`FORKS`] so
//! children and directory changes never interleave.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use jish::runtime::{Closure, ClosureError, Environment, Runner, Status};
use jish::shell::{Shell, ShellConfig};

use crate::{parse, quiet_engine};

// ===========================================================================
// Helpers
// ===========================================================================

const POLL: Duration = Duration::from_millis(1);

static FORKS: Mutex<()> = Mutex::new(());

fn serialize() -> MutexGuard<'static, ()> {
    FORKS.lock().unwrap_or_else(PoisonError::into_inner)
}

fn compile(line: &str) -> Closure {
    quiet_engine()
        .compile(&parse(line))
        .unwrap_or_else(|err| panic!("{line:?} should compile: {err}"))
}

fn run(line: &str) -> Result<i32, ClosureError> {
    compile(line).run_to_completion(&mut Environment::new(false), POLL)
}

/// Per-test directory under the system temp dir, removed on drop.
struct Scratch {
    dir: PathBuf,
}

impl Scratch {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("jish-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        Self { dir }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Quoted path for use in a command line.
    fn arg(&self, file: &str) -> String {
        format!("'{}'", self.path(file).display())
    }

    fn read(&self, file: &str) -> String {
        std::fs::read_to_string(self.path(file)).unwrap_or_default()
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// Targets of every pipe descriptor this process holds.
fn open_pipes() -> BTreeSet<String> {
    std::fs::read_dir("/proc/self/fd")
        .expect("list descriptors")
        .filter_map(|entry| std::fs::read_link(entry.ok()?.path()).ok())
        .map(|target| target.to_string_lossy().into_owned())
        .filter(|target| target.starts_with("pipe:"))
        .collect()
}

// ===========================================================================
// Status and control flow
// ===========================================================================

#[test]
fn builtin_truth_values() {
    let _guard = serialize();
    assert_eq!(run("true"), Ok(0));
    assert_eq!(run("false"), Ok(1));
    assert_eq!(run("false; true"), Ok(0));
    assert_eq!(run("true && false"), Ok(1));
    assert_eq!(run("false || true"), Ok(0));
}

#[test]
fn program_exit_status_is_the_condition() {
    let _guard = serialize();
    assert_eq!(run("sh -c 'exit 7'"), Ok(7));
    assert_eq!(run("jish-no-such-program-anywhere"), Ok(127));
}

#[test]
fn and_skips_right_side_after_failure() {
    let _guard = serialize();
    let scratch = Scratch::new("and-skip");
    let line = format!("false && touch {}", scratch.arg("never"));
    assert_eq!(run(&line), Ok(1));
    assert!(!scratch.path("never").exists());

    let line = format!("true || touch {}", scratch.arg("never"));
    assert_eq!(run(&line), Ok(0));
    assert!(!scratch.path("never").exists());
}

#[test]
fn if_arms_converge() {
    let _guard = serialize();
    let scratch = Scratch::new("if-arms");
    let line = format!(
        "if false then touch {} else touch {} end; touch {}",
        scratch.arg("direct"),
        scratch.arg("reverse"),
        scratch.arg("after"),
    );
    assert_eq!(run(&line), Ok(0));
    assert!(!scratch.path("direct").exists());
    assert!(scratch.path("reverse").exists());
    assert!(scratch.path("after").exists());
}

#[test]
fn invocation_suspends_on_running_child() {
    let _guard = serialize();
    let closure = compile("sh -c 'sleep 1'; true");
    let mut env = Environment::new(false);
    assert_eq!(closure.invoke(&mut env), Ok(Status::CONTINUE));
    assert_eq!(closure.pending_children(), 1);
    assert_eq!(closure.invoke(&mut env), Ok(Status::CONTINUE));
    assert!(closure.is_waiting());
    assert_eq!(closure.run_to_completion(&mut env, POLL), Ok(0));
    assert_eq!(closure.pending_children(), 0);
}

#[test]
fn closure_outlives_its_engine() {
    let _guard = serialize();
    let closure = {
        let engine = quiet_engine();
        engine
            .compile(&parse("true && sh -c 'exit 6'"))
            .expect("compile")
    };
    let copy = closure.clone();
    drop(closure);
    assert_eq!(copy.run_to_completion(&mut Environment::new(false), POLL), Ok(6));
}

// ===========================================================================
// Pipes and redirects
// ===========================================================================

#[test]
fn pipeline_connects_stages() {
    let _guard = serialize();
    let scratch = Scratch::new("pipeline");
    let line = format!("printf 'b\\na\\nb\\n' | sort | uniq > {}", scratch.arg("out"));
    assert_eq!(run(&line), Ok(0));
    assert_eq!(scratch.read("out"), "a\nb\n");
}

#[test]
fn redirects_replace_append_and_read() {
    let _guard = serialize();
    let scratch = Scratch::new("redirects");
    let log = scratch.arg("log");
    let line = format!("echo one > {log}; echo two >> {log}; cat < {log} > {}", scratch.arg("copy"));
    assert_eq!(run(&line), Ok(0));
    assert_eq!(scratch.read("copy"), "one\ntwo\n");

    let line = format!("echo three > {log}");
    assert_eq!(run(&line), Ok(0));
    assert_eq!(scratch.read("log"), "three\n");
}

#[test]
fn pipelines_release_their_descriptors() {
    let _guard = serialize();
    let scratch = Scratch::new("pipe-fds");
    let before = open_pipes();

    let line = format!("printf 'x\\n' | cat | cat > {}", scratch.arg("out"));
    assert_eq!(run(&line), Ok(0));
    assert_eq!(scratch.read("out"), "x\n");
    assert_eq!(open_pipes(), before);

    assert!(run("cat < /jish-no-such-dir/input | wc -l").is_ok());
    assert_eq!(open_pipes(), before);

    assert_eq!(run("true | exit 4"), Ok(4));
    assert_eq!(open_pipes(), before);
}

#[test]
fn failed_open_fails_the_command() {
    let _guard = serialize();
    assert_eq!(run("cat < /jish-no-such-dir/input"), Ok(1));
}

// ===========================================================================
// Builtins
// ===========================================================================

#[test]
fn exit_raises_control_signal() {
    let _guard = serialize();
    assert_eq!(run("exit 3"), Err(ClosureError::Exit(3)));
    assert_eq!(run("true; exit 0x10"), Err(ClosureError::Exit(16)));
    assert_eq!(run("false; exit"), Err(ClosureError::Exit(1)));
    assert_eq!(run("exit -1"), Err(ClosureError::Exit(255)));
}

#[test]
fn exit_in_pipeline_only_ends_the_child() {
    let _guard = serialize();
    assert_eq!(run("true | exit 4"), Ok(4));
}

#[test]
fn cd_changes_shell_directory() {
    let _guard = serialize();
    let before = std::env::current_dir().expect("cwd");
    let mut env = Environment::new(false);
    let result = compile("cd /").run_to_completion(&mut env, POLL);
    let after = std::env::current_dir().expect("cwd");
    std::env::set_current_dir(&before).expect("restore cwd");

    assert_eq!(result, Ok(0));
    assert_eq!(after, Path::new("/"));
    assert_eq!(env.get_var("PWD").as_deref(), Some("/"));
    assert_eq!(
        env.get_var("OLDPWD"),
        Some(before.to_string_lossy().into_owned())
    );
}

#[test]
fn failed_cd_reports_and_keeps_directory() {
    let _guard = serialize();
    let before = std::env::current_dir().expect("cwd");
    assert_eq!(run("cd /jish-no-such-dir"), Ok(1));
    assert_eq!(run("cd"), Ok(1));
    assert_eq!(std::env::current_dir().expect("cwd"), before);
}

#[test]
fn cd_in_pipeline_runs_in_child() {
    let _guard = serialize();
    let before = std::env::current_dir().expect("cwd");
    assert_eq!(run("cd / | true"), Ok(0));
    assert_eq!(std::env::current_dir().expect("cwd"), before);
}

#[test]
fn builtins_without_behavior_fault() {
    let _guard = serialize();
    assert_eq!(run("jobs"), Err(ClosureError::NotImplemented("jobs")));
    assert_eq!(run("again"), Err(ClosureError::Again));
    assert_eq!(run("true && help"), Err(ClosureError::NotImplemented("help")));
}

// ===========================================================================
// Substitutions
// ===========================================================================

#[test]
fn substitution_output_becomes_an_argument() {
    let _guard = serialize();
    let scratch = Scratch::new("substitution");
    let closure = compile(&format!("echo $(echo hello) > {}", scratch.arg("out")));
    assert_eq!(closure.run_to_completion(&mut Environment::new(false), POLL), Ok(0));
    assert_eq!(scratch.read("out"), "hello\n");
    assert_eq!(closure.capture(0).as_deref(), Some("hello"));
}

#[test]
fn substitution_as_target_and_redirect() {
    let _guard = serialize();
    let scratch = Scratch::new("substitution-target");
    let line = format!(
        "$(echo echo) nested > $(echo {})",
        scratch.arg("out")
    );
    assert_eq!(run(&line), Ok(0));
    assert_eq!(scratch.read("out"), "nested\n");
}

#[test]
fn releasing_a_closure_closes_capture_pipes() {
    let _guard = serialize();
    let closure = compile("true $(echo a) $(echo b)");
    assert_eq!(closure.run_to_completion(&mut Environment::new(false), POLL), Ok(0));
    let fds = closure.capture_fds();
    assert_eq!(fds.len(), 2);
    drop(closure);
    for fd in fds {
        // SAFETY: F_GETFD only inspects the descriptor table.
        assert_eq!(unsafe { libc::fcntl(fd, libc::F_GETFD) }, -1, "fd {fd} still open");
    }
}

#[test]
fn capture_pipes_are_not_inherited() {
    let _guard = serialize();
    let scratch = Scratch::new("capture-cloexec");
    let closure = compile(&format!(
        "true $(echo a); ls -l /proc/self/fd > {}",
        scratch.arg("out")
    ));
    assert_eq!(closure.run_to_completion(&mut Environment::new(false), POLL), Ok(0));
    let fds = closure.capture_fds();
    assert_eq!(fds.len(), 1);
    let target = std::fs::read_link(format!("/proc/self/fd/{}", fds[0])).expect("capture fd");
    let target = target.to_string_lossy().into_owned();
    assert!(target.starts_with("pipe:"), "{target}");
    let listing = scratch.read("out");
    assert!(!listing.is_empty());
    assert!(!listing.contains(&target), "child inherited {target}:\n{listing}");
}

// ===========================================================================
// Background jobs
// ===========================================================================

fn wait_for_job(engine: &jish::Engine) -> i32 {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(&(_, status)) = engine.reap_detached().first() {
            return status;
        }
        assert!(Instant::now() < deadline, "background job never finished");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn detached_pipeline_does_not_block() {
    let _guard = serialize();
    let engine = quiet_engine();
    let closure = engine.compile(&parse("sh -c 'exit 4' &")).expect("compile");
    assert_eq!(closure.run_to_completion(&mut Environment::new(false), POLL), Ok(0));
    assert_eq!(closure.pending_children(), 0);
    assert_eq!(engine.detachables().len(), 1);
    assert_eq!(wait_for_job(&engine), 4);
    assert!(engine.detachables().is_empty());
}

#[test]
fn ampersand_starts_the_next_command() {
    let _guard = serialize();
    let engine = quiet_engine();
    let closure = engine
        .compile(&parse("sh -c 'exit 3' & false"))
        .expect("compile");
    assert_eq!(closure.run_to_completion(&mut Environment::new(false), POLL), Ok(1));
    assert_eq!(wait_for_job(&engine), 3);
}

#[test]
fn detached_compound_runs_in_a_child() {
    let _guard = serialize();
    let engine = quiet_engine();
    let closure = engine
        .compile(&parse("if true then sh -c 'exit 5' end &"))
        .expect("compile");
    assert_eq!(closure.run_to_completion(&mut Environment::new(false), POLL), Ok(0));
    assert_eq!(wait_for_job(&engine), 5);
}

// ===========================================================================
// Shell loop
// ===========================================================================

#[test]
fn scripts_stop_at_exit() {
    let _guard = serialize();
    let mut shell = Shell::new(quiet_engine(), Environment::new(false), ShellConfig::default());
    assert_eq!(shell.run_source("true\nexit 5\nfalse\n").expect("script"), 5);
}

#[test]
fn scripts_join_multi_line_constructs() {
    let _guard = serialize();
    let mut shell = Shell::new(quiet_engine(), Environment::new(false), ShellConfig::default());
    let status = shell
        .run_source("if false\nthen\n  true\nelse\n  false\nend\n")
        .expect("script");
    assert_eq!(status, 1);
    assert_eq!(shell.last_status(), 1);
}
