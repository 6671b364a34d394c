//! Integration tests for top-level CLI behavior.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const FIXTURE: &str = r#"
owner: bart
mtime: 1000000000
dirs: [/lbar]
files:
  /ctl: "view 1\n"
  /colrules: "/gimp/ -> 17+83+41\n"
  /client/sel/label: xterm
streams:
  /event: ["CreateTag 1\nFocusTag 1\n", ~, "ClientFocus 0x1\n"]
"#;

/// A scratch directory holding `wmii.yaml`; removed on drop.
struct Scratch {
    dir: PathBuf,
}

impl Scratch {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("ixp_cli_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("wmii.yaml"), FIXTURE).unwrap();
        Self { dir }
    }

    fn address(&self) -> String {
        format!("mem!{}", self.dir.join("wmii.yaml").display())
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn ixp(cwd: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ixp"));
    cmd.args(args)
        .current_dir(cwd)
        .env_remove("WMII_ADDRESS")
        .env_remove("IXP_RECORD")
        .env_remove("RUST_LOG");
    cmd
}

fn run_ixp(scratch: &Scratch, args: &[&str]) -> Output {
    let address = scratch.address();
    let mut full = vec!["--address", address.as_str()];
    full.extend_from_slice(args);
    ixp(&scratch.dir, &full).output().expect("failed to run ixp binary")
}

#[test]
fn read_prints_the_file() {
    let scratch = Scratch::new("read");
    let output = run_ixp(&scratch, &["read", "/client/sel/label"]);
    assert!(output.status.success());
    assert_eq!(output.stdout, b"xterm");
}

#[test]
fn ls_lists_the_root() {
    let scratch = Scratch::new("ls");
    let output = run_ixp(&scratch, &["ls", "/"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "client/\ncolrules\nctl\nevent\nlbar/\n");
}

#[test]
fn long_listing_shows_owner_and_mode() {
    let scratch = Scratch::new("ls_long");
    let output = run_ixp(&scratch, &["ls", "-l", "/client/sel"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.starts_with("-rw-r--r-- bart bart     5 "), "{stdout}");
    assert!(stdout.trim_end().ends_with(" label"));
}

#[test]
fn stat_json_has_mode_and_time_strings() {
    let scratch = Scratch::new("stat");
    let output = run_ixp(&scratch, &["stat", "--json", "/lbar"]);
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["name"], "lbar");
    assert_eq!(value["modestr"], "drwxr-xr-x");
    assert_eq!(value["mtime"], 1_000_000_000);
}

#[test]
fn write_accepts_words_and_stdin() {
    let scratch = Scratch::new("write");
    let output = run_ixp(&scratch, &["write", "/ctl", "view", "2"]);
    assert!(output.status.success());

    let address = scratch.address();
    let output = ixp(&scratch.dir, &["--address", &address, "write", "/ctl"])
        .stdin(std::fs::File::open(scratch.path("wmii.yaml")).unwrap())
        .output()
        .unwrap();
    assert!(output.status.success());
}

#[test]
fn write_to_a_missing_file_fails() {
    let scratch = Scratch::new("write_missing");
    let output = run_ixp(&scratch, &["write", "/nope", "x"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("could not open p9 file /nope"), "{stderr}");
    assert!(stderr.contains("(code 2)"), "{stderr}");
}

#[test]
fn lines_stops_at_the_timeout() {
    let scratch = Scratch::new("lines");
    let output = run_ixp(&scratch, &["lines", "/event", "--timeout", "1"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "CreateTag 1\nFocusTag 1\n");

    let output = run_ixp(&scratch, &["lines", "/event"]);
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "CreateTag 1\nFocusTag 1\nClientFocus 0x1\n"
    );
}

#[test]
fn recorded_session_replays() {
    let scratch = Scratch::new("record");
    let cassette = scratch.path("session.cassette.yaml");

    let address = scratch.address();
    let recorded = ixp(&scratch.dir, &["--address", &address, "read", "/colrules"])
        .env("IXP_RECORD", &cassette)
        .output()
        .unwrap();
    assert!(recorded.status.success());
    assert!(String::from_utf8_lossy(&recorded.stderr).contains("Recording saved to"));

    let replay = format!("replay!{}", cassette.display());
    let replayed = ixp(&scratch.dir, &["--address", &replay, "read", "/colrules"]).output().unwrap();
    assert!(replayed.status.success());
    assert_eq!(replayed.stdout, recorded.stdout);
    assert_eq!(replayed.stdout, b"/gimp/ -> 17+83+41\n");
}

#[test]
fn address_comes_from_the_environment() {
    let scratch = Scratch::new("env_address");
    let output = ixp(&scratch.dir, &["read", "/ctl"])
        .env("WMII_ADDRESS", scratch.address())
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, b"view 1\n");
}

#[test]
fn unknown_transport_fails_to_connect() {
    let scratch = Scratch::new("unknown_transport");
    let output = ixp(&scratch.dir, &["--address", "tcp!localhost!564", "read", "/ctl"])
        .output()
        .unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("could not open ixp connection to tcp!localhost!564"), "{stderr}");
}

#[test]
fn invalid_subcommand_exits_with_error() {
    let scratch = Scratch::new("invalid");
    let output = ixp(&scratch.dir, &["nonsense"]).output().unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("unrecognized subcommand"));
}

#[test]
fn default_address_points_at_mountable_transports() {
    let scratch = Scratch::new("default_address");
    let output = ixp(&scratch.dir, &["read", "/ctl"])
        .env("NAMESPACE", &scratch.dir)
        .output()
        .unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("no client for transport \"unix\""), "{stderr}");
    assert!(stderr.contains("mem!<fixture.yaml>"), "{stderr}");
}
