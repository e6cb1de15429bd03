// Drives the compiled binary through a PTY so the real event loop and
// crossterm input handling are exercised end to end.
//
// Needs a pseudo terminal, so it is Unix-only and ignored by default.
// Run with: `cargo test --test integration_min_session -- --ignored`.

#![cfg(unix)]

use std::time::Duration;

use expectrl::{spawn, Eof};

#[test]
#[ignore]
fn minimal_session_completes_and_exits() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempfile::tempdir()?;
    let bin = assert_cmd::cargo::cargo_bin("proctor");
    let cmd = format!(
        "env HOME={} XDG_CONFIG_HOME={}/config {} -m subject -n 1",
        home.path().display(),
        home.path().display(),
        bin.display()
    );

    let mut p = spawn(cmd)?;
    std::thread::sleep(Duration::from_millis(300));

    // Instructions, then answer the only question and submit.
    p.send("\r")?;
    std::thread::sleep(Duration::from_millis(200));
    p.send("1")?;
    p.send("s")?;
    std::thread::sleep(Duration::from_millis(300));

    p.send("q")?;
    p.expect(Eof)?;

    assert!(home.path().join(".local/state/proctor/results.db").exists());
    Ok(())
}
