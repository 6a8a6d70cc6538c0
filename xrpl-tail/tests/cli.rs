//! Command-line behaviour of `xrpl-tail`.

use predicates::prelude::*;
use std::process::Command;

fn xrpl_tail() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("xrpl-tail"));
    cmd.env_remove("XRPL_CLIENT_URL");
    cmd
}

#[test]
fn prints_help() -> Result<(), Box<dyn std::error::Error>> {
    let output = xrpl_tail().arg("--help").output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(predicate::str::contains("--stream").eval(&stdout));
    assert!(predicate::str::contains("--count").eval(&stdout));
    Ok(())
}

#[test]
fn rejects_unknown_stream() -> Result<(), Box<dyn std::error::Error>> {
    let output = xrpl_tail()
        .args(["--url", "ws://127.0.0.1:1", "--stream", "bogus"])
        .output()?;
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(predicate::str::contains("unknown stream name: bogus").eval(&stderr));
    Ok(())
}

#[test]
fn rejects_reply_type_as_stream() -> Result<(), Box<dyn std::error::Error>> {
    let output = xrpl_tail()
        .args(["--url", "ws://127.0.0.1:1", "--stream", "response"])
        .output()?;
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(predicate::str::contains("not a subscribable stream").eval(&stderr));
    Ok(())
}

#[test]
fn rejects_non_websocket_url() -> Result<(), Box<dyn std::error::Error>> {
    let output = xrpl_tail().args(["--url", "http://127.0.0.1:1"]).output()?;
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(predicate::str::contains("Invalid configuration").eval(&stderr));
    Ok(())
}

#[test]
fn reports_unreachable_node() -> Result<(), Box<dyn std::error::Error>> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let output = xrpl_tail()
        .args(["--url", &format!("ws://{addr}"), "--count", "1"])
        .output()?;
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(predicate::str::contains("Dial failed").eval(&stderr));
    Ok(())
}
