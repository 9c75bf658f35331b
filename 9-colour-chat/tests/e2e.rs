use std::{path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn relay_chat_end_to_end() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("colour_chat");

    let (mut server_child, mut server_stdout) = spawn_server(&binary).await?;
    let addr = read_server_addr(&mut server_stdout).await?;

    // Drain server logs in the background so the pipe never fills.
    let server_log_task = tokio::spawn(async move {
        drain_stdout(server_stdout).await;
    });

    let mut alice = spawn_relay(&binary, &addr).await?;
    alice.register("alice").await?;

    let mut bob = spawn_relay(&binary, &addr).await?;
    bob.register("bob").await?;
    let alice_sees_bob = read_line_expect(&mut alice.stdout, "waiting for bob's arrival").await?;
    assert_eq!(alice_sees_bob, "bob has arrived");

    alice.send_line("Hello from Alice").await?;
    let bob_hears_alice =
        read_line_expect(&mut bob.stdout, "waiting for bob to hear alice").await?;
    assert_eq!(bob_hears_alice, "\x1b[97malice: Hello from Alice\x1b[0m");
    let alice_echo = read_line_expect(&mut alice.stdout, "waiting for alice echo").await?;
    assert_eq!(alice_echo, bob_hears_alice);

    // Alice exits explicitly; Bob sees her leave.
    alice.send_line("/exit").await?;
    assert_eq!(
        read_line_expect(&mut alice.stdout, "waiting for alice departure").await?,
        "alice has left"
    );
    assert_eq!(
        read_line_expect(&mut alice.stdout, "waiting for goodbye").await?,
        "Goodbye!"
    );
    assert_eq!(
        read_line_expect(&mut bob.stdout, "waiting for bob to see alice leave").await?,
        "alice has left"
    );
    alice.close_input();
    ensure_success(&mut alice.child, "alice relay").await?;

    // Bob's input ends; the server treats it as a disconnect.
    bob.close_input();
    assert_eq!(
        read_line_expect(&mut bob.stdout, "waiting for bob departure").await?,
        "bob has left"
    );
    ensure_success(&mut bob.child, "bob relay").await?;

    // The server stays up after clients disconnect; terminate it manually.
    let _ = server_child.kill().await;
    let _ = server_child.wait().await;
    let _ = server_log_task.await;

    Ok(())
}

struct RelayProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl RelayProcess {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        let stdin = self.stdin.as_mut().context("relay stdin already closed")?;
        stdin
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to send line '{line}'"))?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    fn close_input(&mut self) {
        self.stdin.take();
    }

    async fn register(&mut self, user: &str) -> Result<()> {
        self.send_line(&format!("register {user} secret")).await?;
        let expected = [
            "Registration successful! You are now logged in. Your default colour is white"
                .to_string(),
            format!("You are logged in as {user}"),
            "Current clients:".to_string(),
        ];
        for line in expected {
            let got = read_line_expect(&mut self.stdout, "waiting for registration").await?;
            if got != line {
                return Err(anyhow!("expected '{line}', got '{got}'"));
            }
        }

        let arrival = format!("{user} has arrived");
        while read_line_expect(&mut self.stdout, "waiting for roster").await? != arrival {}

        for expected in [
            "You may now message. Be friendly to others!",
            "Colour is white",
        ] {
            let got = read_line_expect(&mut self.stdout, "waiting for chat banner").await?;
            if got != expected {
                return Err(anyhow!("expected '{expected}', got '{got}'"));
            }
        }
        Ok(())
    }
}

async fn spawn_server(binary: &Path) -> Result<(Child, BufReader<ChildStdout>)> {
    let mut cmd = Command::new(binary);
    cmd.arg("serve")
        .arg("--listen")
        .arg("127.0.0.1:0")
        .env("NO_COLOR", "1")
        .env("RUST_LOG", "info")
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = cmd.spawn().context("failed to spawn server")?;
    let stdout = child
        .stdout
        .take()
        .context("server stdout missing after spawn")?;

    Ok((child, BufReader::new(stdout)))
}

async fn read_server_addr(reader: &mut BufReader<ChildStdout>) -> Result<String> {
    let line = read_line(reader)
        .await?
        .context("server did not emit listening address")?;
    let trimmed = line.trim();
    let addr = trimmed
        .split_whitespace()
        .last()
        .context("unexpected server banner format")?;
    if !addr.contains(':') {
        return Err(anyhow!("server banner missing socket: {trimmed}"));
    }
    Ok(addr.to_string())
}

async fn spawn_relay(binary: &Path, addr: &str) -> Result<RelayProcess> {
    let mut cmd = Command::new(binary);
    cmd.arg("relay")
        .arg("--server")
        .arg(addr)
        .env("RUST_LOG", "warn")
        .env("NO_COLOR", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = cmd.spawn().context("failed to spawn relay")?;
    let stdin = child
        .stdin
        .take()
        .context("relay stdin missing after spawn")?;
    let stdout = child
        .stdout
        .take()
        .context("relay stdout missing after spawn")?;

    let mut process = RelayProcess {
        child,
        stdin: Some(stdin),
        stdout: BufReader::new(stdout),
    };

    for expected in [
        "Welcome! Please login or register!",
        "Enter 'login <username> <password>' or 'register <username> <password>'",
    ] {
        let banner = read_line_expect(&mut process.stdout, "waiting for welcome banner").await?;
        if banner != expected {
            return Err(anyhow!("expected banner '{expected}', got '{banner}'"));
        }
    }

    Ok(process)
}

async fn read_line_expect(
    reader: &mut BufReader<ChildStdout>,
    description: &str,
) -> Result<String> {
    match read_line(reader).await {
        Ok(Some(line)) => Ok(line),
        Ok(None) => Err(anyhow!("{description}: stream closed")),
        Err(err) => Err(err.context(format!("{description}: failed to read line"))),
    }
}

async fn read_line(reader: &mut BufReader<ChildStdout>) -> Result<Option<String>> {
    let mut line = String::new();
    let read_future = reader.read_line(&mut line);
    let bytes_io = match timeout(READ_TIMEOUT, read_future).await {
        Ok(result) => result,
        Err(_) => return Err(anyhow!("timed out waiting for line")),
    };
    let byte_count = bytes_io?;
    if byte_count == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn drain_stdout(mut reader: BufReader<ChildStdout>) {
    let mut buffer = String::new();
    while reader
        .read_line(&mut buffer)
        .await
        .map(|bytes| {
            let has_data = bytes > 0;
            if has_data {
                buffer.clear();
            }
            has_data
        })
        .unwrap_or(false)
    {}
}

async fn ensure_success(child: &mut Child, name: &str) -> Result<()> {
    let status = child
        .wait()
        .await
        .with_context(|| format!("failed to await {name} process"))?;
    if !status.success() {
        return Err(anyhow!("{name} exited with status {status}"));
    }
    Ok(())
}
