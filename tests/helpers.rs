use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::sync::Notify;

pub type Lines<T> = Arc<Mutex<tokio::io::Lines<BufReader<T>>>>;

/// Returns a port nothing is listening on right now.
#[allow(dead_code)] // Not dead code, used in tests.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")
        .expect("An ephemeral port should be available.");
    listener
        .local_addr()
        .expect("The listener should have a local address.")
        .port()
}

/// Environment for a server listening on `port` on the loopback interface.
#[allow(dead_code)] // Not dead code, used in tests.
pub fn server_env(port: u16) -> Vec<(String, String)> {
    vec![
        ("RESILIENCE_SERVER_ADDRESS".to_string(), "127.0.0.1".to_string()),
        ("RESILIENCE_SERVER_PORT".to_string(), port.to_string()),
        ("RESILIENCE_LOG_LEVEL".to_string(), "info".to_string()),
        ("RESILIENCE_REMOTE_SERVICES".to_string(), String::new()),
    ]
}

/// Runs `cargo run -- <args>` with the given environment, capturing stdout and stderr.
#[allow(dead_code)] // Not dead code, used in tests.
pub fn run(args: &[&str], env_vars: &[(String, String)]) -> (Child, Lines<ChildStdout>, Lines<ChildStderr>) {
    let mut child = Command::new("cargo")
        .args(["run", "--"])
        .args(args)
        .envs(env_vars.iter().map(|(key, value)| (key.as_str(), value.as_str())))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("The command should spawn a child process.");

    let stdout = child
        .stdout
        .take()
        .expect("Stdout output should be captured.");
    let stderr = child
        .stderr
        .take()
        .expect("Stderr output should be captured.");

    (
        child,
        Arc::new(Mutex::new(BufReader::new(stdout).lines())),
        Arc::new(Mutex::new(BufReader::new(stderr).lines())),
    )
}

/// Starts the server and waits until it logs "Server started.".
#[allow(dead_code)] // Not dead code, used in tests.
pub async fn start_server(env_vars: &[(String, String)]) -> (Child, Lines<ChildStderr>) {
    let (server, _stdout, lines) = run(&["server", "start"], env_vars);

    // Wait for the server to start by checking for the log message "Server started." in an
    // asynchronous task.
    let notify = Arc::new(Notify::new());
    let notify_clone = notify.clone();
    let lines_clone = Arc::clone(&lines);
    tokio::spawn(async move {
        while let Ok(Some(line)) = lines_clone.lock().await.next_line().await {
            if line.contains("Server started.") {
                notify_clone.notify_one();
                break;
            }
        }
    });
    notify.notified().await;

    (server, lines)
}

/// Sends `signal` to the server and waits for it to exit successfully.
#[allow(dead_code)] // Not dead code, used in tests.
pub async fn stop_server(server: &mut Child, signal: Signal) {
    let pid = Pid::from_raw(
        server
            .id()
            .expect("The server process should be running and have a process ID.") as i32,
    );
    kill(pid, signal).expect("The signal should be sent.");

    // Wait for the server to shut down.
    let status = server
        .wait()
        .await
        .expect("The server process should exit.");
    assert!(status.success(), "Server did not shut down gracefully");
}

#[allow(dead_code)] // Not dead code, used in tests.
pub async fn check_log_output_regex<T>(lines: Lines<T>, regex_expected_lines: Vec<&str>)
where
    T: tokio::io::AsyncRead + Unpin,
{
    let captured_lines = collect(lines).await;

    for expected_line in regex_expected_lines {
        let re = regex::Regex::new(expected_line).expect("Failed to compile regex");
        let found = captured_lines.iter().any(|line| re.is_match(line.as_ref()));
        assert!(found, "The output contains the line '{}'.", expected_line);
    }
}

#[allow(dead_code)] // Not dead code, used in tests.
pub async fn check_log_output<T>(lines: Lines<T>, expected_lines: Vec<&str>)
where
    T: tokio::io::AsyncRead + Unpin,
{
    let captured_lines = collect(lines).await;

    for expected_line in expected_lines {
        let found = captured_lines.iter().any(|line| line == expected_line);
        assert!(found, "The output contains the line '{}'.", expected_line);
    }
}

async fn collect<T>(lines: Lines<T>) -> Vec<String>
where
    T: tokio::io::AsyncRead + Unpin,
{
    let mut captured_lines = Vec::new();
    while let Ok(Some(line)) = lines.lock().await.next_line().await {
        captured_lines.push(line);
    }
    captured_lines
}
