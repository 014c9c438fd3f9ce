use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;
use tempfile::TempDir;

fn termchat(workspace: &Path) -> Command {
    let home = workspace.join("home");
    fs::create_dir_all(&home).expect("home dir");
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("termchat"));
    cmd.current_dir(workspace)
        .env("HOME", &home)
        .env_remove("USERPROFILE")
        .env_remove("API_KEY");
    cmd
}

fn write_settings(workspace: &Path, file: &str, body: &str) {
    let dir = workspace.join(".termchat");
    fs::create_dir_all(&dir).expect("settings dir");
    fs::write(dir.join(file), body).expect("settings");
}

/// Answer one chat request with `events` as an SSE body.
fn serve_once(events: &'static str) -> (String, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
        let mut content_length = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("request line");
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':')
                && name.eq_ignore_ascii_case("content-length")
            {
                content_length = value.trim().parse().expect("content length");
            }
        }
        let mut body = vec![0; content_length];
        reader.read_exact(&mut body).expect("request body");
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{events}",
            events.len()
        );
        stream.write_all(response.as_bytes()).expect("write response");
        String::from_utf8(body).expect("utf8 body")
    });
    (format!("http://{addr}/v1/chat/completions"), handle)
}

#[test]
fn help_lists_the_flags() {
    let workspace = TempDir::new().expect("workspace");
    let output = termchat(workspace.path())
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    for flag in ["--model", "--endpoint", "--store", "--no-persist", "--plain", "--print-config"] {
        assert!(text.contains(flag), "missing {flag} in help:\n{text}");
    }
}

#[test]
fn print_config_applies_flags_and_hides_the_key() {
    let workspace = TempDir::new().expect("workspace");
    write_settings(
        workspace.path(),
        "settings.json",
        r#"{"llm":{"model":"from-settings","api_key":"sk-secret-value"}}"#,
    );
    write_settings(
        workspace.path(),
        "settings.local.json",
        r#"{"ui":{"page_overlap":2}}"#,
    );
    let output = termchat(workspace.path())
        .args(["--print-config", "--model", "from-flag", "--no-persist"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(!text.contains("sk-secret-value"));
    let value: Value = serde_json::from_str(&text).expect("json");
    assert_eq!(value["llm"]["model"], "from-flag");
    assert_eq!(value["llm"]["api_key"], "***");
    assert_eq!(value["ui"]["page_overlap"], 2);
    assert_eq!(value["storage"]["effective_path"], Value::Null);
}

#[test]
fn broken_settings_file_is_a_configuration_error() {
    let workspace = TempDir::new().expect("workspace");
    write_settings(workspace.path(), "settings.json", "{ not json");
    let output = termchat(workspace.path())
        .arg("--print-config")
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("Invalid Configuration"), "{text}");
    assert!(text.contains("settings.json"), "{text}");
}

#[test]
fn missing_api_key_explains_how_to_set_one() {
    let workspace = TempDir::new().expect("workspace");
    let output = termchat(workspace.path())
        .arg("--plain")
        .write_stdin("hello\n")
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("Missing API Key"), "{text}");
    assert!(text.contains("API_KEY=your-key-here"), "{text}");
}

#[test]
fn dotenv_key_is_enough_to_start_and_quit_ends_cleanly() {
    let workspace = TempDir::new().expect("workspace");
    fs::write(workspace.path().join(".env"), "API_KEY=dotenv-key\n").expect("dotenv");
    let output = termchat(workspace.path())
        .args(["--plain", "--no-persist"])
        .write_stdin("quit\n")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8(output).expect("utf8"), "You: ");
}

#[test]
fn plain_mode_streams_a_reply_and_saves_the_exchange() {
    let workspace = TempDir::new().expect("workspace");
    let (endpoint, server) = serve_once(concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
        "data: [DONE]\n\n",
    ));
    let store = workspace.path().join("chats.json");
    let output = termchat(workspace.path())
        .env("API_KEY", "test-key")
        .args(["--endpoint", &endpoint, "--model", "tiny-model", "--store"])
        .arg(&store)
        .write_stdin("hi\nexit\n")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(
        String::from_utf8(output).expect("utf8"),
        "You: AI: Hello there\nYou: "
    );

    let request: Value = serde_json::from_str(&server.join().expect("server")).expect("json");
    assert_eq!(request["model"], "tiny-model");
    assert_eq!(request["stream"], true);
    assert_eq!(request["messages"][0]["content"], "hi");

    let saved: Value =
        serde_json::from_str(&fs::read_to_string(&store).expect("store file")).expect("json");
    let messages = saved["conversations"][0]["messages"]
        .as_array()
        .expect("messages");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["content"], "Hello there");
    assert_eq!(saved["conversations"][0]["title"], "hi");
    assert!(workspace.path().join("home/.termchat/observe.log").exists());
}
