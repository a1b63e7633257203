use crate::config::DEFAULT_API_PORT;
use colored::*;
use std::io::{BufRead, Write};
use std::net::TcpStream;
use std::time::Duration;

/// CLI implementation behind the `cli` binary.
pub fn run(args: Vec<String>) -> anyhow::Result<()> {
    let bin = args
        .first()
        .map(|s| s.as_str())
        .unwrap_or("cli")
        .to_string();

    if args.len() < 2 {
        print_usage(&bin);
        return Ok(());
    }

    let command = &args[1];

    match command.as_str() {
        "stats" => show_stats()?,
        "threads" => list_threads()?,
        "feed" => {
            let limit = args.get(2).and_then(|s| s.parse::<usize>().ok());
            show_feed(limit)?;
        }
        "room" => {
            if args.len() < 3 {
                eprintln!("{}", format!("Usage: {} room <thread_id>", bin).yellow());
                return Ok(());
            }
            show_room(&args[2])?;
        }
        "status" => show_status()?,
        "push" => {
            if args.len() < 5 {
                eprintln!(
                    "{}",
                    format!("Usage: {} push <author> <direct|thread|spam> <text>", bin).yellow()
                );
                return Ok(());
            }
            push_message(&args[2], &args[3], &args[4..].join(" "))?;
        }
        _ => {
            eprintln!("{} Unknown command: {}", "✗".red().bold(), command.red());
            print_usage(&bin);
        }
    }

    Ok(())
}

fn print_usage(bin: &str) {
    println!("{}", "⚡ ChatFlow CLI".bright_cyan().bold());
    println!();
    println!("{}", "Usage:".bright_white().bold());
    println!("  {} <command> [args]", bin.cyan());
    println!();
    println!("{}", "Commands:".bright_white().bold());
    println!("  {}                            Message, thread and spam counts", "stats".cyan());
    println!("  {}                          Threads, most recent first", "threads".cyan());
    println!("  {} [limit]                     Latest messages", "feed".cyan());
    println!("  {} <thread_id>                 Full conversation of a thread", "room".cyan());
    println!("  {}                           Stream connection status", "status".cyan());
    println!(
        "  {} <author> <type> <text>     Push a message into the stream",
        "push".cyan()
    );
}

fn get_api_port() -> u16 {
    api_port_from(std::env::var("CHATFLOW_API_PORT").ok())
}

fn api_port_from(value: Option<String>) -> u16 {
    value
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_API_PORT)
}

/// Send one request and return its `data`, exiting on an API error
fn request(body: serde_json::Value) -> anyhow::Result<serde_json::Value> {
    let api_port = get_api_port();
    let mut stream = match TcpStream::connect(format!("127.0.0.1:{}", api_port)) {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!(
                "{} {}",
                "✗ Error: Could not reach ChatFlow API server:".red().bold(),
                e
            );
            eprintln!("  Make sure the service is running and try:");
            eprintln!(
                "  {} {}",
                "-".dimmed(),
                format!("CHATFLOW_API_PORT={} cargo run --bin cli -- stats", api_port).yellow()
            );
            std::process::exit(1);
        }
    };
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;

    writeln!(stream, "{}", body)?;

    let mut response = String::new();
    std::io::BufReader::new(&stream).read_line(&mut response)?;

    let resp: serde_json::Value = serde_json::from_str(&response)?;

    if resp["success"].as_bool().unwrap_or(false) {
        Ok(resp["data"].clone())
    } else {
        let error = resp["error"].as_str().unwrap_or("Unknown error");
        eprintln!("{} Error: {}", "✗".red().bold(), error.red());
        std::process::exit(1);
    }
}

fn colored_kind(kind: &str) -> ColoredString {
    match kind {
        "thread" | "THREAD" => kind.green(),
        "direct" | "DIRECT" => kind.blue(),
        "spam" | "SPAM" => kind.red(),
        _ => kind.cyan(),
    }
}

fn show_stats() -> anyhow::Result<()> {
    let data = request(serde_json::json!({ "command": "stats" }))?;
    let count = |key: &str| data[key].as_u64().unwrap_or(0).to_string();

    println!("{}", "ChatFlow Stats".bright_cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("  Messages: {}", count("total").bright_white());
    println!("  Threads:  {}", count("threads").green());
    println!("  Direct:   {}", count("direct").blue());
    println!("  Spam:     {}", count("spam").red());
    Ok(())
}

fn list_threads() -> anyhow::Result<()> {
    let data = request(serde_json::json!({ "command": "threads" }))?;
    let threads = data["threads"].as_array().cloned().unwrap_or_default();

    if threads.is_empty() {
        println!("{}", "No conversations yet".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Threads ({})", threads.len()).bright_cyan().bold()
    );
    println!("{}", "─".repeat(60).dimmed());
    for thread in &threads {
        let id = thread["id"].as_str().unwrap_or("?");
        let label = thread["label"].as_str().unwrap_or("?");
        let count = thread["message_count"].as_u64().unwrap_or(0);
        println!(
            "  [{}] {} {}",
            colored_kind(label),
            id.cyan(),
            format!("{} msgs", count).dimmed()
        );
        println!("      {}", thread["participants"].as_str().unwrap_or(""));
        let preview = thread["preview"].as_str().unwrap_or("");
        if !preview.is_empty() {
            println!("      {}", preview.dimmed());
        }
    }
    Ok(())
}

fn show_feed(limit: Option<usize>) -> anyhow::Result<()> {
    let data = request(serde_json::json!({ "command": "feed", "limit": limit }))?;
    let feed = data["feed"].as_array().cloned().unwrap_or_default();

    if feed.is_empty() {
        println!("{}", "Feed is empty".yellow());
        return Ok(());
    }

    for entry in &feed {
        let kind = entry["kind"].as_str().unwrap_or("");
        println!(
            "  {} {} {}",
            format!("@{}", entry["author"].as_str().unwrap_or("?")).bright_white(),
            colored_kind(kind),
            entry["text"].as_str().unwrap_or("")
        );
    }
    Ok(())
}

fn show_room(thread_id: &str) -> anyhow::Result<()> {
    let data = request(serde_json::json!({ "command": "room", "thread_id": thread_id }))?;

    println!("{}", data["title"].as_str().unwrap_or(thread_id).bright_cyan().bold());
    println!("{}", "─".repeat(60).dimmed());
    for entry in data["entries"].as_array().cloned().unwrap_or_default() {
        let indent = if entry["is_reply"].as_bool().unwrap_or(false) {
            "    "
        } else {
            "  "
        };
        println!(
            "{}{} {} {}",
            indent,
            entry["time"].as_str().unwrap_or("").dimmed(),
            format!("@{}", entry["author"].as_str().unwrap_or("?")).cyan(),
            entry["text"].as_str().unwrap_or("")
        );
    }
    Ok(())
}

fn show_status() -> anyhow::Result<()> {
    let data = request(serde_json::json!({ "command": "status" }))?;

    println!(
        "{} {}",
        "●".green(),
        data["connection_text"].as_str().unwrap_or("?").bright_white()
    );
    println!("  {}", data["stream_title"].as_str().unwrap_or("").dimmed());
    Ok(())
}

fn push_message(author: &str, kind: &str, text: &str) -> anyhow::Result<()> {
    let data = request(serde_json::json!({
        "command": "push",
        "message": { "author": author, "type": kind, "text": text }
    }))?;

    match data["message_id"].as_str() {
        Some(id) => println!("{} Message queued! ID: {}", "✓".green().bold(), id.cyan()),
        None => println!("{} Message queued!", "✓".green().bold()),
    }
    Ok(())
}
