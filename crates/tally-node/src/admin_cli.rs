//! tally-admin CLI tool
//!
//! Feeds categories, topics, voters and topic lifecycle changes into a
//! running tally-node.
//!
//! Usage:
//!   tally-admin put-category <id> <name> [--voting]
//!   tally-admin set-category-voting <id> <on|off>
//!   tally-admin put-topic <id> <category_id> <title>
//!   tally-admin set-topic-status <id> <status> <on|off>
//!   tally-admin move-topic <id> <category_id>
//!   tally-admin merge-topics <orig> <dest> [--partial]
//!   tally-admin put-voter <id> <username> <trust_level>
//!   tally-admin ensure-consistency
//!   tally-admin ping

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

/// Admin command sent over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum AdminCommand {
    PutCategory {
        id: u64,
        name: String,
        voting_enabled: bool,
    },
    SetCategoryVoting {
        id: u64,
        enabled: bool,
    },
    PutTopic {
        id: u64,
        title: String,
        category_id: u64,
    },
    SetTopicStatus {
        id: u64,
        status: String,
        enabled: bool,
    },
    MoveTopic {
        id: u64,
        category_id: u64,
    },
    MergeTopics {
        orig: u64,
        dest: u64,
        full: bool,
    },
    PutVoter {
        id: u64,
        username: String,
        trust_level: u8,
    },
    EnsureConsistency,
    Ping,
}

/// Response from admin command.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    Pong,
}

fn print_usage() {
    eprintln!("tally-admin - Manage a running tally-node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  tally-admin put-category <id> <name> [--voting]    Create or rename a category");
    eprintln!("  tally-admin set-category-voting <id> <on|off>      Toggle voting in a category");
    eprintln!("  tally-admin put-topic <id> <category_id> <title>   Create or retitle a topic");
    eprintln!("  tally-admin set-topic-status <id> <status> <on|off>");
    eprintln!("                                                     Set or clear closed, autoclosed,");
    eprintln!("                                                     archived, visible or pinned");
    eprintln!("  tally-admin move-topic <id> <category_id>          Move a topic");
    eprintln!("  tally-admin merge-topics <orig> <dest> [--partial] Move posts between topics");
    eprintln!("  tally-admin put-voter <id> <username> <trust_level>");
    eprintln!("                                                     Create or update a voter");
    eprintln!("  tally-admin ensure-consistency                     Recount every topic");
    eprintln!("  tally-admin ping                                   Check if daemon is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TALLY_ADMIN_SOCKET  Path to admin socket (default: ./tally-data/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("TALLY_ADMIN_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./tally-data/admin.sock"))
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to tally-node at {:?}: {}\n\
             Is the tally-node running?",
            socket_path, e
        )
    })?;

    // Send command
    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    // Read response
    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

/// Positional argument `index`, or a usage error naming it.
fn arg<'a>(args: &'a [String], index: usize, cmd: &str, name: &str) -> Result<&'a str, String> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires a {} argument", cmd, name))
}

fn id_arg(args: &[String], index: usize, cmd: &str, name: &str) -> Result<u64, String> {
    let raw = arg(args, index, cmd, name)?;
    match raw.parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(format!("{} must be a positive integer, got {:?}", name, raw)),
    }
}

fn switch_arg(args: &[String], index: usize, cmd: &str) -> Result<bool, String> {
    match arg(args, index, cmd, "on|off")? {
        "on" | "true" => Ok(true),
        "off" | "false" => Ok(false),
        other => Err(format!("expected on or off, got {:?}", other)),
    }
}

fn parse_command(args: &[String]) -> Result<AdminCommand, String> {
    let cmd = args[1].as_str();
    let flag = |name: &str| args.iter().skip(2).any(|a| a == name);
    Ok(match cmd {
        "put-category" => AdminCommand::PutCategory {
            id: id_arg(args, 2, cmd, "id")?,
            name: arg(args, 3, cmd, "name")?.to_string(),
            voting_enabled: flag("--voting"),
        },
        "set-category-voting" => AdminCommand::SetCategoryVoting {
            id: id_arg(args, 2, cmd, "id")?,
            enabled: switch_arg(args, 3, cmd)?,
        },
        "put-topic" => {
            let title = args.get(4..).map(|rest| rest.join(" ")).unwrap_or_default();
            if title.is_empty() {
                return Err(format!("{} requires a title argument", cmd));
            }
            AdminCommand::PutTopic {
                id: id_arg(args, 2, cmd, "id")?,
                category_id: id_arg(args, 3, cmd, "category_id")?,
                title,
            }
        }
        "set-topic-status" => AdminCommand::SetTopicStatus {
            id: id_arg(args, 2, cmd, "id")?,
            status: arg(args, 3, cmd, "status")?.to_string(),
            enabled: switch_arg(args, 4, cmd)?,
        },
        "move-topic" => AdminCommand::MoveTopic {
            id: id_arg(args, 2, cmd, "id")?,
            category_id: id_arg(args, 3, cmd, "category_id")?,
        },
        "merge-topics" => AdminCommand::MergeTopics {
            orig: id_arg(args, 2, cmd, "orig")?,
            dest: id_arg(args, 3, cmd, "dest")?,
            full: !flag("--partial"),
        },
        "put-voter" => AdminCommand::PutVoter {
            id: id_arg(args, 2, cmd, "id")?,
            username: arg(args, 3, cmd, "username")?.to_string(),
            trust_level: arg(args, 4, cmd, "trust_level")?
                .parse()
                .map_err(|e| format!("invalid trust_level: {}", e))?,
        },
        "ensure-consistency" => AdminCommand::EnsureConsistency,
        "ping" => AdminCommand::Ping,
        other => return Err(format!("Unknown command: {}", other)),
    })
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    if matches!(args[1].as_str(), "-h" | "--help" | "help") {
        print_usage();
        std::process::exit(0);
    }

    let cmd = match parse_command(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    match send_command(cmd) {
        Ok(response) => match response {
            AdminResponse::Ok { message } => {
                println!("{}", message);
            }
            AdminResponse::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            AdminResponse::Pong => {
                println!("pong - tally-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
