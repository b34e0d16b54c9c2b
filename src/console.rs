//! Stdio console: line-based slash commands against the serializer.
//!
//! ```text
//! /store <subject> <predicate> <object>   object: @id | 42 | 1.5 | true | "text" | text
//! /count <id> <relation>
//! /reset
//! /help
//! /exit
//! ```

use std::io::IsTerminal;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::query::{Object, Ref, Triple};
use crate::subsystems::mutation::MutationSerializer;
use crate::subsystems::runtime::SubsystemHandle;

pub fn start(gate: MutationSerializer, shutdown: CancellationToken) -> SubsystemHandle {
    let interactive = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
    info!(interactive, "console connected");

    let task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            if interactive {
                print!("> ");
                use std::io::Write as _;
                let _ = std::io::stdout().flush();
            }

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("console shutting down");
                    break;
                }

                line = lines.next_line() => {
                    let input = match line {
                        Ok(Some(l)) => l,
                        Ok(None) => {
                            info!("console stdin closed");
                            break;
                        }
                        Err(e) => {
                            warn!("console read error: {e}");
                            break;
                        }
                    };

                    match parse_frame(&input) {
                        Ok(None) => {}
                        Ok(Some(Frame::Help)) => print_usage(),
                        Ok(Some(Frame::Exit)) => {
                            info!("console requested shutdown");
                            shutdown.cancel();
                            break;
                        }
                        Ok(Some(Frame::Store(triple))) => {
                            match gate.store_triples(std::slice::from_ref(&triple)).await {
                                Ok(info) => println!(
                                    "ok commit_ts={} created={}",
                                    info.commit_ts,
                                    info.uids.len()
                                ),
                                Err(e) => eprintln!("store error: {e}"),
                            }
                        }
                        Ok(Some(Frame::Count { id, relation })) => {
                            match gate.count_relation(&id, &relation).await {
                                Ok(Some(n)) => println!("{n}"),
                                Ok(None) => println!("no node with id {id}"),
                                Err(e) => eprintln!("count error: {e}"),
                            }
                        }
                        Ok(Some(Frame::Reset)) => match gate.reset().await {
                            Ok(()) => println!("ok"),
                            Err(e) => eprintln!("reset error: {e}"),
                        },
                        Err(e) => {
                            eprintln!("{e}");
                            print_usage();
                        }
                    }
                }
            }
        }
        Ok(())
    });

    SubsystemHandle::from_handle("console", task)
}

#[derive(Debug, PartialEq)]
enum Frame {
    Store(Triple),
    Count { id: String, relation: String },
    Reset,
    Help,
    Exit,
}

fn parse_frame(line: &str) -> Result<Option<Frame>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let Some(cmdline) = trimmed.strip_prefix('/') else {
        return Err("expected slash command (line must start with '/')".to_string());
    };

    let mut parts = cmdline.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();

    match command {
        "store" => {
            let mut args = rest.splitn(3, char::is_whitespace);
            match (args.next(), args.next(), args.next().map(str::trim)) {
                (Some(s), Some(p), Some(o)) if !s.is_empty() && !p.is_empty() && !o.is_empty() => {
                    Ok(Some(Frame::Store(Triple::new(s, p, parse_object(o)))))
                }
                _ => Err("usage: /store <subject> <predicate> <object>".to_string()),
            }
        }
        "count" => {
            let args: Vec<&str> = rest.split_whitespace().collect();
            match args.as_slice() {
                [id, relation] => Ok(Some(Frame::Count {
                    id: id.to_string(),
                    relation: relation.to_string(),
                })),
                _ => Err("usage: /count <id> <relation>".to_string()),
            }
        }
        "reset" => ensure_no_args(rest, Frame::Reset),
        "help" => ensure_no_args(rest, Frame::Help),
        "exit" | "quit" => ensure_no_args(rest, Frame::Exit),
        "" => Err("usage: /<command> [args]".to_string()),
        other => Err(format!("unknown command: /{other}")),
    }
}

fn ensure_no_args(rest: &str, frame: Frame) -> Result<Option<Frame>, String> {
    if rest.is_empty() {
        Ok(Some(frame))
    } else {
        Err(format!("unexpected arguments: {rest}"))
    }
}

fn parse_object(raw: &str) -> Object {
    if let Some(id) = raw.strip_prefix('@') {
        return Object::Ref(Ref::new(id));
    }
    if let Some(text) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        return Object::Str(text.to_string());
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Object::Int(i);
    }
    match raw {
        "true" => return Object::Bool(true),
        "false" => return Object::Bool(false),
        _ => {}
    }
    match raw.parse::<f64>() {
        Ok(x) if x.is_finite() => Object::Float(x),
        _ => Object::Str(raw.to_string()),
    }
}

fn print_usage() {
    println!("commands:");
    println!("  /store <subject> <predicate> <object>   object: @id | 42 | 1.5 | true | \"text\"");
    println!("  /count <id> <relation>");
    println!("  /reset");
    println!("  /help");
    println!("  /exit");
}
