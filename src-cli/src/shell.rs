use anyhow::{bail, Context, Result};
use ostinato_core::{Command, Coordinator, PlaybackState, PlaybackStatus, Reply};
use std::io::{self, BufRead, Write};

const HELP: &str = "\
commands:
  add <path>               queue a MIDI file
  stop                     stop the current song (the queue is kept)
  resume                   start the next queued song
  status [--json]          show playback state and queue
  connect <port> [baud]    open the serial link
  disconnect               close the serial link
  ports                    list serial devices
  help                     show this text
  quit                     exit";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShellInput {
    Run { command: Command, json: bool },
    Help,
    Quit,
    Empty,
}

pub fn parse_line(line: &str, default_baud: u32) -> Result<ShellInput> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(ShellInput::Empty);
    };
    let rest: Vec<&str> = words.collect();

    let run = |command: Command| -> Result<ShellInput> {
        Ok(ShellInput::Run {
            command,
            json: false,
        })
    };
    match (verb, rest.as_slice()) {
        ("add", []) => bail!("usage: add <path>"),
        // Paths may contain spaces.
        ("add", parts) => run(Command::Submit {
            path: parts.join(" "),
        }),
        ("stop", []) => run(Command::Stop),
        ("resume", []) => run(Command::Resume),
        ("status", []) => run(Command::Status),
        ("status", ["--json"]) => Ok(ShellInput::Run {
            command: Command::Status,
            json: true,
        }),
        ("connect", [address]) => run(Command::Connect {
            address: address.to_string(),
            baud_rate: default_baud,
        }),
        ("connect", [address, baud]) => run(Command::Connect {
            address: address.to_string(),
            baud_rate: baud
                .parse()
                .with_context(|| format!("invalid baud rate: {}", baud))?,
        }),
        ("disconnect", []) => run(Command::Disconnect),
        ("ports", []) => run(Command::ListDevices),
        ("help", _) => Ok(ShellInput::Help),
        ("quit" | "exit", _) => Ok(ShellInput::Quit),
        (verb, _) => bail!("unknown command '{}', try 'help'", verb),
    }
}

/// Reads commands from stdin until `quit` or end of input.
pub fn run(coordinator: &Coordinator, default_baud: u32) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    println!("ostinato shell, type 'help' for commands");

    loop {
        print!("> ");
        stdout.flush().context("flushing prompt")?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("reading stdin")? == 0 {
            return Ok(());
        }

        match parse_line(&line, default_baud) {
            Ok(ShellInput::Run { command, json }) => match coordinator.handle_command(command) {
                Ok(reply) => print_reply(&reply, json)?,
                Err(err) => println!("error: {}", err),
            },
            Ok(ShellInput::Help) => println!("{}", HELP),
            Ok(ShellInput::Quit) => return Ok(()),
            Ok(ShellInput::Empty) => {}
            Err(err) => println!("{}", err),
        }
    }
}

fn print_reply(reply: &Reply, json: bool) -> Result<()> {
    match reply {
        Reply::Queued { song } => println!("queued {} ({} events)", song, song.event_count()),
        Reply::Stopped { was_playing: true } => println!("stopping"),
        Reply::Stopped { was_playing: false } => println!("nothing is playing"),
        Reply::Status { status } if json => {
            println!(
                "{}",
                serde_json::to_string_pretty(status).context("encoding status")?
            )
        }
        Reply::Status { status } => print_status(status),
        Reply::Devices { devices } if devices.is_empty() => println!("no serial devices found"),
        Reply::Devices { devices } => {
            for device in devices {
                println!("{}\t{}", device.id, device.name);
            }
        }
        Reply::Done => println!("ok"),
    }
    Ok(())
}

fn print_status(status: &PlaybackStatus) {
    let state = match status.state {
        PlaybackState::Idle => "idle",
        PlaybackState::Playing => "playing",
    };
    println!("state: {}, link: {:?}", state, status.link);
    if let Some(song) = &status.current {
        println!("current: {}", song);
    }
    for (position, song) in status.pending.iter().enumerate() {
        println!("{:>3}. {}", position + 1, song);
    }
    if let Some(report) = &status.last_report {
        println!(
            "last: {} {:?} ({} lines, {} unacknowledged)",
            report.song_id, report.outcome, report.lines_sent, report.unacknowledged
        );
    }
}
