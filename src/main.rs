// src/main.rs

//! The `ampd` command-line client: runs one command, or prints change
//! notifications until interrupted.

use ampd::config::ClientConfig;
use ampd::{Arg, Client, EventSet, Reply, ServerTarget};
use anyhow::{Context, Result, anyhow, bail};
use std::env;
use std::io::{self, Write};
use tracing::{debug, error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*};

const USAGE: &str = "\
Usage: ampd [--config PATH] [--host HOST] [--port PORT] [--password PW] <command> [args...]
       ampd [--config PATH] [--host HOST] [--port PORT] [--password PW] --watch [subsystem...]";

/// What the command line asked for.
#[derive(Debug, Default, PartialEq)]
struct Options {
    config: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    password: Option<String>,
    watch: bool,
    /// The command and its arguments, or the subsystems to watch.
    rest: Vec<String>,
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut options = Options::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("{flag} flag requires a value"))
        };
        match arg.as_str() {
            "--config" => options.config = Some(value("--config")?),
            "--host" => options.host = Some(value("--host")?),
            "--password" => options.password = Some(value("--password")?),
            "--port" => {
                let port = value("--port")?;
                options.port = Some(
                    port.parse()
                        .with_context(|| format!("Invalid port number: {port}"))?,
                );
            }
            "--watch" => {
                options.watch = true;
                options.rest = iter.by_ref().cloned().collect();
                break;
            }
            flag if flag.starts_with("--") => bail!("Unknown flag {flag}\n{USAGE}"),
            _ => {
                options.rest.push(arg.clone());
                options.rest.extend(iter.by_ref().cloned());
                break;
            }
        }
    }
    if !options.watch && options.rest.is_empty() {
        bail!("No command given\n{USAGE}");
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("AMPD_BUILD_VERSION");

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--version") {
        println!("ampd version {VERSION}");
        return Ok(());
    }
    if args.is_empty() || args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{USAGE}");
        return Ok(());
    }

    let options = parse_args(&args)?;
    let config = match &options.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };

    // Logs go to stderr so replies on stdout stay clean.
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(io::stderr),
        )
        .init();

    let target = ServerTarget::parse_host(
        options.host.as_deref().or(config.host.as_deref()),
        options.port.or(config.port),
        options.password.clone().or_else(|| config.password.clone()),
    )?;

    let client = Client::builder()
        .connect_timeout(config.connect_timeout)
        .span(tracing::info_span!("ampd"))
        .build();
    let version = client
        .connect_to_server(target.clone())
        .await
        .with_context(|| format!("Failed to connect to {}", target.endpoint))?;
    info!("Connected to {} (protocol {})", target.endpoint, version);

    let outcome = if options.watch {
        watch(&client, &options.rest).await
    } else {
        run_command(&client, &options.rest).await
    };
    client.close();
    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}

async fn run_command(client: &Client, command: &[String]) -> Result<()> {
    let (name, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("No command given"))?;
    let args: Vec<Arg> = args.iter().map(Arg::from).collect();
    let reply = client.executor().call(name, &args).await?;
    print_reply(&mut io::stdout().lock(), &reply)?;
    Ok(())
}

async fn watch(client: &Client, subsystems: &[String]) -> Result<()> {
    let mask = if subsystems.is_empty() {
        EventSet::SUBSYSTEMS
    } else {
        let mask = EventSet::from_subsystems(subsystems.iter().map(String::as_str));
        if mask.is_empty() {
            bail!("None of {:?} is a known subsystem", subsystems);
        }
        mask
    };

    let executor = client.executor().sub_executor()?;
    let outcome = loop {
        tokio::select! {
            events = executor.idle(mask, None) => match events {
                Ok(events) => {
                    let mut out = io::stdout().lock();
                    for name in events.subsystem_names() {
                        writeln!(out, "changed: {name}")?;
                    }
                    out.flush()?;
                }
                Err(e) => break Err(e.into()),
            },
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted, stopping watch");
                break Ok(());
            }
        }
    };
    executor.close();
    outcome
}

fn print_reply(out: &mut impl Write, reply: &Reply) -> io::Result<()> {
    match reply {
        Reply::Empty => {}
        Reply::Dict(dict) => {
            for (key, value) in dict {
                writeln!(out, "{key}: {value}")?;
            }
        }
        Reply::List(values) => {
            for value in values {
                writeln!(out, "{value}")?;
            }
        }
        Reply::Objects(objects) => {
            for (i, object) in objects.iter().enumerate() {
                if i > 0 {
                    writeln!(out)?;
                }
                for (key, value) in object {
                    writeln!(out, "{key}: {value}")?;
                }
            }
        }
        Reply::Raw(bytes) => out.write_all(bytes)?,
        Reply::Events(events) => {
            for name in events.subsystem_names() {
                writeln!(out, "changed: {name}")?;
            }
        }
        Reply::Version(version) => writeln!(out, "{version}")?,
    }
    out.flush()
}
