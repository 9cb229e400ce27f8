//! `callapi send <METHOD> <URL>` – run one handler and report its final state.

use anyhow::{Context, Result};
use callapi_core::config::CallConfig;
use callapi_core::{CallFactory, CallSnapshot, Handler};
use std::time::Duration;

use super::{parse_header_args, read_body};

#[derive(Debug, Clone)]
pub struct SendArgs {
    pub method: String,
    pub url: String,
    pub headers: Vec<String>,
    pub data: Option<String>,
    pub cancel_after: Option<f64>,
    pub json: bool,
}

fn print_snapshot(snap: &CallSnapshot) {
    println!(
        "state:  {} (attempts remaining {})",
        snap.state.phase, snap.state.attempts_remaining
    );
    println!("status: {}", snap.status);
    let mut names: Vec<&String> = snap.headers.keys().collect();
    names.sort();
    for name in names {
        for value in &snap.headers[name] {
            println!("{}: {}", name, value);
        }
    }
    println!();
    println!("{}", snap.body);
}

/// Waits for the handler to stop; cancels on Ctrl-C or after `cancel_after`.
async fn drive(handler: &Handler, cancel_after: Option<Duration>) {
    let deadline = async {
        match cancel_after {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        _ = handler.wait() => {}
        _ = deadline => {
            tracing::info!("cancel-after elapsed, cancelling call");
            handler.cancel().await;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, cancelling call");
            handler.cancel().await;
        }
    }
}

pub async fn run_send(cfg: &CallConfig, args: SendArgs) -> Result<()> {
    let headers = parse_header_args(&args.headers)?;
    let body = read_body(args.data.as_deref())?;
    let cancel_after = args
        .cancel_after
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("--cancel-after must be a non-negative number of seconds")?;

    let factory = CallFactory::from_config(cfg);
    let handler = factory.send(&args.method, &args.url, headers, body);
    drive(&handler, cancel_after).await;

    let snap = handler.snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snap)?);
    } else {
        print_snapshot(&snap);
    }
    Ok(())
}
