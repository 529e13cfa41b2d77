//! routegrid-aggregation-worker - Subprocess for off-thread aggregation.
//!
//! Spawned by the table's `WorkerClient`. Reads one JSON request per line on
//! stdin and answers each with one JSON response line on stdout, tagged with
//! the request id it came with. Stdout carries nothing else; logs go to
//! stderr.
//!
//! Usage: routegrid-aggregation-worker

use std::io::{self, BufRead, Write};

use routegrid_core::aggregation::handle_request;
use routegrid_types::{WorkerRequest, WorkerResponse};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging() {
    let debug_logging = std::env::var("DEBUG_LOGGING").is_ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if debug_logging {
            "warn,routegrid_core=debug,routegrid_aggregation_worker=debug"
        } else {
            "warn"
        })
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_ansi(false).with_target(true))
        .with(filter)
        .init();
}

fn main() {
    init_logging();

    let stdin = io::stdin();
    let stdout = io::stdout();
    match serve(stdin.lock(), stdout.lock()) {
        Ok(handled) => tracing::debug!(handled, "Input closed, worker exiting"),
        Err(e) => {
            tracing::error!(error = %e, "Worker I/O failed");
            std::process::exit(1);
        }
    }
}

/// Answer requests until `input` is exhausted. Returns how many lines got a
/// response.
fn serve<R: BufRead, W: Write>(input: R, mut output: W) -> io::Result<usize> {
    let mut handled = 0;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Some(response) = respond(&line) else {
            continue;
        };
        let json = serde_json::to_string(&response).map_err(io::Error::other)?;
        writeln!(output, "{json}")?;
        output.flush()?;
        handled += 1;
    }
    Ok(handled)
}

/// Response for one request line. Lines that are not JSON, or carry no
/// request id, cannot be answered and yield `None`.
fn respond(line: &str) -> Option<WorkerResponse> {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Dropping unreadable request line");
            return None;
        }
    };
    let request_id = value.get("requestId").and_then(serde_json::Value::as_u64);

    match serde_json::from_value::<WorkerRequest>(value) {
        Ok(request) => {
            tracing::debug!(request_id = request.request_id, kind = ?request.kind, "Handling request");
            Some(handle_request(&request))
        }
        Err(e) => match request_id {
            Some(id) => {
                tracing::warn!(request_id = id, error = %e, "Malformed request");
                Some(WorkerResponse::error(id, format!("malformed request: {e}")))
            }
            None => {
                tracing::warn!(error = %e, "Dropping request without id");
                None
            }
        },
    }
}
