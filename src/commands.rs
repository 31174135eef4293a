use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use holdbook::{
    decode, ExpandController, HoldPage, HoldRow, HoldbookConfig, HoldbookHttpClient, PreviousQuery,
    SessionContext,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{BackendArgs, DecodeArgs, DiffArgs, PrefetchArgs, PreviousArgs};
use crate::error::CliError;
use crate::output::{self, RecordReport};

/// Read a whole file, or stdin when the path is `-`.
fn read_input(path: &Path) -> Result<String, CliError> {
    if path.as_os_str() == "-" {
        return Ok(io::read_to_string(io::stdin())?);
    }
    Ok(fs::read_to_string(path)?)
}

/// Build the HTTP client from env config plus flag overrides. A
/// `HOLDBOOK_TOKEN` in the environment starts an authenticated session.
fn connect(args: &BackendArgs) -> Result<(HoldbookHttpClient, HoldbookConfig), CliError> {
    let mut config = HoldbookConfig::from_env();
    if let Some(base) = &args.api_base {
        config.api_base = base.clone();
    }
    if let Some(endpoint) = &args.endpoint {
        config.previous_endpoint = endpoint.clone();
    }
    if let Some(ms) = args.timeout_ms {
        config.request_timeout_ms = ms;
    }

    let mut client = HoldbookHttpClient::from_config(&config)?;
    if let Ok(token) = std::env::var("HOLDBOOK_TOKEN") {
        client = client.with_session(Arc::new(SessionContext::with_token(token)));
    }
    info!(api_base = client.base_url(), endpoint = %config.previous_endpoint, "backend configured");
    Ok((client, config))
}

pub fn run_decode(args: &DecodeArgs, json: bool) -> Result<(), CliError> {
    let raw = read_input(&args.input)?;
    let rows = decode(Some(&raw));
    if rows.is_empty() {
        warn!(input = %args.input.display(), "snapshot decoded to an empty ledger");
    }

    let mut buf = String::with_capacity(128);
    output::write_rows(&rows, json, &mut buf, &mut io::stdout())
}

pub fn run_diff(args: &DiffArgs, json: bool) -> Result<(), CliError> {
    let current = decode(Some(&read_input(&args.current)?));
    let previous = decode(Some(&read_input(&args.previous)?));

    let mut buf = String::with_capacity(128);
    let mut out = io::stdout();
    if args.aligned {
        let aligned = holdbook::aligned_rows(&current, &previous);
        return output::write_rows(&aligned, json, &mut buf, &mut out);
    }

    let active = holdbook::active_level_count(&current, &previous);
    info!(levels = current.len(), active, "diff computed");
    let diff = holdbook::traded_diff(&current, &previous);
    output::write_rows(&diff, json, &mut buf, &mut out)
}

pub async fn run_previous(args: &PreviousArgs, json: bool) -> Result<(), CliError> {
    let (client, config) = connect(&args.backend)?;

    let query = args.params.iter().fold(
        PreviousQuery::new(
            args.record_id,
            args.market_id,
            args.selection_id,
            args.reference_time.clone(),
        ),
        |q, (k, v)| q.with_param(k.clone(), v.clone()),
    );

    let Some(record) = client
        .get_previous_record(&config.previous_endpoint, &query)
        .await?
    else {
        info!(record_id = args.record_id, "no previous record");
        return Ok(());
    };
    info!(
        record_id = args.record_id,
        previous_id = record.record_id,
        reference_time = %record.reference_time,
        "previous record found"
    );

    let rows = decode(record.raw_data.as_deref());
    let mut buf = String::with_capacity(128);
    output::write_rows(&rows, json, &mut buf, &mut io::stdout())
}

pub async fn run_prefetch(
    args: &PrefetchArgs,
    json: bool,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    let page: HoldPage = serde_json::from_str(&read_input(&args.page)?)?;
    let rows: Vec<HoldRow> = page.rows().cloned().collect();
    info!(rows = rows.len(), windows = page.windows.len(), "page loaded");

    let (client, config) = connect(&args.backend)?;
    let controller = ExpandController::new(client.previous_fetcher(config.previous_endpoint));

    let summary = tokio::select! {
        summary = controller.prefetch_all(&rows) => summary,
        _ = cancel.cancelled() => return Err(CliError::Cancelled),
    };

    let mut buf = String::with_capacity(256);
    let mut out = io::stdout();
    for row in &rows {
        let key = row.record_id;
        controller.decode_current(row);
        let diff = controller.diff_ledger(key);
        let report = RecordReport {
            record_id: key,
            selection: &row.selection,
            failed: controller.is_failed(key),
            heavy: controller.is_heavily_traded(key, args.heavy_threshold),
            diff: &diff,
        };
        output::write_report(&report, json, &mut buf, &mut out)?;
    }

    output::write_summary(&summary, json, &mut buf, &mut out)
}
