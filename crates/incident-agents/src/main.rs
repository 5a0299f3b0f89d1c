use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use incident_agents::alert::{demo_alerts, report_from_alert, report_from_generated, AlertOverrides};
use incident_agents::{
    build_workflow, executor_for, AgentSet, IncidentOrigin, MockApiClient, ResponderConfig,
    RigAnalyst, SlackNotifier,
};
use incident_orchestration::{IncidentReport, IncidentWorkflow, Severity, WorkflowRun};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Scenario requested by `--test`.
const TEST_SCENARIO: &str = "database_timeout";

/// Multi-agent incident responder.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Free-text alert to process
    alert: Option<String>,

    /// Severity of the alert (P0-P3)
    #[arg(long, value_parser = parse_severity)]
    severity: Option<Severity>,

    /// Affected service (derived from the alert text when absent)
    #[arg(long)]
    service: Option<String>,

    /// Incident type (derived from the alert text when absent)
    #[arg(long = "type")]
    incident_type: Option<String>,

    /// Process a generated database-timeout incident from the mock API
    #[arg(long, default_value_t = false)]
    test: bool,

    /// Process the four built-in demo scenarios in parallel
    #[arg(long, default_value_t = false)]
    demo: bool,

    /// Print the effective configuration and exit
    #[arg(long, default_value_t = false)]
    config: bool,

    /// Never confirm remediation with the mock API (alerts and demos never do)
    #[arg(long, default_value_t = false)]
    simulate: bool,

    /// Multiplier on simulated remediation time (0 disables the delay)
    #[arg(long, default_value_t = 1.0)]
    time_scale: f64,

    /// Print run results as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

fn parse_severity(s: &str) -> Result<Severity, String> {
    s.parse().map_err(|e: incident_orchestration::WorkflowError| e.to_string())
}

#[derive(Debug, Error)]
enum CliError {
    /// Bad configuration or usage; exit code 2.
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match ResponderConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            return ExitCode::from(2);
        }
    };
    init_tracing(&config.log_level, args.json_logs);

    match run(args, config).await {
        Ok(code) => ExitCode::from(code),
        Err(CliError::Usage(message)) => {
            eprintln!("{message}");
            ExitCode::from(2)
        }
        Err(CliError::Runtime(e)) => {
            error!(error = %format!("{e:#}"), "Incident responder failed");
            ExitCode::from(1)
        }
    }
}

/// `RUST_LOG` wins over `LOG_LEVEL`.
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(args: Args, config: ResponderConfig) -> Result<u8, CliError> {
    if args.config {
        for line in config.status_lines() {
            println!("{line}");
        }
        return Ok(0);
    }
    config
        .validate()
        .map_err(|e| CliError::Usage(e.to_string()))?;
    if !(args.demo || args.test || args.alert.is_some()) {
        return Err(CliError::Usage(
            "Provide an alert, --test or --demo (see --help)".to_string(),
        ));
    }

    let client = MockApiClient::new(&config.mock_api_base_url, config.data_source_timeout)?;
    let analyst = Arc::new(RigAnalyst::new(&config)?);
    let agents = AgentSet::new(analyst, Arc::new(client.clone()));

    let origin = if args.demo || !args.test {
        IncidentOrigin::Alert
    } else {
        IncidentOrigin::MockApi
    };
    let executor = executor_for(origin, &client, args.time_scale, args.simulate);
    let notifier = Arc::new(SlackNotifier::new(client.clone(), config.channel.clone()));
    let workflow = Arc::new(build_workflow(&config, &agents, executor, notifier)?);

    info!(
        model = %config.model,
        mock_api = %client.base_url(),
        simulate = args.simulate,
        origin = ?origin,
        "Incident responder starting"
    );

    let reports = collect_reports(&args, &client).await?;
    let runs = if reports.len() == 1 {
        let report = reports.into_iter().next().context("no report to process")?;
        vec![workflow.run(report).await]
    } else {
        workflow
            .run_all(reports, config.workflow.max_parallel_incidents)
            .await
    };

    if args.json {
        print_json(&workflow, &runs)?;
    } else {
        for run in &runs {
            print_run(run);
        }
        if runs.len() > 1 {
            print_metrics(&workflow);
        }
    }

    let code = runs.iter().map(WorkflowRun::exit_code).max().unwrap_or(0);
    Ok(u8::try_from(code).unwrap_or(1))
}

async fn collect_reports(args: &Args, client: &MockApiClient) -> Result<Vec<IncidentReport>> {
    let overrides = AlertOverrides {
        severity: args.severity,
        service: args.service.clone(),
        incident_type: args.incident_type.clone(),
    };

    if args.demo {
        return Ok(demo_alerts()
            .iter()
            .map(|(name, alert)| {
                info!(scenario = name, "Queued demo scenario");
                report_from_alert(alert, &overrides)
            })
            .collect());
    }

    if args.test {
        let incident = client
            .generate_incident(Some(TEST_SCENARIO))
            .await
            .context("Failed to generate a test incident from the mock API")?;
        return Ok(vec![report_from_generated(&incident)?]);
    }

    let alert = args.alert.as_deref().unwrap_or_default();
    Ok(vec![report_from_alert(alert, &overrides)])
}

fn print_run(run: &WorkflowRun) {
    let state = &run.state;
    let facts = state.facts();
    let fmt_conf = |c: Option<f64>| c.map_or_else(|| "n/a".to_string(), |c| format!("{c:.2}"));

    println!();
    println!(
        "Incident {} ({} {} on {})",
        facts.incident_id, facts.severity, facts.incident_type, facts.affected_service
    );
    println!("  Status:                 {}", state.status());
    println!("  Path:                   {}", state.status_path());
    println!("  Overall confidence:     {}", fmt_conf(state.overall_confidence()));
    println!("  Remediation confidence: {}", fmt_conf(state.remediation_confidence()));
    if let Some(reason) = state.escalation_reason() {
        println!("  Escalation reason:      {reason}");
    }
    if let Some(method) = state.resolution_method() {
        println!("  Resolution method:      {method}");
    }
    if let Some(m) = state.mitigation() {
        println!("  Mitigation attempts:    {}", m.attempts);
    }
    if let Some(fault) = &run.fault {
        println!("  Fault:                  {fault}");
    }
    for name in sorted_task_names(state) {
        if let Some(result) = state.result(&name) {
            match (result.confidence(), result.error()) {
                (Some(c), _) => println!("    {name:<14} ok     {c:.2} ({} ms)", result.elapsed_ms),
                (None, Some(e)) => println!("    {name:<14} failed {e}"),
                (None, None) => {}
            }
        }
    }
    println!(
        "  Analysis: {:.1}s, total: {:.1}s",
        run.analysis_elapsed.as_secs_f64(),
        run.total_elapsed.as_secs_f64()
    );
}

fn sorted_task_names(state: &incident_orchestration::IncidentState) -> Vec<String> {
    let mut names: Vec<String> = state.phase_results().keys().cloned().collect();
    names.sort();
    names
}

fn print_metrics(workflow: &IncidentWorkflow) {
    let m = workflow.metrics();
    println!();
    println!("Processed {} incidents", m.total_incidents);
    println!("  Auto-remediated: {}", m.auto_remediated);
    println!("  Escalated:       {}", m.escalated);
    println!("  Errored:         {}", m.errored);
    println!("  Success rate:    {:.0}%", m.success_rate * 100.0);
    println!("  Avg resolution:  {:.1}s", m.average_resolution_secs);
}

fn print_json(workflow: &IncidentWorkflow, runs: &[WorkflowRun]) -> Result<()> {
    let runs: Vec<_> = runs
        .iter()
        .map(|run| {
            json!({
                "state": run.state,
                "decision": run.decision,
                "fault": run.fault.as_ref().map(|f| f.to_string()),
                "analysis_elapsed_ms": run.analysis_elapsed.as_millis() as u64,
                "total_elapsed_ms": run.total_elapsed.as_millis() as u64,
            })
        })
        .collect();
    let output = json!({ "runs": runs, "metrics": workflow.metrics() });
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to serialize results")?
    );
    Ok(())
}
