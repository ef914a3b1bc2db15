use anyhow::{bail, Context, Result};
use std::env;
use std::fs;

// Use library instead of local modules
use attendance_tracker::telemetry::init_tracing;
use attendance_tracker::{
    parse_skip_hours, AttendanceSource, BatchEntry, ComparisonEngine, Credentials, PortalClient,
    PortalConfig, ProjectionEngine, ServerConfig,
};

const PASSWORD_VAR: &str = "ATTENDANCE_PASSWORD";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    init_tracing(ServerConfig::from_env().log_json, "warn");

    match args.get(1).map(String::as_str) {
        Some("fetch") if args.len() == 3 => run_fetch(&args[2]),
        Some("skip") if args.len() == 4 => run_skip(&args[2], &args[3]),
        Some("compare") if args.len() == 3 => run_compare(&args[2]),
        _ => {
            print_usage();
            std::process::exit(2);
        }
    }
}

fn print_usage() {
    eprintln!("attendance {}", attendance_tracker::VERSION);
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  attendance fetch <student_id>           attendance record as JSON");
    eprintln!("  attendance skip <student_id> <hours>    projection after skipping <hours>");
    eprintln!("  attendance compare <students.json>      compare [{{student_id, password}}, ...]");
    eprintln!();
    eprintln!("fetch and skip read the password from ${}", PASSWORD_VAR);
}

fn credentials_from_env(student_id: &str) -> Result<Credentials> {
    let password = env::var(PASSWORD_VAR).with_context(|| format!("{} is not set", PASSWORD_VAR))?;
    Ok(Credentials::from_parts(Some(student_id), Some(&password))?)
}

fn run_fetch(student_id: &str) -> Result<()> {
    let credentials = credentials_from_env(student_id)?;
    let client = PortalClient::new(PortalConfig::from_env());

    let record = client.fetch(&credentials)?;
    println!("{}", serde_json::to_string_pretty(&record)?);

    Ok(())
}

fn run_skip(student_id: &str, hours: &str) -> Result<()> {
    // Validate before spending a login on it
    let skip_hours = parse_skip_hours(hours)?;
    let credentials = credentials_from_env(student_id)?;
    let client = PortalClient::new(PortalConfig::from_env());

    let record = client.fetch(&credentials)?;
    let projection = ProjectionEngine::new().project(&record, skip_hours);
    println!("{}", serde_json::to_string_pretty(&projection)?);

    Ok(())
}

fn run_compare(path: &str) -> Result<()> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read students file: {}", path))?;
    let entries: Vec<BatchEntry> =
        serde_json::from_str(&content).context("Expecting a JSON list of student credentials")?;
    if entries.is_empty() {
        bail!("{} contains no students", path);
    }

    let client = PortalClient::new(PortalConfig::from_env());
    let result = ComparisonEngine::new(&client).compare(&entries);
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
