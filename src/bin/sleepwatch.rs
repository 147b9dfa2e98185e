//! Sleepwatch CLI - Command-line interface for sleep quality scoring
//!
//! Commands:
//! - score: Score device readings (batch mode)
//! - run: Score streaming readings from stdin (streaming mode)
//! - validate: Report missing and non-numeric fields
//! - doctor: Diagnose configuration and environment
//! - config: Print the effective configuration
//! - schema: Describe input and output records

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use sleepwatch::config::ScoringConfig;
use sleepwatch::scoring::{SleepQualityScorer, WEIGHT_SUM_TOLERANCE};
use sleepwatch::schema::{RawReading, ReadingAdapter, SampleWindow};
use sleepwatch::types::{ScoredReading, SensorReading};
use sleepwatch::{Calibration, PRODUCER_NAME, VERSION};

/// Sleepwatch - Sleep quality scoring for bedside sensor devices
#[derive(Parser)]
#[command(name = "sleepwatch")]
#[command(version = VERSION)]
#[command(about = "Score bedside sensor readings for sleep quality", long_about = None)]
struct Cli {
    /// Scoring configuration file (JSON)
    #[arg(long, global = true, env = "SLEEPWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Use the legacy calibration (heart rate up to 90 bpm, temperature from 22 °C)
    #[arg(long, global = true)]
    legacy_calibration: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score device readings (batch mode)
    Score {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Score streaming readings from stdin (streaming mode)
    Run {
        /// Average samples over the configured interval before scoring
        #[arg(long)]
        average: bool,

        /// Flush output after each record (`--flush false` to buffer)
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        flush: bool,
    },

    /// Report missing and non-numeric fields
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one reading per line)
    Ndjson,
    /// JSON array of readings
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one scored reading per line)
    Ndjson,
    /// JSON array of scored readings
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Device reading
    Input,
    /// Scored reading
    Output,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), SleepCliError> {
    let Cli {
        config,
        legacy_calibration,
        command,
    } = cli;

    match command {
        Commands::Score {
            input,
            output,
            input_format,
            output_format,
        } => {
            let config = load_config(config.as_deref(), legacy_calibration)?;
            cmd_score(&config, &input, &output, input_format, output_format)
        }

        Commands::Run { average, flush } => {
            let config = load_config(config.as_deref(), legacy_calibration)?;
            cmd_run(&config, average, flush)
        }

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { json } => cmd_doctor(config.as_deref(), json),

        Commands::Config => {
            let config = load_config(config.as_deref(), legacy_calibration)?;
            println!("{}", config.to_json()?);
            Ok(())
        }

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn load_config(path: Option<&Path>, legacy: bool) -> Result<ScoringConfig, SleepCliError> {
    let mut config = match path {
        Some(path) => ScoringConfig::from_file(path)?,
        None => ScoringConfig::default(),
    };
    if legacy {
        config.calibration = Calibration::legacy();
    }
    log::debug!(
        "using {} configuration for {}",
        if path.is_some() { "file" } else { "default" },
        config.device_id
    );
    Ok(config)
}

fn cmd_score(
    config: &ScoringConfig,
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
) -> Result<(), SleepCliError> {
    let input_data = read_input(input)?;

    let raw = match input_format {
        InputFormat::Ndjson => ReadingAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => ReadingAdapter::parse_array(&input_data)?,
    };

    if raw.is_empty() {
        return Err(SleepCliError::NoReadings);
    }

    let scorer = SleepQualityScorer::from_config(config);
    let mut scored = Vec::with_capacity(raw.len());
    for reading in ReadingAdapter::to_readings(&raw) {
        scored.push(score_one(&scorer, config, reading)?);
    }

    let output_data = format_output(&scored, &output_format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_run(config: &ScoringConfig, average: bool, flush: bool) -> Result<(), SleepCliError> {
    let scorer = SleepQualityScorer::from_config(config);
    let mut window = SampleWindow::new(config.sample_interval_secs)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let reading = ReadingAdapter::parse_reading(trimmed)?;

        let ready = if average {
            let at = reading.observed_at.unwrap_or_else(Utc::now);
            window.push(&reading, at)
        } else {
            Some(reading)
        };

        if let Some(reading) = ready {
            let scored = score_one(&scorer, config, reading)?;
            writeln!(stdout, "{}", serde_json::to_string(&scored)?)?;
            if flush {
                stdout.flush()?;
            }
        }
    }

    if let Some(reading) = window.flush(Utc::now()) {
        let scored = score_one(&scorer, config, reading)?;
        writeln!(stdout, "{}", serde_json::to_string(&scored)?)?;
        stdout.flush()?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), SleepCliError> {
    let input_data = read_input(input)?;

    let raw: Vec<RawReading> = match input_format {
        InputFormat::Ndjson => ReadingAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => ReadingAdapter::parse_array(&input_data)?,
    };

    let results = ReadingAdapter::validate_readings(&raw);

    let report = ValidationReport {
        total_readings: raw.len(),
        complete_readings: raw.len() - results.len(),
        incomplete_readings: results.len(),
        issues: results
            .iter()
            .map(|r| ValidationIssueDetail {
                index: r.index,
                issues: r.issues.iter().map(|i| i.to_string()).collect(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total readings:      {}", report.total_readings);
        println!("Complete readings:   {}", report.complete_readings);
        println!("Incomplete readings: {}", report.incomplete_readings);

        if !report.issues.is_empty() {
            println!("\nIssues:");
            for detail in &report.issues {
                println!("  - Reading {}: {}", detail.index, detail.issues.join("; "));
            }
        }
    }

    if report.incomplete_readings > 0 {
        Err(SleepCliError::ValidationFailed(report.incomplete_readings))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), SleepCliError> {
    let mut checks: Vec<DoctorCheck> = vec![DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Sleepwatch version {}", VERSION),
    }];

    let config = match config_path {
        Some(path) if !path.exists() => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Config file {} does not exist", path.display()),
            });
            None
        }
        Some(path) => match ScoringConfig::from_file(path) {
            Ok(config) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Config file valid (device {})", config.device_id),
                });
                Some(config)
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid config: {}", e),
                });
                None
            }
        },
        None => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: "No config file; using defaults".to_string(),
            });
            Some(ScoringConfig::default())
        }
    };

    if let Some(config) = &config {
        let sum = config.weights.sum();
        checks.push(if (sum - 1.0).abs() <= WEIGHT_SUM_TOLERANCE {
            DoctorCheck {
                name: "weights".to_string(),
                status: CheckStatus::Ok,
                message: format!("Weights sum to {:.2}", sum),
            }
        } else {
            DoctorCheck {
                name: "weights".to_string(),
                status: CheckStatus::Error,
                message: format!("Weights sum to {}, expected 1.0", sum),
            }
        });

        if config.calibration == Calibration::legacy() {
            checks.push(DoctorCheck {
                name: "calibration".to_string(),
                status: CheckStatus::Warning,
                message: "Legacy calibration in use".to_string(),
            });
        }
    }

    // Check stdin is available (for streaming mode)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Sleepwatch Doctor Report");
        println!("========================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(SleepCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), SleepCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input: one device reading per record");
                println!();
                println!("- heartRate:   beats per minute (number or numeric string)");
                println!("- motion:      boolean flag or 0-1 fraction of the window with movement");
                println!("- temp:        room temperature, celsius");
                println!("- humid:       relative humidity, percent");
                println!("- sound:       sound level, decibels");
                println!("- brightness:  brightness points, 0-100");
                println!("- light:       lamp relay status (boolean) or brightness (number)");
                println!("- currentTime: RFC 3339 or YYYY-MM-DD HH:MM:SS (UTC), optional");
                println!();
                println!("Missing or non-numeric channels are defaulted to 0 and flagged,");
                println!("or rejected when missing_fields is \"reject\".");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Output: the reading fields plus");
                println!();
                println!("- dataPoint:   sleep quality score, 0-100 with two decimals");
                println!("- currentTime: timestamp of the reading");
                println!("- deviceId:    device identifier");
                println!("- flags:       quality flags (defaulted_<channel>, no_signal), if any");
            }
        }
    }

    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, SleepCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn score_one(
    scorer: &SleepQualityScorer,
    config: &ScoringConfig,
    reading: SensorReading,
) -> Result<ScoredReading, SleepCliError> {
    let assessment = scorer.score(&reading)?;
    Ok(ScoredReading {
        current_time: reading.observed_at.unwrap_or_else(Utc::now),
        data_point: assessment.score,
        device_id: config.device_id.clone(),
        flags: assessment.flag_labels(),
        reading,
    })
}

fn format_output(scored: &[ScoredReading], format: &OutputFormat) -> Result<String, SleepCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in scored {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(scored)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(scored)?),
    }
}

fn channel_schema() -> serde_json::Value {
    serde_json::json!({
        "heartRate": { "type": ["number", "string"] },
        "motion": { "type": ["boolean", "number", "string"] },
        "temp": { "type": ["number", "string"] },
        "humid": { "type": ["number", "string"] },
        "sound": { "type": ["number", "string"] },
        "brightness": { "type": ["number", "string"] },
        "light": { "type": ["boolean", "number", "string"] }
    })
}

fn get_input_json_schema() -> String {
    let mut properties = channel_schema();
    properties["currentTime"] = serde_json::json!({ "type": ["string", "integer"] });

    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "sleepwatch.reading",
        "description": "Bedside device reading",
        "type": "object",
        "properties": properties
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    let mut properties = channel_schema();
    properties["dataPoint"] = serde_json::json!({ "type": "number", "minimum": 0, "maximum": 100 });
    properties["currentTime"] = serde_json::json!({ "type": "string", "format": "date-time" });
    properties["deviceId"] = serde_json::json!({ "type": "string" });
    properties["flags"] = serde_json::json!({ "type": "array", "items": { "type": "string" } });

    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "sleepwatch.scored_reading",
        "description": "Device reading with its sleep quality score",
        "type": "object",
        "required": ["dataPoint", "currentTime", "deviceId"],
        "properties": properties
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum SleepCliError {
    Io(io::Error),
    Compute(sleepwatch::ComputeError),
    Json(serde_json::Error),
    NoReadings,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for SleepCliError {
    fn from(e: io::Error) -> Self {
        SleepCliError::Io(e)
    }
}

impl From<sleepwatch::ComputeError> for SleepCliError {
    fn from(e: sleepwatch::ComputeError) -> Self {
        SleepCliError::Compute(e)
    }
}

impl From<serde_json::Error> for SleepCliError {
    fn from(e: serde_json::Error) -> Self {
        SleepCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<SleepCliError> for CliError {
    fn from(e: SleepCliError) -> Self {
        use sleepwatch::ComputeError;

        match e {
            SleepCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            SleepCliError::Compute(e) => {
                let (code, hint) = match &e {
                    ComputeError::MissingField(_) => (
                        "MISSING_FIELD",
                        "Set missing_fields to \"zero\" or run 'sleepwatch validate'",
                    ),
                    ComputeError::InvalidWeights(_) | ComputeError::InvalidCalibration(_) => (
                        "CONFIG_ERROR",
                        "Run 'sleepwatch doctor' to check the configuration",
                    ),
                    _ => ("PARSE_ERROR", "Run 'sleepwatch schema input' for the expected format"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            SleepCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            SleepCliError::NoReadings => CliError {
                code: "NO_READINGS".to_string(),
                message: "No readings found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            SleepCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} readings have missing or non-numeric fields", count),
                hint: Some("Incomplete readings are scored with zeros unless rejected".to_string()),
            },
            SleepCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_readings: usize,
    complete_readings: usize,
    incomplete_readings: usize,
    issues: Vec<ValidationIssueDetail>,
}

#[derive(serde::Serialize)]
struct ValidationIssueDetail {
    index: usize,
    issues: Vec<String>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run_flags(args: &[&str]) -> (bool, bool) {
        match Cli::try_parse_from(args).unwrap().command {
            Commands::Run { average, flush } => (average, flush),
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_run_flush_defaults_on() {
        assert_eq!(run_flags(&["sleepwatch", "run"]), (false, true));
    }

    #[test]
    fn test_run_flush_can_be_disabled() {
        assert_eq!(
            run_flags(&["sleepwatch", "run", "--flush", "false"]),
            (false, false)
        );
        assert_eq!(
            run_flags(&["sleepwatch", "run", "--average", "--flush=true"]),
            (true, true)
        );
    }
}
