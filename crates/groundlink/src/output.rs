use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use groundlink_controller::{ControllerConfig, DriverKind, RunReport};
use groundlink_dispatch::{CommandResult, DriverId, TelemetryMessage, ValveDefault};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ResultOutput<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    command_seq: u8,
    target: u8,
    opcode: u8,
    status: &'a str,
    status_code: u8,
    body: String,
}

impl<'a> ResultOutput<'a> {
    fn new(result: &'a CommandResult) -> Self {
        Self {
            kind: "result",
            command_seq: result.command_seq,
            target: result.target.0,
            opcode: result.opcode,
            status: result.status.name(),
            status_code: result.status.as_u8(),
            body: body_preview(result),
        }
    }
}

#[derive(Serialize)]
struct ReadingOutput {
    #[serde(rename = "type")]
    kind: &'static str,
    source: u8,
    timestamp_ms: u64,
    size: usize,
    data: String,
}

pub fn print_result(result: &CommandResult, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ResultOutput::new(result)),
        OutputFormat::Table => {
            let mut table = table(vec!["SEQ", "TARGET", "OPCODE", "STATUS", "BODY"]);
            table.add_row(vec![
                result.command_seq.to_string(),
                result.target.to_string(),
                format!("{:#04x}", result.opcode),
                result.status.name().to_string(),
                body_preview(result),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "result seq={} target={} opcode={:#04x} status={} body={}",
                result.command_seq,
                result.target,
                result.opcode,
                result.status,
                body_preview(result)
            );
        }
        OutputFormat::Raw => print_raw(result.body.as_ref()),
    }
}

pub fn print_telemetry(message: &TelemetryMessage, format: OutputFormat) {
    match message {
        TelemetryMessage::Result(result) => print_result(result, format),
        TelemetryMessage::Reading {
            source,
            timestamp_ms,
            data,
        } => print_reading(*source, *timestamp_ms, data, format),
    }
}

fn print_reading(source: DriverId, timestamp_ms: u64, data: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ReadingOutput {
            kind: "reading",
            source: source.0,
            timestamp_ms,
            size: data.len(),
            data: hex(data),
        }),
        OutputFormat::Table => {
            let mut table = table(vec!["SOURCE", "TIMESTAMP_MS", "SIZE", "DATA"]);
            table.add_row(vec![
                source.to_string(),
                timestamp_ms.to_string(),
                data.len().to_string(),
                hex(data),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "reading source={source} ts={timestamp_ms} size={} data={}",
                data.len(),
                hex(data)
            );
        }
        OutputFormat::Raw => print_raw(data),
    }
}

#[derive(Serialize)]
struct DriverRow<'a> {
    id: u8,
    name: &'a str,
    kind: String,
    latency_ms: u64,
}

#[derive(Serialize)]
struct RouteRow {
    opcode: u8,
    driver: u8,
    capability: &'static str,
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    valid: bool,
    address: &'a str,
    drivers: Vec<DriverRow<'a>>,
    routes: Vec<RouteRow>,
}

pub fn print_check(config: &ControllerConfig, format: OutputFormat) {
    let drivers: Vec<DriverRow<'_>> = config
        .drivers
        .iter()
        .map(|driver| DriverRow {
            id: driver.id.0,
            name: &driver.name,
            kind: driver_kind(&driver.kind),
            latency_ms: driver.latency_ms,
        })
        .collect();
    let mut routes: Vec<RouteRow> = config
        .routes
        .iter()
        .map(|route| RouteRow {
            opcode: route.opcode,
            driver: route.driver.0,
            capability: route.capability.name(),
        })
        .collect();
    routes.sort_by_key(|route| route.opcode);

    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(&CheckOutput {
            valid: true,
            address: &config.transport.address,
            drivers,
            routes,
        }),
        OutputFormat::Table => {
            let mut driver_table = table(vec!["ID", "NAME", "KIND", "LATENCY_MS"]);
            for row in &drivers {
                driver_table.add_row(vec![
                    row.id.to_string(),
                    row.name.to_string(),
                    row.kind.clone(),
                    row.latency_ms.to_string(),
                ]);
            }
            let mut route_table = table(vec!["OPCODE", "DRIVER", "CAPABILITY"]);
            for row in &routes {
                route_table.add_row(vec![
                    format!("{:#04x}", row.opcode),
                    row.driver.to_string(),
                    row.capability.to_string(),
                ]);
            }
            println!("{driver_table}");
            println!("{route_table}");
        }
        OutputFormat::Pretty => {
            println!("config ok, address={}", config.transport.address);
            for row in &drivers {
                println!("driver id={} name={} kind={}", row.id, row.name, row.kind);
            }
            for row in &routes {
                println!(
                    "route opcode={:#04x} driver={} capability={}",
                    row.opcode, row.driver, row.capability
                );
            }
        }
    }
}

pub fn print_report(report: &RunReport, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(report),
        OutputFormat::Table => {
            let mut table = table(vec!["METRIC", "VALUE"]);
            for (name, value) in report_rows(report) {
                table.add_row(vec![name.to_string(), value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line: Vec<String> = report_rows(report)
                .into_iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            println!("{}", line.join(" "));
        }
    }
}

fn report_rows(report: &RunReport) -> Vec<(&'static str, u64)> {
    let mut rows = vec![
        ("sessions_established", report.sessions_established),
        ("link_losses", report.link_losses),
        ("commands_received", report.commands_received),
        ("commands_rejected", report.commands_rejected),
        ("telemetry_sent", report.telemetry_sent),
        ("frame_errors", report.frame_errors),
        ("frames_dropped", report.frames_dropped),
        ("driver_timeouts", report.dispatch.driver_timeouts),
        ("driver_faults", report.dispatch.driver_faults),
        ("telemetry_dropped", report.dispatch.telemetry_dropped),
    ];
    if let Some(session) = &report.last_session {
        rows.push(("retransmissions", session.retransmissions));
        rows.push(("duplicates", session.duplicates));
    }
    rows
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn driver_kind(kind: &DriverKind) -> String {
    match kind {
        DriverKind::Valve {
            default_state: ValveDefault::Open,
        } => "valve (normally open)".to_string(),
        DriverKind::Valve {
            default_state: ValveDefault::Closed,
        } => "valve (normally closed)".to_string(),
        DriverKind::Actuator => "actuator".to_string(),
        DriverKind::PressureSensor { min_psi, max_psi } => {
            format!("pressure_sensor ({min_psi}..{max_psi} psi)")
        }
    }
}

/// Driver output as hex; error detail as text.
fn body_preview(result: &CommandResult) -> String {
    if result.status.as_u8() == 0 {
        return hex(&result.body);
    }
    match std::str::from_utf8(&result.body) {
        Ok(text) => text.to_string(),
        Err(_) => hex(&result.body),
    }
}

pub fn hex(data: &[u8]) -> String {
    data.iter().map(|byte| format!("{byte:02x}")).collect()
}
