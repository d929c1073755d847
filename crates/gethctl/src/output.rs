use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use gethctl_node::{LaunchPlan, NodeHandle};
use serde::Serialize;
use serde_json::Value;

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
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanOutput {
    executable: String,
    data_dir: String,
    endpoint: String,
    args: Vec<String>,
}

impl PlanOutput {
    fn new(plan: &LaunchPlan) -> Self {
        Self {
            executable: plan.executable.display().to_string(),
            data_dir: plan.data_dir.display().to_string(),
            endpoint: plan.endpoint().to_string(),
            args: plan
                .args
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct StatusOutput {
    generation: u64,
    pid: Option<u32>,
    #[serde(flatten)]
    plan: PlanOutput,
}

/// Print a call result.
pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{value}"),
        OutputFormat::Pretty => println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        ),
        OutputFormat::Table => println!("{}", value_table(value)),
        OutputFormat::Raw => match value {
            Value::String(s) => print_raw(s.as_bytes()),
            other => print_raw(other.to_string().as_bytes()),
        },
    }
}

/// Print the command line a start would run.
pub fn print_plan(plan: &LaunchPlan, format: OutputFormat) {
    let out = PlanOutput::new(plan);
    match format {
        OutputFormat::Json => println!("{}", to_json(&out)),
        OutputFormat::Pretty => {
            println!("executable: {}", out.executable);
            println!("datadir:    {}", out.data_dir);
            println!("endpoint:   {}", out.endpoint);
            println!("args:       {}", out.args.join(" "));
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["FIELD", "VALUE"]);
            table
                .add_row(vec!["executable".to_string(), out.executable])
                .add_row(vec!["datadir".to_string(), out.data_dir])
                .add_row(vec!["endpoint".to_string(), out.endpoint])
                .add_row(vec!["args".to_string(), out.args.join(" ")]);
            println!("{table}");
        }
        OutputFormat::Raw => {
            let mut line = out.executable;
            for arg in &out.args {
                line.push(' ');
                line.push_str(arg);
            }
            println!("{line}");
        }
    }
}

/// Print the state of a freshly started node.
pub fn print_status(handle: &NodeHandle, plan: &LaunchPlan, format: OutputFormat) {
    let out = StatusOutput {
        generation: handle.generation,
        pid: handle.pid,
        plan: PlanOutput::new(plan),
    };
    let pid = out
        .pid
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    match format {
        OutputFormat::Json => println!("{}", to_json(&out)),
        OutputFormat::Table => {
            let mut table = new_table(vec!["GENERATION", "PID", "ENDPOINT"]);
            table.add_row(vec![out.generation.to_string(), pid, out.plan.endpoint]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "node running: generation={} pid={} endpoint={}",
                out.generation, pid, out.plan.endpoint
            );
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn value_table(value: &Value) -> Table {
    match value {
        Value::Object(map) => {
            let mut table = new_table(vec!["KEY", "VALUE"]);
            for (key, item) in map {
                table.add_row(vec![key.clone(), cell(item)]);
            }
            table
        }
        Value::Array(items) => {
            let mut table = new_table(vec!["#", "VALUE"]);
            for (index, item) in items.iter().enumerate() {
                table.add_row(vec![index.to_string(), cell(item)]);
            }
            table
        }
        scalar => {
            let mut table = new_table(vec!["RESULT"]);
            table.add_row(vec![cell(scalar)]);
            table
        }
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
