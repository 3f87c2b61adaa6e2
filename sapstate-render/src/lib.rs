//! Plain-text rendering for human-readable output.

use sapstate_types::StateResult;
use sapstate_types::control::{ProcessInfo, SystemInstance, WorkProcess};
use serde_json::Value;

/// Plain-text rendering in the layout automation runtimes print for a state.
pub fn render_state_text(ret: &StateResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("          ID: {}\n", ret.name));
    out.push_str(&format!("      Result: {}\n", result_label(ret.result)));
    if let Some(kind) = ret.failure {
        out.push_str(&format!("     Failure: {}\n", kind));
    }

    let mut lines = ret.comment.lines();
    out.push_str(&format!("     Comment: {}\n", lines.next().unwrap_or("")));
    for line in lines {
        out.push_str(&format!("              {}\n", line));
    }

    if ret.changes.is_empty() {
        out.push_str("     Changes: none\n");
        return out;
    }
    out.push_str("     Changes:\n");
    for (key, value) in &ret.changes {
        render_value(&mut out, key, value, 14);
    }
    out
}

fn render_value(out: &mut String, key: &str, value: &Value, indent: usize) {
    let pad = " ".repeat(indent);
    match value {
        Value::String(s) => out.push_str(&format!("{pad}{key}: {s}\n")),
        Value::Array(items) => {
            out.push_str(&format!("{pad}{key}:\n"));
            for item in items {
                match item {
                    Value::String(s) => out.push_str(&format!("{pad}  - {s}\n")),
                    other => out.push_str(&format!("{pad}  - {other}\n")),
                }
            }
        }
        Value::Object(map) => {
            out.push_str(&format!("{pad}{key}:\n"));
            for (k, v) in map {
                render_value(out, k, v, indent + 2);
            }
        }
        other => out.push_str(&format!("{pad}{key}: {other}\n")),
    }
}

fn result_label(result: Option<bool>) -> &'static str {
    match result {
        Some(true) => "True",
        Some(false) => "False",
        None => "None",
    }
}

/// Column-aligned table; every row must have `header.len()` cells.
pub fn render_table(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect();
        format!("{}\n", padded.join("  ").trim_end())
    };

    let mut out = line(header.to_vec());
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
    }
    out
}

pub fn render_instances_text(instances: &[SystemInstance]) -> String {
    let rows: Vec<Vec<String>> = instances
        .iter()
        .map(|i| {
            vec![
                i.hostname.clone(),
                format!("{:02}", i.instance_nr),
                i.features.join("|"),
                i.disp_status.to_string(),
            ]
        })
        .collect();
    render_table(&["hostname", "nr", "features", "status"], &rows)
}

pub fn render_processes_text(processes: &[ProcessInfo]) -> String {
    let rows: Vec<Vec<String>> = processes
        .iter()
        .map(|p| {
            vec![
                p.name.clone(),
                p.disp_status.to_string(),
                p.pid.map(|x| x.to_string()).unwrap_or_else(|| "-".to_string()),
                p.text_status.clone(),
            ]
        })
        .collect();
    render_table(&["name", "status", "pid", "text"], &rows)
}

pub fn render_workprocesses_text(table: &[WorkProcess]) -> String {
    let rows: Vec<Vec<String>> = table
        .iter()
        .map(|wp| {
            vec![
                wp.no.to_string(),
                wp.typ.clone(),
                wp.pid.map(|x| x.to_string()).unwrap_or_else(|| "-".to_string()),
                wp.status.clone(),
                wp.err.clone(),
            ]
        })
        .collect();
    render_table(&["no", "typ", "pid", "status", "err"], &rows)
}
