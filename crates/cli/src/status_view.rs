//! Plain-text rendering of run-status snapshots.
//!
//! While a run is going, each snapshot is reduced to one summary line. Once
//! it ends, the latest snapshot is printed as a numbered tree of scripts,
//! tests and instructions.

use std::io::{stdout, Write};

use crossterm::queue;
use crossterm::style::{Print, ResetColor, SetForegroundColor};
use itertools::Itertools;
use runwatch_core::error::Result;
use runwatch_core::status::{RunStatus, RunStatusMessage, StatusTally};

use crate::colors::AsTermColor;

/// Formats a tally as `2 passed, 1 failed`, in status order.
pub fn format_tally(tally: &StatusTally) -> String {
    if tally.is_empty() {
        return "none".to_string();
    }

    tally
        .iter()
        .map(|(status, count)| format!("{count} {status}"))
        .join(", ")
}

/// One line describing the whole snapshot.
pub fn format_summary(status: &RunStatusMessage) -> String {
    let mut summary = format!(
        "[{:>7.1}s] {} | scripts: {} | tests: {}",
        status.elapsed_time,
        status.status,
        format_tally(&status.script_tally()),
        format_tally(&status.test_tally()),
    );

    if status.status.is_terminal() {
        summary.push_str(if status.status.is_failure() {
            " | run failed"
        } else {
            " | run finished"
        });
    } else if let Some(step) = status.active_step() {
        summary.push_str(&format!(
            " | {} #{} {}",
            step.test_number,
            step.instruction_index + 1,
            step.instruction
        ));
    }

    summary
}

/// The snapshot as an indented tree. Rows are numbered per level, starting
/// at 1 in every render.
pub fn format_tree(status: &RunStatusMessage) -> Vec<(RunStatus, String)> {
    let mut rows = Vec::new();

    for (script_number, script) in status.scripts.iter().enumerate() {
        rows.push((
            script.status,
            with_details(
                format!("{}. {} [{}]", script_number + 1, script.path, script.status),
                script.details.as_deref(),
            ),
        ));

        for (test_number, test) in script.tests.iter().enumerate() {
            let label = match &test.description {
                Some(description) if !description.is_empty() => {
                    format!("{} {}", test.test_number, description)
                }
                _ => test.test_number.clone(),
            };
            rows.push((
                test.status,
                with_details(
                    format!("  {}.{} {} [{}]", script_number + 1, test_number + 1, label, test.status),
                    test.details.as_deref(),
                ),
            ));

            for (index, instruction) in test.instructions.iter().enumerate() {
                rows.push((
                    instruction.status,
                    with_details(
                        format!("      {}. {} [{}]", index + 1, instruction.instruction, instruction.status),
                        instruction.details.as_deref(),
                    ),
                ));
            }
        }
    }

    rows
}

fn with_details(row: String, details: Option<&str>) -> String {
    match details.map(str::trim) {
        Some(details) if !details.is_empty() => format!("{row}: {details}"),
        _ => row,
    }
}

/// Prints the summary line in the color of the overall status.
pub fn print_summary(status: &RunStatusMessage) -> Result<()> {
    print_colored(status.status, &format_summary(status))
}

pub fn print_tree(status: &RunStatusMessage) -> Result<()> {
    for (row_status, row) in format_tree(status) {
        print_colored(row_status, &row)?;
    }
    Ok(())
}

fn print_colored(status: RunStatus, text: &str) -> Result<()> {
    let mut stdout = stdout();
    queue!(
        stdout,
        SetForegroundColor(status.as_crossterm_color()),
        Print(text),
        ResetColor,
        Print("\n")
    )?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> RunStatusMessage {
        serde_json::from_str(
            r#"{
                "elapsed_time": 3.5,
                "status": "active",
                "scripts": [
                    {"path": "a.json", "test_script_number": "A", "status": "passed", "tests": [
                        {"test_number": "A-1", "status": "passed", "instructions": []}
                    ]},
                    {"path": "b.json", "test_script_number": "B", "status": "active", "tests": [
                        {"test_number": "B-1", "status": "failed", "details": "bad telemetry", "instructions": []},
                        {"test_number": "B-2", "status": "active", "description": "Power on", "instructions": [
                            {"instruction": "StartCfs", "status": "passed", "data": null},
                            {"instruction": "CheckEvent", "status": "active", "data": null}
                        ]}
                    ]}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_format_tally() {
        let tally = snapshot().test_tally();
        assert_eq!(format_tally(&tally), "1 active, 1 passed, 1 failed");
        assert_eq!(format_tally(&StatusTally::new()), "none");
    }

    #[test]
    fn test_format_summary_names_active_step() {
        let summary = format_summary(&snapshot());
        assert_eq!(
            summary,
            "[    3.5s] active | scripts: 1 active, 1 passed | tests: 1 active, 1 passed, 1 failed | B-2 #2 CheckEvent"
        );
    }

    #[test]
    fn test_format_summary_marks_finished_runs() {
        let mut status = snapshot();
        status.status = RunStatus::Failed;
        assert!(format_summary(&status).ends_with("| run failed"));

        status.status = RunStatus::Passed;
        let summary = format_summary(&status);
        assert!(summary.ends_with("| run finished"));
        assert!(!summary.contains("CheckEvent"));
    }

    #[test]
    fn test_format_tree_numbers_rows_locally() {
        let rows: Vec<String> = format_tree(&snapshot()).into_iter().map(|(_, row)| row).collect();
        assert_eq!(
            rows,
            vec![
                "1. a.json [passed]",
                "  1.1 A-1 [passed]",
                "2. b.json [active]",
                "  2.1 B-1 [failed]: bad telemetry",
                "  2.2 B-2 Power on [active]",
                "      1. StartCfs [passed]",
                "      2. CheckEvent [active]",
            ]
        );
    }
}
