//! Sum every CSV cell strictly above a cutoff.
//!
//! Some quiz steps hand out a CSV of integers and ask for the total of the
//! values above a threshold. This does that in one pass so the result can be
//! pasted (or piped) into a submission.

use std::process::ExitCode;

/// Sum all integer cells strictly greater than `cutoff`.
///
/// Cells that do not parse as integers (headers, blanks) are skipped rather
/// than treated as errors; quiz CSVs are messy.
fn sum_above_cutoff(content: &str, cutoff: i64) -> i64 {
    content
        .lines()
        .flat_map(|line| line.split(','))
        .filter_map(|cell| cell.trim().parse::<i64>().ok())
        .filter(|&value| value > cutoff)
        .sum()
}

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let (path, cutoff) = match (args.next(), args.next()) {
        (Some(path), Some(raw)) => match raw.parse::<i64>() {
            Ok(cutoff) => (path, cutoff),
            Err(_) => {
                eprintln!("cutoff must be an integer, got {raw:?}");
                return ExitCode::FAILURE;
            }
        },
        _ => {
            eprintln!("usage: csv_sum <file.csv> <cutoff>");
            return ExitCode::FAILURE;
        }
    };

    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("cannot read {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("{}", sum_above_cutoff(&content, cutoff));
    ExitCode::SUCCESS
}
