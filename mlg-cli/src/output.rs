use serde::Serialize;

use crate::app::GlobalOptions;

/// Print `data` as JSON (if `--json`) or call `display_fn` for human-readable output.
pub fn print_output<T: Serialize>(
    data: &T,
    opts: &GlobalOptions,
    display_fn: impl FnOnce(&T),
) -> anyhow::Result<()> {
    if opts.json {
        let json = serde_json::to_string_pretty(data)?;
        println!("{json}");
    } else {
        display_fn(data);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ErrorReport {
    error: String,
}

/// Print a failed command's diagnostic on stdout.
pub fn print_error(error: &anyhow::Error, opts: &GlobalOptions) {
    let report = ErrorReport {
        error: format!("{error:#}"),
    };

    let printed = print_output(&report, opts, |report| {
        println!("Error: {}", report.error);
    });
    if printed.is_err() {
        println!("Error: {}", report.error);
    }
}

/// Print a `key: value` line with the key padded to `width`.
pub fn field(key: &str, value: impl std::fmt::Display, width: usize) {
    println!("  {key:<width$}  {value}");
}
