use std::io::Write;
use std::path::Path;

/// Write a rendered document to stdout or to `output_path`.
pub fn write_output(text: &str, output_path: Option<&str>) -> Result<(), String> {
    match output_path {
        Some(path) => {
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    format!("Failed to create directory '{}': {}", parent.display(), e)
                })?;
            }
            std::fs::write(path, text)
                .map_err(|e| format!("Failed to write output file '{}': {}", path, e))
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(text.as_bytes())
                .and_then(|_| handle.write_all(b"\n"))
                .map_err(|e| format!("Failed to write to stdout: {}", e))
        }
    }
}

/// Serialize to JSON; NaN and infinities become `null`.
pub fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<String, String> {
    let rendered = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    rendered.map_err(|e| format!("JSON serialization failed: {}", e))
}

/// Serialize and write in one step.
pub fn emit_json<T: serde::Serialize>(
    value: &T,
    compact: bool,
    output_path: Option<&str>,
) -> Result<(), String> {
    let json = to_json(value, compact)?;
    write_output(&json, output_path)
}

/// Progress line on stderr unless `quiet`.
pub fn progress(quiet: bool, message: impl AsRef<str>) {
    if !quiet {
        eprintln!("{}", message.as_ref());
    }
}
