//! Colored CLI output for control and adapter calls.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::rpc::{value, ValueError};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// How to render a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyFormat {
    /// UTF-8 text when valid, hex otherwise.
    #[default]
    Auto,
    Text,
    Hex,
    Bool,
    Int,
    Float,
}

/// Truncate a string to a maximum length, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize, raw_mode: bool) -> String {
    if raw_mode || s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{kept}...")
}

/// Lowercase hex, two digits per byte, space separated.
#[must_use]
pub fn hex(body: &[u8]) -> String {
    body.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render a response body for display.
///
/// # Errors
///
/// Returns a [`ValueError`] when a fixed-width format does not match the
/// body length.
pub fn render_body(body: &[u8], format: BodyFormat) -> Result<String, ValueError> {
    Ok(match format {
        BodyFormat::Auto => match std::str::from_utf8(body) {
            Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
            _ => hex(body),
        },
        BodyFormat::Text => String::from_utf8_lossy(body).into_owned(),
        BodyFormat::Hex => hex(body),
        BodyFormat::Bool => value::decode_bool(body)?.to_string(),
        BodyFormat::Int => value::decode_int(body)?.to_string(),
        BodyFormat::Float => value::decode_float(body)?.to_string(),
    })
}

/// Print the port returned by START or ENSURE.
pub fn print_port(command: &str, module: &str, port: u16) {
    println!(
        "{} {} {} -> port {}",
        timestamp().dimmed(),
        format!("[{command}]").blue().bold(),
        module.cyan(),
        port.green()
    );
    let _ = io::stdout().flush();
}

/// Print a successful STOP.
pub fn print_stopped(port: u16) {
    println!(
        "{} {} port {}",
        timestamp().dimmed(),
        "[STOP]".blue().bold(),
        port
    );
    let _ = io::stdout().flush();
}

/// Print an adapter response body.
pub fn print_response(action: &str, body: &[u8], format: BodyFormat, raw_mode: bool) {
    match render_body(body, format) {
        Ok(rendered) => println!(
            "{} {} {}",
            "[RESULT]".green().bold(),
            action.dimmed(),
            truncate(&rendered, 150, raw_mode)
        ),
        Err(e) => println!(
            "{} {} {} ({})",
            "[RESULT]".yellow().bold(),
            action.dimmed(),
            hex(body),
            e.to_string().dimmed()
        ),
    }
    let _ = io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string() {
        assert_eq!(truncate("hello", 10, false), "hello");
        assert_eq!(truncate("hello", 5, false), "hello");
    }

    #[test]
    fn test_truncate_long_string() {
        assert_eq!(truncate("hello world", 8, false), "hello...");
        assert_eq!(truncate("hello", 2, false), "...");
    }

    #[test]
    fn test_truncate_raw_mode_no_truncation() {
        let long_string = "a".repeat(200);
        assert_eq!(truncate(&long_string, 10, true), long_string);
    }

    #[test]
    fn test_render_fixed_width_values() {
        assert_eq!(render_body(&[1], BodyFormat::Bool).unwrap(), "true");
        assert_eq!(render_body(&(-7i32).to_be_bytes(), BodyFormat::Int).unwrap(), "-7");
        assert_eq!(render_body(&2.5f32.to_be_bytes(), BodyFormat::Float).unwrap(), "2.5");
        assert!(render_body(&[1, 2], BodyFormat::Float).is_err());
    }

    #[test]
    fn test_render_auto_falls_back_to_hex() {
        assert_eq!(render_body(b"53217", BodyFormat::Auto).unwrap(), "53217");
        assert_eq!(render_body(&[0x00, 0xff], BodyFormat::Auto).unwrap(), "00 ff");
        assert_eq!(render_body(b"", BodyFormat::Auto).unwrap(), "");
    }
}
