//! Fixed-width big-endian value encoding for attribute reads, and the
//! textual argument parsing used by attribute writes.

/// Errors from decoding values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("Expected {expected} bytes, got {actual}")]
    Width { expected: usize, actual: usize },

    #[error("Invalid {ty} argument: {input:?}")]
    Parse { ty: &'static str, input: String },
}

#[must_use]
pub fn encode_bool(value: bool) -> Vec<u8> {
    vec![u8::from(value)]
}

#[must_use]
pub fn encode_int(value: i32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

#[must_use]
pub fn encode_float(value: f32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Decode a 1-byte boolean. Any non-zero byte is `true`.
///
/// # Errors
///
/// Returns [`ValueError::Width`] unless the body is exactly one byte.
pub fn decode_bool(body: &[u8]) -> Result<bool, ValueError> {
    match body {
        [b] => Ok(*b != 0),
        _ => Err(ValueError::Width {
            expected: 1,
            actual: body.len(),
        }),
    }
}

/// Decode a 4-byte big-endian `i32`.
///
/// # Errors
///
/// Returns [`ValueError::Width`] unless the body is exactly four bytes.
pub fn decode_int(body: &[u8]) -> Result<i32, ValueError> {
    Ok(i32::from_be_bytes(four_bytes(body)?))
}

/// Decode a 4-byte big-endian IEEE-754 `f32`.
///
/// # Errors
///
/// Returns [`ValueError::Width`] unless the body is exactly four bytes.
pub fn decode_float(body: &[u8]) -> Result<f32, ValueError> {
    Ok(f32::from_be_bytes(four_bytes(body)?))
}

fn four_bytes(body: &[u8]) -> Result<[u8; 4], ValueError> {
    body.try_into().map_err(|_| ValueError::Width {
        expected: 4,
        actual: body.len(),
    })
}

/// Parse a textual boolean argument: `1`/`0`, `true`/`false` (any case).
///
/// # Errors
///
/// Returns [`ValueError::Parse`] for anything else.
pub fn parse_bool(input: &str) -> Result<bool, ValueError> {
    let trimmed = input.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(n != 0);
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "true" | "on" => Ok(true),
        "false" | "off" => Ok(false),
        _ => Err(ValueError::Parse {
            ty: "bool",
            input: input.to_string(),
        }),
    }
}

/// Parse a textual integer argument.
///
/// # Errors
///
/// Returns [`ValueError::Parse`] if the text is not an `i32`.
pub fn parse_int(input: &str) -> Result<i32, ValueError> {
    input.trim().parse().map_err(|_| ValueError::Parse {
        ty: "int",
        input: input.to_string(),
    })
}

/// Parse a textual float argument.
///
/// # Errors
///
/// Returns [`ValueError::Parse`] if the text is not a float.
pub fn parse_float(input: &str) -> Result<f32, ValueError> {
    input.trim().parse().map_err(|_| ValueError::Parse {
        ty: "float",
        input: input.to_string(),
    })
}
