//! Engine number formatting and vertex data hex codec
//!
//! Matrices and bounding boxes are written in C-style scientific notation
//! with a three-digit exponent (`-5.000000000e-001`). Vertex buffers are
//! big-endian `f32` rendered as space-separated upper-case hex bytes, sixteen
//! bytes per line.

const HEX_BYTES_PER_LINE: usize = 16;

/// Format a value the way the engine's exporter writes floats
pub fn format_sci(value: f64) -> String {
    let formatted = format!("{:.9e}", value);
    let Some((mantissa, exponent)) = formatted.split_once('e') else {
        return formatted;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:03}", exponent.abs())
}

/// Format a run of values as a text payload: leading newline, trailing space
pub fn format_sci_list(values: &[f64]) -> String {
    let body = values
        .iter()
        .map(|v| format_sci(*v))
        .collect::<Vec<_>>()
        .join(" ");
    format!("\n{body} ")
}

/// Column-major 4x4 identity in the layout nodes use for `TRANSFORM`
pub fn identity_transform() -> String {
    let row = |values: [f64; 8]| {
        values
            .iter()
            .map(|v| format_sci(*v))
            .collect::<Vec<_>>()
            .join(" ")
    };
    format!(
        "\n{} \n{} ",
        row([1.0, 0.0, -0.0, 0.0, 0.0, 1.0, -0.0, 0.0]),
        row([-0.0, -0.0, 1.0, -0.0, 0.0, 0.0, -0.0, 1.0])
    )
}

/// Parse a whitespace separated list of floats
pub fn parse_floats(text: &str) -> Result<Vec<f64>, std::num::ParseFloatError> {
    text.split_whitespace().map(str::parse::<f64>).collect()
}

pub fn encode_hex(bytes: &[u8]) -> String {
    let lines: Vec<String> = bytes
        .chunks(HEX_BYTES_PER_LINE)
        .map(|chunk| {
            chunk
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    format!("\n{} ", lines.join("\n"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexError(pub String);

impl std::fmt::Display for HexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid hex payload: {}", self.0)
    }
}

pub fn decode_hex(text: &str) -> Result<Vec<u8>, HexError> {
    let digits: Vec<u8> = text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(HexError(format!("odd digit count {}", digits.len())));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).map_err(|e| HexError(e.to_string()))?;
            u8::from_str_radix(pair, 16).map_err(|_| HexError(format!("bad byte {pair:?}")))
        })
        .collect()
}

pub fn write_f32_be(buffer: &mut [u8], offset: usize, value: f64) {
    buffer[offset..offset + 4].copy_from_slice(&(value as f32).to_be_bytes());
}

pub fn read_f32_be(buffer: &[u8], offset: usize) -> Option<f64> {
    let bytes: [u8; 4] = buffer.get(offset..offset + 4)?.try_into().ok()?;
    Some(f32::from_be_bytes(bytes) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sci_uses_three_digit_exponent() {
        assert_eq!(format_sci(1.0), "1.000000000e+000");
        assert_eq!(format_sci(-0.5), "-5.000000000e-001");
        assert_eq!(format_sci(0.0), "0.000000000e+000");
        assert_eq!(format_sci(-0.0), "-0.000000000e+000");
        assert_eq!(format_sci(1234.5), "1.234500000e+003");
    }

    #[test]
    fn test_identity_transform_layout() {
        let text = identity_transform();
        assert!(text.starts_with("\n1.000000000e+000 0.000000000e+000 -0.000000000e+000"));
        let values = parse_floats(&text).unwrap();
        assert_eq!(values.len(), 16);
        assert_eq!(values[0], 1.0);
        assert_eq!(values[5], 1.0);
        assert_eq!(values[10], 1.0);
        assert_eq!(values[15], 1.0);
    }

    #[test]
    fn test_hex_lines_hold_sixteen_bytes() {
        let bytes: Vec<u8> = (0..20).collect();
        let text = encode_hex(&bytes);
        let lines: Vec<&str> = text.trim().lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].split(' ').count(), 16);
        assert!(lines[1].starts_with("10 11 12 13"));
        assert_eq!(decode_hex(&text).unwrap(), bytes);
    }

    #[test]
    fn test_decode_rejects_odd_payload() {
        assert!(decode_hex("3F 8").is_err());
        assert!(decode_hex("ZZ").is_err());
    }

    #[test]
    fn test_f32_big_endian() {
        let mut buffer = vec![0u8; 8];
        write_f32_be(&mut buffer, 4, 1.0);
        assert_eq!(&buffer[4..], &[0x3F, 0x80, 0x00, 0x00]);
        assert_eq!(read_f32_be(&buffer, 4), Some(1.0));
        assert_eq!(read_f32_be(&buffer, 6), None);
    }
}
