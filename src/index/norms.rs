//! Field length normalization.
//!
//! Every indexed field of every document gets one norm byte in
//! `<segment>.f<field number>`. The byte encodes `1 / sqrt(num_tokens)`
//! scaled to `0..=255`, so short fields weigh more than long ones.

/// Encode the normalization factor of a field with `num_tokens` tokens.
pub fn encode(num_tokens: usize) -> u8 {
    if num_tokens == 0 {
        return 0;
    }
    (255.0 / (num_tokens as f64).sqrt()).ceil().min(255.0) as u8
}

/// Decode a norm byte back into its factor in `0.0..=1.0`.
pub fn decode(norm: u8) -> f32 {
    norm as f32 / 255.0
}

/// File holding the norms of field `number` in `segment`.
pub fn norm_file(segment: &str, number: u32) -> String {
    format!("{segment}.f{number}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(encode(0), 0);
        assert_eq!(encode(1), 255);
        assert_eq!(encode(4), 128);
        assert_eq!(encode(100), 26);
        assert!(encode(1_000_000) >= 1);
    }

    #[test]
    fn test_decode_is_monotonic() {
        assert_eq!(decode(255), 1.0);
        assert_eq!(decode(0), 0.0);
        assert!(decode(encode(2)) > decode(encode(3)));
    }

    #[test]
    fn test_norm_file() {
        assert_eq!(norm_file("_a", 3), "_a.f3");
    }
}
