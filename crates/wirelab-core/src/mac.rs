//! MAC address generation under the lab OUI.

use rand::Rng;

use crate::error::{LabError, Result};

/// OUI stamped onto every auto-generated interface MAC.
pub const LAB_OUI: [u8; 3] = [0xaa, 0xc1, 0xab];

/// Generates a random MAC address under [`LAB_OUI`].
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    format(&[
        LAB_OUI[0],
        LAB_OUI[1],
        LAB_OUI[2],
        rng.gen(),
        rng.gen(),
        rng.gen(),
    ])
}

/// Formats raw MAC bytes as a colon-separated string.
pub fn format(bytes: &[u8; 6]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parses a colon-separated MAC string into raw bytes.
pub fn parse(s: &str) -> Result<[u8; 6]> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 {
        return Err(LabError::config(format!(
            "invalid MAC address {:?}",
            s
        )));
    }
    let mut bytes = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        bytes[i] = u8::from_str_radix(part, 16).map_err(|_| {
            LabError::config(format!("invalid MAC address {:?}", s))
        })?;
    }
    Ok(bytes)
}

/// Returns true if the MAC was generated under the lab OUI.
pub fn has_lab_oui(s: &str) -> bool {
    parse(s).map(|b| b[..3] == LAB_OUI).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uses_lab_oui() {
        let mac = generate();
        assert!(mac.starts_with("aa:c1:ab:"));
        assert!(has_lab_oui(&mac));
    }

    #[test]
    fn test_parse_roundtrip() {
        let bytes = parse("aa:c1:ab:00:01:02").unwrap();
        assert_eq!(bytes, [0xaa, 0xc1, 0xab, 0x00, 0x01, 0x02]);
        assert_eq!(format(&bytes), "aa:c1:ab:00:01:02");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse("aa:c1:ab:00:01").is_err());
        assert!(parse("aa:c1:ab:00:01:zz").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_distinct_macs() {
        // Two generated MACs colliding is possible but absurdly unlikely.
        assert_ne!(generate(), generate());
    }
}
