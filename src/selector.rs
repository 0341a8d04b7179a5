use crate::error::SimError;
use std::fmt;

/// Textual numeric-type selector for one engine slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumType {
    Float,
    Double,
    Fixed { bits: u32, frac: u32 },
    FastFixed { bits: u32, frac: u32 },
}

impl NumType {
    pub fn parse(text: &str) -> Result<Self, SimError> {
        let text = text.trim();
        match text {
            "FLOAT" => return Ok(NumType::Float),
            "DOUBLE" => return Ok(NumType::Double),
            _ => {}
        }
        let invalid = || SimError::InvalidType(text.to_string());
        let (base, rest) = text.split_once('(').ok_or_else(invalid)?;
        let args = rest.strip_suffix(')').ok_or_else(invalid)?;
        let (bits, frac) = args.split_once(',').ok_or_else(invalid)?;
        let bits: u32 = bits.trim().parse().map_err(|_| invalid())?;
        let frac: u32 = frac.trim().parse().map_err(|_| invalid())?;
        if bits == 0 || frac == 0 || frac >= bits {
            return Err(invalid());
        }
        match base {
            "FIXED" => Ok(NumType::Fixed { bits, frac }),
            "FAST_FIXED" => Ok(NumType::FastFixed { bits, frac }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for NumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumType::Float => write!(f, "FLOAT"),
            NumType::Double => write!(f, "DOUBLE"),
            NumType::Fixed { bits, frac } => write!(f, "FIXED({bits},{frac})"),
            NumType::FastFixed { bits, frac } => write!(f, "FAST_FIXED({bits},{frac})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_native_selectors() {
        assert_eq!(NumType::parse("FLOAT").unwrap(), NumType::Float);
        assert_eq!(NumType::parse("DOUBLE").unwrap(), NumType::Double);
    }

    #[test]
    fn parses_fixed_selectors() {
        assert_eq!(
            NumType::parse("FIXED(32,16)").unwrap(),
            NumType::Fixed { bits: 32, frac: 16 }
        );
        assert_eq!(
            NumType::parse("FAST_FIXED(16, 8)").unwrap(),
            NumType::FastFixed { bits: 16, frac: 8 }
        );
    }

    #[test]
    fn rejects_unknown_selectors() {
        for bad in [
            "INT",
            "FIXED",
            "FIXED(32)",
            "FIXED(32,16",
            "FIXED(16,32)",
            "FIXED(16,16)",
            "FIXED(0,0)",
            "SLOW_FIXED(32,16)",
            "",
        ] {
            assert!(
                matches!(NumType::parse(bad), Err(SimError::InvalidType(_))),
                "expected InvalidType for {bad:?}"
            );
        }
    }

    #[test]
    fn display_renders_canonical_text() {
        for text in ["FLOAT", "DOUBLE", "FIXED(64,32)", "FAST_FIXED(32,16)"] {
            assert_eq!(NumType::parse(text).unwrap().to_string(), text);
        }
    }
}
