use crate::error::SimError;
use crate::fixed::{FastFixed, Fixed};
use crate::numeric::Num;
use crate::selector::NumType;
use crate::sim::{CheckpointConfig, Simulator};
use std::io::{BufRead, Write};

/// Type-erased engine handle, so the numeric slots can be chosen at
/// runtime from selector text.
pub trait Simulation: std::fmt::Debug {
    fn run(&mut self, steps: usize, checkpoint: Option<&CheckpointConfig>)
        -> Result<(), SimError>;
    fn save_state(&self, out: &mut dyn Write) -> Result<(), SimError>;
    fn load_state(&mut self, input: &mut dyn BufRead) -> Result<(), SimError>;
}

impl<P: Num, V: Num, VF: Num> Simulation for Simulator<P, V, VF> {
    fn run(
        &mut self,
        steps: usize,
        checkpoint: Option<&CheckpointConfig>,
    ) -> Result<(), SimError> {
        Simulator::run(self, steps, checkpoint)
    }

    fn save_state(&self, out: &mut dyn Write) -> Result<(), SimError> {
        Simulator::save_state(self, out)
    }

    fn load_state(&mut self, input: &mut dyn BufRead) -> Result<(), SimError> {
        Simulator::load_state(self, input)
    }
}

macro_rules! with_num_type {
    ($selector:expr, $ty:ident, $body:expr) => {
        match $selector {
            NumType::Float => {
                type $ty = f32;
                $body
            }
            NumType::Double => {
                type $ty = f64;
                $body
            }
            NumType::Fixed { bits: 32, frac: 16 } => {
                type $ty = Fixed<32, 16>;
                $body
            }
            NumType::Fixed { bits: 64, frac: 32 } => {
                type $ty = Fixed<64, 32>;
                $body
            }
            NumType::FastFixed { bits: 16, frac: 8 } => {
                type $ty = FastFixed<16, 8>;
                $body
            }
            NumType::FastFixed { bits: 32, frac: 16 } => {
                type $ty = FastFixed<32, 16>;
                $body
            }
            other => return Err(SimError::InvalidType(other.to_string())),
        }
    };
}

/// Builds an engine over the selected slot types. Selectors outside
/// the supported parametrizations fail with `InvalidType`.
pub fn build_simulator(
    lines: &[String],
    p_type: NumType,
    v_type: NumType,
    vf_type: NumType,
) -> Result<Box<dyn Simulation>, SimError> {
    with_num_type!(p_type, P, {
        with_num_type!(v_type, V, {
            with_num_type!(vf_type, VF, {
                Ok(Box::new(Simulator::<P, V, VF>::from_description(lines)?)
                    as Box<dyn Simulation>)
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc() -> Vec<String> {
        ["2 2", "0.1", "##", "# "]
            .iter()
            .map(|line| line.to_string())
            .collect()
    }

    #[test]
    fn builds_every_supported_selector() {
        for text in [
            "FLOAT",
            "DOUBLE",
            "FIXED(32,16)",
            "FIXED(64,32)",
            "FAST_FIXED(16,8)",
            "FAST_FIXED(32,16)",
        ] {
            let selector = NumType::parse(text).unwrap();
            assert!(build_simulator(&desc(), selector, selector, selector).is_ok());
        }
    }

    #[test]
    fn builds_mixed_slots() {
        let p = NumType::parse("DOUBLE").unwrap();
        let v = NumType::parse("FIXED(32,16)").unwrap();
        let vf = NumType::parse("FLOAT").unwrap();
        assert!(build_simulator(&desc(), p, v, vf).is_ok());
    }

    #[test]
    fn unsupported_parametrization_is_invalid_type() {
        let p = NumType::parse("FIXED(48,24)").unwrap();
        let ok = NumType::parse("DOUBLE").unwrap();
        let err = build_simulator(&desc(), p, ok, ok).unwrap_err();
        assert!(matches!(err, SimError::InvalidType(_)));
        let err = build_simulator(&desc(), ok, ok, p).unwrap_err();
        assert!(matches!(err, SimError::InvalidType(_)));
    }

    #[test]
    fn boxed_engine_saves_and_restores() {
        let p = NumType::parse("FIXED(32,16)").unwrap();
        let sim = build_simulator(&desc(), p, p, p).unwrap();
        let mut saved = Vec::new();
        sim.save_state(&mut saved).unwrap();
        let mut restored = build_simulator(&desc(), p, p, p).unwrap();
        restored.load_state(&mut saved.as_slice()).unwrap();
        let mut saved_again = Vec::new();
        restored.save_state(&mut saved_again).unwrap();
        assert_eq!(saved, saved_again);
    }
}
