use crate::error::TrainingError;
use rand::Rng;
use serde::Serialize;
use std::fmt;

/// Shortest combination the generator will produce.
pub const MIN_SEQUENCE_LENGTH: usize = 1;
/// Longest combination the generator will produce.
pub const MAX_SEQUENCE_LENGTH: usize = 20;

/// One of the six strikes a trainee can be asked to throw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum PunchCode {
    Jab = 1,
    Cross = 2,
    LeftHook = 3,
    RightHook = 4,
    LeftUppercut = 5,
    RightUppercut = 6,
}

impl PunchCode {
    pub const ALL: [PunchCode; 6] = [
        PunchCode::Jab,
        PunchCode::Cross,
        PunchCode::LeftHook,
        PunchCode::RightHook,
        PunchCode::LeftUppercut,
        PunchCode::RightUppercut,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            PunchCode::Jab => "Jab",
            PunchCode::Cross => "Cross",
            PunchCode::LeftHook => "Left Hook",
            PunchCode::RightHook => "Right Hook",
            PunchCode::LeftUppercut => "Left Uppercut",
            PunchCode::RightUppercut => "Right Uppercut",
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }

    /// Parses a single digit of the compact sequence form.
    pub fn from_digit(c: char) -> Option<Self> {
        c.to_digit(10).and_then(|d| Self::from_code(d as u8))
    }
}

impl fmt::Display for PunchCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.name())
    }
}

/// An ordered training combination. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence(Vec<PunchCode>);

impl Sequence {
    /// Draws `length` punches independently and uniformly.
    ///
    /// Fails without producing anything when `length` is outside
    /// `MIN_SEQUENCE_LENGTH..=MAX_SEQUENCE_LENGTH`.
    pub fn generate<R: Rng + ?Sized>(length: i64, rng: &mut R) -> Result<Self, TrainingError> {
        let length = validate_length(length)?;
        let punches = (0..length)
            .map(|_| PunchCode::ALL[rng.gen_range(0..PunchCode::ALL.len())])
            .collect();
        Ok(Self(punches))
    }

    /// Parses the compact digit form, e.g. `"135"`.
    ///
    /// Subject to the same length bounds as [`Sequence::generate`].
    pub fn parse(digits: &str) -> Result<Self, TrainingError> {
        validate_length(digits.chars().count() as i64)?;
        let punches = digits
            .chars()
            .map(|c| {
                PunchCode::from_digit(c).ok_or_else(|| {
                    TrainingError::invalid(format!("'{c}' is not a valid punch code"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(punches))
    }

    pub fn punches(&self) -> &[PunchCode] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compact digit string, e.g. `"13"`.
    pub fn digits(&self) -> String {
        self.0.iter().map(|p| char::from(b'0' + p.code())).collect()
    }

    /// Human readable form, e.g. `"1 (Jab) → 3 (Left Hook)"`.
    pub fn description(&self) -> String {
        self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" → ")
    }
}

fn validate_length(length: i64) -> Result<usize, TrainingError> {
    let range = MIN_SEQUENCE_LENGTH as i64..=MAX_SEQUENCE_LENGTH as i64;
    if !range.contains(&length) {
        return Err(TrainingError::invalid(format!(
            "Sequence length must be between {MIN_SEQUENCE_LENGTH} and {MAX_SEQUENCE_LENGTH}"
        )));
    }
    Ok(length as usize)
}
