use super::types::FacilityFrequency;
use crate::geo::GeoPoint;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use strum_macros::Display;

static DESIGNATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:RW)?0?([1-9]\d?)([LRCW])?$").unwrap());

/// Lateral qualifier of a runway designation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
pub enum RunwayDesignator {
    #[default]
    None,
    Left,
    Right,
    Center,
    Water,
}

impl RunwayDesignator {
    pub const fn letter(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Left => "L",
            Self::Right => "R",
            Self::Center => "C",
            Self::Water => "W",
        }
    }

    fn from_letter(letter: &str) -> Self {
        match letter {
            "L" => Self::Left,
            "R" => Self::Right,
            "C" => Self::Center,
            "W" => Self::Water,
            _ => Self::None,
        }
    }
}

/// Parses a runway designation such as `28L`, `RW04R` or `9`.
///
/// # Returns
/// The runway number and lateral designator, or `None` when the string is
/// not a designation.
pub fn parse_designation(designation: &str) -> Option<(u8, RunwayDesignator)> {
    let caps = DESIGNATION_RE.captures(designation.trim())?;
    let number = caps.get(1)?.as_str().parse::<u8>().ok()?;
    if number > 36 {
        return None;
    }
    let designator = caps
        .get(2)
        .map_or(RunwayDesignator::None, |m| RunwayDesignator::from_letter(m.as_str()));
    Some((number, designator))
}

/// A single landing direction of a physical runway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneWayRunway {
    /// Designation such as `28L`.
    pub designation: String,
    /// Threshold position.
    pub pos: GeoPoint,
    pub elevation_m: f64,
    /// Landing course in degrees true.
    pub course: f64,
    /// Localizer frequency when the runway carries one.
    pub ils_frequency: Option<FacilityFrequency>,
}

impl OneWayRunway {
    pub fn number(&self) -> u8 {
        parse_designation(&self.designation).map_or(0, |(number, _)| number)
    }

    pub fn designator(&self) -> RunwayDesignator {
        parse_designation(&self.designation).map_or(RunwayDesignator::None, |(_, d)| d)
    }

    /// Whether this runway is the one a procedure names.
    pub fn matches(&self, number: u8, designator: RunwayDesignator) -> bool {
        parse_designation(&self.designation)
            .is_some_and(|(own_number, own_designator)| {
                own_number == number && own_designator == designator
            })
    }
}
