use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// A sellable home-improvement service line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Roofing,
    Hvac,
    #[serde(alias = "windows", alias = "windows-doors", alias = "windows_and_doors")]
    WindowsDoors,
    Siding,
    Gutters,
    Solar,
    Insulation,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 7] = [
        Self::Roofing,
        Self::Hvac,
        Self::WindowsDoors,
        Self::Siding,
        Self::Gutters,
        Self::Solar,
        Self::Insulation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Roofing => "roofing",
            Self::Hvac => "hvac",
            Self::WindowsDoors => "windows_doors",
            Self::Siding => "siding",
            Self::Gutters => "gutters",
            Self::Solar => "solar",
            Self::Insulation => "insulation",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Roofing => "Roofing",
            Self::Hvac => "HVAC",
            Self::WindowsDoors => "Windows & Doors",
            Self::Siding => "Siding",
            Self::Gutters => "Gutters",
            Self::Solar => "Solar",
            Self::Insulation => "Insulation",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match key.as_str() {
            "roofing" | "roof" => Ok(Self::Roofing),
            "hvac" => Ok(Self::Hvac),
            "windows_doors" | "windows" | "windows_and_doors" | "windows_&_doors" => {
                Ok(Self::WindowsDoors)
            }
            "siding" => Ok(Self::Siding),
            "gutters" => Ok(Self::Gutters),
            "solar" => Ok(Self::Solar),
            "insulation" => Ok(Self::Insulation),
            _ => Err(DomainError::Validation(format!("unknown service `{value}`"))),
        }
    }
}
