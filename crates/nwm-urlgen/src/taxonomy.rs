//! Closed enumerations describing an NWM forecast product.
//!
//! Every enum carries a stable numeric code (matching the product catalog
//! numbering) and the lowercase name used inside resource paths.

use nwm_common::{ForecastError, ForecastResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Run type
// ============================================================================

/// NWM product category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    ShortRange,
    MediumRange,
    MediumRangeNoDa,
    LongRange,
    AnalysisAssim,
    AnalysisAssimExtend,
    AnalysisAssimExtendNoDa,
    AnalysisAssimLong,
    AnalysisAssimLongNoDa,
    AnalysisAssimNoDa,
    ShortRangeNoDa,
}

impl RunType {
    pub const ALL: [RunType; 11] = [
        RunType::ShortRange,
        RunType::MediumRange,
        RunType::MediumRangeNoDa,
        RunType::LongRange,
        RunType::AnalysisAssim,
        RunType::AnalysisAssimExtend,
        RunType::AnalysisAssimExtendNoDa,
        RunType::AnalysisAssimLong,
        RunType::AnalysisAssimLongNoDa,
        RunType::AnalysisAssimNoDa,
        RunType::ShortRangeNoDa,
    ];

    pub fn code(&self) -> u8 {
        match self {
            RunType::ShortRange => 1,
            RunType::MediumRange => 2,
            RunType::MediumRangeNoDa => 3,
            RunType::LongRange => 4,
            RunType::AnalysisAssim => 5,
            RunType::AnalysisAssimExtend => 6,
            RunType::AnalysisAssimExtendNoDa => 7,
            RunType::AnalysisAssimLong => 8,
            RunType::AnalysisAssimLongNoDa => 9,
            RunType::AnalysisAssimNoDa => 10,
            RunType::ShortRangeNoDa => 11,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RunType::ShortRange => "short_range",
            RunType::MediumRange => "medium_range",
            RunType::MediumRangeNoDa => "medium_range_no_da",
            RunType::LongRange => "long_range",
            RunType::AnalysisAssim => "analysis_assim",
            RunType::AnalysisAssimExtend => "analysis_assim_extend",
            RunType::AnalysisAssimExtendNoDa => "analysis_assim_extend_no_da",
            RunType::AnalysisAssimLong => "analysis_assim_long",
            RunType::AnalysisAssimLongNoDa => "analysis_assim_long_no_da",
            RunType::AnalysisAssimNoDa => "analysis_assim_no_da",
            RunType::ShortRangeNoDa => "short_range_no_da",
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.code() == code)
    }

    /// Analysis-assimilation runs name their files `tm{HH}` instead of `f{HHH}`.
    pub fn is_analysis_assim(&self) -> bool {
        matches!(
            self,
            RunType::AnalysisAssim
                | RunType::AnalysisAssimExtend
                | RunType::AnalysisAssimExtendNoDa
                | RunType::AnalysisAssimLong
                | RunType::AnalysisAssimLongNoDa
                | RunType::AnalysisAssimNoDa
        )
    }

    /// Runs without data assimilation only publish channel routing output.
    pub fn is_no_da(&self) -> bool {
        matches!(
            self,
            RunType::MediumRangeNoDa
                | RunType::AnalysisAssimExtendNoDa
                | RunType::AnalysisAssimLongNoDa
                | RunType::AnalysisAssimNoDa
                | RunType::ShortRangeNoDa
        )
    }

    /// File-name prefix for the lead time field.
    pub fn hour_prefix(&self) -> &'static str {
        if self.is_analysis_assim() {
            "tm"
        } else {
            "f"
        }
    }

    /// Render a lead time with the padding this run type uses.
    pub fn format_lead_time(&self, lead_time: u32) -> String {
        if self.is_analysis_assim() {
            format!("{}{:02}", self.hour_prefix(), lead_time)
        } else {
            format!("{}{:03}", self.hour_prefix(), lead_time)
        }
    }
}

// ============================================================================
// Variable
// ============================================================================

/// Output variable group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    ChannelRt,
    Land,
    Reservoir,
    TerrainRt,
    Forcing,
}

impl Variable {
    pub const ALL: [Variable; 5] = [
        Variable::ChannelRt,
        Variable::Land,
        Variable::Reservoir,
        Variable::TerrainRt,
        Variable::Forcing,
    ];

    pub fn code(&self) -> u8 {
        match self {
            Variable::ChannelRt => 1,
            Variable::Land => 2,
            Variable::Reservoir => 3,
            Variable::TerrainRt => 4,
            Variable::Forcing => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Variable::ChannelRt => "channel_rt",
            Variable::Land => "land",
            Variable::Reservoir => "reservoir",
            Variable::TerrainRt => "terrain_rt",
            Variable::Forcing => "forcing",
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.code() == code)
    }

    pub fn is_forcing(&self) -> bool {
        matches!(self, Variable::Forcing)
    }
}

// ============================================================================
// Geography
// ============================================================================

/// Model domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geography {
    Conus,
    Hawaii,
    PuertoRico,
}

impl Geography {
    pub const ALL: [Geography; 3] = [Geography::Conus, Geography::Hawaii, Geography::PuertoRico];

    pub fn code(&self) -> u8 {
        match self {
            Geography::Conus => 1,
            Geography::Hawaii => 2,
            Geography::PuertoRico => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Geography::Conus => "conus",
            Geography::Hawaii => "hawaii",
            Geography::PuertoRico => "puerto_rico",
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|g| g.code() == code)
    }
}

// ============================================================================
// Ensemble member
// ============================================================================

/// Medium-range ensemble member.
///
/// Serialized as `mem_1` .. `mem_7`, the same spelling [`EnsembleMember::name`]
/// produces and `FromStr` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnsembleMember {
    #[serde(rename = "mem_1")]
    Mem1,
    #[serde(rename = "mem_2")]
    Mem2,
    #[serde(rename = "mem_3")]
    Mem3,
    #[serde(rename = "mem_4")]
    Mem4,
    #[serde(rename = "mem_5")]
    Mem5,
    #[serde(rename = "mem_6")]
    Mem6,
    #[serde(rename = "mem_7")]
    Mem7,
}

impl EnsembleMember {
    pub const ALL: [EnsembleMember; 7] = [
        EnsembleMember::Mem1,
        EnsembleMember::Mem2,
        EnsembleMember::Mem3,
        EnsembleMember::Mem4,
        EnsembleMember::Mem5,
        EnsembleMember::Mem6,
        EnsembleMember::Mem7,
    ];

    /// Member number, 1 through 7.
    pub fn number(&self) -> u8 {
        match self {
            EnsembleMember::Mem1 => 1,
            EnsembleMember::Mem2 => 2,
            EnsembleMember::Mem3 => 3,
            EnsembleMember::Mem4 => 4,
            EnsembleMember::Mem5 => 5,
            EnsembleMember::Mem6 => 6,
            EnsembleMember::Mem7 => 7,
        }
    }

    pub fn code(&self) -> u8 {
        self.number()
    }

    pub fn name(&self) -> String {
        format!("mem_{}", self.number())
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.number() == code)
    }

    /// Suffix appended to the forecast folder (`_mem3`).
    pub fn folder_suffix(&self) -> String {
        format!("_mem{}", self.number())
    }

    /// Suffix appended to the variable name in the file (`_3`).
    pub fn variable_suffix(&self) -> String {
        format!("_{}", self.number())
    }
}

// ============================================================================
// Parsing
// ============================================================================

macro_rules! taxonomy_display_and_parse {
    ($ty:ident, $label:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.name())
            }
        }

        /// Accepts either the lowercase name or the numeric code.
        impl FromStr for $ty {
            type Err = ForecastError;

            fn from_str(s: &str) -> ForecastResult<Self> {
                let needle = s.trim().to_lowercase();
                if let Ok(code) = needle.parse::<u8>() {
                    return $ty::from_code(code).ok_or_else(|| {
                        ForecastError::invalid_configuration(format!(
                            "unknown {} code: {}",
                            $label, code
                        ))
                    });
                }
                $ty::ALL
                    .iter()
                    .copied()
                    .find(|v| v.name() == needle)
                    .ok_or_else(|| {
                        ForecastError::invalid_configuration(format!("unknown {}: {}", $label, s))
                    })
            }
        }
    };
}

taxonomy_display_and_parse!(RunType, "run type");
taxonomy_display_and_parse!(Variable, "variable");
taxonomy_display_and_parse!(Geography, "geography");
taxonomy_display_and_parse!(EnsembleMember, "ensemble member");

#[cfg(test)]
mod tests {
    use super::*;

    fn serialized_name<T: Serialize>(value: &T) -> String {
        match serde_json::to_value(value).unwrap() {
            serde_json::Value::String(s) => s,
            other => panic!("expected a string, got {}", other),
        }
    }

    #[test]
    fn test_serde_spelling_parses_back() {
        for member in EnsembleMember::ALL {
            let name = serialized_name(&member);
            assert_eq!(name, member.name());
            assert_eq!(name.parse::<EnsembleMember>().unwrap(), member);
            let back: EnsembleMember = serde_json::from_value(serde_json::json!(name)).unwrap();
            assert_eq!(back, member);
        }
        for run in RunType::ALL {
            assert_eq!(serialized_name(&run).parse::<RunType>().unwrap(), run);
        }
        for variable in Variable::ALL {
            assert_eq!(serialized_name(&variable).parse::<Variable>().unwrap(), variable);
        }
        for geography in Geography::ALL {
            assert_eq!(serialized_name(&geography).parse::<Geography>().unwrap(), geography);
        }
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(RunType::ShortRange.code(), 1);
        assert_eq!(RunType::ShortRangeNoDa.code(), 11);
        assert_eq!(Variable::Forcing.code(), 5);
        assert_eq!(Geography::PuertoRico.code(), 3);
        for run in RunType::ALL {
            assert_eq!(RunType::from_code(run.code()), Some(run));
        }
    }

    #[test]
    fn test_parse_names_and_codes() {
        assert_eq!("short_range".parse::<RunType>().unwrap(), RunType::ShortRange);
        assert_eq!("5".parse::<Variable>().unwrap(), Variable::Forcing);
        assert_eq!("Puerto_Rico".parse::<Geography>().unwrap(), Geography::PuertoRico);
        assert_eq!("mem_4".parse::<EnsembleMember>().unwrap(), EnsembleMember::Mem4);
        assert!("12".parse::<RunType>().is_err());
        assert!("drizzle".parse::<Variable>().is_err());
    }

    #[test]
    fn test_lead_time_formatting() {
        assert_eq!(RunType::ShortRange.format_lead_time(1), "f001");
        assert_eq!(RunType::LongRange.format_lead_time(720), "f720");
        assert_eq!(RunType::AnalysisAssim.format_lead_time(2), "tm02");
        assert_eq!(RunType::AnalysisAssimExtendNoDa.format_lead_time(27), "tm27");
    }

    #[test]
    fn test_no_da_family() {
        let no_da: Vec<_> = RunType::ALL.iter().filter(|r| r.is_no_da()).collect();
        assert_eq!(no_da.len(), 5);
        assert!(no_da.iter().all(|r| r.name().ends_with("_no_da")));
    }

    #[test]
    fn test_member_suffixes() {
        assert_eq!(EnsembleMember::Mem3.folder_suffix(), "_mem3");
        assert_eq!(EnsembleMember::Mem3.variable_suffix(), "_3");
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&RunType::AnalysisAssimLongNoDa).unwrap();
        assert_eq!(json, "\"analysis_assim_long_no_da\"");
    }
}
