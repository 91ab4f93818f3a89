//! Literal dispatch tables for the forecast taxonomy.
//!
//! Two tables drive URL generation:
//!
//! - `FOLDER_RULES` maps (variable, run type, geography) to the product
//!   folder name. Anything without a rule uses the run type's own name.
//! - `DEFAULT_COMBINATIONS` lists every valid (run type, variable,
//!   geography, member) combination together with its default forecast
//!   cycles and lead times. A combination with no row is invalid.
//!
//! Rows are checked in order and the first match wins, so narrower rows
//! precede broader ones.

use crate::taxonomy::{EnsembleMember, Geography, RunType, Variable};

// ============================================================================
// Matchers
// ============================================================================

/// Which variables a row applies to.
#[derive(Debug, Clone, Copy)]
pub enum VarMatch {
    Forcing,
    NonForcing,
    Any,
    Only(&'static [Variable]),
}

impl VarMatch {
    pub fn matches(&self, variable: Variable) -> bool {
        match self {
            VarMatch::Forcing => variable.is_forcing(),
            VarMatch::NonForcing => !variable.is_forcing(),
            VarMatch::Any => true,
            VarMatch::Only(vars) => vars.contains(&variable),
        }
    }
}

/// Which geographies a row applies to.
#[derive(Debug, Clone, Copy)]
pub enum GeoMatch {
    Any,
    Only(&'static [Geography]),
}

impl GeoMatch {
    pub fn matches(&self, geography: Geography) -> bool {
        match self {
            GeoMatch::Any => true,
            GeoMatch::Only(geos) => geos.contains(&geography),
        }
    }
}

/// Which ensemble members a row applies to.
#[derive(Debug, Clone, Copy)]
pub enum MemberMatch {
    /// The row requires that no member is given.
    NoMember,
    Only(&'static [EnsembleMember]),
}

impl MemberMatch {
    pub fn matches(&self, member: Option<EnsembleMember>) -> bool {
        match (self, member) {
            (MemberMatch::NoMember, None) => true,
            (MemberMatch::Only(members), Some(m)) => members.contains(&m),
            _ => false,
        }
    }
}

/// A set of hours, either listed or as an inclusive stepped span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HourSet {
    List(&'static [u32]),
    Span { start: u32, end: u32, step: u32 },
}

impl HourSet {
    pub const fn span(start: u32, end: u32) -> Self {
        HourSet::Span { start, end, step: 1 }
    }

    pub const fn stepped(start: u32, end: u32, step: u32) -> Self {
        HourSet::Span { start, end, step }
    }

    pub fn expand(&self) -> Vec<u32> {
        match *self {
            HourSet::List(hours) => hours.to_vec(),
            HourSet::Span { start, end, step } => {
                (start..=end).step_by(step.max(1) as usize).collect()
            }
        }
    }

    /// Largest hour in the set.
    pub fn last(&self) -> Option<u32> {
        match *self {
            HourSet::List(hours) => hours.iter().copied().max(),
            HourSet::Span { start, end, step } if start <= end => {
                let step = step.max(1);
                Some(start + (end - start) / step * step)
            }
            HourSet::Span { .. } => None,
        }
    }

    pub fn contains(&self, hour: u32) -> bool {
        match *self {
            HourSet::List(hours) => hours.contains(&hour),
            HourSet::Span { start, end, step } => {
                hour >= start && hour <= end && (hour - start) % step.max(1) == 0
            }
        }
    }
}

// ============================================================================
// Folder table
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct FolderRule {
    pub variables: VarMatch,
    pub run: RunType,
    pub geographies: GeoMatch,
    pub folder: &'static str,
}

const HI: &[Geography] = &[Geography::Hawaii];
const PR: &[Geography] = &[Geography::PuertoRico];

pub static FOLDER_RULES: &[FolderRule] = &[
    // Forcing products
    FolderRule {
        variables: VarMatch::Forcing,
        run: RunType::AnalysisAssim,
        geographies: GeoMatch::Only(HI),
        folder: "forcing_analysis_assim_hawaii",
    },
    FolderRule {
        variables: VarMatch::Forcing,
        run: RunType::AnalysisAssim,
        geographies: GeoMatch::Only(PR),
        folder: "forcing_analysis_assim_puertorico",
    },
    FolderRule {
        variables: VarMatch::Forcing,
        run: RunType::ShortRange,
        geographies: GeoMatch::Only(HI),
        folder: "forcing_short_range_hawaii",
    },
    FolderRule {
        variables: VarMatch::Forcing,
        run: RunType::ShortRange,
        geographies: GeoMatch::Only(PR),
        folder: "forcing_short_range_puertorico",
    },
    FolderRule {
        variables: VarMatch::Forcing,
        run: RunType::AnalysisAssim,
        geographies: GeoMatch::Any,
        folder: "forcing_analysis_assim",
    },
    FolderRule {
        variables: VarMatch::Forcing,
        run: RunType::AnalysisAssimExtend,
        geographies: GeoMatch::Any,
        folder: "forcing_analysis_assim_extend",
    },
    FolderRule {
        variables: VarMatch::Forcing,
        run: RunType::MediumRange,
        geographies: GeoMatch::Any,
        folder: "forcing_medium_range",
    },
    FolderRule {
        variables: VarMatch::Forcing,
        run: RunType::ShortRange,
        geographies: GeoMatch::Any,
        folder: "forcing_short_range",
    },
    // Puerto Rico model output
    FolderRule {
        variables: VarMatch::NonForcing,
        run: RunType::AnalysisAssim,
        geographies: GeoMatch::Only(PR),
        folder: "analysis_assim_puertorico",
    },
    FolderRule {
        variables: VarMatch::NonForcing,
        run: RunType::AnalysisAssimNoDa,
        geographies: GeoMatch::Only(PR),
        folder: "analysis_assim_puertorico_no_da",
    },
    FolderRule {
        variables: VarMatch::NonForcing,
        run: RunType::ShortRange,
        geographies: GeoMatch::Only(PR),
        folder: "short_range_puertorico",
    },
    FolderRule {
        variables: VarMatch::NonForcing,
        run: RunType::ShortRangeNoDa,
        geographies: GeoMatch::Only(PR),
        folder: "short_range_puertorico_no_da",
    },
];

/// Folder name for a product.
pub fn folder_name(run: RunType, variable: Variable, geography: Geography) -> &'static str {
    FOLDER_RULES
        .iter()
        .find(|rule| {
            rule.run == run && rule.variables.matches(variable) && rule.geographies.matches(geography)
        })
        .map(|rule| rule.folder)
        .unwrap_or_else(|| run.name())
}

// ============================================================================
// Default combination table
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct DefaultEntry {
    pub run: RunType,
    pub variables: VarMatch,
    pub geographies: GeoMatch,
    pub members: MemberMatch,
    pub cycles: HourSet,
    pub lead_times: HourSet,
}

impl DefaultEntry {
    pub fn matches(
        &self,
        run: RunType,
        variable: Variable,
        geography: Geography,
        member: Option<EnsembleMember>,
    ) -> bool {
        self.run == run
            && self.variables.matches(variable)
            && self.geographies.matches(geography)
            && self.members.matches(member)
    }
}

const SYNOPTIC: HourSet = HourSet::List(&[0, 6, 12, 18]);
const CHANNEL: &[Variable] = &[Variable::ChannelRt];
const CHANNEL_RESERVOIR: &[Variable] = &[Variable::ChannelRt, Variable::Reservoir];
const LAND_TERRAIN: &[Variable] = &[Variable::Land, Variable::TerrainRt];
const FIRST_MEMBER: &[EnsembleMember] = &[EnsembleMember::Mem1];
const LATER_MEMBERS: &[EnsembleMember] = &[
    EnsembleMember::Mem2,
    EnsembleMember::Mem3,
    EnsembleMember::Mem4,
    EnsembleMember::Mem5,
    EnsembleMember::Mem6,
    EnsembleMember::Mem7,
];

pub static DEFAULT_COMBINATIONS: &[DefaultEntry] = &[
    // Short range
    DefaultEntry {
        run: RunType::ShortRange,
        variables: VarMatch::Forcing,
        geographies: GeoMatch::Only(HI),
        members: MemberMatch::NoMember,
        cycles: HourSet::List(&[0, 12]),
        lead_times: HourSet::span(1, 48),
    },
    DefaultEntry {
        run: RunType::ShortRange,
        variables: VarMatch::Forcing,
        geographies: GeoMatch::Only(PR),
        members: MemberMatch::NoMember,
        cycles: HourSet::List(&[6]),
        lead_times: HourSet::span(1, 47),
    },
    DefaultEntry {
        run: RunType::ShortRange,
        variables: VarMatch::Forcing,
        geographies: GeoMatch::Only(&[Geography::Conus]),
        members: MemberMatch::NoMember,
        cycles: HourSet::span(0, 23),
        lead_times: HourSet::span(1, 18),
    },
    DefaultEntry {
        run: RunType::ShortRange,
        variables: VarMatch::NonForcing,
        geographies: GeoMatch::Only(PR),
        members: MemberMatch::NoMember,
        cycles: HourSet::List(&[6, 18]),
        lead_times: HourSet::span(1, 47),
    },
    DefaultEntry {
        run: RunType::ShortRange,
        variables: VarMatch::NonForcing,
        geographies: GeoMatch::Only(&[Geography::Conus, Geography::Hawaii]),
        members: MemberMatch::NoMember,
        cycles: HourSet::span(0, 23),
        lead_times: HourSet::span(1, 18),
    },
    // Medium range
    DefaultEntry {
        run: RunType::MediumRange,
        variables: VarMatch::Forcing,
        geographies: GeoMatch::Any,
        members: MemberMatch::NoMember,
        cycles: SYNOPTIC,
        lead_times: HourSet::span(1, 240),
    },
    DefaultEntry {
        run: RunType::MediumRange,
        variables: VarMatch::Only(CHANNEL_RESERVOIR),
        geographies: GeoMatch::Any,
        members: MemberMatch::Only(FIRST_MEMBER),
        cycles: SYNOPTIC,
        lead_times: HourSet::span(1, 240),
    },
    DefaultEntry {
        run: RunType::MediumRange,
        variables: VarMatch::Only(LAND_TERRAIN),
        geographies: GeoMatch::Any,
        members: MemberMatch::Only(FIRST_MEMBER),
        cycles: SYNOPTIC,
        lead_times: HourSet::stepped(3, 240, 3),
    },
    DefaultEntry {
        run: RunType::MediumRange,
        variables: VarMatch::Only(CHANNEL_RESERVOIR),
        geographies: GeoMatch::Any,
        members: MemberMatch::Only(LATER_MEMBERS),
        cycles: SYNOPTIC,
        lead_times: HourSet::span(1, 204),
    },
    DefaultEntry {
        run: RunType::MediumRange,
        variables: VarMatch::Only(LAND_TERRAIN),
        geographies: GeoMatch::Any,
        members: MemberMatch::Only(LATER_MEMBERS),
        cycles: SYNOPTIC,
        lead_times: HourSet::stepped(3, 204, 3),
    },
    DefaultEntry {
        run: RunType::MediumRangeNoDa,
        variables: VarMatch::Only(CHANNEL),
        geographies: GeoMatch::Any,
        members: MemberMatch::NoMember,
        cycles: HourSet::List(&[0, 6, 12]),
        lead_times: HourSet::stepped(3, 237, 3),
    },
    // Long range
    DefaultEntry {
        run: RunType::LongRange,
        variables: VarMatch::Only(CHANNEL_RESERVOIR),
        geographies: GeoMatch::Any,
        members: MemberMatch::NoMember,
        cycles: SYNOPTIC,
        lead_times: HourSet::stepped(6, 720, 6),
    },
    DefaultEntry {
        run: RunType::LongRange,
        variables: VarMatch::Only(&[Variable::Land]),
        geographies: GeoMatch::Any,
        members: MemberMatch::NoMember,
        cycles: SYNOPTIC,
        lead_times: HourSet::stepped(24, 720, 24),
    },
    // Analysis and assimilation
    DefaultEntry {
        run: RunType::AnalysisAssim,
        variables: VarMatch::Forcing,
        geographies: GeoMatch::Only(HI),
        members: MemberMatch::NoMember,
        cycles: HourSet::span(0, 18),
        lead_times: HourSet::span(0, 2),
    },
    DefaultEntry {
        run: RunType::AnalysisAssim,
        variables: VarMatch::Forcing,
        geographies: GeoMatch::Any,
        members: MemberMatch::NoMember,
        cycles: HourSet::span(0, 19),
        lead_times: HourSet::span(0, 2),
    },
    DefaultEntry {
        run: RunType::AnalysisAssim,
        variables: VarMatch::NonForcing,
        geographies: GeoMatch::Any,
        members: MemberMatch::NoMember,
        cycles: HourSet::span(0, 23),
        lead_times: HourSet::span(0, 2),
    },
    DefaultEntry {
        run: RunType::AnalysisAssimExtend,
        variables: VarMatch::Any,
        geographies: GeoMatch::Any,
        members: MemberMatch::NoMember,
        cycles: HourSet::List(&[16]),
        lead_times: HourSet::span(0, 27),
    },
    DefaultEntry {
        run: RunType::AnalysisAssimExtendNoDa,
        variables: VarMatch::Only(CHANNEL),
        geographies: GeoMatch::Any,
        members: MemberMatch::NoMember,
        cycles: HourSet::List(&[16]),
        lead_times: HourSet::span(0, 27),
    },
    DefaultEntry {
        run: RunType::AnalysisAssimLong,
        variables: VarMatch::Any,
        geographies: GeoMatch::Any,
        members: MemberMatch::NoMember,
        cycles: SYNOPTIC,
        lead_times: HourSet::span(0, 11),
    },
    DefaultEntry {
        run: RunType::AnalysisAssimLongNoDa,
        variables: VarMatch::Only(CHANNEL),
        geographies: GeoMatch::Any,
        members: MemberMatch::NoMember,
        cycles: SYNOPTIC,
        lead_times: HourSet::span(0, 11),
    },
    DefaultEntry {
        run: RunType::AnalysisAssimNoDa,
        variables: VarMatch::Only(CHANNEL),
        geographies: GeoMatch::Any,
        members: MemberMatch::NoMember,
        cycles: HourSet::span(0, 20),
        lead_times: HourSet::span(0, 2),
    },
    DefaultEntry {
        run: RunType::ShortRangeNoDa,
        variables: VarMatch::Only(CHANNEL),
        geographies: GeoMatch::Only(PR),
        members: MemberMatch::NoMember,
        cycles: HourSet::List(&[6, 18]),
        lead_times: HourSet::span(1, 48),
    },
];

/// Look up the default entry for a product combination.
pub fn default_entry(
    run: RunType,
    variable: Variable,
    geography: Geography,
    member: Option<EnsembleMember>,
) -> Option<&'static DefaultEntry> {
    DEFAULT_COMBINATIONS
        .iter()
        .find(|entry| entry.matches(run, variable, geography, member))
}
