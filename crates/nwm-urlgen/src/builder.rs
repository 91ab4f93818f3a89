//! Deterministic construction of forecast resource identifiers.
//!
//! A [`ForecastRequest`] is validated against the default combination
//! table when it is built. Afterwards every operation is infallible:
//! the file list is the cross product dates × cycles × lead times in
//! that nesting order.

use chrono::{NaiveDate, Utc};
use nwm_common::{days_between, folder_date, parse_forecast_date, ForecastError, ForecastResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::tables::{default_entry, folder_name, DefaultEntry};
use crate::taxonomy::{EnsembleMember, Geography, RunType, Variable};
use crate::url_base::UrlBase;

/// Suffix of the reference sidecar published next to each NetCDF file.
pub const JSON_SUFFIX: &str = ".json";

/// Fully rendered URL (or path) of one forecast file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceIdentifier(String);

impl ResourceIdentifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The identifier of the reference sidecar for this file.
    pub fn with_json_suffix(&self) -> Self {
        if self.0.ends_with(JSON_SUFFIX) {
            self.clone()
        } else {
            Self(format!("{}{}", self.0, JSON_SUFFIX))
        }
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Append the sidecar suffix to every identifier.
pub fn append_json(ids: &[ResourceIdentifier]) -> Vec<ResourceIdentifier> {
    ids.iter().map(ResourceIdentifier::with_json_suffix).collect()
}

/// Validated product selection plus the dates, cycles and lead times to expand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastRequest {
    run: RunType,
    variable: Variable,
    geography: Geography,
    member: Option<EnsembleMember>,
    dates: Vec<NaiveDate>,
    cycles: Vec<u32>,
    lead_times: Vec<u32>,
    url_base: UrlBase,
    append_json: bool,
}

impl ForecastRequest {
    pub fn builder(run: RunType, variable: Variable, geography: Geography) -> ForecastRequestBuilder {
        ForecastRequestBuilder::new(run, variable, geography)
    }

    pub fn run(&self) -> RunType {
        self.run
    }

    pub fn variable(&self) -> Variable {
        self.variable
    }

    pub fn geography(&self) -> Geography {
        self.geography
    }

    pub fn member(&self) -> Option<EnsembleMember> {
        self.member
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn cycles(&self) -> &[u32] {
        &self.cycles
    }

    pub fn lead_times(&self) -> &[u32] {
        &self.lead_times
    }

    pub fn url_base(&self) -> UrlBase {
        self.url_base
    }

    /// Number of identifiers `create_file_list` will produce.
    pub fn len(&self) -> usize {
        self.dates.len() * self.cycles.len() * self.lead_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the identifier for one (date, cycle, lead time).
    pub fn identifier(&self, date: NaiveDate, cycle: u32, lead_time: u32) -> ResourceIdentifier {
        let folder = folder_name(self.run, self.variable, self.geography);
        let (member_folder, member_var) = match self.member {
            Some(m) => (m.folder_suffix(), m.variable_suffix()),
            None => (String::new(), String::new()),
        };

        let url = format!(
            "{base}nwm.{date}/{folder}{member_folder}/nwm.t{cycle:02}z.{run}.{var}{member_var}.{lead}.{geo}.nc",
            base = self.url_base.prefix(),
            date = folder_date(date),
            folder = folder,
            member_folder = member_folder,
            cycle = cycle,
            run = self.run.name(),
            var = self.variable.name(),
            member_var = member_var,
            lead = self.run.format_lead_time(lead_time),
            geo = self.geography.name(),
        );

        let id = ResourceIdentifier(url);
        if self.append_json {
            id.with_json_suffix()
        } else {
            id
        }
    }

    /// Expand the request into identifiers, date-major then cycle then lead time.
    pub fn create_file_list(&self) -> Vec<ResourceIdentifier> {
        let mut ids = Vec::with_capacity(self.len());
        for &date in &self.dates {
            for &cycle in &self.cycles {
                for &lead_time in &self.lead_times {
                    ids.push(self.identifier(date, cycle, lead_time));
                }
            }
        }
        debug!(
            run = %self.run,
            variable = %self.variable,
            geography = %self.geography,
            count = ids.len(),
            "Generated forecast file list"
        );
        ids
    }
}

/// Builder for [`ForecastRequest`].
#[derive(Debug, Clone)]
pub struct ForecastRequestBuilder {
    run: RunType,
    variable: Variable,
    geography: Geography,
    member: Option<EnsembleMember>,
    dates: Option<Vec<NaiveDate>>,
    cycles: Option<Vec<u32>>,
    lead_times: Option<Vec<u32>>,
    url_base: UrlBase,
    append_json: bool,
}

impl ForecastRequestBuilder {
    pub fn new(run: RunType, variable: Variable, geography: Geography) -> Self {
        Self {
            run,
            variable,
            geography,
            member: None,
            dates: None,
            cycles: None,
            lead_times: None,
            url_base: UrlBase::default(),
            append_json: false,
        }
    }

    pub fn member(mut self, member: Option<EnsembleMember>) -> Self {
        self.member = member;
        self
    }

    pub fn date(mut self, date: NaiveDate) -> Self {
        self.dates = Some(vec![date]);
        self
    }

    pub fn dates(mut self, dates: Vec<NaiveDate>) -> Self {
        self.dates = Some(dates);
        self
    }

    /// Inclusive daily range from compact date strings.
    pub fn date_range(mut self, start: &str, end: Option<&str>) -> ForecastResult<Self> {
        let first = parse_forecast_date(start)?;
        let last = match end {
            Some(end) => parse_forecast_date(end)?,
            None => first,
        };
        self.dates = Some(days_between(first, last)?);
        Ok(self)
    }

    pub fn cycles(mut self, cycles: Vec<u32>) -> Self {
        self.cycles = Some(cycles);
        self
    }

    pub fn lead_times(mut self, lead_times: Vec<u32>) -> Self {
        self.lead_times = Some(lead_times);
        self
    }

    pub fn url_base(mut self, url_base: UrlBase) -> Self {
        self.url_base = url_base;
        self
    }

    pub fn append_json(mut self, append_json: bool) -> Self {
        self.append_json = append_json;
        self
    }

    /// Validate the combination and resolve defaults.
    pub fn build(self) -> ForecastResult<ForecastRequest> {
        let entry = validate_combination(self.run, self.variable, self.geography, self.member)?;

        let cycles = match self.cycles {
            Some(cycles) if cycles.is_empty() => {
                return Err(ForecastError::invalid_configuration(
                    "explicit forecast cycle list is empty",
                ))
            }
            Some(cycles) => cycles,
            None => entry.cycles.expand(),
        };
        if let Some(bad) = cycles.iter().find(|&&c| c > 23) {
            return Err(ForecastError::invalid_configuration(format!(
                "forecast cycle {} is not a UTC hour",
                bad
            )));
        }

        let lead_times = match self.lead_times {
            Some(leads) if leads.is_empty() => {
                return Err(ForecastError::invalid_configuration(
                    "explicit lead time list is empty",
                ))
            }
            Some(leads) => leads,
            None => entry.lead_times.expand(),
        };

        let dates = match self.dates {
            Some(dates) if dates.is_empty() => {
                return Err(ForecastError::InvalidDate("date list is empty".to_string()))
            }
            Some(dates) => dates,
            None => vec![Utc::now().date_naive()],
        };

        Ok(ForecastRequest {
            run: self.run,
            variable: self.variable,
            geography: self.geography,
            member: self.member,
            dates,
            cycles,
            lead_times,
            url_base: self.url_base,
            append_json: self.append_json,
        })
    }
}

/// Check a product combination against the taxonomy.
pub fn validate_combination(
    run: RunType,
    variable: Variable,
    geography: Geography,
    member: Option<EnsembleMember>,
) -> ForecastResult<&'static DefaultEntry> {
    if run.is_no_da() && variable != Variable::ChannelRt {
        return Err(ForecastError::invalid_configuration(format!(
            "{} only publishes channel_rt output, not {}",
            run, variable
        )));
    }

    let supports_members = run == RunType::MediumRange && !variable.is_forcing();
    if let Some(m) = member {
        if !supports_members {
            return Err(ForecastError::invalid_configuration(format!(
                "ensemble member {} is only valid for medium_range model output, not {} {}",
                m.number(),
                run,
                variable
            )));
        }
    } else if supports_members {
        return Err(ForecastError::invalid_configuration(format!(
            "medium_range {} requires an ensemble member",
            variable
        )));
    }

    default_entry(run, variable, geography, member).ok_or_else(|| {
        ForecastError::invalid_configuration(format!(
            "no {} {} product for {}{}",
            run,
            variable,
            geography,
            member.map(|m| format!(" member {}", m.number())).unwrap_or_default()
        ))
    })
}

/// Build exactly one identifier.
#[allow(clippy::too_many_arguments)]
pub fn single_identifier(
    run: RunType,
    variable: Variable,
    geography: Geography,
    member: Option<EnsembleMember>,
    date: NaiveDate,
    cycle: u32,
    lead_time: u32,
    url_base: UrlBase,
) -> ForecastResult<ResourceIdentifier> {
    let request = ForecastRequest::builder(run, variable, geography)
        .member(member)
        .date(date)
        .cycles(vec![cycle])
        .lead_times(vec![lead_time])
        .url_base(url_base)
        .build()?;
    Ok(request.identifier(date, cycle, lead_time))
}

/// First file of the default list for a product on the CIROH mirror.
pub fn default_file(
    run: RunType,
    variable: Variable,
    geography: Geography,
    member: Option<EnsembleMember>,
    date: Option<NaiveDate>,
) -> ForecastResult<ResourceIdentifier> {
    let mut builder = ForecastRequest::builder(run, variable, geography)
        .member(member)
        .url_base(UrlBase::CirohZarrCopy);
    if let Some(date) = date {
        builder = builder.date(date);
    }
    builder
        .build()?
        .create_file_list()
        .into_iter()
        .next()
        .ok_or_else(|| ForecastError::invalid_configuration("default file list is empty"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_short_range_forcing_identifier() {
        let req = ForecastRequest::builder(RunType::ShortRange, Variable::Forcing, Geography::Conus)
            .date(day())
            .cycles(vec![0])
            .lead_times(vec![1])
            .url_base(UrlBase::Relative)
            .build()
            .unwrap();
        let ids = req.create_file_list();
        assert_eq!(ids.len(), 1);
        assert_eq!(
            ids[0].as_str(),
            "nwm.20240601/forcing_short_range/nwm.t00z.short_range.forcing.f001.conus.nc"
        );
    }

    #[test]
    fn test_analysis_assim_identifier() {
        let req = ForecastRequest::builder(RunType::AnalysisAssim, Variable::Forcing, Geography::Hawaii)
            .date(day())
            .cycles(vec![7])
            .lead_times(vec![2])
            .url_base(UrlBase::Relative)
            .build()
            .unwrap();
        assert_eq!(
            req.create_file_list()[0].as_str(),
            "nwm.20240601/forcing_analysis_assim_hawaii/nwm.t07z.analysis_assim.forcing.tm02.hawaii.nc"
        );
    }

    #[test]
    fn test_member_identifier() {
        let req = ForecastRequest::builder(RunType::MediumRange, Variable::ChannelRt, Geography::Conus)
            .member(Some(EnsembleMember::Mem3))
            .date(day())
            .cycles(vec![6])
            .lead_times(vec![12])
            .url_base(UrlBase::Relative)
            .build()
            .unwrap();
        assert_eq!(
            req.create_file_list()[0].as_str(),
            "nwm.20240601/medium_range_mem3/nwm.t06z.medium_range.channel_rt_3.f012.conus.nc"
        );
    }

    #[test]
    fn test_json_suffix_is_idempotent() {
        let id = ResourceIdentifier::new("a.nc");
        assert_eq!(id.with_json_suffix().as_str(), "a.nc.json");
        assert_eq!(id.with_json_suffix().with_json_suffix().as_str(), "a.nc.json");
    }

    #[test]
    fn test_no_da_message_names_channel_rt() {
        let err = validate_combination(RunType::MediumRangeNoDa, Variable::Land, Geography::Conus, None)
            .unwrap_err();
        assert!(err.to_string().contains("channel_rt"));
    }

    #[test]
    fn test_member_rules() {
        assert!(validate_combination(
            RunType::ShortRange,
            Variable::ChannelRt,
            Geography::Conus,
            Some(EnsembleMember::Mem1)
        )
        .is_err());
        assert!(validate_combination(RunType::MediumRange, Variable::Land, Geography::Conus, None).is_err());
        assert!(validate_combination(RunType::MediumRange, Variable::Forcing, Geography::Conus, None).is_ok());
    }

    #[test]
    fn test_cycle_out_of_range() {
        let err = ForecastRequest::builder(RunType::ShortRange, Variable::Forcing, Geography::Conus)
            .cycles(vec![24])
            .build()
            .unwrap_err();
        assert!(matches!(err, ForecastError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_default_file_uses_mirror() {
        let id = default_file(
            RunType::ShortRange,
            Variable::Forcing,
            Geography::Conus,
            None,
            Some(day()),
        )
        .unwrap();
        assert!(id.as_str().starts_with(UrlBase::CirohZarrCopy.prefix()));
        assert!(id.as_str().ends_with("nwm.t00z.short_range.forcing.f001.conus.nc"));
    }
}
