//! Known hosts for NWM output.

use nwm_common::{ForecastError, ForecastResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix prepended to every generated resource path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlBase {
    /// Bare relative paths.
    Relative,
    NomadsProd,
    NomadsPostProcessed,
    GoogleStorage,
    GoogleCloudConsole,
    GsScheme,
    GcsScheme,
    AwsPds,
    /// CIROH mirror that also hosts the `.json` reference sidecars.
    CirohZarrCopy,
}

impl UrlBase {
    pub const ALL: [UrlBase; 9] = [
        UrlBase::Relative,
        UrlBase::NomadsProd,
        UrlBase::NomadsPostProcessed,
        UrlBase::GoogleStorage,
        UrlBase::GoogleCloudConsole,
        UrlBase::GsScheme,
        UrlBase::GcsScheme,
        UrlBase::AwsPds,
        UrlBase::CirohZarrCopy,
    ];

    /// Catalog index, 0 through 8.
    pub fn index(&self) -> u8 {
        match self {
            UrlBase::Relative => 0,
            UrlBase::NomadsProd => 1,
            UrlBase::NomadsPostProcessed => 2,
            UrlBase::GoogleStorage => 3,
            UrlBase::GoogleCloudConsole => 4,
            UrlBase::GsScheme => 5,
            UrlBase::GcsScheme => 6,
            UrlBase::AwsPds => 7,
            UrlBase::CirohZarrCopy => 8,
        }
    }

    pub fn from_index(index: u8) -> ForecastResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|b| b.index() == index)
            .ok_or_else(|| ForecastError::invalid_configuration(format!("unknown url base index: {}", index)))
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            UrlBase::Relative => "",
            UrlBase::NomadsProd => "https://nomads.ncep.noaa.gov/pub/data/nccf/com/nwm/prod/",
            UrlBase::NomadsPostProcessed => {
                "https://nomads.ncep.noaa.gov/pub/data/nccf/com/nwm/post-processed/WMS/"
            }
            UrlBase::GoogleStorage => "https://storage.googleapis.com/national-water-model/",
            UrlBase::GoogleCloudConsole => "https://storage.cloud.google.com/national-water-model/",
            UrlBase::GsScheme => "gs://national-water-model/",
            UrlBase::GcsScheme => "gcs://national-water-model/",
            UrlBase::AwsPds => "https://noaa-nwm-pds.s3.amazonaws.com/",
            UrlBase::CirohZarrCopy => "https://ciroh-nwm-zarr-copy.s3.amazonaws.com/national-water-model/",
        }
    }
}

impl Default for UrlBase {
    fn default() -> Self {
        UrlBase::CirohZarrCopy
    }
}

impl fmt::Display for UrlBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip() {
        for base in UrlBase::ALL {
            assert_eq!(UrlBase::from_index(base.index()).unwrap(), base);
        }
        assert!(UrlBase::from_index(9).is_err());
    }

    #[test]
    fn test_prefixes_end_with_slash() {
        for base in UrlBase::ALL.iter().skip(1) {
            assert!(base.prefix().ends_with('/'), "{:?}", base);
        }
        assert_eq!(UrlBase::Relative.prefix(), "");
    }

    #[test]
    fn test_default_is_sidecar_mirror() {
        assert_eq!(UrlBase::default().index(), 8);
    }
}
