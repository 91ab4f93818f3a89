//! Well-known-text CRS parsing.
//!
//! NetCDF files written by the NWM carry their CRS as an ESRI "PE string"
//! (`esri_pe_string`), which is WKT1 followed by a `;`-separated tail of
//! ArcGIS precision settings. The tail is ignored.

use std::f64::consts::PI;

use crate::error::{ProjectionError, Result};
use crate::lambert::{Ellipsoid, LambertParams};

// ============================================================================
// Syntax tree
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum WktValue {
    Text(String),
    Number(f64),
    /// Unquoted enumeration value such as `EAST` in `AXIS["X",EAST]`.
    Word(String),
    Node(WktNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WktNode {
    pub keyword: String,
    pub args: Vec<WktValue>,
}

impl WktNode {
    /// Parse a single WKT node, ignoring an ESRI `;` tail.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parser = Parser {
            src: input.as_bytes(),
            pos: 0,
        };
        parser.skip_ws();
        let node = parser.node()?;
        parser.skip_ws();
        match parser.peek() {
            None | Some(b';') => Ok(node),
            Some(c) => Err(parser.error(format!("unexpected trailing '{}'", c as char))),
        }
    }

    /// First quoted argument, conventionally the object name.
    pub fn name(&self) -> Option<&str> {
        self.args.iter().find_map(|a| match a {
            WktValue::Text(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// Numeric argument by position among numeric arguments.
    pub fn number(&self, index: usize) -> Option<f64> {
        self.args
            .iter()
            .filter_map(|a| match a {
                WktValue::Number(v) => Some(*v),
                _ => None,
            })
            .nth(index)
    }

    pub fn children<'a, 'k>(&'a self, keyword: &'k str) -> impl Iterator<Item = &'a WktNode> + use<'a, 'k> {
        self.args.iter().filter_map(move |a| match a {
            WktValue::Node(n) if n.keyword.eq_ignore_ascii_case(keyword) => Some(n),
            _ => None,
        })
    }

    pub fn child(&self, keyword: &str) -> Option<&WktNode> {
        self.children(keyword).next()
    }

    fn is(&self, keyword: &str) -> bool {
        self.keyword.eq_ignore_ascii_case(keyword)
    }
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> ProjectionError {
        ProjectionError::Syntax {
            position: self.pos,
            message: message.into(),
        }
    }

    fn word(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn node(&mut self) -> Result<WktNode> {
        let keyword = self.word();
        if keyword.is_empty() {
            return Err(self.error("expected keyword"));
        }
        self.skip_ws();
        let close = match self.peek() {
            Some(b'[') => b']',
            Some(b'(') => b')',
            _ => return Err(self.error(format!("expected '[' after {}", keyword))),
        };
        self.pos += 1;

        let mut args = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(c) if c == close => {
                    self.pos += 1;
                    break;
                }
                Some(b',') if !args.is_empty() => {
                    self.pos += 1;
                    continue;
                }
                Some(_) => args.push(self.value()?),
                None => return Err(self.error(format!("unterminated {}", keyword))),
            }
        }

        Ok(WktNode { keyword, args })
    }

    fn value(&mut self) -> Result<WktValue> {
        match self.peek() {
            Some(b'"') => self.text().map(WktValue::Text),
            Some(c) if c == b'-' || c == b'+' || c == b'.' || c.is_ascii_digit() => {
                self.number().map(WktValue::Number)
            }
            Some(c) if c.is_ascii_alphabetic() => {
                let start = self.pos;
                let word = self.word();
                self.skip_ws();
                if matches!(self.peek(), Some(b'[') | Some(b'(')) {
                    self.pos = start;
                    self.node().map(WktValue::Node)
                } else {
                    Ok(WktValue::Word(word))
                }
            }
            _ => Err(self.error("expected value")),
        }
    }

    fn text(&mut self) -> Result<String> {
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                Some(b'"') if self.src.get(self.pos + 1) == Some(&b'"') => {
                    out.push(b'"');
                    self.pos += 2;
                }
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(String::from_utf8_lossy(&out).into_owned());
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn number(&mut self) -> Result<f64> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || matches!(c, b'-' | b'+' | b'.' | b'e' | b'E'))
        {
            self.pos += 1;
        }
        let raw = String::from_utf8_lossy(&self.src[start..self.pos]);
        raw.parse::<f64>()
            .map_err(|_| self.error(format!("invalid number '{}'", raw)))
    }
}

// ============================================================================
// CRS definitions
// ============================================================================

/// The subset of coordinate reference systems the pipeline can transform.
#[derive(Debug, Clone, PartialEq)]
pub enum CrsDefinition {
    /// Longitude/latitude in degrees.
    Geographic { ellipsoid: Ellipsoid },
    /// Lambert Conformal Conic; projected coordinates are in
    /// `linear_unit` metres per unit.
    LambertConformal {
        params: LambertParams,
        linear_unit: f64,
    },
}

impl CrsDefinition {
    /// Parse a CRS string: `EPSG:4326` or WKT1/ESRI WKT.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("EPSG:4326") || trimmed.eq_ignore_ascii_case("CRS:84") {
            return Ok(CrsDefinition::Geographic {
                ellipsoid: Ellipsoid::wgs84(),
            });
        }
        Self::from_node(&WktNode::parse(trimmed)?)
    }

    pub fn from_node(root: &WktNode) -> Result<Self> {
        if root.is("GEOGCS") {
            return Ok(CrsDefinition::Geographic {
                ellipsoid: ellipsoid(root)?,
            });
        }
        if !root.is("PROJCS") {
            return Err(ProjectionError::Unsupported(format!(
                "root keyword {}",
                root.keyword
            )));
        }

        let geogcs = root
            .child("GEOGCS")
            .ok_or_else(|| ProjectionError::MissingParameter("GEOGCS".to_string()))?;
        let ellipsoid = ellipsoid(geogcs)?;

        // Angular parameters are expressed in the GEOGCS angular unit.
        let angular_unit = geogcs
            .child("UNIT")
            .and_then(|u| u.number(0))
            .unwrap_or(PI / 180.0);
        let to_degrees = angular_unit / (PI / 180.0);
        let linear_unit = root.child("UNIT").and_then(|u| u.number(0)).unwrap_or(1.0);

        let method = root
            .child("PROJECTION")
            .and_then(|p| p.name())
            .ok_or_else(|| ProjectionError::MissingParameter("PROJECTION".to_string()))?;
        let method_key = method.to_ascii_lowercase().replace(' ', "_");

        let param = |name: &str| -> Option<f64> {
            root.children("PARAMETER")
                .find(|p| p.name().map(|n| n.eq_ignore_ascii_case(name)).unwrap_or(false))
                .and_then(|p| p.number(0))
        };
        let required = |name: &str| -> Result<f64> {
            param(name).ok_or_else(|| ProjectionError::MissingParameter(name.to_string()))
        };

        match method_key.as_str() {
            "lambert_conformal_conic" | "lambert_conformal_conic_2sp" | "lambert_conformal_conic_1sp" => {
                let latitude_of_origin = required("latitude_of_origin")? * to_degrees;
                let one_parallel = method_key.ends_with("_1sp");
                let sp1 = if one_parallel {
                    latitude_of_origin
                } else {
                    required("standard_parallel_1")? * to_degrees
                };
                let sp2 = match param("standard_parallel_2") {
                    Some(v) if !one_parallel => v * to_degrees,
                    _ => sp1,
                };

                let params = LambertParams {
                    standard_parallel_1: sp1,
                    standard_parallel_2: sp2,
                    latitude_of_origin,
                    central_meridian: required("central_meridian")? * to_degrees,
                    false_easting: param("false_easting").unwrap_or(0.0) * linear_unit,
                    false_northing: param("false_northing").unwrap_or(0.0) * linear_unit,
                    scale_factor: param("scale_factor").unwrap_or(1.0),
                    ellipsoid,
                };
                Ok(CrsDefinition::LambertConformal { params, linear_unit })
            }
            _ => Err(ProjectionError::Unsupported(method.to_string())),
        }
    }
}

fn ellipsoid(geogcs: &WktNode) -> Result<Ellipsoid> {
    let spheroid = geogcs
        .child("DATUM")
        .and_then(|d| d.child("SPHEROID").or_else(|| d.child("ELLIPSOID")))
        .ok_or_else(|| ProjectionError::MissingParameter("SPHEROID".to_string()))?;
    let semi_major = spheroid
        .number(0)
        .ok_or_else(|| ProjectionError::MissingParameter("semi-major axis".to_string()))?;
    Ok(Ellipsoid {
        semi_major,
        inverse_flattening: spheroid.number(1).unwrap_or(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nwm_pe_string() {
        let def = CrsDefinition::parse(crate::NWM_CONUS_PE_STRING).unwrap();
        match def {
            CrsDefinition::LambertConformal { params, linear_unit } => {
                assert_eq!(linear_unit, 1.0);
                assert!((params.standard_parallel_1 - 30.0).abs() < 1e-9);
                assert!((params.standard_parallel_2 - 60.0).abs() < 1e-9);
                assert!((params.central_meridian - -97.0).abs() < 1e-9);
                assert!((params.latitude_of_origin - 40.0).abs() < 1e-9);
                assert_eq!(params.ellipsoid.semi_major, 6_370_000.0);
                assert_eq!(params.ellipsoid.eccentricity(), 0.0);
            }
            other => panic!("unexpected definition {:?}", other),
        }
    }

    #[test]
    fn test_node_structure() {
        let node = WktNode::parse("AXIS[\"Easting\",EAST]").unwrap();
        assert_eq!(node.keyword, "AXIS");
        assert_eq!(node.name(), Some("Easting"));
        assert_eq!(node.args[1], WktValue::Word("EAST".to_string()));
    }

    #[test]
    fn test_escaped_quotes() {
        let node = WktNode::parse("GEOGCS[\"a \"\"b\"\"\",DATUM[\"d\",SPHEROID[\"s\",1,0]]]").unwrap();
        assert_eq!(node.name(), Some("a \"b\""));
    }

    #[test]
    fn test_geographic_root() {
        let wkt = "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563]],PRIMEM[\"Greenwich\",0],UNIT[\"degree\",0.0174532925199433]]";
        assert!(matches!(
            CrsDefinition::parse(wkt).unwrap(),
            CrsDefinition::Geographic { .. }
        ));
        assert!(matches!(
            CrsDefinition::parse("EPSG:4326").unwrap(),
            CrsDefinition::Geographic { .. }
        ));
    }

    #[test]
    fn test_unsupported_projection() {
        let wkt = "PROJCS[\"merc\",GEOGCS[\"g\",DATUM[\"d\",SPHEROID[\"s\",6378137,0]]],PROJECTION[\"Mercator\"]]";
        assert!(matches!(
            CrsDefinition::parse(wkt),
            Err(ProjectionError::Unsupported(_))
        ));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            WktNode::parse("PROJCS[\"x\",GEOGCS["),
            Err(ProjectionError::Syntax { .. })
        ));
        assert!(CrsDefinition::parse("").is_err());
    }

    #[test]
    fn test_feet_unit_scales_false_origin() {
        let wkt = "PROJCS[\"ft\",GEOGCS[\"g\",DATUM[\"d\",SPHEROID[\"s\",6378137,298.257222101]],UNIT[\"Degree\",0.0174532925199433]],PROJECTION[\"Lambert_Conformal_Conic_2SP\"],PARAMETER[\"standard_parallel_1\",33],PARAMETER[\"standard_parallel_2\",45],PARAMETER[\"latitude_of_origin\",23],PARAMETER[\"central_meridian\",-96],PARAMETER[\"false_easting\",1000],UNIT[\"Foot_US\",0.3048006096012192]]";
        match CrsDefinition::parse(wkt).unwrap() {
            CrsDefinition::LambertConformal { params, linear_unit } => {
                assert!((linear_unit - 0.3048006096012192).abs() < 1e-15);
                assert!((params.false_easting - 304.8006096012192).abs() < 1e-9);
            }
            other => panic!("unexpected definition {:?}", other),
        }
    }
}
