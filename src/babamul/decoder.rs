//! Avro decoding of raw alert payloads into typed [`Alert`]s.
//!
//! Alerts are published as Avro object-container files with the schema
//! embedded, so decoding needs no registry lookup. Decoding is pure and
//! performs no I/O. Required fields must be present or decoding fails;
//! a partially populated alert is never handed downstream.
//!
//! The wire format encodes detection vs non-detection implicitly, by
//! whether a history entry carries a measurable flux. That distinction
//! is resolved here, once, into the tagged [`PhotometryPoint`] variants.

use std::collections::HashMap;

use apache_avro::types::Value;
use apache_avro::Reader;

use crate::babamul::alert::{
    flux_err_to_limit, flux_to_mag, Alert, AlertProperties, Band, Candidate, PhotometryPoint,
    Survey,
};

/// Error decoding a raw payload into an alert. Recoverable per message:
/// a consumer should skip the offending record and continue.
#[derive(Debug)]
pub enum DecodeError {
    /// Payload is not a readable Avro container
    Malformed(String),
    /// Payload holds no record at all
    EmptyPayload,
    /// A required field is absent or null
    MissingField(String),
    /// A field is present but holds an unexpected type or value
    WrongType {
        field: String,
        expected: &'static str,
    },
    /// Topic name does not identify a known survey
    UnknownSurvey(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Malformed(msg) => write!(f, "malformed Avro payload: {}", msg),
            DecodeError::EmptyPayload => write!(f, "payload contains no record"),
            DecodeError::MissingField(name) => write!(f, "required field '{}' is missing", name),
            DecodeError::WrongType { field, expected } => {
                write!(f, "field '{}' is not a {}", field, expected)
            }
            DecodeError::UnknownSurvey(topic) => {
                write!(f, "topic '{}' does not name a known survey", topic)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Stateless decoder for one survey's alerts. Safe to call from any
/// thread; holds nothing but the zero-point selection.
#[derive(Debug, Clone, Copy)]
pub struct AlertDecoder {
    survey: Survey,
}

impl AlertDecoder {
    pub fn new(survey: Survey) -> Self {
        Self { survey }
    }

    pub fn survey(&self) -> Survey {
        self.survey
    }

    /// Decode one raw payload into an [`Alert`].
    pub fn decode(&self, payload: &[u8]) -> Result<Alert, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }
        let mut reader =
            Reader::new(payload).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let value = match reader.next() {
            Some(Ok(value)) => value,
            Some(Err(e)) => return Err(DecodeError::Malformed(e.to_string())),
            None => return Err(DecodeError::EmptyPayload),
        };
        self.alert_from_value(value)
    }

    fn alert_from_value(&self, value: Value) -> Result<Alert, DecodeError> {
        let mut fields = record_fields(value, "alert")?;

        let object_id = take_string(&mut fields, "objectId")?;
        let candid = take_i64(&mut fields, "candid")?;

        let candidate_value = take(&mut fields, "candidate")
            .ok_or_else(|| DecodeError::MissingField("candidate".to_string()))?;
        let candidate = candidate_from_value(candidate_value, candid, &object_id)?;

        let zp = self.survey.zero_point();
        let prv_candidates =
            take_points(&mut fields, "prv_candidates", zp, point_from_alert_photometry)?;
        let prv_nondetections =
            take_points(&mut fields, "prv_nondetections", zp, point_from_non_detection)?;
        let fp_hists = take_points(&mut fields, "fp_hists", zp, point_from_forced_photometry)?;

        let properties = match take(&mut fields, "properties") {
            Some(value) => Some(properties_from_value(value)?),
            None => None,
        };

        Ok(Alert {
            survey: self.survey,
            topic: None,
            object_id,
            candid,
            candidate,
            prv_candidates,
            prv_nondetections,
            fp_hists,
            properties,
            cutout_science: opt_bytes(&mut fields, "cutoutScience")?,
            cutout_template: opt_bytes(&mut fields, "cutoutTemplate")?,
            cutout_difference: opt_bytes(&mut fields, "cutoutDifference")?,
        })
    }
}

fn candidate_from_value(
    value: Value,
    candid: i64,
    object_id: &str,
) -> Result<Candidate, DecodeError> {
    let mut fields = record_fields(value, "candidate")?;
    let jd = take_f64(&mut fields, "jd")?;
    let ra = take_f64(&mut fields, "ra")?;
    let dec = take_f64(&mut fields, "dec")?;
    let magpsf = take_f64(&mut fields, "magpsf")?;
    let sigmapsf = take_f64(&mut fields, "sigmapsf")?;
    // ZTF publishes a deep-learning real/bogus score, LSST a reliability score
    let drb = match opt_f64(&mut fields, "drb")? {
        Some(score) => Some(score),
        None => opt_f64(&mut fields, "reliability")?,
    };
    Ok(Candidate {
        candid,
        object_id: object_id.to_string(),
        jd,
        ra,
        dec,
        magpsf,
        sigmapsf,
        band: opt_band(&mut fields, "band")?,
        isdiffpos: opt_bool(&mut fields, "isdiffpos")?,
        snr: opt_f64(&mut fields, "snr")?,
        diffmaglim: opt_f64(&mut fields, "diffmaglim")?,
        drb,
    })
}

fn properties_from_value(value: Value) -> Result<AlertProperties, DecodeError> {
    let mut fields = record_fields(value, "properties")?;
    Ok(AlertProperties {
        rock: take_bool(&mut fields, "rock")?,
        stationary: take_bool(&mut fields, "stationary")?,
        star: opt_bool(&mut fields, "star")?,
        near_brightstar: opt_bool(&mut fields, "near_brightstar")?,
    })
}

/// Prior alert-pipeline photometry: a detection when the entry carries
/// a usable flux, an upper limit otherwise.
fn point_from_alert_photometry(
    mut fields: HashMap<String, Value>,
    zp: f64,
) -> Result<PhotometryPoint, DecodeError> {
    let jd = take_f64(&mut fields, "jd")?;
    let flux = opt_f64(&mut fields, "psfFlux")?;
    let flux_err = take_f64(&mut fields, "psfFluxErr")?;
    let band = opt_band(&mut fields, "band")?;
    let candid = opt_i64(&mut fields, "candid")?;
    match flux.and_then(|f| flux_to_mag(f.abs(), flux_err, zp)) {
        Some((mag, mag_err)) => Ok(PhotometryPoint::Detection {
            jd,
            band,
            mag,
            mag_err,
            candid,
        }),
        None => Ok(PhotometryPoint::NonDetection {
            jd,
            band,
            limiting_mag: flux_err_to_limit(flux_err, zp).unwrap_or(f64::INFINITY),
            candid,
        }),
    }
}

/// A published upper limit: only a flux error is available.
fn point_from_non_detection(
    mut fields: HashMap<String, Value>,
    zp: f64,
) -> Result<PhotometryPoint, DecodeError> {
    let jd = take_f64(&mut fields, "jd")?;
    let flux_err = take_f64(&mut fields, "psfFluxErr")?;
    Ok(PhotometryPoint::NonDetection {
        jd,
        band: opt_band(&mut fields, "band")?,
        limiting_mag: flux_err_to_limit(flux_err, zp).unwrap_or(f64::INFINITY),
        candid: opt_i64(&mut fields, "candid")?,
    })
}

/// Forced photometry: a detection only above 3 sigma, an upper limit
/// below.
fn point_from_forced_photometry(
    mut fields: HashMap<String, Value>,
    zp: f64,
) -> Result<PhotometryPoint, DecodeError> {
    let jd = take_f64(&mut fields, "jd")?;
    let flux = opt_f64(&mut fields, "psfFlux")?;
    let flux_err = take_f64(&mut fields, "psfFluxErr")?;
    let band = opt_band(&mut fields, "band")?;
    let candid = opt_i64(&mut fields, "candid")?;
    if let Some(f) = flux {
        if flux_err > 0.0 && f.abs() / flux_err >= 3.0 {
            if let Some((mag, mag_err)) = flux_to_mag(f.abs(), flux_err, zp) {
                return Ok(PhotometryPoint::Detection {
                    jd,
                    band,
                    mag,
                    mag_err,
                    candid,
                });
            }
        }
    }
    Ok(PhotometryPoint::NonDetection {
        jd,
        band,
        limiting_mag: flux_err_to_limit(flux_err, zp).unwrap_or(f64::INFINITY),
        candid,
    })
}

fn take_points(
    fields: &mut HashMap<String, Value>,
    name: &str,
    zp: f64,
    convert: fn(HashMap<String, Value>, f64) -> Result<PhotometryPoint, DecodeError>,
) -> Result<Vec<PhotometryPoint>, DecodeError> {
    let Some(value) = take(fields, name) else {
        return Ok(Vec::new());
    };
    let Value::Array(items) = value else {
        return Err(DecodeError::WrongType {
            field: name.to_string(),
            expected: "array",
        });
    };
    items
        .into_iter()
        .map(|item| record_fields(item, name).and_then(|entry| convert(entry, zp)))
        .collect()
}

/// Peel nullable-union wrappers down to the carried value.
fn unwrap_union(mut value: Value) -> Value {
    while let Value::Union(_, inner) = value {
        value = *inner;
    }
    value
}

fn record_fields(value: Value, ctx: &str) -> Result<HashMap<String, Value>, DecodeError> {
    match unwrap_union(value) {
        Value::Record(fields) => Ok(fields.into_iter().collect()),
        _ => Err(DecodeError::WrongType {
            field: ctx.to_string(),
            expected: "record",
        }),
    }
}

/// Remove a field, unwrap unions, and treat null as absent.
fn take(fields: &mut HashMap<String, Value>, name: &str) -> Option<Value> {
    fields
        .remove(name)
        .map(unwrap_union)
        .filter(|value| !matches!(value, Value::Null))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Double(v) => Some(*v),
        Value::Float(v) => Some(f64::from(*v)),
        Value::Long(v) => Some(*v as f64),
        Value::Int(v) => Some(f64::from(*v)),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Long(v) => Some(*v),
        Value::Int(v) => Some(i64::from(*v)),
        _ => None,
    }
}

fn take_f64(fields: &mut HashMap<String, Value>, name: &str) -> Result<f64, DecodeError> {
    let value = take(fields, name).ok_or_else(|| DecodeError::MissingField(name.to_string()))?;
    as_f64(&value).ok_or_else(|| DecodeError::WrongType {
        field: name.to_string(),
        expected: "double",
    })
}

fn opt_f64(fields: &mut HashMap<String, Value>, name: &str) -> Result<Option<f64>, DecodeError> {
    match take(fields, name) {
        None => Ok(None),
        Some(value) => as_f64(&value).map(Some).ok_or_else(|| DecodeError::WrongType {
            field: name.to_string(),
            expected: "double",
        }),
    }
}

fn take_i64(fields: &mut HashMap<String, Value>, name: &str) -> Result<i64, DecodeError> {
    let value = take(fields, name).ok_or_else(|| DecodeError::MissingField(name.to_string()))?;
    as_i64(&value).ok_or_else(|| DecodeError::WrongType {
        field: name.to_string(),
        expected: "long",
    })
}

fn opt_i64(fields: &mut HashMap<String, Value>, name: &str) -> Result<Option<i64>, DecodeError> {
    match take(fields, name) {
        None => Ok(None),
        Some(value) => as_i64(&value).map(Some).ok_or_else(|| DecodeError::WrongType {
            field: name.to_string(),
            expected: "long",
        }),
    }
}

fn take_string(fields: &mut HashMap<String, Value>, name: &str) -> Result<String, DecodeError> {
    let value = take(fields, name).ok_or_else(|| DecodeError::MissingField(name.to_string()))?;
    match value {
        Value::String(s) => Ok(s),
        _ => Err(DecodeError::WrongType {
            field: name.to_string(),
            expected: "string",
        }),
    }
}

fn take_bool(fields: &mut HashMap<String, Value>, name: &str) -> Result<bool, DecodeError> {
    let value = take(fields, name).ok_or_else(|| DecodeError::MissingField(name.to_string()))?;
    match value {
        Value::Boolean(b) => Ok(b),
        _ => Err(DecodeError::WrongType {
            field: name.to_string(),
            expected: "boolean",
        }),
    }
}

fn opt_bool(fields: &mut HashMap<String, Value>, name: &str) -> Result<Option<bool>, DecodeError> {
    match take(fields, name) {
        None => Ok(None),
        Some(Value::Boolean(b)) => Ok(Some(b)),
        Some(_) => Err(DecodeError::WrongType {
            field: name.to_string(),
            expected: "boolean",
        }),
    }
}

fn opt_band(fields: &mut HashMap<String, Value>, name: &str) -> Result<Option<Band>, DecodeError> {
    let text = match take(fields, name) {
        None => return Ok(None),
        Some(Value::String(s)) => s,
        Some(Value::Enum(_, s)) => s,
        Some(_) => {
            return Err(DecodeError::WrongType {
                field: name.to_string(),
                expected: "band symbol",
            })
        }
    };
    match Band::parse(&text) {
        Some(band) => Ok(Some(band)),
        None => Err(DecodeError::WrongType {
            field: name.to_string(),
            expected: "band symbol",
        }),
    }
}

fn opt_bytes(
    fields: &mut HashMap<String, Value>,
    name: &str,
) -> Result<Option<Vec<u8>>, DecodeError> {
    match take(fields, name) {
        None => Ok(None),
        Some(Value::Bytes(b)) => Ok(Some(b)),
        Some(Value::Fixed(_, b)) => Ok(Some(b)),
        Some(_) => Err(DecodeError::WrongType {
            field: name.to_string(),
            expected: "bytes",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload() {
        let decoder = AlertDecoder::new(Survey::Ztf);
        assert!(matches!(decoder.decode(&[]), Err(DecodeError::EmptyPayload)));
    }

    #[test]
    fn test_garbage_payload_is_malformed() {
        let decoder = AlertDecoder::new(Survey::Ztf);
        let err = decoder.decode(b"definitely not avro").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_unwrap_union_peels_nesting() {
        let value = Value::Union(1, Box::new(Value::Union(0, Box::new(Value::Double(1.5)))));
        assert_eq!(unwrap_union(value), Value::Double(1.5));
    }

    #[test]
    fn test_take_treats_null_as_absent() {
        let mut fields: HashMap<String, Value> = HashMap::new();
        fields.insert("a".to_string(), Value::Union(0, Box::new(Value::Null)));
        fields.insert("b".to_string(), Value::Long(7));
        assert!(take(&mut fields, "a").is_none());
        assert_eq!(take(&mut fields, "b"), Some(Value::Long(7)));
        assert!(take(&mut fields, "missing").is_none());
    }

    #[test]
    fn test_numeric_widening() {
        assert_eq!(as_f64(&Value::Float(2.5)), Some(2.5));
        assert_eq!(as_f64(&Value::Int(3)), Some(3.0));
        assert_eq!(as_i64(&Value::Int(3)), Some(3));
        assert_eq!(as_i64(&Value::Double(3.0)), None);
    }

    #[test]
    fn test_band_from_enum_or_string() {
        let mut fields: HashMap<String, Value> = HashMap::new();
        fields.insert("band".to_string(), Value::Enum(1, "g".to_string()));
        assert_eq!(opt_band(&mut fields, "band").unwrap(), Some(Band::G));

        fields.insert("band".to_string(), Value::String("r".to_string()));
        assert_eq!(opt_band(&mut fields, "band").unwrap(), Some(Band::R));

        fields.insert("band".to_string(), Value::String("q".to_string()));
        assert!(opt_band(&mut fields, "band").is_err());
    }

    #[test]
    fn test_forced_photometry_snr_threshold() {
        let zp = crate::babamul::alert::ZTF_ZP;
        let mut low: HashMap<String, Value> = HashMap::new();
        low.insert("jd".to_string(), Value::Double(2460000.0));
        low.insert("psfFlux".to_string(), Value::Double(100.0));
        low.insert("psfFluxErr".to_string(), Value::Double(50.0));
        low.insert("band".to_string(), Value::String("g".to_string()));
        let point = point_from_forced_photometry(low, zp).unwrap();
        assert!(!point.is_detection());

        let mut high: HashMap<String, Value> = HashMap::new();
        high.insert("jd".to_string(), Value::Double(2460000.0));
        high.insert("psfFlux".to_string(), Value::Double(1000.0));
        high.insert("psfFluxErr".to_string(), Value::Double(50.0));
        high.insert("band".to_string(), Value::String("g".to_string()));
        let point = point_from_forced_photometry(high, zp).unwrap();
        assert!(point.is_detection());
    }
}
