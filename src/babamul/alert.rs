//! Typed alert models shared by the decoder and the light-curve layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// AB zero point for ZTF difference fluxes.
pub const ZTF_ZP: f64 = 23.9;
/// AB zero point for LSST difference fluxes.
pub const LSST_ZP: f64 = 8.9;

/// Survey a topic's alerts originate from. The survey-origin segment of
/// the topic name selects the photometric zero point used when fluxes
/// are converted to magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Survey {
    Ztf,
    Lsst,
}

impl Survey {
    /// Recover the survey from a topic name following the
    /// `<namespace>.<survey-origin>.<cross-match>.<class>` convention.
    pub fn from_topic(topic: &str) -> Option<Survey> {
        match topic.split('.').nth(1)? {
            "ztf" => Some(Survey::Ztf),
            "lsst" => Some(Survey::Lsst),
            _ => None,
        }
    }

    pub fn zero_point(&self) -> f64 {
        match self {
            Survey::Ztf => ZTF_ZP,
            Survey::Lsst => LSST_ZP,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Survey::Ztf => "ZTF",
            Survey::Lsst => "LSST",
        }
    }
}

impl std::fmt::Display for Survey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Photometric filter band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    U,
    G,
    R,
    I,
    Z,
    Y,
}

impl Band {
    pub fn parse(s: &str) -> Option<Band> {
        match s {
            "u" => Some(Band::U),
            "g" => Some(Band::G),
            "r" => Some(Band::R),
            "i" => Some(Band::I),
            "z" => Some(Band::Z),
            "y" => Some(Band::Y),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Band::U => "u",
            Band::G => "g",
            Band::R => "r",
            Band::I => "i",
            Band::Z => "z",
            Band::Y => "y",
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert a difference flux (nJy, as published) and its error to an AB
/// magnitude and error. Returns `None` for a non-positive flux, which
/// has no magnitude.
pub fn flux_to_mag(flux: f64, flux_err: f64, zp: f64) -> Option<(f64, f64)> {
    if flux <= 0.0 {
        return None;
    }
    let mag = zp - 2.5 * (flux * 1e-9).log10();
    let mag_err = (2.5 / std::f64::consts::LN_10) * (flux_err / flux);
    Some((mag, mag_err))
}

/// Convert a flux error (nJy) to a 3-sigma limiting magnitude. Returns
/// `None` for a non-positive error.
pub fn flux_err_to_limit(flux_err: f64, zp: f64) -> Option<f64> {
    if flux_err <= 0.0 {
        return None;
    }
    Some(zp - 2.5 * (3.0 * flux_err * 1e-9).log10())
}

/// Convert a Julian date to a calendar timestamp. Out-of-range dates
/// (the JD epoch is 4713 BC) return `None`.
pub fn jd_to_datetime(jd: f64) -> Option<DateTime<Utc>> {
    let unix_seconds = (jd - 2440587.5) * 86400.0;
    if !unix_seconds.is_finite() {
        return None;
    }
    let secs = unix_seconds.floor();
    let nanos = ((unix_seconds - secs) * 1e9) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
}

/// The current detection embedded in an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Detection identifier, unique per alert
    pub candid: i64,
    /// Object identifier, stable across an object's detection history
    pub object_id: String,
    /// Observation time, Julian date
    pub jd: f64,
    /// Right ascension, degrees
    pub ra: f64,
    /// Declination, degrees
    pub dec: f64,
    /// PSF difference magnitude
    pub magpsf: f64,
    /// Uncertainty on `magpsf`
    pub sigmapsf: f64,
    /// Filter band; LSST candidates may omit it
    pub band: Option<Band>,
    /// Whether the difference flux is positive
    pub isdiffpos: Option<bool>,
    /// Signal-to-noise ratio of the detection
    pub snr: Option<f64>,
    /// 5-sigma limiting magnitude of the exposure
    pub diffmaglim: Option<f64>,
    /// Real/bogus (ZTF deep-learning) or reliability (LSST) score
    pub drb: Option<f64>,
}

impl Candidate {
    /// Observation time as a calendar timestamp.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        jd_to_datetime(self.jd)
    }
}

/// One entry of an object's photometric history, tagged as a detection
/// or a non-detection once at decode time. The wire format encodes the
/// distinction implicitly, by the presence of a measurable flux; no
/// downstream code should have to re-inspect field presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PhotometryPoint {
    Detection {
        /// Observation time, Julian date
        jd: f64,
        band: Option<Band>,
        /// AB magnitude
        mag: f64,
        /// Uncertainty on `mag`
        mag_err: f64,
        /// Detection identifier, when the entry carries one
        candid: Option<i64>,
    },
    NonDetection {
        /// Observation time, Julian date
        jd: f64,
        band: Option<Band>,
        /// 3-sigma limiting magnitude: the source was not seen above
        /// this brightness
        limiting_mag: f64,
        candid: Option<i64>,
    },
}

impl PhotometryPoint {
    pub fn jd(&self) -> f64 {
        match self {
            PhotometryPoint::Detection { jd, .. } => *jd,
            PhotometryPoint::NonDetection { jd, .. } => *jd,
        }
    }

    pub fn band(&self) -> Option<Band> {
        match self {
            PhotometryPoint::Detection { band, .. } => *band,
            PhotometryPoint::NonDetection { band, .. } => *band,
        }
    }

    pub fn candid(&self) -> Option<i64> {
        match self {
            PhotometryPoint::Detection { candid, .. } => *candid,
            PhotometryPoint::NonDetection { candid, .. } => *candid,
        }
    }

    /// The measured magnitude; `None` for a non-detection.
    pub fn mag(&self) -> Option<f64> {
        match self {
            PhotometryPoint::Detection { mag, .. } => Some(*mag),
            PhotometryPoint::NonDetection { .. } => None,
        }
    }

    pub fn is_detection(&self) -> bool {
        matches!(self, PhotometryPoint::Detection { .. })
    }

    /// Observation time as a calendar timestamp.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        jd_to_datetime(self.jd())
    }
}

/// Pipeline classification flags attached to an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertProperties {
    /// Consistent with a known solar-system object
    pub rock: bool,
    /// Position has not moved between detections
    pub stationary: bool,
    /// Consistent with a catalogued star
    pub star: Option<bool>,
    /// Close to a bright star (likely artifact)
    pub near_brightstar: Option<bool>,
}

/// One published alert: the current detection plus a bounded history of
/// prior detections and non-detections, with optional cutout stamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub survey: Survey,
    /// Topic this alert was consumed from; absent when decoded outside
    /// a subscription
    pub topic: Option<String>,
    /// Object identifier, stable across alerts for one physical source
    pub object_id: String,
    /// Detection identifier, unique per alert
    pub candid: i64,
    pub candidate: Candidate,
    /// Prior alert-pipeline detections
    pub prv_candidates: Vec<PhotometryPoint>,
    /// Prior upper limits (ZTF only; empty for LSST)
    pub prv_nondetections: Vec<PhotometryPoint>,
    /// Forced photometry at the object's position
    pub fp_hists: Vec<PhotometryPoint>,
    pub properties: Option<AlertProperties>,
    /// Science cutout stamp, passed through undecoded
    pub cutout_science: Option<Vec<u8>>,
    /// Template cutout stamp, passed through undecoded
    pub cutout_template: Option<Vec<u8>>,
    /// Difference cutout stamp, passed through undecoded
    pub cutout_difference: Option<Vec<u8>>,
}

impl Alert {
    /// The normalized light curve: current detection plus all history,
    /// time-ordered and deduplicated.
    pub fn light_curve(&self) -> crate::babamul::lightcurve::LightCurve {
        crate::babamul::lightcurve::LightCurve::from_alert(self)
    }
}
