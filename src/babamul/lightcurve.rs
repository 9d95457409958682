//! Light-curve normalization.
//!
//! An alert carries one current detection plus overlapping history
//! arrays (prior alerts, upper limits, forced photometry). The
//! normalizer merges them into a single time-ordered view so callers
//! never have to reconcile the overlap themselves.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::babamul::alert::{Alert, Band, PhotometryPoint};

/// Key identifying one observation epoch. Julian dates are compared
/// bit-exact: history entries duplicating the current candidate carry
/// the identical encoded value, not a recomputed one.
#[derive(PartialEq, Eq, Hash)]
struct EpochKey(u64, Option<Band>, Option<i64>);

impl EpochKey {
    fn of(point: &PhotometryPoint) -> Self {
        Self(point.jd().to_bits(), point.band(), point.candid())
    }
}

/// The normalized, time-ordered photometric history of one object.
///
/// Purely derived from an [`Alert`]; owns no broker resources. The
/// sequence is ordered by observation time ascending (ties broken by
/// candidate identifier) and contains at most one entry per
/// (time, band, candidate) key, preferring detections over
/// non-detections when both were published for the same epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightCurve {
    points: Vec<PhotometryPoint>,
}

impl LightCurve {
    /// Normalize an alert: current detection plus all history arrays,
    /// ordered and deduplicated. Idempotent — the same alert always
    /// yields the same sequence.
    pub fn from_alert(alert: &Alert) -> Self {
        let candidate = &alert.candidate;
        let mut merged: Vec<PhotometryPoint> = Vec::with_capacity(
            1 + alert.prv_candidates.len()
                + alert.prv_nondetections.len()
                + alert.fp_hists.len(),
        );
        // the current candidate is always a detection
        merged.push(PhotometryPoint::Detection {
            jd: candidate.jd,
            band: candidate.band,
            mag: candidate.magpsf,
            mag_err: candidate.sigmapsf,
            candid: Some(candidate.candid),
        });
        merged.extend(alert.prv_candidates.iter().cloned());
        merged.extend(alert.prv_nondetections.iter().cloned());
        merged.extend(alert.fp_hists.iter().cloned());

        merged.sort_by(|a, b| {
            a.jd()
                .total_cmp(&b.jd())
                .then_with(|| a.candid().cmp(&b.candid()))
        });

        let mut points: Vec<PhotometryPoint> = Vec::with_capacity(merged.len());
        let mut seen: HashMap<EpochKey, usize> = HashMap::with_capacity(merged.len());
        for point in merged {
            match seen.get(&EpochKey::of(&point)).copied() {
                None => {
                    seen.insert(EpochKey::of(&point), points.len());
                    points.push(point);
                }
                // a detection supersedes a published limit at the same epoch
                Some(at) if !points[at].is_detection() && point.is_detection() => {
                    points[at] = point;
                }
                Some(_) => {}
            }
        }
        Self { points }
    }

    pub fn points(&self) -> &[PhotometryPoint] {
        &self.points
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PhotometryPoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn detections(&self) -> impl Iterator<Item = &PhotometryPoint> {
        self.points.iter().filter(|p| p.is_detection())
    }

    pub fn non_detections(&self) -> impl Iterator<Item = &PhotometryPoint> {
        self.points.iter().filter(|p| !p.is_detection())
    }

    /// The brightest detection (smallest magnitude), if any.
    pub fn peak(&self) -> Option<&PhotometryPoint> {
        self.detections().min_by(|a, b| {
            a.mag()
                .unwrap_or(f64::INFINITY)
                .total_cmp(&b.mag().unwrap_or(f64::INFINITY))
        })
    }
}

impl<'a> IntoIterator for &'a LightCurve {
    type Item = &'a PhotometryPoint;
    type IntoIter = std::slice::Iter<'a, PhotometryPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::babamul::alert::{Candidate, Survey};

    fn test_alert() -> Alert {
        Alert {
            survey: Survey::Ztf,
            topic: None,
            object_id: "ZTF25aaaaaaa".to_string(),
            candid: 3001,
            candidate: Candidate {
                candid: 3001,
                object_id: "ZTF25aaaaaaa".to_string(),
                jd: 2460003.0,
                ra: 150.0,
                dec: 2.2,
                magpsf: 18.3,
                sigmapsf: 0.05,
                band: Some(Band::G),
                isdiffpos: Some(true),
                snr: Some(25.0),
                diffmaglim: Some(20.5),
                drb: Some(0.99),
            },
            prv_candidates: vec![
                PhotometryPoint::Detection {
                    jd: 2460001.0,
                    band: Some(Band::G),
                    mag: 19.0,
                    mag_err: 0.1,
                    candid: Some(1001),
                },
                PhotometryPoint::Detection {
                    jd: 2460002.0,
                    band: Some(Band::R),
                    mag: 18.7,
                    mag_err: 0.08,
                    candid: Some(2001),
                },
            ],
            prv_nondetections: vec![PhotometryPoint::NonDetection {
                jd: 2460000.0,
                band: Some(Band::G),
                limiting_mag: 20.2,
                candid: None,
            }],
            fp_hists: vec![],
            properties: None,
            cutout_science: None,
            cutout_template: None,
            cutout_difference: None,
        }
    }

    #[test]
    fn test_ordering_and_current_inclusion() {
        let alert = test_alert();
        let lc = LightCurve::from_alert(&alert);
        assert_eq!(lc.len(), 4);
        let jds: Vec<f64> = lc.iter().map(|p| p.jd()).collect();
        assert_eq!(jds, vec![2460000.0, 2460001.0, 2460002.0, 2460003.0]);
        // last entry is the current candidate, as a detection
        assert_eq!(lc.points()[3].candid(), Some(3001));
        assert!(lc.points()[3].is_detection());
    }

    #[test]
    fn test_idempotence() {
        let alert = test_alert();
        assert_eq!(LightCurve::from_alert(&alert), LightCurve::from_alert(&alert));
    }

    #[test]
    fn test_current_duplicated_in_history_collapses() {
        let mut alert = test_alert();
        alert.prv_candidates.push(PhotometryPoint::Detection {
            jd: alert.candidate.jd,
            band: alert.candidate.band,
            mag: alert.candidate.magpsf,
            mag_err: alert.candidate.sigmapsf,
            candid: Some(alert.candidate.candid),
        });
        let lc = LightCurve::from_alert(&alert);
        let at_current: Vec<_> = lc
            .iter()
            .filter(|p| p.jd() == alert.candidate.jd)
            .collect();
        assert_eq!(at_current.len(), 1);
    }

    #[test]
    fn test_detection_supersedes_non_detection() {
        let mut alert = test_alert();
        // an upper limit published for the same epoch as a detection
        alert.prv_nondetections.push(PhotometryPoint::NonDetection {
            jd: 2460001.0,
            band: Some(Band::G),
            limiting_mag: 19.8,
            candid: Some(1001),
        });
        let lc = LightCurve::from_alert(&alert);
        let at_epoch: Vec<_> = lc.iter().filter(|p| p.jd() == 2460001.0).collect();
        assert_eq!(at_epoch.len(), 1);
        assert!(at_epoch[0].is_detection());
    }

    #[test]
    fn test_no_duplicate_keys_survive() {
        let mut alert = test_alert();
        alert.fp_hists.push(PhotometryPoint::NonDetection {
            jd: 2460000.0,
            band: Some(Band::G),
            limiting_mag: 20.2,
            candid: None,
        });
        let lc = LightCurve::from_alert(&alert);
        let mut keys: Vec<(u64, Option<Band>, Option<i64>)> = lc
            .iter()
            .map(|p| (p.jd().to_bits(), p.band(), p.candid()))
            .collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }

    #[test]
    fn test_non_detections_carry_no_magnitude() {
        let alert = test_alert();
        let lc = LightCurve::from_alert(&alert);
        for point in lc.non_detections() {
            assert_eq!(point.mag(), None);
        }
        for point in lc.detections() {
            assert!(point.mag().is_some());
        }
    }

    #[test]
    fn test_peak() {
        let alert = test_alert();
        let lc = LightCurve::from_alert(&alert);
        assert_eq!(lc.peak().and_then(|p| p.mag()), Some(18.3));
    }

    #[test]
    fn test_distinct_candids_at_same_epoch_are_kept() {
        let mut alert = test_alert();
        alert.prv_candidates.push(PhotometryPoint::Detection {
            jd: 2460002.0,
            band: Some(Band::R),
            mag: 18.71,
            mag_err: 0.09,
            candid: Some(2002),
        });
        let lc = LightCurve::from_alert(&alert);
        let at_epoch: Vec<_> = lc.iter().filter(|p| p.jd() == 2460002.0).collect();
        assert_eq!(at_epoch.len(), 2);
        // deterministic tie-break on candid
        assert_eq!(at_epoch[0].candid(), Some(2001));
        assert_eq!(at_epoch[1].candid(), Some(2002));
    }
}
