//! Roam latency measurement and classification

use crate::capture::{AuthenticationQuery, FrameAnalyzer, ReassociationQuery};
use crate::capture::frames::STATUS_SUCCESS;
use crate::models::{FailReason, Verdict};
use crate::types::{AuthAlgorithm, MacAddr};
use std::time::Duration;

/// Everything the classification depends on for one station
#[derive(Debug, Clone, Copy)]
pub struct TimingInputs<'a> {
    pub before: MacAddr,
    pub after: MacAddr,
    pub station_mac: Option<MacAddr>,
    /// The pair's two designated BSSIDs
    pub expected: [MacAddr; 2],
    /// All roamed stations of the iteration landed on the same BSSID
    pub landing_consensus: bool,
    /// Parsed capture, `None` when no capture is available
    pub frames: Option<&'a FrameAnalyzer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimingOutcome {
    pub verdict: Verdict,
    /// Signed; negative on timestamp inversion
    pub latency_ms: Option<f64>,
    pub auth_time: Option<Duration>,
    pub reassoc_time: Option<Duration>,
}

impl TimingOutcome {
    fn fail(reason: FailReason) -> Self {
        Self { verdict: Verdict::Fail(reason), latency_ms: None, auth_time: None, reassoc_time: None }
    }
}

/// Pure classifier from observations and capture frames to a verdict
#[derive(Debug, Clone)]
pub struct RoamTimingCalculator {
    threshold: Duration,
    auth_query: AuthenticationQuery,
    reassoc_query: ReassociationQuery,
}

impl RoamTimingCalculator {
    pub fn new(threshold: Duration, algorithm: AuthAlgorithm, require_ft_element: bool) -> Self {
        Self {
            threshold,
            auth_query: AuthenticationQuery { algorithm, sequence: 1, status: STATUS_SUCCESS },
            reassoc_query: ReassociationQuery { status: STATUS_SUCCESS, require_ft_element },
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn classify(&self, input: &TimingInputs<'_>) -> TimingOutcome {
        if input.before == input.after {
            return TimingOutcome::fail(FailReason::NoRoam);
        }

        let outcome = self.measure(input);

        let landed_in_pair = input.expected.contains(&input.after);
        if landed_in_pair && input.landing_consensus {
            return outcome;
        }

        let inner = outcome.verdict.fail_reason().cloned().map(Box::new);
        TimingOutcome {
            verdict: Verdict::Fail(FailReason::BssidMismatch { inner }),
            ..outcome
        }
    }

    fn measure(&self, input: &TimingInputs<'_>) -> TimingOutcome {
        let (Some(frames), Some(mac)) = (input.frames, input.station_mac) else {
            return TimingOutcome::fail(FailReason::NoReassociation);
        };

        let Some(reassoc) = frames.find_reassociation(mac, &self.reassoc_query) else {
            let statuses = frames.reassociation_statuses(mac);
            return match statuses.first() {
                Some(&status) if !statuses.contains(&STATUS_SUCCESS) => {
                    TimingOutcome::fail(FailReason::ReassociationRejected { status })
                }
                _ => TimingOutcome::fail(FailReason::NoReassociation),
            };
        };

        let Some(auth) = frames.find_authentication(mac, &self.auth_query) else {
            return TimingOutcome {
                reassoc_time: Some(reassoc),
                ..TimingOutcome::fail(FailReason::AuthFail)
            };
        };

        let (verdict, latency_ms) = match reassoc.checked_sub(auth) {
            None => (
                Verdict::Fail(FailReason::TimestampInversion),
                -duration_ms(auth - reassoc),
            ),
            Some(latency) if latency < self.threshold => (Verdict::Pass, duration_ms(latency)),
            Some(latency) => (Verdict::Fail(FailReason::ThresholdExceeded), duration_ms(latency)),
        };

        TimingOutcome {
            verdict,
            latency_ms: Some(latency_ms),
            auth_time: Some(auth),
            reassoc_time: Some(reassoc),
        }
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frames::fixtures::*;
    use crate::capture::frames::parse_management_frame;

    fn sta() -> MacAddr {
        "a:1b:2c:d:e:f".parse().unwrap()
    }

    fn ap1() -> MacAddr {
        "94:a6:7e:54:d4:31".parse().unwrap()
    }

    fn ap2() -> MacAddr {
        "94:a6:7e:54:d4:33".parse().unwrap()
    }

    fn calculator() -> RoamTimingCalculator {
        RoamTimingCalculator::new(Duration::from_millis(50), AuthAlgorithm::FastTransition, true)
    }

    fn capture(auth_at: Option<Duration>, reassoc: Option<(Duration, u16)>) -> FrameAnalyzer {
        let mut frames = Vec::new();
        if let Some(at) = auth_at {
            frames.push(parse_management_frame(&auth_frame(sta(), ap2(), 2, 1, 0), at).unwrap());
        }
        if let Some((at, status)) = reassoc {
            frames.push(parse_management_frame(&reassoc_response(sta(), ap2(), status, true), at).unwrap());
        }
        FrameAnalyzer::from_frames(frames)
    }

    fn inputs(frames: Option<&FrameAnalyzer>) -> TimingInputs<'_> {
        TimingInputs {
            before: ap1(),
            after: ap2(),
            station_mac: Some(sta()),
            expected: [ap1(), ap2()],
            landing_consensus: true,
            frames,
        }
    }

    #[test]
    fn test_35ms_roam_passes() {
        let frames = capture(Some(Duration::from_millis(10_000)), Some((Duration::from_millis(10_035), 0)));
        let outcome = calculator().classify(&inputs(Some(&frames)));
        assert_eq!(outcome.verdict, Verdict::Pass);
        assert_eq!(outcome.latency_ms, Some(35.0));
        assert_eq!(outcome.auth_time, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_threshold_is_strict() {
        let frames = capture(Some(Duration::from_millis(10_000)), Some((Duration::from_millis(10_050), 0)));
        let outcome = calculator().classify(&inputs(Some(&frames)));
        assert_eq!(outcome.verdict, Verdict::Fail(FailReason::ThresholdExceeded));
        assert_eq!(outcome.latency_ms, Some(50.0));

        let frames = capture(Some(Duration::from_micros(10_000_000)), Some((Duration::from_micros(10_049_999), 0)));
        assert!(calculator().classify(&inputs(Some(&frames))).verdict.is_pass());
    }

    #[test]
    fn test_out_of_order_pcap_is_timestamp_inversion() {
        let bytes = pcap(
            105,
            &[
                (1_700_000_010, 0, auth_frame(sta(), ap2(), 2, 1, 0)),
                (1_700_000_009, 980_000, reassoc_response(sta(), ap2(), 0, true)),
            ],
        );
        let frames = FrameAnalyzer::from_pcap_reader(bytes.as_slice()).unwrap();
        let outcome = calculator().classify(&inputs(Some(&frames)));
        assert_eq!(outcome.verdict, Verdict::Fail(FailReason::TimestampInversion));
        assert_eq!(outcome.latency_ms, Some(-20.0));
    }

    #[test]
    fn test_no_roam_short_circuits() {
        let frames = capture(Some(Duration::from_millis(1)), Some((Duration::from_millis(2), 0)));
        let mut input = inputs(Some(&frames));
        input.after = input.before;
        let outcome = calculator().classify(&input);
        assert_eq!(outcome.verdict, Verdict::Fail(FailReason::NoRoam));
        assert_eq!(outcome.latency_ms, None);
    }

    #[test]
    fn test_missing_capture_is_no_reassociation() {
        let outcome = calculator().classify(&inputs(None));
        assert_eq!(outcome.verdict, Verdict::Fail(FailReason::NoReassociation));

        let frames = capture(Some(Duration::from_millis(1)), None);
        let outcome = calculator().classify(&inputs(Some(&frames)));
        assert_eq!(outcome.verdict, Verdict::Fail(FailReason::NoReassociation));
    }

    #[test]
    fn test_rejected_reassociation() {
        let frames = capture(Some(Duration::from_millis(1)), Some((Duration::from_millis(5), 53)));
        let outcome = calculator().classify(&inputs(Some(&frames)));
        assert_eq!(outcome.verdict, Verdict::Fail(FailReason::ReassociationRejected { status: 53 }));
    }

    #[test]
    fn test_missing_auth_is_auth_fail() {
        let frames = capture(None, Some((Duration::from_millis(5), 0)));
        let outcome = calculator().classify(&inputs(Some(&frames)));
        assert_eq!(outcome.verdict, Verdict::Fail(FailReason::AuthFail));
        assert_eq!(outcome.reassoc_time, Some(Duration::from_millis(5)));
    }

    #[test]
    fn test_inversion_is_never_clamped() {
        let frames = capture(Some(Duration::from_millis(120)), Some((Duration::from_millis(100), 0)));
        let outcome = calculator().classify(&inputs(Some(&frames)));
        assert_eq!(outcome.verdict, Verdict::Fail(FailReason::TimestampInversion));
        assert_eq!(outcome.latency_ms, Some(-20.0));
    }

    #[test]
    fn test_unexpected_landing_overrides_pass() {
        let frames = capture(Some(Duration::from_millis(0)), Some((Duration::from_millis(20), 0)));
        let mut input = inputs(Some(&frames));
        input.after = "94:a6:7e:54:d4:99".parse().unwrap();
        let outcome = calculator().classify(&input);
        assert_eq!(outcome.verdict, Verdict::Fail(FailReason::BssidMismatch { inner: None }));
        assert_eq!(outcome.latency_ms, Some(20.0));
    }

    #[test]
    fn test_disagreeing_landings_keep_inner_reason() {
        let frames = capture(Some(Duration::from_millis(0)), Some((Duration::from_millis(80), 0)));
        let mut input = inputs(Some(&frames));
        input.landing_consensus = false;
        let outcome = calculator().classify(&input);
        assert_eq!(
            outcome.verdict,
            Verdict::Fail(FailReason::BssidMismatch { inner: Some(Box::new(FailReason::ThresholdExceeded)) })
        );
    }

    #[test]
    fn test_classification_is_deterministic() {
        let frames = capture(Some(Duration::from_millis(3)), Some((Duration::from_millis(30), 0)));
        let calc = calculator();
        let first = calc.classify(&inputs(Some(&frames)));
        for _ in 0..10 {
            assert_eq!(calc.classify(&inputs(Some(&frames))), first);
        }
    }
}
