//! Echo probes and round-trip time measurement.
//!
//! An echo carries its origination time as decimal unix seconds. The node
//! it is addressed to measures the elapsed wall-clock time on arrival.

use mesh_wire::{unix_now_secs, Body, Message, NodeAddress};
use std::time::Duration;

/// Result of timing one echo
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EchoMeasurement {
    /// Elapsed time since the probe was sent; zero under clock skew
    pub rtt: Duration,
    /// The probe claims to have been sent in the future
    pub clock_skew: bool,
    /// Raw difference in seconds, negative under clock skew
    pub elapsed_secs: f64,
}

/// Build an echo probe from `local` to `target`
pub fn build_probe(local: &NodeAddress, target: &NodeAddress) -> Message {
    Message::echo(local.clone(), target.clone())
}

/// Time an echo sent at `sent_at` against `now` (both unix seconds)
pub fn measure(sent_at: f64, now: f64) -> EchoMeasurement {
    let elapsed_secs = now - sent_at;
    if elapsed_secs < 0.0 {
        EchoMeasurement {
            rtt: Duration::ZERO,
            clock_skew: true,
            elapsed_secs,
        }
    } else {
        EchoMeasurement {
            rtt: Duration::try_from_secs_f64(elapsed_secs).unwrap_or(Duration::MAX),
            clock_skew: false,
            elapsed_secs,
        }
    }
}

/// Time an echo message against the current wall clock
pub fn measure_now(message: &Message) -> Option<EchoMeasurement> {
    match &message.body {
        Body::Echo(echo) => Some(measure(echo.sent_at, unix_now_secs())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_elapsed() {
        let m = measure(100.0, 100.25);
        assert_eq!(m.rtt, Duration::from_millis(250));
        assert!(!m.clock_skew);
    }

    #[test]
    fn test_measure_future_timestamp_is_skew() {
        let m = measure(100.5, 100.0);
        assert!(m.clock_skew);
        assert_eq!(m.rtt, Duration::ZERO);
        assert!(m.elapsed_secs < 0.0);
    }

    #[test]
    fn test_measure_now_on_fresh_probe() {
        let probe = build_probe(&NodeAddress::from("a"), &NodeAddress::from("b"));
        let m = measure_now(&probe).unwrap();

        assert!(!m.clock_skew);
        assert!(m.rtt < Duration::from_secs(1));

        let data = Message::data(NodeAddress::from("a"), NodeAddress::from("b"), "message", "x");
        assert!(measure_now(&data).is_none());
    }
}
